//! Kernel configuration
//!
//! Every field has a default, so a config file only needs the values it
//! overrides.

use crate::geometry::EventSearch;
use crate::windows::{OpenWindowPolicy, WindowOptions, WindowStrategy};
use crate::{KernelError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Window detection strategy as written in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    #[default]
    Events,
    Sampled { step_s: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSearchConfig {
    pub coarse_step_s: i64,
    pub tolerance_ms: i64,
}

impl Default for EventSearchConfig {
    fn default() -> Self {
        Self {
            coarse_step_s: 60,
            tolerance_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Detection threshold for contact windows and visibility snapshots
    pub min_elevation_deg: f64,
    /// Straggler-filter lookahead horizon
    pub lookahead_s: i64,
    pub strategy: StrategyConfig,
    pub open_windows: OpenWindowPolicy,
    pub event_search: EventSearchConfig,
    /// Inter-node link range
    pub max_range_km: f64,
    pub min_visible_nodes: usize,
    pub schedule_step_s: i64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            min_elevation_deg: 10.0,
            lookahead_s: 2 * 3600,
            strategy: StrategyConfig::Events,
            open_windows: OpenWindowPolicy::Drop,
            event_search: EventSearchConfig::default(),
            max_range_km: 5000.0,
            min_visible_nodes: 3,
            schedule_step_s: 60,
        }
    }
}

impl KernelConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| KernelError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| KernelError::Config(format!("{}: {}", path.display(), e)))?;

        config.validate()?;
        info!("Loaded kernel config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_elevation_deg.is_finite() || !(-90.0..=90.0).contains(&self.min_elevation_deg) {
            return Err(KernelError::Config(format!(
                "min_elevation_deg {} outside [-90, 90]",
                self.min_elevation_deg
            )));
        }
        positive_seconds("lookahead_s", self.lookahead_s)?;
        if let StrategyConfig::Sampled { step_s } = self.strategy {
            positive_seconds("strategy.step_s", step_s)?;
        }
        positive_seconds("event_search.coarse_step_s", self.event_search.coarse_step_s)?;
        if self.event_search.tolerance_ms <= 0 {
            return Err(KernelError::Config(format!(
                "event_search.tolerance_ms {} must be positive",
                self.event_search.tolerance_ms
            )));
        }
        if !self.max_range_km.is_finite() || self.max_range_km < 0.0 {
            return Err(KernelError::Config(format!(
                "max_range_km {} must be non-negative",
                self.max_range_km
            )));
        }
        positive_seconds("schedule_step_s", self.schedule_step_s)?;
        Ok(())
    }

    pub fn lookahead(&self) -> Duration {
        saturating_seconds(self.lookahead_s)
    }

    pub fn schedule_step(&self) -> Duration {
        saturating_seconds(self.schedule_step_s)
    }

    pub fn window_options(&self) -> WindowOptions {
        let strategy = match self.strategy {
            StrategyConfig::Events => WindowStrategy::Events,
            StrategyConfig::Sampled { step_s } => WindowStrategy::Sampled {
                step: saturating_seconds(step_s),
            },
        };
        WindowOptions {
            strategy,
            open_windows: self.open_windows,
        }
    }

    pub fn event_search(&self) -> EventSearch {
        EventSearch {
            coarse_step: saturating_seconds(self.event_search.coarse_step_s),
            tolerance: Duration::try_milliseconds(self.event_search.tolerance_ms)
                .unwrap_or(Duration::MAX),
        }
    }
}

fn positive_seconds(field: &str, value: i64) -> Result<Duration> {
    if value <= 0 {
        return Err(KernelError::Config(format!("{} {} must be positive", field, value)));
    }
    Duration::try_seconds(value)
        .ok_or_else(|| KernelError::Config(format!("{} {} is out of range", field, value)))
}

/// Validated configs never hit the clamp
fn saturating_seconds(value: i64) -> Duration {
    Duration::try_seconds(value).unwrap_or(Duration::MAX)
}
