//! Scripted geometry for unit tests
//!
//! Each node gets a list of triangular passes: elevation climbs linearly
//! from the base threshold at rise to the peak, then falls back to the base
//! threshold at set. Outside passes the node sits well below the horizon.

use crate::geometry::GeometryProvider;
use crate::model::{EventKind, GeometrySample, Node, PassEvent};
use crate::{KernelError, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use ground_stations::GroundStation;
use nalgebra::Vector3;
use std::collections::{HashMap, HashSet};

pub(crate) const BASE_THRESHOLD: f64 = 10.0;
const BELOW_HORIZON: f64 = -10.0;
const AOS_AZIMUTH: f64 = 30.0;
const LOS_AZIMUTH: f64 = 150.0;

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

pub(crate) fn minutes(m: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(m)
}

pub(crate) fn station() -> GroundStation {
    GroundStation::new("gs_test", "Test Station", 33.7756, -84.3963, 288.0).unwrap()
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ScriptedPass {
    pub rise: DateTime<Utc>,
    pub peak: DateTime<Utc>,
    pub set: DateTime<Utc>,
    pub peak_elevation: f64,
}

impl ScriptedPass {
    /// Pass rising at `rise_min`, culminating at the midpoint, setting at `set_min`
    pub fn minutes(rise_min: i64, set_min: i64, peak_elevation: f64) -> Self {
        let rise = minutes(rise_min);
        let set = minutes(set_min);
        Self {
            rise,
            peak: rise + (set - rise) / 2,
            set,
            peak_elevation,
        }
    }

    fn fraction(from: DateTime<Utc>, to: DateTime<Utc>, at: DateTime<Utc>) -> f64 {
        let span = (to - from).num_milliseconds() as f64;
        if span <= 0.0 {
            return 1.0;
        }
        (at - from).num_milliseconds() as f64 / span
    }

    fn elevation(&self, t: DateTime<Utc>) -> Option<f64> {
        if t < self.rise || t > self.set {
            return None;
        }
        let climb = self.peak_elevation - BASE_THRESHOLD;
        if t <= self.peak {
            Some(BASE_THRESHOLD + climb * Self::fraction(self.rise, self.peak, t))
        } else {
            Some(self.peak_elevation - climb * Self::fraction(self.peak, self.set, t))
        }
    }

    fn azimuth(&self, t: DateTime<Utc>) -> f64 {
        let f = Self::fraction(self.rise, self.set, t).clamp(0.0, 1.0);
        AOS_AZIMUTH + (LOS_AZIMUTH - AOS_AZIMUTH) * f
    }

    /// Crossing instants of `threshold`, which must be at or above the base threshold
    fn crossings(&self, threshold: f64) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if threshold > self.peak_elevation {
            return None;
        }
        let climb = self.peak_elevation - BASE_THRESHOLD;
        let f = if climb > 0.0 {
            ((threshold - BASE_THRESHOLD) / climb).max(0.0)
        } else {
            0.0
        };
        let up = self.rise + Duration::milliseconds(((self.peak - self.rise).num_milliseconds() as f64 * f) as i64);
        let down = self.set - Duration::milliseconds(((self.set - self.peak).num_milliseconds() as f64 * f) as i64);
        Some((up, down))
    }
}

#[derive(Default)]
pub(crate) struct ScriptedGeometry {
    passes: HashMap<String, Vec<ScriptedPass>>,
    ranges: HashMap<(String, String), f64>,
    unavailable: HashSet<String>,
}

impl ScriptedGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pass(mut self, node_id: &str, pass: ScriptedPass) -> Self {
        self.passes.entry(node_id.to_string()).or_default().push(pass);
        self
    }

    pub fn with_range(mut self, a: &str, b: &str, km: f64) -> Self {
        self.ranges.insert((a.to_string(), b.to_string()), km);
        self
    }

    pub fn with_unavailable(mut self, node_id: &str) -> Self {
        self.unavailable.insert(node_id.to_string());
        self
    }

    fn check(&self, node: &Node) -> Result<()> {
        if self.unavailable.contains(&node.id) {
            return Err(KernelError::unavailable(&node.id, "scripted degenerate state"));
        }
        Ok(())
    }

    fn passes_for(&self, node: &Node) -> &[ScriptedPass] {
        self.passes.get(&node.id).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl GeometryProvider for ScriptedGeometry {
    fn sample(
        &self,
        node: &Node,
        _station: &GroundStation,
        time: DateTime<Utc>,
    ) -> Result<GeometrySample> {
        self.check(node)?;
        let hit = self
            .passes_for(node)
            .iter()
            .find_map(|p| p.elevation(time).map(|el| (el, p.azimuth(time))));
        let (elevation_deg, azimuth_deg) = hit.unwrap_or((BELOW_HORIZON, 0.0));

        Ok(GeometrySample {
            time,
            elevation_deg,
            azimuth_deg,
            range_km: 1000.0,
        })
    }

    fn events(
        &self,
        node: &Node,
        _station: &GroundStation,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        threshold_deg: f64,
    ) -> Result<Vec<PassEvent>> {
        self.check(node)?;
        let in_range = |t: DateTime<Utc>| start <= t && t <= end;

        let mut events = Vec::new();
        for pass in self.passes_for(node) {
            let Some((up, down)) = pass.crossings(threshold_deg) else {
                continue;
            };
            if in_range(up) {
                events.push(PassEvent { time: up, kind: EventKind::Rise });
            }
            if in_range(pass.peak) {
                events.push(PassEvent { time: pass.peak, kind: EventKind::Culminate });
            }
            if in_range(down) {
                events.push(PassEvent { time: down, kind: EventKind::Set });
            }
        }
        events.sort_by_key(|e| e.time);
        Ok(events)
    }

    fn position(&self, node: &Node, _time: DateTime<Utc>) -> Result<Vector3<f64>> {
        self.check(node)?;
        Err(KernelError::unavailable(&node.id, "scripted geometry has no positions"))
    }

    fn range_between(&self, a: &Node, b: &Node, _time: DateTime<Utc>) -> Result<f64> {
        self.check(a)?;
        self.check(b)?;
        let forward = (a.id.clone(), b.id.clone());
        let backward = (b.id.clone(), a.id.clone());
        Ok(self
            .ranges
            .get(&forward)
            .or_else(|| self.ranges.get(&backward))
            .copied()
            .unwrap_or(10_000.0))
    }
}
