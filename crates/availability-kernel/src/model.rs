//! Kernel data model
//!
//! Nodes are loaded once and shared read-only; everything else here is an
//! ephemeral query result.

use chrono::{DateTime, Duration, Utc};
use orbital_mechanics::TwoLineElement;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};

/// A compute node in orbit
#[derive(Debug)]
pub struct Node {
    pub id: String,
    pub name: String,
    /// Orbital elements consumed by the geometry provider
    pub tle: Option<TwoLineElement>,
    pub orbital_plane: u32,
    pub position_in_plane: u32,
    /// Relative compute capacity (1.0 = nominal)
    pub compute_capacity: f64,
    model_version: AtomicU64,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tle: None,
            orbital_plane: 0,
            position_in_plane: 0,
            compute_capacity: 1.0,
            model_version: AtomicU64::new(0),
        }
    }

    pub fn from_tle(id: impl Into<String>, tle: TwoLineElement) -> Self {
        let mut node = Self::new(id, tle.name.clone());
        node.tle = Some(tle);
        node
    }

    pub fn in_plane(mut self, orbital_plane: u32, position_in_plane: u32) -> Self {
        self.orbital_plane = orbital_plane;
        self.position_in_plane = position_in_plane;
        self
    }

    pub fn with_compute_capacity(mut self, capacity: f64) -> Self {
        self.compute_capacity = capacity;
        self
    }

    /// Current model version; owned by the training loop, never written by the kernel
    pub fn model_version(&self) -> u64 {
        self.model_version.load(Ordering::Acquire)
    }

    /// Record that a new global model reached this node; returns the new version
    pub fn advance_model_version(&self) -> u64 {
        self.model_version.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            tle: self.tle.clone(),
            orbital_plane: self.orbital_plane,
            position_in_plane: self.position_in_plane,
            compute_capacity: self.compute_capacity,
            model_version: AtomicU64::new(self.model_version()),
        }
    }
}

/// One (node, station) geometry sample; produced on demand, never stored
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeometrySample {
    pub time: DateTime<Utc>,
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Rise,
    Culminate,
    Set,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassEvent {
    pub time: DateTime<Utc>,
    pub kind: EventKind,
}

/// A contact window (satellite pass) above a detection threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisibilityWindow {
    pub node_id: String,
    pub station_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub aos_azimuth_deg: f64,
    pub los_azimuth_deg: f64,
}

impl VisibilityWindow {
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Half-open containment: the closing instant is not inside the window
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start_time <= time && time < self.end_time
    }
}

fn serialize_seconds<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => s.serialize_some(&(d.num_milliseconds() as f64 / 1000.0)),
        None => s.serialize_none(),
    }
}

/// Admit/reject verdict of the straggler filter
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AvailabilityDecision {
    pub available: bool,
    /// Connected time left in the containing window, if any
    #[serde(rename = "remaining_s", serialize_with = "serialize_seconds")]
    pub remaining: Option<Duration>,
    pub window: Option<VisibilityWindow>,
}

impl AvailabilityDecision {
    pub fn rejected() -> Self {
        Self {
            available: false,
            remaining: None,
            window: None,
        }
    }
}

/// An instant with enough simultaneously visible nodes to aggregate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregationOpportunity {
    pub time: DateTime<Utc>,
    pub visible_count: usize,
    pub node_ids: Vec<String>,
}
