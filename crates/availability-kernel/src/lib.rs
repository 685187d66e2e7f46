//! Orbital Availability Kernel
//!
//! Predicts from orbital geometry when a node (a low-orbit satellite) can be
//! reached from a ground station, and uses that prediction to gate and
//! schedule federated-learning rounds:
//!
//! - [`windows`] - continuous elevation geometry → discrete contact windows
//! - [`availability`] - preemptive straggler filter ("can this node finish
//!   a task of length D before loss of signal?")
//! - [`snapshot`] - visible-node sets and inter-node communication graphs
//! - [`scheduler`] - instants where enough nodes are visible to aggregate
//! - [`kernel`] - immutable context tying nodes, stations and a
//!   [`GeometryProvider`] together
//!
//! All operations are synchronous and read-only over the loaded state.
//! Constellation-wide scans fan out over `rayon`.

use std::fmt;
use thiserror::Error;

pub mod availability;
pub mod config;
pub mod geometry;
pub mod kernel;
pub mod model;
pub mod round;
pub mod scheduler;
pub mod snapshot;
pub mod windows;

#[cfg(test)]
pub(crate) mod mock;

pub use availability::{decide, is_available};
pub use config::{EventSearchConfig, KernelConfig, StrategyConfig};
pub use geometry::{EventSearch, GeometryProvider, Sgp4Geometry};
pub use ground_stations::{GeoLocation, GroundStation, StationRegistry};
pub use kernel::AvailabilityKernel;
pub use model::{
    AggregationOpportunity, AvailabilityDecision, EventKind, GeometrySample, Node, PassEvent,
    VisibilityWindow,
};
pub use round::{RoundPhase, TransitionError};
pub use scheduler::schedule;
pub use snapshot::{communication_graph, visible_nodes, CommunicationGraph};
pub use windows::{visibility_windows, OpenWindowPolicy, WindowOptions, WindowStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Station,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => write!(f, "Node"),
            EntityKind::Station => write!(f, "Station"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Geometry unavailable for {node}: {reason}")]
    DataUnavailable { node: String, reason: String },
    #[error("Duplicate node id {0}")]
    DuplicateId(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KernelError {
    pub fn node_not_found(id: impl Into<String>) -> Self {
        KernelError::NotFound {
            kind: EntityKind::Node,
            id: id.into(),
        }
    }

    pub fn unavailable(node: impl Into<String>, reason: impl fmt::Display) -> Self {
        KernelError::DataUnavailable {
            node: node.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, KernelError::DataUnavailable { .. })
    }
}

impl From<ground_stations::StationError> for KernelError {
    fn from(err: ground_stations::StationError) -> Self {
        match err {
            ground_stations::StationError::NotFound(id) => KernelError::NotFound {
                kind: EntityKind::Station,
                id,
            },
            other => KernelError::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;

/// Reject non-physical elevation thresholds
pub(crate) fn check_elevation(min_elevation_deg: f64) -> Result<()> {
    if !min_elevation_deg.is_finite() || !(-90.0..=90.0).contains(&min_elevation_deg) {
        return Err(KernelError::InvalidRange(format!(
            "elevation threshold {} outside [-90, 90]",
            min_elevation_deg
        )));
    }
    Ok(())
}
