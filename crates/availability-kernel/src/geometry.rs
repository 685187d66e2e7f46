//! Geometry Provider
//!
//! The kernel never propagates orbits itself; it asks a [`GeometryProvider`]
//! for instantaneous look angles, threshold-crossing events and inertial
//! positions. [`Sgp4Geometry`] is the production implementation.

use crate::model::{EventKind, GeometrySample, Node, PassEvent};
use crate::{KernelError, Result};
use chrono::{DateTime, Duration, Utc};
use ground_stations::GroundStation;
use nalgebra::Vector3;
use orbital_mechanics::propagation::Propagator;
use orbital_mechanics::{transforms, GeodeticPosition};
use std::collections::HashMap;
use tracing::{info, warn};

/// Source of (node, station) and (node, node) geometry.
///
/// Implementations must be reentrant: constellation scans call them from
/// several worker threads at once.
pub trait GeometryProvider: Send + Sync {
    /// Elevation, azimuth and slant range from `station` to `node` at `time`
    fn sample(&self, node: &Node, station: &GroundStation, time: DateTime<Utc>)
        -> Result<GeometrySample>;

    /// Chronological RISE/CULMINATE/SET events for `threshold_deg` within `[start, end]`
    fn events(
        &self,
        node: &Node,
        station: &GroundStation,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        threshold_deg: f64,
    ) -> Result<Vec<PassEvent>>;

    /// Inertial position in km
    fn position(&self, node: &Node, time: DateTime<Utc>) -> Result<Vector3<f64>>;

    /// Straight-line range between two nodes in km (no Earth occlusion)
    fn range_between(&self, a: &Node, b: &Node, time: DateTime<Utc>) -> Result<f64> {
        Ok((self.position(a, time)? - self.position(b, time)?).norm())
    }
}

/// Root-finding parameters for event search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventSearch {
    /// Coarse scan cadence; passes shorter than this can be missed
    pub coarse_step: Duration,
    /// Bisection stops once the bracket is narrower than this
    pub tolerance: Duration,
}

impl Default for EventSearch {
    fn default() -> Self {
        Self {
            coarse_step: Duration::seconds(60),
            tolerance: Duration::milliseconds(500),
        }
    }
}

pub(crate) fn station_geodetic(station: &GroundStation) -> GeodeticPosition {
    GeodeticPosition {
        latitude_deg: station.location.latitude,
        longitude_deg: station.location.longitude,
        altitude_km: station.location.altitude_m / 1000.0,
    }
}

/// SGP4-backed provider; propagators are built once from the node set
#[derive(Debug)]
pub struct Sgp4Geometry {
    propagators: HashMap<String, Propagator>,
    search: EventSearch,
}

impl Sgp4Geometry {
    pub fn new<'a>(nodes: impl IntoIterator<Item = &'a Node>, search: EventSearch) -> Self {
        let mut propagators = HashMap::new();
        let mut degenerate = 0;

        for node in nodes {
            let Some(tle) = &node.tle else {
                degenerate += 1;
                continue;
            };
            match Propagator::from_tle(tle) {
                Ok(p) => {
                    propagators.insert(node.id.clone(), p);
                }
                Err(e) => {
                    warn!("Node {} has unusable elements: {}", node.id, e);
                    degenerate += 1;
                }
            }
        }

        info!(
            "Initialised {} SGP4 propagators ({} nodes without usable elements)",
            propagators.len(),
            degenerate
        );

        Self {
            propagators,
            search,
        }
    }

    pub fn search(&self) -> EventSearch {
        self.search
    }

    fn propagator(&self, node: &Node) -> Result<&Propagator> {
        self.propagators
            .get(&node.id)
            .ok_or_else(|| KernelError::unavailable(&node.id, "no usable orbital elements"))
    }

    fn elevation(&self, node: &Node, station: &GroundStation, time: DateTime<Utc>) -> Result<f64> {
        Ok(self.sample(node, station, time)?.elevation_deg)
    }

    /// Narrow a threshold crossing in `(lo, hi]` to the search tolerance;
    /// returns the first instant on the far side of the crossing
    fn bisect(
        &self,
        node: &Node,
        station: &GroundStation,
        threshold_deg: f64,
        mut lo: DateTime<Utc>,
        mut hi: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let lo_above = self.elevation(node, station, lo)? >= threshold_deg;
        while hi - lo > self.search.tolerance {
            let mid = lo + (hi - lo) / 2;
            if (self.elevation(node, station, mid)? >= threshold_deg) == lo_above {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(hi)
    }

    /// Ternary search for the elevation maximum inside `[lo, hi]`
    fn culmination(
        &self,
        node: &Node,
        station: &GroundStation,
        mut lo: DateTime<Utc>,
        mut hi: DateTime<Utc>,
    ) -> Result<GeometrySample> {
        while hi - lo > self.search.tolerance {
            let third = (hi - lo) / 3;
            let m1 = lo + third;
            let m2 = hi - third;
            if self.elevation(node, station, m1)? < self.elevation(node, station, m2)? {
                lo = m1;
            } else {
                hi = m2;
            }
        }
        self.sample(node, station, lo + (hi - lo) / 2)
    }
}

impl GeometryProvider for Sgp4Geometry {
    fn sample(
        &self,
        node: &Node,
        station: &GroundStation,
        time: DateTime<Utc>,
    ) -> Result<GeometrySample> {
        let state = self
            .propagator(node)?
            .propagate(time)
            .map_err(|e| KernelError::unavailable(&node.id, e))?;
        let angles = transforms::look_angles(&station_geodetic(station), &state.position, time)
            .map_err(|e| KernelError::unavailable(&node.id, e))?;

        Ok(GeometrySample {
            time,
            elevation_deg: angles.elevation_deg,
            azimuth_deg: angles.azimuth_deg,
            range_km: angles.range_km,
        })
    }

    fn events(
        &self,
        node: &Node,
        station: &GroundStation,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        threshold_deg: f64,
    ) -> Result<Vec<PassEvent>> {
        if self.search.coarse_step <= Duration::zero() {
            return Err(KernelError::InvalidRange(
                "event search step must be positive".to_string(),
            ));
        }
        // Sub-millisecond brackets stop shrinking under integer division
        if self.search.tolerance < Duration::milliseconds(1) {
            return Err(KernelError::InvalidRange(format!(
                "event search tolerance {} is below 1ms",
                self.search.tolerance
            )));
        }
        if end <= start {
            return Ok(Vec::new());
        }

        // Coarse grid, always closed by `end`
        let mut grid = Vec::new();
        let mut t = start;
        while t < end {
            grid.push((t, self.elevation(node, station, t)?));
            match t.checked_add_signed(self.search.coarse_step) {
                Some(next) => t = next,
                None => break,
            }
        }
        grid.push((end, self.elevation(node, station, end)?));

        let mut events = Vec::new();

        for pair in grid.windows(2) {
            let ((t0, e0), (t1, e1)) = (pair[0], pair[1]);
            let (above0, above1) = (e0 >= threshold_deg, e1 >= threshold_deg);
            if above0 != above1 {
                let time = self.bisect(node, station, threshold_deg, t0, t1)?;
                let kind = if above1 { EventKind::Rise } else { EventKind::Set };
                events.push(PassEvent { time, kind });
            }
        }

        for triple in grid.windows(3) {
            let ((t0, e0), (_, e1), (t2, e2)) = (triple[0], triple[1], triple[2]);
            if e0 < e1 && e1 >= e2 {
                let peak = self.culmination(node, station, t0, t2)?;
                if peak.elevation_deg >= threshold_deg {
                    events.push(PassEvent {
                        time: peak.time,
                        kind: EventKind::Culminate,
                    });
                }
            }
        }

        events.sort_by_key(|e| e.time);
        events.dedup();

        Ok(events)
    }

    fn position(&self, node: &Node, time: DateTime<Utc>) -> Result<Vector3<f64>> {
        self.propagator(node)?
            .propagate(time)
            .map(|state| state.position)
            .map_err(|e| KernelError::unavailable(&node.id, e))
    }
}
