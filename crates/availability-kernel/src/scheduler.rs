//! Aggregation-Opportunity Scheduler
//!
//! Samples `[start, start + duration)` at a fixed cadence and reports every
//! instant where at least `min_visible_nodes` nodes are visible from the
//! aggregator station. Qualifying samples are never merged: each answers
//! "can we aggregate at this instant", not "for how long".

use crate::geometry::GeometryProvider;
use crate::model::{AggregationOpportunity, Node};
use crate::snapshot::visible_nodes;
use crate::{KernelError, Result};
use chrono::{DateTime, Duration, Utc};
use ground_stations::GroundStation;
use rayon::prelude::*;
use tracing::info;

#[allow(clippy::too_many_arguments)]
pub fn schedule<P: GeometryProvider + ?Sized>(
    provider: &P,
    nodes: &[Node],
    station: &GroundStation,
    start: DateTime<Utc>,
    duration: Duration,
    min_visible_nodes: usize,
    step: Duration,
    min_elevation_deg: f64,
) -> Result<Vec<AggregationOpportunity>> {
    if duration <= Duration::zero() {
        return Err(KernelError::InvalidRange(format!(
            "scan duration {} must be positive",
            duration
        )));
    }
    if step < Duration::milliseconds(1) {
        return Err(KernelError::InvalidRange(format!(
            "scan step {} must be positive",
            step
        )));
    }

    if start.checked_add_signed(duration).is_none() {
        return Err(KernelError::InvalidRange(format!(
            "scan of {} from {} is out of range",
            duration, start
        )));
    }

    let step_ms = step.num_milliseconds();
    let span_ms = duration.num_milliseconds();
    let samples = (span_ms / step_ms + i64::from(span_ms % step_ms != 0)) as usize;

    let opportunities: Vec<AggregationOpportunity> = (0..samples)
        .into_par_iter()
        .map(|k| {
            let time = start + Duration::milliseconds(step_ms * k as i64);
            let node_ids = visible_nodes(provider, nodes, station, time, min_elevation_deg)?;
            Ok((node_ids.len() >= min_visible_nodes).then(|| AggregationOpportunity {
                time,
                visible_count: node_ids.len(),
                node_ids,
            }))
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();

    info!(
        "{} of {} samples at {} have >= {} visible nodes",
        opportunities.len(),
        samples,
        station.id,
        min_visible_nodes
    );

    Ok(opportunities)
}
