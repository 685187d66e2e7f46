//! Availability kernel context
//!
//! Holds the node set, the station registry and a geometry provider, all
//! fixed at construction. Every query resolves ids against the loaded sets
//! and delegates to the component functions; nothing is cached between
//! calls, so one kernel can serve concurrent callers through `&self`.

use crate::availability::is_available;
use crate::config::KernelConfig;
use crate::geometry::{GeometryProvider, Sgp4Geometry};
use crate::model::{AggregationOpportunity, AvailabilityDecision, Node, VisibilityWindow};
use crate::scheduler::schedule;
use crate::snapshot::{communication_graph, visible_nodes, CommunicationGraph};
use crate::windows::visibility_windows;
use crate::{KernelError, Result};
use chrono::{DateTime, Duration, Utc};
use ground_stations::{GroundStation, StationRegistry};
use orbital_mechanics::TwoLineElement;
use std::collections::HashMap;
use tracing::info;

pub struct AvailabilityKernel<P: GeometryProvider> {
    nodes: Vec<Node>,
    node_index: HashMap<String, usize>,
    stations: StationRegistry,
    provider: P,
    config: KernelConfig,
}

impl AvailabilityKernel<Sgp4Geometry> {
    /// Build nodes `sat_0..sat_n` from a parsed catalog, in catalog order
    pub fn from_catalog(
        catalog: Vec<TwoLineElement>,
        stations: StationRegistry,
        config: KernelConfig,
    ) -> Result<Self> {
        let nodes: Vec<Node> = catalog
            .into_iter()
            .enumerate()
            .map(|(i, tle)| Node::from_tle(format!("sat_{}", i), tle))
            .collect();
        let provider = Sgp4Geometry::new(&nodes, config.event_search());
        Self::new(nodes, stations, provider, config)
    }
}

impl<P: GeometryProvider> AvailabilityKernel<P> {
    pub fn new(
        nodes: Vec<Node>,
        stations: StationRegistry,
        provider: P,
        config: KernelConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut node_index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if node_index.insert(node.id.clone(), i).is_some() {
                return Err(KernelError::DuplicateId(node.id.clone()));
            }
        }

        info!(
            "Availability kernel ready: {} nodes, {} stations",
            nodes.len(),
            stations.len()
        );

        Ok(Self {
            nodes,
            node_index,
            stations,
            provider,
            config,
        })
    }

    pub fn node(&self, id: &str) -> Result<&Node> {
        self.node_index
            .get(id)
            .map(|&i| &self.nodes[i])
            .ok_or_else(|| KernelError::node_not_found(id))
    }

    pub fn station(&self, id: &str) -> Result<&GroundStation> {
        Ok(self.stations.get(id)?)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn stations(&self) -> &StationRegistry {
        &self.stations
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Contact windows for one (node, station) pair over `[start, end]`
    pub fn get_availability_window(
        &self,
        node_id: &str,
        station_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_elevation_deg: f64,
    ) -> Result<Vec<VisibilityWindow>> {
        let node = self.node(node_id)?;
        let station = self.station(station_id)?;
        visibility_windows(
            &self.provider,
            node,
            station,
            start,
            end,
            min_elevation_deg,
            self.config.window_options(),
        )
    }

    /// Straggler filter over the configured lookahead horizon
    pub fn is_client_available(
        &self,
        node_id: &str,
        station_id: &str,
        now: DateTime<Utc>,
        required: Duration,
    ) -> Result<AvailabilityDecision> {
        let node = self.node(node_id)?;
        let station = self.station(station_id)?;
        is_available(
            &self.provider,
            node,
            station,
            now,
            required,
            self.config.min_elevation_deg,
            self.config.lookahead(),
            self.config.window_options(),
        )
    }

    pub fn get_visible_nodes(
        &self,
        station_id: &str,
        time: DateTime<Utc>,
        min_elevation_deg: f64,
    ) -> Result<Vec<String>> {
        let station = self.station(station_id)?;
        visible_nodes(&self.provider, &self.nodes, station, time, min_elevation_deg)
    }

    pub fn get_communication_graph(
        &self,
        time: DateTime<Utc>,
        max_range_km: f64,
    ) -> Result<CommunicationGraph> {
        communication_graph(&self.provider, &self.nodes, time, max_range_km)
    }

    pub fn schedule_aggregation_window(
        &self,
        station_id: &str,
        start: DateTime<Utc>,
        duration: Duration,
        min_visible_nodes: usize,
        step: Duration,
    ) -> Result<Vec<AggregationOpportunity>> {
        let station = self.station(station_id)?;
        schedule(
            &self.provider,
            &self.nodes,
            station,
            start,
            duration,
            min_visible_nodes,
            step,
            self.config.min_elevation_deg,
        )
    }
}
