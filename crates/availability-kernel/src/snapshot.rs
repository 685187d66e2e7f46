//! Constellation Snapshot Builder
//!
//! Instantaneous views of the whole constellation: which nodes a station can
//! see, and which node pairs are within inter-satellite link range.
//!
//! Range checks are straight-line only; Earth occlusion is not modelled.
//! The pairwise scan is O(N²) per snapshot.

use crate::geometry::GeometryProvider;
use crate::model::Node;
use crate::{check_elevation, KernelError, Result};
use chrono::{DateTime, Utc};
use ground_stations::GroundStation;
use petgraph::unionfind::UnionFind;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Ids of nodes at or above `min_elevation_deg`, in load order.
///
/// Nodes whose geometry is unavailable are left out; the scan continues.
pub fn visible_nodes<P: GeometryProvider + ?Sized>(
    provider: &P,
    nodes: &[Node],
    station: &GroundStation,
    time: DateTime<Utc>,
    min_elevation_deg: f64,
) -> Result<Vec<String>> {
    check_elevation(min_elevation_deg)?;

    let visible = nodes
        .par_iter()
        .map(|node| match provider.sample(node, station, time) {
            Ok(sample) => Ok((sample.elevation_deg >= min_elevation_deg).then(|| node.id.clone())),
            Err(e) if e.is_data_unavailable() => {
                warn!("Excluding {} from snapshot at {}: {}", node.id, time, e);
                Ok(None)
            }
            Err(e) => Err(e),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(visible.into_iter().flatten().collect())
}

/// Undirected inter-node link graph at one instant
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommunicationGraph {
    pub time: DateTime<Utc>,
    pub max_range_km: f64,
    nodes: Vec<String>,
    edges: BTreeSet<(String, String)>,
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl CommunicationGraph {
    pub fn new(time: DateTime<Utc>, max_range_km: f64, nodes: Vec<String>) -> Self {
        Self {
            time,
            max_range_km,
            nodes,
            edges: BTreeSet::new(),
        }
    }

    /// Edges are stored once per unordered pair, so the graph is symmetric
    pub fn add_edge(&mut self, a: &str, b: &str) {
        if a != b {
            self.edges.insert(ordered(a, b));
        }
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.edges.contains(&ordered(a, b))
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn neighbors(&self, id: &str) -> BTreeSet<&str> {
        self.edges()
            .filter_map(|(a, b)| match (a == id, b == id) {
                (true, _) => Some(b),
                (_, true) => Some(a),
                _ => None,
            })
            .collect()
    }

    /// Adjacency map; isolated nodes map to an empty set
    pub fn adjacency(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut adjacency: BTreeMap<String, BTreeSet<String>> = self
            .nodes
            .iter()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();

        for (a, b) in &self.edges {
            adjacency.entry(a.clone()).or_default().insert(b.clone());
            adjacency.entry(b.clone()).or_default().insert(a.clone());
        }
        adjacency
    }

    /// Relay clusters: nodes that can reach each other over one or more links.
    /// Components keep load order and are sorted by their first member.
    pub fn connected_components(&self) -> Vec<Vec<String>> {
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut sets = UnionFind::<usize>::new(self.nodes.len());
        for (a, b) in self.edges() {
            if let (Some(&ia), Some(&ib)) = (index.get(a), index.get(b)) {
                sets.union(ia, ib);
            }
        }

        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        let mut first_member: HashMap<usize, usize> = HashMap::new();
        for (i, id) in self.nodes.iter().enumerate() {
            let root = sets.find(i);
            let key = *first_member.entry(root).or_insert(i);
            groups.entry(key).or_default().push(id.clone());
        }
        groups.into_values().collect()
    }
}

/// Link graph over every unordered node pair within `max_range_km`.
///
/// Pairs whose geometry is unavailable are left out; the scan continues.
pub fn communication_graph<P: GeometryProvider + ?Sized>(
    provider: &P,
    nodes: &[Node],
    time: DateTime<Utc>,
    max_range_km: f64,
) -> Result<CommunicationGraph> {
    if !max_range_km.is_finite() || max_range_km < 0.0 {
        return Err(KernelError::InvalidRange(format!(
            "max range {} km must be finite and non-negative",
            max_range_km
        )));
    }

    let n = nodes.len();
    let links = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| (i + 1..n).map(move |j| (i, j)))
        .map(|(i, j)| {
            let (a, b) = (&nodes[i], &nodes[j]);
            match provider.range_between(a, b, time) {
                Ok(range_km) => Ok((range_km <= max_range_km).then_some((i, j))),
                Err(e) if e.is_data_unavailable() => {
                    warn!("Excluding pair {}-{} at {}: {}", a.id, b.id, time, e);
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let mut graph =
        CommunicationGraph::new(time, max_range_km, nodes.iter().map(|n| n.id.clone()).collect());
    for (i, j) in links.into_iter().flatten() {
        graph.add_edge(&nodes[i].id, &nodes[j].id);
    }

    debug!(
        "Communication graph at {}: {} nodes, {} links within {} km",
        time,
        n,
        graph.edge_count(),
        max_range_km
    );

    Ok(graph)
}
