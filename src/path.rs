use crate::errors::EngineError;
use crate::filter::{self, CategoryCounts, FilterOutcome};
use crate::graph::CircuitGraph;
use crate::types::{Location, PathResult, PathSegment, PathType, RouteRequest};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionFailureKind {
    SourceIsolated,
    DestinationIsolated,
    NoDisjointPath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionFailure {
    pub kind: ProtectionFailureKind,
    /// Edges of the base graph left once the primary path is removed.
    pub remaining_edges: u32,
    /// Of those, how many each original constraint category still
    /// excludes; shows whether relaxing one constraint could plausibly
    /// unlock a protection path.
    pub still_excluded: CategoryCounts,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionStatus {
    pub required: bool,
    pub available: bool,
    pub failure: Option<ProtectionFailure>,
}

#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub primary: PathResult,
    pub protection: Option<PathResult>,
    pub protection_status: Option<ProtectionStatus>,
}

/// Heap entry ordered for a min-heap over (latency, hops, ordered node
/// codes); the lexicographic component makes equal-cost output
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeapEntry {
    latency_us: u64,
    hops: u32,
    nodes: Vec<String>,
    edges: Vec<usize>,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .latency_us
            .cmp(&self.latency_us)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.nodes.cmp(&self.nodes))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn latency_micros(latency_ms: f64) -> u64 {
    (latency_ms * 1000.0).round() as u64
}

struct SearchHit {
    result: PathResult,
    edge_indices: Vec<usize>,
}

fn search(
    graph: &CircuitGraph,
    usable: &HashSet<usize>,
    source: &str,
    destination: &str,
    path_type: PathType,
) -> Option<SearchHit> {
    if !graph.contains_node(source) || !graph.contains_node(destination) {
        return None;
    }

    let mut heap = BinaryHeap::new();
    let mut settled: HashSet<String> = HashSet::new();
    heap.push(HeapEntry {
        latency_us: 0,
        hops: 0,
        nodes: vec![source.to_string()],
        edges: Vec::new(),
    });

    while let Some(entry) = heap.pop() {
        let node = entry.nodes.last()?.clone();
        if !settled.insert(node.clone()) {
            continue;
        }
        if node == destination {
            return Some(materialize(graph, entry, path_type));
        }
        let Some(adjacent) = graph.adjacency.get(node.as_str()) else {
            continue;
        };
        for idx in adjacent.iter().copied() {
            if !usable.contains(&idx) {
                continue;
            }
            let edge = &graph.edges[idx];
            let next = edge.other_end(&node);
            if settled.contains(next) || entry.nodes.iter().any(|seen| seen == next) {
                continue;
            }
            let mut nodes = entry.nodes.clone();
            nodes.push(next.to_string());
            let mut edges = entry.edges.clone();
            edges.push(idx);
            heap.push(HeapEntry {
                latency_us: entry.latency_us + latency_micros(edge.circuit.latency_ms),
                hops: entry.hops + 1,
                nodes,
                edges,
            });
        }
    }

    None
}

fn materialize(graph: &CircuitGraph, entry: HeapEntry, path_type: PathType) -> SearchHit {
    let mut segments = Vec::with_capacity(entry.edges.len());
    let mut total_latency_ms = 0.0;
    for (hop, idx) in entry.edges.iter().enumerate() {
        let circuit = &graph.edges[*idx].circuit;
        total_latency_ms += circuit.latency_ms;
        segments.push(PathSegment {
            circuit_id: circuit.id.clone(),
            from: entry.nodes[hop].clone(),
            to: entry.nodes[hop + 1].clone(),
            latency_ms: circuit.latency_ms,
            bandwidth: circuit.bandwidth,
            carrier: circuit.carrier.clone(),
            special: circuit.special,
            monthly_cost: circuit.monthly_cost,
            cost_currency: circuit.cost_currency.clone(),
        });
    }
    let hop_count = segments.len() as u32;
    SearchHit {
        result: PathResult {
            path_type,
            segments,
            nodes: entry.nodes,
            total_latency_ms,
            hop_count,
        },
        edge_indices: entry.edges,
    }
}

/// Lowest-latency path over the filtered edge set, or nothing when the
/// endpoints are disconnected.
pub fn shortest_path(
    graph: &CircuitGraph,
    usable: &HashSet<usize>,
    source: &str,
    destination: &str,
    path_type: PathType,
) -> Option<PathResult> {
    search(graph, usable, source, destination, path_type).map(|hit| hit.result)
}

/// Primary search plus, when requested, the edge-disjoint protection
/// search. A missing protection path is a flagged result state, never an
/// error: the primary is still returned.
pub fn find_route(
    graph: &CircuitGraph,
    filtered: &FilterOutcome,
    req: &RouteRequest,
    locations: &HashMap<String, Location>,
) -> Result<RouteOutcome, EngineError> {
    let usable: HashSet<usize> = filtered.usable.iter().copied().collect();

    let primary = search(graph, &usable, &req.source, &req.destination, PathType::Primary)
        .ok_or_else(|| EngineError::NoRouteFound {
            from: req.source.clone(),
            to: req.destination.clone(),
            exclusions: Box::new(filtered.report.clone()),
        })?;

    if !req.protection_required {
        return Ok(RouteOutcome {
            primary: primary.result,
            protection: None,
            protection_status: None,
        });
    }

    let primary_edges: HashSet<usize> = primary.edge_indices.iter().copied().collect();
    let survivors: HashSet<usize> = usable
        .iter()
        .copied()
        .filter(|idx| !primary_edges.contains(idx))
        .collect();

    match search(
        graph,
        &survivors,
        &req.source,
        &req.destination,
        PathType::Protection,
    ) {
        Some(protection) => Ok(RouteOutcome {
            primary: primary.result,
            protection: Some(protection.result),
            protection_status: Some(ProtectionStatus {
                required: true,
                available: true,
                failure: None,
            }),
        }),
        None => {
            let post_removal: Vec<usize> = (0..graph.edges.len())
                .filter(|idx| !primary_edges.contains(idx))
                .collect();
            let still_excluded =
                filter::category_counts(graph, post_removal.iter(), req, locations);
            let kind = classify_isolation(graph, &survivors, &req.source, &req.destination);
            Ok(RouteOutcome {
                primary: primary.result,
                protection: None,
                protection_status: Some(ProtectionStatus {
                    required: true,
                    available: false,
                    failure: Some(ProtectionFailure {
                        kind,
                        remaining_edges: post_removal.len() as u32,
                        still_excluded,
                    }),
                }),
            })
        }
    }
}

fn classify_isolation(
    graph: &CircuitGraph,
    survivors: &HashSet<usize>,
    source: &str,
    destination: &str,
) -> ProtectionFailureKind {
    let touches = |code: &str| {
        survivors
            .iter()
            .any(|idx| graph.edges[*idx].touches(code))
    };
    if !touches(source) {
        ProtectionFailureKind::SourceIsolated
    } else if !touches(destination) {
        ProtectionFailureKind::DestinationIsolated
    } else {
        ProtectionFailureKind::NoDisjointPath
    }
}
