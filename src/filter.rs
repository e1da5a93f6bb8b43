use crate::graph::{CircuitGraph, GraphEdge};
use crate::types::{Location, LocationStatus, RouteRequest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

bitflags::bitflags! {
    /// Independent exclusion categories. Every violated category is
    /// recorded for an edge even when several apply; the edge counts once
    /// toward the excluded total.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Violation: u8 {
        const BANDWIDTH = 1 << 0;
        const CARRIER_MAIN = 1 << 1;
        const CARRIER_LOOP = 1 << 2;
        const MTU = 1 << 3;
        const ULL = 1 << 4;
        const EQUIPMENT = 1 << 5;
        const DECOMMISSIONED = 1 << 6;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BandwidthExclusions {
    pub count: u32,
    pub required_mbps: f64,
    pub highest_available_mbps: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarrierExclusions {
    pub count: u32,
    pub carriers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MtuExclusions {
    pub count: u32,
    pub required_mtu: u32,
    pub highest_available_mtu: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountExclusions {
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecommissionedExclusions {
    pub count: u32,
    pub locations: Vec<String>,
}

/// The explainability contract: every category is always present (a zero
/// count rather than an absent key) so totals stay checkable, and the
/// report is returned whether or not a path was ultimately found.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExclusionReport {
    pub total_routes_available: u32,
    pub total_routes_excluded: u32,
    pub bandwidth: BandwidthExclusions,
    pub carrier_avoidance: CarrierExclusions,
    pub local_loop_avoidance: CarrierExclusions,
    pub mtu: MtuExclusions,
    pub ull_restriction: CountExclusions,
    pub equipment_restriction: CountExclusions,
    pub decommissioned_pop: DecommissionedExclusions,
}

/// Bare per-category counts, used when re-examining the edges left after
/// a primary path is removed for the protection search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub bandwidth: u32,
    pub carrier_avoidance: u32,
    pub local_loop_avoidance: u32,
    pub mtu: u32,
    pub ull_restriction: u32,
    pub equipment_restriction: u32,
    pub decommissioned_pop: u32,
}

#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// Indices into the graph's edge vector that survived every category.
    pub usable: Vec<usize>,
    pub report: ExclusionReport,
}

fn in_avoid_set(avoid: &HashSet<String>, carrier: &str) -> bool {
    avoid.iter().any(|name| name.eq_ignore_ascii_case(carrier))
}

/// Categories an edge violates for this request. Checks are independent
/// so each exclusion reason is recorded even when several apply.
pub fn violations(
    edge: &GraphEdge,
    req: &RouteRequest,
    locations: &HashMap<String, Location>,
) -> Violation {
    let circuit = &edge.circuit;
    let mut mask = Violation::empty();

    if !circuit.bandwidth.meets(req.bandwidth_mbps) {
        mask |= Violation::BANDWIDTH;
    }
    if in_avoid_set(&req.avoid_carriers, &circuit.carrier) {
        mask |= Violation::CARRIER_MAIN;
    }
    let loop_hit = [&circuit.a_loop_carrier, &circuit.b_loop_carrier]
        .into_iter()
        .flatten()
        .any(|name| in_avoid_set(&req.avoid_carriers, name));
    if loop_hit {
        mask |= Violation::CARRIER_LOOP;
    }
    if circuit.mtu < req.mtu {
        mask |= Violation::MTU;
    }
    if circuit.special && !req.include_ull {
        mask |= Violation::ULL;
    }
    let cisco = circuit
        .equipment
        .as_deref()
        .map(|vendor| vendor.eq_ignore_ascii_case("cisco"))
        .unwrap_or(false);
    if cisco && !req.include_cisco {
        mask |= Violation::EQUIPMENT;
    }
    // Defense in depth: the graph builder already drops decommissioned
    // POPs, but stale upstream data must still show up in the report.
    let decommissioned = [&circuit.a_end, &circuit.b_end].into_iter().any(|code| {
        locations
            .get(code)
            .map(|location| location.status == LocationStatus::Decommissioned)
            .unwrap_or(false)
    });
    if decommissioned {
        mask |= Violation::DECOMMISSIONED;
    }

    mask
}

pub fn apply(
    graph: &CircuitGraph,
    req: &RouteRequest,
    locations: &HashMap<String, Location>,
) -> FilterOutcome {
    let mut usable = Vec::with_capacity(graph.edges.len());
    let mut report = ExclusionReport {
        total_routes_available: graph.edges.len() as u32,
        ..ExclusionReport::default()
    };
    report.bandwidth.required_mbps = req.bandwidth_mbps;
    report.mtu.required_mtu = req.mtu;

    let mut main_carriers = BTreeSet::new();
    let mut loop_carriers = BTreeSet::new();
    let mut dead_pops = BTreeSet::new();

    for (idx, edge) in graph.edges.iter().enumerate() {
        let mask = violations(edge, req, locations);
        if mask.is_empty() {
            usable.push(idx);
            continue;
        }
        report.total_routes_excluded += 1;
        let circuit = &edge.circuit;

        if mask.contains(Violation::BANDWIDTH) {
            report.bandwidth.count += 1;
            if let Some(mbps) = circuit.bandwidth.mbps() {
                let best = report.bandwidth.highest_available_mbps.unwrap_or(0.0);
                if mbps > best {
                    report.bandwidth.highest_available_mbps = Some(mbps);
                }
            }
        }
        if mask.contains(Violation::CARRIER_MAIN) {
            report.carrier_avoidance.count += 1;
            main_carriers.insert(circuit.carrier.clone());
        }
        if mask.contains(Violation::CARRIER_LOOP) {
            report.local_loop_avoidance.count += 1;
            for name in [&circuit.a_loop_carrier, &circuit.b_loop_carrier]
                .into_iter()
                .flatten()
            {
                if in_avoid_set(&req.avoid_carriers, name) {
                    loop_carriers.insert(name.clone());
                }
            }
        }
        if mask.contains(Violation::MTU) {
            report.mtu.count += 1;
            let best = report.mtu.highest_available_mtu.unwrap_or(0);
            if circuit.mtu > best {
                report.mtu.highest_available_mtu = Some(circuit.mtu);
            }
        }
        if mask.contains(Violation::ULL) {
            report.ull_restriction.count += 1;
        }
        if mask.contains(Violation::EQUIPMENT) {
            report.equipment_restriction.count += 1;
        }
        if mask.contains(Violation::DECOMMISSIONED) {
            report.decommissioned_pop.count += 1;
            for code in [&circuit.a_end, &circuit.b_end] {
                let dead = locations
                    .get(code)
                    .map(|location| location.status == LocationStatus::Decommissioned)
                    .unwrap_or(false);
                if dead {
                    dead_pops.insert(code.clone());
                }
            }
        }
    }

    report.carrier_avoidance.carriers = main_carriers.into_iter().collect();
    report.local_loop_avoidance.carriers = loop_carriers.into_iter().collect();
    report.decommissioned_pop.locations = dead_pops.into_iter().collect();

    FilterOutcome { usable, report }
}

/// Per-category exclusion counts over an arbitrary edge subset.
pub fn category_counts<'a>(
    graph: &CircuitGraph,
    edge_indices: impl Iterator<Item = &'a usize>,
    req: &RouteRequest,
    locations: &HashMap<String, Location>,
) -> CategoryCounts {
    let mut counts = CategoryCounts::default();
    for idx in edge_indices {
        let Some(edge) = graph.edges.get(*idx) else {
            continue;
        };
        let mask = violations(edge, req, locations);
        if mask.contains(Violation::BANDWIDTH) {
            counts.bandwidth += 1;
        }
        if mask.contains(Violation::CARRIER_MAIN) {
            counts.carrier_avoidance += 1;
        }
        if mask.contains(Violation::CARRIER_LOOP) {
            counts.local_loop_avoidance += 1;
        }
        if mask.contains(Violation::MTU) {
            counts.mtu += 1;
        }
        if mask.contains(Violation::ULL) {
            counts.ull_restriction += 1;
        }
        if mask.contains(Violation::EQUIPMENT) {
            counts.equipment_restriction += 1;
        }
        if mask.contains(Violation::DECOMMISSIONED) {
            counts.decommissioned_pop += 1;
        }
    }
    counts
}
