use crate::types::{Circuit, Location, LocationStatus};
use smallvec::SmallVec;
use std::collections::HashMap;

/// One usable direction-agnostic edge: the circuit's full attribute set
/// plus both endpoint codes (already on the circuit itself).
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub circuit: Circuit,
}

impl GraphEdge {
    pub fn touches(&self, code: &str) -> bool {
        self.circuit.a_end == code || self.circuit.b_end == code
    }

    pub fn other_end(&self, code: &str) -> &str {
        if self.circuit.a_end == code {
            &self.circuit.b_end
        } else {
            &self.circuit.a_end
        }
    }
}

/// In-memory adjacency structure keyed by location code. Rebuilt per
/// request from the current dataset snapshot; decommissioned locations
/// never enter the graph, neither as nodes nor through edges.
#[derive(Debug, Clone, Default)]
pub struct CircuitGraph {
    pub adjacency: HashMap<String, SmallVec<[usize; 8]>>,
    pub edges: Vec<GraphEdge>,
}

impl CircuitGraph {
    pub fn build(locations: &HashMap<String, Location>, circuits: &[Circuit]) -> Self {
        let mut graph = CircuitGraph::default();
        for location in locations.values() {
            if location.status != LocationStatus::Decommissioned {
                graph.adjacency.entry(location.code.clone()).or_default();
            }
        }

        for circuit in circuits {
            let a_end = match locations.get(&circuit.a_end) {
                Some(location) => location,
                None => {
                    tracing::warn!(
                        circuit = circuit.id,
                        code = circuit.a_end,
                        "circuit references unknown location; skipping"
                    );
                    continue;
                }
            };
            let b_end = match locations.get(&circuit.b_end) {
                Some(location) => location,
                None => {
                    tracing::warn!(
                        circuit = circuit.id,
                        code = circuit.b_end,
                        "circuit references unknown location; skipping"
                    );
                    continue;
                }
            };
            if a_end.status == LocationStatus::Decommissioned
                || b_end.status == LocationStatus::Decommissioned
            {
                continue;
            }
            if circuit.latency_ms < 0.0 {
                tracing::warn!(circuit = circuit.id, "negative latency; skipping");
                continue;
            }

            let idx = graph.edges.len();
            graph.edges.push(GraphEdge {
                circuit: circuit.clone(),
            });
            graph
                .adjacency
                .entry(circuit.a_end.clone())
                .or_default()
                .push(idx);
            graph
                .adjacency
                .entry(circuit.b_end.clone())
                .or_default()
                .push(idx);
        }

        graph
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, code: &str) -> bool {
        self.adjacency.contains_key(code)
    }
}
