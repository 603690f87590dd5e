//! Directed acyclic graph of intra-bundle resource dependencies
//!
//! Vertices are resource names; an edge runs from an upstream resource to the
//! resource consuming its outputs. The topological order is stable: ties
//! between incomparable vertices are broken lexicographically, which is part
//! of the scheduling contract rather than an implementation detail.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Errors raised while building or sorting the graph
#[derive(Error, Debug)]
pub enum DagError {
    /// An edge references a vertex that was never added
    #[error("vertex '{0}' is not part of the graph")]
    UnknownVertex(String),

    /// The graph contains at least one cycle
    #[error("dependency cycle involving: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Adjacency-list digraph keyed by vertex name
#[derive(Debug, Default)]
pub struct Dag {
    vertices: BTreeSet<String>,
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl Dag {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vertex; adding the same name twice is a no-op
    pub fn add_vertex(&mut self, name: impl Into<String>) {
        self.vertices.insert(name.into());
    }

    /// Add an edge from `from` to `to`; both vertices must already exist
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), DagError> {
        if !self.vertices.contains(from) {
            return Err(DagError::UnknownVertex(from.to_string()));
        }
        if !self.vertices.contains(to) {
            return Err(DagError::UnknownVertex(to.to_string()));
        }
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        Ok(())
    }

    /// Number of vertices in the graph
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the graph has no vertices
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Kahn's algorithm with a lexicographic tiebreak among ready vertices
    pub fn stable_topological_sort(&self) -> Result<Vec<String>, DagError> {
        let mut indegree: BTreeMap<&str, usize> =
            self.vertices.iter().map(|v| (v.as_str(), 0)).collect();
        for targets in self.edges.values() {
            for target in targets {
                if let Some(count) = indegree.get_mut(target.as_str()) {
                    *count += 1;
                }
            }
        }

        let mut ready: BTreeSet<&str> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(vertex, _)| *vertex)
            .collect();

        let mut order = Vec::with_capacity(self.vertices.len());
        while let Some(&next) = ready.iter().next() {
            ready.remove(next);
            order.push(next.to_string());
            if let Some(targets) = self.edges.get(next) {
                for target in targets {
                    if let Some(count) = indegree.get_mut(target.as_str()) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(target.as_str());
                        }
                    }
                }
            }
        }

        if order.len() != self.vertices.len() {
            let remaining: Vec<String> = indegree
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(vertex, _)| vertex.to_string())
                .collect();
            return Err(DagError::Cycle(remaining));
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_vertices_sort_by_name() {
        let mut dag = Dag::new();
        dag.add_vertex("c");
        dag.add_vertex("a");
        dag.add_vertex("b");
        assert_eq!(dag.stable_topological_sort().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn edges_order_dependents_after_dependencies() {
        let mut dag = Dag::new();
        dag.add_vertex("a");
        dag.add_vertex("b");
        dag.add_vertex("c");
        dag.add_edge("c", "a").unwrap();
        dag.add_edge("a", "b").unwrap();
        assert_eq!(dag.stable_topological_sort().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn order_is_stable_under_insertion_order() {
        let mut first = Dag::new();
        for v in ["x", "m", "a"] {
            first.add_vertex(v);
        }
        first.add_edge("m", "x").unwrap();

        let mut second = Dag::new();
        for v in ["a", "x", "m"] {
            second.add_vertex(v);
        }
        second.add_edge("m", "x").unwrap();

        assert_eq!(
            first.stable_topological_sort().unwrap(),
            second.stable_topological_sort().unwrap()
        );
    }

    #[test]
    fn diamond_orders_deterministically() {
        let mut dag = Dag::new();
        for v in ["a", "b", "c", "d"] {
            dag.add_vertex(v);
        }
        dag.add_edge("a", "b").unwrap();
        dag.add_edge("a", "c").unwrap();
        dag.add_edge("b", "d").unwrap();
        dag.add_edge("c", "d").unwrap();
        assert_eq!(
            dag.stable_topological_sort().unwrap(),
            vec!["a", "b", "c", "d"]
        );
    }

    #[test]
    fn cycle_is_rejected() {
        let mut dag = Dag::new();
        dag.add_vertex("a");
        dag.add_vertex("b");
        dag.add_edge("a", "b").unwrap();
        dag.add_edge("b", "a").unwrap();
        match dag.stable_topological_sort() {
            Err(DagError::Cycle(members)) => {
                assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn edge_to_unknown_vertex_is_rejected() {
        let mut dag = Dag::new();
        dag.add_vertex("a");
        assert!(matches!(
            dag.add_edge("missing", "a"),
            Err(DagError::UnknownVertex(name)) if name == "missing"
        ));
    }
}
