//! Weighted undirected graph over named positions.
//!
//! Nodes are position names of a single device. Edges mark legal transitions
//! and are stored in both directions. Parallel edges are kept; queries use the
//! cheapest one.

use station_core::{StationError, StationResult};
use std::collections::HashMap;

/// Motion graph for one device.
#[derive(Debug, Clone, Default)]
pub struct MotionGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    adjacency: Vec<Vec<(usize, f64)>>,
    edge_count: usize,
}

impl MotionGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node without edges. Returns its index.
    pub fn add_node(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), i);
        self.adjacency.push(Vec::new());
        i
    }

    /// Add an undirected edge. Unknown endpoints become nodes.
    ///
    /// Negative or non-finite weights are rejected.
    pub fn add_edge(&mut self, from: &str, to: &str, weight: f64) -> StationResult<()> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(StationError::Configuration(format!(
                "Edge '{}' - '{}' has invalid weight {}",
                from, to, weight
            )));
        }
        let a = self.add_node(from);
        let b = self.add_node(to);
        self.adjacency[a].push((b, weight));
        self.adjacency[b].push((a, weight));
        self.edge_count += 1;
        Ok(())
    }

    /// True if `name` is a node.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Number of edges as inserted.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Adjacent nodes with edge weights, in insertion order.
    pub fn neighbors(&self, name: &str) -> Vec<(&str, f64)> {
        self.index
            .get(name)
            .map(|&i| {
                self.adjacency[i]
                    .iter()
                    .map(|&(j, w)| (self.names[j].as_str(), w))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cheapest direct edge between two nodes.
    fn edge_weight(&self, a: usize, b: usize) -> Option<f64> {
        self.adjacency[a]
            .iter()
            .filter(|&&(j, _)| j == b)
            .map(|&(_, w)| w)
            .min_by(f64::total_cmp)
    }

    /// Total weight along `path`, or `None` if two consecutive nodes are not
    /// adjacent.
    pub fn path_cost(&self, path: &[String]) -> Option<f64> {
        let mut total = 0.0;
        for pair in path.windows(2) {
            let a = *self.index.get(&pair[0])?;
            let b = *self.index.get(&pair[1])?;
            total += self.edge_weight(a, b)?;
        }
        Some(total)
    }

    /// Dijkstra shortest path from `start` to `end`.
    ///
    /// The frontier keeps nodes in the order they were discovered, and among
    /// equal tentative distances the earliest discovered node is settled
    /// first. Returns `None` when either node is unknown or `end` is
    /// unreachable. `start == end` yields `[start]`.
    pub fn shortest_path(&self, start: &str, end: &str) -> Option<Vec<String>> {
        let &source = self.index.get(start)?;
        let &target = self.index.get(end)?;

        let n = self.names.len();
        let mut distance = vec![f64::INFINITY; n];
        let mut previous: Vec<Option<usize>> = vec![None; n];
        let mut visited = vec![false; n];
        let mut frontier = vec![source];
        distance[source] = 0.0;

        while !frontier.is_empty() {
            let mut best = 0;
            for (slot, &node) in frontier.iter().enumerate() {
                if distance[node] < distance[frontier[best]] {
                    best = slot;
                }
            }
            let current = frontier.remove(best);
            if current == target {
                break;
            }
            visited[current] = true;

            for &(next, weight) in &self.adjacency[current] {
                if visited[next] {
                    continue;
                }
                let candidate = distance[current] + weight;
                if candidate < distance[next] {
                    if distance[next].is_infinite() {
                        frontier.push(next);
                    }
                    distance[next] = candidate;
                    previous[next] = Some(current);
                }
            }
        }

        if distance[target].is_infinite() {
            return None;
        }

        let mut path = vec![self.names[target].clone()];
        let mut node = target;
        while let Some(prev) = previous[node] {
            path.push(self.names[prev].clone());
            node = prev;
        }
        path.reverse();
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MotionGraph {
        let mut g = MotionGraph::new();
        g.add_edge("Home", "A", 1.0).unwrap();
        g.add_edge("A", "B", 1.0).unwrap();
        g.add_edge("Home", "B", 5.0).unwrap();
        g.add_edge("B", "C", 2.0).unwrap();
        g.add_node("Island");
        g
    }

    #[test]
    fn test_shortest_path_prefers_lower_cost() {
        let g = sample();
        let path = g.shortest_path("Home", "B").unwrap();
        assert_eq!(path, vec!["Home", "A", "B"]);
        assert_eq!(g.path_cost(&path), Some(2.0));
    }

    #[test]
    fn test_edges_are_undirected() {
        let g = sample();
        assert_eq!(g.shortest_path("C", "Home").unwrap(), vec!["C", "B", "A", "Home"]);
    }

    #[test]
    fn test_trivial_and_missing_paths() {
        let g = sample();
        assert_eq!(g.shortest_path("A", "A").unwrap(), vec!["A"]);
        assert!(g.shortest_path("Home", "Island").is_none());
        assert!(g.shortest_path("Home", "Nowhere").is_none());
        assert!(g.shortest_path("Nowhere", "Home").is_none());
    }

    #[test]
    fn test_ties_follow_discovery_order() {
        let mut g = MotionGraph::new();
        g.add_edge("S", "L", 1.0).unwrap();
        g.add_edge("S", "R", 1.0).unwrap();
        g.add_edge("L", "T", 1.0).unwrap();
        g.add_edge("R", "T", 1.0).unwrap();
        assert_eq!(g.shortest_path("S", "T").unwrap(), vec!["S", "L", "T"]);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let mut g = MotionGraph::new();
        assert!(g.add_edge("A", "B", -1.0).is_err());
        assert!(g.add_edge("A", "B", f64::NAN).is_err());
        assert!(g.add_edge("A", "B", f64::INFINITY).is_err());
        assert_eq!(g.node_count(), 0);
        assert!(g.add_edge("A", "B", 0.0).is_ok());
    }

    #[test]
    fn test_parallel_edges_use_cheapest() {
        let mut g = MotionGraph::new();
        g.add_edge("A", "B", 3.0).unwrap();
        g.add_edge("A", "B", 1.5).unwrap();
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.neighbors("A").len(), 2);
        assert_eq!(g.path_cost(&["A".to_string(), "B".to_string()]), Some(1.5));
    }

    #[test]
    fn test_path_cost_rejects_non_adjacent() {
        let g = sample();
        assert_eq!(g.path_cost(&["Home".to_string(), "C".to_string()]), None);
        assert_eq!(g.path_cost(&["Home".to_string()]), Some(0.0));
    }
}
