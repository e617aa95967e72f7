//! Builder reference graph for one execution.
//!
//! Edges are discovered while rendering: when builder `a` materializes
//! builder `b`, the edge `a -> b` is added. An edge that would close a cycle
//! is rejected before the referenced builder starts resolving.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, VecDeque};

use super::error::ExecutionError;

#[derive(Debug, Default)]
pub struct ReferenceGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl ReferenceGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(name) {
            index
        } else {
            let index = self.graph.add_node(name.to_string());
            self.node_map.insert(name.to_string(), index);
            index
        }
    }

    /// Record that `from` reads the result of `to`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::CircularReference`] when `to` already reaches
    /// `from`, naming the full chain (`a -> b -> a`).
    pub fn add_reference(&mut self, from: &str, to: &str) -> Result<(), ExecutionError> {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);

        if let Some(path) = self.path_between(to_idx, from_idx) {
            let mut chain = vec![from.to_string()];
            chain.extend(path.into_iter().map(|idx| self.graph[idx].clone()));
            return Err(ExecutionError::CircularReference {
                chain: chain.join(" -> "),
            });
        }

        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
        Ok(())
    }

    /// Shortest path from `start` to `goal`, both ends included.
    fn path_between(&self, start: NodeIndex, goal: NodeIndex) -> Option<Vec<NodeIndex>> {
        let mut previous: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut found = start == goal;

        while !found && let Some(current) = queue.pop_front() {
            for neighbor in self.graph.neighbors(current) {
                if neighbor == start || previous.contains_key(&neighbor) {
                    continue;
                }
                previous.insert(neighbor, current);
                if neighbor == goal {
                    found = true;
                    break;
                }
                queue.push_back(neighbor);
            }
        }
        if !found {
            return None;
        }

        let mut path = vec![goal];
        let mut current = goal;
        while current != start {
            current = previous[&current];
            path.push(current);
        }
        path.reverse();
        Some(path)
    }

    /// Builders read directly by `name`.
    #[must_use]
    pub fn direct_references(&self, name: &str) -> Vec<String> {
        self.node_map
            .get(name)
            .map(|&idx| self.graph.neighbors(idx).map(|n| self.graph[n].clone()).collect())
            .unwrap_or_default()
    }

    /// Builders ordered so that every builder comes after the ones it reads.
    #[must_use]
    pub fn dependency_order(&self) -> Vec<String> {
        toposort(&self.graph, None)
            .map(|indices| indices.into_iter().rev().map(|idx| self.graph[idx].clone()).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}
