//! Graph traversals.

use super::graph::{Direction, Graph};
use super::types::EdgeType;
use crate::error::{GraphError, Result};
use std::collections::{HashSet, VecDeque};

/// Breadth-First Search traversal from a starting node.
///
/// # Parameters
/// - `graph`: The graph to traverse
/// - `start`: Starting node id
/// - `direction`: Follow outgoing or incoming edges
/// - `max_depth`: Optional maximum depth (None for unlimited)
/// - `edge_types`: Only follow these edge types (None for all)
///
/// # Returns
/// Visited node ids in visit order, starting with `start`
pub fn bfs(
    graph: &Graph,
    start: &str,
    direction: Direction,
    max_depth: Option<usize>,
    edge_types: Option<&[EdgeType]>,
) -> Result<Vec<String>> {
    if !graph.has_node(start) {
        return Err(GraphError::node_not_found(start));
    }

    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    let mut result = Vec::new();

    visited.insert(start.to_string());
    queue.push_back((start.to_string(), 0usize));

    while let Some((current, depth)) = queue.pop_front() {
        result.push(current.clone());

        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }

        let mut neighbors = graph.neighbors(&current, direction, edge_types);
        neighbors.sort_unstable();
        for neighbor in neighbors {
            if visited.insert(neighbor.to_string()) {
                queue.push_back((neighbor.to_string(), depth + 1));
            }
        }
    }

    Ok(result)
}

/// Depth-First Search traversal from a starting node (iterative).
///
/// Same parameters and result shape as [`bfs`].
pub fn dfs(
    graph: &Graph,
    start: &str,
    direction: Direction,
    max_depth: Option<usize>,
    edge_types: Option<&[EdgeType]>,
) -> Result<Vec<String>> {
    if !graph.has_node(start) {
        return Err(GraphError::node_not_found(start));
    }

    let mut visited = HashSet::new();
    let mut stack = vec![(start.to_string(), 0usize)];
    let mut result = Vec::new();

    while let Some((current, depth)) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        result.push(current.clone());

        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }

        let mut neighbors = graph.neighbors(&current, direction, edge_types);
        // reverse-sorted so the smallest id is explored first
        neighbors.sort_unstable_by(|a, b| b.cmp(a));
        for neighbor in neighbors {
            if !visited.contains(neighbor) {
                stack.push((neighbor.to_string(), depth + 1));
            }
        }
    }

    Ok(result)
}
