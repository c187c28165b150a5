//! Changesets between two versions of a graph.

use super::edge::{Edge, EdgeKey};
use super::graph::Graph;
use super::node::Node;
use super::types::EdgeType;
use crate::error::{GraphError, Result};
use crate::storage::StorageAdapter;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// An edge deletion: exact `(source, target, type)` or, with no type, every
/// edge between the pair (the `"*"` wildcard).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeSelector {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Edge type, `None` for any
    #[serde(rename = "type", with = "wildcard_type")]
    pub edge_type: Option<EdgeType>,
}

impl EdgeSelector {
    /// Select exactly one edge.
    pub fn exact(key: &EdgeKey) -> Self {
        Self {
            source: key.source.clone(),
            target: key.target.clone(),
            edge_type: Some(key.edge_type),
        }
    }

    /// Select every edge between two nodes.
    pub fn any(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type: None,
        }
    }
}

impl fmt::Display for EdgeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.edge_type {
            Some(t) => write!(f, "({}, {}, {t})", self.source, self.target),
            None => write!(f, "({}, {}, *)", self.source, self.target),
        }
    }
}

mod wildcard_type {
    use super::EdgeType;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(edge_type: &Option<EdgeType>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(edge_type.map(|t| t.as_str()).unwrap_or("*"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<EdgeType>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw == "*" {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

/// A set of node and edge changes.
///
/// Applied in a fixed order so that no edge dangles mid-application:
/// delete edges, delete nodes, upsert added nodes, upsert updated nodes,
/// add edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDelta {
    /// Nodes that did not exist before
    pub added_nodes: Vec<Node>,
    /// Nodes whose properties changed
    pub updated_nodes: Vec<Node>,
    /// Ids of nodes to remove
    pub deleted_nodes: BTreeSet<String>,
    /// Edges to insert
    pub added_edges: Vec<Edge>,
    /// Edges to remove
    pub deleted_edges: BTreeSet<EdgeSelector>,
}

impl GraphDelta {
    /// Create an empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff two graphs.
    ///
    /// Node ids only in `new` are added, only in `old` deleted; ids in both
    /// whose merged properties differ are updated. Edges are compared by
    /// `(source, target, type)` identity.
    pub fn between(old: &Graph, new: &Graph) -> Self {
        let mut delta = GraphDelta::new();

        for node in new.nodes() {
            match old.get_node(&node.id) {
                None => delta.added_nodes.push(node.clone()),
                Some(previous) if !previous.same_content(node) => {
                    delta.updated_nodes.push(node.clone())
                }
                Some(_) => {}
            }
        }
        for node in old.nodes() {
            if !new.has_node(&node.id) {
                delta.deleted_nodes.insert(node.id.clone());
            }
        }

        for edge in new.edges() {
            if !old.has_edge(&edge.key()) {
                delta.added_edges.push(edge.clone());
            }
        }
        for edge in old.edges() {
            let key = edge.key();
            if !new.has_edge(&key) {
                delta.deleted_edges.insert(EdgeSelector::exact(&key));
            }
        }

        delta.sort();
        delta
    }

    /// Delta that removes every node and edge of `graph`.
    pub fn removing(graph: &Graph) -> Self {
        let mut delta = GraphDelta::new();
        delta.deleted_nodes = graph.nodes().map(|n| n.id.clone()).collect();
        delta.deleted_edges = graph.edges().map(|e| EdgeSelector::exact(&e.key())).collect();
        delta
    }

    fn sort(&mut self) {
        self.added_nodes.sort_by(|a, b| a.id.cmp(&b.id));
        self.updated_nodes.sort_by(|a, b| a.id.cmp(&b.id));
        self.added_edges.sort_by_key(|e| e.key());
    }

    /// Record a node addition.
    pub fn add_node(&mut self, node: Node) {
        self.added_nodes.push(node);
    }

    /// Record a node update.
    pub fn update_node(&mut self, node: Node) {
        self.updated_nodes.push(node);
    }

    /// Record a node deletion.
    pub fn delete_node(&mut self, id: impl Into<String>) {
        self.deleted_nodes.insert(id.into());
    }

    /// Record an edge addition.
    pub fn add_edge(&mut self, edge: Edge) {
        self.added_edges.push(edge);
    }

    /// Record an edge deletion.
    pub fn delete_edge(&mut self, selector: EdgeSelector) {
        self.deleted_edges.insert(selector);
    }

    /// True when the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.updated_nodes.is_empty()
            && self.deleted_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.deleted_edges.is_empty()
    }

    /// Total number of recorded changes.
    pub fn change_count(&self) -> usize {
        self.added_nodes.len()
            + self.updated_nodes.len()
            + self.deleted_nodes.len()
            + self.added_edges.len()
            + self.deleted_edges.len()
    }

    /// Apply to an in-memory graph.
    ///
    /// Edges whose endpoints are still missing after the node phase are
    /// logged and skipped.
    pub fn apply_to(&self, graph: &mut Graph) {
        for selector in &self.deleted_edges {
            match selector.edge_type {
                Some(edge_type) => {
                    graph.remove_edge(&EdgeKey::new(
                        selector.source.clone(),
                        selector.target.clone(),
                        edge_type,
                    ));
                }
                None => {
                    graph.remove_edges_between(&selector.source, &selector.target);
                }
            }
        }

        for id in &self.deleted_nodes {
            graph.remove_node(id);
        }

        for node in self.added_nodes.iter().chain(&self.updated_nodes) {
            graph.add_node(node.clone());
        }

        for edge in &self.added_edges {
            if let Err(e) = graph.add_edge(edge.clone()) {
                debug!("Skipping delta edge {}: {e}", edge.key());
            }
        }
    }

    /// Apply to a storage backend, in the same order as [`GraphDelta::apply_to`].
    ///
    /// Not transactional by itself; callers wrap it in
    /// [`crate::storage::StorageExt::transaction`].
    pub fn apply_to_storage(&self, storage: &dyn StorageAdapter) -> Result<()> {
        for selector in &self.deleted_edges {
            storage.delete_edge(&selector.source, &selector.target, selector.edge_type)?;
        }

        for id in &self.deleted_nodes {
            match storage.delete_node(id) {
                Ok(()) | Err(GraphError::NodeNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        for node in self.added_nodes.iter().chain(&self.updated_nodes) {
            storage.save_node(node)?;
        }

        for edge in &self.added_edges {
            storage.save_edge(edge)?;
        }

        Ok(())
    }
}

impl fmt::Display for GraphDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} ~{} -{} nodes, +{} -{} edges",
            self.added_nodes.len(),
            self.updated_nodes.len(),
            self.deleted_nodes.len(),
            self.added_edges.len(),
            self.deleted_edges.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::{FunctionNode, NodeKind};

    fn func(name: &str, complexity: i64) -> Node {
        Node::from_kind(
            NodeKind::Function(FunctionNode::new(name, name, 1, 5).with_complexity(complexity)),
            Some("a.py"),
        )
    }

    fn graph_of(nodes: &[Node], edges: &[(&str, &str)]) -> Graph {
        let mut graph = Graph::new();
        for node in nodes {
            graph.add_node(node.clone());
        }
        for (s, t) in edges {
            graph
                .add_edge(Edge::of_type(
                    format!("function:a.py:{s}"),
                    format!("function:a.py:{t}"),
                    EdgeType::Calls,
                ))
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_between_classifies_changes() {
        let old = graph_of(&[func("f", 1), func("g", 1), func("h", 1)], &[("f", "g")]);
        let new = graph_of(&[func("f", 1), func("g", 9), func("k", 1)], &[("f", "k")]);

        let delta = GraphDelta::between(&old, &new);

        assert_eq!(delta.added_nodes.len(), 1);
        assert_eq!(delta.added_nodes[0].id, "function:a.py:k");
        assert_eq!(delta.updated_nodes.len(), 1);
        assert_eq!(delta.updated_nodes[0].id, "function:a.py:g");
        assert!(delta.deleted_nodes.contains("function:a.py:h"));
        assert_eq!(delta.added_edges.len(), 1);
        assert_eq!(delta.deleted_edges.len(), 1);
        assert_eq!(delta.to_string(), "+1 ~1 -1 nodes, +1 -1 edges");
    }

    #[test]
    fn test_apply_between_reproduces_new_graph() {
        let old = graph_of(&[func("f", 1), func("g", 1), func("h", 1)], &[("f", "g"), ("g", "h")]);
        let new = graph_of(&[func("f", 2), func("g", 1), func("k", 1)], &[("f", "k"), ("f", "g")]);

        let mut graph = old.clone();
        GraphDelta::between(&old, &new).apply_to(&mut graph);

        assert_eq!(graph.node_ids(), new.node_ids());
        assert_eq!(graph.edge_keys(), new.edge_keys());
        assert_eq!(
            graph.get_node("function:a.py:f").unwrap().property("complexity"),
            Some(2i64.into())
        );
    }

    #[test]
    fn test_delete_then_readd_same_node() {
        let mut graph = graph_of(&[func("f", 1)], &[]);
        let mut delta = GraphDelta::new();
        delta.delete_node("function:a.py:f");
        delta.add_node(func("f", 7));

        delta.apply_to(&mut graph);

        assert_eq!(graph.node_count(), 1);
        assert_eq!(
            graph.get_node("function:a.py:f").unwrap().property("complexity"),
            Some(7i64.into())
        );
    }

    #[test]
    fn test_wildcard_edge_delete() {
        let mut graph = graph_of(&[func("f", 1), func("g", 1)], &[("f", "g")]);
        graph
            .add_edge(Edge::of_type("function:a.py:f", "function:a.py:g", EdgeType::References))
            .unwrap();

        let mut delta = GraphDelta::new();
        delta.delete_edge(EdgeSelector::any("function:a.py:f", "function:a.py:g"));
        delta.apply_to(&mut graph);

        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_dangling_added_edge_is_skipped() {
        let mut graph = graph_of(&[func("f", 1)], &[]);
        let mut delta = GraphDelta::new();
        delta.add_edge(Edge::of_type("function:a.py:f", "function:a.py:missing", EdgeType::Calls));
        delta.add_node(func("g", 1));
        delta.add_edge(Edge::of_type("function:a.py:f", "function:a.py:g", EdgeType::Calls));

        delta.apply_to(&mut graph);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_selector_wire_form() {
        let json = serde_json::to_string(&EdgeSelector::any("a", "b")).unwrap();
        assert_eq!(json, r#"{"source":"a","target":"b","type":"*"}"#);
        let back: EdgeSelector = serde_json::from_str(&json).unwrap();
        assert_eq!(back.edge_type, None);
    }
}
