//! Schema of node properties and edge types, and query validation against it.

use super::dsl::{Condition, Query};
use crate::error::{GraphError, Result};
use crate::model::{EdgeType, NodeType};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Known properties of one node type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeTypeSchema {
    /// Properties every node of the type carries
    pub required_properties: Vec<String>,
    /// Properties a node of the type may carry
    pub optional_properties: Vec<String>,
}

impl NodeTypeSchema {
    fn new(required: &[&str], optional: &[&str]) -> Self {
        Self {
            required_properties: required.iter().map(|s| s.to_string()).collect(),
            optional_properties: optional.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// True when `property` is required or optional for the type.
    pub fn knows(&self, property: &str) -> bool {
        self.required_properties
            .iter()
            .chain(&self.optional_properties)
            .any(|p| p == property)
    }
}

/// Known properties of one edge type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeTypeSchema {
    /// Properties an edge of the type may carry
    pub properties: Vec<String>,
}

/// Node and edge types a graph is expected to hold.
///
/// Deserializes from JSON or any other serde format:
///
/// ```
/// use codesage_graph::query::GraphSchema;
///
/// let schema: GraphSchema = serde_json::from_str(r#"{
///     "node_types": {"function": {"required_properties": ["name"]}},
///     "edge_types": {"calls": {}}
/// }"#).unwrap();
/// assert!(schema.node_types.contains_key("function"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSchema {
    /// Node type name to its properties
    pub node_types: BTreeMap<String, NodeTypeSchema>,
    /// Edge type name to its properties
    pub edge_types: BTreeMap<String, EdgeTypeSchema>,
}

impl GraphSchema {
    /// Schema of the graphs the builder produces.
    pub fn minimal() -> Self {
        let node_types = NodeType::ALL
            .into_iter()
            .map(|t| {
                let schema = match t {
                    NodeType::File => NodeTypeSchema::new(&["path", "language"], &["loc", "encoding", "size_bytes"]),
                    NodeType::Module => NodeTypeSchema::new(&["name", "qualified_name"], &["import_type"]),
                    NodeType::Function => NodeTypeSchema::new(
                        &["name", "qualified_name", "line_start", "line_end"],
                        &[
                            "complexity",
                            "params",
                            "return_type",
                            "is_async",
                            "is_generator",
                            "decorators",
                            "docstring",
                            "placeholder",
                            "origin",
                        ],
                    ),
                    NodeType::Class => NodeTypeSchema::new(
                        &["name", "qualified_name", "line_start", "line_end"],
                        &[
                            "base_classes",
                            "methods",
                            "attributes",
                            "decorators",
                            "docstring",
                            "is_abstract",
                            "placeholder",
                        ],
                    ),
                    NodeType::Variable => NodeTypeSchema::new(&["name", "qualified_name"], &["value_type"]),
                };
                (t.as_str().to_string(), schema)
            })
            .collect();

        let edge_property = |t: EdgeType| -> &'static [&'static str] {
            match t {
                EdgeType::Contains => &["line_number"],
                EdgeType::Calls => &["call_site", "call_type", "arguments"],
                EdgeType::Inherits => &["inheritance_type"],
                EdgeType::Imports => &["import_type", "alias", "line_number"],
                EdgeType::References => &["reference_type", "line_number"],
                EdgeType::Defines => &["definition_type", "line_number"],
            }
        };
        let edge_types = EdgeType::ALL
            .into_iter()
            .map(|t| {
                let properties = edge_property(t).iter().map(|s| s.to_string()).collect();
                (t.as_str().to_string(), EdgeTypeSchema { properties })
            })
            .collect();

        Self {
            node_types,
            edge_types,
        }
    }
}

/// Check a query against a schema.
///
/// An unknown FIND type is an error. Unknown attributes and relations whose
/// edge type the schema lacks are only warnings: each is logged and
/// returned.
///
/// # Errors
///
/// [`GraphError::QuerySyntax`] when the schema does not know the node type.
pub fn validate(query: &Query, schema: &GraphSchema) -> Result<Vec<String>> {
    let node_type = query.find.node_type.to_ascii_lowercase();
    let Some(node_schema) = schema.node_types.get(&node_type) else {
        return Err(GraphError::query_syntax(
            format!("Unknown node type: {}", query.find.node_type),
            None,
        ));
    };

    let mut warnings = Vec::new();
    for condition in query.where_clause.iter().flat_map(|w| w.conditions()) {
        let warning = match condition {
            Condition::Attribute(attr) if !node_schema.knows(&attr.attribute) => Some(format!(
                "Unknown attribute '{}' for node type '{}'",
                attr.attribute, node_type
            )),
            Condition::Relation(rel) if !schema.edge_types.contains_key(rel.relation.edge_type().as_str()) => {
                Some(format!(
                    "Unknown relation {}: schema has no '{}' edges",
                    rel.relation.keyword(),
                    rel.relation.edge_type()
                ))
            }
            _ => None,
        };
        if let Some(warning) = warning {
            warn!("{warning}");
            warnings.push(warning);
        }
    }
    Ok(warnings)
}
