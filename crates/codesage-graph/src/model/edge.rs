//! Edges: a typed core per relationship kind plus extension properties.

use super::node::CoreReader;
use super::property::{PropertyMap, PropertyValue};
use super::types::EdgeType;
use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Typed core of an edge, one variant per [`EdgeType`].
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    /// Parent contains child
    Contains {
        /// Line where the child is defined
        line_number: Option<i64>,
    },
    /// Caller calls callee
    Calls {
        /// Line of the call site
        call_site: Option<i64>,
        /// Call kind (`direct` by default)
        call_type: String,
        /// Argument text
        arguments: Option<String>,
    },
    /// Subclass inherits from base
    Inherits {
        /// Inheritance kind (`single` by default)
        inheritance_type: String,
    },
    /// File imports module
    Imports {
        /// Import kind (`import` by default)
        import_type: String,
        /// Local alias
        alias: Option<String>,
        /// Line of the import statement
        line_number: Option<i64>,
    },
    /// Entity references another
    References {
        /// Reference kind (`read` by default)
        reference_type: String,
        /// Line of the reference
        line_number: Option<i64>,
    },
    /// Scope defines entity
    Defines {
        /// Definition kind (`local` by default)
        definition_type: String,
        /// Line of the definition
        line_number: Option<i64>,
    },
}

impl EdgeKind {
    /// Core with defaults for the given type.
    pub fn default_for(edge_type: EdgeType) -> Self {
        match edge_type {
            EdgeType::Contains => EdgeKind::Contains { line_number: None },
            EdgeType::Calls => EdgeKind::Calls {
                call_site: None,
                call_type: "direct".to_string(),
                arguments: None,
            },
            EdgeType::Inherits => EdgeKind::Inherits {
                inheritance_type: "single".to_string(),
            },
            EdgeType::Imports => EdgeKind::Imports {
                import_type: "import".to_string(),
                alias: None,
                line_number: None,
            },
            EdgeType::References => EdgeKind::References {
                reference_type: "read".to_string(),
                line_number: None,
            },
            EdgeType::Defines => EdgeKind::Defines {
                definition_type: "local".to_string(),
                line_number: None,
            },
        }
    }

    /// The edge type this kind belongs to.
    pub fn edge_type(&self) -> EdgeType {
        match self {
            EdgeKind::Contains { .. } => EdgeType::Contains,
            EdgeKind::Calls { .. } => EdgeType::Calls,
            EdgeKind::Inherits { .. } => EdgeType::Inherits,
            EdgeKind::Imports { .. } => EdgeType::Imports,
            EdgeKind::References { .. } => EdgeType::References,
            EdgeKind::Defines { .. } => EdgeType::Defines,
        }
    }

    fn write_core(&self, props: &mut PropertyMap) {
        fn opt<T: Clone + Into<PropertyValue>>(props: &mut PropertyMap, key: &str, value: &Option<T>) {
            if let Some(v) = value {
                props.insert(key, v.clone());
            }
        }

        match self {
            EdgeKind::Contains { line_number } => opt(props, "line_number", line_number),
            EdgeKind::Calls { call_site, call_type, arguments } => {
                opt(props, "call_site", call_site);
                props.insert("call_type", call_type.clone());
                opt(props, "arguments", arguments);
            }
            EdgeKind::Inherits { inheritance_type } => {
                props.insert("inheritance_type", inheritance_type.clone());
            }
            EdgeKind::Imports { import_type, alias, line_number } => {
                props.insert("import_type", import_type.clone());
                opt(props, "alias", alias);
                opt(props, "line_number", line_number);
            }
            EdgeKind::References { reference_type, line_number } => {
                props.insert("reference_type", reference_type.clone());
                opt(props, "line_number", line_number);
            }
            EdgeKind::Defines { definition_type, line_number } => {
                props.insert("definition_type", definition_type.clone());
                opt(props, "line_number", line_number);
            }
        }
    }

    fn read_core(edge_type: EdgeType, reader: &mut CoreReader) -> Result<Self> {
        let mut kind = EdgeKind::default_for(edge_type);
        match &mut kind {
            EdgeKind::Contains { line_number } => *line_number = reader.int("line_number")?,
            EdgeKind::Calls { call_site, call_type, arguments } => {
                *call_site = reader.int("call_site")?;
                if let Some(t) = reader.string("call_type")? {
                    *call_type = t;
                }
                *arguments = reader.string("arguments")?;
            }
            EdgeKind::Inherits { inheritance_type } => {
                if let Some(t) = reader.string("inheritance_type")? {
                    *inheritance_type = t;
                }
            }
            EdgeKind::Imports { import_type, alias, line_number } => {
                if let Some(t) = reader.string("import_type")? {
                    *import_type = t;
                }
                *alias = reader.string("alias")?;
                *line_number = reader.int("line_number")?;
            }
            EdgeKind::References { reference_type, line_number } => {
                if let Some(t) = reader.string("reference_type")? {
                    *reference_type = t;
                }
                *line_number = reader.int("line_number")?;
            }
            EdgeKind::Defines { definition_type, line_number } => {
                if let Some(t) = reader.string("definition_type")? {
                    *definition_type = t;
                }
                *line_number = reader.int("line_number")?;
            }
        }
        Ok(kind)
    }
}

/// Identity of an edge: `(source, target, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Relationship type
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
}

impl EdgeKey {
    /// Build a key.
    pub fn new(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.source, self.edge_type, self.target)
    }
}

/// A directed relationship between two nodes.
///
/// Equality and hashing use `(source, target, type)` only; two edges that
/// differ only in properties are the same edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "EdgeRecord", try_from = "EdgeRecord")]
pub struct Edge {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Typed core
    pub kind: EdgeKind,
    /// Extension properties
    pub extra: PropertyMap,
}

impl Edge {
    /// Edge with an explicit core.
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            extra: PropertyMap::new(),
        }
    }

    /// Edge of a type with default core fields.
    pub fn of_type(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType) -> Self {
        Self::new(source, target, EdgeKind::default_for(edge_type))
    }

    /// Builder pattern: add an extension property.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.extra.insert(key, value);
        self
    }

    /// The relationship type.
    pub fn edge_type(&self) -> EdgeType {
        self.kind.edge_type()
    }

    /// The `(source, target, type)` identity.
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone(), self.edge_type())
    }

    /// Core and extension properties merged into one map.
    pub fn properties(&self) -> PropertyMap {
        let mut props = self.extra.clone();
        self.kind.write_core(&mut props);
        props
    }

    /// Flat wire record.
    pub fn to_record(&self) -> EdgeRecord {
        EdgeRecord {
            source: self.source.clone(),
            target: self.target.clone(),
            edge_type: self.edge_type(),
            properties: self.properties(),
        }
    }

    /// Rebuild an edge from its flat wire record.
    pub fn from_record(record: EdgeRecord) -> Result<Self> {
        let owner = format!("edge {} -> {}", record.source, record.target);
        let mut reader = CoreReader::new(&owner, record.properties);
        let kind = EdgeKind::read_core(record.edge_type, &mut reader)?;
        Ok(Self {
            extra: reader.into_rest(),
            source: record.source,
            target: record.target,
            kind,
        })
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.target == other.target
            && self.edge_type() == other.edge_type()
    }
}

impl Eq for Edge {}

impl Hash for Edge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.target.hash(state);
        self.edge_type().hash(state);
    }
}

/// Flat wire form of an edge: `{source, target, type, properties}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Relationship type
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// Merged properties
    #[serde(default)]
    pub properties: PropertyMap,
}

impl From<Edge> for EdgeRecord {
    fn from(edge: Edge) -> Self {
        edge.to_record()
    }
}

impl TryFrom<EdgeRecord> for Edge {
    type Error = GraphError;

    fn try_from(record: EdgeRecord) -> Result<Self> {
        Edge::from_record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_properties() {
        let a = Edge::new(
            "function:a.py:f",
            "function:a.py:g",
            EdgeKind::Calls {
                call_site: Some(3),
                call_type: "direct".to_string(),
                arguments: None,
            },
        );
        let b = Edge::of_type("function:a.py:f", "function:a.py:g", EdgeType::Calls)
            .with_extra("weight", 2i64);

        assert_eq!(a, b);
        let set: HashSet<Edge> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_type_is_part_of_identity() {
        let calls = Edge::of_type("a", "b", EdgeType::Calls);
        let refs = Edge::of_type("a", "b", EdgeType::References);
        assert_ne!(calls, refs);
        assert_ne!(calls.key(), refs.key());
    }

    #[test]
    fn test_import_record_round_trip() {
        let edge = Edge::new(
            "file:a.py",
            "module:numpy",
            EdgeKind::Imports {
                import_type: "import".to_string(),
                alias: Some("np".to_string()),
                line_number: Some(1),
            },
        );

        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["type"], "imports");
        assert_eq!(json["properties"]["alias"], "np");

        let back: Edge = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, edge.kind);
    }

    #[test]
    fn test_defaults_fill_missing_core_fields() {
        let json = r#"{"source": "a", "target": "b", "type": "inherits"}"#;
        let edge: Edge = serde_json::from_str(json).unwrap();
        assert_eq!(
            edge.kind,
            EdgeKind::Inherits {
                inheritance_type: "single".to_string()
            }
        );
    }

    #[test]
    fn test_key_display() {
        let key = EdgeKey::new("a", "b", EdgeType::Contains);
        assert_eq!(key.to_string(), "a -[contains]-> b");
    }
}
