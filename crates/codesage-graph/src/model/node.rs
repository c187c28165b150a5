//! Nodes: a typed core per node kind plus a bounded extension map.
//!
//! Every component that reads a node field by name (builder, query
//! processor, updater) reads one of the typed core fields below. Anything
//! else a parser reports travels in [`Node::extra`]. On the wire a node is
//! a flat `{id, type, properties}` record, so both halves merge into one
//! property map there.

use super::property::{PropertyMap, PropertyValue};
use super::types::{create_node_id, NodeType};
use crate::error::{GraphError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Core fields of a file node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileNode {
    /// Path as reported by the parser
    pub path: String,
    /// Language identifier
    pub language: String,
    /// Lines of code
    pub loc: i64,
}

/// Core fields of a module node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleNode {
    /// Last dotted segment
    pub name: String,
    /// Full dotted name
    pub qualified_name: String,
}

impl ModuleNode {
    /// Module named by its dotted path; `name` is the last segment.
    pub fn from_dotted(qualified_name: &str) -> Self {
        Self {
            name: qualified_name.rsplit('.').next().unwrap_or(qualified_name).to_string(),
            qualified_name: qualified_name.to_string(),
        }
    }
}

/// Core fields of a function node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionNode {
    /// Function name
    pub name: String,
    /// Dotted name within its file
    pub qualified_name: String,
    /// First line (1-indexed)
    pub line_start: i64,
    /// Last line (1-indexed)
    pub line_end: i64,
    /// Cyclomatic complexity, when known
    pub complexity: Option<i64>,
    /// Parameter names
    pub params: Vec<String>,
    /// Return type annotation
    pub return_type: Option<String>,
    /// Async/coroutine function
    pub is_async: bool,
}

impl FunctionNode {
    /// Function with a name, qualified name and line span.
    pub fn new(name: impl Into<String>, qualified_name: impl Into<String>, line_start: i64, line_end: i64) -> Self {
        Self {
            name: name.into(),
            qualified_name: qualified_name.into(),
            line_start,
            line_end,
            ..Default::default()
        }
    }

    /// Set the complexity.
    pub fn with_complexity(mut self, complexity: i64) -> Self {
        self.complexity = Some(complexity);
        self
    }
}

/// Core fields of a class node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassNode {
    /// Class name
    pub name: String,
    /// Dotted name within its file
    pub qualified_name: String,
    /// First line (1-indexed)
    pub line_start: i64,
    /// Last line (1-indexed)
    pub line_end: i64,
    /// Direct base class names as written in source
    pub base_classes: Vec<String>,
    /// Method names
    pub methods: Vec<String>,
}

impl ClassNode {
    /// Class with a name, qualified name and line span.
    pub fn new(name: impl Into<String>, qualified_name: impl Into<String>, line_start: i64, line_end: i64) -> Self {
        Self {
            name: name.into(),
            qualified_name: qualified_name.into(),
            line_start,
            line_end,
            ..Default::default()
        }
    }
}

/// Core fields of a variable node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableNode {
    /// Variable name
    pub name: String,
    /// Dotted name within its file
    pub qualified_name: String,
}

/// Typed core of a node, one variant per [`NodeType`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A source file
    File(FileNode),
    /// An imported module
    Module(ModuleNode),
    /// A function or method
    Function(FunctionNode),
    /// A class
    Class(ClassNode),
    /// A variable
    Variable(VariableNode),
}

impl NodeKind {
    /// The node type this kind belongs to.
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::File(_) => NodeType::File,
            NodeKind::Module(_) => NodeType::Module,
            NodeKind::Function(_) => NodeType::Function,
            NodeKind::Class(_) => NodeType::Class,
            NodeKind::Variable(_) => NodeType::Variable,
        }
    }

    /// Property names owned by the typed core of `node_type`.
    pub fn core_keys(node_type: NodeType) -> &'static [&'static str] {
        match node_type {
            NodeType::File => &["path", "language", "loc"],
            NodeType::Module | NodeType::Variable => &["name", "qualified_name"],
            NodeType::Function => &[
                "name",
                "qualified_name",
                "line_start",
                "line_end",
                "complexity",
                "params",
                "return_type",
                "is_async",
            ],
            NodeType::Class => &[
                "name",
                "qualified_name",
                "line_start",
                "line_end",
                "base_classes",
                "methods",
            ],
        }
    }

    fn write_core(&self, props: &mut PropertyMap) {
        match self {
            NodeKind::File(f) => {
                props.insert("path", f.path.clone());
                props.insert("language", f.language.clone());
                props.insert("loc", f.loc);
            }
            NodeKind::Module(m) => {
                props.insert("name", m.name.clone());
                props.insert("qualified_name", m.qualified_name.clone());
            }
            NodeKind::Function(f) => {
                props.insert("name", f.name.clone());
                props.insert("qualified_name", f.qualified_name.clone());
                props.insert("line_start", f.line_start);
                props.insert("line_end", f.line_end);
                if let Some(c) = f.complexity {
                    props.insert("complexity", c);
                }
                props.insert("params", f.params.clone());
                if let Some(rt) = &f.return_type {
                    props.insert("return_type", rt.clone());
                }
                props.insert("is_async", f.is_async);
            }
            NodeKind::Class(c) => {
                props.insert("name", c.name.clone());
                props.insert("qualified_name", c.qualified_name.clone());
                props.insert("line_start", c.line_start);
                props.insert("line_end", c.line_end);
                props.insert("base_classes", c.base_classes.clone());
                props.insert("methods", c.methods.clone());
            }
            NodeKind::Variable(v) => {
                props.insert("name", v.name.clone());
                props.insert("qualified_name", v.qualified_name.clone());
            }
        }
    }

    fn read_core(node_type: NodeType, reader: &mut CoreReader) -> Result<Self> {
        Ok(match node_type {
            NodeType::File => NodeKind::File(FileNode {
                path: reader.string("path")?.unwrap_or_default(),
                language: reader.string("language")?.unwrap_or_default(),
                loc: reader.int("loc")?.unwrap_or(0),
            }),
            NodeType::Module => NodeKind::Module(ModuleNode {
                name: reader.string("name")?.unwrap_or_default(),
                qualified_name: reader.string("qualified_name")?.unwrap_or_default(),
            }),
            NodeType::Function => NodeKind::Function(FunctionNode {
                name: reader.string("name")?.unwrap_or_default(),
                qualified_name: reader.string("qualified_name")?.unwrap_or_default(),
                line_start: reader.int("line_start")?.unwrap_or(0),
                line_end: reader.int("line_end")?.unwrap_or(0),
                complexity: reader.int("complexity")?,
                params: reader.list("params")?.unwrap_or_default(),
                return_type: reader.string("return_type")?,
                is_async: reader.bool("is_async")?.unwrap_or(false),
            }),
            NodeType::Class => NodeKind::Class(ClassNode {
                name: reader.string("name")?.unwrap_or_default(),
                qualified_name: reader.string("qualified_name")?.unwrap_or_default(),
                line_start: reader.int("line_start")?.unwrap_or(0),
                line_end: reader.int("line_end")?.unwrap_or(0),
                base_classes: reader.list("base_classes")?.unwrap_or_default(),
                methods: reader.list("methods")?.unwrap_or_default(),
            }),
            NodeType::Variable => NodeKind::Variable(VariableNode {
                name: reader.string("name")?.unwrap_or_default(),
                qualified_name: reader.string("qualified_name")?.unwrap_or_default(),
            }),
        })
    }
}

/// Pulls typed core fields out of a flat property map, leaving the rest.
pub(crate) struct CoreReader<'a> {
    owner: &'a str,
    props: PropertyMap,
}

impl<'a> CoreReader<'a> {
    pub(crate) fn new(owner: &'a str, props: PropertyMap) -> Self {
        Self { owner, props }
    }

    fn mismatch(&self, key: &str, expected: &str, actual: &PropertyValue) -> GraphError {
        GraphError::serialization(
            format!(
                "Property '{key}' of {} must be {expected}, got {}",
                self.owner,
                actual.type_name()
            ),
            None::<std::io::Error>,
        )
    }

    pub(crate) fn string(&mut self, key: &str) -> Result<Option<String>> {
        match self.props.remove(key) {
            None | Some(PropertyValue::Null) => Ok(None),
            Some(PropertyValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(self.mismatch(key, "a string", &other)),
        }
    }

    pub(crate) fn int(&mut self, key: &str) -> Result<Option<i64>> {
        match self.props.remove(key) {
            None | Some(PropertyValue::Null) => Ok(None),
            Some(PropertyValue::Int(i)) => Ok(Some(i)),
            Some(other) => Err(self.mismatch(key, "an integer", &other)),
        }
    }

    pub(crate) fn bool(&mut self, key: &str) -> Result<Option<bool>> {
        match self.props.remove(key) {
            None | Some(PropertyValue::Null) => Ok(None),
            Some(PropertyValue::Bool(b)) => Ok(Some(b)),
            Some(other) => Err(self.mismatch(key, "a boolean", &other)),
        }
    }

    pub(crate) fn list(&mut self, key: &str) -> Result<Option<Vec<String>>> {
        match self.props.remove(key) {
            None | Some(PropertyValue::Null) => Ok(None),
            Some(PropertyValue::StringList(l)) => Ok(Some(l)),
            Some(other) => Err(self.mismatch(key, "a string list", &other)),
        }
    }

    pub(crate) fn into_rest(self) -> PropertyMap {
        self.props
    }
}

/// A node in the code graph.
///
/// Equality and hashing use `id` only: two nodes with the same id are the
/// same logical entity regardless of property drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "NodeRecord", try_from = "NodeRecord")]
pub struct Node {
    /// Globally unique id, see [`create_node_id`]
    pub id: String,
    /// Typed core
    pub kind: NodeKind,
    /// Extension properties (decorators, docstring, placeholder flags, ...)
    pub extra: PropertyMap,
}

impl Node {
    /// Node with an explicit id.
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            extra: PropertyMap::new(),
        }
    }

    /// Node whose id is derived from its kind.
    ///
    /// Files are keyed by path and modules by dotted name; functions,
    /// classes and variables are scoped by `file_path`.
    pub fn from_kind(kind: NodeKind, file_path: Option<&str>) -> Self {
        let id = match &kind {
            NodeKind::File(f) => create_node_id(NodeType::File, &f.path, None),
            NodeKind::Module(m) => create_node_id(NodeType::Module, &m.qualified_name, None),
            NodeKind::Function(f) => create_node_id(NodeType::Function, &f.qualified_name, file_path),
            NodeKind::Class(c) => create_node_id(NodeType::Class, &c.qualified_name, file_path),
            NodeKind::Variable(v) => create_node_id(NodeType::Variable, &v.qualified_name, file_path),
        };
        Self::new(id, kind)
    }

    /// Builder pattern: add an extension property.
    ///
    /// A key naming one of the kind's core fields is rejected with a
    /// warning; set core fields through [`Node::kind`] instead.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        let key = key.into();
        if NodeKind::core_keys(self.node_type()).contains(&key.as_str()) {
            warn!("Ignoring extra property '{key}' on {}: it names a core field", self.id);
            return self;
        }
        self.extra.insert(key, value);
        self
    }

    /// The node's type.
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Name of the entity (a file's name is its path).
    pub fn name(&self) -> &str {
        match &self.kind {
            NodeKind::File(f) => &f.path,
            NodeKind::Module(m) => &m.name,
            NodeKind::Function(f) => &f.name,
            NodeKind::Class(c) => &c.name,
            NodeKind::Variable(v) => &v.name,
        }
    }

    /// Qualified name of the entity (a file's qualified name is its path).
    pub fn qualified_name(&self) -> &str {
        match &self.kind {
            NodeKind::File(f) => &f.path,
            NodeKind::Module(m) => &m.qualified_name,
            NodeKind::Function(f) => &f.qualified_name,
            NodeKind::Class(c) => &c.qualified_name,
            NodeKind::Variable(v) => &v.qualified_name,
        }
    }

    /// Core and extension properties merged into one map.
    ///
    /// Core fields win over extras of the same name, which only arise when
    /// [`Node::extra`] is written directly.
    pub fn properties(&self) -> PropertyMap {
        let mut props = self.extra.clone();
        self.kind.write_core(&mut props);
        props
    }

    /// Look up a single property by name.
    pub fn property(&self, key: &str) -> Option<PropertyValue> {
        self.properties().get(key).cloned()
    }

    /// True when the merged property maps are identical.
    pub fn same_content(&self, other: &Node) -> bool {
        self.node_type() == other.node_type() && self.properties() == other.properties()
    }

    /// Flat wire record.
    pub fn to_record(&self) -> NodeRecord {
        NodeRecord {
            id: self.id.clone(),
            node_type: self.node_type(),
            properties: self.properties(),
        }
    }

    /// Rebuild a node from its flat wire record.
    ///
    /// Missing core fields take defaults; a core field with the wrong value
    /// type is a serialization error.
    pub fn from_record(record: NodeRecord) -> Result<Self> {
        let mut reader = CoreReader::new(&record.id, record.properties);
        let kind = NodeKind::read_core(record.node_type, &mut reader)?;
        Ok(Self {
            extra: reader.into_rest(),
            id: record.id,
            kind,
        })
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Flat wire form of a node: `{id, type, properties}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node id
    pub id: String,
    /// Node type
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Merged properties
    #[serde(default)]
    pub properties: PropertyMap,
}

impl From<Node> for NodeRecord {
    fn from(node: Node) -> Self {
        node.to_record()
    }
}

impl TryFrom<NodeRecord> for Node {
    type Error = GraphError;

    fn try_from(record: NodeRecord) -> Result<Self> {
        Node::from_record(record)
    }
}
