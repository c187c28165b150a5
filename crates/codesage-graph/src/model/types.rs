//! Node and edge type enums and deterministic node ids.

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw id bases longer than this are truncated and hashed.
const MAX_ID_BASE_CHARS: usize = 200;
/// Characters of the raw base kept before the hash suffix.
const TRUNCATED_BASE_CHARS: usize = 180;

/// Type of a node in the code graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Source code file
    File,
    /// Imported module or package
    Module,
    /// Function or method
    Function,
    /// Class, struct, or type definition
    Class,
    /// Variable or constant
    Variable,
}

impl NodeType {
    /// Every node type, in declaration order.
    pub const ALL: [NodeType; 5] = [
        NodeType::File,
        NodeType::Module,
        NodeType::Function,
        NodeType::Class,
        NodeType::Variable,
    ];

    /// Wire name (`"function"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Module => "module",
            NodeType::Function => "function",
            NodeType::Class => "class",
            NodeType::Variable => "variable",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| GraphError::serialization(format!("Unknown node type: {s}"), None::<std::io::Error>))
    }
}

/// Type of edge (relationship) between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// Parent contains child entity (file contains function)
    Contains,
    /// Function A calls Function B
    Calls,
    /// Class A inherits from Class B
    Inherits,
    /// File imports module
    Imports,
    /// Entity reads or writes another entity
    References,
    /// Scope defines entity
    Defines,
}

impl EdgeType {
    /// Every edge type, in declaration order.
    pub const ALL: [EdgeType; 6] = [
        EdgeType::Contains,
        EdgeType::Calls,
        EdgeType::Inherits,
        EdgeType::Imports,
        EdgeType::References,
        EdgeType::Defines,
    ];

    /// Wire name (`"calls"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Contains => "contains",
            EdgeType::Calls => "calls",
            EdgeType::Inherits => "inherits",
            EdgeType::Imports => "imports",
            EdgeType::References => "references",
            EdgeType::Defines => "defines",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| GraphError::serialization(format!("Unknown edge type: {s}"), None::<std::io::Error>))
    }
}

/// Build the deterministic id of a node.
///
/// The base is `"<file_path>:<qualified_name>"` when a file path is given,
/// otherwise the qualified name alone. Bases over 200 characters keep their
/// first 180 characters followed by `...` and the first 8 hex digits of the
/// MD5 of the full base. The id is `"<type>:<base>"`.
///
/// ```
/// use codesage_graph::{create_node_id, NodeType};
///
/// assert_eq!(create_node_id(NodeType::Function, "bar", Some("f.py")), "function:f.py:bar");
/// assert_eq!(create_node_id(NodeType::Module, "os.path", None), "module:os.path");
/// ```
pub fn create_node_id(node_type: NodeType, qualified_name: &str, file_path: Option<&str>) -> String {
    let base = match file_path {
        Some(path) if !path.is_empty() => format!("{path}:{qualified_name}"),
        _ => qualified_name.to_string(),
    };

    let base = if base.chars().count() > MAX_ID_BASE_CHARS {
        let digest = format!("{:x}", md5::compute(base.as_bytes()));
        let head: String = base.chars().take(TRUNCATED_BASE_CHARS).collect();
        format!("{head}...{}", &digest[..8])
    } else {
        base
    };

    format!("{node_type}:{base}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_wire_names() {
        assert_eq!(serde_json::to_string(&NodeType::Function).unwrap(), "\"function\"");
        assert_eq!("CLASS".parse::<NodeType>().unwrap(), NodeType::Class);
        assert!("widget".parse::<NodeType>().is_err());
    }

    #[test]
    fn test_edge_type_wire_names() {
        assert_eq!(EdgeType::Inherits.to_string(), "inherits");
        assert_eq!("imports".parse::<EdgeType>().unwrap(), EdgeType::Imports);
    }

    #[test]
    fn test_node_id_without_file() {
        assert_eq!(
            create_node_id(NodeType::Function, "builtin.print", None),
            "function:builtin.print"
        );
    }

    #[test]
    fn test_long_ids_are_truncated_and_hashed() {
        let long_name = "x".repeat(250);
        let id = create_node_id(NodeType::Class, &long_name, Some("pkg/mod.py"));

        let base = id.strip_prefix("class:").unwrap();
        assert_eq!(base.chars().count(), 180 + 3 + 8);
        assert!(base.starts_with("pkg/mod.py:xxx"));
        assert_eq!(&base[180..183], "...");

        // deterministic
        assert_eq!(id, create_node_id(NodeType::Class, &long_name, Some("pkg/mod.py")));
        // different input, different hash
        let other = create_node_id(NodeType::Class, &format!("{long_name}y"), Some("pkg/mod.py"));
        assert_ne!(id, other);
    }

    #[test]
    fn test_exactly_200_chars_is_kept() {
        let name = "a".repeat(200);
        assert_eq!(create_node_id(NodeType::Module, &name, None), format!("module:{name}"));
    }
}
