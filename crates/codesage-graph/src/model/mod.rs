//! Graph model: nodes, edges, the graph aggregate, and deltas.

pub mod algorithms;
pub mod delta;
pub mod edge;
pub mod graph;
pub mod node;
pub mod property;
pub mod types;

pub use delta::{EdgeSelector, GraphDelta};
pub use edge::{Edge, EdgeKey, EdgeKind, EdgeRecord};
pub use graph::{Direction, Graph};
pub use node::{ClassNode, FileNode, FunctionNode, ModuleNode, Node, NodeKind, NodeRecord, VariableNode};
pub use property::{PropertyMap, PropertyValue};
pub use types::{create_node_id, EdgeType, NodeType};
