//! Converts parsed-file records into graph fragments.
//!
//! One [`Graph`] per source file: a file node, a module node per distinct
//! import, function and class nodes, and `contains`, `calls`, `inherits`
//! and `imports` edges. Building is best-effort enrichment; nothing in a
//! record is fatal.

use crate::model::{
    create_node_id, ClassNode, Edge, EdgeKind, FileNode, FunctionNode, Graph, ModuleNode, Node,
    NodeKind, NodeType,
};
use codesage_parser_api::ParsedFile;
use log::{debug, info};
use std::collections::{HashMap, HashSet};

/// Extension property marking nodes synthesized for unresolved targets.
pub const PLACEHOLDER_PROPERTY: &str = "placeholder";

const PYTHON_BUILTINS: &[&str] = &[
    "print", "len", "str", "int", "float", "bool", "list", "dict", "set", "tuple", "range",
    "enumerate", "zip", "map", "filter", "sorted", "reversed", "open", "input", "type",
    "isinstance", "hasattr", "getattr", "setattr", "min", "max", "sum", "abs", "round", "pow",
];
const GO_BUILTINS: &[&str] = &[
    "make", "new", "append", "copy", "delete", "cap", "panic", "recover", "close",
];
const JAVA_BUILTINS: &[&str] = &["toString", "equals", "hashCode", "println"];

/// Where a call target was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// A function defined in the same file
    Local(String),
    /// A language builtin (`function:builtin.<name>`)
    Builtin(String),
    /// Anything else (`function:external.<name>`)
    External(String),
}

impl CallTarget {
    /// Node id of the target.
    pub fn id(&self) -> &str {
        match self {
            CallTarget::Local(id) | CallTarget::Builtin(id) | CallTarget::External(id) => id,
        }
    }
}

/// Builds per-file graphs and resolves call targets.
///
/// The resolution cache is owned by the builder and cleared at the start of
/// every file.
pub struct GraphBuilder {
    builtins: HashSet<&'static str>,
    resolution_cache: HashMap<(String, String), CallTarget>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Builder with the Python, Go and Java builtin sets.
    pub fn new() -> Self {
        let builtins = PYTHON_BUILTINS
            .iter()
            .chain(GO_BUILTINS)
            .chain(JAVA_BUILTINS)
            .copied()
            .collect();
        Self {
            builtins,
            resolution_cache: HashMap::new(),
        }
    }

    /// Whether a name is treated as a builtin.
    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains(name)
    }

    /// Number of cached resolutions for the current file.
    pub fn cached_resolutions(&self) -> usize {
        self.resolution_cache.len()
    }

    /// Build the graph fragment for one parsed file.
    pub fn from_parsed_file(&mut self, parsed: &ParsedFile) -> Graph {
        self.resolution_cache.clear();

        let mut graph = Graph::new();
        let file_path = parsed.file_path.as_str();

        let file_node = Self::file_node(parsed);
        let file_id = file_node.id.clone();
        graph.add_node(file_node);

        for module in Self::module_nodes(parsed) {
            graph.add_node(module);
        }

        let mut local_functions: HashMap<String, String> = HashMap::new();
        for func in &parsed.functions {
            let core = FunctionNode {
                name: func.name.clone(),
                qualified_name: func.qualified_name().to_string(),
                line_start: func.line_start as i64,
                line_end: func.line_end as i64,
                complexity: func.complexity.map(i64::from),
                params: func.parameters.clone(),
                return_type: func.return_type.clone(),
                is_async: func.is_async,
            };
            let node = Node::from_kind(NodeKind::Function(core), Some(file_path))
                .with_extra("decorators", func.decorators.clone())
                .with_extra("docstring", func.docstring.clone())
                .with_extra("is_generator", func.is_generator);

            local_functions.insert(func.name.clone(), node.id.clone());
            self.add_contains(&mut graph, &file_id, node, func.line_start);
        }

        let mut local_classes: HashMap<String, String> = HashMap::new();
        let mut class_ids = Vec::with_capacity(parsed.classes.len());
        for class in &parsed.classes {
            let core = ClassNode {
                name: class.name.clone(),
                qualified_name: class.qualified_name().to_string(),
                line_start: class.line_start as i64,
                line_end: class.line_end as i64,
                base_classes: class.base_classes.clone(),
                methods: class.method_names(),
            };
            let node = Node::from_kind(NodeKind::Class(core), Some(file_path))
                .with_extra("attributes", class.attributes.clone())
                .with_extra("decorators", class.decorators.clone())
                .with_extra("docstring", class.docstring.clone())
                .with_extra("is_abstract", class.is_abstract);

            local_classes.insert(class.name.clone(), node.id.clone());
            class_ids.push((node.id.clone(), class.base_classes.clone()));
            self.add_contains(&mut graph, &file_id, node, class.line_start);
        }

        // calls
        for func in &parsed.functions {
            let source_id = create_node_id(NodeType::Function, func.qualified_name(), Some(file_path));
            for call in &func.calls {
                if call.name.is_empty() {
                    continue;
                }
                let target = self.resolve_call_target(&call.name, &local_functions, file_path);
                Self::ensure_call_placeholder(&mut graph, &call.name, &target);

                let edge = Edge::new(
                    source_id.clone(),
                    target.id(),
                    EdgeKind::Calls {
                        call_site: call.line.map(|l| l as i64),
                        call_type: call.call_type.clone().unwrap_or_else(|| "direct".to_string()),
                        arguments: call.arguments.clone(),
                    },
                );
                Self::add_or_skip(&mut graph, edge, "call");
            }
        }

        // inherits
        for (class_id, bases) in &class_ids {
            for base in bases {
                let target_id = match local_classes.get(base) {
                    Some(id) => id.clone(),
                    None => {
                        let id = create_node_id(NodeType::Class, base, Some(file_path));
                        if !graph.has_node(&id) {
                            graph.add_node(
                                Node::new(id.clone(), NodeKind::Class(ClassNode::new(base.as_str(), base.as_str(), 0, 0)))
                                    .with_extra(PLACEHOLDER_PROPERTY, true),
                            );
                        }
                        id
                    }
                };
                let edge = Edge::new(
                    class_id.clone(),
                    target_id,
                    EdgeKind::Inherits {
                        inheritance_type: "single".to_string(),
                    },
                );
                Self::add_or_skip(&mut graph, edge, "inheritance");
            }
        }

        // imports
        for import in &parsed.imports {
            let Some(module_name) = import.module_name() else {
                continue;
            };
            let target_id = create_node_id(NodeType::Module, module_name, None);
            if !graph.has_node(&target_id) {
                graph.add_node(Node::new(
                    target_id.clone(),
                    NodeKind::Module(ModuleNode::from_dotted(module_name)),
                ));
            }
            let edge = Edge::new(
                file_id.clone(),
                target_id,
                EdgeKind::Imports {
                    import_type: import.import_type.clone().unwrap_or_else(|| "import".to_string()),
                    alias: import.alias.clone(),
                    line_number: import.line_number.map(|l| l as i64),
                },
            );
            Self::add_or_skip(&mut graph, edge, "import");
        }

        info!(
            "Built graph for {file_path}: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        graph
    }

    /// Resolve a call name: local function, then builtin, then external.
    ///
    /// Results are cached per `(file_path, call_name)`.
    pub fn resolve_call_target(
        &mut self,
        call_name: &str,
        local_functions: &HashMap<String, String>,
        file_path: &str,
    ) -> CallTarget {
        let cache_key = (file_path.to_string(), call_name.to_string());
        if let Some(hit) = self.resolution_cache.get(&cache_key) {
            return hit.clone();
        }

        let target = if let Some(id) = local_functions.get(call_name) {
            CallTarget::Local(id.clone())
        } else if self.is_builtin(call_name) {
            CallTarget::Builtin(create_node_id(NodeType::Function, &format!("builtin.{call_name}"), None))
        } else {
            debug!("Unresolved call target: {call_name}");
            CallTarget::External(create_node_id(NodeType::Function, &format!("external.{call_name}"), None))
        };

        self.resolution_cache.insert(cache_key, target.clone());
        target
    }

    fn file_node(parsed: &ParsedFile) -> Node {
        let core = FileNode {
            path: parsed.file_path.clone(),
            language: parsed.language.clone(),
            loc: parsed.loc() as i64,
        };
        Node::from_kind(NodeKind::File(core), None)
            .with_extra("encoding", parsed.encoding.clone().unwrap_or_else(|| "utf-8".to_string()))
            .with_extra("size_bytes", parsed.size_bytes.unwrap_or(0) as i64)
    }

    fn module_nodes(parsed: &ParsedFile) -> Vec<Node> {
        let mut seen = HashSet::new();
        parsed
            .imports
            .iter()
            .filter_map(|import| {
                let name = import.module_name()?;
                if !seen.insert(name.to_string()) {
                    return None;
                }
                let node = Node::from_kind(NodeKind::Module(ModuleNode::from_dotted(name)), None)
                    .with_extra("import_type", import.import_type.clone().unwrap_or_else(|| "import".to_string()));
                Some(node)
            })
            .collect()
    }

    fn ensure_call_placeholder(graph: &mut Graph, call_name: &str, target: &CallTarget) {
        let (origin, id) = match target {
            CallTarget::Local(_) => return,
            CallTarget::Builtin(id) => ("builtin", id),
            CallTarget::External(id) => ("external", id),
        };
        if graph.has_node(id) {
            return;
        }
        let core = FunctionNode::new(call_name, format!("{origin}.{call_name}"), 0, 0);
        graph.add_node(
            Node::new(id.clone(), NodeKind::Function(core))
                .with_extra(PLACEHOLDER_PROPERTY, true)
                .with_extra("origin", origin),
        );
    }

    fn add_contains(&self, graph: &mut Graph, file_id: &str, node: Node, line: usize) {
        let edge = Edge::new(
            file_id,
            node.id.clone(),
            EdgeKind::Contains {
                line_number: Some(line as i64),
            },
        );
        graph.add_node(node);
        Self::add_or_skip(graph, edge, "contains");
    }

    fn add_or_skip(graph: &mut Graph, edge: Edge, label: &str) {
        let key = edge.key();
        if let Err(e) = graph.add_edge(edge) {
            debug!("Skipping {label} edge {key}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeKey, EdgeType};
    use codesage_parser_api::{CallRecord, ClassRecord, FunctionRecord, ImportRecord};

    fn sample() -> ParsedFile {
        let mut parsed = ParsedFile::new("f.py", "python").with_source("line\n".repeat(12));
        parsed.add_function(
            FunctionRecord::new("foo", 1, 5)
                .with_call(CallRecord::new("bar").at_line(2))
                .with_call(CallRecord::new("print").at_line(3))
                .with_call(CallRecord::new("qux").at_line(4)),
        );
        parsed.add_function(FunctionRecord::new("bar", 7, 9).with_complexity(3));
        parsed.add_class(ClassRecord::new("Base", 10, 10));
        parsed.add_class(ClassRecord::new("Child", 11, 12).with_base("Base").with_base("Mixin"));
        parsed.add_import(ImportRecord::new("os.path").with_alias("osp").at_line(1));
        parsed.add_import(ImportRecord::new("os.path"));
        parsed
    }

    #[test]
    fn test_resolves_local_builtin_and_external_calls() {
        let graph = GraphBuilder::new().from_parsed_file(&sample());
        let targets: Vec<&str> = graph
            .get_edges("function:f.py:foo", None, Some(EdgeType::Calls))
            .iter()
            .map(|e| e.target.as_str())
            .collect();

        assert_eq!(targets.len(), 3);
        assert!(targets.contains(&"function:f.py:bar"));
        assert!(targets.contains(&"function:builtin.print"));
        assert!(targets.contains(&"function:external.qux"));
    }

    #[test]
    fn test_placeholders_are_marked() {
        let graph = GraphBuilder::new().from_parsed_file(&sample());
        let print = graph.get_node("function:builtin.print").unwrap();
        assert_eq!(print.extra.get_bool(PLACEHOLDER_PROPERTY), Some(true));
        assert_eq!(print.extra.get_string("origin"), Some("builtin"));

        let bar = graph.get_node("function:f.py:bar").unwrap();
        assert!(!bar.extra.contains_key(PLACEHOLDER_PROPERTY));
    }

    #[test]
    fn test_file_node_and_contains_edges() {
        let graph = GraphBuilder::new().from_parsed_file(&sample());
        let file = graph.get_node("file:f.py").unwrap();
        assert_eq!(file.property("loc"), Some(12i64.into()));
        assert_eq!(file.extra.get_string("encoding"), Some("utf-8"));

        let contains = graph.get_edges("file:f.py", None, Some(EdgeType::Contains));
        assert_eq!(contains.len(), 4);
        let bar = graph
            .get_edge(&EdgeKey::new("file:f.py", "function:f.py:bar", EdgeType::Contains))
            .unwrap();
        assert_eq!(bar.properties().get_int("line_number"), Some(7));
    }

    #[test]
    fn test_inheritance_local_and_unresolved() {
        let graph = GraphBuilder::new().from_parsed_file(&sample());
        let bases: Vec<&str> = graph
            .get_edges("class:f.py:Child", None, Some(EdgeType::Inherits))
            .iter()
            .map(|e| e.target.as_str())
            .collect();

        assert!(bases.contains(&"class:f.py:Base"));
        assert!(bases.contains(&"class:f.py:Mixin"));
        let mixin = graph.get_node("class:f.py:Mixin").unwrap();
        assert_eq!(mixin.extra.get_bool(PLACEHOLDER_PROPERTY), Some(true));
    }

    #[test]
    fn test_one_module_node_per_distinct_import() {
        let graph = GraphBuilder::new().from_parsed_file(&sample());
        let modules = graph.nodes_of_type(NodeType::Module);
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name(), "path");

        let import = graph
            .get_edge(&EdgeKey::new("file:f.py", "module:os.path", EdgeType::Imports))
            .unwrap();
        // the later, alias-free import of the same module wins
        assert_eq!(import.properties().get_string("import_type"), Some("import"));
    }

    #[test]
    fn test_resolution_cache_is_per_file() {
        let mut builder = GraphBuilder::new();
        builder.from_parsed_file(&sample());
        assert_eq!(builder.cached_resolutions(), 3);

        builder.from_parsed_file(&ParsedFile::new("g.py", "python"));
        assert_eq!(builder.cached_resolutions(), 0);
    }

    #[test]
    fn test_local_definition_shadows_builtin() {
        let mut parsed = ParsedFile::new("g.py", "python");
        parsed.add_function(FunctionRecord::new("len", 1, 2));
        parsed.add_function(FunctionRecord::new("main", 3, 4).with_call(CallRecord::new("len")));

        let graph = GraphBuilder::new().from_parsed_file(&parsed);
        assert!(graph.has_edge(&EdgeKey::new("function:g.py:main", "function:g.py:len", EdgeType::Calls)));
        assert!(!graph.has_node("function:builtin.len"));
    }
}
