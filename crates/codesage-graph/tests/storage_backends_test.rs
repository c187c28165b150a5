//! The same scenarios against every storage backend.
//!
//! SQLite in memory, the key-value adapter over a `MemoryStore`, and (with
//! the default feature) the key-value adapter over RocksDB in a temp dir
//! must all answer identically.

use codesage_graph::{
    create_node_id, Edge, EdgeType, GraphBuilder, GraphError, KeyValueStorage, NodeFilter,
    NodeType, QueryProcessor, SaveOptions, SqliteStorage, StorageAdapter, StorageExt,
};
use codesage_parser_api::{CallRecord, ClassRecord, FunctionRecord, ImportRecord, ParsedFile};
use tempfile::TempDir;

fn backends(dir: &TempDir) -> Vec<(&'static str, Box<dyn StorageAdapter>)> {
    let mut backends: Vec<(&'static str, Box<dyn StorageAdapter>)> = vec![
        ("sqlite", Box::new(SqliteStorage::in_memory().unwrap()) as Box<dyn StorageAdapter>),
        ("kv-memory", Box::new(KeyValueStorage::in_memory())),
    ];
    #[cfg(feature = "rocksdb-backend")]
    {
        let config = codesage_graph::KeyValueConfig::default().with_path(dir.path().join("graph.rocks"));
        backends.push(("kv-rocksdb", Box::new(KeyValueStorage::open(config).unwrap()) as Box<dyn StorageAdapter>));
    }
    #[cfg(not(feature = "rocksdb-backend"))]
    let _ = dir;
    backends
}

/// svc.py: main -> helper, main -> print, orphan, Child(Base), import os.
fn service_file() -> ParsedFile {
    let mut parsed = ParsedFile::new("svc.py", "python").with_source("x\n".repeat(50));
    parsed.add_function(
        FunctionRecord::new("main", 1, 10)
            .with_complexity(12)
            .with_call(CallRecord::new("helper"))
            .with_call(CallRecord::new("print")),
    );
    parsed.add_function(FunctionRecord::new("helper", 12, 20).with_complexity(2));
    parsed.add_function(FunctionRecord::new("orphan", 22, 30).with_complexity(1));
    parsed.add_class(ClassRecord::new("Base", 32, 40));
    parsed.add_class(ClassRecord::new("Child", 42, 50).with_base("Base"));
    parsed.add_import(ImportRecord::new("os"));
    parsed
}

fn seeded(storage: &dyn StorageAdapter) {
    let graph = GraphBuilder::new().from_parsed_file(&service_file());
    storage.save_graph(&graph, &SaveOptions::default()).unwrap();
}

fn function_id(name: &str) -> String {
    create_node_id(NodeType::Function, name, Some("svc.py"))
}

#[test]
fn test_save_graph_counts() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());

        // file, module, 3 functions, print placeholder, 2 classes
        assert_eq!(storage.node_count(None).unwrap(), 8, "{name}");
        assert_eq!(storage.node_count(Some(NodeType::Function)).unwrap(), 4, "{name}");
        // 5 contains, 2 calls, 1 inherits, 1 imports
        assert_eq!(storage.edge_count(None).unwrap(), 9, "{name}");
        assert_eq!(storage.edge_count(Some(EdgeType::Calls)).unwrap(), 2, "{name}");

        let stats = storage.statistics().unwrap();
        assert_eq!(stats.nodes_by_type.get("class"), Some(&2), "{name}");
        assert_eq!(stats.edges_by_type.get("contains"), Some(&5), "{name}");
    }
}

#[test]
fn test_save_graph_is_idempotent() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());
        seeded(storage.as_ref());
        assert_eq!(storage.node_count(None).unwrap(), 8, "{name}");
        assert_eq!(storage.edge_count(None).unwrap(), 9, "{name}");
    }
}

#[test]
fn test_get_node_round_trips_properties() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());
        let main = storage.get_node(&function_id("main")).unwrap();
        assert_eq!(main.name(), "main", "{name}");
        assert_eq!(main.properties().get_int("complexity"), Some(12), "{name}");
        assert_eq!(main.properties().get_int("line_end"), Some(10), "{name}");

        let err = storage.get_node("function:missing").unwrap_err();
        assert!(matches!(err, GraphError::NodeNotFound { .. }), "{name}");
        assert!(!storage.node_exists("function:missing").unwrap(), "{name}");
    }
}

#[test]
fn test_load_graph_respects_depth() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());
        let file_id = create_node_id(NodeType::File, "svc.py", None);

        let shallow = storage.load_graph(&file_id, 1).unwrap();
        // file, 5 contained entities, module
        assert_eq!(shallow.node_count(), 7, "{name}");
        assert!(!shallow.has_node("function:builtin.print"), "{name}");
        // contains + imports; calls/inherits between loaded nodes too
        assert!(shallow.get_edges(&function_id("main"), None, Some(EdgeType::Calls)).len() == 1, "{name}");

        let deep = storage.load_graph(&file_id, 2).unwrap();
        assert_eq!(deep.node_count(), 8, "{name}");
        assert_eq!(deep.edge_count(), 9, "{name}");

        assert!(matches!(
            storage.load_graph("file:nope.py", 3),
            Err(GraphError::NodeNotFound { .. })
        ));
    }
}

#[test]
fn test_query_nodes_filters_and_paginates() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());
        let all = storage
            .query_nodes(Some(NodeType::Function), &NodeFilter::new(), None, 0)
            .unwrap();
        let ids: Vec<_> = all.iter().map(|n| n.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted, "{name}: results are ordered by id");

        let complex = storage
            .query_nodes(Some(NodeType::Function), &NodeFilter::new().gte("complexity", 2i64), None, 0)
            .unwrap();
        assert_eq!(complex.len(), 2, "{name}");

        let page = storage
            .query_nodes(Some(NodeType::Function), &NodeFilter::new().gte("complexity", 1i64), Some(1), 1)
            .unwrap();
        assert_eq!(page.len(), 1, "{name}");
        assert_eq!(page[0].id, complex_ids_sorted(&all)[1], "{name}");
    }
}

fn complex_ids_sorted(all: &[codesage_graph::Node]) -> Vec<String> {
    all.iter()
        .filter(|n| n.properties().get_int("complexity").is_some())
        .map(|n| n.id.clone())
        .collect()
}

#[test]
fn test_delete_node_removes_outgoing_edges() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());
        storage.delete_node(&function_id("main")).unwrap();

        assert!(!storage.node_exists(&function_id("main")).unwrap(), "{name}");
        assert!(storage.get_edges(&function_id("main"), None, None).unwrap().is_empty(), "{name}");
        assert_eq!(storage.edge_count(Some(EdgeType::Calls)).unwrap(), 0, "{name}");

        // deleting again is fine
        storage.delete_node(&function_id("main")).unwrap();
    }
}

#[test]
fn test_delete_edge_by_type_and_wildcard() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());
        let (main, helper) = (function_id("main"), function_id("helper"));
        storage
            .save_edge(&Edge::of_type(main.clone(), helper.clone(), EdgeType::References))
            .unwrap();
        assert_eq!(storage.get_edges(&main, Some(&helper), None).unwrap().len(), 2, "{name}");

        storage.delete_edge(&main, &helper, Some(EdgeType::Calls)).unwrap();
        let left = storage.get_edges(&main, Some(&helper), None).unwrap();
        assert_eq!(left.len(), 1, "{name}");
        assert_eq!(left[0].edge_type(), EdgeType::References, "{name}");

        storage.delete_edge(&main, &helper, None).unwrap();
        assert!(storage.get_edges(&main, Some(&helper), None).unwrap().is_empty(), "{name}");
    }
}

#[test]
fn test_incoming_edges() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());
        let incoming = storage
            .get_incoming_edges(&function_id("helper"), None)
            .unwrap();
        let mut sources: Vec<_> = incoming.iter().map(|e| e.source.clone()).collect();
        sources.sort();
        assert_eq!(
            sources,
            vec![create_node_id(NodeType::File, "svc.py", None), function_id("main")],
            "{name}"
        );
    }
}

#[test]
fn test_failed_transaction_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());
        let before = storage.node_count(None).unwrap();

        let result: codesage_graph::Result<()> = storage.as_ref().transaction(|s| {
            s.delete_node(&function_id("helper"))?;
            Err(GraphError::invalid_operation("abort"))
        });
        assert!(result.is_err(), "{name}");
        assert_eq!(storage.node_count(None).unwrap(), before, "{name}");
        assert!(storage.node_exists(&function_id("helper")).unwrap(), "{name}");
    }
}

#[test]
fn test_committed_transaction_is_visible() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());
        storage
            .as_ref()
            .transaction(|s| {
                s.delete_node(&function_id("orphan"))?;
                s.delete_node(&function_id("helper"))
            })
            .unwrap();
        assert_eq!(storage.node_count(Some(NodeType::Function)).unwrap(), 2, "{name}");
    }
}

#[test]
fn test_clear_all() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());
        storage.clear_all().unwrap();
        assert_eq!(storage.node_count(None).unwrap(), 0, "{name}");
        assert_eq!(storage.edge_count(None).unwrap(), 0, "{name}");
    }
}

#[test]
fn test_convenience_queries_agree() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        seeded(storage.as_ref());
        let processor = QueryProcessor::new(storage.as_ref());

        let callers = processor.find_functions_calling("helper").unwrap();
        assert_eq!(callers.len(), 1, "{name}");
        assert_eq!(callers[0].name(), "main", "{name}");

        let subclasses = processor.class_hierarchy("Base", 3).unwrap();
        assert_eq!(subclasses.len(), 1, "{name}");
        assert_eq!(subclasses[0].name(), "Child", "{name}");

        let importers = processor.find_file_dependencies("os").unwrap();
        assert_eq!(importers.len(), 1, "{name}");

        let complex = processor.find_high_complexity_functions(10).unwrap();
        assert_eq!(complex.len(), 1, "{name}");

        let unused: Vec<_> = processor
            .find_unused_functions()
            .unwrap()
            .into_iter()
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(unused, vec!["orphan".to_string()], "{name}");
    }
}
