//! Basic usage example for codesage-graph
//!
//! This example demonstrates:
//! - Building a graph from a parsed-file record
//! - Persisting it to SQLite
//! - Querying it with the DSL and the canned queries

use codesage_graph::{
    GraphBuilder, QueryProcessor, RelationalConfig, SaveOptions, SqliteStorage, StorageAdapter,
};
use codesage_parser_api::{CallRecord, ClassRecord, FunctionRecord, ImportRecord, ParsedFile};

fn main() -> codesage_graph::Result<()> {
    // Persistent database (use SqliteStorage::in_memory() for testing)
    let storage = SqliteStorage::open(RelationalConfig::default().with_database("./example.db"))?;

    println!("Building a code graph...\n");

    let mut parsed = ParsedFile::new("src/app.py", "python");
    parsed.add_function(
        FunctionRecord::new("main", 1, 10)
            .with_complexity(4)
            .with_call(CallRecord::new("load_config"))
            .with_call(CallRecord::new("print")),
    );
    parsed.add_function(FunctionRecord::new("load_config", 12, 40).with_complexity(14));
    parsed.add_function(FunctionRecord::new("legacy_export", 42, 60).with_complexity(2));
    parsed.add_class(ClassRecord::new("Service", 62, 90));
    parsed.add_class(ClassRecord::new("HttpService", 92, 130).with_base("Service"));
    parsed.add_import(ImportRecord::new("os.path"));

    let graph = GraphBuilder::new().from_parsed_file(&parsed);
    println!(
        "✓ Built {} nodes and {} edges for {}",
        graph.node_count(),
        graph.edge_count(),
        parsed.file_path
    );

    storage.save_graph(&graph, &SaveOptions::default())?;
    println!("✓ Saved to ./example.db");

    println!("\n--- Querying the graph ---\n");
    let processor = QueryProcessor::new(&storage);

    let result = processor.execute("FIND function WHERE complexity > 10")?;
    println!("Complex functions ({:?}):", result.execution_time);
    for node in &result.nodes {
        println!("  - {} (line {:?})", node.name(), node.properties().get_int("line_start"));
    }
    println!("Plan: {}", result.plan);

    let callers = processor.find_functions_calling("load_config")?;
    println!("\nCallers of load_config: {}", callers.len());
    for node in &callers {
        println!("  - {}", node.qualified_name());
    }

    let subclasses = processor.class_hierarchy("Service", 5)?;
    println!("\nSubclasses of Service: {}", subclasses.len());

    let unused = processor.find_unused_functions()?;
    println!("\nNever called:");
    for node in &unused {
        println!("  - {}", node.name());
    }

    println!("\n--- Storage Statistics ---\n");
    let stats = storage.statistics()?;
    println!("Total nodes: {}", stats.node_count);
    println!("Total edges: {}", stats.edge_count);
    for (node_type, count) in &stats.nodes_by_type {
        println!("  {node_type}: {count}");
    }

    Ok(())
}
