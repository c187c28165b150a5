use codesage_graph::{QueryProcessor, RelationalConfig, SqliteStorage, StorageAdapter};
use std::env;
use std::process;

fn main() {
    let mut args = env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "./example.db".to_string());
    let query = args.next().unwrap_or_else(|| "FIND file".to_string());

    let storage = match SqliteStorage::open(RelationalConfig::default().with_database(&path)) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("Failed to open {path}: {e}");
            process::exit(1);
        }
    };

    match storage.statistics() {
        Ok(stats) => {
            println!("Node count: {}", stats.node_count);
            println!("Edge count: {}", stats.edge_count);
            for (edge_type, count) in &stats.edges_by_type {
                println!("  {edge_type}: {count}");
            }
        }
        Err(e) => eprintln!("Failed to read statistics: {e}"),
    }

    println!("\n--- {query} ---");
    let processor = QueryProcessor::new(&storage);
    match processor.execute(&query) {
        Ok(result) => {
            for node in &result.nodes {
                let outgoing = storage.get_edges(&node.id, None, None).map(|e| e.len()).unwrap_or(0);
                let incoming = storage
                    .get_incoming_edges(&node.id, None)
                    .map(|e| e.len())
                    .unwrap_or(0);
                println!("{} out={outgoing} in={incoming}", node.id);
            }
            println!("\n{} of {} matches", result.nodes.len(), result.total_count);
        }
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    }
}
