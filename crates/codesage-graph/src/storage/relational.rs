//! Embedded SQLite backend.
//!
//! Nodes and edges live in two tables with JSON property columns. Subgraph
//! loads are a single recursive CTE; attribute filters become
//! `json_extract` comparisons.

use super::filter::{Condition, FilterOp};
use super::{NodeFilter, SaveOptions, StorageAdapter, StorageStatistics};
use crate::config::RelationalConfig;
use crate::error::{GraphError, Result};
use crate::model::{Edge, EdgeRecord, EdgeType, Graph, Node, NodeRecord, NodeType, PropertyMap, PropertyValue};
use log::{debug, info};
use parking_lot::ReentrantMutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id          TEXT PRIMARY KEY,
    type        TEXT NOT NULL,
    properties  TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS edges (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    source      TEXT NOT NULL,
    target      TEXT NOT NULL,
    type        TEXT NOT NULL,
    properties  TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (source, target, type)
);
CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(type);
CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(json_extract(properties, '$.name'));
CREATE INDEX IF NOT EXISTS idx_nodes_qualified_name ON nodes(json_extract(properties, '$.qualified_name'));
CREATE INDEX IF NOT EXISTS idx_nodes_complexity ON nodes(json_extract(properties, '$.complexity'));
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(type);
CREATE INDEX IF NOT EXISTS idx_edges_source_target ON edges(source, target);
"#;

const LOAD_SUBGRAPH: &str = r#"
WITH RECURSIVE traversal(id, type, properties, edge_source, edge_target, edge_type, edge_properties, depth) AS (
    SELECT n.id, n.type, n.properties, e.source, e.target, e.type, e.properties, 0
    FROM nodes n
    LEFT JOIN edges e ON e.source = n.id
    WHERE n.id = ?1
    UNION
    SELECT n.id, n.type, n.properties, e.source, e.target, e.type, e.properties, t.depth + 1
    FROM traversal t
    JOIN nodes n ON n.id = t.edge_target
    LEFT JOIN edges e ON e.source = n.id
    WHERE t.depth < ?2
)
SELECT DISTINCT id, type, properties, edge_source, edge_target, edge_type, edge_properties
FROM traversal
"#;

/// Bound-parameter ceiling of the bundled SQLite (`SQLITE_MAX_VARIABLE_NUMBER`).
const MAX_BOUND_PARAMS: usize = 32_766;
const NODE_COLUMNS: usize = 3;
const EDGE_COLUMNS: usize = 4;

fn sql_error(context: &str) -> impl Fn(rusqlite::Error) -> GraphError + '_ {
    move |e| GraphError::storage(format!("SQLite: {context}: {e}"), Some(e))
}

fn to_json(properties: &PropertyMap) -> Result<String> {
    serde_json::to_string(properties)
        .map_err(|e| GraphError::serialization("Failed to encode properties", Some(e)))
}

fn from_json(json: &str) -> Result<PropertyMap> {
    serde_json::from_str(json)
        .map_err(|e| GraphError::serialization("Failed to decode properties", Some(e)))
}

fn node_from_parts(id: String, node_type: &str, properties: &str) -> Result<Node> {
    Node::from_record(NodeRecord {
        id,
        node_type: node_type.parse()?,
        properties: from_json(properties)?,
    })
}

fn edge_from_parts(source: String, target: String, edge_type: &str, properties: &str) -> Result<Edge> {
    Edge::from_record(EdgeRecord {
        source,
        target,
        edge_type: edge_type.parse()?,
        properties: from_json(properties)?,
    })
}

fn read_edge_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// JSON path for a property key, `None` for keys the path syntax cannot
/// quote.
fn json_path(key: &str) -> Option<String> {
    (!key.contains('"')).then(|| format!("$.\"{key}\""))
}

/// SQL pre-filter for one condition.
///
/// The clause admits at least every row the condition accepts; rows are
/// re-checked in process, so clauses only need to narrow. Stored numbers
/// compare numerically, stored text always passes a numeric comparison
/// (SQLite and Rust disagree on strings like `"inf"`), plain strings only
/// narrow equality, and everything else just requires the property to be
/// present.
fn condition_clause(condition: &Condition) -> Option<(String, Vec<Value>)> {
    let path = json_path(&condition.key)?;
    let extract = "json_extract(properties, ?)";

    let clause = match (&condition.value, condition.op) {
        (PropertyValue::Int(_) | PropertyValue::Float(_), op) if op != FilterOp::Ne => {
            let number = condition.value.as_number()?;
            (
                format!(
                    "(json_type(properties, ?) = 'text' OR CAST({extract} AS REAL) {} ?)",
                    op.symbol()
                ),
                vec![Value::Text(path.clone()), Value::Text(path), Value::Real(number)],
            )
        }
        (PropertyValue::String(s), FilterOp::Eq) if is_plain_text(s) => (
            format!("{extract} = ?"),
            vec![Value::Text(path), Value::Text(s.clone())],
        ),
        _ => (format!("{extract} IS NOT NULL"), vec![Value::Text(path)]),
    };
    Some(clause)
}

/// Strings that can only ever equal another string with the same text.
fn is_plain_text(s: &str) -> bool {
    s != "true" && s != "false" && PropertyValue::String(s.to_string()).as_number().is_none()
}

/// [`StorageAdapter`] over a single SQLite connection.
///
/// The connection sits behind a re-entrant lock: a transaction holds it for
/// its whole scope, so other threads wait while the owning thread can keep
/// calling adapter methods. Nested transactions join the outer one.
pub struct SqliteStorage {
    conn: ReentrantMutex<RefCell<Connection>>,
    config: RelationalConfig,
}

impl SqliteStorage {
    /// Open the database named by `config` and create the schema.
    ///
    /// # Errors
    /// [`GraphError::Storage`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: RelationalConfig) -> Result<Self> {
        let conn = if config.database == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(Path::new(&config.database))
        }
        .map_err(|e| GraphError::storage(format!("Failed to open SQLite database {}", config.database), Some(e)))?;

        conn.busy_timeout(config.busy_timeout)
            .map_err(sql_error("set busy timeout"))?;
        conn.execute_batch(SCHEMA)
            .map_err(sql_error("create schema"))?;

        info!("Opened SQLite graph store at {}", config.database);
        Ok(Self {
            conn: ReentrantMutex::new(RefCell::new(conn)),
            config,
        })
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::open(RelationalConfig::in_memory())
    }

    /// The adapter's configuration.
    pub fn config(&self) -> &RelationalConfig {
        &self.config
    }

    fn echo(&self, sql: &str) {
        if self.config.echo {
            debug!("SQL: {}", sql.split_whitespace().collect::<Vec<_>>().join(" "));
        }
    }

    /// Run `f` against the connection under the lock.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        f(&conn)
    }

    fn execute(&self, sql: &str, params: impl rusqlite::Params) -> Result<usize> {
        self.echo(sql);
        self.with_conn(|conn| conn.execute(sql, params).map_err(sql_error(sql)))
    }

    /// Upsert `nodes`, splitting them so no statement exceeds the
    /// bound-parameter ceiling.
    fn insert_nodes(&self, conn: &Connection, nodes: &[&Node]) -> Result<()> {
        for rows in nodes.chunks(MAX_BOUND_PARAMS / NODE_COLUMNS) {
            self.insert_node_rows(conn, rows)?;
        }
        Ok(())
    }

    fn insert_node_rows(&self, conn: &Connection, nodes: &[&Node]) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["(?, ?, ?)"; nodes.len()].join(", ");
        let sql = format!(
            "INSERT INTO nodes (id, type, properties) VALUES {placeholders} \
             ON CONFLICT(id) DO UPDATE SET type = excluded.type, \
             properties = excluded.properties, updated_at = CURRENT_TIMESTAMP"
        );
        let mut values = Vec::with_capacity(nodes.len() * NODE_COLUMNS);
        for node in nodes {
            values.push(Value::Text(node.id.clone()));
            values.push(Value::Text(node.node_type().to_string()));
            values.push(Value::Text(to_json(&node.properties())?));
        }
        self.echo(&sql);
        conn.execute(&sql, params_from_iter(values))
            .map_err(sql_error("insert nodes"))?;
        Ok(())
    }

    fn insert_edges(&self, conn: &Connection, edges: &[&Edge]) -> Result<()> {
        for rows in edges.chunks(MAX_BOUND_PARAMS / EDGE_COLUMNS) {
            self.insert_edge_rows(conn, rows)?;
        }
        Ok(())
    }

    fn insert_edge_rows(&self, conn: &Connection, edges: &[&Edge]) -> Result<()> {
        if edges.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["(?, ?, ?, ?)"; edges.len()].join(", ");
        let sql = format!(
            "INSERT INTO edges (source, target, type, properties) VALUES {placeholders} \
             ON CONFLICT(source, target, type) DO NOTHING"
        );
        let mut values = Vec::with_capacity(edges.len() * EDGE_COLUMNS);
        for edge in edges {
            values.push(Value::Text(edge.source.clone()));
            values.push(Value::Text(edge.target.clone()));
            values.push(Value::Text(edge.edge_type().to_string()));
            values.push(Value::Text(to_json(&edge.properties())?));
        }
        self.echo(&sql);
        conn.execute(&sql, params_from_iter(values))
            .map_err(sql_error("insert edges"))?;
        Ok(())
    }

    fn select_edges(&self, sql: &str, values: Vec<Value>) -> Result<Vec<Edge>> {
        self.echo(sql);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql).map_err(sql_error(sql))?;
            let rows = stmt
                .query_map(params_from_iter(values), read_edge_row)
                .map_err(sql_error(sql))?;
            let mut edges = Vec::new();
            for row in rows {
                let (source, target, edge_type, properties) = row.map_err(sql_error(sql))?;
                edges.push(edge_from_parts(source, target, &edge_type, &properties)?);
            }
            Ok(edges)
        })
    }

    fn count(&self, sql: &str, values: Vec<Value>) -> Result<usize> {
        self.echo(sql);
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row(sql, params_from_iter(values), |row| row.get(0))
                .map_err(sql_error(sql))?;
            Ok(count as usize)
        })
    }

    fn grouped_counts(&self, sql: &str) -> Result<BTreeMap<String, usize>> {
        self.echo(sql);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(sql_error(sql))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(sql_error(sql))?;
            let mut counts = BTreeMap::new();
            for row in rows {
                let (key, count) = row.map_err(sql_error(sql))?;
                counts.insert(key, count as usize);
            }
            Ok(counts)
        })
    }
}

impl StorageAdapter for SqliteStorage {
    fn save_graph(&self, graph: &Graph, options: &SaveOptions) -> Result<()> {
        let batch_size = options.batch_size.unwrap_or(self.config.batch_size).max(1);
        let nodes: Vec<&Node> = graph.nodes().collect();
        let edges: Vec<&Edge> = graph.edges().collect();

        self.run_in_transaction(&mut || {
            self.with_conn(|conn| {
                for chunk in nodes.chunks(batch_size) {
                    self.insert_nodes(conn, chunk)?;
                }
                for chunk in edges.chunks(batch_size) {
                    self.insert_edges(conn, chunk)?;
                }
                Ok(())
            })
        })?;

        info!(
            "Saved graph to SQLite: {} nodes, {} edges",
            nodes.len(),
            edges.len()
        );
        Ok(())
    }

    fn load_graph(&self, root_id: &str, max_depth: usize) -> Result<Graph> {
        self.echo(LOAD_SUBGRAPH);
        let (nodes, edges) = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached(LOAD_SUBGRAPH)
                .map_err(sql_error("prepare subgraph load"))?;
            let mut rows = stmt
                .query(params![root_id, max_depth as i64])
                .map_err(sql_error("load subgraph"))?;

            let mut seen = HashSet::new();
            let mut nodes = Vec::new();
            let mut edges = Vec::new();
            while let Some(row) = rows.next().map_err(sql_error("load subgraph"))? {
                let id: String = row.get(0).map_err(sql_error("read node id"))?;
                if seen.insert(id.clone()) {
                    let node_type: String = row.get(1).map_err(sql_error("read node type"))?;
                    let properties: String = row.get(2).map_err(sql_error("read node properties"))?;
                    nodes.push(node_from_parts(id, &node_type, &properties)?);
                }

                let source: Option<String> = row.get(3).map_err(sql_error("read edge"))?;
                let target: Option<String> = row.get(4).map_err(sql_error("read edge"))?;
                let edge_type: Option<String> = row.get(5).map_err(sql_error("read edge"))?;
                let properties: Option<String> = row.get(6).map_err(sql_error("read edge"))?;
                if let (Some(source), Some(target), Some(edge_type), Some(properties)) =
                    (source, target, edge_type, properties)
                {
                    edges.push(edge_from_parts(source, target, &edge_type, &properties)?);
                }
            }
            Ok((nodes, edges))
        })?;

        if nodes.is_empty() {
            return Err(GraphError::node_not_found(root_id));
        }

        let mut graph = Graph::new();
        for node in nodes {
            graph.add_node(node);
        }
        for edge in edges {
            if graph.has_node(&edge.source) && graph.has_node(&edge.target) {
                graph.add_edge(edge)?;
            }
        }
        Ok(graph)
    }

    fn query_nodes(
        &self,
        node_type: Option<NodeType>,
        filter: &NodeFilter,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Node>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(node_type) = node_type {
            clauses.push("type = ?".to_string());
            values.push(Value::Text(node_type.to_string()));
        }
        for condition in filter.conditions() {
            if let Some((clause, params)) = condition_clause(condition) {
                clauses.push(clause);
                values.extend(params);
            }
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!("SELECT id, type, properties FROM nodes{where_clause} ORDER BY id");
        self.echo(&sql);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql).map_err(sql_error("prepare node query"))?;
            let mut rows = stmt
                .query(params_from_iter(values))
                .map_err(sql_error("query nodes"))?;

            let limit = limit.unwrap_or(usize::MAX);
            let mut skipped = 0;
            let mut nodes = Vec::new();
            while nodes.len() < limit {
                let Some(row) = rows.next().map_err(sql_error("query nodes"))? else {
                    break;
                };
                let id: String = row.get(0).map_err(sql_error("read node id"))?;
                let node_type: String = row.get(1).map_err(sql_error("read node type"))?;
                let properties: String = row.get(2).map_err(sql_error("read node properties"))?;
                let node = node_from_parts(id, &node_type, &properties)?;

                if !filter.matches(&node) {
                    continue;
                }
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                nodes.push(node);
            }
            Ok(nodes)
        })
    }

    fn save_node(&self, node: &Node) -> Result<()> {
        self.with_conn(|conn| self.insert_nodes(conn, &[node]))
    }

    fn save_edge(&self, edge: &Edge) -> Result<()> {
        self.with_conn(|conn| self.insert_edges(conn, &[edge]))
    }

    fn delete_node(&self, node_id: &str) -> Result<()> {
        self.run_in_transaction(&mut || {
            self.execute("DELETE FROM edges WHERE source = ?1 OR target = ?1", params![node_id])?;
            self.execute("DELETE FROM nodes WHERE id = ?1", params![node_id])?;
            Ok(())
        })
    }

    fn delete_edge(&self, source: &str, target: &str, edge_type: Option<EdgeType>) -> Result<()> {
        match edge_type {
            Some(edge_type) => self.execute(
                "DELETE FROM edges WHERE source = ?1 AND target = ?2 AND type = ?3",
                params![source, target, edge_type.as_str()],
            ),
            None => self.execute(
                "DELETE FROM edges WHERE source = ?1 AND target = ?2",
                params![source, target],
            ),
        }?;
        Ok(())
    }

    fn get_node(&self, node_id: &str) -> Result<Node> {
        let sql = "SELECT type, properties FROM nodes WHERE id = ?1";
        self.echo(sql);
        let row = self.with_conn(|conn| {
            conn.query_row(sql, params![node_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .optional()
            .map_err(sql_error(sql))
        })?;

        match row {
            Some((node_type, properties)) => node_from_parts(node_id.to_string(), &node_type, &properties),
            None => Err(GraphError::node_not_found(node_id)),
        }
    }

    fn get_edges(&self, source: &str, target: Option<&str>, edge_type: Option<EdgeType>) -> Result<Vec<Edge>> {
        let mut sql = String::from("SELECT source, target, type, properties FROM edges WHERE source = ?");
        let mut values = vec![Value::Text(source.to_string())];
        if let Some(target) = target {
            sql.push_str(" AND target = ?");
            values.push(Value::Text(target.to_string()));
        }
        if let Some(edge_type) = edge_type {
            sql.push_str(" AND type = ?");
            values.push(Value::Text(edge_type.to_string()));
        }
        sql.push_str(" ORDER BY id");
        self.select_edges(&sql, values)
    }

    fn get_incoming_edges(&self, target: &str, edge_type: Option<EdgeType>) -> Result<Vec<Edge>> {
        let mut sql = String::from("SELECT source, target, type, properties FROM edges WHERE target = ?");
        let mut values = vec![Value::Text(target.to_string())];
        if let Some(edge_type) = edge_type {
            sql.push_str(" AND type = ?");
            values.push(Value::Text(edge_type.to_string()));
        }
        sql.push_str(" ORDER BY id");
        self.select_edges(&sql, values)
    }

    fn node_exists(&self, node_id: &str) -> Result<bool> {
        Ok(self.count("SELECT COUNT(*) FROM nodes WHERE id = ?", vec![Value::Text(node_id.to_string())])? > 0)
    }

    fn node_count(&self, node_type: Option<NodeType>) -> Result<usize> {
        match node_type {
            Some(t) => self.count("SELECT COUNT(*) FROM nodes WHERE type = ?", vec![Value::Text(t.to_string())]),
            None => self.count("SELECT COUNT(*) FROM nodes", Vec::new()),
        }
    }

    fn edge_count(&self, edge_type: Option<EdgeType>) -> Result<usize> {
        match edge_type {
            Some(t) => self.count("SELECT COUNT(*) FROM edges WHERE type = ?", vec![Value::Text(t.to_string())]),
            None => self.count("SELECT COUNT(*) FROM edges", Vec::new()),
        }
    }

    fn clear_all(&self) -> Result<()> {
        self.run_in_transaction(&mut || {
            self.execute("DELETE FROM edges", [])?;
            self.execute("DELETE FROM nodes", [])?;
            Ok(())
        })?;
        info!("Cleared all data from SQLite");
        Ok(())
    }

    fn statistics(&self) -> Result<StorageStatistics> {
        let nodes_by_type = self.grouped_counts("SELECT type, COUNT(*) FROM nodes GROUP BY type")?;
        let edges_by_type = self.grouped_counts("SELECT type, COUNT(*) FROM edges GROUP BY type")?;
        Ok(StorageStatistics {
            backend: "sqlite".to_string(),
            node_count: nodes_by_type.values().sum(),
            edge_count: edges_by_type.values().sum(),
            nodes_by_type,
            edges_by_type,
        })
    }

    fn run_in_transaction(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let guard = self.conn.lock();
        if !guard.borrow().is_autocommit() {
            // already inside a transaction on this thread
            return body();
        }

        self.echo("BEGIN");
        guard
            .borrow()
            .execute_batch("BEGIN")
            .map_err(sql_error("begin transaction"))?;
        let mut rollback = RollbackGuard {
            conn: &*guard,
            armed: true,
        };

        body().map_err(GraphError::into_transaction_failure)?;

        self.echo("COMMIT");
        guard
            .borrow()
            .execute_batch("COMMIT")
            .map_err(|e| GraphError::storage("Failed to commit transaction", Some(e)))?;
        rollback.armed = false;
        Ok(())
    }
}

/// Rolls back an open transaction unless disarmed; runs on error returns
/// and while unwinding from a panic.
struct RollbackGuard<'a> {
    conn: &'a RefCell<Connection>,
    armed: bool,
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(conn) = self.conn.try_borrow() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                debug!("Rollback failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeKind, FunctionNode, NodeKind};
    use crate::storage::StorageExt;

    fn func(name: &str, complexity: i64) -> Node {
        Node::from_kind(
            NodeKind::Function(FunctionNode::new(name, name, 1, 2).with_complexity(complexity)),
            Some("a.py"),
        )
    }

    #[test]
    fn test_condition_clause_numeric() {
        let condition = Condition {
            key: "complexity".to_string(),
            op: FilterOp::Gt,
            value: PropertyValue::Int(10),
        };
        let (clause, params) = condition_clause(&condition).unwrap();
        let path = Value::Text("$.\"complexity\"".to_string());
        assert_eq!(
            clause,
            "(json_type(properties, ?) = 'text' OR CAST(json_extract(properties, ?) AS REAL) > ?)"
        );
        assert_eq!(params, vec![path.clone(), path, Value::Real(10.0)]);
    }

    #[test]
    fn test_condition_clause_skips_unquotable_keys() {
        let condition = Condition {
            key: "we\"ird".to_string(),
            op: FilterOp::Eq,
            value: PropertyValue::Int(1),
        };
        assert!(condition_clause(&condition).is_none());
    }

    #[test]
    fn test_upsert_replaces_node_properties() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.save_node(&func("a", 1)).unwrap();
        storage.save_node(&func("a", 9)).unwrap();

        assert_eq!(storage.node_count(None).unwrap(), 1);
        let node = storage.get_node("function:a.py:a").unwrap();
        assert_eq!(node.property("complexity"), Some(9i64.into()));
    }

    #[test]
    fn test_duplicate_edge_is_skipped() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, b) = (func("a", 1), func("b", 1));
        storage.save_node(&a).unwrap();
        storage.save_node(&b).unwrap();

        let first = Edge::new(
            a.id.clone(),
            b.id.clone(),
            EdgeKind::Calls {
                call_site: Some(1),
                call_type: "direct".to_string(),
                arguments: None,
            },
        );
        let second = Edge::new(
            a.id.clone(),
            b.id.clone(),
            EdgeKind::Calls {
                call_site: Some(2),
                call_type: "direct".to_string(),
                arguments: None,
            },
        );
        storage.save_edge(&first).unwrap();
        storage.save_edge(&second).unwrap();

        let edges = storage.get_edges(&a.id, None, None).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].properties().get_int("call_site"), Some(1));
    }

    #[test]
    fn test_numeric_string_filter() {
        let storage = SqliteStorage::in_memory().unwrap();
        let node = func("a", 1).with_extra("score", "15");
        storage.save_node(&node).unwrap();
        storage.save_node(&func("b", 1).with_extra("score", "abc")).unwrap();

        let found = storage
            .query_nodes(None, &NodeFilter::new().gt("score", 10i64), None, 0)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, node.id);
    }

    #[test]
    fn test_numeric_filter_admits_text_sqlite_cannot_cast() {
        let storage = SqliteStorage::in_memory().unwrap();
        let unbounded = func("a", 1).with_extra("score", "inf");
        storage.save_node(&unbounded).unwrap();
        storage.save_node(&func("b", 1).with_extra("score", "NaN")).unwrap();
        storage.save_node(&func("c", 1).with_extra("score", 3i64)).unwrap();

        let found = storage
            .query_nodes(None, &NodeFilter::new().gt("score", 10i64), None, 0)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, unbounded.id);
    }

    #[test]
    fn test_save_graph_with_batch_over_parameter_limit() {
        let storage = SqliteStorage::in_memory().unwrap();
        let mut graph = Graph::new();
        let count = MAX_BOUND_PARAMS / NODE_COLUMNS + 1_000;
        for i in 0..count {
            graph.add_node(func(&format!("f{i}"), 1));
        }
        for i in 1..count {
            let edge = Edge::of_type(
                format!("function:a.py:f{}", i - 1),
                format!("function:a.py:f{i}"),
                EdgeType::Calls,
            );
            graph.add_edge(edge).unwrap();
        }

        storage
            .save_graph(&graph, &SaveOptions::default().with_batch_size(20_000))
            .unwrap();
        assert_eq!(storage.node_count(None).unwrap(), count);
        assert_eq!(storage.edge_count(None).unwrap(), count - 1);
    }

    #[test]
    fn test_sql_errors_carry_sqlite_reason() {
        let storage = SqliteStorage::in_memory().unwrap();
        let err = storage.execute("SELECT * FROM no_such_table", []).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("no such table"), "{message}");
    }

    #[test]
    fn test_nested_transaction_joins_outer() {
        let storage = SqliteStorage::in_memory().unwrap();
        let result = storage.transaction(|s| {
            s.save_node(&func("a", 1))?;
            s.transaction(|inner| inner.save_node(&func("b", 1)))?;
            Err::<(), _>(GraphError::invalid_operation("abort"))
        });

        assert!(matches!(result, Err(GraphError::Storage { .. })));
        assert_eq!(storage.node_count(None).unwrap(), 0);
    }

    #[test]
    fn test_panic_rolls_back() {
        let storage = SqliteStorage::in_memory().unwrap();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = storage.transaction(|s| -> Result<()> {
                s.save_node(&func("a", 1))?;
                panic!("boom");
            });
        }));

        assert!(outcome.is_err());
        assert_eq!(storage.node_count(None).unwrap(), 0);
        // the connection is usable for the next transaction
        storage.transaction(|s| s.save_node(&func("b", 1))).unwrap();
        assert_eq!(storage.node_count(None).unwrap(), 1);
    }

    #[test]
    fn test_statistics() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, b) = (func("a", 1), func("b", 1));
        storage.save_node(&a).unwrap();
        storage.save_node(&b).unwrap();
        storage.save_edge(&Edge::of_type(a.id.clone(), b.id.clone(), EdgeType::Calls)).unwrap();

        let stats = storage.statistics().unwrap();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.nodes_by_type.get("function"), Some(&2));
        assert_eq!(stats.edges_by_type.get("calls"), Some(&1));
    }
}
