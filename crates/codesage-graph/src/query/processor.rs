//! Query planning and execution against a [`StorageAdapter`].

use super::dsl::{parse_query, AttributeCondition, ComparisonOp, Condition, Query, RelationCondition};
use super::schema::{validate, GraphSchema};
use crate::error::{GraphError, Result};
use crate::model::{Direction, EdgeType, Node, NodeType, PropertyValue};
use crate::storage::{NodeFilter, StorageAdapter};
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

/// Upper bound on nodes a single scan reads from storage.
pub const SCAN_LIMIT: usize = 10_000;

/// Cap on results of [`QueryProcessor::find_functions_calling`].
pub const CALLERS_LIMIT: usize = 100;

/// Cap on results of [`QueryProcessor::find_high_complexity_functions`].
pub const COMPLEXITY_LIMIT: usize = 1_000;

/// One step of an [`ExecutionPlan`].
#[derive(Debug, Clone)]
pub enum PlanStep {
    /// Storage scan with attribute filters pushed down
    FilteredScan {
        /// Type scanned
        node_type: NodeType,
        /// Conditions handed to storage
        filter: NodeFilter,
    },
    /// Storage scan of every node of a type
    TypeScan {
        /// Type scanned
        node_type: NodeType,
    },
    /// Keep candidates that have a matching edge
    RelationFilter(RelationCondition),
    /// Evaluate conditions storage could not
    InProcessFilter {
        /// Conditions evaluated per candidate
        conditions: usize,
    },
}

impl PlanStep {
    /// Estimated relative cost.
    pub fn cost(&self) -> u32 {
        match self {
            PlanStep::FilteredScan { .. } => 100,
            PlanStep::TypeScan { .. } => 500,
            PlanStep::RelationFilter(_) => 200,
            PlanStep::InProcessFilter { .. } => 0,
        }
    }

    /// Step name (`filtered_scan`, `type_scan`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            PlanStep::FilteredScan { .. } => "filtered_scan",
            PlanStep::TypeScan { .. } => "type_scan",
            PlanStep::RelationFilter(_) => "relation_filter",
            PlanStep::InProcessFilter { .. } => "in_process_filter",
        }
    }
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStep::FilteredScan { node_type, filter } => {
                write!(f, "filtered_scan({node_type}, {} conditions)", filter.conditions().len())
            }
            PlanStep::TypeScan { node_type } => write!(f, "type_scan({node_type})"),
            PlanStep::RelationFilter(r) => {
                write!(f, "relation_filter({} '{}')", r.relation.keyword(), r.target)
            }
            PlanStep::InProcessFilter { conditions } => write!(f, "in_process_filter({conditions})"),
        }
    }
}

/// Ordered steps chosen for a query.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// Steps in execution order
    pub steps: Vec<PlanStep>,
    /// Sum of the step costs
    pub estimated_cost: u32,
}

impl ExecutionPlan {
    fn push(&mut self, step: PlanStep) {
        self.estimated_cost += step.cost();
        self.steps.push(step);
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.steps.iter().map(ToString::to_string).collect();
        write!(f, "{} (cost {})", steps.join(" -> "), self.estimated_cost)
    }
}

/// Result of a query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Page of matching nodes
    pub nodes: Vec<Node>,
    /// Matches before LIMIT/OFFSET
    pub total_count: usize,
    /// Wall time spent planning and executing
    pub execution_time: Duration,
    /// Plan that produced the result
    pub plan: ExecutionPlan,
}

/// Executes DSL queries and canned structural queries over a storage
/// adapter.
///
/// ```
/// use codesage_graph::query::QueryProcessor;
/// use codesage_graph::SqliteStorage;
///
/// let storage = SqliteStorage::in_memory().unwrap();
/// let processor = QueryProcessor::new(&storage);
/// let result = processor.execute("FIND function WHERE complexity > 10").unwrap();
/// assert_eq!(result.total_count, 0);
/// ```
pub struct QueryProcessor<'a> {
    storage: &'a dyn StorageAdapter,
    schema: Option<GraphSchema>,
}

impl<'a> QueryProcessor<'a> {
    /// Processor over `storage` without schema validation.
    pub fn new(storage: &'a dyn StorageAdapter) -> Self {
        Self { storage, schema: None }
    }

    /// Validate every query against `schema` before running it.
    pub fn with_schema(mut self, schema: GraphSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Parse and run a query string.
    ///
    /// # Errors
    ///
    /// [`GraphError::QuerySyntax`] for an invalid query, storage errors as
    /// they occur.
    pub fn execute(&self, query: &str) -> Result<QueryResult> {
        let query = parse_query(query)?;
        self.execute_query(&query)
    }

    /// Run a parsed query.
    pub fn execute_query(&self, query: &Query) -> Result<QueryResult> {
        let started = Instant::now();
        if let Some(schema) = &self.schema {
            validate(query, schema)?;
        }

        let node_type: NodeType = query
            .find
            .node_type
            .parse()
            .map_err(|_| GraphError::query_syntax(format!("Unknown node type: {}", query.find.node_type), None))?;

        let plan = self.plan(query, node_type);
        debug!("Executing {query} with plan {plan}");
        let mut nodes = self.run(query, &plan)?;

        let total_count = nodes.len();
        let offset = query.offset.unwrap_or(0);
        nodes = nodes
            .into_iter()
            .skip(offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(QueryResult {
            nodes,
            total_count,
            execution_time: started.elapsed(),
            plan,
        })
    }

    /// Choose scan and filter steps for a query.
    ///
    /// Without `OR` every condition is a conjunct: comparisons storage can
    /// evaluate are pushed into the scan, relations become filter steps, and
    /// only `LIKE` is left for the in-process pass. With `OR` the whole
    /// clause is folded in process over a type scan.
    pub fn plan(&self, query: &Query, node_type: NodeType) -> ExecutionPlan {
        let mut plan = ExecutionPlan::default();
        let Some(where_clause) = &query.where_clause else {
            plan.push(PlanStep::TypeScan { node_type });
            return plan;
        };

        if where_clause.has_or() {
            plan.push(PlanStep::TypeScan { node_type });
            plan.push(PlanStep::InProcessFilter {
                conditions: where_clause.conditions().count(),
            });
            return plan;
        }

        let mut filter = NodeFilter::new();
        let mut residual = 0;
        for attr in query.attribute_conditions() {
            match attr.op.filter_op() {
                Some(op) => filter.push(attr.attribute.clone(), op, attr.value.clone()),
                None => residual += 1,
            }
        }

        if filter.is_empty() {
            plan.push(PlanStep::TypeScan { node_type });
        } else {
            plan.push(PlanStep::FilteredScan { node_type, filter });
        }
        for relation in query.relation_conditions() {
            plan.push(PlanStep::RelationFilter(relation.clone()));
        }
        if residual > 0 {
            plan.push(PlanStep::InProcessFilter { conditions: residual });
        }
        plan
    }

    fn run(&self, query: &Query, plan: &ExecutionPlan) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        for step in &plan.steps {
            match step {
                PlanStep::TypeScan { node_type } => {
                    nodes = self.scan(*node_type, &NodeFilter::new())?;
                }
                PlanStep::FilteredScan { node_type, filter } => {
                    nodes = self.scan(*node_type, filter)?;
                }
                PlanStep::RelationFilter(relation) => {
                    nodes = self.retain(nodes, |node| self.has_relation(node, relation))?;
                }
                PlanStep::InProcessFilter { .. } => {
                    let Some(where_clause) = &query.where_clause else { continue };
                    let fold_all = where_clause.has_or();
                    nodes = self.retain(nodes, |node| {
                        if fold_all {
                            where_clause.evaluate(|condition| self.evaluate(node, condition))
                        } else {
                            Ok(query
                                .attribute_conditions()
                                .filter(|a| a.op == ComparisonOp::Like)
                                .all(|a| attribute_matches(node, a)))
                        }
                    })?;
                }
            }
        }
        Ok(nodes)
    }

    fn scan(&self, node_type: NodeType, filter: &NodeFilter) -> Result<Vec<Node>> {
        self.storage.query_nodes(Some(node_type), filter, Some(SCAN_LIMIT), 0)
    }

    fn retain<F>(&self, nodes: Vec<Node>, mut keep: F) -> Result<Vec<Node>>
    where
        F: FnMut(&Node) -> Result<bool>,
    {
        let mut kept = Vec::with_capacity(nodes.len());
        for node in nodes {
            if keep(&node)? {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn evaluate(&self, node: &Node, condition: &Condition) -> Result<bool> {
        match condition {
            Condition::Attribute(attr) => Ok(attribute_matches(node, attr)),
            Condition::Relation(relation) => self.has_relation(node, relation),
        }
    }

    /// True when `node` has an edge of the relation's type whose far end
    /// matches the relation's target pattern.
    pub fn has_relation(&self, node: &Node, relation: &RelationCondition) -> Result<bool> {
        let edge_type = relation.relation.edge_type();
        Ok(match relation.direction {
            Direction::Outgoing => self
                .storage
                .get_edges(&node.id, None, Some(edge_type))?
                .iter()
                .any(|e| relation.target_matches(&e.target)),
            Direction::Incoming => self
                .storage
                .get_incoming_edges(&node.id, Some(edge_type))?
                .iter()
                .any(|e| relation.target_matches(&e.source)),
        })
    }

    fn nodes_with_edge_to(&self, node_type: NodeType, edge_type: EdgeType, target: &str) -> Result<Vec<Node>> {
        let candidates = self.scan(node_type, &NodeFilter::new())?;
        self.retain(candidates, |node| {
            Ok(self
                .storage
                .get_edges(&node.id, None, Some(edge_type))?
                .iter()
                .any(|e| id_matches(&e.target, target)))
        })
    }

    /// Functions with a `calls` edge to `function`, matched as an id or id
    /// suffix. At most [`CALLERS_LIMIT`] results.
    pub fn find_functions_calling(&self, function: &str) -> Result<Vec<Node>> {
        let mut callers = self.nodes_with_edge_to(NodeType::Function, EdgeType::Calls, function)?;
        callers.truncate(CALLERS_LIMIT);
        Ok(callers)
    }

    /// Classes deriving from `base_class`, directly or transitively, up to
    /// `max_depth` levels, in breadth-first order.
    pub fn class_hierarchy(&self, base_class: &str, max_depth: usize) -> Result<Vec<Node>> {
        let classes = self.scan(NodeType::Class, &NodeFilter::new())?;
        let mut bases: HashMap<&str, Vec<String>> = HashMap::new();
        for class in &classes {
            let targets = self
                .storage
                .get_edges(&class.id, None, Some(EdgeType::Inherits))?
                .into_iter()
                .map(|e| e.target)
                .collect();
            bases.insert(class.id.as_str(), targets);
        }

        let mut hierarchy = Vec::new();
        let mut included: HashSet<&str> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::from([(base_class.to_string(), 0usize)]);

        while let Some((name, depth)) = queue.pop_front() {
            if depth > max_depth || !visited.insert(name.clone()) {
                continue;
            }
            for class in &classes {
                if included.contains(class.id.as_str()) {
                    continue;
                }
                let derives = bases
                    .get(class.id.as_str())
                    .is_some_and(|targets| targets.iter().any(|t| id_matches(t, &name)));
                if derives {
                    included.insert(class.id.as_str());
                    hierarchy.push(class.clone());
                    queue.push_back((class.qualified_name().to_string(), depth + 1));
                }
            }
        }
        Ok(hierarchy)
    }

    /// Files with an `imports` edge to `module`.
    pub fn find_file_dependencies(&self, module: &str) -> Result<Vec<Node>> {
        self.nodes_with_edge_to(NodeType::File, EdgeType::Imports, module)
    }

    /// Functions whose complexity exceeds `threshold`.
    pub fn find_high_complexity_functions(&self, threshold: i64) -> Result<Vec<Node>> {
        self.storage.query_nodes(
            Some(NodeType::Function),
            &NodeFilter::new().gt("complexity", threshold),
            Some(COMPLEXITY_LIMIT),
            0,
        )
    }

    /// Functions that are never the target of a `calls` edge.
    ///
    /// Names starting with `main` or `__` are entry points and never
    /// reported.
    pub fn find_unused_functions(&self) -> Result<Vec<Node>> {
        let functions = self.scan(NodeType::Function, &NodeFilter::new())?;
        let mut called = HashSet::new();
        for function in &functions {
            for edge in self.storage.get_edges(&function.id, None, Some(EdgeType::Calls))? {
                called.insert(edge.target);
            }
        }

        Ok(functions
            .into_iter()
            .filter(|f| !called.contains(&f.id))
            .filter(|f| !f.name().starts_with("main") && !f.name().starts_with("__"))
            .collect())
    }
}

fn id_matches(id: &str, pattern: &str) -> bool {
    pattern == "*" || id.ends_with(pattern)
}

/// In-process evaluation of one attribute condition.
fn attribute_matches(node: &Node, condition: &AttributeCondition) -> bool {
    let actual = node.property(&condition.attribute);
    match condition.op.filter_op() {
        Some(op) => op.evaluate(actual.as_ref(), &condition.value),
        None => actual.is_some_and(|value| {
            !matches!(value, PropertyValue::Null)
                && value
                    .as_text()
                    .to_lowercase()
                    .contains(&condition.value.as_text().to_lowercase())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassNode, Edge, FunctionNode, NodeKind};
    use crate::storage::{SqliteStorage, StorageAdapter};

    fn func(name: &str, complexity: i64) -> Node {
        Node::from_kind(
            NodeKind::Function(FunctionNode::new(name, name, 1, 2).with_complexity(complexity)),
            Some("a.py"),
        )
    }

    fn class(name: &str) -> Node {
        Node::from_kind(NodeKind::Class(ClassNode::new(name, name, 1, 2)), Some("a.py"))
    }

    fn calls(storage: &SqliteStorage, from: &Node, to: &Node) {
        storage
            .save_edge(&Edge::of_type(from.id.clone(), to.id.clone(), EdgeType::Calls))
            .unwrap();
    }

    fn fixture() -> SqliteStorage {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, b, c) = (func("a", 15), func("b", 3), func("c", 12));
        for node in [&a, &b, &c] {
            storage.save_node(node).unwrap();
        }
        calls(&storage, &a, &b);
        storage
    }

    #[test]
    fn test_plan_pushes_down_conjunctions() {
        let storage = fixture();
        let processor = QueryProcessor::new(&storage);
        let query = parse_query("FIND function WHERE complexity > 10 AND name LIKE 'a' AND CALLING 'b'").unwrap();

        let plan = processor.plan(&query, NodeType::Function);
        let names: Vec<_> = plan.steps.iter().map(PlanStep::name).collect();
        assert_eq!(names, ["filtered_scan", "relation_filter", "in_process_filter"]);
        assert_eq!(plan.estimated_cost, 300);
    }

    #[test]
    fn test_plan_with_or_scans_type() {
        let storage = fixture();
        let processor = QueryProcessor::new(&storage);
        let query = parse_query("FIND function WHERE complexity > 10 OR CALLING 'b'").unwrap();

        let plan = processor.plan(&query, NodeType::Function);
        let names: Vec<_> = plan.steps.iter().map(PlanStep::name).collect();
        assert_eq!(names, ["type_scan", "in_process_filter"]);
    }

    #[test]
    fn test_execute_conjunction() {
        let storage = fixture();
        let processor = QueryProcessor::new(&storage);

        let result = processor
            .execute("FIND function WHERE complexity > 10 AND CALLING 'b'")
            .unwrap();
        let ids: Vec<_> = result.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["function:a.py:a"]);
    }

    #[test]
    fn test_execute_or_folds_relations() {
        let storage = fixture();
        let processor = QueryProcessor::new(&storage);

        let result = processor
            .execute("FIND function WHERE complexity < 5 OR CALLING 'b'")
            .unwrap();
        let mut names: Vec<_> = result.nodes.iter().map(|n| n.name().to_string()).collect();
        names.sort();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_like_is_case_insensitive_substring() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.save_node(&func("ParseHeader", 1)).unwrap();
        storage.save_node(&func("render", 1)).unwrap();
        let processor = QueryProcessor::new(&storage);

        let result = processor.execute("FIND function WHERE name LIKE 'parse'").unwrap();
        assert_eq!(result.total_count, 1);
        assert_eq!(result.nodes[0].name(), "ParseHeader");
    }

    #[test]
    fn test_pagination_after_filtering() {
        let storage = fixture();
        let processor = QueryProcessor::new(&storage);

        let result = processor.execute("FIND function LIMIT 1 OFFSET 1").unwrap();
        assert_eq!(result.total_count, 3);
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].name(), "b");

        let empty = processor.execute("FIND function LIMIT 0").unwrap();
        assert!(empty.nodes.is_empty());
        assert_eq!(empty.total_count, 3);
    }

    #[test]
    fn test_unknown_node_type() {
        let storage = fixture();
        let processor = QueryProcessor::new(&storage);
        let err = processor.execute("FIND widget").unwrap_err();
        assert!(matches!(err, GraphError::QuerySyntax { .. }));
    }

    #[test]
    fn test_contains_matches_container() {
        let storage = fixture();
        let file = Node::from_kind(
            NodeKind::File(crate::model::FileNode {
                path: "a.py".to_string(),
                language: "python".to_string(),
                loc: 10,
            }),
            None,
        );
        storage.save_node(&file).unwrap();
        storage
            .save_edge(&Edge::of_type(file.id.clone(), "function:a.py:c", EdgeType::Contains))
            .unwrap();

        let processor = QueryProcessor::new(&storage);
        let result = processor.execute("FIND function WHERE CONTAINS 'file:a.py'").unwrap();
        let names: Vec<_> = result.nodes.iter().map(Node::name).collect();
        assert_eq!(names, ["c"]);
    }

    #[test]
    fn test_unused_functions() {
        let storage = fixture();
        storage.save_node(&func("main", 1)).unwrap();
        storage.save_node(&func("__init__", 1)).unwrap();
        let processor = QueryProcessor::new(&storage);

        let mut names: Vec<_> = processor
            .find_unused_functions()
            .unwrap()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn test_high_complexity_and_callers() {
        let storage = fixture();
        let processor = QueryProcessor::new(&storage);

        let complex = processor.find_high_complexity_functions(10).unwrap();
        assert_eq!(complex.len(), 2);

        let callers = processor.find_functions_calling("b").unwrap();
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].name(), "a");
    }

    #[test]
    fn test_class_hierarchy_depth() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (base, mid, leaf) = (class("Base"), class("Mid"), class("Leaf"));
        for node in [&base, &mid, &leaf] {
            storage.save_node(node).unwrap();
        }
        storage
            .save_edge(&Edge::of_type(mid.id.clone(), base.id.clone(), EdgeType::Inherits))
            .unwrap();
        storage
            .save_edge(&Edge::of_type(leaf.id.clone(), mid.id.clone(), EdgeType::Inherits))
            .unwrap();
        let processor = QueryProcessor::new(&storage);

        let all: Vec<_> = processor
            .class_hierarchy("Base", 5)
            .unwrap()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(all, ["Mid", "Leaf"]);

        let direct = processor.class_hierarchy("Base", 0).unwrap();
        assert_eq!(direct.len(), 1);
    }
}
