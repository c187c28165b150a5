//! Query language over stored graphs.
//!
//! [`parse_query`] turns a query string into a [`Query`], [`validate`]
//! checks it against a [`GraphSchema`], and [`QueryProcessor`] plans and
//! runs it against any [`StorageAdapter`](crate::StorageAdapter).

pub mod dsl;
pub mod processor;
pub mod schema;

pub use dsl::{
    parse_query, AttributeCondition, ComparisonOp, Condition, FindClause, Keyword, LogicalOp, Query, Relation,
    RelationCondition, WhereClause,
};
pub use processor::{ExecutionPlan, PlanStep, QueryProcessor, QueryResult, SCAN_LIMIT};
pub use schema::{validate, EdgeTypeSchema, GraphSchema, NodeTypeSchema};
