//! Property filters for `query_nodes`.
//!
//! A filter is a conjunction of `(key, op, value)` conditions. The JSON form
//! mirrors what callers already write for document stores:
//!
//! ```
//! use codesage_graph::NodeFilter;
//! use serde_json::json;
//!
//! let filter = NodeFilter::from_json(&json!({
//!     "complexity": {"$gt": 10},
//!     "name": "parse",
//! }))
//! .unwrap();
//! assert_eq!(filter.conditions().len(), 2);
//! ```
//!
//! Semantics shared by every backend:
//! - a missing or null property fails every condition, `$ne` included;
//! - when either side is a number, both sides are coerced to numbers (numeric
//!   strings count) and a non-numeric side fails the condition;
//! - otherwise values compare as text.

use crate::error::{GraphError, Result};
use crate::model::{Node, PropertyMap, PropertyValue};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    /// Exact match
    Eq,
    /// `$ne`
    Ne,
    /// `$gt`
    Gt,
    /// `$gte`
    Gte,
    /// `$lt`
    Lt,
    /// `$lte`
    Lte,
}

impl FilterOp {
    /// Parse a `$`-prefixed operator name.
    pub fn from_operator(op: &str) -> Option<Self> {
        match op {
            "$eq" => Some(FilterOp::Eq),
            "$ne" => Some(FilterOp::Ne),
            "$gt" => Some(FilterOp::Gt),
            "$gte" => Some(FilterOp::Gte),
            "$lt" => Some(FilterOp::Lt),
            "$lte" => Some(FilterOp::Lte),
            _ => None,
        }
    }

    /// Operator symbol as used in SQL.
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
        }
    }

    /// Evaluate the operator against a property that may be absent.
    pub fn evaluate(self, actual: Option<&PropertyValue>, expected: &PropertyValue) -> bool {
        let actual = match actual {
            None | Some(PropertyValue::Null) => return false,
            Some(value) => value,
        };
        match self {
            FilterOp::Eq => values_equal(actual, expected),
            FilterOp::Ne => !values_equal(actual, expected),
            FilterOp::Gt => ordering(actual, expected) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                ordering(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => ordering(actual, expected) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                ordering(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

fn is_numeric(value: &PropertyValue) -> bool {
    matches!(value, PropertyValue::Int(_) | PropertyValue::Float(_))
}

fn ordering(actual: &PropertyValue, expected: &PropertyValue) -> Option<Ordering> {
    if is_numeric(actual) || is_numeric(expected) {
        return actual.as_number()?.partial_cmp(&expected.as_number()?);
    }
    actual.compare(expected)
}

fn values_equal(actual: &PropertyValue, expected: &PropertyValue) -> bool {
    match (actual, expected) {
        (PropertyValue::StringList(_), _) | (_, PropertyValue::StringList(_)) => {
            actual.loosely_equals(expected)
        }
        _ => ordering(actual, expected) == Some(Ordering::Equal),
    }
}

/// One `(key, op, value)` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Property name
    pub key: String,
    /// Operator
    pub op: FilterOp,
    /// Value to compare against
    pub value: PropertyValue,
}

impl Condition {
    /// Test the condition against a property map.
    pub fn matches(&self, properties: &PropertyMap) -> bool {
        self.op.evaluate(properties.get(&self.key), &self.value)
    }
}

/// Conjunction of property conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeFilter {
    conditions: Vec<Condition>,
}

impl NodeFilter {
    /// Filter that matches every node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition.
    pub fn with(mut self, key: impl Into<String>, op: FilterOp, value: impl Into<PropertyValue>) -> Self {
        self.push(key, op, value);
        self
    }

    /// Add an exact-match condition.
    pub fn eq(self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.with(key, FilterOp::Eq, value)
    }

    /// Add a `$ne` condition.
    pub fn ne(self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.with(key, FilterOp::Ne, value)
    }

    /// Add a `$gt` condition.
    pub fn gt(self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.with(key, FilterOp::Gt, value)
    }

    /// Add a `$gte` condition.
    pub fn gte(self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.with(key, FilterOp::Gte, value)
    }

    /// Add a `$lt` condition.
    pub fn lt(self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.with(key, FilterOp::Lt, value)
    }

    /// Add a `$lte` condition.
    pub fn lte(self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.with(key, FilterOp::Lte, value)
    }

    /// Append a condition in place.
    pub fn push(&mut self, key: impl Into<String>, op: FilterOp, value: impl Into<PropertyValue>) {
        self.conditions.push(Condition {
            key: key.into(),
            op,
            value: value.into(),
        });
    }

    /// The conditions, in insertion order.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// True when the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Test a property map against every condition.
    pub fn matches_properties(&self, properties: &PropertyMap) -> bool {
        self.conditions.iter().all(|c| c.matches(properties))
    }

    /// Test a node against every condition.
    pub fn matches(&self, node: &Node) -> bool {
        self.is_empty() || self.matches_properties(&node.properties())
    }

    /// Parse the JSON object form.
    ///
    /// A plain value is an exact match; an object maps `$`-operators to
    /// values. `limit` and `offset` keys are ignored.
    ///
    /// # Errors
    /// [`GraphError::InvalidOperation`] for a non-object filter or an
    /// unknown operator, [`GraphError::Serialization`] for a value that is
    /// not a property scalar.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(GraphError::invalid_operation(format!(
                "Filter must be a JSON object, got {value}"
            )));
        };

        let mut filter = NodeFilter::new();
        for (key, condition) in map {
            if key == "limit" || key == "offset" {
                continue;
            }
            match condition {
                Value::Object(ops) => {
                    for (op, operand) in ops {
                        let op = FilterOp::from_operator(op).ok_or_else(|| {
                            GraphError::invalid_operation(format!("Unknown filter operator '{op}' on '{key}'"))
                        })?;
                        filter.push(key.as_str(), op, to_property(key, operand)?);
                    }
                }
                other => filter.push(key.as_str(), FilterOp::Eq, to_property(key, other)?),
            }
        }
        Ok(filter)
    }
}

fn to_property(key: &str, value: &Value) -> Result<PropertyValue> {
    serde_json::from_value(value.clone()).map_err(|e| {
        GraphError::serialization(format!("Unsupported filter value for '{key}'"), Some(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props() -> PropertyMap {
        PropertyMap::new()
            .with("name", "parse")
            .with("complexity", 12i64)
            .with("score", "7.5")
            .with("docstring", PropertyValue::Null)
    }

    #[test]
    fn test_exact_and_range() {
        let filter = NodeFilter::new().eq("name", "parse").gt("complexity", 10i64);
        assert!(filter.matches_properties(&props()));

        let filter = NodeFilter::new().lte("complexity", 11i64);
        assert!(!filter.matches_properties(&props()));
    }

    #[test]
    fn test_missing_property_fails_every_operator() {
        for op in [FilterOp::Eq, FilterOp::Ne, FilterOp::Gt, FilterOp::Gte, FilterOp::Lt, FilterOp::Lte] {
            let filter = NodeFilter::new().with("absent", op, 1i64);
            assert!(!filter.matches_properties(&props()), "{op} matched a missing property");
        }
        assert!(!NodeFilter::new().ne("docstring", "x").matches_properties(&props()));
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        assert!(NodeFilter::new().gt("score", 7i64).matches_properties(&props()));
        assert!(NodeFilter::new().eq("complexity", "12").matches_properties(&props()));
        // a non-numeric side never compares against a number
        assert!(!NodeFilter::new().lt("name", 100i64).matches_properties(&props()));
    }

    #[test]
    fn test_ne() {
        assert!(NodeFilter::new().ne("name", "other").matches_properties(&props()));
        assert!(!NodeFilter::new().ne("name", "parse").matches_properties(&props()));
    }

    #[test]
    fn test_from_json() {
        let filter = NodeFilter::from_json(&json!({
            "complexity": {"$gte": 12, "$lt": 20},
            "name": "parse",
            "limit": 5
        }))
        .unwrap();
        assert_eq!(filter.conditions().len(), 3);
        assert!(filter.matches_properties(&props()));
    }

    #[test]
    fn test_from_json_rejects_unknown_operator() {
        let err = NodeFilter::from_json(&json!({"complexity": {"$between": [1, 2]}})).unwrap_err();
        assert!(matches!(err, GraphError::InvalidOperation { .. }));
        assert!(NodeFilter::from_json(&json!([1, 2])).is_err());
    }
}
