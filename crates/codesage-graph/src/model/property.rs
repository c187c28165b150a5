//! Property system for node and edge metadata.
//!
//! Values are a bounded set of scalars (plus string lists), never arbitrary
//! nested documents, so every backend can store and compare them losslessly.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Strongly-typed property value for node/edge metadata.
///
/// Serialized untagged: a `PropertyValue::Int(3)` is the JSON number `3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Explicit null/absence of value
    Null,
    /// Boolean flag (is_async, is_abstract, placeholder)
    Bool(bool),
    /// Integer value (line numbers, counts, complexity)
    Int(i64),
    /// Floating point value (metrics, scores)
    Float(f64),
    /// String value (names, paths, types)
    String(String),
    /// List of strings (params, base classes, decorators)
    StringList(Vec<String>),
}

impl PropertyValue {
    /// Numeric view of the value; numeric strings are coerced.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(i) => Some(*i as f64),
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Text view of the value, used for LIKE matching.
    pub fn as_text(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Compare two values: numerically when both sides coerce to numbers,
    /// otherwise by text. `None` when either side is null or a list.
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        if matches!(self, PropertyValue::Null | PropertyValue::StringList(_))
            || matches!(other, PropertyValue::Null | PropertyValue::StringList(_))
        {
            return None;
        }
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(self.as_text().cmp(&other.as_text())),
        }
    }

    /// Equality with numeric coercion (`"10"` equals `10`).
    pub fn loosely_equals(&self, other: &PropertyValue) -> bool {
        match (self, other) {
            (PropertyValue::StringList(a), PropertyValue::StringList(b)) => a == b,
            (PropertyValue::Null, PropertyValue::Null) => true,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::StringList(_) => "string list",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Int(i) => write!(f, "{i}"),
            PropertyValue::Float(x) => write!(f, "{x}"),
            PropertyValue::String(s) => write!(f, "{s}"),
            PropertyValue::StringList(list) => write!(f, "[{}]", list.join(", ")),
        }
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        PropertyValue::StringList(value)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PropertyValue::Null)
    }
}

/// Ordered key-value metadata store for nodes and edges.
///
/// Provides builder pattern and type-safe getters for properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap {
    data: BTreeMap<String, PropertyValue>,
}

impl PropertyMap {
    /// Create a new empty property map.
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    /// Builder pattern: add a property and return self.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Insert a property value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.data.insert(key.into(), value.into());
    }

    /// Get a property value by key.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.data.get(key)
    }

    /// Remove a property by key.
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.data.remove(key)
    }

    /// Check if a property exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Get the number of properties.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the property map is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over all properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.data.iter()
    }

    /// Copy every entry of `other` into this map, overwriting on collision.
    pub fn extend(&mut self, other: &PropertyMap) {
        for (k, v) in other.iter() {
            self.data.insert(k.clone(), v.clone());
        }
    }

    /// Type-safe getter for string properties.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.data.get(key) {
            Some(PropertyValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Type-safe getter for integer properties.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.data.get(key) {
            Some(PropertyValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Type-safe getter for float properties.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.data.get(key) {
            Some(PropertyValue::Float(f)) => Some(*f),
            _ => None,
        }
    }

    /// Type-safe getter for boolean properties.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.data.get(key) {
            Some(PropertyValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Type-safe getter for string list properties.
    pub fn get_string_list(&self, key: &str) -> Option<&[String]> {
        match self.data.get(key) {
            Some(PropertyValue::StringList(list)) => Some(list),
            _ => None,
        }
    }
}

impl FromIterator<(String, PropertyValue)> for PropertyMap {
    fn from_iter<T: IntoIterator<Item = (String, PropertyValue)>>(iter: T) -> Self {
        Self {
            data: BTreeMap::from_iter(iter),
        }
    }
}

impl IntoIterator for PropertyMap {
    type Item = (String, PropertyValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_value_conversions() {
        let s: PropertyValue = "test".into();
        assert!(matches!(s, PropertyValue::String(_)));

        let i: PropertyValue = 42i64.into();
        assert!(matches!(i, PropertyValue::Int(42)));

        let f: PropertyValue = 2.5.into();
        assert!(matches!(f, PropertyValue::Float(_)));

        let none: PropertyValue = None::<String>.into();
        assert_eq!(none, PropertyValue::Null);
    }

    #[test]
    fn test_property_map_builder() {
        let props = PropertyMap::new()
            .with("name", "test_function")
            .with("line_start", 42i64)
            .with("is_async", true);

        assert_eq!(props.get_string("name"), Some("test_function"));
        assert_eq!(props.get_int("line_start"), Some(42));
        assert_eq!(props.get_bool("is_async"), Some(true));
    }

    #[test]
    fn test_property_map_type_safety() {
        let props = PropertyMap::new()
            .with("name", "function")
            .with("line", 10i64);

        // Wrong type returns None
        assert_eq!(props.get_int("name"), None);
        assert_eq!(props.get_string("line"), None);
    }

    #[test]
    fn test_untagged_json_shape() {
        let props = PropertyMap::new()
            .with("complexity", 7i64)
            .with("params", vec!["a".to_string()])
            .with("docstring", PropertyValue::Null);

        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(json, r#"{"complexity":7,"docstring":null,"params":["a"]}"#);

        let back: PropertyMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, props);
    }

    #[test]
    fn test_numeric_coercion() {
        let stored = PropertyValue::String("12".to_string());
        assert_eq!(stored.compare(&PropertyValue::Int(10)), Some(Ordering::Greater));
        assert!(PropertyValue::Int(3).loosely_equals(&PropertyValue::Float(3.0)));
        assert_eq!(PropertyValue::Null.compare(&PropertyValue::Int(1)), None);
    }

    #[test]
    fn test_text_comparison_fallback() {
        let a = PropertyValue::from("alpha");
        let b = PropertyValue::from("beta");
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert!(!a.loosely_equals(&b));
    }
}
