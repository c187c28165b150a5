use super::unknown_name;
use serde::{Deserialize, Serialize};

/// A method entry inside a class record; only the name is consumed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRecord {
    #[serde(default)]
    pub name: String,
}

/// A class as reported by a language parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRecord {
    /// Class name
    #[serde(default = "unknown_name")]
    pub name: String,

    /// Dotted name within the file; falls back to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,

    /// Starting line number (1-indexed)
    #[serde(default)]
    pub line_start: usize,

    /// Ending line number (1-indexed)
    #[serde(default)]
    pub line_end: usize,

    /// Names of the direct base classes, as written in source
    #[serde(default)]
    pub base_classes: Vec<String>,

    #[serde(default)]
    pub methods: Vec<MethodRecord>,

    /// Class-level attribute names
    #[serde(default)]
    pub attributes: Vec<String>,

    #[serde(default)]
    pub decorators: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,

    #[serde(default)]
    pub is_abstract: bool,
}

impl ClassRecord {
    pub fn new(name: impl Into<String>, line_start: usize, line_end: usize) -> Self {
        Self {
            name: name.into(),
            qualified_name: None,
            line_start,
            line_end,
            base_classes: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            decorators: Vec::new(),
            docstring: None,
            is_abstract: false,
        }
    }

    /// The qualified name, or the plain name when none was reported
    pub fn qualified_name(&self) -> &str {
        self.qualified_name.as_deref().unwrap_or(&self.name)
    }

    /// Method names in declaration order
    pub fn method_names(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.name.clone()).collect()
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_classes.push(base.into());
        self
    }

    pub fn with_method(mut self, name: impl Into<String>) -> Self {
        self.methods.push(MethodRecord { name: name.into() });
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }
}
