use super::unknown_name;
use crate::relationships::CallRecord;
use serde::{Deserialize, Serialize};

/// A function or method as reported by a language parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Function name
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

    /// Cyclomatic complexity, when the parser computes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,

    /// Parameter names
    #[serde(default)]
    pub parameters: Vec<String>,

    /// Calls made from the body of this function
    #[serde(default)]
    pub calls: Vec<CallRecord>,

    /// Return type annotation (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,

    /// Decorators/attributes (e.g., `@property`)
    #[serde(default)]
    pub decorators: Vec<String>,

    /// Documentation/docstring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,

    /// Is this an async/coroutine function?
    #[serde(default)]
    pub is_async: bool,

    /// Does the body yield?
    #[serde(default)]
    pub is_generator: bool,
}

impl FunctionRecord {
    pub fn new(name: impl Into<String>, line_start: usize, line_end: usize) -> Self {
        Self {
            name: name.into(),
            qualified_name: None,
            line_start,
            line_end,
            complexity: None,
            parameters: Vec::new(),
            calls: Vec::new(),
            return_type: None,
            decorators: Vec::new(),
            docstring: None,
            is_async: false,
            is_generator: false,
        }
    }

    /// The qualified name, or the plain name when none was reported
    pub fn qualified_name(&self) -> &str {
        self.qualified_name.as_deref().unwrap_or(&self.name)
    }

    // Builder methods
    pub fn with_qualified_name(mut self, qualified_name: impl Into<String>) -> Self {
        self.qualified_name = Some(qualified_name.into());
        self
    }

    pub fn with_complexity(mut self, complexity: u32) -> Self {
        self.complexity = Some(complexity);
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_call(mut self, call: CallRecord) -> Self {
        self.calls.push(call);
        self
    }

    pub fn with_return_type(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }

    pub fn with_docstring(mut self, doc: impl Into<String>) -> Self {
        self.docstring = Some(doc.into());
        self
    }

    pub fn async_fn(mut self) -> Self {
        self.is_async = true;
        self
    }
}
