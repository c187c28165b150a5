use serde::{Deserialize, Serialize};

/// A call site inside a function body
///
/// Parsers report the callee under either `name` or `function`, and the line
/// under either `line` or `line_number`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallRecord {
    /// Callee name as written at the call site
    #[serde(default, alias = "function")]
    pub name: String,

    /// Line number where the call occurs
    #[serde(default, alias = "line_number", skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    /// Call kind (`direct`, `method`, ...); defaults to `direct` downstream
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,

    /// Argument text, verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl CallRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            line: None,
            call_type: None,
            arguments: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_type(mut self, call_type: impl Into<String>) -> Self {
        self.call_type = Some(call_type.into());
        self
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}
