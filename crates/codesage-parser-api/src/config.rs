use serde::{Deserialize, Serialize};

/// Configuration for parser behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum file size to parse (in bytes)
    /// Files larger than this are rejected with [`crate::ParserError::FileTooLarge`]
    pub max_file_size: usize,

    /// Include docstrings in function and class records
    pub include_docs: bool,

    /// Encoding recorded on the file record when the parser does not report one
    pub default_encoding: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10 MB
            include_docs: true,
            default_encoding: "utf-8".to_string(),
        }
    }
}

impl ParserConfig {
    /// Create config for fast parsing (drops docstrings)
    pub fn fast() -> Self {
        Self {
            include_docs: false,
            ..Default::default()
        }
    }

    /// Set maximum file size
    pub fn with_max_file_size(mut self, size: usize) -> Self {
        self.max_file_size = size;
        self
    }

    /// Keep or drop docstrings
    pub fn with_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }
}
