use crate::{
    entities::{ClassRecord, FunctionRecord},
    relationships::ImportRecord,
};
use serde::{Deserialize, Serialize};

fn unknown() -> String {
    "unknown".to_string()
}

/// File-level metrics reported by a parser
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetrics {
    /// Lines of code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<usize>,
}

/// Everything a language parser extracted from one source file
///
/// This is the only thing the graph builder knows about parsers: a flat
/// record of functions, classes and imports keyed by the file path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFile {
    /// Path of the source file, used verbatim in node ids
    #[serde(default = "unknown")]
    pub file_path: String,

    /// Language identifier (lowercase, e.g. "python")
    #[serde(default = "unknown")]
    pub language: String,

    /// Full source text, when the parser forwards it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FileMetrics>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    #[serde(default)]
    pub functions: Vec<FunctionRecord>,

    #[serde(default)]
    pub classes: Vec<ClassRecord>,

    #[serde(default)]
    pub imports: Vec<ImportRecord>,
}

impl ParsedFile {
    /// Create an empty record for a file
    pub fn new(file_path: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            language: language.into(),
            source_code: None,
            metrics: None,
            encoding: None,
            size_bytes: None,
            functions: Vec::new(),
            classes: Vec::new(),
            imports: Vec::new(),
        }
    }

    /// Lines of code: the reported metric when metrics are present,
    /// otherwise the line count of the forwarded source
    pub fn loc(&self) -> usize {
        match (&self.metrics, &self.source_code) {
            (Some(metrics), _) => metrics.loc.unwrap_or(0),
            (None, Some(source)) => source.lines().count(),
            (None, None) => 0,
        }
    }

    /// Total number of entities
    pub fn entity_count(&self) -> usize {
        self.functions.len() + self.classes.len()
    }

    /// Total number of call sites across all functions
    pub fn call_count(&self) -> usize {
        self.functions.iter().map(|f| f.calls.len()).sum()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_code = Some(source.into());
        self
    }

    pub fn with_loc(mut self, loc: usize) -> Self {
        self.metrics = Some(FileMetrics { loc: Some(loc) });
        self
    }

    /// Add a function
    pub fn add_function(&mut self, func: FunctionRecord) {
        self.functions.push(func);
    }

    /// Add a class
    pub fn add_class(&mut self, class: ClassRecord) {
        self.classes.push(class);
    }

    /// Add an import
    pub fn add_import(&mut self, import: ImportRecord) {
        self.imports.push(import);
    }
}
