use crate::{
    config::ParserConfig, errors::ParserError, ir::ParsedFile, language::detect_language,
    traits::FileParser,
};
use std::path::Path;

/// A parser whose input is already a parsed-file record in JSON
///
/// Used when extraction runs out of process (a tree-sitter sidecar, an
/// editor plugin) and hands over its output as JSON keyed by the source
/// path. The record's `file_path` is replaced by the path being parsed so
/// node ids always follow the file on disk.
pub struct JsonRecordParser {
    language: String,
    extensions: Vec<&'static str>,
    config: ParserConfig,
}

impl JsonRecordParser {
    pub fn new(language: impl Into<String>, extensions: Vec<&'static str>) -> Self {
        Self {
            language: language.into(),
            extensions,
            config: ParserConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }
}

impl FileParser for JsonRecordParser {
    fn language(&self) -> &str {
        &self.language
    }

    fn file_extensions(&self) -> &[&str] {
        &self.extensions
    }

    fn parse_source(&self, source: &str, file_path: &Path) -> Result<ParsedFile, ParserError> {
        let mut parsed: ParsedFile = serde_json::from_str(source)
            .map_err(|e| ParserError::InvalidRecord(file_path.to_path_buf(), e.to_string()))?;

        parsed.file_path = file_path.to_string_lossy().into_owned();
        if parsed.language == "unknown" {
            parsed.language = detect_language(file_path).to_string();
        }
        if !self.config.include_docs {
            for func in &mut parsed.functions {
                func.docstring = None;
            }
            for class in &mut parsed.classes {
                class.docstring = None;
            }
        }
        Ok(parsed)
    }

    fn config(&self) -> &ParserConfig {
        &self.config
    }
}
