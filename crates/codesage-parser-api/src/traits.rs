use crate::{config::ParserConfig, errors::ParserError, ir::ParsedFile, language::detect_language};
use std::path::Path;

/// Core trait that language parsers implement to feed the graph builder
///
/// # Thread Safety
/// Implementations must be `Send + Sync`: the incremental updater calls them
/// from its background thread.
pub trait FileParser: Send + Sync {
    /// Returns the language identifier (lowercase, e.g., "python", "go")
    fn language(&self) -> &str;

    /// Returns supported file extensions (e.g., [".py", ".pyw"])
    fn file_extensions(&self) -> &[&str];

    /// Parse source text into a record
    ///
    /// # Arguments
    /// * `source` - Source code string
    /// * `file_path` - Logical path for this source (used for node ids)
    fn parse_source(&self, source: &str, file_path: &Path) -> Result<ParsedFile, ParserError>;

    /// Read and parse a file from disk
    ///
    /// # Errors
    /// Returns `ParserError` if:
    /// - File cannot be read
    /// - File exceeds the configured maximum size
    /// - Source code cannot be parsed
    fn parse_file(&self, path: &Path) -> Result<ParsedFile, ParserError> {
        let metadata =
            std::fs::metadata(path).map_err(|e| ParserError::IoError(path.to_path_buf(), e))?;
        let size = metadata.len() as usize;
        if size > self.config().max_file_size {
            return Err(ParserError::FileTooLarge(path.to_path_buf(), size));
        }

        let source = std::fs::read_to_string(path)
            .map_err(|e| ParserError::IoError(path.to_path_buf(), e))?;

        let mut parsed = self.parse_source(&source, path)?;
        if parsed.size_bytes.is_none() {
            parsed.size_bytes = Some(metadata.len());
        }
        if parsed.encoding.is_none() {
            parsed.encoding = Some(self.config().default_encoding.clone());
        }
        Ok(parsed)
    }

    /// Check if this parser can handle the given file
    ///
    /// Default implementation checks file extension.
    fn can_parse(&self, path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            let ext_str = format!(".{}", ext.to_string_lossy());
            self.file_extensions().contains(&ext_str.as_str())
        } else {
            false
        }
    }

    /// Get parser configuration
    fn config(&self) -> &ParserConfig;
}

/// A set of parsers, dispatched by file extension
#[derive(Default)]
pub struct ParserRegistry {
    parsers: Vec<Box<dyn FileParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser; earlier registrations win on overlapping extensions
    pub fn register(&mut self, parser: Box<dyn FileParser>) {
        self.parsers.push(parser);
    }

    pub fn with_parser(mut self, parser: Box<dyn FileParser>) -> Self {
        self.register(parser);
        self
    }

    /// The first parser that accepts this path
    pub fn parser_for(&self, path: &Path) -> Option<&dyn FileParser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(path))
            .map(|p| p.as_ref())
    }

    /// Parse a file with whichever parser handles it
    pub fn parse_file(&self, path: &Path) -> Result<ParsedFile, ParserError> {
        match self.parser_for(path) {
            Some(parser) => parser.parse_file(path),
            None => Err(ParserError::UnsupportedLanguage(
                path.to_path_buf(),
                detect_language(path).to_string(),
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}
