use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while producing a parsed-file record
#[derive(Error, Debug)]
pub enum ParserError {
    /// Failed to read file
    #[error("IO error reading {0}: {1}")]
    IoError(PathBuf, #[source] std::io::Error),

    /// Syntax error in source code
    #[error("Syntax error in {0}:{1}:{2}: {3}")]
    SyntaxError(PathBuf, usize, usize, String),

    /// File too large
    #[error("File {0} exceeds maximum size ({1} bytes)")]
    FileTooLarge(PathBuf, usize),

    /// No registered parser handles this file
    #[error("No parser available for {0} (language: {1})")]
    UnsupportedLanguage(PathBuf, String),

    /// A parser emitted a record that does not match the expected shape
    #[error("Invalid parsed-file record for {0}: {1}")]
    InvalidRecord(PathBuf, String),

    /// Generic parsing error
    #[error("Parse error in {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Result type for parser operations
pub type ParserResult<T> = Result<T, ParserError>;
