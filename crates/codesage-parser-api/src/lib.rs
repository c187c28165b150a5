//! codesage parser API
//!
//! The boundary between per-language source parsers and the codesage graph
//! builder.
//!
//! Parsers are external collaborators: the graph core never looks at their
//! syntax trees. It consumes one [`ParsedFile`] record per source file, with
//! flat function, class and import entries. This crate defines:
//!
//! - **Records**: [`ParsedFile`] and the entity/relationship records it carries
//! - **FileParser trait**: the interface the incremental updater uses to re-parse a file
//! - **JsonRecordParser**: a parser that reads records emitted by an out-of-process parser
//! - **Language detection**: extension to language mapping
//! - **Configuration** and **error handling**
//!
//! # Example
//!
//! ```rust
//! use codesage_parser_api::ParsedFile;
//!
//! let record: ParsedFile = serde_json::from_str(r#"{
//!     "file_path": "f.py",
//!     "language": "python",
//!     "functions": [{"name": "foo", "calls": [{"name": "bar"}]}]
//! }"#).unwrap();
//!
//! assert_eq!(record.functions[0].calls[0].name, "bar");
//! ```

pub mod config;
pub mod entities;
pub mod errors;
pub mod ir;
pub mod json;
pub mod language;
pub mod relationships;
pub mod traits;

// Re-export commonly used types
pub use config::ParserConfig;
pub use entities::{ClassRecord, FunctionRecord, MethodRecord};
pub use errors::{ParserError, ParserResult};
pub use ir::{FileMetrics, ParsedFile};
pub use json::JsonRecordParser;
pub use language::detect_language;
pub use relationships::{CallRecord, ImportRecord};
pub use traits::{FileParser, ParserRegistry};

#[cfg(test)]
mod tests;
