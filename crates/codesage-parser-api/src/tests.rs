//! Tests for parser API types and utilities

use crate::*;
use std::io::Write;
use std::path::{Path, PathBuf};

#[test]
fn test_parsed_file_new() {
    let parsed = ParsedFile::new("src/app.py", "python");

    assert_eq!(parsed.file_path, "src/app.py");
    assert_eq!(parsed.language, "python");
    assert_eq!(parsed.entity_count(), 0);
    assert_eq!(parsed.loc(), 0);
}

#[test]
fn test_parsed_file_loc_prefers_metrics() {
    let parsed = ParsedFile::new("a.py", "python")
        .with_source("a = 1\nb = 2\nc = 3\n")
        .with_loc(42);
    assert_eq!(parsed.loc(), 42);

    let parsed = ParsedFile::new("a.py", "python").with_source("a = 1\nb = 2\nc = 3\n");
    assert_eq!(parsed.loc(), 3);
}

#[test]
fn test_parsed_file_defaults_from_json() {
    let parsed: ParsedFile = serde_json::from_str("{}").unwrap();
    assert_eq!(parsed.file_path, "unknown");
    assert_eq!(parsed.language, "unknown");
    assert!(parsed.functions.is_empty());
}

#[test]
fn test_call_record_accepts_function_alias() {
    let call: CallRecord =
        serde_json::from_str(r#"{"function": "helper", "line_number": 7, "type": "method"}"#)
            .unwrap();
    assert_eq!(call.name, "helper");
    assert_eq!(call.line, Some(7));
    assert_eq!(call.call_type.as_deref(), Some("method"));
}

#[test]
fn test_function_record_full_contract() {
    let json = r#"{
        "name": "load",
        "qualified_name": "Store.load",
        "line_start": 10,
        "line_end": 20,
        "complexity": 4,
        "parameters": ["self", "key"],
        "calls": [{"name": "get", "line": 12}],
        "return_type": "bytes",
        "decorators": ["cached"],
        "docstring": "Load a key.",
        "is_async": true,
        "is_generator": false
    }"#;
    let func: FunctionRecord = serde_json::from_str(json).unwrap();

    assert_eq!(func.qualified_name(), "Store.load");
    assert_eq!(func.complexity, Some(4));
    assert_eq!(func.parameters, vec!["self", "key"]);
    assert_eq!(func.calls.len(), 1);
    assert!(func.is_async);
}

#[test]
fn test_function_qualified_name_falls_back_to_name() {
    let func = FunctionRecord::new("main", 1, 3);
    assert_eq!(func.qualified_name(), "main");
}

#[test]
fn test_class_record_method_names() {
    let class = ClassRecord::new("Dog", 1, 30)
        .with_base("Animal")
        .with_method("bark")
        .with_method("sit");

    assert_eq!(class.method_names(), vec!["bark", "sit"]);
    assert_eq!(class.base_classes, vec!["Animal"]);
}

#[test]
fn test_import_module_name_falls_back_to_name() {
    let import: ImportRecord = serde_json::from_str(r#"{"name": "os.path"}"#).unwrap();
    assert_eq!(import.module_name(), Some("os.path"));

    let import: ImportRecord = serde_json::from_str(r#"{"module": ""}"#).unwrap();
    assert_eq!(import.module_name(), None);
}

#[test]
fn test_detect_language() {
    assert_eq!(detect_language(Path::new("a/b.py")), "python");
    assert_eq!(detect_language(Path::new("x.TSX")), "typescript");
    assert_eq!(detect_language(Path::new("x.hpp")), "cpp");
    assert_eq!(detect_language(Path::new("Makefile")), "unknown");
}

#[test]
fn test_parser_config_default() {
    let config = ParserConfig::default();
    assert_eq!(config.max_file_size, 10 * 1024 * 1024);
    assert!(config.include_docs);
    assert!(!ParserConfig::fast().include_docs);
}

#[test]
fn test_json_parser_overrides_path() {
    let parser = JsonRecordParser::new("python", vec![".py"]);
    let parsed = parser
        .parse_source(
            r#"{"file_path": "elsewhere.py", "functions": [{"name": "f"}]}"#,
            Path::new("pkg/mod.py"),
        )
        .unwrap();

    assert_eq!(parsed.file_path, "pkg/mod.py");
    assert_eq!(parsed.language, "python");
    assert_eq!(parsed.functions[0].name, "f");
}

#[test]
fn test_json_parser_rejects_malformed_record() {
    let parser = JsonRecordParser::new("python", vec![".py"]);
    let err = parser
        .parse_source("def f(): pass", Path::new("a.py"))
        .unwrap_err();
    assert!(matches!(err, ParserError::InvalidRecord(..)));
}

#[test]
fn test_parse_file_enforces_size_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.py");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"{\"functions\": []}").unwrap();

    let parser = JsonRecordParser::new("python", vec![".py"])
        .with_config(ParserConfig::default().with_max_file_size(4));
    let err = parser.parse_file(&path).unwrap_err();
    assert!(matches!(err, ParserError::FileTooLarge(_, 17)));
}

#[test]
fn test_parse_file_fills_size_and_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("small.py");
    std::fs::write(&path, "{}").unwrap();

    let parsed = JsonRecordParser::new("python", vec![".py"])
        .parse_file(&path)
        .unwrap();
    assert_eq!(parsed.size_bytes, Some(2));
    assert_eq!(parsed.encoding.as_deref(), Some("utf-8"));
}

#[test]
fn test_registry_dispatches_by_extension() {
    let registry = ParserRegistry::new()
        .with_parser(Box::new(JsonRecordParser::new("python", vec![".py"])))
        .with_parser(Box::new(JsonRecordParser::new("go", vec![".go"])));

    assert_eq!(
        registry.parser_for(Path::new("main.go")).map(|p| p.language()),
        Some("go")
    );
    assert!(registry.parser_for(Path::new("main.rs")).is_none());

    let err = registry.parse_file(&PathBuf::from("lib.rs")).unwrap_err();
    assert!(matches!(err, ParserError::UnsupportedLanguage(..)));
}
