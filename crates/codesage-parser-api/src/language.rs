use std::path::Path;

/// Map a file extension to its language identifier.
///
/// Returns `"unknown"` for extensions no parser is expected to handle.
pub fn detect_language(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "py" => "python",
        "go" => "go",
        "java" => "java",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "c" | "h" => "c",
        "cpp" | "hpp" => "cpp",
        _ => "unknown",
    }
}
