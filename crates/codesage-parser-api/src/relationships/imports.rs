use serde::{Deserialize, Serialize};

/// An import statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Imported module (dotted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Imported symbol; used as the module name when `module` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Import kind (`import`, `from`, ...)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub import_type: Option<String>,

    /// Import alias (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
}

impl ImportRecord {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            name: None,
            import_type: None,
            alias: None,
            line_number: None,
        }
    }

    /// The module this import refers to, if the record names one
    pub fn module_name(&self) -> Option<&str> {
        self.module
            .as_deref()
            .or(self.name.as_deref())
            .filter(|m| !m.is_empty())
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_type(mut self, import_type: impl Into<String>) -> Self {
        self.import_type = Some(import_type.into());
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line_number = Some(line);
        self
    }
}
