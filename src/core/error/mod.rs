use crate::core::types::{ErrorCategory, ErrorSeverity};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Fatal conversion error.
///
/// Every variant of [`ErrorCategory`] aborts the conversion of a single document. The error
/// keeps the source file and the field path of the offending construct so it can be reported
/// verbatim as exactly one diagnostic entry.
#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub file: Option<PathBuf>,
    pub field_path: Option<String>,
    pub context: BTreeMap<String, String>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        AppError {
            category,
            severity: ErrorSeverity::Error,
            code: category.default_code().to_string(),
            message: message.into(),
            file: None,
            field_path: None,
            context: BTreeMap::new(),
            source: None,
        }
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(source.into());
        error
    }

    pub fn with_context<T: Into<String>>(mut self, context: T) -> Self {
        self.context.insert("context".to_string(), context.into());
        self
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    /// Attach the source document path unless a more specific one is already set.
    pub fn with_file(mut self, file: &Path) -> Self {
        if self.file.is_none() {
            self.file = Some(file.to_path_buf());
        }
        self
    }

    /// Attach the field path of the offending construct unless one is already set.
    pub fn with_field<T: Into<String>>(mut self, field_path: T) -> Self {
        if self.field_path.is_none() {
            self.field_path = Some(field_path.into());
        }
        self
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    /// Shorthand for a schema violation at the given field path.
    pub fn schema<F: Into<String>, T: Into<String>>(field_path: F, message: T) -> Self {
        AppError::new(ErrorCategory::SchemaViolation, message).with_field(field_path)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: ", self.code, self.category)?;
        if let Some(file) = &self.file {
            write!(f, "{}", file.display())?;
            if let Some(field) = &self.field_path {
                write!(f, ":{}", field)?;
            }
            write!(f, ": ")?;
        } else if let Some(field) = &self.field_path {
            write!(f, "{}: ", field)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::with_source(ErrorCategory::IoError, e.to_string(), e)
    }
}
