//! Ordered diagnostics produced while converting one document.

use crate::core::error::AppError;
use crate::core::types::ErrorSeverity;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Individual warning or error attached to a location in the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: ErrorSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn new(
        code: impl Into<String>,
        severity: ErrorSeverity,
        message: impl Into<String>,
        location: Option<String>,
        suggestion: Option<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            file: None,
            location,
            suggestion,
        }
    }

    pub fn warning(
        code: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(code, ErrorSeverity::Warning, message, Some(location.into()), None)
    }

    pub fn info(
        code: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(code, ErrorSeverity::Info, message, Some(location.into()), None)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_file(mut self, file: &Path) -> Self {
        if self.file.is_none() {
            self.file = Some(file.to_path_buf());
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == ErrorSeverity::Error
    }
}

impl From<&AppError> for Diagnostic {
    fn from(error: &AppError) -> Self {
        Diagnostic {
            code: error.code.clone(),
            severity: error.severity,
            message: error.message.clone(),
            file: error.file.clone(),
            location: error.field_path.clone(),
            suggestion: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.severity, self.code)?;
        let location = self.location.as_deref().map(|location| {
            if location.is_empty() {
                "<root>"
            } else {
                location
            }
        });
        match (&self.file, location) {
            (Some(file), Some(location)) => write!(f, " {}:{}", file.display(), location)?,
            (Some(file), None) => write!(f, " {}", file.display())?,
            (None, Some(location)) => write!(f, " {}", location)?,
            (None, None) => {}
        }
        write!(f, ": {}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (hint: {})", suggestion)?;
        }
        Ok(())
    }
}

/// Append-only diagnostics sink shared by the pipeline stages of one conversion.
///
/// Entries keep the order in which stages recorded them; nothing re-sorts the sequence.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            ErrorSeverity::Error => tracing::error!("{}", diagnostic),
            ErrorSeverity::Warning => tracing::warn!("{}", diagnostic),
            ErrorSeverity::Info => tracing::debug!("{}", diagnostic),
        }
        self.entries.push(diagnostic);
    }

    /// Record a fatal error as its single diagnostic entry.
    pub fn push_error(&mut self, error: &AppError) {
        self.push(Diagnostic::from(error));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_error)
    }

    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.entries.iter().filter(move |entry| entry.code == code)
    }

    /// Fill in the document path on entries that have none.
    pub fn attribute_to(&mut self, file: &Path) {
        for entry in &mut self.entries {
            if entry.file.is_none() {
                entry.file = Some(file.to_path_buf());
            }
        }
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
