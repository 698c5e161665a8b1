use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    MalformedDocument,
    UnsupportedVersion,
    CyclicImport,
    SchemaViolation,
    UnreachableOutput,
    CyclicDependency,
    TemplateRender,
    ConfigError,
    IoError,
    InternalError,
}

impl ErrorCategory {
    /// Default diagnostic code for errors of this category.
    pub fn default_code(&self) -> &'static str {
        match self {
            ErrorCategory::MalformedDocument => "CWL-LOAD-001",
            ErrorCategory::UnsupportedVersion => "CWL-LOAD-002",
            ErrorCategory::CyclicImport => "CWL-LOAD-003",
            ErrorCategory::IoError => "CWL-LOAD-005",
            ErrorCategory::SchemaViolation => "CWL-MODEL-001",
            ErrorCategory::UnreachableOutput => "CWL-MODEL-002",
            ErrorCategory::CyclicDependency => "CWL-GRAPH-001",
            ErrorCategory::TemplateRender => "CWL-EMIT-001",
            ErrorCategory::ConfigError => "CWL-CONFIG-001",
            ErrorCategory::InternalError => "CWL-INTERNAL-001",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Error => write!(f, "error"),
            ErrorSeverity::Warning => write!(f, "warning"),
            ErrorSeverity::Info => write!(f, "info"),
        }
    }
}
