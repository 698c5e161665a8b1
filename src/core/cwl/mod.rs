//! CWL document loading, normalization and the internal workflow model.

pub mod builder;
pub mod loader;
pub mod model;
pub mod requirements;
pub mod types;

pub use builder::{build_document, validate_workflow};
pub use loader::{load_document, load_str, CwlVersion, LoadedDocument};
pub use model::{Document, ProcessKind, SourceRef, Step, StepRun, Workflow};
