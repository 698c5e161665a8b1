pub mod batch;
pub mod config;
pub mod convert;
pub mod cwl;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod mapping;
pub mod nextflow;
pub mod types;

pub use batch::{run_batch, BatchEntry, BatchSummary};
pub use config::{ConfigLoader, ConfigValidator, ConverterConfig};
pub use convert::{Conversion, Converter};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::AppError;
pub use graph::{resolve_order, ExecutionOrder};
pub use types::*;
