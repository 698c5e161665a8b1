//! Nextflow DSL2 rendering.

pub mod emitter;
pub mod script;
pub mod template;

pub use emitter::{Emitter, Provenance, TargetDocument};
pub use template::Template;
