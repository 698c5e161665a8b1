//! The exposed conversion operation: CWL text in, Nextflow text and diagnostics out.

use crate::core::config::ConverterConfig;
use crate::core::cwl::builder::build_document;
use crate::core::cwl::loader::load_str;
use crate::core::cwl::model::Document;
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::error::AppError;
use crate::core::graph::{resolve_order, ExecutionOrder};
use crate::core::mapping::containers::{ContainerMapper, ContainerRef};
use crate::core::mapping::resources::ResourceMapper;
use crate::core::nextflow::{Emitter, Provenance, TargetDocument};
use crate::core::types::ErrorCategory;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of converting one document.
///
/// On failure `target` is `None` and `diagnostics` holds exactly one error entry naming the
/// offending construct. A failure in the emitter still leaves the decorated `document`.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub path: PathBuf,
    pub document: Option<Document>,
    pub order: Option<ExecutionOrder>,
    pub target: Option<TargetDocument>,
    pub diagnostics: Diagnostics,
}

impl Conversion {
    /// True when no fatal diagnostic was recorded.
    pub fn is_success(&self) -> bool {
        !self.diagnostics.has_errors()
    }

    /// The fatal diagnostic, if the conversion failed.
    pub fn error(&self) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|entry| entry.is_error())
    }

    /// Write `<stem>.nf`, `nextflow.config` and `<stem>.diagnostics.json` into `dir`.
    ///
    /// The diagnostics file is written even when the conversion failed.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, AppError> {
        fs::create_dir_all(dir).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to create output directory {}: {}", dir.display(), e),
            )
        })?;
        let stem = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "main".to_string());

        let mut files: Vec<(PathBuf, String)> = Vec::new();
        if let Some(target) = &self.target {
            files.push((dir.join(format!("{}.nf", stem)), target.script_text()));
            files.push((dir.join("nextflow.config"), target.config_text()));
        }
        let diagnostics = serde_json::to_string_pretty(&self.diagnostics).map_err(|e| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("Failed to serialize diagnostics: {}", e),
            )
        })?;
        files.push((dir.join(format!("{}.diagnostics.json", stem)), diagnostics + "\n"));

        let mut written = Vec::with_capacity(files.len());
        for (path, contents) in files {
            fs::write(&path, contents).map_err(|e| {
                AppError::new(
                    ErrorCategory::IoError,
                    format!("Failed to write {}: {}", path.display(), e),
                )
            })?;
            debug!(path = %path.display(), "wrote output file");
            written.push(path);
        }
        Ok(written)
    }

    /// Resolved container of every step, in resolved order.
    pub fn containers(&self) -> Vec<(String, ContainerRef)> {
        let (Some(document), Some(order)) = (&self.document, &self.order) else {
            return Vec::new();
        };
        order
            .steps(&document.workflow)
            .filter_map(|step| {
                step.container
                    .as_ref()
                    .map(|container| (step.id.clone(), container.clone()))
            })
            .collect()
    }
}

/// Runs loader, builder, resolver, mappers and emitter over one document at a time.
///
/// Holds only a shared reference to the configuration, so one converter can serve any
/// number of sequential conversions and the configuration can be shared across threads.
pub struct Converter<'a> {
    config: &'a ConverterConfig,
}

impl<'a> Converter<'a> {
    pub fn new(config: &'a ConverterConfig) -> Self {
        Converter { config }
    }

    pub fn convert_file(&self, path: &Path) -> Conversion {
        self.run_file(path, true)
    }

    /// Load, build, order and map `path` without rendering any Nextflow text.
    pub fn check_file(&self, path: &Path) -> Conversion {
        self.run_file(path, false)
    }

    fn run_file(&self, path: &Path, emit: bool) -> Conversion {
        match fs::read_to_string(path) {
            Ok(text) => self.run(&text, path, emit),
            Err(err) => {
                let error = AppError::with_source(
                    ErrorCategory::IoError,
                    format!("cannot read {}: {}", path.display(), err),
                    err,
                )
                .with_file(path);
                let mut diagnostics = Diagnostics::new();
                diagnostics.push_error(&error);
                Conversion {
                    path: path.to_path_buf(),
                    document: None,
                    order: None,
                    target: None,
                    diagnostics,
                }
            }
        }
    }

    /// Convert document text; `path` names the document and anchors relative references.
    pub fn convert_str(&self, text: &str, path: &Path) -> Conversion {
        self.run(text, path, true)
    }

    fn run(&self, text: &str, path: &Path, emit: bool) -> Conversion {
        let mut diagnostics = Diagnostics::new();
        let mut conversion = Conversion {
            path: path.to_path_buf(),
            document: None,
            order: None,
            target: None,
            diagnostics: Diagnostics::new(),
        };

        let result = self
            .prepare(text, path, &mut diagnostics)
            .and_then(|(document, order, provenance)| {
                let emitted = if emit {
                    Emitter::new(self.config)
                        .emit(&document, &order, &provenance, &mut diagnostics)
                        .map(Some)
                } else {
                    Ok(None)
                };
                conversion.document = Some(document);
                conversion.order = Some(order);
                emitted
            });

        match result {
            Ok(target) => {
                info!(
                    path = %path.display(),
                    diagnostics = diagnostics.len(),
                    emitted = target.is_some(),
                    "converted document"
                );
                conversion.target = target;
            }
            Err(error) => {
                let error = error.with_file(path);
                info!(path = %path.display(), code = %error.code, "conversion failed");
                diagnostics.push_error(&error);
            }
        }
        diagnostics.attribute_to(path);
        conversion.diagnostics = diagnostics;
        conversion
    }

    /// Every stage before emission: load, build, order, then decorate each step.
    fn prepare(
        &self,
        text: &str,
        path: &Path,
        diagnostics: &mut Diagnostics,
    ) -> Result<(Document, ExecutionOrder, Provenance), AppError> {
        let loaded = load_str(text, path, diagnostics)?;
        let provenance = Provenance::new(path, loaded.version, text);
        let mut document = build_document(&loaded, diagnostics)?;
        let order = resolve_order(&document.workflow)?;
        debug!(order = ?order.ids(&document.workflow), "step order");

        let resources = ResourceMapper::new(&self.config.capabilities, &self.config.default_shape)
            .pinned_to(self.config.pinned_capability());
        let containers = ContainerMapper::new(
            &self.config.registry_rewrites,
            &self.config.default_container,
            self.config.artifact_registry.as_deref(),
        );
        // Mapping runs in resolved order so diagnostics follow the emitted process order.
        for &index in order.indices() {
            let step = &mut document.workflow.steps[index];
            let shape = resources.map_step(step, diagnostics);
            let container = containers.map_step(step, diagnostics);
            step.shape = Some(shape);
            step.container = Some(container);
        }
        Ok((document, order, provenance))
    }
}
