//! Batch conversion of every `*.cwl` file under a directory.
//!
//! Each file is an independent unit of work on the blocking pool. The configuration is
//! shared read-only; nothing else crosses between units, so one failure never touches
//! another file's result.

use crate::core::config::ConverterConfig;
use crate::core::convert::Converter;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Outcome of one file in a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    pub path: PathBuf,
    pub output_dir: PathBuf,
    pub succeeded: bool,
    pub warnings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub written: Vec<PathBuf>,
}

impl BatchEntry {
    fn failed(path: PathBuf, output_dir: PathBuf, error: String) -> Self {
        BatchEntry {
            path,
            output_dir,
            succeeded: false,
            warnings: 0,
            error: Some(error),
            written: Vec::new(),
        }
    }
}

/// Per-file outcomes, sorted by path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub entries: Vec<BatchEntry>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|entry| entry.succeeded).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Every `*.cwl` file below `root`, sorted. Hidden directories are skipped.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>, AppError> {
    if !root.is_dir() {
        return Err(AppError::new(
            ErrorCategory::IoError,
            format!("{} is not a directory", root.display()),
        ));
    }
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to scan directory {}: {}", dir.display(), e),
            )
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| {
                AppError::new(
                    ErrorCategory::IoError,
                    format!("Failed to inspect entry in {}: {}", dir.display(), e),
                )
            })?;
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if path.is_dir() {
                if !hidden {
                    pending.push(path);
                }
            } else if path.extension().and_then(|ext| ext.to_str()) == Some("cwl") {
                found.push(path);
            }
        }
    }
    found.sort();
    debug!(root = %root.display(), files = found.len(), "discovered CWL documents");
    Ok(found)
}

/// Output directory for one input: its path relative to `root`, without extension.
pub fn output_dir_for(root: &Path, output: &Path, path: &Path) -> PathBuf {
    let relative = path.strip_prefix(root).unwrap_or(path);
    output.join(relative.with_extension(""))
}

/// Convert every discovered file with at most `jobs` conversions in flight.
pub async fn run_batch(
    root: &Path,
    output: &Path,
    config: Arc<ConverterConfig>,
    jobs: usize,
) -> Result<BatchSummary, AppError> {
    let files = discover(root)?;
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    info!(files = files.len(), jobs = jobs.max(1), "starting batch conversion");

    let mut handles = Vec::with_capacity(files.len());
    for path in files {
        let output_dir = output_dir_for(root, output, &path);
        let config = Arc::clone(&config);
        let semaphore = Arc::clone(&semaphore);
        let task_path = path.clone();
        let task_output = output_dir.clone();
        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return BatchEntry::failed(task_path, task_output, e.to_string()),
            };
            let blocking_path = task_path.clone();
            let blocking_output = task_output.clone();
            tokio::task::spawn_blocking(move || convert_one(&blocking_path, &blocking_output, &config))
                .await
                .unwrap_or_else(|e| {
                    BatchEntry::failed(task_path, task_output, format!("conversion task failed: {}", e))
                })
        });
        handles.push((path, output_dir, handle));
    }

    let mut entries = Vec::with_capacity(handles.len());
    for (path, output_dir, handle) in handles {
        let entry = handle.await.unwrap_or_else(|e| {
            BatchEntry::failed(path, output_dir, format!("conversion task failed: {}", e))
        });
        if let Some(error) = &entry.error {
            warn!(path = %entry.path.display(), error = %error, "batch item failed");
        }
        entries.push(entry);
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let summary = BatchSummary { entries };
    info!(
        total = summary.total(),
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        "batch conversion finished"
    );
    Ok(summary)
}

fn convert_one(path: &Path, output_dir: &Path, config: &ConverterConfig) -> BatchEntry {
    let conversion = Converter::new(config).convert_file(path);
    let warnings = conversion
        .diagnostics
        .iter()
        .filter(|entry| !entry.is_error())
        .count();
    let error = conversion.error().map(ToString::to_string);
    match conversion.write_to(output_dir) {
        Ok(written) => BatchEntry {
            path: path.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            succeeded: conversion.is_success(),
            warnings,
            error,
            written,
        },
        Err(err) => BatchEntry::failed(path.to_path_buf(), output_dir.to_path_buf(), err.to_string()),
    }
}
