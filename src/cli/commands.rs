use crate::{
    cli::args::{BatchArgs, CheckArgs, ContainersArgs, ConvertArgs, GraphArgs, OutputFormat},
    core::{
        batch::{run_batch, BatchSummary},
        config::{default_config_path, ConfigLoader, ConverterConfig, PlatformFlavor},
        graph::dot::workflow_to_dot,
        mapping::containers::generate_push_script,
        Conversion, Converter, Diagnostics,
    },
    Result,
};
use anyhow::{anyhow, Context};
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// JSON shape printed by `convert` and `check` with `--format json`.
#[derive(Serialize)]
struct ConversionReport<'a> {
    file: &'a Path,
    success: bool,
    written: &'a [PathBuf],
    diagnostics: &'a Diagnostics,
}

/// Command-line settings that take precedence over the file and the environment.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub template: Option<PathBuf>,
    pub instance_type: Option<String>,
    pub flavor: Option<PlatformFlavor>,
}

impl ConfigOverrides {
    fn is_empty(&self) -> bool {
        self.template.is_none() && self.instance_type.is_none() && self.flavor.is_none()
    }
}

/// Resolve the converter configuration for this invocation.
pub fn load_config(explicit: Option<&Path>, overrides: &ConfigOverrides) -> Result<ConverterConfig> {
    let workdir = env::current_dir().context("failed to resolve working directory")?;
    let mut config = ConfigLoader::load(explicit, &workdir).map_err(|e| {
        anyhow!(
            "failed to load configuration {}: {}",
            explicit
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| default_config_path().display().to_string()),
            e
        )
    })?;
    if overrides.is_empty() {
        return Ok(config);
    }

    if let Some(template) = &overrides.template {
        config.template = Some(template.clone());
    }
    if let Some(instance_type) = &overrides.instance_type {
        config.platform.instance_type = Some(instance_type.clone());
    }
    if let Some(flavor) = overrides.flavor {
        config.platform.flavor = flavor;
    }
    ConfigLoader::validate_config(&config).map_err(|e| anyhow!("invalid command-line setting: {}", e))?;
    config
        .load_template()
        .map_err(|e| anyhow!("failed to read template: {}", e))?;
    tracing::debug!(?overrides, "applied command-line configuration");
    Ok(config)
}

pub fn convert(args: ConvertArgs, config: &ConverterConfig) -> Result<()> {
    tracing::debug!(file = %args.file.display(), "converting document");
    let conversion = Converter::new(config).convert_file(&args.file);

    if args.stdout {
        if let Some(target) = &conversion.target {
            print!("{}", target.render());
        }
        // stdout carries the pipeline text, so diagnostics go to stderr.
        match args.format {
            OutputFormat::Text => {
                for diagnostic in conversion.diagnostics.iter() {
                    eprintln!("{}", diagnostic);
                }
            }
            OutputFormat::Json => {
                eprintln!("{}", serde_json::to_string_pretty(&conversion.diagnostics)?);
            }
        }
        return finish(&conversion);
    }

    let written = conversion
        .write_to(&args.output)
        .map_err(|e| anyhow!("failed to write outputs for {}: {}", args.file.display(), e))?;
    report(&conversion, &written, args.format)?;
    finish(&conversion)
}

pub async fn batch(args: BatchArgs, config: ConverterConfig) -> Result<()> {
    let jobs = args.jobs.unwrap_or_else(default_jobs);
    if jobs == 0 {
        return Err(anyhow!("--jobs must be at least 1"));
    }
    let summary = run_batch(&args.dir, &args.output, Arc::new(config), jobs)
        .await
        .map_err(|e| anyhow!("batch conversion of {} failed: {}", args.dir.display(), e))?;

    match args.format {
        OutputFormat::Text => print_batch_summary(&summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    if summary.all_succeeded() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} documents failed to convert",
            summary.failed(),
            summary.total()
        ))
    }
}

pub fn check(args: CheckArgs, config: &ConverterConfig) -> Result<()> {
    let conversion = Converter::new(config).check_file(&args.file);
    report(&conversion, &[], args.format)?;
    finish(&conversion)
}

pub fn graph(args: GraphArgs, config: &ConverterConfig) -> Result<()> {
    let conversion = Converter::new(config).check_file(&args.file);
    let Some(document) = &conversion.document else {
        print_diagnostics_to_stderr(&conversion);
        return finish(&conversion);
    };
    print!("{}", workflow_to_dot(&document.workflow));
    finish(&conversion)
}

pub fn containers(args: ContainersArgs, config: &ConverterConfig) -> Result<()> {
    let conversion = Converter::new(config).check_file(&args.file);
    if conversion.document.is_none() {
        print_diagnostics_to_stderr(&conversion);
        return finish(&conversion);
    }
    let refs = conversion.containers();
    if args.push_script {
        let region = args.region.as_deref().or(config.platform.region.as_deref());
        print!("{}", generate_push_script(&refs, region));
    } else {
        let listing: Vec<serde_json::Value> = refs
            .iter()
            .map(|(step, container)| {
                serde_json::json!({
                    "step": step,
                    "container": container,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
    }
    finish(&conversion)
}

fn report(conversion: &Conversion, written: &[PathBuf], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for path in written {
                println!("wrote {}", path.display());
            }
            for diagnostic in conversion.diagnostics.iter() {
                println!("{}", diagnostic);
            }
            let errors = conversion.diagnostics.iter().filter(|d| d.is_error()).count();
            println!(
                "{}: {} ({} diagnostics, {} errors)",
                conversion.path.display(),
                if conversion.is_success() { "ok" } else { "failed" },
                conversion.diagnostics.len(),
                errors
            );
        }
        OutputFormat::Json => {
            let report = ConversionReport {
                file: &conversion.path,
                success: conversion.is_success(),
                written,
                diagnostics: &conversion.diagnostics,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn print_diagnostics_to_stderr(conversion: &Conversion) {
    for diagnostic in conversion.diagnostics.iter() {
        eprintln!("{}", diagnostic);
    }
}

fn print_batch_summary(summary: &BatchSummary) {
    for entry in &summary.entries {
        match &entry.error {
            Some(error) => println!("FAILED {}: {}", entry.path.display(), error),
            None => println!(
                "ok     {} -> {} ({} warnings)",
                entry.path.display(),
                entry.output_dir.display(),
                entry.warnings
            ),
        }
    }
    println!(
        "\n{} documents: {} succeeded, {} failed",
        summary.total(),
        summary.succeeded(),
        summary.failed()
    );
}

/// Map a failed conversion onto a non-zero exit.
fn finish(conversion: &Conversion) -> Result<()> {
    match conversion.error() {
        None => Ok(()),
        Some(error) => Err(anyhow!("conversion failed: {}", error)),
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
