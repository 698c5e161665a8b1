use clap::Args;
use std::path::PathBuf;

#[derive(Clone, Copy, clap::ValueEnum, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines, one diagnostic per line
    #[default]
    Text,
    /// JSON payload suitable for downstream tooling
    Json,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// CWL workflow or tool document to convert
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Directory receiving <stem>.nf, nextflow.config and <stem>.diagnostics.json
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub output: PathBuf,

    /// Print the complete generated text instead of writing files
    #[arg(long, help_heading = "Output Options")]
    pub stdout: bool,

    /// Render diagnostics as text or JSON
    #[arg(long, default_value = "text", value_name = "FORMAT", help_heading = "Output Options")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Directory searched recursively for *.cwl files
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Root of the output tree; each input gets <relative path without extension>/
    #[arg(short, long, default_value = "nextflow", value_name = "DIR")]
    pub output: PathBuf,

    /// Maximum number of documents converted at once (default: available CPUs)
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Render the summary as text or JSON
    #[arg(long, default_value = "text", value_name = "FORMAT", help_heading = "Output Options")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// CWL workflow or tool document to validate
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Render diagnostics as text or JSON
    #[arg(long, default_value = "text", value_name = "FORMAT", help_heading = "Output Options")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct GraphArgs {
    /// CWL workflow document whose step graph should be printed
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ContainersArgs {
    /// CWL workflow or tool document whose images should be resolved
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Print a shell script that pulls, re-tags and pushes every image
    #[arg(long)]
    pub push_script: bool,

    /// AWS region used by the push script (default: platform region from config)
    #[arg(long, value_name = "REGION", requires = "push_script")]
    pub region: Option<String>,
}
