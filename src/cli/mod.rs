pub mod args;
pub mod commands;

pub use args::{BatchArgs, CheckArgs, ContainersArgs, ConvertArgs, GraphArgs, OutputFormat};
use crate::core::config::{ConfigLoader, PlatformFlavor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
CONVERSION COMMANDS:\n{subcommands}\n\
{after-help}";

#[derive(Parser, Debug)]
#[command(name = "cwl2nf")]
#[command(version = crate::VERSION)]
#[command(about = "Translate CWL workflows into Nextflow DSL2 pipelines")]
#[command(help_template = HELP_TEMPLATE)]
#[command(after_long_help = after_long_help())]
pub struct Args {
    /// Converter configuration file (default: ./cwl2nf.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Nextflow script template with {{ params }}, {{ processes }}, ... placeholders
    #[arg(long, global = true, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Pin every process to one capability entry, by label or instance class
    #[arg(long, global = true, value_name = "CLASS")]
    pub instance_type: Option<String>,

    /// Target platform flavor: batch or healthomics
    #[arg(long, global = true, value_name = "FLAVOR")]
    pub flavor: Option<PlatformFlavor>,

    /// Log pipeline stages at debug level
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Disable console logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

fn after_long_help() -> String {
    let mut text = String::from(
        "Typical flow: check a workflow, inspect its step graph and containers, then convert it or a whole directory of workflows.\n\nENVIRONMENT:\n",
    );
    for line in ConfigLoader::env_var_documentation() {
        text.push_str("    ");
        text.push_str(line);
        text.push('\n');
    }
    text
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Convert one CWL document into a Nextflow pipeline",
        long_about = "Convert loads the document, orders its steps, maps resources and containers, and writes <stem>.nf, nextflow.config and <stem>.diagnostics.json.",
        after_help = "Example:\n    cwl2nf convert workflow.cwl -o pipeline/"
    )]
    Convert(ConvertArgs),
    #[command(
        about = "Convert every CWL document under a directory",
        long_about = "Batch discovers *.cwl files recursively and converts each one independently. One failing document never affects the others; the exit code is non-zero when any document failed.",
        after_help = "Example:\n    cwl2nf batch workflows/ -o nextflow/ --jobs 8"
    )]
    Batch(BatchArgs),
    #[command(
        about = "Validate a CWL document and print its diagnostics",
        long_about = "Check runs loading, model building, dependency resolution and mapping without rendering any Nextflow text.",
        after_help = "Example:\n    cwl2nf check workflow.cwl --format json"
    )]
    Check(CheckArgs),
    #[command(
        about = "Print the step dependency graph as Graphviz DOT",
        after_help = "Example:\n    cwl2nf graph workflow.cwl | dot -Tsvg > workflow.svg"
    )]
    Graph(GraphArgs),
    #[command(
        about = "Show the container image resolved for every step",
        long_about = "Containers prints the resolved image of each step as JSON, or a script that mirrors the original images into the target registry.",
        after_help = "Examples:\n    cwl2nf containers workflow.cwl\n    cwl2nf containers workflow.cwl --push-script > push.sh"
    )]
    Containers(ContainersArgs),
}

pub async fn run(args: Args) -> crate::Result<()> {
    let overrides = commands::ConfigOverrides {
        template: args.template,
        instance_type: args.instance_type,
        flavor: args.flavor,
    };
    let config = commands::load_config(args.config.as_deref(), &overrides)?;
    match args.command {
        Command::Convert(convert_args) => commands::convert(convert_args, &config),
        Command::Batch(batch_args) => commands::batch(batch_args, config).await,
        Command::Check(check_args) => commands::check(check_args, &config),
        Command::Graph(graph_args) => commands::graph(graph_args, &config),
        Command::Containers(containers_args) => commands::containers(containers_args, &config),
    }
}
