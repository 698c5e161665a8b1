use crate::cli::args::OutputFormat;
use crate::cli::Command;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Single-document commands whose results go to files or a terminal.
    Interactive,
    /// Commands whose primary output is written to stdout and may be piped.
    Piped,
    /// Directory-wide batch conversion; prints only its summary.
    Batch,
}

/// Derive the active execution context from a parsed CLI command.
pub fn detect_context(command: &Command) -> ExecutionContext {
    match command {
        Command::Batch(_) => ExecutionContext::Batch,
        Command::Convert(args) if args.stdout || args.format == OutputFormat::Json => {
            ExecutionContext::Piped
        }
        Command::Check(args) if args.format == OutputFormat::Json => ExecutionContext::Piped,
        Command::Graph(_) | Command::Containers(_) => ExecutionContext::Piped,
        Command::Convert(_) | Command::Check(_) => ExecutionContext::Interactive,
    }
}
