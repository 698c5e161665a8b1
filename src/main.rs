use clap::Parser;
use cwl2nf::{cli, logging};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Args::parse();
    let _guard = match logging::init(&args) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: {:#}", err);
            return ExitCode::from(2);
        }
    };

    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!("command failed: {:?}", err);
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
