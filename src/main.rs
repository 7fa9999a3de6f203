mod cli;
mod execute;

use std::process::ExitCode;
use clap::Parser;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use zap::ZapError;
use crate::cli::CLI;

const DEBUG_ENV: &str = "ZAP_DEBUG";

fn main() -> ExitCode {
    let cli = CLI::parse();
    init_logging(cli.verbose);

    match execute::execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(e.downcast_ref::<ZapError>(), Some(ZapError::UserCancelled)) => {
            eprintln!("Aborted!");
            ExitCode::from(130)
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let debug = std::env::var(DEBUG_ENV).is_ok_and(|v| v == "1");
    let level = match verbose {
        0 if !debug => LevelFilter::INFO,
        0 | 1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
