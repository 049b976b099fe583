use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // Diagnostics go to stderr and are off unless RASSEMBLE_LOG asks for them
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_env("RASSEMBLE_LOG").unwrap_or_else(|_| EnvFilter::new("off")),
        )
        .init();

    if let Err(e) = rassemble::cli::run() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
