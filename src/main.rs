use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = bookhaul::logging::init() {
        eprintln!("{err:#}");
        return ExitCode::from(2);
    }

    let cli = bookhaul::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        bookhaul::cli::Command::Scrape(args) => {
            match bookhaul::traverse::run(args).await.context("scrape") {
                Ok(_) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("{err:#}");
                    ExitCode::FAILURE
                }
            }
        }
        bookhaul::cli::Command::Validate(args) => {
            // Exit codes distinguish all-valid, some-invalid and usage error.
            match bookhaul::validate::run(&args) {
                Ok(report) if report.all_valid() => ExitCode::SUCCESS,
                Ok(_) => ExitCode::FAILURE,
                Err(err) => {
                    eprintln!("{err:#}");
                    ExitCode::from(2)
                }
            }
        }
    }
}
