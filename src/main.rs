//! CLI entry point for playlist-dl.

use std::process::ExitCode;

mod app;
mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    match app::runtime::run().await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
