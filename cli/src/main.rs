//! Wimforge CLI - customized WinPE boot media builder

use std::process::ExitCode;

use clap::Parser;

use wimforge_cli::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
