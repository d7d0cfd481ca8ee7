//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;

/// Build customized WinPE boot media with an embedded PowerShell runtime
#[derive(Parser)]
#[command(
    name = "wimforge",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Skip confirmation prompts
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Customize a boot image and assemble a bootable ISO
    Build(commands::build::BuildArgs),

    /// Manage the runtime package cache
    #[command(subcommand)]
    Cache(commands::cache::CacheCommand),

    /// Recover from interrupted runs (stale mounts, leftover workspaces)
    Cleanup,

    /// Diagnose the build environment
    Doctor,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error when the command fails; the exit code distinguishes
    /// degraded-but-successful outcomes (e.g. `doctor` finding issues).
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            yes,
            command,
        } = self;
        let app = AppContext::new(&AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes },
        })?;

        match command {
            Command::Build(args) => commands::build::run(&app, args).await,
            Command::Cache(cmd) => commands::cache::run(&app, cmd).await,
            Command::Cleanup => commands::cleanup::run(&app).await,
            Command::Doctor => commands::doctor::run(&app).await,
            Command::Config(cmd) => commands::config::run(&app, cmd),
            Command::Version => Ok(commands::version::run(json)),
        }
    }
}
