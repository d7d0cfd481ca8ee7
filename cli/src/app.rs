//! Application context — unified state passed to every command handler.
//!
//! `AppContext` is constructed once in `Cli::run()` and carries the loaded
//! configuration, the resolved cache and temp directories, and the terminal
//! output context. Adding a new cross-cutting concern (e.g. `--verbose`,
//! telemetry) requires only one field change here — zero command signatures
//! change.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::ConfigStore;
use crate::domain::config::{WimforgeConfig, validate_config};
use crate::infra::config::YamlConfigStore;
use crate::infra::fs::{default_cache_dir, default_temp_root};
use crate::output::OutputContext;

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `WIMFORGE_YES` env vars).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// When `true`, commands print machine-readable JSON instead of the
    /// human rendering.
    pub json: bool,
    /// Configuration loaded from disk and validated.
    pub config: WimforgeConfig,
    /// Store the `config` command reads and writes through.
    pub config_store: YamlConfigStore,
    /// Resolved package cache directory.
    pub cache_dir: PathBuf,
    /// Resolved parent directory for per-run workspaces.
    pub temp_root: PathBuf,
    /// Directory holding named critical-section lock files, shared by every
    /// wimforge process using the same temp root.
    pub lock_dir: PathBuf,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `WIMFORGE_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error when the config file exists but cannot be read or
    /// fails validation, or when the home directory cannot be determined.
    pub fn new(flags: &AppFlags) -> Result<Self> {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("WIMFORGE_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env;

        let config_store = YamlConfigStore;
        let config = config_store.load().context("loading configuration")?;
        validate_config(&config)?;

        let cache_dir = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => default_cache_dir()?,
        };
        let temp_root = config
            .temp_root
            .clone()
            .unwrap_or_else(default_temp_root);
        let lock_dir = temp_root.join("locks");

        Ok(Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet),
            json: flags.output.json,
            config,
            config_store,
            cache_dir,
            temp_root,
            lock_dir,
            non_interactive,
        })
    }

    /// Maximum wait for a cache or critical-section lock.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeouts.lock_secs)
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `WIMFORGE_YES`
    /// env), returns `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}
