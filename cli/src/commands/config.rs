//! `wimforge config` — show and set configuration values.

use anyhow::{Context, Result};
use std::process::ExitCode;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::domain::config::{validate_config_key, validate_config_value};

use clap::Subcommand;

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Show the configuration file path
    Path,
    /// Set configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
}

/// Run the config command.
///
/// # Errors
///
/// Returns an error when the config file cannot be read or written, or when
/// a key or value fails validation.
pub fn run(app: &AppContext, cmd: ConfigCommand) -> Result<ExitCode> {
    match cmd {
        ConfigCommand::Show => show_config(app),
        ConfigCommand::Path => show_path(app),
        ConfigCommand::Set { key, value } => set_config(app, &key, &value),
    }
}

fn show_config(app: &AppContext) -> Result<ExitCode> {
    let path = app.config_store.path()?;
    if app.json {
        let body = serde_json::json!({
            "path": path,
            "config": serde_yaml::to_value(&app.config).context("serializing config")?,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(ExitCode::SUCCESS);
    }

    app.output.header("Configuration");
    app.output.kv("path", &path.display().to_string());
    app.output.kv(
        "powershell.default_version",
        &app.config.powershell.default_version,
    );
    app.output
        .kv("powershell.download_url", &app.config.powershell.download_url);
    if app.config.powershell.hashes.is_empty() {
        app.output.kv("powershell.hashes", "(none pinned)");
    } else {
        for (version, hash) in &app.config.powershell.hashes {
            app.output
                .kv(&format!("powershell.hash.{version}"), &hash[..12.min(hash.len())]);
        }
    }
    app.output.kv("iso.label", &app.config.iso.label);
    app.output
        .kv("cache_dir", &app.cache_dir.display().to_string());
    app.output
        .kv("temp_root", &app.temp_root.display().to_string());
    Ok(ExitCode::SUCCESS)
}

fn show_path(app: &AppContext) -> Result<ExitCode> {
    let path = app.config_store.path()?;
    if app.json {
        println!("{}", serde_json::json!({ "path": path }));
    } else {
        println!("{}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn set_config(app: &AppContext, key: &str, value: &str) -> Result<ExitCode> {
    validate_config_key(key)?;
    validate_config_value(key, value)?;

    let mut config = app.config_store.load().context("loading configuration")?;

    if key == "powershell.default_version" {
        config.powershell.default_version = value.to_string();
    } else if key == "iso.label" {
        config.iso.label = value.to_string();
    } else if let Some(version) = key.strip_prefix("powershell.hash.") {
        config
            .powershell
            .hashes
            .insert(version.to_string(), value.to_lowercase());
    } else {
        anyhow::bail!("Unknown setting: {key}");
    }

    app.config_store.save(&config)?;
    app.output.success(&format!("Set {key} = {value}"));
    Ok(ExitCode::SUCCESS)
}
