//! YAML-file implementation of the `ConfigStore` port.
//!
//! Settings live at `~/.wimforge/config.yaml`. `WIMFORGE_CONFIG` points
//! the store at a different file, which is how the integration tests keep
//! their hands off the real one.

use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::ConfigStore;
use crate::domain::config::WimforgeConfig;
use crate::infra::fs::wimforge_dir;

pub struct YamlConfigStore;

impl ConfigStore for YamlConfigStore {
    fn load(&self) -> Result<WimforgeConfig> {
        let path = self.path()?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            // A missing file is a fresh install, not an error.
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(WimforgeConfig::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    fn save(&self, config: &WimforgeConfig) -> Result<()> {
        let path = self.path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(config).context("serializing configuration")?;
        std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;

        // Owner read/write only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("restricting permissions on {}", path.display()))?;
        }
        Ok(())
    }

    fn path(&self) -> Result<PathBuf> {
        if let Some(overridden) = std::env::var_os("WIMFORGE_CONFIG") {
            return Ok(PathBuf::from(overridden));
        }
        Ok(wimforge_dir()?.join("config.yaml"))
    }
}
