use anyhow::Context;
use frk_core::config::Config;
use frk_core::paths;
use frk_core::types::Channel;
use std::path::{Path, PathBuf};

/// Effective configuration for one invocation.
///
/// Priority, highest first:
/// 1. command-line flags (and their `FRK_*` env vars, via clap)
/// 2. the config file: `--config` / `FRK_CONFIG`, else `~/.frk/config.yaml`
/// 3. built-in defaults
pub struct Settings {
    pub config: Config,
    /// `None` when no config file was found.
    pub config_path: Option<PathBuf>,
}

impl Settings {
    pub fn load(explicit: Option<&Path>, data_root: Option<&Path>) -> anyhow::Result<Self> {
        let (mut config, config_path) = match explicit {
            Some(path) => {
                let config = Config::load(path)
                    .with_context(|| format!("failed to load config {}", path.display()))?;
                (config, Some(path.to_path_buf()))
            }
            None => match paths::default_config_path() {
                Ok(path) => {
                    let config = Config::load_or_default(&path)
                        .with_context(|| format!("failed to load config {}", path.display()))?;
                    (config, path.exists().then_some(path))
                }
                Err(_) => (Config::default(), None),
            },
        };

        if let Some(root) = data_root {
            config.data_root = Some(root.to_path_buf());
        }
        tracing::debug!(config = ?config_path, data_root = %config.data_root().display(), "settings loaded");

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn data_root(&self) -> PathBuf {
        self.config.data_root()
    }

    pub fn channel(&self, flag: Option<Channel>) -> Channel {
        flag.unwrap_or(self.config.channel)
    }
}
