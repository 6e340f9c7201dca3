use crate::error::Result;
use crate::paths;
use crate::types::Channel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SourceConfig
// ---------------------------------------------------------------------------

/// Release locations. Overridable for mirrors and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_stable_release_url")]
    pub stable_release_url: String,
    #[serde(default = "default_stable_manual_url")]
    pub stable_manual_url: String,
    #[serde(default = "default_development_archive_url")]
    pub development_archive_url: String,
}

fn default_stable_release_url() -> String {
    paths::STABLE_RELEASE_URL.to_string()
}

fn default_stable_manual_url() -> String {
    paths::STABLE_MANUAL_URL.to_string()
}

fn default_development_archive_url() -> String {
    paths::DEVELOPMENT_ARCHIVE_URL.to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            stable_release_url: default_stable_release_url(),
            stable_manual_url: default_stable_manual_url(),
            development_archive_url: default_development_archive_url(),
        }
    }
}

impl SourceConfig {
    /// Where a user can fetch the archive by hand when automatic download fails.
    pub fn manual_url(&self, channel: Channel) -> &str {
        match channel {
            Channel::Stable => &self.stable_manual_url,
            Channel::Development => &self.development_archive_url,
        }
    }
}

// ---------------------------------------------------------------------------
// ProxyConfig
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where cache entries live. Falls back to the system temp dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_root: Option<PathBuf>,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub trust_server_certificate: bool,
    /// Upper bound on instances processed at once in parallel mode.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub sources: SourceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

fn default_database() -> String {
    "master".to_string()
}

fn default_parallelism() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: None,
            channel: Channel::default(),
            database: default_database(),
            trust_server_certificate: false,
            parallelism: default_parallelism(),
            sources: SourceConfig::default(),
            proxy: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn data_root(&self) -> PathBuf {
        paths::data_root(self.data_root.as_deref())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let urls = [
            ("sources.stable_release_url", &self.sources.stable_release_url),
            ("sources.stable_manual_url", &self.sources.stable_manual_url),
            (
                "sources.development_archive_url",
                &self.sources.development_archive_url,
            ),
        ];
        for (key, url) in urls {
            if reqwest::Url::parse(url).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{key} is not a valid URL: '{url}'"),
                });
            }
        }

        if let Some(proxy) = &self.proxy {
            if reqwest::Url::parse(&proxy.url).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("proxy.url is not a valid URL: '{}'", proxy.url),
                });
            }
            if proxy.password.is_some() && proxy.username.is_none() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "proxy.password is set without proxy.username; it is ignored"
                        .to_string(),
                });
            }
        }

        if self.parallelism == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "parallelism is 0; instances will be processed one at a time"
                    .to_string(),
            });
        }

        if self.database.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "database must not be empty".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
