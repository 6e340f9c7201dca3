use crate::error::{FrkError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Release line to install from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    Stable,
    Development,
}

impl Channel {
    pub fn all() -> &'static [Channel] {
        &[Channel::Stable, Channel::Development]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Development => "development",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = FrkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stable" | "main" | "master" => Ok(Channel::Stable),
            "development" | "dev" => Ok(Channel::Development),
            _ => Err(FrkError::InvalidChannel(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactSource
// ---------------------------------------------------------------------------

/// Where the script bundle comes from for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    Remote(Channel),
    /// A locally downloaded archive, installed into `channel`'s cache entry.
    LocalFile { channel: Channel, path: PathBuf },
}

impl ArtifactSource {
    pub fn channel(&self) -> Channel {
        match self {
            ArtifactSource::Remote(channel) => *channel,
            ArtifactSource::LocalFile { channel, .. } => *channel,
        }
    }
}

// ---------------------------------------------------------------------------
// TargetInstance
// ---------------------------------------------------------------------------

pub const DEFAULT_INSTANCE_NAME: &str = "MSSQLSERVER";

/// SQL login used instead of integrated authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One server to install into, parsed from SQL Server address notation:
/// `host`, `host\instance`, `host,port` or `host\instance,port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInstance {
    pub computer_name: String,
    /// `None` for the default instance.
    pub instance: Option<String>,
    pub port: Option<u16>,
    pub credential: Option<Credential>,
}

impl TargetInstance {
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || FrkError::InvalidInstance(input.to_string());
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let (address, port) = match trimmed.rsplit_once(',') {
            Some((address, port)) => {
                let port = port.trim().parse::<u16>().map_err(|_| invalid())?;
                (address.trim(), Some(port))
            }
            None => (trimmed, None),
        };

        let (computer, instance) = match address.split_once('\\') {
            Some((computer, instance)) => {
                if instance.is_empty() || instance.contains('\\') {
                    return Err(invalid());
                }
                (computer, Some(instance))
            }
            None => (address, None),
        };
        if computer.is_empty() || computer.contains(char::is_whitespace) {
            return Err(invalid());
        }

        let instance = instance
            .filter(|name| !name.eq_ignore_ascii_case(DEFAULT_INSTANCE_NAME))
            .map(str::to_string);

        Ok(Self {
            computer_name: computer.to_string(),
            instance,
            port,
            credential: None,
        })
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn instance_name(&self) -> &str {
        self.instance.as_deref().unwrap_or(DEFAULT_INSTANCE_NAME)
    }

    /// `computer` or `computer\instance`, the name SQL Server reports for itself.
    pub fn sql_instance(&self) -> String {
        match &self.instance {
            Some(instance) => format!("{}\\{}", self.computer_name, instance),
            None => self.computer_name.clone(),
        }
    }
}

impl fmt::Display for TargetInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql_instance())?;
        if let Some(port) = self.port {
            write!(f, ",{port}")?;
        }
        Ok(())
    }
}

impl FromStr for TargetInstance {
    type Err = FrkError;

    fn from_str(s: &str) -> Result<Self> {
        TargetInstance::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Installed,
    Updated,
    Skipped,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Installed => "Installed",
            Status::Updated => "Updated",
            Status::Skipped => "Skipped",
            Status::Error => "Error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StatusRecord
// ---------------------------------------------------------------------------

/// Outcome of applying one script to one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub computer_name: String,
    pub instance_name: String,
    pub sql_instance: String,
    pub database: String,
    pub name: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StatusRecord {
    pub fn new(target: &TargetInstance, database: &str, name: &str, status: Status) -> Self {
        Self {
            computer_name: target.computer_name.clone(),
            instance_name: target.instance_name().to_string(),
            sql_instance: target.sql_instance(),
            database: database.to_string(),
            name: name.to_string(),
            status,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
