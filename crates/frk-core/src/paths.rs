use crate::error::{FrkError, Result};
use crate::types::Channel;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const CACHE_DIR: &str = "first-responder-kit";
pub const CACHE_META_FILE: &str = ".frk-cache.yaml";

/// Every release archive contains exactly one top-level folder whose name
/// carries this marker (`SQL-Server-First-Responder-Kit-dev`,
/// `BrentOzarULTD-SQL-Server-First-Responder-Kit-1a2b3c4`, ...).
pub const PROJECT_MARKER: &str = "First-Responder-Kit";

pub const STABLE_RELEASE_URL: &str =
    "https://api.github.com/repos/BrentOzarULTD/SQL-Server-First-Responder-Kit/releases/latest";
pub const STABLE_MANUAL_URL: &str =
    "https://github.com/BrentOzarULTD/SQL-Server-First-Responder-Kit/releases/latest";
pub const DEVELOPMENT_ARCHIVE_URL: &str =
    "https://github.com/BrentOzarULTD/SQL-Server-First-Responder-Kit/archive/dev.zip";

pub const CONFIG_DIR: &str = ".frk";
pub const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Resolve the data root: explicit value, otherwise the system temp dir.
pub fn data_root(configured: Option<&Path>) -> PathBuf {
    configured
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir)
}

pub fn cache_root(data_root: &Path) -> PathBuf {
    data_root.join(CACHE_DIR)
}

pub fn cache_entry(data_root: &Path, channel: Channel) -> PathBuf {
    cache_root(data_root).join(channel.as_str())
}

pub fn cache_meta(entry: &Path) -> PathBuf {
    entry.join(CACHE_META_FILE)
}

pub fn default_config_path() -> Result<PathBuf> {
    let home = home::home_dir().ok_or(FrkError::HomeNotFound)?;
    Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_root_falls_back_to_temp() {
        assert_eq!(data_root(None), std::env::temp_dir());
        assert_eq!(
            data_root(Some(Path::new("/srv/frk"))),
            PathBuf::from("/srv/frk")
        );
    }

    #[test]
    fn cache_entries_are_keyed_by_channel() {
        let root = Path::new("/srv/frk");
        assert_eq!(
            cache_entry(root, Channel::Stable),
            PathBuf::from("/srv/frk/first-responder-kit/stable")
        );
        assert_eq!(
            cache_entry(root, Channel::Development),
            PathBuf::from("/srv/frk/first-responder-kit/development")
        );
    }
}
