//! Local cache of release archives, one unpacked tree per channel.
//!
//! A refresh never touches the current entry until the new tree has been
//! fully unpacked into a staging directory beside it; the staged tree is then
//! renamed into place. Refreshes are serialized through a gate held by the
//! manager, so concurrent callers see either the old or the new entry.

use crate::archive::{self, Unpacker};
use crate::config::SourceConfig;
use crate::error::{ErrorKind, FrkError, Result};
use crate::fetch::{Fetcher, Route};
use crate::types::{ArtifactSource, Channel};
use crate::{io, paths, retry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Written into every cache entry so `frk cache info` can say where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub channel: Channel,
    /// Download URL or local archive path.
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    pub channel: Channel,
    pub path: PathBuf,
    pub meta: Option<CacheMeta>,
}

// ---------------------------------------------------------------------------
// CacheManager
// ---------------------------------------------------------------------------

pub struct CacheManager<'a> {
    data_root: PathBuf,
    sources: SourceConfig,
    fetcher: &'a dyn Fetcher,
    unpacker: &'a dyn Unpacker,
    refresh_gate: Mutex<()>,
}

impl<'a> CacheManager<'a> {
    pub fn new(
        data_root: impl Into<PathBuf>,
        sources: SourceConfig,
        fetcher: &'a dyn Fetcher,
        unpacker: &'a dyn Unpacker,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            sources,
            fetcher,
            unpacker,
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn entry_path(&self, channel: Channel) -> PathBuf {
        paths::cache_entry(&self.data_root, channel)
    }

    /// Return the cache directory for `source`, refreshing it when needed.
    ///
    /// A remote source is only fetched when `force` is set or the channel has
    /// no entry yet. A local file is always installed, after validation.
    pub fn resolve(&self, source: &ArtifactSource, force: bool) -> Result<PathBuf> {
        match source {
            ArtifactSource::LocalFile { channel, path } => {
                validate_local_file(path)?;
                let _gate = self.lock();
                tracing::info!(channel = %channel, file = %path.display(), "installing local archive");
                self.install(*channel, path, &path.display().to_string())
            }
            ArtifactSource::Remote(channel) => {
                let entry = self.entry_path(*channel);
                if !force && entry.is_dir() {
                    tracing::info!(channel = %channel, path = %entry.display(), "using cached copy");
                    return Ok(entry);
                }
                let _gate = self.lock();
                if !force && entry.is_dir() {
                    return Ok(entry);
                }
                self.refresh(*channel)
            }
        }
    }

    pub fn info(&self, channel: Channel) -> Result<Option<CacheInfo>> {
        let path = self.entry_path(channel);
        if !path.is_dir() {
            return Ok(None);
        }
        let meta_path = paths::cache_meta(&path);
        let meta = if meta_path.exists() {
            let data = std::fs::read_to_string(&meta_path)?;
            Some(serde_yaml::from_str(&data)?)
        } else {
            None
        };
        Ok(Some(CacheInfo {
            channel,
            path,
            meta,
        }))
    }

    /// Remove the channel's entry. Returns false if there was none.
    pub fn clear(&self, channel: Channel) -> Result<bool> {
        let _gate = self.lock();
        io::remove_dir_if_exists(&self.entry_path(channel))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.refresh_gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn refresh(&self, channel: Channel) -> Result<PathBuf> {
        tracing::info!(channel = %channel, "refreshing cache");
        let acquisition_error = |e: FrkError| FrkError::Acquisition {
            channel: channel.to_string(),
            message: e.to_string(),
            manual_url: self.sources.manual_url(channel).to_string(),
        };

        let (download, url) =
            retry::with_alternate(Route::Direct, Route::Proxy, |route| {
                self.download(channel, route)
            })
            .map_err(acquisition_error)?;

        self.install(channel, download.path(), &url)
            .map_err(|e| match e.kind() {
                ErrorKind::Acquisition => acquisition_error(e),
                _ => e,
            })
    }

    fn download(&self, channel: Channel, route: Route) -> Result<(NamedTempFile, String)> {
        let url = self.archive_url(channel, route)?;
        let bytes = self.fetcher.fetch_bytes(&url, route)?;

        let cache_root = paths::cache_root(&self.data_root);
        io::ensure_dir(&cache_root)?;
        let mut file = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".zip")
            .tempfile_in(&cache_root)?;
        file.write_all(&bytes)?;
        file.flush()?;
        tracing::debug!(url = %url, bytes = bytes.len(), "archive downloaded");
        Ok((file, url))
    }

    fn archive_url(&self, channel: Channel, route: Route) -> Result<String> {
        match channel {
            Channel::Development => Ok(self.sources.development_archive_url.clone()),
            Channel::Stable => {
                let release = self
                    .fetcher
                    .fetch_json(&self.sources.stable_release_url, route)?;
                release_asset_url(&release).ok_or_else(|| {
                    FrkError::Fetch(format!(
                        "{}: release metadata has no downloadable archive",
                        self.sources.stable_release_url
                    ))
                })
            }
        }
    }

    /// Unpack `archive` beside the cache entry and swap it into place.
    fn install(&self, channel: Channel, archive: &Path, source: &str) -> Result<PathBuf> {
        let cache_root = paths::cache_root(&self.data_root);
        io::ensure_dir(&cache_root)?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&cache_root)?;

        self.unpacker.unpack(archive, staging.path())?;
        let tree = archive::locate_root(staging.path())?;

        let meta = CacheMeta {
            channel,
            source: source.to_string(),
            fetched_at: Utc::now(),
        };
        io::atomic_write(
            &paths::cache_meta(&tree),
            serde_yaml::to_string(&meta)?.as_bytes(),
        )?;

        let entry = self.entry_path(channel);
        io::replace_dir(&tree, &entry)?;
        tracing::info!(channel = %channel, path = %entry.display(), "cache entry updated");
        Ok(entry)
    }
}

/// Pull the archive URL out of a GitHub "latest release" document.
pub fn release_asset_url(release: &serde_json::Value) -> Option<String> {
    if let Some(url) = release.get("zipball_url").and_then(|v| v.as_str()) {
        return Some(url.to_string());
    }
    release
        .get("assets")?
        .as_array()?
        .iter()
        .filter_map(|asset| asset.get("browser_download_url")?.as_str())
        .find(|url| url.to_ascii_lowercase().ends_with(".zip"))
        .map(str::to_string)
}

/// Reject override files that are missing or not zip archives.
pub fn validate_local_file(path: &Path) -> Result<()> {
    let invalid = |reason: &str| FrkError::InvalidLocalFile {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    if !path.exists() {
        return Err(invalid("file does not exist"));
    }
    if !path.is_file() {
        return Err(invalid("not a regular file"));
    }
    let is_zip = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if !is_zip {
        return Err(invalid("expected a .zip archive"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
