use crate::error::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Remove a directory tree if it exists. Returns true if something was removed.
pub fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Move `staged` into `target`, replacing whatever was there.
///
/// `staged` and `target` must live on the same file system. An existing
/// `target` is renamed aside first and only deleted once `staged` is in
/// place; if that rename fails the previous tree is put back.
pub fn replace_dir(staged: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let backup = if target.exists() {
        let backup = sibling(target, ".old");
        remove_dir_if_exists(&backup)?;
        std::fs::rename(target, &backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(staged, target) {
        if let Some(backup) = &backup {
            if let Err(restore) = std::fs::rename(backup, target) {
                tracing::error!(
                    target = %target.display(),
                    error = %restore,
                    "failed to restore previous cache entry"
                );
            }
        }
        return Err(e.into());
    }

    if let Some(backup) = backup {
        if let Err(e) = std::fs::remove_dir_all(&backup) {
            tracing::warn!(path = %backup.display(), error = %e, "could not remove old cache entry");
        }
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}
