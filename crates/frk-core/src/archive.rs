use crate::error::{FrkError, Result};
use crate::paths::PROJECT_MARKER;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Archive extraction used by the cache manager.
pub trait Unpacker: Send + Sync {
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Extracts `.zip` archives, refusing entries that would land outside `dest`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipUnpacker;

impl Unpacker for ZipUnpacker {
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<()> {
        let file = File::open(archive)?;
        let mut zip = zip::ZipArchive::new(file)
            .map_err(|e| FrkError::Unpack(format!("{}: {e}", archive.display())))?;

        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| FrkError::Unpack(format!("{}: {e}", archive.display())))?;
            let Some(relative) = entry.enclosed_name() else {
                return Err(FrkError::Unpack(format!(
                    "entry '{}' escapes the extraction directory",
                    entry.name()
                )));
            };
            let out = dest.join(relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&out)?;
                continue;
            }
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut writer = File::create(&out)?;
            std::io::copy(&mut entry, &mut writer)?;
        }

        tracing::debug!(
            archive = %archive.display(),
            entries = zip.len(),
            "archive unpacked"
        );
        Ok(())
    }
}

/// Find the single top-level directory of an extracted release.
pub fn locate_root(extracted: &Path) -> Result<PathBuf> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(extracted)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().contains(PROJECT_MARKER) {
            candidates.push(entry.path());
        }
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(FrkError::Unpack(format!(
            "archive has no top-level folder containing '{PROJECT_MARKER}'"
        ))),
        n => Err(FrkError::Unpack(format!(
            "archive has {n} top-level folders containing '{PROJECT_MARKER}', expected one"
        ))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    /// Write a zip at `path` holding `entries` as (name, contents) pairs.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, contents) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn unpacks_nested_tree() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("frk.zip");
        write_zip(
            &archive,
            &[
                ("SQL-Server-First-Responder-Kit-dev/sp_Blitz.sql", "select 1"),
                (
                    "SQL-Server-First-Responder-Kit-dev/Deprecated/sp_BlitzOld.sql",
                    "select 2",
                ),
            ],
        );

        let dest = dir.path().join("out");
        ZipUnpacker.unpack(&archive, &dest).unwrap();

        let root = dest.join("SQL-Server-First-Responder-Kit-dev");
        assert_eq!(
            std::fs::read_to_string(root.join("sp_Blitz.sql")).unwrap(),
            "select 1"
        );
        assert!(root.join("Deprecated/sp_BlitzOld.sql").exists());
    }

    #[test]
    fn rejects_entries_outside_destination() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../escape.sql", "drop table x")]);

        let dest = dir.path().join("out");
        let err = ZipUnpacker.unpack(&archive, &dest).unwrap_err();
        assert!(matches!(err, FrkError::Unpack(_)));
        assert!(!dir.path().join("escape.sql").exists());
    }

    #[test]
    fn non_zip_is_unpack_error() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("fake.zip");
        std::fs::write(&archive, "definitely not a zip").unwrap();
        let err = ZipUnpacker.unpack(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, FrkError::Unpack(_)));
    }

    #[test]
    fn locate_root_requires_exactly_one_marker_folder() {
        let dir = TempDir::new().unwrap();
        assert!(locate_root(dir.path()).is_err());

        std::fs::create_dir(dir.path().join("BrentOzarULTD-SQL-Server-First-Responder-Kit-1a2b")).unwrap();
        std::fs::write(dir.path().join("README.md"), "x").unwrap();
        std::fs::create_dir(dir.path().join("unrelated")).unwrap();
        let root = locate_root(dir.path()).unwrap();
        assert!(root.ends_with("BrentOzarULTD-SQL-Server-First-Responder-Kit-1a2b"));

        std::fs::create_dir(dir.path().join("SQL-Server-First-Responder-Kit-dev")).unwrap();
        assert!(locate_root(dir.path()).is_err());
    }
}
