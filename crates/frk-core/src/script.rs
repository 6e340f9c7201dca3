//! Script discovery, version gates and batch splitting.

use crate::error::Result;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// Scripts that need a minimum SQL Server major version.
const VERSION_GATES: &[(&str, u32)] = &[
    // In-memory OLTP arrived in SQL Server 2014.
    ("sp_BlitzInMemoryOLTP", 12),
    // Query Store arrived in SQL Server 2016.
    ("sp_BlitzQueryStore", 13),
];

/// Minimum major version `name` needs, if any.
pub fn min_major_version(name: &str) -> Option<u32> {
    VERSION_GATES
        .iter()
        .find(|(gated, _)| gated.eq_ignore_ascii_case(name))
        .map(|(_, version)| *version)
}

// ---------------------------------------------------------------------------
// ScriptUnit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptUnit {
    /// File stem, which is also the procedure the script creates.
    pub name: String,
    pub path: PathBuf,
    pub min_major_version: Option<u32>,
}

impl ScriptUnit {
    /// Build a unit from a path if its file name matches `sp_*.sql`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        if !script_re().is_match(file_name) {
            return None;
        }
        let name = path.file_stem()?.to_str()?.to_string();
        Some(Self {
            min_major_version: min_major_version(&name),
            name,
            path: path.to_path_buf(),
        })
    }

    pub fn is_supported_on(&self, major_version: u32) -> bool {
        self.min_major_version
            .map_or(true, |required| required <= major_version)
    }
}

static SCRIPT_RE: OnceLock<Regex> = OnceLock::new();

fn script_re() -> &'static Regex {
    SCRIPT_RE.get_or_init(|| Regex::new(r"(?i)^sp_.+\.sql$").unwrap())
}

/// All `sp_*.sql` files under `dir`, sorted by path.
pub fn discover(dir: &Path) -> Result<Vec<ScriptUnit>> {
    let mut scripts = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(unit) = ScriptUnit::from_path(entry.path()) {
            scripts.push(unit);
        }
    }
    scripts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(scripts)
}

// ---------------------------------------------------------------------------
// Batch splitting
// ---------------------------------------------------------------------------

static GO_RE: OnceLock<Regex> = OnceLock::new();

fn go_re() -> &'static Regex {
    GO_RE.get_or_init(|| Regex::new(r"(?i)^\s*GO(?:\s+(\d+))?\s*(?:--.*)?$").unwrap())
}

/// Split a T-SQL script into batches on `GO` separator lines.
///
/// `GO n` repeats the preceding batch `n` times. Blank batches are dropped.
pub fn split_batches(sql: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        if let Some(caps) = go_re().captures(line) {
            let repeat = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .unwrap_or(1);
            if !current.trim().is_empty() {
                for _ in 0..repeat {
                    batches.push(current.clone());
                }
            }
            current.clear();
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        batches.push(current);
    }
    batches
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn gates_are_fixed_by_name() {
        assert_eq!(min_major_version("sp_BlitzQueryStore"), Some(13));
        assert_eq!(min_major_version("sp_blitzinmemoryoltp"), Some(12));
        assert_eq!(min_major_version("sp_Blitz"), None);
    }

    #[test]
    fn from_path_filters_by_pattern() {
        assert!(ScriptUnit::from_path(Path::new("/c/sp_Blitz.sql")).is_some());
        assert!(ScriptUnit::from_path(Path::new("/c/SP_BLITZ.SQL")).is_some());
        assert!(ScriptUnit::from_path(Path::new("/c/Install-All-Scripts.sql")).is_none());
        assert!(ScriptUnit::from_path(Path::new("/c/sp_Blitz.md")).is_none());
        assert!(ScriptUnit::from_path(Path::new("/c/sp_.sql")).is_none());
    }

    #[test]
    fn gate_comparison() {
        let unit = ScriptUnit::from_path(Path::new("sp_BlitzQueryStore.sql")).unwrap();
        assert!(!unit.is_supported_on(12));
        assert!(unit.is_supported_on(13));
        assert!(unit.is_supported_on(16));

        let ungated = ScriptUnit::from_path(Path::new("sp_Blitz.sql")).unwrap();
        assert!(ungated.is_supported_on(9));
    }

    #[test]
    fn discover_is_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("Deprecated")).unwrap();
        for rel in [
            "sp_BlitzWho.sql",
            "sp_Blitz.sql",
            "Deprecated/sp_BlitzOld.sql",
            "Install-All-Scripts.sql",
            "README.md",
        ] {
            std::fs::write(dir.path().join(rel), "select 1").unwrap();
        }

        let names: Vec<String> = discover(dir.path())
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["sp_BlitzOld", "sp_Blitz", "sp_BlitzWho"]);
    }

    #[test]
    fn split_on_go_lines() {
        let sql = "create table t(a int)\nGO\n\nselect 1\n  go  \nselect 2 -- GO inside a line\n";
        let batches = split_batches(sql);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].trim(), "create table t(a int)");
        assert_eq!(batches[1].trim(), "select 1");
        assert!(batches[2].contains("GO inside a line"));
    }

    #[test]
    fn go_with_count_repeats_batch() {
        let batches = split_batches("insert t values (1)\nGO 3\n");
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn blank_batches_dropped() {
        assert!(split_batches("GO\n\nGO\n").is_empty());
    }
}
