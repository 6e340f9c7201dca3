use crate::error::Result;
use crate::types::TargetInstance;
use std::collections::BTreeSet;
use std::path::Path;

/// Non-system procedures in the current database.
pub const INSTALLED_PROCEDURES_SQL: &str =
    "SELECT name FROM sys.procedures WHERE is_ms_shipped = 0";

/// A result row, every column rendered as text (`None` for NULL).
pub type Row = Vec<Option<String>>;

/// Opens connections to target instances.
pub trait Connector: Sync {
    fn connect(&self, target: &TargetInstance) -> Result<Box<dyn Connection>>;
}

/// One open session against an instance.
pub trait Connection {
    /// Major version the server reports (11 = 2012, 13 = 2016, ...).
    fn major_version(&self) -> u32;

    fn query(&mut self, sql: &str, database: &str) -> Result<Vec<Row>>;

    fn exec_script_file(&mut self, path: &Path, database: &str) -> Result<()>;
}

/// Names of user procedures already present in `database`, lowercased since
/// default collations compare object names case-insensitively.
pub fn installed_procedures(
    conn: &mut dyn Connection,
    database: &str,
) -> Result<BTreeSet<String>> {
    let rows = conn.query(INSTALLED_PROCEDURES_SQL, database)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.into_iter().next().flatten())
        .map(|name| name.to_lowercase())
        .collect())
}
