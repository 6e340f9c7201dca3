//! Applies cached scripts to target instances.
//!
//! Each instance is connected once, its installed procedures are read once,
//! then every script is gated, executed and classified in path order. A
//! failure to reach one instance is yielded as an `Err` item and the run moves
//! on to the next instance; a failing script becomes an `Error` record.

use crate::db::{self, Connection, Connector};
use crate::error::{FrkError, Result};
use crate::script::{self, ScriptUnit};
use crate::types::{Status, StatusRecord, TargetInstance};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// InstanceFailure
// ---------------------------------------------------------------------------

/// An instance that produced no records because it could not be reached.
#[derive(Debug)]
pub struct InstanceFailure {
    pub target: TargetInstance,
    pub error: FrkError,
}

impl fmt::Display for InstanceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

impl std::error::Error for InstanceFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub type ApplyResult = std::result::Result<StatusRecord, InstanceFailure>;

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<'a> {
    connector: &'a dyn Connector,
    only: Option<BTreeSet<String>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(connector: &'a dyn Connector) -> Self {
        Self {
            connector,
            only: None,
        }
    }

    /// Restrict the run to the named scripts (case-insensitive base names).
    pub fn only_scripts<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: BTreeSet<String> = names
            .into_iter()
            .map(|n| n.as_ref().to_lowercase())
            .collect();
        self.only = (!names.is_empty()).then_some(names);
        self
    }

    /// Scripts that a run over `cache_dir` would apply, in order.
    pub fn plan(&self, cache_dir: &Path) -> Result<Vec<ScriptUnit>> {
        let mut scripts = script::discover(cache_dir)?;
        if let Some(only) = &self.only {
            scripts.retain(|s| only.contains(&s.name.to_lowercase()));
        }
        Ok(scripts)
    }

    /// Lazily apply every planned script to each target in order.
    pub fn run(
        &self,
        cache_dir: &Path,
        database: &str,
        targets: Vec<TargetInstance>,
    ) -> Result<ApplyRun<'a>> {
        let scripts = self.plan(cache_dir)?;
        tracing::info!(
            scripts = scripts.len(),
            instances = targets.len(),
            database,
            "starting apply run"
        );
        Ok(ApplyRun::new(self.connector, database, scripts, targets))
    }

    /// Apply to up to `max_parallel` instances at a time.
    ///
    /// Results come back grouped by instance, in the order of `targets`.
    pub fn run_parallel(
        &self,
        cache_dir: &Path,
        database: &str,
        targets: Vec<TargetInstance>,
        max_parallel: usize,
    ) -> Result<Vec<ApplyResult>> {
        let scripts = self.plan(cache_dir)?;
        let connector = self.connector;
        let width = max_parallel.max(1);
        let mut results = Vec::new();

        for chunk in targets.chunks(width) {
            let per_instance: Vec<Vec<ApplyResult>> = std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|target| {
                        let scripts = scripts.clone();
                        let owned = target.clone();
                        let handle = scope.spawn(move || {
                            ApplyRun::new(connector, database, scripts, vec![owned])
                                .collect::<Vec<_>>()
                        });
                        (target, handle)
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|(target, handle)| {
                        handle.join().unwrap_or_else(|_| {
                            vec![Err(InstanceFailure {
                                target: target.clone(),
                                error: FrkError::Connection {
                                    instance: target.to_string(),
                                    message: "worker thread panicked".to_string(),
                                },
                            })]
                        })
                    })
                    .collect()
            });
            results.extend(per_instance.into_iter().flatten());
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// ApplyRun
// ---------------------------------------------------------------------------

/// Iterator over the outcome of a run. Work happens as items are pulled.
pub struct ApplyRun<'a> {
    connector: &'a dyn Connector,
    database: String,
    scripts: Vec<ScriptUnit>,
    targets: std::vec::IntoIter<TargetInstance>,
    current: Option<Session>,
}

struct Session {
    target: TargetInstance,
    conn: Box<dyn Connection>,
    /// Snapshot taken before the first script runs; never refreshed.
    installed: BTreeSet<String>,
    next: usize,
}

impl<'a> ApplyRun<'a> {
    fn new(
        connector: &'a dyn Connector,
        database: &str,
        scripts: Vec<ScriptUnit>,
        targets: Vec<TargetInstance>,
    ) -> Self {
        Self {
            connector,
            database: database.to_string(),
            scripts,
            targets: targets.into_iter(),
            current: None,
        }
    }
}

impl Iterator for ApplyRun<'_> {
    type Item = ApplyResult;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(session) = &mut self.current {
                if let Some(script) = self.scripts.get(session.next) {
                    session.next += 1;
                    return Some(Ok(apply_script(session, script, &self.database)));
                }
                self.current = None;
            }

            let target = self.targets.next()?;
            match open_session(self.connector, target, &self.database) {
                Ok(session) => self.current = Some(session),
                Err(failure) => return Some(Err(failure)),
            }
        }
    }
}

fn open_session(
    connector: &dyn Connector,
    target: TargetInstance,
    database: &str,
) -> std::result::Result<Session, InstanceFailure> {
    let mut conn = match connector.connect(&target) {
        Ok(conn) => conn,
        Err(error) => {
            tracing::warn!(instance = %target, error = %error, "skipping instance");
            return Err(InstanceFailure { target, error });
        }
    };

    let installed = match db::installed_procedures(conn.as_mut(), database) {
        Ok(installed) => installed,
        Err(error) => {
            tracing::warn!(instance = %target, database, error = %error, "could not read installed procedures");
            return Err(InstanceFailure { target, error });
        }
    };

    tracing::info!(
        instance = %target,
        major_version = conn.major_version(),
        installed = installed.len(),
        "connected"
    );
    Ok(Session {
        target,
        conn,
        installed,
        next: 0,
    })
}

fn apply_script(session: &mut Session, script: &ScriptUnit, database: &str) -> StatusRecord {
    let major = session.conn.major_version();
    if let Some(required) = script.min_major_version.filter(|_| !script.is_supported_on(major)) {
        tracing::debug!(
            instance = %session.target,
            script = %script.name,
            required,
            major,
            "version gate"
        );
        return StatusRecord::new(&session.target, database, &script.name, Status::Skipped)
            .with_detail(format!(
                "requires SQL Server major version {required} or later, instance is {major}"
            ));
    }

    match session.conn.exec_script_file(&script.path, database) {
        Ok(()) => {
            let status = if session.installed.contains(&script.name.to_lowercase()) {
                Status::Updated
            } else {
                Status::Installed
            };
            tracing::debug!(instance = %session.target, script = %script.name, %status, "applied");
            StatusRecord::new(&session.target, database, &script.name, status)
        }
        Err(error) => {
            tracing::warn!(
                instance = %session.target,
                script = %script.name,
                error = %error,
                "script failed"
            );
            StatusRecord::new(&session.target, database, &script.name, Status::Error)
                .with_detail(error.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Row;
    use crate::error::ErrorKind;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct FakeServer {
        major: u32,
        installed: Vec<&'static str>,
        failing_scripts: Vec<&'static str>,
        unreachable: bool,
        broken_catalog: bool,
    }

    type Log = Arc<Mutex<Vec<(String, String)>>>;

    #[derive(Default)]
    struct FakeConnector {
        servers: HashMap<String, FakeServer>,
        executed: Log,
    }

    impl FakeConnector {
        fn with(mut self, name: &str, server: FakeServer) -> Self {
            self.servers.insert(name.to_string(), server);
            self
        }

        fn executed(&self) -> Vec<(String, String)> {
            self.executed.lock().unwrap().clone()
        }
    }

    struct FakeConnection {
        instance: String,
        server: FakeServer,
        executed: Log,
    }

    impl Connector for FakeConnector {
        fn connect(&self, target: &TargetInstance) -> Result<Box<dyn Connection>> {
            let instance = target.to_string();
            match self.servers.get(&instance) {
                Some(server) if !server.unreachable => Ok(Box::new(FakeConnection {
                    instance,
                    server: server.clone(),
                    executed: Arc::clone(&self.executed),
                })),
                _ => Err(FrkError::Connection {
                    instance,
                    message: "network path not found".into(),
                }),
            }
        }
    }

    impl Connection for FakeConnection {
        fn major_version(&self) -> u32 {
            self.server.major
        }

        fn query(&mut self, sql: &str, _database: &str) -> Result<Vec<Row>> {
            assert_eq!(sql, db::INSTALLED_PROCEDURES_SQL);
            if self.server.broken_catalog {
                return Err(FrkError::Query("permission denied on sys.procedures".into()));
            }
            Ok(self
                .server
                .installed
                .iter()
                .map(|name| vec![Some(name.to_string())])
                .collect())
        }

        fn exec_script_file(&mut self, path: &Path, _database: &str) -> Result<()> {
            let name = path.file_stem().unwrap().to_string_lossy().into_owned();
            self.executed
                .lock()
                .unwrap()
                .push((self.instance.clone(), name.clone()));
            if self.server.failing_scripts.contains(&name.as_str()) {
                return Err(FrkError::Script {
                    script: name,
                    message: "Incorrect syntax near 'GO'".into(),
                });
            }
            Ok(())
        }
    }

    fn cache_with(scripts: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for rel in scripts {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "select 1").unwrap();
        }
        dir
    }

    fn targets(names: &[&str]) -> Vec<TargetInstance> {
        names.iter().map(|n| TargetInstance::parse(n).unwrap()).collect()
    }

    fn statuses(results: &[ApplyResult]) -> Vec<(String, Status)> {
        results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|r| (r.name.clone(), r.status))
            .collect()
    }

    #[test]
    fn gated_scripts_are_skipped_and_never_executed() {
        let cache = cache_with(&[
            "sp_Blitz.sql",
            "sp_BlitzInMemoryOLTP.sql",
            "sp_BlitzQueryStore.sql",
        ]);
        let connector = FakeConnector::default().with(
            "sql2012",
            FakeServer {
                major: 11,
                ..Default::default()
            },
        );

        let results: Vec<_> = Orchestrator::new(&connector)
            .run(cache.path(), "master", targets(&["sql2012"]))
            .unwrap()
            .collect();

        assert_eq!(
            statuses(&results),
            vec![
                ("sp_Blitz".to_string(), Status::Installed),
                ("sp_BlitzInMemoryOLTP".to_string(), Status::Skipped),
                ("sp_BlitzQueryStore".to_string(), Status::Skipped),
            ]
        );
        assert_eq!(
            connector.executed(),
            vec![("sql2012".to_string(), "sp_Blitz".to_string())]
        );
        let skipped = results[1].as_ref().unwrap();
        assert!(skipped.detail.as_deref().unwrap().contains("12"));
    }

    #[test]
    fn gate_passes_on_new_enough_instance() {
        let cache = cache_with(&["sp_BlitzInMemoryOLTP.sql", "sp_BlitzQueryStore.sql"]);
        let connector = FakeConnector::default().with(
            "sql2016",
            FakeServer {
                major: 13,
                ..Default::default()
            },
        );

        let results: Vec<_> = Orchestrator::new(&connector)
            .run(cache.path(), "master", targets(&["sql2016"]))
            .unwrap()
            .collect();

        assert!(statuses(&results)
            .iter()
            .all(|(_, s)| *s == Status::Installed));
    }

    #[test]
    fn existing_procedures_are_updated() {
        let cache = cache_with(&["sp_Blitz.sql", "sp_BlitzCache.sql", "sp_BlitzWho.sql"]);
        let connector = FakeConnector::default().with(
            "sql01",
            FakeServer {
                major: 15,
                installed: vec!["SP_BLITZ", "sp_BlitzWho", "sp_SomethingElse"],
                ..Default::default()
            },
        );

        let results: Vec<_> = Orchestrator::new(&connector)
            .run(cache.path(), "DBA", targets(&["sql01"]))
            .unwrap()
            .collect();

        assert_eq!(
            statuses(&results),
            vec![
                ("sp_Blitz".to_string(), Status::Updated),
                ("sp_BlitzCache".to_string(), Status::Installed),
                ("sp_BlitzWho".to_string(), Status::Updated),
            ]
        );
        assert!(results
            .iter()
            .all(|r| r.as_ref().unwrap().database == "DBA"));
    }

    #[test]
    fn snapshot_is_not_refreshed_mid_run() {
        let cache = cache_with(&["Deprecated/sp_Blitz.sql", "sp_Blitz.sql"]);
        let connector = FakeConnector::default().with(
            "sql01",
            FakeServer {
                major: 15,
                ..Default::default()
            },
        );

        let results: Vec<_> = Orchestrator::new(&connector)
            .run(cache.path(), "master", targets(&["sql01"]))
            .unwrap()
            .collect();

        assert_eq!(
            statuses(&results),
            vec![
                ("sp_Blitz".to_string(), Status::Installed),
                ("sp_Blitz".to_string(), Status::Installed),
            ]
        );
    }

    #[test]
    fn script_error_does_not_stop_later_scripts() {
        let cache = cache_with(&["sp_Blitz.sql", "sp_BlitzFirst.sql", "sp_BlitzWho.sql"]);
        let connector = FakeConnector::default().with(
            "sql01",
            FakeServer {
                major: 14,
                failing_scripts: vec!["sp_BlitzFirst"],
                ..Default::default()
            },
        );

        let results: Vec<_> = Orchestrator::new(&connector)
            .run(cache.path(), "master", targets(&["sql01"]))
            .unwrap()
            .collect();

        assert_eq!(
            statuses(&results),
            vec![
                ("sp_Blitz".to_string(), Status::Installed),
                ("sp_BlitzFirst".to_string(), Status::Error),
                ("sp_BlitzWho".to_string(), Status::Installed),
            ]
        );
        let failed = results[1].as_ref().unwrap();
        assert!(failed.detail.as_deref().unwrap().contains("Incorrect syntax"));
    }

    #[test]
    fn unreachable_instance_does_not_block_the_next() {
        let cache = cache_with(&["sp_Blitz.sql", "sp_BlitzWho.sql"]);
        let connector = FakeConnector::default()
            .with(
                "down",
                FakeServer {
                    unreachable: true,
                    ..Default::default()
                },
            )
            .with(
                r"up\PROD",
                FakeServer {
                    major: 16,
                    ..Default::default()
                },
            );

        let results: Vec<_> = Orchestrator::new(&connector)
            .run(cache.path(), "master", targets(&["down", r"up\PROD"]))
            .unwrap()
            .collect();

        assert_eq!(results.len(), 3);
        let failure = results[0].as_ref().unwrap_err();
        assert_eq!(failure.target.computer_name, "down");
        assert_eq!(failure.error.kind(), ErrorKind::Connection);

        for r in &results[1..] {
            let r = r.as_ref().unwrap();
            assert_eq!(r.sql_instance, r"up\PROD");
            assert_eq!(r.instance_name, "PROD");
            assert_eq!(r.computer_name, "up");
        }
    }

    #[test]
    fn catalog_failure_skips_instance() {
        let cache = cache_with(&["sp_Blitz.sql"]);
        let connector = FakeConnector::default()
            .with(
                "locked",
                FakeServer {
                    major: 15,
                    broken_catalog: true,
                    ..Default::default()
                },
            )
            .with(
                "open",
                FakeServer {
                    major: 15,
                    ..Default::default()
                },
            );

        let results: Vec<_> = Orchestrator::new(&connector)
            .run(cache.path(), "master", targets(&["locked", "open"]))
            .unwrap()
            .collect();

        assert!(results[0].is_err());
        assert_eq!(statuses(&results), vec![("sp_Blitz".to_string(), Status::Installed)]);
        assert_eq!(
            connector.executed(),
            vec![("open".to_string(), "sp_Blitz".to_string())]
        );
    }

    #[test]
    fn run_is_lazy() {
        let cache = cache_with(&["sp_Blitz.sql", "sp_BlitzCache.sql", "sp_BlitzWho.sql"]);
        let connector = FakeConnector::default().with(
            "sql01",
            FakeServer {
                major: 15,
                ..Default::default()
            },
        );

        let mut run = Orchestrator::new(&connector)
            .run(cache.path(), "master", targets(&["sql01"]))
            .unwrap();
        assert!(connector.executed().is_empty());

        run.next().unwrap().unwrap();
        assert_eq!(connector.executed().len(), 1);
    }

    #[test]
    fn only_scripts_filters_plan() {
        let cache = cache_with(&["sp_Blitz.sql", "sp_BlitzCache.sql", "sp_BlitzWho.sql"]);
        let connector = FakeConnector::default();

        let plan = Orchestrator::new(&connector)
            .only_scripts(["sp_blitzwho", "sp_Blitz"])
            .plan(cache.path())
            .unwrap();
        let names: Vec<_> = plan.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["sp_Blitz", "sp_BlitzWho"]);

        let empty: [&str; 0] = [];
        let all = Orchestrator::new(&connector)
            .only_scripts(empty)
            .plan(cache.path())
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn parallel_keeps_instance_grouping_and_order() {
        let cache = cache_with(&["sp_Blitz.sql", "sp_BlitzCache.sql"]);
        let connector = FakeConnector::default()
            .with("a", FakeServer { major: 15, ..Default::default() })
            .with("b", FakeServer { unreachable: true, ..Default::default() })
            .with("c", FakeServer { major: 11, ..Default::default() });

        let results = Orchestrator::new(&connector)
            .run_parallel(cache.path(), "master", targets(&["a", "b", "c"]), 2)
            .unwrap();

        let shape: Vec<String> = results
            .iter()
            .map(|r| match r {
                Ok(rec) => format!("{}:{}", rec.computer_name, rec.name),
                Err(f) => format!("{}:failed", f.target.computer_name),
            })
            .collect();
        assert_eq!(
            shape,
            vec![
                "a:sp_Blitz",
                "a:sp_BlitzCache",
                "b:failed",
                "c:sp_Blitz",
                "c:sp_BlitzCache",
            ]
        );
    }
}
