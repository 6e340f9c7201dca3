//! `frk-mssql` — SQL Server connections for the apply loop.
//!
//! Wraps `tiberius` behind the blocking [`Connector`] / [`Connection`] traits
//! from `frk-core`. The connector owns a tokio runtime; every connection it
//! hands out drives its I/O through that runtime with `block_on`, so callers
//! stay synchronous and connections may be opened from several threads.

use frk_core::db::{Connection, Connector, Row};
use frk_core::script::split_batches;
use frk_core::types::TargetInstance;
use frk_core::{FrkError, Result};
use std::path::Path;
use std::sync::Arc;
use tiberius::{AuthMethod, Client, ColumnData, Config, SqlBrowser};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type SqlClient = Client<Compat<TcpStream>>;

const MAJOR_VERSION_SQL: &str =
    "SELECT CAST(PARSENAME(CAST(SERVERPROPERTY('ProductVersion') AS nvarchar(128)), 4) AS int)";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Accept the server certificate without validation.
    pub trust_server_certificate: bool,
    pub application_name: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            trust_server_certificate: false,
            application_name: "frk".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// MssqlConnector
// ---------------------------------------------------------------------------

pub struct MssqlConnector {
    runtime: Arc<Runtime>,
    options: ConnectOptions,
}

impl MssqlConnector {
    pub fn new(options: ConnectOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
            options,
        })
    }
}

impl Connector for MssqlConnector {
    fn connect(&self, target: &TargetInstance) -> Result<Box<dyn Connection>> {
        let instance = target.to_string();
        let connection_error = |message: String| FrkError::Connection {
            instance: instance.clone(),
            message,
        };

        let config = client_config(target, &self.options)?;
        let named = target.instance.is_some() && target.port.is_none();

        let (client, major) = self
            .runtime
            .block_on(async {
                let mut client = open(config, named).await?;
                let major = query_major_version(&mut client).await?;
                Ok::<_, tiberius::error::Error>((client, major))
            })
            .map_err(|e| connection_error(e.to_string()))?;

        tracing::debug!(instance = %instance, major, "sql server session opened");
        Ok(Box::new(MssqlConnection {
            runtime: Arc::clone(&self.runtime),
            client,
            major,
        }))
    }
}

/// Build the tiberius configuration for `target`.
pub fn client_config(target: &TargetInstance, options: &ConnectOptions) -> Result<Config> {
    let mut config = Config::new();
    config.host(&target.computer_name);
    if let Some(port) = target.port {
        config.port(port);
    }
    if let Some(instance) = &target.instance {
        config.instance_name(instance);
    }
    config.application_name(&options.application_name);
    if options.trust_server_certificate {
        config.trust_cert();
    }

    match &target.credential {
        Some(credential) => config.authentication(AuthMethod::sql_server(
            &credential.username,
            &credential.password,
        )),
        None => config.authentication(integrated_auth(target)?),
    }
    Ok(config)
}

#[cfg(windows)]
fn integrated_auth(_target: &TargetInstance) -> Result<AuthMethod> {
    Ok(AuthMethod::Integrated)
}

#[cfg(not(windows))]
fn integrated_auth(target: &TargetInstance) -> Result<AuthMethod> {
    Err(FrkError::Connection {
        instance: target.to_string(),
        message: "integrated authentication is only available on Windows; supply a SQL login"
            .to_string(),
    })
}

async fn open(mut config: Config, named: bool) -> tiberius::Result<SqlClient> {
    let tcp = connect_tcp(&config, named).await?;
    match Client::connect(config.clone(), tcp.compat_write()).await {
        // Azure SQL gateways redirect to the node actually hosting the database.
        Err(tiberius::error::Error::Routing { host, port }) => {
            config.host(&host);
            config.port(port);
            let tcp = connect_tcp(&config, false).await?;
            Client::connect(config, tcp.compat_write()).await
        }
        other => other,
    }
}

async fn connect_tcp(config: &Config, named: bool) -> tiberius::Result<TcpStream> {
    let tcp = if named {
        TcpStream::connect_named(config).await?
    } else {
        TcpStream::connect(config.get_addr()).await?
    };
    tcp.set_nodelay(true)?;
    Ok(tcp)
}

async fn query_major_version(client: &mut SqlClient) -> tiberius::Result<u32> {
    let row = client
        .simple_query(MAJOR_VERSION_SQL)
        .await?
        .into_row()
        .await?;
    let major = row
        .and_then(|r| r.get::<i32, _>(0))
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0);
    Ok(major)
}

// ---------------------------------------------------------------------------
// MssqlConnection
// ---------------------------------------------------------------------------

pub struct MssqlConnection {
    runtime: Arc<Runtime>,
    client: SqlClient,
    major: u32,
}

impl Connection for MssqlConnection {
    fn major_version(&self) -> u32 {
        self.major
    }

    fn query(&mut self, sql: &str, database: &str) -> Result<Vec<Row>> {
        let client = &mut self.client;
        let rows = self
            .runtime
            .block_on(async move {
                use_database(client, database).await?;
                client.simple_query(sql).await?.into_first_result().await
            })
            .map_err(|e| FrkError::Query(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().map(|cell| cell_text(&cell)).collect())
            .collect())
    }

    fn exec_script_file(&mut self, path: &Path, database: &str) -> Result<()> {
        let script = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let text = std::fs::read_to_string(path)?;
        let batches = split_batches(text.trim_start_matches('\u{feff}'));

        let client = &mut self.client;
        self.runtime
            .block_on(async move {
                for batch in in_database(database, batches) {
                    client.simple_query(batch).await?.into_results().await?;
                }
                Ok::<_, tiberius::error::Error>(())
            })
            .map_err(|e| FrkError::Script {
                script,
                message: e.to_string(),
            })
    }
}

// `USE` must travel as a plain SQL batch. Through `execute` it would run
// inside sp_executesql and the context switch would end with that call.
async fn use_database(client: &mut SqlClient, database: &str) -> tiberius::Result<()> {
    client
        .simple_query(use_statement(database))
        .await?
        .into_results()
        .await?;
    Ok(())
}

pub fn use_statement(database: &str) -> String {
    format!("USE {}", quote_ident(database))
}

/// `batches` preceded by the database switch, each to be sent on its own.
pub fn in_database(database: &str, batches: Vec<String>) -> Vec<String> {
    let mut all = Vec::with_capacity(batches.len() + 1);
    all.push(use_statement(database));
    all.extend(batches);
    all
}

/// Bracket-quote an identifier, doubling any closing brackets.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

fn cell_text(cell: &ColumnData<'_>) -> Option<String> {
    match cell {
        ColumnData::String(v) => v.as_ref().map(|s| s.to_string()),
        ColumnData::U8(v) => v.as_ref().map(|n| n.to_string()),
        ColumnData::I16(v) => v.as_ref().map(|n| n.to_string()),
        ColumnData::I32(v) => v.as_ref().map(|n| n.to_string()),
        ColumnData::I64(v) => v.as_ref().map(|n| n.to_string()),
        ColumnData::F32(v) => v.as_ref().map(|n| n.to_string()),
        ColumnData::F64(v) => v.as_ref().map(|n| n.to_string()),
        ColumnData::Bit(v) => v.as_ref().map(|b| b.to_string()),
        ColumnData::Guid(v) => v.as_ref().map(|g| g.to_string()),
        ColumnData::Numeric(v) => v.as_ref().map(|n| n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
