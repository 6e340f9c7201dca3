use super::{artifact_source, cache_manager, http_fetcher};
use crate::output::{print_json, print_records, summary};
use crate::settings::Settings;
use anyhow::Context;
use clap::Args;
use frk_core::orchestrator::{ApplyResult, Orchestrator};
use frk_core::types::{Channel, Credential, StatusRecord, TargetInstance};
use frk_mssql::{ConnectOptions, MssqlConnector};
use std::path::PathBuf;

#[derive(Args)]
pub struct InstallArgs {
    /// Target instances: host, host\instance, host,port or host\instance,port
    #[arg(required = true, value_name = "INSTANCE")]
    pub instances: Vec<String>,

    /// Database to install into (default: from config, else master)
    #[arg(long, short = 'd')]
    pub database: Option<String>,

    /// stable or development (default: from config)
    #[arg(long)]
    pub channel: Option<Channel>,

    /// Install from this release zip instead of downloading
    #[arg(long, value_name = "PATH")]
    pub local_file: Option<PathBuf>,

    /// Re-download the release even if it is cached
    #[arg(long)]
    pub force: bool,

    /// Only apply these scripts (base names, e.g. sp_Blitz); repeatable
    #[arg(long, value_name = "NAME")]
    pub only: Vec<String>,

    /// SQL login (default: integrated authentication)
    #[arg(long)]
    pub sql_user: Option<String>,

    #[arg(long, env = "FRK_SQL_PASSWORD", hide_env_values = true)]
    pub sql_password: Option<String>,

    /// Work on several instances at once (bounded by `parallelism` in config)
    #[arg(long)]
    pub parallel: bool,
}

pub fn run(settings: &Settings, args: InstallArgs, json: bool) -> anyhow::Result<()> {
    let credential = credential(args.sql_user, args.sql_password)?;
    let targets = args
        .instances
        .iter()
        .map(|s| TargetInstance::parse(s).map(|t| t.with_credential(credential.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    let channel = settings.channel(args.channel);
    let database = args
        .database
        .unwrap_or_else(|| settings.config.database.clone());

    // Acquisition finishes before any instance is touched.
    let fetcher = http_fetcher(settings)?;
    let cache = cache_manager(settings, &fetcher);
    let cache_dir = cache
        .resolve(&artifact_source(channel, args.local_file), args.force)
        .with_context(|| format!("failed to prepare the {channel} release"))?;

    let connector = MssqlConnector::new(ConnectOptions {
        trust_server_certificate: settings.config.trust_server_certificate,
        ..ConnectOptions::default()
    })?;
    let orchestrator = Orchestrator::new(&connector).only_scripts(&args.only);

    let mut records = Vec::new();
    let mut failed_instances = 0;
    let mut collect = |result: ApplyResult| match result {
        Ok(record) => records.push(record),
        Err(failure) => {
            failed_instances += 1;
            eprintln!("warning: {failure}");
        }
    };

    if args.parallel {
        orchestrator
            .run_parallel(&cache_dir, &database, targets, settings.config.parallelism)?
            .into_iter()
            .for_each(&mut collect);
    } else {
        orchestrator
            .run(&cache_dir, &database, targets)?
            .for_each(&mut collect);
    }

    report(&records, failed_instances, json)
}

fn credential(user: Option<String>, password: Option<String>) -> anyhow::Result<Option<Credential>> {
    match (user, password) {
        (Some(username), Some(password)) => Ok(Some(Credential { username, password })),
        (Some(_), None) => {
            anyhow::bail!("--sql-user needs a password: pass --sql-password or set FRK_SQL_PASSWORD")
        }
        (None, _) => Ok(None),
    }
}

fn report(records: &[StatusRecord], failed_instances: usize, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&records);
    }
    if !records.is_empty() {
        print_records(records);
        println!();
    }
    let mut line = summary(records);
    if failed_instances > 0 {
        line.push_str(&format!(", {failed_instances} instance(s) unreachable"));
    }
    println!("{line}");
    Ok(())
}
