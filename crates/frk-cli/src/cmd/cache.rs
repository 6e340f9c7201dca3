use super::{artifact_source, cache_manager, http_fetcher, local_cache_manager};
use crate::output::{print_json, Table};
use crate::settings::Settings;
use anyhow::Context;
use clap::Subcommand;
use frk_core::types::Channel;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum CacheSubcommand {
    /// Populate the cache for a channel and print its path
    Refresh {
        /// stable or development (default: from config)
        #[arg(long)]
        channel: Option<Channel>,
        /// Install this release zip instead of downloading
        #[arg(long, value_name = "PATH")]
        local_file: Option<PathBuf>,
        /// Download even if the channel is already cached
        #[arg(long)]
        force: bool,
    },

    /// Show where cached releases came from (all channels by default)
    Info {
        #[arg(long)]
        channel: Option<Channel>,
    },

    /// Delete cached releases (all channels by default)
    Clear {
        #[arg(long)]
        channel: Option<Channel>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(settings: &Settings, subcmd: CacheSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CacheSubcommand::Refresh {
            channel,
            local_file,
            force,
        } => refresh(settings, settings.channel(channel), local_file, force, json),
        CacheSubcommand::Info { channel } => info(settings, channels(channel), json),
        CacheSubcommand::Clear { channel } => clear(settings, channels(channel), json),
    }
}

fn channels(flag: Option<Channel>) -> Vec<Channel> {
    match flag {
        Some(channel) => vec![channel],
        None => Channel::all().to_vec(),
    }
}

// ---------------------------------------------------------------------------
// refresh
// ---------------------------------------------------------------------------

fn refresh(
    settings: &Settings,
    channel: Channel,
    local_file: Option<PathBuf>,
    force: bool,
    json: bool,
) -> anyhow::Result<()> {
    let fetcher = http_fetcher(settings)?;
    let cache = cache_manager(settings, &fetcher);
    let path = cache
        .resolve(&artifact_source(channel, local_file), force)
        .with_context(|| format!("failed to refresh the {channel} cache"))?;

    if json {
        print_json(&serde_json::json!({
            "channel": channel,
            "path": path,
        }))?;
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// info
// ---------------------------------------------------------------------------

fn info(settings: &Settings, channels: Vec<Channel>, json: bool) -> anyhow::Result<()> {
    let cache = local_cache_manager(settings);

    let mut entries = Vec::new();
    for channel in channels {
        if let Some(entry) = cache.info(channel)? {
            entries.push(entry);
        }
    }

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No cached releases under {}.", settings.data_root().display());
        return Ok(());
    }

    let mut table = Table::new(&["CHANNEL", "PATH", "SOURCE", "FETCHED"]);
    for e in &entries {
        let (source, fetched) = match &e.meta {
            Some(meta) => (
                meta.source.clone(),
                meta.fetched_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        table.row(vec![
            e.channel.to_string(),
            e.path.display().to_string(),
            source,
            fetched,
        ]);
    }
    table.print();
    Ok(())
}

// ---------------------------------------------------------------------------
// clear
// ---------------------------------------------------------------------------

fn clear(settings: &Settings, channels: Vec<Channel>, json: bool) -> anyhow::Result<()> {
    let cache = local_cache_manager(settings);

    let mut removed = Vec::new();
    for channel in channels {
        if cache
            .clear(channel)
            .with_context(|| format!("failed to clear the {channel} cache"))?
        {
            removed.push(channel);
        }
    }

    if json {
        print_json(&serde_json::json!({ "removed": removed }))?;
    } else if removed.is_empty() {
        println!("Nothing to clear.");
    } else {
        for channel in &removed {
            println!("Cleared {channel} cache.");
        }
    }
    Ok(())
}
