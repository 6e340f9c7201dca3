use crate::output::print_json;
use crate::settings::Settings;
use anyhow::Context;
use clap::Subcommand;
use frk_core::config::{Config, WarnLevel};
use frk_core::paths;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(settings: &Settings, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Init { force } => init(settings.config_path.as_deref(), force, json),
        ConfigSubcommand::Validate => validate(settings, json),
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

pub fn init(explicit: Option<&Path>, force: bool, json: bool) -> anyhow::Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => paths::default_config_path()?,
    };
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    Config::default()
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    if json {
        print_json(&serde_json::json!({ "config": path }))?;
    } else {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let warnings = settings.config.validate();

    if json {
        let value = serde_json::json!({
            "config": settings.config_path,
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        match &settings.config_path {
            Some(path) => println!("Config {} is valid. No warnings.", path.display()),
            None => println!("No config file found; using defaults."),
        }
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
