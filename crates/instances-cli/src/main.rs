//! # instances
//!
//! Offline inspection and maintenance of the persisted Instances document.

#![deny(unsafe_code)]

mod commands;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use instances_core::logging::{init_json_subscriber, init_subscriber};
use instances_settings::{
    InstancesSettings, SETTINGS_FILE_NAME, load_settings, load_settings_from_path,
};
use instances_store::ConfigStore;
use tracing::debug;

/// Inspect and maintain the Instances rejoin document.
#[derive(Parser, Debug)]
#[command(name = "instances", about = "Inspect and maintain the Instances rejoin document")]
struct Cli {
    /// Directory holding the document (overrides settings).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the whole document.
    Show,
    /// List recent sessions, most recent first.
    History {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Remove a session from history and from the rejoin slot.
    Forget {
        /// Session identifier.
        session_id: String,
    },
    /// Drop history entries beyond the bound.
    Trim {
        /// Bound to apply (defaults to `historyMaxCount`).
        #[arg(long)]
        max: Option<usize>,
    },
    /// Replace the document with an empty one.
    Reset,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.log_json {
        init_json_subscriber(&cli.log_level);
    } else {
        init_subscriber(&cli.log_level);
    }

    let settings = resolve_settings(cli.data_dir.as_deref())?;
    let data_dir = settings.data_dir();
    debug!(data_dir = %data_dir.display(), "using data directory");
    let store = ConfigStore::new(data_dir);

    let mut out = io::stdout().lock();
    match cli.command {
        Command::Show => commands::show(&store, &mut out)?,
        Command::History { json } => commands::history(&store, json, &mut out)?,
        Command::Forget { session_id } => {
            let _ = commands::forget(&store, &session_id, &mut out)?;
        }
        Command::Trim { max } => {
            let max = max.unwrap_or(settings.history_max_count);
            let _ = commands::trim(&store, max, &mut out)?;
        }
        Command::Reset => commands::reset(&store, &mut out)?,
    }
    Ok(())
}

/// Settings for `data_dir`, read from its own `settings.json` when given.
fn resolve_settings(data_dir: Option<&Path>) -> Result<InstancesSettings> {
    let Some(dir) = data_dir else {
        return load_settings().context("failed to load settings");
    };
    let path = dir.join(SETTINGS_FILE_NAME);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    settings.data_dir = dir.display().to_string();
    Ok(settings)
}
