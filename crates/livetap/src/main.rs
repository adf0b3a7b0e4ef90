//! # livetap
//!
//! Single binary for every livetap process:
//!
//! - `serve`: HTTP/WebSocket API, collector supervision, live relay bridge
//! - `collect`: one collector for one session (launched by `serve`)
//! - `archive`: one batch archival run for one session (launched by `serve`)

#![deny(unsafe_code)]

mod archive;
mod collect;
mod serve;
mod signals;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use livetap_collector::{EventCatalog, SourceConfig};
use livetap_core::{RoomId, SessionId};
use livetap_settings::{CollectorSettings, LivetapSettings, LoggingSettings, SourceSettings};

/// Live broadcast event collection, fan-out, and archival.
#[derive(Parser, Debug)]
#[command(name = "livetap", version, about)]
struct Cli {
    /// Settings file (defaults to `~/.livetap/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the API server.
    Serve,
    /// Collect events for one session until stopped or the broadcast ends.
    Collect(SessionArgs),
    /// Archive one session's buffered events.
    Archive(SessionArgs),
}

/// Target session of a `collect` or `archive` run.
#[derive(Args, Debug, Clone)]
struct SessionArgs {
    /// Platform room id.
    #[arg(long)]
    room_id: String,

    /// Session id issued by `serve`.
    #[arg(long)]
    session_id: String,
}

impl SessionArgs {
    fn ids(&self) -> (RoomId, SessionId) {
        (
            RoomId::from(self.room_id.as_str()),
            SessionId::from(self.session_id.as_str()),
        )
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<LivetapSettings> {
    match path {
        Some(p) => livetap_settings::load_settings_from_path(p)
            .with_context(|| format!("failed to load settings from {}", p.display())),
        None => livetap_settings::load_settings().context("failed to load settings"),
    }
}

fn init_logging(logging: &LoggingSettings) {
    if logging.json {
        livetap_core::logging::init_json_subscriber(&logging.level);
    } else {
        livetap_core::logging::init_subscriber(&logging.level);
    }
}

fn source_config(source: &SourceSettings) -> SourceConfig {
    SourceConfig {
        ws_url_template: source.ws_url_template.clone(),
        api_base_url: source.api_base_url.clone(),
        request_timeout: Duration::from_millis(source.request_timeout_ms),
    }
}

fn event_catalog(collector: &CollectorSettings) -> EventCatalog {
    EventCatalog::with_extra(collector.extra_event_kinds.iter().cloned())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.settings.as_ref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("livetap: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings.logging);

    let result = match &cli.command {
        Command::Serve => serve::run(settings, cli.settings.clone())
            .await
            .map(|()| ExitCode::SUCCESS),
        Command::Collect(args) => collect::run(&settings, args).await,
        Command::Archive(args) => archive::run(&settings, args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "livetap exited with error");
            ExitCode::FAILURE
        }
    }
}
