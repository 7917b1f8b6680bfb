//! Backscroll replay binary.
//!
//! # Usage
//!
//! ```bash
//! # Render a room export with keys from a key file
//! backscroll room.json --sessions keys.json
//!
//! # Keep imported keys in a durable store, fetch at most three pages
//! backscroll room.json --sessions keys.json --db sessions.redb --pages 3
//!
//! # Show the stored JSON of one event
//! backscroll room.json --raw '$event:example.org'
//! ```

use std::{
    io::{self, Write},
    path::PathBuf,
};

use backscroll_cli::{CliError, RoomExport, render_timeline, replay};
use backscroll_store::{MemorySessionStore, RedbSessionStore, SessionKeyStore, import_session_keys};
use backscroll_timeline::TimelineConfig;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Backscroll room replay
#[derive(Parser, Debug)]
#[command(name = "backscroll")]
#[command(about = "Replay an exported room through the timeline and print its rows")]
#[command(version)]
struct Args {
    /// Room export (JSON)
    export: PathBuf,

    /// Session key file to import before rendering
    #[arg(short, long)]
    sessions: Option<PathBuf>,

    /// Durable session store (in-memory if omitted)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Maximum history pages to fetch (until exhausted if omitted)
    #[arg(long)]
    pages: Option<usize>,

    /// UTC offset in seconds used for day grouping
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    utc_offset: i32,

    /// Cache decryption results per event
    #[arg(long)]
    memoize: bool,

    /// Print the stored JSON of this event instead of the rows
    #[arg(long)]
    raw: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let export = RoomExport::load(&args.export)?;
    tracing::info!(room_id = %export.room_id, "loaded room export");

    match &args.db {
        Some(path) => run(&args, &export, RedbSessionStore::open(path)?).await?,
        None => run(&args, &export, MemorySessionStore::new()).await?,
    }

    Ok(())
}

async fn run<S: SessionKeyStore>(
    args: &Args,
    export: &RoomExport,
    sessions: S,
) -> Result<(), CliError> {
    if let Some(path) = &args.sessions {
        let json = std::fs::read_to_string(path)
            .map_err(|source| CliError::Read { path: path.display().to_string(), source })?;
        let imported = import_session_keys(&sessions, &json)?;
        tracing::info!(imported, "session keys loaded");
    }

    let config = TimelineConfig {
        utc_offset_secs: args.utc_offset,
        memoize_decryption: args.memoize,
        ..TimelineConfig::default()
    };
    let offset = config.utc_offset();
    let outcome = replay(export, sessions, config, args.pages).await?;

    let mut out = io::stdout().lock();
    if let Some(event_id) = &args.raw {
        match outcome.timeline.raw_event(event_id) {
            Ok(raw) => writeln!(out, "{raw}")?,
            Err(error) => tracing::error!(%error, "cannot show raw event"),
        }
        return Ok(());
    }

    let today = Utc::now().with_timezone(&offset).date_naive();
    let rendered = render_timeline(&outcome.timeline, offset, today);
    if !rendered.is_empty() {
        writeln!(out, "{rendered}")?;
    }
    Ok(())
}
