//! Sheet server with AI-triggered columns and the `/api/ai-proxy` relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p promptsheet-web
//! cargo run -p promptsheet-web -- --port 8080 --template students
//! cargo run -p promptsheet-web -- --upstream http://127.0.0.1:8000
//! cargo run -p promptsheet-web -- --offline --no-auto-sweep -v
//! ```
//!
//! ## Editing a sheet
//!
//! ```bash
//! curl -X POST localhost:3001/api/sheets -H 'content-type: application/json' \
//!   -d '{"template":"students"}'
//! curl -X PUT localhost:3001/api/sheets/sheet-1/cells -H 'content-type: application/json' \
//!   -d '{"row":1,"column":"Major","value":"Civil Engineering"}'
//! ```
//!
//! Connect to `/ws` to watch cells fill in.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use promptsheet::config::{ClientConfig, DEFAULT_UPSTREAM_URL};
use promptsheet::preset::PresetLibrary;
use promptsheet_web::{SheetStore, WebConfig, spawn_web};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

/// Sheet server with AI-triggered columns.
#[derive(Parser)]
#[command(about = "Spreadsheet server with AI-triggered columns")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Listen on all interfaces instead of loopback.
    #[arg(long)]
    public: bool,

    /// Base URL of the classification service. Sweeps honour
    /// $PROMPTSHEET_ENDPOINT when this is unset; the relay never does.
    #[arg(long, conflicts_with = "offline")]
    upstream: Option<String>,

    /// Answer prompts with the keyword heuristic, without network calls.
    #[arg(long)]
    offline: bool,

    /// Retries for transient upstream failures.
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Open a sheet from this preset at startup.
    #[arg(long)]
    template: Option<String>,

    /// JSON file with extra presets (one object or an array).
    #[arg(long = "preset-file")]
    preset_files: Vec<String>,

    /// Directory of a static front end to serve.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Only sweep on POST /api/sheets/{id}/sweep.
    #[arg(long)]
    no_auto_sweep: bool,

    /// Log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut presets = PresetLibrary::builtin();
    for path in &args.preset_files {
        presets.load_file(path).map_err(|e| e.to_string())?;
    }

    let store = SheetStore::new();
    if let Some(template) = &args.template {
        let sheet = presets.instantiate(template).map_err(|e| e.to_string())?;
        let id = store.insert(sheet);
        info!("opened {template} as {id}");
    }

    let client = match &args.upstream {
        Some(url) => ClientConfig::upstream(url),
        None => ClientConfig::from_env(),
    }
    .with_timeout(Duration::from_secs(args.timeout_secs))
    .with_retries(args.retries);
    let relay_upstream = args
        .upstream
        .clone()
        .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());

    let host = if args.public { [0, 0, 0, 0] } else { [127, 0, 0, 1] };
    let config = WebConfig {
        bind_addr: (host, args.port).into(),
        client,
        relay_upstream,
        offline: args.offline,
        presets,
        static_dir: args.static_dir,
        auto_sweep: !args.no_auto_sweep,
        ..Default::default()
    };
    let (ws_tx, _) = config.channel();
    let addr = spawn_web(store, ws_tx, config)
        .await
        .map_err(|e| format!("failed to start server: {e}"))?;
    println!("Listening on http://{addr}");

    tokio::signal::ctrl_c().await.map_err(|e| e.to_string())?;
    println!("Shutting down");
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level);
    tracing_subscriber::registry().with(layer).init();
}
