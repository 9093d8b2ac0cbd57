//! HTTP and WebSocket server for promptsheet sheets.
//!
//! `promptsheet-web` exposes open sheets over a REST API, pushes cell updates
//! to browsers over a WebSocket, and hosts the `/api/ai-proxy` relay that
//! forwards `{prompt}` bodies to the classification service.
//!
//! # Quick start
//!
//! ```ignore
//! use promptsheet_web::{SheetStore, WebConfig, spawn_web};
//!
//! let config = WebConfig::default();
//! let (ws_tx, _) = config.channel();
//! let addr = spawn_web(SheetStore::new(), ws_tx, config).await?;
//! println!("Sheets: http://{addr}/api/sheets");
//! ```
//!
//! # Architecture
//!
//! ```text
//! REST mutation ──▶ Sheet (Arc<Mutex>) ──▶ sheet_changed ──────────────▶ WebSocket clients
//!                         │                                                   ▲
//!                         └─▶ sweep ──SweepEvent──▶ BroadcastHandler ──WsMessage┘
//!                               │
//!                               └─▶ Completer ──▶ upstream /check-engineer ◀── /api/ai-proxy
//! ```
//!
//! Sweeps of one sheet never overlap: each sheet carries an async lock held
//! for the whole sweep.

mod api;
pub mod broadcast;
mod server;
pub mod snapshot;
pub mod store;
mod ws;

pub use broadcast::{BroadcastHandler, WsMessage};
pub use snapshot::SheetSnapshot;
pub use store::{SheetEntry, SheetStore};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use promptsheet::client::{Completer, HeuristicCompleter, HttpCompleter};
use promptsheet::config::{ClientConfig, DEFAULT_UPSTREAM_URL};
use promptsheet::preset::PresetLibrary;
use tokio::sync::broadcast as channel;
use tracing::info;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// Where sweeps send prompts. Default: `$PROMPTSHEET_ENDPOINT` or the
    /// hosted classifier's `/check-engineer`.
    pub client: ClientConfig,
    /// Base URL of the classification service behind `/api/ai-proxy`.
    /// Default: the hosted service.
    ///
    /// The relay always posts to `<relay_upstream>/check-engineer`, never to
    /// [`client`](Self::client)'s endpoint, which may itself be a relay.
    pub relay_upstream: String,
    /// Answer prompts with the offline keyword heuristic instead of the
    /// network. Default: `false`.
    pub offline: bool,
    /// Presets offered by `/api/templates`. Default: the built-in ones.
    pub presets: PresetLibrary,
    /// Directory of a static front end to serve at `/`.
    ///
    /// If `None`, only API/WS endpoints are served.
    pub static_dir: Option<PathBuf>,
    /// WebSocket broadcast channel capacity. Default: 256.
    ///
    /// Clients that fall behind by this many messages receive fresh
    /// snapshots to resynchronize.
    pub broadcast_capacity: usize,
    /// Sweep a sheet in the background after every mutation. Default: `true`.
    pub auto_sweep: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            client: ClientConfig::from_env(),
            relay_upstream: DEFAULT_UPSTREAM_URL.to_string(),
            offline: false,
            presets: PresetLibrary::builtin(),
            static_dir: None,
            broadcast_capacity: 256,
            auto_sweep: true,
        }
    }
}

impl WebConfig {
    /// A broadcast channel sized by [`broadcast_capacity`](Self::broadcast_capacity).
    pub fn channel(&self) -> (channel::Sender<WsMessage>, channel::Receiver<WsMessage>) {
        channel::channel(self.broadcast_capacity.max(1))
    }
}

/// Spawn the web server on a Tokio task.
///
/// Returns the bound address. The server runs until the Tokio runtime shuts
/// down.
///
/// # Arguments
///
/// * `store` — Open sheets. Sheets inserted later are served too.
/// * `broadcast_tx` — Sender half of the WebSocket broadcast channel.
/// * `config` — Server configuration.
pub async fn spawn_web(
    store: SheetStore,
    broadcast_tx: channel::Sender<WsMessage>,
    config: WebConfig,
) -> std::io::Result<SocketAddr> {
    let (completer, relay): (Arc<dyn Completer>, Arc<dyn Completer>) = if config.offline {
        (Arc::new(HeuristicCompleter), Arc::new(HeuristicCompleter))
    } else {
        let client = HttpCompleter::new(&config.client).map_err(std::io::Error::other)?;
        info!("prompts go to {}", client.endpoint());
        let relay_config = ClientConfig::upstream(&config.relay_upstream)
            .with_timeout(config.client.timeout)
            .with_retry(config.client.retry.clone());
        let relay = HttpCompleter::new(&relay_config).map_err(std::io::Error::other)?;
        info!("relay forwards to {}", relay.endpoint());
        (Arc::new(client), Arc::new(relay))
    };

    let app_state = api::AppState {
        store,
        presets: Arc::new(config.presets),
        completer,
        relay,
        broadcast_tx,
        auto_sweep: config.auto_sweep,
    };
    let router = server::build_router(app_state, config.static_dir);
    server::start_server(router, config.bind_addr).await
}
