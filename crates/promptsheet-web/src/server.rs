//! Axum server setup and router construction.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::error;

use crate::api::{self, AppState};
use crate::ws::{self, WsState};

/// Build the full axum router.
///
/// The router serves:
/// - WebSocket at `/ws`
/// - REST API at `/api/*`, including the `/api/ai-proxy` relay
/// - Optional static files for a browser front end
pub fn build_router(app_state: AppState, static_dir: Option<PathBuf>) -> Router {
    let ws_state = WsState {
        store: app_state.store.clone(),
        broadcast_tx: app_state.broadcast_tx.clone(),
    };

    // The front end may run on its own dev server.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .with_state(ws_state);

    let api_routes = Router::new()
        .route("/api/ai-proxy", post(api::ai_proxy))
        .route("/api/templates", get(api::list_templates))
        .route("/api/sheets", get(api::list_sheets).post(api::create_sheet))
        .route("/api/sheets/{id}", get(api::get_sheet))
        .route("/api/sheets/{id}/name", put(api::rename_sheet))
        .route("/api/sheets/{id}/rows", post(api::add_row))
        .route("/api/sheets/{id}/columns", post(api::add_column))
        .route("/api/sheets/{id}/cells", put(api::update_cell))
        .route(
            "/api/sheets/{id}/columns/{column}/name",
            put(api::rename_column),
        )
        .route(
            "/api/sheets/{id}/columns/{column}/prompt",
            put(api::set_prompt).delete(api::clear_prompt),
        )
        .route(
            "/api/sheets/{id}/columns/{column}/values",
            put(api::apply_to_all),
        )
        .route("/api/sheets/{id}/trigger", post(api::trigger_cell))
        .route("/api/sheets/{id}/sweep", post(api::post_sweep))
        .with_state(app_state);

    let mut router = Router::new().merge(ws_routes).merge(api_routes).layer(cors);

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
}

/// Bind `bind_addr`, serve `router` on a Tokio task and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("server stopped: {e}");
        }
    });

    Ok(addr)
}
