//! REST API endpoint handlers.
//!
//! Every mutation answers with the sheet's fresh [`SheetSnapshot`] and
//! broadcasts it as `sheet_changed`. With auto-sweep on, mutations also
//! schedule a sweep in the background; `POST /api/sheets/{id}/sweep` runs one
//! and waits for its report.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use promptsheet::client::{Completer, CompletionError};
use promptsheet::events::{CompositeEventHandler, LoggingHandler};
use promptsheet::preset::{PresetError, PresetLibrary};
use promptsheet::sheet::{self, Sheet, SheetError};
use promptsheet::sweep::{SweepReport, sweep};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::broadcast::{BroadcastHandler, WsMessage};
use crate::snapshot::SheetSnapshot;
use crate::store::{SheetEntry, SheetStore};

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: SheetStore,
    pub presets: Arc<PresetLibrary>,
    /// Answers prompts during sweeps.
    pub completer: Arc<dyn Completer>,
    /// Answers `/api/ai-proxy` requests.
    pub relay: Arc<dyn Completer>,
    pub broadcast_tx: broadcast::Sender<WsMessage>,
    pub auto_sweep: bool,
}

/// Handler errors, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    /// 404: no sheet with this id.
    NotFound(String),
    /// 422: bad row, column or template.
    Invalid(String),
    /// 502: the upstream model service failed.
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("no sheet with id {id:?}")),
            ApiError::Invalid(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<SheetError> for ApiError {
    fn from(e: SheetError) -> Self {
        ApiError::Invalid(e.to_string())
    }
}

impl From<PresetError> for ApiError {
    fn from(e: PresetError) -> Self {
        ApiError::Invalid(e.to_string())
    }
}

impl From<CompletionError> for ApiError {
    fn from(e: CompletionError) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn entry(app: &AppState, id: &str) -> ApiResult<SheetEntry> {
    app.store
        .get(id)
        .ok_or_else(|| ApiError::NotFound(id.to_string()))
}

fn snapshot(id: &str, entry: &SheetEntry) -> SheetSnapshot {
    let sheet = sheet::lock(&entry.sheet);
    SheetSnapshot::from_sheet(id, &sheet)
}

/// Apply `change` to a sheet, broadcast the result and maybe schedule a sweep.
fn mutate<F>(app: &AppState, id: &str, change: F) -> ApiResult<Json<SheetSnapshot>>
where
    F: FnOnce(&mut Sheet) -> Result<(), SheetError>,
{
    let entry = entry(app, id)?;
    let (snap, pending) = {
        let mut sheet = sheet::lock(&entry.sheet);
        change(&mut sheet)?;
        let pending = !sheet.pending_jobs().is_empty();
        (SheetSnapshot::from_sheet(id, &sheet), pending)
    };
    let _ = app.broadcast_tx.send(WsMessage::SheetChanged {
        sheet: id.to_string(),
        data: snap.to_value(),
    });
    if app.auto_sweep && pending {
        spawn_sweep(app.clone(), id.to_string(), entry);
    }
    Ok(Json(snap))
}

/// Run one sweep on a sheet, waiting for any sweep already in progress.
pub async fn run_sweep(app: &AppState, id: &str, entry: &SheetEntry) -> SweepReport {
    let _guard = entry.sweep_lock.lock().await;
    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(BroadcastHandler::new(app.broadcast_tx.clone(), id));
    let report = sweep(&entry.sheet, app.completer.as_ref(), &handler).await;
    if report.attempted > 0 {
        let data = snapshot(id, entry).to_value();
        let _ = app.broadcast_tx.send(WsMessage::SheetChanged {
            sheet: id.to_string(),
            data,
        });
    }
    report
}

fn spawn_sweep(app: AppState, id: String, entry: SheetEntry) {
    tokio::spawn(async move {
        let report = run_sweep(&app, &id, &entry).await;
        debug!(sheet = %id, updated = report.updated, "background sweep done");
    });
}

// ── Templates ──────────────────────────────────────────────────────

/// Preset summary returned by GET /api/templates.
#[derive(Serialize)]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// GET /api/templates — Available presets.
pub async fn list_templates(State(app): State<AppState>) -> Json<Vec<TemplateInfo>> {
    let templates = app
        .presets
        .list()
        .iter()
        .map(|p| TemplateInfo {
            id: p.id.clone(),
            name: p.name.clone(),
            description: p.description.clone(),
        })
        .collect();
    Json(templates)
}

// ── Sheets ─────────────────────────────────────────────────────────

/// GET /api/sheets — Ids of every open sheet.
pub async fn list_sheets(State(app): State<AppState>) -> Json<Vec<String>> {
    Json(app.store.ids())
}

/// Request body for POST /api/sheets.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CreateSheetRequest {
    /// Preset id. Default: `blank`.
    pub template: Option<String>,
    /// Overrides the preset's name.
    pub name: Option<String>,
}

/// POST /api/sheets — Create a sheet from a preset.
///
/// Returns 201 with the snapshot, 422 for an unknown template.
pub async fn create_sheet(
    State(app): State<AppState>,
    Json(body): Json<CreateSheetRequest>,
) -> ApiResult<(StatusCode, Json<SheetSnapshot>)> {
    let template = body.template.as_deref().unwrap_or("blank");
    let mut sheet = app.presets.instantiate(template)?;
    if let Some(name) = body.name {
        sheet.rename(name);
    }
    let pending = !sheet.pending_jobs().is_empty();
    let id = app.store.insert(sheet);
    let entry = entry(&app, &id)?;
    let snap = snapshot(&id, &entry);
    debug!(sheet = %id, template, "sheet created");

    let _ = app.broadcast_tx.send(WsMessage::SheetChanged {
        sheet: id.clone(),
        data: snap.to_value(),
    });
    if app.auto_sweep && pending {
        spawn_sweep(app.clone(), id, entry);
    }
    Ok((StatusCode::CREATED, Json(snap)))
}

/// GET /api/sheets/{id} — Sheet snapshot.
pub async fn get_sheet(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SheetSnapshot>> {
    let entry = entry(&app, &id)?;
    Ok(Json(snapshot(&id, &entry)))
}

/// Request body for the rename endpoints.
#[derive(Deserialize)]
pub struct NameRequest {
    pub name: String,
}

/// PUT /api/sheets/{id}/name — Rename a sheet. Blank names reset to the default.
pub async fn rename_sheet(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NameRequest>,
) -> ApiResult<Json<SheetSnapshot>> {
    mutate(&app, &id, |sheet| {
        sheet.rename(body.name);
        Ok(())
    })
}

/// POST /api/sheets/{id}/rows — Append an empty row.
pub async fn add_row(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SheetSnapshot>> {
    mutate(&app, &id, |sheet| {
        sheet.add_row();
        Ok(())
    })
}

/// POST /api/sheets/{id}/columns — Append a regular column named `Column N`.
pub async fn add_column(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SheetSnapshot>> {
    mutate(&app, &id, |sheet| {
        sheet.add_column();
        Ok(())
    })
}

/// Request body for PUT /api/sheets/{id}/cells.
#[derive(Deserialize)]
pub struct CellRequest {
    pub row: usize,
    pub column: String,
    pub value: String,
}

/// PUT /api/sheets/{id}/cells — Edit one cell.
pub async fn update_cell(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CellRequest>,
) -> ApiResult<Json<SheetSnapshot>> {
    mutate(&app, &id, |sheet| {
        sheet.update_cell(body.row, &body.column, body.value)?;
        Ok(())
    })
}

// ── Columns ────────────────────────────────────────────────────────

/// PUT /api/sheets/{id}/columns/{column}/name — Rename a column.
pub async fn rename_column(
    State(app): State<AppState>,
    Path((id, column)): Path<(String, String)>,
    Json(body): Json<NameRequest>,
) -> ApiResult<Json<SheetSnapshot>> {
    mutate(&app, &id, |sheet| {
        sheet.rename_column(&column, &body.name)?;
        Ok(())
    })
}

/// Request body for PUT /api/sheets/{id}/columns/{column}/prompt.
#[derive(Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

/// PUT /api/sheets/{id}/columns/{column}/prompt — Make a column AI-triggered.
pub async fn set_prompt(
    State(app): State<AppState>,
    Path((id, column)): Path<(String, String)>,
    Json(body): Json<PromptRequest>,
) -> ApiResult<Json<SheetSnapshot>> {
    mutate(&app, &id, |sheet| sheet.set_prompt(&column, &body.prompt))
}

/// DELETE /api/sheets/{id}/columns/{column}/prompt — Make a column regular.
pub async fn clear_prompt(
    State(app): State<AppState>,
    Path((id, column)): Path<(String, String)>,
) -> ApiResult<Json<SheetSnapshot>> {
    mutate(&app, &id, |sheet| sheet.make_regular(&column))
}

/// Request body for PUT /api/sheets/{id}/columns/{column}/values.
#[derive(Deserialize)]
pub struct ValueRequest {
    pub value: String,
}

/// PUT /api/sheets/{id}/columns/{column}/values — Apply one value to every row.
pub async fn apply_to_all(
    State(app): State<AppState>,
    Path((id, column)): Path<(String, String)>,
    Json(body): Json<ValueRequest>,
) -> ApiResult<Json<SheetSnapshot>> {
    mutate(&app, &id, |sheet| sheet.apply_to_all(&column, &body.value))
}

// ── Sweeps ─────────────────────────────────────────────────────────

/// Request body for POST /api/sheets/{id}/trigger.
#[derive(Deserialize)]
pub struct TriggerRequest {
    pub row: usize,
    pub column: String,
}

/// POST /api/sheets/{id}/trigger — Force one AI cell to recompute.
pub async fn trigger_cell(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TriggerRequest>,
) -> ApiResult<Json<SheetSnapshot>> {
    mutate(&app, &id, |sheet| sheet.trigger(body.row, &body.column))
}

/// POST /api/sheets/{id}/sweep — Run a sweep now and return its report.
pub async fn post_sweep(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SweepReport>> {
    let entry = entry(&app, &id)?;
    Ok(Json(run_sweep(&app, &id, &entry).await))
}

// ── Relay ──────────────────────────────────────────────────────────

/// Request body for POST /api/ai-proxy.
#[derive(Deserialize)]
pub struct ProxyRequest {
    pub prompt: String,
}

/// POST /api/ai-proxy — Forward `{prompt}` to the classification service.
///
/// Returns the upstream JSON unchanged, or 502 when the upstream fails.
pub async fn ai_proxy(
    State(app): State<AppState>,
    Json(body): Json<ProxyRequest>,
) -> ApiResult<Json<Value>> {
    match app.relay.complete(&body.prompt).await {
        Ok(value) => Ok(Json(value)),
        Err(e) => {
            warn!("relay request failed: {e}");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_fields_are_optional() {
        let req: CreateSheetRequest = serde_json::from_str("{}").unwrap();
        assert!(req.template.is_none() && req.name.is_none());
        let req: CreateSheetRequest =
            serde_json::from_str(r#"{"template":"students"}"#).unwrap();
        assert_eq!(req.template.as_deref(), Some("students"));
    }

    #[test]
    fn sheet_errors_map_to_422() {
        let resp = ApiError::from(SheetError::RowOutOfRange(9)).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let resp = ApiError::NotFound("x".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = ApiError::from(CompletionError::Transport("refused".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
