//! WebSocket upgrade handler.
//!
//! Each connected client receives:
//! 1. A `hello` message listing open sheets, then a `sheet_changed`
//!    snapshot per sheet.
//! 2. Incremental [`WsMessage`] updates as sheets change and sweeps run.
//!
//! Clients may send `{"type":"subscribe","sheet":"sheet-1"}` to get a fresh
//! snapshot of one sheet. Everything else is ignored.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt, stream::SplitSink};
use promptsheet::sheet;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::broadcast::WsMessage;
use crate::snapshot::SheetSnapshot;
use crate::store::SheetStore;

/// Shared state for WebSocket handlers.
#[derive(Clone)]
pub struct WsState {
    pub store: SheetStore,
    pub broadcast_tx: broadcast::Sender<WsMessage>,
}

/// GET /ws — WebSocket upgrade handler.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(ws_state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ws_state))
}

/// Hello plus one snapshot per open sheet.
fn full_state(store: &SheetStore) -> Vec<WsMessage> {
    let ids = store.ids();
    let mut messages = vec![WsMessage::Hello {
        sheets: ids.clone(),
    }];
    messages.extend(ids.iter().filter_map(|id| sheet_changed(store, id)));
    messages
}

fn sheet_changed(store: &SheetStore, id: &str) -> Option<WsMessage> {
    let entry = store.get(id)?;
    let data = {
        let sheet = sheet::lock(&entry.sheet);
        SheetSnapshot::from_sheet(id, &sheet).to_value()
    };
    Some(WsMessage::SheetChanged {
        sheet: id.to_string(),
        data,
    })
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, ws_state: WsState) {
    let (mut sink, mut stream) = socket.split();

    // Subscribe before the initial state so no change slips in between.
    let mut broadcast_rx = ws_state.broadcast_tx.subscribe();

    for msg in full_state(&ws_state.store) {
        if ws_send(&mut sink, &msg).await.is_err() {
            return;
        }
    }

    debug!("WebSocket client connected");

    // Replies to this client only (subscribe requests).
    let (reply_tx, mut reply_rx) = mpsc::channel::<WsMessage>(16);

    let store_for_resync = ws_state.store.clone();
    let forward_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                msg = broadcast_rx.recv() => msg,
                Some(reply) = reply_rx.recv() => Ok(reply),
            };
            match msg {
                Ok(msg) => {
                    if ws_send(&mut sink, &msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged by {n} messages, resending state");
                    for msg in full_state(&store_for_resync) {
                        if ws_send(&mut sink, &msg).await.is_err() {
                            return;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                if let Some(reply) = handle_client_message(&text, &ws_state.store) {
                    let _ = reply_tx.send(reply).await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    debug!("WebSocket client disconnected");
    forward_task.abort();
}

/// Process a JSON message received from a client.
fn handle_client_message(text: &str, store: &SheetStore) -> Option<WsMessage> {
    #[derive(serde::Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum ClientMessage {
        Subscribe { sheet: String },
    }

    let Ok(msg) = serde_json::from_str::<ClientMessage>(text) else {
        debug!("Ignoring malformed WebSocket message");
        return None;
    };
    match msg {
        ClientMessage::Subscribe { sheet } => sheet_changed(store, &sheet),
    }
}

/// Serialize a `WsMessage` and send it over the WebSocket sink.
async fn ws_send(sink: &mut SplitSink<WebSocket, Message>, msg: &WsMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).unwrap_or_default();
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptsheet::preset::PresetLibrary;

    #[test]
    fn full_state_lists_every_sheet() {
        let store = SheetStore::new();
        store.insert(PresetLibrary::builtin().instantiate("students").unwrap());
        store.insert(promptsheet::sheet::Sheet::default());

        let msgs = full_state(&store);
        assert_eq!(msgs.len(), 3);
        assert!(matches!(&msgs[0], WsMessage::Hello { sheets } if sheets.len() == 2));
        assert!(matches!(&msgs[1], WsMessage::SheetChanged { sheet, .. } if sheet == "sheet-1"));
    }

    #[test]
    fn subscribe_returns_snapshot() {
        let store = SheetStore::new();
        let id = store.insert(promptsheet::sheet::Sheet::new("Mine"));
        let reply = handle_client_message(&format!(r#"{{"type":"subscribe","sheet":"{id}"}}"#), &store);
        match reply {
            Some(WsMessage::SheetChanged { data, .. }) => assert_eq!(data["name"], "Mine"),
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(handle_client_message("garbage", &store).is_none());
        assert!(handle_client_message(r#"{"type":"subscribe","sheet":"nope"}"#, &store).is_none());
    }
}
