//! [`EventHandler`] that converts sweep events into WebSocket messages.
//!
//! [`BroadcastHandler`] turns [`SweepEvent`]s of one sheet into [`WsMessage`]
//! values and pushes them to every connected client through a
//! `tokio::sync::broadcast` channel.

use promptsheet::events::{EventHandler, SweepEvent};
use promptsheet::sweep::SweepReport;
use serde::Serialize;
use tokio::sync::broadcast;

/// A message sent from the server to WebSocket clients.
///
/// Discriminated on the `type` field when serialized to JSON.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Ids of every open sheet (sent on connect and after a lag).
    Hello { sheets: Vec<String> },
    /// A sheet's structure or values changed; `data` is the full snapshot.
    SheetChanged { sheet: String, data: serde_json::Value },
    /// A sweep started on a sheet.
    SweepStarted { sheet: String, pending: usize },
    /// An AI cell received a new value.
    CellUpdated {
        sheet: String,
        row: usize,
        column: String,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    /// An AI call failed; the cell kept its value.
    CellFailed {
        sheet: String,
        row: usize,
        column: String,
        error: String,
    },
    /// A sweep finished.
    SweepFinished { sheet: String, report: SweepReport },
}

/// Broadcasts the sweep events of one sheet to WebSocket clients.
///
/// Compose alongside [`LoggingHandler`](promptsheet::events::LoggingHandler):
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(BroadcastHandler::new(ws_tx.clone(), "sheet-1"));
/// ```
pub struct BroadcastHandler {
    sender: broadcast::Sender<WsMessage>,
    sheet: String,
}

impl BroadcastHandler {
    pub fn new(sender: broadcast::Sender<WsMessage>, sheet: impl Into<String>) -> Self {
        Self {
            sender,
            sheet: sheet.into(),
        }
    }

    /// Silently ignores send errors (no subscribers is fine).
    fn broadcast(&self, msg: WsMessage) {
        let _ = self.sender.send(msg);
    }
}

impl EventHandler for BroadcastHandler {
    fn on_event(&self, event: &SweepEvent<'_>) {
        let sheet = self.sheet.clone();
        match event {
            SweepEvent::Started { pending } => {
                self.broadcast(WsMessage::SweepStarted {
                    sheet,
                    pending: *pending,
                });
            }
            SweepEvent::CellUpdated {
                row,
                column,
                value,
                note,
            } => {
                self.broadcast(WsMessage::CellUpdated {
                    sheet,
                    row: *row,
                    column: column.to_string(),
                    value: value.to_string(),
                    note: note.map(str::to_string),
                });
            }
            SweepEvent::CellFailed { row, column, error } => {
                self.broadcast(WsMessage::CellFailed {
                    sheet,
                    row: *row,
                    column: column.to_string(),
                    error: error.to_string(),
                });
            }
            SweepEvent::Finished { report } => {
                self.broadcast(WsMessage::SweepFinished {
                    sheet,
                    report: (*report).clone(),
                });
            }
            // The final sheet_changed snapshot covers requests and dropped results.
            SweepEvent::CellRequested { .. } | SweepEvent::CellStale { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_tagged_snake_case() {
        let msg = WsMessage::CellUpdated {
            sheet: "sheet-1".into(),
            row: 2,
            column: "isEngineer".into(),
            value: "Yes".into(),
            note: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "cell_updated");
        assert_eq!(json["row"], 2);
        assert!(json.get("note").is_none());
    }

    #[test]
    fn handler_forwards_sweep_events() {
        let (tx, mut rx) = broadcast::channel(8);
        let handler = BroadcastHandler::new(tx, "sheet-7");

        handler.on_event(&SweepEvent::Started { pending: 2 });
        handler.on_event(&SweepEvent::CellRequested {
            row: 0,
            column: "A",
            prompt: "p",
        });
        handler.on_event(&SweepEvent::CellFailed {
            row: 0,
            column: "A",
            error: "HTTP 500: boom",
        });

        assert!(matches!(
            rx.try_recv().unwrap(),
            WsMessage::SweepStarted { pending: 2, ref sheet } if sheet == "sheet-7"
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            WsMessage::CellFailed { row: 0, ref error, .. } if error.contains("500")
        ));
        assert!(rx.try_recv().is_err());
    }
}
