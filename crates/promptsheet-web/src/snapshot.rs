//! Serializable projection of a [`Sheet`] for REST and WebSocket transport.
//!
//! Cells are emitted in column order, and each row lists the AI columns
//! still waiting for a sweep so the browser can show a spinner.

use promptsheet::sheet::{ColumnKind, Sheet};
use serde::Serialize;
use serde_json::{Map, Value};

/// Wire view of one sheet.
#[derive(Debug, Clone, Serialize)]
pub struct SheetSnapshot {
    pub id: String,
    pub name: String,
    /// RFC 3339 creation time.
    pub created_at: String,
    pub columns: Vec<ColumnSnapshot>,
    pub rows: Vec<RowSnapshot>,
}

/// Wire view of a column.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSnapshot {
    pub name: String,
    /// `"regular"` or `"ai-trigger"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Columns the prompt references.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
}

/// Wire view of a row.
#[derive(Debug, Clone, Serialize)]
pub struct RowSnapshot {
    pub cells: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub notes: Map<String, Value>,
    /// AI columns of this row awaiting (re)computation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<String>,
}

impl SheetSnapshot {
    /// Build a snapshot. Call while holding the sheet lock.
    pub fn from_sheet(id: &str, sheet: &Sheet) -> Self {
        let columns = sheet
            .columns()
            .iter()
            .map(|c| match &c.kind {
                ColumnKind::Regular => ColumnSnapshot {
                    name: c.name.clone(),
                    kind: "regular",
                    prompt: None,
                    refs: Vec::new(),
                },
                ColumnKind::AiTrigger { prompt } => ColumnSnapshot {
                    name: c.name.clone(),
                    kind: "ai-trigger",
                    prompt: Some(prompt.source().to_string()),
                    refs: prompt.refs().to_vec(),
                },
            })
            .collect();

        let rows = sheet
            .rows()
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let mut cells = Map::new();
                let mut notes = Map::new();
                let mut pending = Vec::new();
                for column in sheet.columns() {
                    let value = row.get(&column.name).unwrap_or_default();
                    cells.insert(column.name.clone(), Value::String(value.to_string()));
                    if let Some(note) = row.note(&column.name) {
                        notes.insert(column.name.clone(), Value::String(note.to_string()));
                    }
                    if sheet.is_pending(idx, &column.name) {
                        pending.push(column.name.clone());
                    }
                }
                RowSnapshot {
                    cells,
                    notes,
                    pending,
                }
            })
            .collect();

        Self {
            id: id.to_string(),
            name: sheet.name().to_string(),
            created_at: sheet.created_at().to_rfc3339(),
            columns,
            rows,
        }
    }

    /// The snapshot as a JSON value (for embedding in a [`WsMessage`](crate::WsMessage)).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptsheet::preset::PresetLibrary;

    #[test]
    fn students_snapshot_shape() {
        let sheet = PresetLibrary::builtin().instantiate("students").unwrap();
        let json = SheetSnapshot::from_sheet("sheet-1", &sheet).to_value();

        assert_eq!(json["id"], "sheet-1");
        assert_eq!(json["name"], "Students");
        assert_eq!(json["columns"][2], serde_json::json!({"name": "Major", "type": "regular"}));
        assert_eq!(json["columns"][3]["type"], "ai-trigger");
        assert_eq!(json["columns"][3]["refs"], serde_json::json!(["Major"]));
        assert_eq!(json["rows"].as_array().unwrap().len(), 3);
        assert_eq!(json["rows"][1]["cells"]["Major"], "Biology");
        assert_eq!(json["rows"][1]["pending"], serde_json::json!(["isEngineer"]));
        assert!(json["rows"][1].get("notes").is_none());
    }
}
