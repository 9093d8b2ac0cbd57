//! The in-memory grid: columns, rows and per-row processed markers.
//!
//! A [`Sheet`] owns an ordered list of [`Column`]s and an ordered list of
//! [`Row`]s. Each row maps column name to string value and additionally
//! remembers, per AI-trigger column, the fingerprint of the inputs that
//! produced the cell's current value. A cell is *pending* when that
//! fingerprint is missing or no longer matches the row's current inputs.
//!
//! The fingerprint covers the prompt source and the values of every column
//! the prompt references, so:
//!
//! - editing a referenced cell makes exactly that row pending,
//! - editing an unreferenced cell changes nothing,
//! - changing a column's prompt makes every row of that column pending.
//!
//! Explicit clearing on edit ([`Sheet::update_cell`]) and on manual trigger
//! ([`Sheet::trigger`]) is layered on top of the fingerprint check.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::template::PromptTemplate;

/// Name given to new sheets and to sheets renamed to a blank string.
pub const DEFAULT_SHEET_NAME: &str = "New Spreadsheet";

/// A sheet shared between request handlers and a running sweep.
pub type SharedSheet = Arc<Mutex<Sheet>>;

/// Lock a shared sheet, recovering the data if a holder panicked.
pub fn lock(sheet: &Mutex<Sheet>) -> MutexGuard<'_, Sheet> {
    sheet.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Errors returned by sheet mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SheetError {
    #[error("row {0} does not exist")]
    RowOutOfRange(usize),
    #[error("column {0:?} does not exist")]
    UnknownColumn(String),
    #[error("column {0:?} already exists")]
    DuplicateColumn(String),
    #[error("column {0:?} is not an AI-trigger column")]
    NotAiTrigger(String),
}

// ── Columns ────────────────────────────────────────────────────────

/// How a column's values are produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ColumnKind {
    /// Values are typed in directly.
    Regular,
    /// Values come from the model, prompted once per row.
    AiTrigger {
        #[serde(default)]
        prompt: PromptTemplate,
    },
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(flatten)]
    pub kind: ColumnKind,
}

impl Column {
    pub fn regular(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Regular,
        }
    }

    pub fn ai_trigger(name: impl Into<String>, prompt: impl Into<PromptTemplate>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::AiTrigger {
                prompt: prompt.into(),
            },
        }
    }

    /// The column's prompt, if it is an AI-trigger column.
    pub fn prompt(&self) -> Option<&PromptTemplate> {
        match &self.kind {
            ColumnKind::AiTrigger { prompt } => Some(prompt),
            ColumnKind::Regular => None,
        }
    }

    pub fn is_ai_trigger(&self) -> bool {
        matches!(self.kind, ColumnKind::AiTrigger { .. })
    }
}

// ── Rows ───────────────────────────────────────────────────────────

/// One row of the grid.
#[derive(Debug, Clone, Default)]
pub struct Row {
    cells: HashMap<String, String>,
    /// AI column name → fingerprint of the inputs behind the current value.
    processed: HashMap<String, u64>,
    /// AI column name → reasoning returned alongside the value.
    notes: HashMap<String, String>,
}

impl Row {
    /// The value of `column`, if the row has one.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    /// All cells of the row.
    pub fn cells(&self) -> &HashMap<String, String> {
        &self.cells
    }

    /// The model's reasoning for an AI cell, if one was returned.
    pub fn note(&self, column: &str) -> Option<&str> {
        self.notes.get(column).map(String::as_str)
    }
}

/// A unit of AI work: one AI-trigger cell whose inputs have changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingJob {
    pub row: usize,
    pub column: String,
    /// The rendered prompt.
    pub prompt: String,
    /// Fingerprint of the inputs the prompt was rendered from.
    pub fingerprint: u64,
}

/// What happened when a model result was merged back into the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The cell was overwritten and marked processed.
    Applied,
    /// The row's inputs changed while the call was in flight; the result was dropped.
    Stale,
}

// ── Sheet ──────────────────────────────────────────────────────────

/// An in-memory spreadsheet.
#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    columns: Vec<Column>,
    rows: Vec<Row>,
    created_at: DateTime<Local>,
}

impl Default for Sheet {
    fn default() -> Self {
        Self::new(DEFAULT_SHEET_NAME)
    }
}

impl Sheet {
    /// Create an empty sheet. A blank name falls back to [`DEFAULT_SHEET_NAME`].
    pub fn new(name: impl Into<String>) -> Self {
        let mut sheet = Self {
            name: String::new(),
            columns: Vec::new(),
            rows: Vec::new(),
            created_at: Local::now(),
        };
        sheet.rename(name);
        sheet
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the sheet; blank names reset to the default.
    pub fn rename(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.name = if name.trim().is_empty() {
            DEFAULT_SHEET_NAME.to_string()
        } else {
            name
        };
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// The value at (`row`, `column`), if both exist.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// AI-trigger columns in display order.
    pub fn ai_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_ai_trigger())
    }

    // ── Structure ──────────────────────────────────────────────────

    /// Append an existing column definition. Every row gets an empty value.
    pub fn push_column(&mut self, column: Column) -> Result<(), SheetError> {
        if self.column(&column.name).is_some() {
            return Err(SheetError::DuplicateColumn(column.name));
        }
        for row in &mut self.rows {
            row.cells.entry(column.name.clone()).or_default();
        }
        self.columns.push(column);
        Ok(())
    }

    /// Append a regular column named `Column N` and return its name.
    ///
    /// `N` starts at the column count plus one and skips names already taken.
    pub fn add_column(&mut self) -> String {
        let mut n = self.columns.len() + 1;
        let name = loop {
            let candidate = format!("Column {n}");
            if self.column(&candidate).is_none() {
                break candidate;
            }
            n += 1;
        };
        self.columns.push(Column::regular(name.clone()));
        for row in &mut self.rows {
            row.cells.insert(name.clone(), String::new());
        }
        name
    }

    /// Append a row with an empty value in every column. Returns its index.
    pub fn add_row(&mut self) -> usize {
        self.push_row(HashMap::new())
    }

    /// Append a row from the given values; missing columns become empty and
    /// values for unknown columns are dropped.
    pub fn push_row(&mut self, mut values: HashMap<String, String>) -> usize {
        let cells = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), values.remove(&c.name).unwrap_or_default()))
            .collect();
        self.rows.push(Row {
            cells,
            ..Default::default()
        });
        self.rows.len() - 1
    }

    /// Rename a column. Blank or unchanged names are ignored (`Ok(false)`).
    ///
    /// Row values move with the column. Prompts that mention the old name
    /// are left as written.
    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<bool, SheetError> {
        let new = new.trim();
        let idx = self.column_index(old)?;
        if new.is_empty() || new == old {
            return Ok(false);
        }
        if self.column(new).is_some() {
            return Err(SheetError::DuplicateColumn(new.to_string()));
        }
        self.columns[idx].name = new.to_string();
        for row in &mut self.rows {
            if let Some(value) = row.cells.remove(old) {
                row.cells.insert(new.to_string(), value);
            }
            if let Some(fp) = row.processed.remove(old) {
                row.processed.insert(new.to_string(), fp);
            }
            if let Some(note) = row.notes.remove(old) {
                row.notes.insert(new.to_string(), note);
            }
        }
        Ok(true)
    }

    /// Turn `column` into an AI-trigger column with the given prompt.
    ///
    /// Existing values stay as they are until the next sweep; every row of
    /// the column becomes pending.
    pub fn set_prompt(&mut self, column: &str, prompt: &str) -> Result<(), SheetError> {
        let idx = self.column_index(column)?;
        let template = PromptTemplate::parse(prompt);
        debug!(column, refs = ?template.refs(), "prompt set");
        self.columns[idx].kind = ColumnKind::AiTrigger { prompt: template };
        for row in &mut self.rows {
            row.processed.remove(column);
        }
        Ok(())
    }

    /// Turn `column` back into a regular column, keeping its values.
    pub fn make_regular(&mut self, column: &str) -> Result<(), SheetError> {
        let idx = self.column_index(column)?;
        self.columns[idx].kind = ColumnKind::Regular;
        for row in &mut self.rows {
            row.processed.remove(column);
            row.notes.remove(column);
        }
        Ok(())
    }

    // ── Values ─────────────────────────────────────────────────────

    /// Set one cell. Returns the AI-trigger columns invalidated in that row.
    ///
    /// Writing the value a cell already holds is a no-op.
    pub fn update_cell(
        &mut self,
        row: usize,
        column: &str,
        value: impl Into<String>,
    ) -> Result<Vec<String>, SheetError> {
        self.column_index(column)?;
        let dependents: Vec<String> = self
            .dependents_of(column)
            .into_iter()
            .map(str::to_string)
            .collect();
        let r = self
            .rows
            .get_mut(row)
            .ok_or(SheetError::RowOutOfRange(row))?;

        let value = value.into();
        if r.cells.get(column) == Some(&value) {
            return Ok(Vec::new());
        }
        r.cells.insert(column.to_string(), value);
        for ai in &dependents {
            r.processed.remove(ai);
        }
        if !dependents.is_empty() {
            debug!(row, column, invalidated = ?dependents, "cell edit invalidated AI cells");
        }
        Ok(dependents)
    }

    /// Write the same value into every row of `column`.
    pub fn apply_to_all(&mut self, column: &str, value: &str) -> Result<(), SheetError> {
        self.column_index(column)?;
        for row in 0..self.rows.len() {
            self.update_cell(row, column, value)?;
        }
        Ok(())
    }

    /// Forget the processed marker of one AI cell so the next sweep recomputes it.
    pub fn trigger(&mut self, row: usize, column: &str) -> Result<(), SheetError> {
        let idx = self.column_index(column)?;
        if !self.columns[idx].is_ai_trigger() {
            return Err(SheetError::NotAiTrigger(column.to_string()));
        }
        let r = self
            .rows
            .get_mut(row)
            .ok_or(SheetError::RowOutOfRange(row))?;
        r.processed.remove(column);
        Ok(())
    }

    // ── Dependencies ───────────────────────────────────────────────

    /// AI-trigger columns whose prompt references `column`.
    pub fn dependents_of(&self, column: &str) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.prompt().is_some_and(|p| p.references(column)))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Fingerprint of the inputs an AI cell would currently be computed from.
    ///
    /// `None` when the row or column does not exist or the column is regular.
    pub fn fingerprint(&self, row: usize, column: &str) -> Option<u64> {
        let prompt = self.column(column)?.prompt()?;
        let r = self.rows.get(row)?;
        Some(fingerprint(column, prompt, &r.cells))
    }

    /// Whether an AI cell needs (re)computation.
    pub fn is_pending(&self, row: usize, column: &str) -> bool {
        match (self.fingerprint(row, column), self.rows.get(row)) {
            (Some(current), Some(r)) => r.processed.get(column) != Some(&current),
            _ => false,
        }
    }

    /// Every AI cell that needs computation, column by column, top to bottom.
    pub fn pending_jobs(&self) -> Vec<PendingJob> {
        let mut jobs = Vec::new();
        for column in self.ai_columns() {
            let Some(prompt) = column.prompt() else {
                continue;
            };
            for (idx, row) in self.rows.iter().enumerate() {
                let fp = fingerprint(&column.name, prompt, &row.cells);
                if row.processed.get(&column.name) == Some(&fp) {
                    continue;
                }
                jobs.push(PendingJob {
                    row: idx,
                    column: column.name.clone(),
                    prompt: prompt.render(&row.cells),
                    fingerprint: fp,
                });
            }
        }
        jobs
    }

    /// The first pending AI cell not listed in `attempted`.
    ///
    /// Rendered from the row's values at call time, so an AI column that
    /// reads another AI column sees results merged earlier in the same sweep.
    pub fn next_pending(&self, attempted: &HashSet<(usize, String)>) -> Option<PendingJob> {
        for column in self.ai_columns() {
            let Some(prompt) = column.prompt() else {
                continue;
            };
            for (idx, row) in self.rows.iter().enumerate() {
                if attempted.contains(&(idx, column.name.clone())) {
                    continue;
                }
                let fp = fingerprint(&column.name, prompt, &row.cells);
                if row.processed.get(&column.name) != Some(&fp) {
                    return Some(PendingJob {
                        row: idx,
                        column: column.name.clone(),
                        prompt: prompt.render(&row.cells),
                        fingerprint: fp,
                    });
                }
            }
        }
        None
    }

    /// Write a model result back, unless the row changed since `job` was built.
    pub fn merge(
        &mut self,
        job: &PendingJob,
        value: String,
        note: Option<String>,
    ) -> Result<MergeOutcome, SheetError> {
        let Some(current) = self.fingerprint(job.row, &job.column) else {
            // The column was made regular or renamed while the call was in flight.
            return Ok(MergeOutcome::Stale);
        };
        if current != job.fingerprint {
            return Ok(MergeOutcome::Stale);
        }
        let r = self
            .rows
            .get_mut(job.row)
            .ok_or(SheetError::RowOutOfRange(job.row))?;
        r.cells.insert(job.column.clone(), value);
        r.processed.insert(job.column.clone(), job.fingerprint);
        match note {
            Some(n) => r.notes.insert(job.column.clone(), n),
            None => r.notes.remove(&job.column),
        };
        Ok(MergeOutcome::Applied)
    }

    fn column_index(&self, name: &str) -> Result<usize, SheetError> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| SheetError::UnknownColumn(name.to_string()))
    }
}

/// FNV-1a over the prompt source and the referenced values.
///
/// The column's own value is skipped so that a self-referencing prompt does
/// not invalidate itself on every write.
fn fingerprint(column: &str, prompt: &PromptTemplate, cells: &HashMap<String, String>) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    let mut feed = |bytes: &[u8]| {
        for byte in bytes {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
    };
    feed(prompt.source().as_bytes());
    for name in prompt.refs().iter().filter(|r| r.as_str() != column) {
        feed(&[0xff]);
        feed(name.as_bytes());
        feed(&[0x00]);
        feed(cells.get(name).map_or(&[][..], |v| v.as_bytes()));
    }
    hash
}
