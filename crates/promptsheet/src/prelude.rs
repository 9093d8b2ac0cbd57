//! Convenience re-exports for common `promptsheet` types.
//!
//! ```ignore
//! use promptsheet::prelude::*;
//! ```

// ── Grid ────────────────────────────────────────────────────────────
pub use crate::sheet::{
    Column, ColumnKind, MergeOutcome, PendingJob, Row, SharedSheet, Sheet, SheetError,
};
pub use crate::template::PromptTemplate;

// ── Sweep ───────────────────────────────────────────────────────────
pub use crate::events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler, SweepEvent,
};
pub use crate::sweep::{SweepReport, sweep};

// ── Completion ──────────────────────────────────────────────────────
pub use crate::client::{
    Completer, CompletionError, CompletionFuture, HeuristicCompleter, HttpCompleter, RetryConfig,
};
pub use crate::config::ClientConfig;
pub use crate::response::{CellResult, interpret};

// ── Presets ─────────────────────────────────────────────────────────
pub use crate::preset::{Preset, PresetError, PresetLibrary};
