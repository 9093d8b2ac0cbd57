//! In-memory registry of open sheets.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use promptsheet::sheet::{SharedSheet, Sheet};

/// One open sheet and the lock that serialises its sweeps.
#[derive(Clone)]
pub struct SheetEntry {
    pub sheet: SharedSheet,
    /// Held for the duration of a sweep. A second sweep waits, then sees
    /// the state the first one left behind.
    pub sweep_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SheetEntry {
    fn new(sheet: Sheet) -> Self {
        Self {
            sheet: Arc::new(Mutex::new(sheet)),
            sweep_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

const ID_PREFIX: &str = "sheet-";

/// Sheets addressed by id (`sheet-1`, `sheet-2`, ...). Cheap to clone.
#[derive(Clone, Default)]
pub struct SheetStore {
    /// Keyed by the numeric part of the id, so iteration follows creation.
    sheets: Arc<Mutex<BTreeMap<u64, SheetEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl SheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sheet and return its id.
    pub fn insert(&self, sheet: Sheet) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.map().insert(n, SheetEntry::new(sheet));
        format!("{ID_PREFIX}{n}")
    }

    pub fn get(&self, id: &str) -> Option<SheetEntry> {
        let n = id.strip_prefix(ID_PREFIX)?.parse::<u64>().ok()?;
        self.map().get(&n).cloned()
    }

    /// Ids of every open sheet, oldest first.
    pub fn ids(&self) -> Vec<String> {
        self.map().keys().map(|n| format!("{ID_PREFIX}{n}")).collect()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, SheetEntry>> {
        self.sheets.lock().unwrap_or_else(|e| e.into_inner())
    }
}
