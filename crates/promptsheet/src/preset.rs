//! Named sheet presets ("templates" in the UI).
//!
//! A preset is plain JSON:
//!
//! ```json
//! {
//!   "name": "Students",
//!   "columns": {
//!     "Major": { "type": "regular" },
//!     "isEngineer": { "type": "ai-trigger", "prompt": "Is @Major engineering?" }
//!   },
//!   "rows": [{ "Major": "Biology" }]
//! }
//! ```
//!
//! Column order follows the order of the `columns` object. Presets can be
//! loaded from a file holding one preset or an array of them, next to the
//! built-in ones returned by [`PresetLibrary::builtin`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::sheet::{Column, DEFAULT_SHEET_NAME, Sheet, SheetError};

/// Prompt of the built-in Students preset.
pub const STUDENTS_PROMPT: &str = "Is the student from a major in @Major an engineer?";

/// Errors raised while loading or instantiating presets.
#[derive(Debug, Error)]
pub enum PresetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unknown template {0:?}")]
    Unknown(String),
    #[error(transparent)]
    Sheet(#[from] SheetError),
}

/// A named starting point for a new sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    /// Lookup key. Derived from `name` when omitted.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, with = "column_map")]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<HashMap<String, String>>,
}

impl Preset {
    /// The Students preset: three students and an `isEngineer` AI column.
    pub fn students() -> Self {
        let student = |first: &str, last: &str, major: &str| {
            HashMap::from([
                ("First name".to_string(), first.to_string()),
                ("Last name".to_string(), last.to_string()),
                ("Major".to_string(), major.to_string()),
                ("isEngineer".to_string(), String::new()),
            ])
        };
        Self {
            id: "students".into(),
            name: "Students".into(),
            description: "Classify students by major with an AI-triggered column".into(),
            columns: vec![
                Column::regular("First name"),
                Column::regular("Last name"),
                Column::regular("Major"),
                Column::ai_trigger("isEngineer", STUDENTS_PROMPT),
            ],
            rows: vec![
                student("John", "Doe", "Computer Science"),
                student("Jane", "Smith", "Biology"),
                student("Michael", "Johnson", "Mechanical Engineering"),
            ],
        }
    }

    /// An empty sheet.
    pub fn blank() -> Self {
        Self {
            id: "blank".into(),
            name: DEFAULT_SHEET_NAME.into(),
            description: "Start from scratch".into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a fresh sheet from this preset. Every AI cell starts pending.
    pub fn instantiate(&self) -> Result<Sheet, SheetError> {
        let mut sheet = Sheet::new(&self.name);
        for column in &self.columns {
            sheet.push_column(column.clone())?;
        }
        for row in &self.rows {
            sheet.push_row(row.clone());
        }
        Ok(sheet)
    }
}

/// An ordered collection of presets addressed by id.
#[derive(Debug, Clone, Default)]
pub struct PresetLibrary {
    presets: Vec<Preset>,
}

impl PresetLibrary {
    /// The presets shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            presets: vec![Preset::blank(), Preset::students()],
        }
    }

    pub fn list(&self) -> &[Preset] {
        &self.presets
    }

    /// Look a preset up by id. A trailing `-template` is ignored, so
    /// `students-template` finds `students`.
    pub fn get(&self, id: &str) -> Option<&Preset> {
        let find = |key: &str| self.presets.iter().find(|p| p.id == key);
        find(id).or_else(|| id.strip_suffix("-template").and_then(find))
    }

    /// Build a sheet from the preset `id`.
    pub fn instantiate(&self, id: &str) -> Result<Sheet, PresetError> {
        let preset = self
            .get(id)
            .ok_or_else(|| PresetError::Unknown(id.to_string()))?;
        Ok(preset.instantiate()?)
    }

    /// Add a preset, replacing any preset with the same id.
    pub fn insert(&mut self, mut preset: Preset) {
        if preset.id.trim().is_empty() {
            preset.id = slugify(&preset.name);
        }
        match self.presets.iter().position(|p| p.id == preset.id) {
            Some(idx) => self.presets[idx] = preset,
            None => self.presets.push(preset),
        }
    }

    /// Load presets from a JSON file holding one preset or an array.
    ///
    /// Returns the number of presets added or replaced.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize, PresetError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PresetError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            Many(Vec<Preset>),
            One(Box<Preset>),
        }

        let parsed: OneOrMany = serde_json::from_str(&text).map_err(|source| PresetError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let presets = match parsed {
            OneOrMany::Many(v) => v,
            OneOrMany::One(p) => vec![*p],
        };
        let count = presets.len();
        for preset in presets {
            self.insert(preset);
        }
        debug!("loaded {count} preset(s) from {}", path.display());
        Ok(count)
    }
}

/// Lowercase, with runs of non-alphanumerics collapsed to `-`.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// (De)serialises `Vec<Column>` as an ordered `{ name: { type, prompt? } }` map.
mod column_map {
    use serde::de::Error as _;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::{Map, Value};

    use crate::sheet::{Column, ColumnKind};

    pub fn serialize<S: Serializer>(columns: &[Column], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(columns.len()))?;
        for column in columns {
            map.serialize_entry(&column.name, &column.kind)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Column>, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        map.into_iter()
            .map(|(name, spec)| {
                let kind: ColumnKind = serde_json::from_value(spec)
                    .map_err(|e| D::Error::custom(format!("column {name:?}: {e}")))?;
                Ok(Column { name, kind })
            })
            .collect()
    }
}
