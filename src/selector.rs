//! Model selection menu.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::input::{Input, LineReader};
use crate::render::{PromptKind, Renderer};
use crate::types::{KnownModel, Model};
use crate::{Error, Result};

/// Key chosen when the user just presses enter.
pub const DEFAULT_MODEL_KEY: u32 = 1;

/// One entry of the model menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Number the user types to pick this model.
    pub key: u32,
    /// Model identifier sent to the API.
    pub id: Model,
    /// Human-readable description shown in the menu.
    pub description: String,
}

impl ModelDescriptor {
    pub fn new(key: u32, id: impl Into<Model>, description: impl Into<String>) -> Self {
        Self {
            key,
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Why a selection was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    /// The input was not a number.
    NotANumber,
    /// The number is not a key of the table.
    OutOfRange,
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::NotANumber => write!(f, "Invalid input. Please enter a number."),
            SelectionError::OutOfRange => write!(f, "Invalid choice."),
        }
    }
}

impl std::error::Error for SelectionError {}

/// The menu of selectable models, ordered by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTable {
    entries: Vec<ModelDescriptor>,
    default_key: u32,
}

impl ModelTable {
    /// Build a table from entries.
    ///
    /// Keys must be unique and `default_key` must be one of them.
    pub fn new(mut entries: Vec<ModelDescriptor>, default_key: u32) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::validation(
                "model table must not be empty",
                Some("models".to_string()),
            ));
        }
        entries.sort_by_key(|entry| entry.key);
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].key == pair[1].key) {
            return Err(Error::validation(
                format!("duplicate model key {}", pair[0].key),
                Some("models".to_string()),
            ));
        }
        if !entries.iter().any(|entry| entry.key == default_key) {
            return Err(Error::validation(
                format!("default model key {default_key} is not in the table"),
                Some("default_model".to_string()),
            ));
        }
        Ok(Self {
            entries,
            default_key,
        })
    }

    pub fn entries(&self) -> &[ModelDescriptor] {
        &self.entries
    }

    pub fn default_key(&self) -> u32 {
        self.default_key
    }

    pub fn get(&self, key: u32) -> Option<&ModelDescriptor> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn default_entry(&self) -> &ModelDescriptor {
        // `new` guarantees the default key is present.
        self.get(self.default_key).unwrap_or(&self.entries[0])
    }

    /// Resolve a command-line model choice, either a key or a model identifier.
    ///
    /// Identifiers not in the table are accepted as-is with an empty
    /// description.  A number that is not a key is rejected.
    pub fn resolve(&self, choice: &str) -> Result<ModelDescriptor> {
        let choice = choice.trim();
        if choice.parse::<i64>().is_ok() {
            return parse_selection(self, choice).cloned().map_err(|_| {
                Error::validation(self.retry_message(), Some("model".to_string()))
            });
        }
        let id = Model::from(choice);
        Ok(self
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
            .unwrap_or_else(|| ModelDescriptor::new(0, id, "")))
    }

    /// The message shown after an out-of-range choice.
    pub fn retry_message(&self) -> String {
        let keys = self
            .entries
            .iter()
            .map(|entry| entry.key.to_string())
            .collect::<Vec<_>>();
        match keys.split_last() {
            Some((last, rest)) if !rest.is_empty() => {
                format!("Invalid choice. Please enter {} or {}.", rest.join(", "), last)
            }
            _ => format!("Invalid choice. Please enter {}.", keys.join("")),
        }
    }
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            entries: vec![
                ModelDescriptor::new(
                    1,
                    KnownModel::Gemini25Flash,
                    "Fast and versatile, good for low-latency tasks and large-scale analysis.",
                ),
                ModelDescriptor::new(
                    2,
                    KnownModel::Gemini3FlashPreview,
                    "Preview model, strong and fast.",
                ),
                ModelDescriptor::new(3, KnownModel::Gemini3ProPreview, "Preview model, strong."),
            ],
            default_key: DEFAULT_MODEL_KEY,
        }
    }
}

/// Parse one line of menu input.
///
/// Surrounding whitespace is ignored and an empty line selects the default.
pub fn parse_selection<'a>(
    table: &'a ModelTable,
    input: &str,
) -> std::result::Result<&'a ModelDescriptor, SelectionError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(table.default_entry());
    }
    let key = input
        .parse::<i64>()
        .map_err(|_| SelectionError::NotANumber)?;
    u32::try_from(key)
        .ok()
        .and_then(|key| table.get(key))
        .ok_or(SelectionError::OutOfRange)
}

/// Show the menu and read choices until one is valid.
///
/// Ctrl-C at the prompt re-prompts.  End of input aborts since no choice can
/// ever be made.
pub fn choose_model(
    table: &ModelTable,
    reader: &mut dyn LineReader,
    renderer: &mut dyn Renderer,
) -> Result<ModelDescriptor> {
    let prompt = renderer.prompt(
        PromptKind::Selection,
        &format!(
            "Enter the number of the model to use (default {}): ",
            table.default_key()
        ),
    );
    loop {
        renderer.print_banner("--- GEMINI MODEL SELECTION ---", &[]);
        for entry in table.entries() {
            renderer.print_menu_entry(entry.key, entry.id.as_str(), &entry.description);
        }
        let line = match reader.read_line(&prompt)? {
            Input::Line(line) => line,
            Input::Interrupted => continue,
            Input::Eof => return Err(Error::abort("no model selected")),
        };
        match parse_selection(table, &line) {
            Ok(entry) => {
                renderer.print_success(&format!("Selected model: {}", entry.id));
                return Ok(entry.clone());
            }
            Err(SelectionError::OutOfRange) => renderer.print_error(&table.retry_message()),
            Err(err) => renderer.print_error(&err.to_string()),
        }
    }
}
