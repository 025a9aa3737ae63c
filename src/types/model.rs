use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A Gemini model identifier.
///
/// This can be a predefined model or a custom string for models released
/// after this crate was written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model versions
    Known(KnownModel),

    /// Custom model identifier (for future or tuned models)
    Custom(String),
}

/// Known Gemini models.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// Gemini 2.5 Flash
    #[serde(rename = "gemini-2.5-flash")]
    Gemini25Flash,

    /// Gemini 2.5 Flash-Lite
    #[serde(rename = "gemini-2.5-flash-lite")]
    Gemini25FlashLite,

    /// Gemini 2.5 Pro
    #[serde(rename = "gemini-2.5-pro")]
    Gemini25Pro,

    /// Gemini 3 Flash (preview)
    #[serde(rename = "gemini-3-flash-preview")]
    Gemini3FlashPreview,

    /// Gemini 3 Pro (preview)
    #[serde(rename = "gemini-3-pro-preview")]
    Gemini3ProPreview,
}

impl KnownModel {
    /// Every known model, in menu order.
    pub const ALL: [KnownModel; 5] = [
        KnownModel::Gemini25Flash,
        KnownModel::Gemini25FlashLite,
        KnownModel::Gemini25Pro,
        KnownModel::Gemini3FlashPreview,
        KnownModel::Gemini3ProPreview,
    ];

    /// The wire identifier of this model.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::Gemini25Flash => "gemini-2.5-flash",
            KnownModel::Gemini25FlashLite => "gemini-2.5-flash-lite",
            KnownModel::Gemini25Pro => "gemini-2.5-pro",
            KnownModel::Gemini3FlashPreview => "gemini-3-flash-preview",
            KnownModel::Gemini3ProPreview => "gemini-3-pro-preview",
        }
    }
}

impl Model {
    /// The wire identifier of this model.
    pub fn as_str(&self) -> &str {
        match self {
            Model::Known(known) => known.as_str(),
            Model::Custom(custom) => custom,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for KnownModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KnownModel::ALL
            .iter()
            .find(|known| known.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown model: {s}"))
    }
}

impl FromStr for Model {
    type Err = std::convert::Infallible;

    /// Parse a model identifier, accepting an optional `models/` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("models/").unwrap_or(s);
        Ok(s.parse::<KnownModel>()
            .map(Model::Known)
            .unwrap_or_else(|_| Model::Custom(s.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        Model::from(model.as_str())
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        match model.parse() {
            Ok(model) => model,
            Err(never) => match never {},
        }
    }
}
