use serde::{Deserialize, Serialize};
use std::fmt;

/// Reasons why the model stopped generating a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    /// Natural stop point or a stop sequence.
    Stop,

    /// The reply reached the output token limit.
    MaxTokens,

    /// The candidate was flagged for safety reasons.
    Safety,

    /// The candidate was flagged for recitation.
    Recitation,

    /// The candidate was flagged for using an unsupported language.
    Language,

    /// Unknown or new reason.
    #[serde(other)]
    Other,
}

impl FinishReason {
    /// Returns true if the reply was cut short rather than completed.
    pub fn is_truncated(&self) -> bool {
        !matches!(self, FinishReason::Stop)
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Stop => write!(f, "STOP"),
            FinishReason::MaxTokens => write!(f, "MAX_TOKENS"),
            FinishReason::Safety => write!(f, "SAFETY"),
            FinishReason::Recitation => write!(f, "RECITATION"),
            FinishReason::Language => write!(f, "LANGUAGE"),
            FinishReason::Other => write!(f, "OTHER"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_reasons() {
        let reason: FinishReason = serde_json::from_str(r#""MAX_TOKENS""#).unwrap();
        assert_eq!(reason, FinishReason::MaxTokens);
        assert!(reason.is_truncated());
        let reason: FinishReason = serde_json::from_str(r#""STOP""#).unwrap();
        assert!(!reason.is_truncated());
    }

    #[test]
    fn unknown_reason_is_other() {
        let reason: FinishReason = serde_json::from_str(r#""BLOCKLIST""#).unwrap();
        assert_eq!(reason, FinishReason::Other);
    }
}
