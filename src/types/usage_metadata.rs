use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Token accounting reported with every response.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Tokens in the prompt, which includes the whole history.
    #[serde(default)]
    pub prompt_token_count: u64,

    /// Tokens across all generated candidates.
    #[serde(default)]
    pub candidates_token_count: u64,

    /// Total of prompt and candidates (and reasoning, for thinking models).
    #[serde(default)]
    pub total_token_count: u64,
}

impl UsageMetadata {
    /// Create a new `UsageMetadata`.
    pub fn new(prompt_token_count: u64, candidates_token_count: u64) -> Self {
        Self {
            prompt_token_count,
            candidates_token_count,
            total_token_count: prompt_token_count + candidates_token_count,
        }
    }
}

impl Add for UsageMetadata {
    type Output = UsageMetadata;

    fn add(self, rhs: UsageMetadata) -> UsageMetadata {
        UsageMetadata {
            prompt_token_count: self.prompt_token_count + rhs.prompt_token_count,
            candidates_token_count: self.candidates_token_count + rhs.candidates_token_count,
            total_token_count: self.total_token_count + rhs.total_token_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn usage_deserialization() {
        let usage: UsageMetadata = serde_json::from_value(json!({
            "promptTokenCount": 50,
            "candidatesTokenCount": 100,
            "totalTokenCount": 150
        }))
        .unwrap();
        assert_eq!(usage, UsageMetadata::new(50, 100));
    }

    #[test]
    fn usage_missing_fields_default_to_zero() {
        let usage: UsageMetadata = serde_json::from_value(json!({"promptTokenCount": 7})).unwrap();
        assert_eq!(usage.prompt_token_count, 7);
        assert_eq!(usage.candidates_token_count, 0);
    }

    #[test]
    fn usage_adds() {
        let total = UsageMetadata::new(1, 2) + UsageMetadata::new(10, 20);
        assert_eq!(total, UsageMetadata::new(11, 22));
    }
}
