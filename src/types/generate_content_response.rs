use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Content, FinishReason, UsageMetadata};

/// One reply proposed by the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content.  Absent when the candidate was filtered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    /// Why generation stopped.  Absent on intermediate streaming chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Position of this candidate in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Feedback on the prompt itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Set when the prompt was refused outright.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

/// Response of `generateContent`, and of each `streamGenerateContent` chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Candidate replies; the chat only ever looks at the first.
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    /// Feedback on the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,

    /// Token accounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,

    /// Exact model version that served the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl GenerateContentResponse {
    /// Create a response holding a single model candidate with the given text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content::model(text)),
                finish_reason: Some(FinishReason::Stop),
                index: Some(0),
            }],
            ..Self::default()
        }
    }

    /// The text of the first candidate.
    ///
    /// A response without candidates means the prompt was refused; that is
    /// reported as [`Error::Blocked`].
    pub fn text(&self) -> Result<String> {
        match self.candidates.first() {
            Some(candidate) => Ok(candidate
                .content
                .as_ref()
                .map(Content::text)
                .unwrap_or_default()),
            None => Err(Error::blocked(self.block_reason().map(String::from))),
        }
    }

    /// The text carried by one streaming chunk.
    ///
    /// Unlike [`text`](Self::text), a chunk without candidates is only an error
    /// when the prompt feedback says the prompt was blocked.
    pub fn chunk_text(&self) -> Result<String> {
        if self.candidates.is_empty() {
            return match self.block_reason() {
                Some(reason) => Err(Error::blocked(Some(reason.to_string()))),
                None => Ok(String::new()),
            };
        }
        self.text()
    }

    /// The finish reason of the first candidate, if any.
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.finish_reason.as_ref())
    }

    /// The prompt block reason, if any.
    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_full_response() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": {
                "promptTokenCount": 12,
                "candidatesTokenCount": 3,
                "totalTokenCount": 15
            },
            "modelVersion": "gemini-2.5-flash"
        }))
        .unwrap();
        assert_eq!(response.text().unwrap(), "Hello there");
        assert_eq!(response.finish_reason(), Some(&FinishReason::Stop));
        assert_eq!(response.usage_metadata, Some(UsageMetadata::new(12, 3)));
        assert_eq!(response.model_version.as_deref(), Some("gemini-2.5-flash"));
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = response.text().unwrap_err();
        assert!(err.is_blocked());
        assert!(response.chunk_text().unwrap_err().is_blocked());
    }

    #[test]
    fn usage_only_chunk_is_empty_text() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "usageMetadata": {"promptTokenCount": 5}
        }))
        .unwrap();
        assert_eq!(response.chunk_text().unwrap(), "");
        assert!(response.text().is_err());
    }

    #[test]
    fn filtered_candidate_has_empty_text() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        assert_eq!(response.text().unwrap(), "");
        assert_eq!(response.finish_reason(), Some(&FinishReason::Safety));
    }
}
