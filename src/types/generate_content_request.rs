use serde::{Deserialize, Serialize};

use crate::types::Content;

/// Body of a `generateContent` or `streamGenerateContent` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// The whole conversation so far, oldest turn first.
    pub contents: Vec<Content>,

    /// Instruction that frames every reply of the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

impl GenerateContentRequest {
    /// Create a new request over the given history.
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            system_instruction: None,
        }
    }

    /// Set the system instruction.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(Content::system(instruction));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn request_minimal() {
        let request = GenerateContentRequest::new(vec![Content::user("hi")]);
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}]
            })
        );
    }

    #[test]
    fn request_complete() {
        let request = GenerateContentRequest::new(vec![Content::user("hi")])
            .with_system_instruction("be terse");
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
                "systemInstruction": {"parts": [{"text": "be terse"}]}
            })
        );
    }
}
