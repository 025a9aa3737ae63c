//! Logging trait for Gemini client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! and log all API interactions passing through the [`Gemini`](crate::Gemini)
//! client, and [`JsonLinesLogger`], which appends one JSON object per event to
//! a file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::types::{GenerateContentRequest, GenerateContentResponse, Model};

/// A trait for logging Gemini client operations.
///
/// Implement this trait to capture and record all API interactions,
/// including both complete responses and individual streaming chunks.
pub trait ClientLogger: Send + Sync {
    /// Log an outgoing request.  Called once per call, not once per retry.
    fn log_request(&self, model: &Model, request: &GenerateContentRequest);

    /// Log a complete response from a non-streaming call.
    fn log_response(&self, response: &GenerateContentResponse);

    /// Log an individual chunk of a streaming call.
    fn log_stream_chunk(&self, chunk: &GenerateContentResponse);

    /// Log that a failed attempt is about to be retried.
    fn log_retry(&self, attempt: u32, error: &Error, delay: Duration) {
        _ = (attempt, error, delay);
    }
}

/// A [`ClientLogger`] that writes one JSON object per line.
///
/// Requests are logged without their `contents`, which hold the whole project
/// context; only the number of turns is recorded.
pub struct JsonLinesLogger {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesLogger {
    /// Open `path` for appending, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|err| Error::io("failed to open log file", err))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write(&self, kind: &str, payload: Value) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let line = json!({
            "ts": timestamp,
            "kind": kind,
            "payload": payload,
        });
        if let Ok(mut writer) = self.writer.lock() {
            // Write failures are ignored.
            let _ = writeln!(writer, "{line}");
            let _ = writer.flush();
        }
    }
}

impl ClientLogger for JsonLinesLogger {
    fn log_request(&self, model: &Model, request: &GenerateContentRequest) {
        self.write(
            "request",
            json!({
                "model": model.as_str(),
                "turns": request.contents.len(),
                "system_instruction": request.system_instruction.as_ref().map(|c| c.text()),
            }),
        );
    }

    fn log_response(&self, response: &GenerateContentResponse) {
        self.write("response", serde_json::to_value(response).unwrap_or(Value::Null));
    }

    fn log_stream_chunk(&self, chunk: &GenerateContentResponse) {
        self.write("chunk", serde_json::to_value(chunk).unwrap_or(Value::Null));
    }

    fn log_retry(&self, attempt: u32, error: &Error, delay: Duration) {
        self.write(
            "retry",
            json!({
                "attempt": attempt,
                "error": error.to_string(),
                "delay_seconds": delay.as_secs_f64(),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Content, KnownModel};

    #[test]
    fn writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.jsonl");
        let logger = JsonLinesLogger::open(&path).unwrap();

        let request = GenerateContentRequest::new(vec![Content::user("the whole project")])
            .with_system_instruction("be precise");
        logger.log_request(&Model::Known(KnownModel::Gemini25Flash), &request);
        logger.log_response(&GenerateContentResponse::from_text("hi"));
        logger.log_retry(1, &Error::rate_limit("quota", None), Duration::from_secs(2));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["kind"], "request");
        assert_eq!(lines[0]["payload"]["model"], "gemini-2.5-flash");
        assert_eq!(lines[0]["payload"]["turns"], 1);
        assert!(!contents.contains("the whole project"));
        assert_eq!(lines[1]["kind"], "response");
        assert_eq!(lines[2]["payload"]["attempt"], 1);
    }
}
