//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! `streamGenerateContent?alt=sse` answers with one `data:` line per chunk, each
//! holding a complete `GenerateContentResponse`.  Events are separated by a blank
//! line; the API terminates lines with CRLF.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::types::GenerateContentResponse;
use crate::{Error, Result};

/// Process a stream of bytes into a stream of response chunks.
///
/// Bytes are buffered until a complete event is available, so multi-byte
/// characters and events split across network reads are handled.
pub fn process_sse<S>(
    byte_stream: S,
) -> impl Stream<Item = Result<GenerateContentResponse>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });
    process_event_stream(stream)
}

fn process_event_stream<S>(
    stream: S,
) -> impl Stream<Item = Result<GenerateContentResponse>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer),
        move |(mut stream, mut buffer)| async move {
            loop {
                // First drain complete events from the buffer
                while let Some((event, remaining)) = take_event(&buffer) {
                    buffer = remaining;
                    if let Some(item) = parse_event(&event) {
                        return Some((item, (stream, buffer)));
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer)));
                    }
                    None => {
                        // End of stream; accept a final event lacking its blank line
                        let event = std::mem::take(&mut buffer);
                        if let Some(item) = parse_event(&event) {
                            return Some((item, (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Split the first complete event off the buffer.
fn take_event(buffer: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    Some((buffer[..end].to_vec(), buffer[end + 2..].to_vec()))
}

/// Parse one event.  Events without data (comments, keep-alives) yield `None`.
fn parse_event(event: &[u8]) -> Option<Result<GenerateContentResponse>> {
    let text = match std::str::from_utf8(event) {
        Ok(text) => text,
        Err(e) => return Some(Err(e.into())),
    };

    let data = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|line| line.strip_prefix(' ').unwrap_or(line))
        .collect::<Vec<_>>();
    if data.is_empty() {
        return None;
    }
    let data = data.join("\n");
    if data.trim() == "[DONE]" {
        return None;
    }
    Some(parse_chunk(&data))
}

/// Parse a chunk, surfacing in-band error objects as streaming errors.
fn parse_chunk(data: &str) -> Result<GenerateContentResponse> {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
        status: Option<String>,
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        let status = envelope.error.status.unwrap_or_else(|| "UNKNOWN".to_string());
        let message = envelope.error.message.unwrap_or_default();
        return Err(Error::streaming(format!("{status}: {message}"), None));
    }
    serde_json::from_str::<GenerateContentResponse>(data).map_err(|e| {
        Error::serialization(format!("Failed to parse chunk JSON: {e}"), Some(Box::new(e)))
    })
}
