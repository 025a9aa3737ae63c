//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the conversation
//! history and exchanges turns with a [`ChatBackend`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;

use crate::client::ChatBackend;
use crate::error::Result;
use crate::observability::{CHAT_TURN_DURATION, CHAT_TURN_ERRORS, CHAT_TURNS};
use crate::render::Renderer;
use crate::types::{Content, GenerateContentRequest, Model, UsageMetadata};

/// Label printed before each reply.
pub const REPLY_LABEL: &str = "Gemini";

/// How often a pending request checks the interrupt flag.
const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// How a turn ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply was printed and recorded in the history.
    Completed(String),
    /// The user interrupted the reply; the turn was discarded.
    Interrupted,
}

/// A chat session that manages conversation state and API interactions.
///
/// The history always starts with one user turn holding the project context.
pub struct ChatSession<B: ChatBackend> {
    backend: B,
    model: Model,
    system_instruction: String,
    history: Vec<Content>,
    streaming: bool,
    interrupted: Arc<AtomicBool>,
    usage_totals: UsageMetadata,
    last_turn_usage: Option<UsageMetadata>,
    request_count: u64,
    failed_requests: u64,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: Model,
    /// The number of turns in the history, including the context turn.
    pub message_count: usize,
    /// Size of the project context in bytes.
    pub context_bytes: usize,
    /// Whether replies are streamed.
    pub streaming: bool,
    /// Total number of completed requests.
    pub total_requests: u64,
    /// Total number of failed requests.
    pub failed_requests: u64,
    /// Prompt tokens across all requests.
    pub total_prompt_tokens: u64,
    /// Reply tokens across all requests.
    pub total_reply_tokens: u64,
    /// Token usage of the last turn, if reported.
    pub last_turn: Option<UsageMetadata>,
}

impl<B: ChatBackend> ChatSession<B> {
    /// Creates a session seeded with the project context.  No request is made.
    pub fn new(
        backend: B,
        model: Model,
        system_instruction: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            model,
            system_instruction: system_instruction.into(),
            history: vec![Content::user(context)],
            streaming: false,
            interrupted: Arc::new(AtomicBool::new(false)),
            usage_totals: UsageMetadata::default(),
            last_turn_usage: None,
            request_count: 0,
            failed_requests: 0,
        }
    }

    /// Stream replies chunk by chunk.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Share the flag a Ctrl-C handler sets.
    pub fn with_interrupt_flag(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    /// The flag that interrupts a pending reply when set.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Sends a user message and renders the reply.
    ///
    /// On success the user turn and the reply are appended to the history.  On
    /// failure or interrupt the history is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn send_message(
        &mut self,
        user_input: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<TurnOutcome> {
        let previous_len = self.history.len();
        self.interrupted.store(false, Ordering::Relaxed);
        self.history.push(Content::user(user_input));

        let start = Instant::now();
        let result = if self.streaming {
            self.exchange_streaming(renderer).await
        } else {
            self.exchange(renderer).await
        };
        CHAT_TURN_DURATION.add(start.elapsed().as_secs_f64());

        match result {
            Ok(Some((reply, usage))) => {
                CHAT_TURNS.click();
                self.request_count += 1;
                self.record_usage(usage);
                self.history.push(Content::model(reply.clone()));
                Ok(TurnOutcome::Completed(reply))
            }
            Ok(None) => {
                self.history.truncate(previous_len);
                renderer.print_interrupted();
                Ok(TurnOutcome::Interrupted)
            }
            Err(err) => {
                CHAT_TURN_ERRORS.click();
                self.failed_requests += 1;
                self.history.truncate(previous_len);
                Err(err)
            }
        }
    }

    fn request(&self) -> GenerateContentRequest {
        GenerateContentRequest::new(self.history.clone())
            .with_system_instruction(self.system_instruction.clone())
    }

    /// Returns `Ok(None)` when interrupted.
    async fn exchange(
        &self,
        renderer: &mut dyn Renderer,
    ) -> Result<Option<(String, Option<UsageMetadata>)>> {
        let request = self.request();
        let response = tokio::select! {
            response = self.backend.generate(&self.model, &request) => response?,
            _ = wait_for_interrupt(&self.interrupted) => return Ok(None),
        };
        let reply = response.text()?;
        renderer.print_complete_reply(REPLY_LABEL, &reply);
        Ok(Some((reply, response.usage_metadata)))
    }

    /// Returns `Ok(None)` when interrupted.
    async fn exchange_streaming(
        &self,
        renderer: &mut dyn Renderer,
    ) -> Result<Option<(String, Option<UsageMetadata>)>> {
        let request = self.request();
        let mut stream = tokio::select! {
            stream = self.backend.generate_streaming(&self.model, &request) => stream?,
            _ = wait_for_interrupt(&self.interrupted) => return Ok(None),
        };

        let mut reply = String::new();
        let mut usage = None;
        let mut started = false;
        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = wait_for_interrupt(&self.interrupted) => return Ok(None),
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;
            let text = chunk.chunk_text()?;
            if !started {
                renderer.start_reply(REPLY_LABEL);
                started = true;
            }
            renderer.print_reply(&text);
            reply.push_str(&text);
            if chunk.usage_metadata.is_some() {
                usage = chunk.usage_metadata;
            }
        }
        if !started {
            renderer.start_reply(REPLY_LABEL);
        }
        renderer.finish_reply();
        Ok(Some((reply, usage)))
    }

    /// Forget the conversation, keeping the project context.
    pub fn clear(&mut self) {
        self.history.truncate(1);
    }

    /// Returns the number of turns in the history, including the context turn.
    pub fn message_count(&self) -> usize {
        self.history.len()
    }

    /// The conversation so far.
    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Returns the current model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Returns the system instruction.
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// The backend this session talks to.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.model.clone(),
            message_count: self.message_count(),
            context_bytes: self.history.first().map(|c| c.text().len()).unwrap_or(0),
            streaming: self.streaming,
            total_requests: self.request_count,
            failed_requests: self.failed_requests,
            total_prompt_tokens: self.usage_totals.prompt_token_count,
            total_reply_tokens: self.usage_totals.candidates_token_count,
            last_turn: self.last_turn_usage,
        }
    }

    fn record_usage(&mut self, usage: Option<UsageMetadata>) {
        self.last_turn_usage = usage;
        if let Some(usage) = usage {
            self.usage_totals = self.usage_totals + usage;
        }
    }
}

async fn wait_for_interrupt(flag: &AtomicBool) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(INTERRUPT_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::Error;
    use crate::client::ChunkStream;
    use crate::context::ProjectContext;
    use crate::types::{GenerateContentResponse, KnownModel, Role};

    /// Replies from a script and records every request.
    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<Vec<Result<GenerateContentResponse>>>,
        requests: Mutex<Vec<GenerateContentRequest>>,
        chunked: bool,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<GenerateContentResponse>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                ..Self::default()
            }
        }

        fn next_reply(&self, request: &GenerateContentRequest) -> Result<GenerateContentResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(Error::internal_server("script exhausted")))
        }
    }

    #[async_trait::async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn generate(
            &self,
            _: &Model,
            request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            self.next_reply(request)
        }

        async fn generate_streaming(
            &self,
            _: &Model,
            request: &GenerateContentRequest,
        ) -> Result<ChunkStream> {
            let response = self.next_reply(request)?;
            if !self.chunked {
                return Ok(Box::pin(futures::stream::iter(vec![Ok(response)])));
            }
            let text = response.text()?;
            let (head, tail) = text.split_at(text.len() / 2);
            let chunks = vec![
                Ok(GenerateContentResponse::from_text(head)),
                Ok(GenerateContentResponse::from_text(tail)),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[derive(Default)]
    struct Transcript {
        replies: Vec<String>,
        current: String,
        interrupted: usize,
    }

    impl Renderer for Transcript {
        fn print_banner(&mut self, _: &str, _: &[String]) {}
        fn print_menu_entry(&mut self, _: u32, _: &str, _: &str) {}
        fn print_info(&mut self, _: &str) {}
        fn print_success(&mut self, _: &str) {}
        fn print_error(&mut self, _: &str) {}
        fn finish_context(&mut self, _: &ProjectContext) {}
        fn start_reply(&mut self, _: &str) {
            self.current.clear();
        }
        fn print_reply(&mut self, text: &str) {
            self.current.push_str(text);
        }
        fn finish_reply(&mut self) {
            self.replies.push(std::mem::take(&mut self.current));
        }
        fn print_interrupted(&mut self) {
            self.interrupted += 1;
        }
    }

    fn session(backend: ScriptedBackend) -> ChatSession<ScriptedBackend> {
        ChatSession::new(
            backend,
            Model::Known(KnownModel::Gemini25Flash),
            "Be precise.",
            "CONTEXT",
        )
    }

    #[test]
    fn new_session_is_seeded() {
        let session = session(ScriptedBackend::default());
        assert_eq!(session.message_count(), 1);
        assert_eq!(session.history()[0].role, Some(Role::User));
        assert_eq!(session.history()[0].text(), "CONTEXT");
        assert_eq!(session.system_instruction(), "Be precise.");
        assert!(session.backend().requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_appends_both_turns() {
        let backend = ScriptedBackend::new(vec![Ok(GenerateContentResponse::from_text("Hi!"))]);
        let mut session = session(backend);
        let mut renderer = Transcript::default();
        let outcome = session.send_message("Hello", &mut renderer).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed("Hi!".to_string()));
        assert_eq!(session.message_count(), 3);
        assert_eq!(session.history()[1].text(), "Hello");
        assert_eq!(session.history()[2].role, Some(Role::Model));
        assert_eq!(renderer.replies, vec!["Hi!".to_string()]);

        let requests = session.backend().requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].contents.len(), 2);
        assert_eq!(
            requests[0].system_instruction.as_ref().unwrap().text(),
            "Be precise."
        );
    }

    #[tokio::test]
    async fn failure_leaves_history_untouched() {
        let backend = ScriptedBackend::new(vec![
            Err(Error::service_unavailable("overloaded", None)),
            Ok(GenerateContentResponse::from_text("ok")),
        ]);
        let mut session = session(backend);
        let mut renderer = Transcript::default();
        let err = session.send_message("first", &mut renderer).await.unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(session.message_count(), 1);
        assert!(renderer.replies.is_empty());

        session.send_message("second", &mut renderer).await.unwrap();
        assert_eq!(session.message_count(), 3);
        assert_eq!(session.history()[1].text(), "second");
        let stats = session.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.failed_requests, 1);
    }

    #[tokio::test]
    async fn blocked_prompt_is_an_error() {
        let blocked = serde_json::from_str::<GenerateContentResponse>(
            r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#,
        )
        .unwrap();
        let mut session = session(ScriptedBackend::new(vec![Ok(blocked)]));
        let err = session
            .send_message("bad", &mut Transcript::default())
            .await
            .unwrap_err();
        assert!(err.is_blocked());
        assert_eq!(session.message_count(), 1);
    }

    #[tokio::test]
    async fn streaming_concatenates_chunks() {
        let backend = ScriptedBackend {
            chunked: true,
            ..ScriptedBackend::new(vec![Ok(GenerateContentResponse::from_text("Hello world"))])
        };
        let mut session = session(backend).with_streaming(true);
        let mut renderer = Transcript::default();
        let outcome = session.send_message("Hi", &mut renderer).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed("Hello world".to_string()));
        assert_eq!(renderer.replies, vec!["Hello world".to_string()]);
        assert_eq!(session.history()[2].text(), "Hello world");
        assert!(session.stats().streaming);
    }

    #[tokio::test]
    async fn usage_is_accumulated() {
        let mut first = GenerateContentResponse::from_text("a");
        first.usage_metadata = Some(UsageMetadata::new(100, 5));
        let mut second = GenerateContentResponse::from_text("b");
        second.usage_metadata = Some(UsageMetadata::new(120, 7));
        let mut session = session(ScriptedBackend::new(vec![Ok(first), Ok(second)]));
        let mut renderer = Transcript::default();
        session.send_message("1", &mut renderer).await.unwrap();
        session.send_message("2", &mut renderer).await.unwrap();
        let stats = session.stats();
        assert_eq!(stats.total_prompt_tokens, 220);
        assert_eq!(stats.total_reply_tokens, 12);
        assert_eq!(stats.last_turn, Some(UsageMetadata::new(120, 7)));
        assert_eq!(stats.context_bytes, "CONTEXT".len());
    }

    #[tokio::test]
    async fn clear_keeps_context() {
        let backend = ScriptedBackend::new(vec![Ok(GenerateContentResponse::from_text("x"))]);
        let mut session = session(backend);
        session
            .send_message("q", &mut Transcript::default())
            .await
            .unwrap();
        assert_eq!(session.message_count(), 3);
        session.clear();
        assert_eq!(session.message_count(), 1);
        assert_eq!(session.history()[0].text(), "CONTEXT");
    }

    struct Stalled;

    #[async_trait::async_trait]
    impl ChatBackend for Stalled {
        async fn generate(
            &self,
            _: &Model,
            _: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            futures::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_discards_turn() {
        let mut session = ChatSession::new(
            Stalled,
            Model::Known(KnownModel::Gemini25Flash),
            "",
            "CONTEXT",
        );
        let flag = session.interrupt_flag();
        let mut renderer = Transcript::default();
        let interrupter = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            flag.store(true, Ordering::Relaxed);
        });
        let outcome = session.send_message("slow", &mut renderer).await.unwrap();
        interrupter.await.unwrap();
        assert_eq!(outcome, TurnOutcome::Interrupted);
        assert_eq!(renderer.interrupted, 1);
        assert_eq!(session.message_count(), 1);
    }
}
