//! The read-send-print loop.
//!
//! The loop moves between three states: waiting for a line, waiting for a
//! reply, and terminated.  Commands and empty lines never leave
//! `AwaitingInput`.

use crate::Error;
use crate::chat::commands::{ChatCommand, help_text, parse_command};
use crate::chat::config::FailurePolicy;
use crate::chat::session::{ChatSession, SessionStats};
use crate::client::ChatBackend;
use crate::error::Result;
use crate::input::{Input, LineReader};
use crate::render::{PromptKind, Renderer};

/// Prompt shown before each chat line.
pub const CHAT_PROMPT: &str = "You: ";

/// Why the loop ended.
#[derive(Debug)]
pub enum Termination {
    /// The user typed an exit word or `/quit`.
    UserExit,
    /// Standard input was closed.
    InputClosed,
    /// A request failed under [`FailurePolicy::FailFast`].
    RemoteFailure(Error),
}

impl Termination {
    /// Returns true when the session ended without a failure.
    pub fn is_success(&self) -> bool {
        !matches!(self, Termination::RemoteFailure(_))
    }
}

/// States of the chat loop.
#[derive(Debug)]
pub enum LoopState {
    /// Waiting for the user to type something.
    AwaitingInput,
    /// A message was sent and the reply is pending.
    AwaitingReply(String),
    /// The loop is over.
    Terminated(Termination),
}

/// Run the chat loop until the user leaves, input ends, or a request fails
/// under [`FailurePolicy::FailFast`].
///
/// # Errors
///
/// Only failures of the line reader itself are returned as errors; remote
/// failures are reported through [`Termination::RemoteFailure`].
pub async fn run_chat_loop<B: ChatBackend>(
    session: &mut ChatSession<B>,
    reader: &mut dyn LineReader,
    renderer: &mut dyn Renderer,
    policy: FailurePolicy,
) -> Result<Termination> {
    let prompt = renderer.prompt(PromptKind::Chat, CHAT_PROMPT);
    let mut state = LoopState::AwaitingInput;
    loop {
        state = match state {
            LoopState::AwaitingInput => match reader.read_line(&prompt)? {
                Input::Line(line) => on_line(session, reader, renderer, line),
                // Ctrl-C at the prompt does not end the session.
                Input::Interrupted => LoopState::AwaitingInput,
                Input::Eof => LoopState::Terminated(Termination::InputClosed),
            },
            LoopState::AwaitingReply(message) => {
                match session.send_message(&message, renderer).await {
                    Ok(_) => LoopState::AwaitingInput,
                    Err(err) => {
                        renderer.print_error(&err.to_string());
                        match policy {
                            FailurePolicy::FailFast => {
                                LoopState::Terminated(Termination::RemoteFailure(err))
                            }
                            FailurePolicy::Resume => LoopState::AwaitingInput,
                        }
                    }
                }
            }
            LoopState::Terminated(termination) => {
                if termination.is_success() {
                    renderer.print_info("Goodbye!");
                }
                return Ok(termination);
            }
        };
    }
}

fn on_line<B: ChatBackend>(
    session: &mut ChatSession<B>,
    reader: &mut dyn LineReader,
    renderer: &mut dyn Renderer,
    line: String,
) -> LoopState {
    let line = line.trim();
    if line.is_empty() {
        return LoopState::AwaitingInput;
    }
    reader.remember(line);

    let Some(command) = parse_command(line) else {
        return LoopState::AwaitingReply(line.to_string());
    };
    match command {
        ChatCommand::Quit => return LoopState::Terminated(Termination::UserExit),
        ChatCommand::Clear => {
            session.clear();
            renderer.print_info("Conversation cleared; the project context is kept.");
        }
        ChatCommand::Help => {
            for line in help_text().lines() {
                renderer.print_info(&format!("    {line}"));
            }
        }
        ChatCommand::Stats => {
            for line in describe_stats(&session.stats()) {
                renderer.print_info(&line);
            }
        }
        ChatCommand::Invalid(message) => renderer.print_error(&message),
    }
    LoopState::AwaitingInput
}

/// Lines printed by `/stats`.
pub fn describe_stats(stats: &SessionStats) -> Vec<String> {
    let mut lines = vec![
        "    Session Statistics:".to_string(),
        format!("      Model: {}", stats.model),
        format!("      Messages: {}", stats.message_count),
        format!("      Context: {} bytes", stats.context_bytes),
        format!(
            "      Streaming: {}",
            if stats.streaming { "on" } else { "off" }
        ),
        format!(
            "      Requests: {} ok, {} failed",
            stats.total_requests, stats.failed_requests
        ),
        format!(
            "      Total tokens: {} in / {} out",
            stats.total_prompt_tokens, stats.total_reply_tokens
        ),
    ];
    if let Some(last) = stats.last_turn {
        lines.push(format!(
            "      Last turn tokens: {} in / {} out",
            last.prompt_token_count, last.candidates_token_count
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::context::ProjectContext;
    use crate::input::ScriptedReader;
    use crate::types::{GenerateContentRequest, GenerateContentResponse, KnownModel, Model};

    /// Echoes the last user turn, or fails on "fail".
    #[derive(Default)]
    struct Echo {
        calls: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl ChatBackend for Echo {
        async fn generate(
            &self,
            _: &Model,
            request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            *self.calls.lock().unwrap() += 1;
            let last = request.contents.last().map(|c| c.text()).unwrap_or_default();
            if last == "fail" {
                return Err(Error::internal_server("boom"));
            }
            Ok(GenerateContentResponse::from_text(format!("echo: {last}")))
        }
    }

    #[derive(Default)]
    struct Recorder {
        info: Vec<String>,
        errors: Vec<String>,
        replies: Vec<String>,
    }

    impl Renderer for Recorder {
        fn print_banner(&mut self, _: &str, _: &[String]) {}
        fn print_menu_entry(&mut self, _: u32, _: &str, _: &str) {}
        fn print_info(&mut self, info: &str) {
            self.info.push(info.to_string());
        }
        fn print_success(&mut self, _: &str) {}
        fn print_error(&mut self, error: &str) {
            self.errors.push(error.to_string());
        }
        fn finish_context(&mut self, _: &ProjectContext) {}
        fn start_reply(&mut self, _: &str) {}
        fn print_reply(&mut self, text: &str) {
            self.replies.push(text.to_string());
        }
        fn finish_reply(&mut self) {}
        fn print_interrupted(&mut self) {}
    }

    fn session() -> ChatSession<Echo> {
        ChatSession::new(
            Echo::default(),
            Model::Known(KnownModel::Gemini25Flash),
            "system",
            "CONTEXT",
        )
    }

    async fn run(
        lines: &[&str],
        policy: FailurePolicy,
    ) -> (Termination, ChatSession<Echo>, Recorder, ScriptedReader) {
        let mut session = session();
        let mut reader = ScriptedReader::new(lines.iter().copied());
        let mut renderer = Recorder::default();
        let termination = run_chat_loop(&mut session, &mut reader, &mut renderer, policy)
            .await
            .unwrap();
        (termination, session, renderer, reader)
    }

    #[tokio::test]
    async fn exit_word_ends_without_requests() {
        let (termination, session, _, _) = run(&["EXIT"], FailurePolicy::FailFast).await;
        assert!(matches!(termination, Termination::UserExit));
        assert_eq!(*session.backend().calls.lock().unwrap(), 0);
        assert_eq!(session.message_count(), 1);
    }

    #[tokio::test]
    async fn messages_are_sent_in_order() {
        let (termination, session, renderer, _) =
            run(&["first", "  ", "second", "quit"], FailurePolicy::FailFast).await;
        assert!(matches!(termination, Termination::UserExit));
        assert_eq!(renderer.replies, vec!["echo: first", "echo: second"]);
        assert_eq!(session.message_count(), 5);
        assert_eq!(*session.backend().calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn eof_closes_input() {
        let (termination, _, renderer, _) = run(&["hello"], FailurePolicy::FailFast).await;
        assert!(matches!(termination, Termination::InputClosed));
        assert!(termination.is_success());
        assert_eq!(renderer.info.last().map(String::as_str), Some("Goodbye!"));
    }

    #[tokio::test]
    async fn failure_terminates_by_default() {
        let (termination, session, renderer, reader) =
            run(&["fail", "never sent"], FailurePolicy::FailFast).await;
        match termination {
            Termination::RemoteFailure(err) => assert!(err.is_server_error()),
            other => panic!("unexpected termination: {other:?}"),
        }
        assert_eq!(renderer.errors.len(), 1);
        assert_eq!(reader.remaining(), 1);
        assert_eq!(session.message_count(), 1);
    }

    #[tokio::test]
    async fn failure_resumes_when_asked() {
        let (termination, session, renderer, _) =
            run(&["fail", "again", "exit"], FailurePolicy::Resume).await;
        assert!(matches!(termination, Termination::UserExit));
        assert_eq!(renderer.errors.len(), 1);
        assert_eq!(renderer.replies, vec!["echo: again"]);
        assert_eq!(session.message_count(), 3);
        assert_eq!(session.history()[1].text(), "again");
    }

    #[tokio::test]
    async fn commands_do_not_reach_the_backend() {
        let (_, session, renderer, _) =
            run(&["hi", "/stats", "/clear", "/stats now", "/help", "/quit"], FailurePolicy::FailFast)
                .await;
        assert_eq!(*session.backend().calls.lock().unwrap(), 1);
        assert_eq!(session.message_count(), 1);
        assert!(renderer.info.iter().any(|line| line.contains("Messages: 3")));
        assert_eq!(renderer.errors, vec!["/stats takes no argument".to_string()]);
        assert!(renderer.info.iter().any(|line| line.contains("/clear")));
    }

    #[tokio::test]
    async fn questions_starting_with_a_slash_are_sent() {
        let (termination, session, renderer, _) = run(
            &["/src/main.rs looks wrong, why?", "exit"],
            FailurePolicy::FailFast,
        )
        .await;
        assert!(matches!(termination, Termination::UserExit));
        assert!(renderer.errors.is_empty());
        assert_eq!(
            renderer.replies,
            vec!["echo: /src/main.rs looks wrong, why?"]
        );
        assert_eq!(session.message_count(), 3);
    }

    #[tokio::test]
    async fn interrupt_at_prompt_is_ignored() {
        let mut session = session();
        let mut reader = ScriptedReader::from_inputs([
            Input::Interrupted,
            Input::Line("still here".into()),
            Input::Line("exit".into()),
        ]);
        let mut renderer = Recorder::default();
        let termination =
            run_chat_loop(&mut session, &mut reader, &mut renderer, FailurePolicy::FailFast)
                .await
                .unwrap();
        assert!(matches!(termination, Termination::UserExit));
        assert_eq!(renderer.replies, vec!["echo: still here"]);
    }
}
