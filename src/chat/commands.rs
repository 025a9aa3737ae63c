//! Command parsing for the chat loop.
//!
//! A line whose first word is one of the known `/` commands controls the
//! session and is never sent to the API.  The bare words `exit` and `quit` end
//! the session as well.  Everything else, including lines that merely start
//! with `/`, is a question for the model.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Reset the conversation to the project context.
    Clear,

    /// Display help information.
    Help,

    /// End the session.
    Quit,

    /// Display session statistics.
    Stats,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Returns true for the exit words, ignoring case and surrounding whitespace.
pub fn is_exit_word(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Parses user input for commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a regular message.
///
/// # Examples
///
/// ```
/// # use geminus::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert_eq!(parse_command("EXIT"), Some(ChatCommand::Quit));
/// assert!(parse_command("Explain the architecture").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if is_exit_word(input) {
        return Some(ChatCommand::Quit);
    }
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default().to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" | "reset" => no_argument(ChatCommand::Clear, "/clear", argument),
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => no_argument(ChatCommand::Stats, "/stats", argument),
        _ => return None,
    };

    Some(result)
}

fn no_argument(command: ChatCommand, name: &str, argument: Option<&str>) -> ChatCommand {
    match argument {
        Some(_) => ChatCommand::Invalid(format!("{name} takes no argument")),
        None => command,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /clear                 Forget the conversation, keep the project context
  /stats                 Show session statistics
  /help                  Show this help message
  /quit, exit, quit      Exit the chat"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn exit_words_any_case() {
        for word in ["exit", "quit", "EXIT", "Quit", "  exit\t", "qUiT\n"] {
            assert!(is_exit_word(word), "{word:?}");
            assert_eq!(parse_command(word), Some(ChatCommand::Quit));
        }
        assert!(!is_exit_word("exit now"));
        assert!(!is_exit_word("exiting"));
        assert_eq!(parse_command("please quit"), None);
    }

    #[test]
    fn parse_clear() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
        assert!(matches!(
            parse_command("/clear everything"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("no argument")
        ));
    }

    #[test]
    fn parse_stats_and_help() {
        assert_eq!(parse_command("/stats"), Some(ChatCommand::Stats));
        assert_eq!(parse_command("/help"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/?"), Some(ChatCommand::Help));
    }

    #[test]
    fn unknown_slash_words_are_messages() {
        assert_eq!(parse_command("/src/main.rs looks wrong, why?"), None);
        assert_eq!(parse_command("/model gemini-2.5-pro"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/helpful tips?"), None);
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Explain the architecture"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
        assert_eq!(parse_command("path/to/file"), None);
    }

    #[test]
    fn help_text_not_empty() {
        let help = help_text();
        assert!(help.contains("/quit"));
        assert!(help.contains("/clear"));
        assert!(help.contains("/stats"));
    }
}
