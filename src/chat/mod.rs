//! Interactive conversation about a project.
//!
//! This module provides the REPL built on top of the client library:
//!
//! - A session seeded with the project context as its first turn
//! - Whole or streamed replies, highlighted as they are printed
//! - Commands for session control
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Conversation state and API interaction
//! - [`commands`]: Command parsing
//! - [`repl`]: The loop state machine

mod commands;
mod config;
mod repl;
mod session;

pub use commands::{ChatCommand, help_text, is_exit_word, parse_command};
pub use config::{
    AnalyzerArgs, AnalyzerConfig, ConfigFile, DEFAULT_SYSTEM_INSTRUCTION, FailurePolicy,
};
pub use repl::{CHAT_PROMPT, LoopState, Termination, describe_stats, run_chat_loop};
pub use session::{ChatSession, REPLY_LABEL, SessionStats, TurnOutcome};
