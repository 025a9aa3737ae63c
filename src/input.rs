//! Line-oriented user input.

use std::collections::VecDeque;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::Result;

/// One read from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A line of text, without its line terminator.
    Line(String),
    /// The user pressed Ctrl-C at the prompt.
    Interrupted,
    /// Standard input is closed (Ctrl-D or end of a pipe).
    Eof,
}

/// Source of user lines.
pub trait LineReader {
    /// Show `prompt` and read one line.
    fn read_line(&mut self, prompt: &str) -> Result<Input>;

    /// Record a line that was accepted as a chat message.
    fn remember(&mut self, line: &str) {
        _ = line;
    }
}

impl LineReader for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> Result<Input> {
        match self.readline(prompt) {
            Ok(line) => Ok(Input::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Ok(Input::Eof),
            Err(err) => Err(err.into()),
        }
    }

    fn remember(&mut self, line: &str) {
        let _ = self.add_history_entry(line);
    }
}

/// A reader that replays a fixed list of inputs, then reports end of input.
#[derive(Debug, Clone, Default)]
pub struct ScriptedReader {
    inputs: VecDeque<Input>,
    prompts: Vec<String>,
}

impl ScriptedReader {
    /// Replay `lines` as plain lines.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_inputs(lines.into_iter().map(|line| Input::Line(line.into())))
    }

    /// Replay arbitrary inputs, including interrupts.
    pub fn from_inputs(inputs: impl IntoIterator<Item = Input>) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
            prompts: Vec::new(),
        }
    }

    /// The prompts shown so far.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Number of inputs not yet consumed.
    pub fn remaining(&self) -> usize {
        self.inputs.len()
    }
}

impl LineReader for ScriptedReader {
    fn read_line(&mut self, prompt: &str) -> Result<Input> {
        self.prompts.push(prompt.to_string());
        Ok(self.inputs.pop_front().unwrap_or(Input::Eof))
    }
}
