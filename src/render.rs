//! Terminal output.
//!
//! This module provides a trait-based rendering abstraction so the chat loop
//! and the model selector never write to the terminal directly.  The default
//! implementation uses ANSI escape codes and highlights fenced code blocks in
//! replies.

use std::io::{self, Stdout, Write};

use crate::context::{ContextProgress, PROGRESS_INTERVAL, ProjectContext, SkipReason};
use crate::highlight::{FenceHighlighter, PROSE_COLOR, highlight_code_blocks};

/// ANSI escape code for bold text.
const ANSI_BRIGHT: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for menus and the reply label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for prompts and progress).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (used for the user prompt and success).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for blue text (used for the session banner).
const ANSI_BLUE: &str = "\x1b[34m";

/// Kinds of prompt shown before reading a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Asking for a model number.
    Selection,
    /// Asking for the next chat message.
    Chat,
}

/// Trait for rendering all user-facing output.
pub trait Renderer: Send {
    /// Decorate a prompt before it is handed to the line reader.
    fn prompt(&self, kind: PromptKind, text: &str) -> String {
        _ = kind;
        text.to_string()
    }

    /// Print a heading followed by lines, e.g. the menu title or the session banner.
    fn print_banner(&mut self, title: &str, lines: &[String]);

    /// Print one entry of the model menu.
    fn print_menu_entry(&mut self, key: u32, name: &str, description: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print a success message.
    fn print_success(&mut self, message: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Called when the context builder starts reading files.
    fn start_context(&mut self) {}

    /// Called after each file added to the context, with the running count.
    fn context_file_loaded(&mut self, count: usize) {
        _ = count;
    }

    /// Called once the context is complete.
    fn finish_context(&mut self, context: &ProjectContext) {
        _ = context;
    }

    /// Called before the first chunk of a reply.
    fn start_reply(&mut self, speaker: &str);

    /// Print a chunk of a reply.
    ///
    /// This is called once with the whole reply, or incrementally as chunks are
    /// streamed.
    fn print_reply(&mut self, text: &str);

    /// Called when a reply is complete.
    fn finish_reply(&mut self);

    /// Print a reply that arrived in one piece.
    fn print_complete_reply(&mut self, speaker: &str, text: &str) {
        self.start_reply(speaker);
        self.print_reply(text);
        self.finish_reply();
    }

    /// Called when a streamed reply is interrupted by the user.
    fn print_interrupted(&mut self);
}

/// Adapts a [`Renderer`] to the context builder's progress callbacks.
pub struct RenderProgress<'a> {
    renderer: &'a mut dyn Renderer,
}

impl<'a> RenderProgress<'a> {
    /// Wrap a renderer.
    pub fn new(renderer: &'a mut dyn Renderer) -> Self {
        renderer.start_context();
        Self { renderer }
    }
}

impl ContextProgress for RenderProgress<'_> {
    fn file_included(&mut self, count: usize) {
        self.renderer.context_file_loaded(count);
    }

    fn finished(&mut self, context: &ProjectContext) {
        self.renderer.finish_context(context);
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// This renderer outputs text directly to stdout.  Replies are passed through
/// a [`FenceHighlighter`] so code blocks stand out.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    highlighter: FenceHighlighter,
    in_reply: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            highlighter: FenceHighlighter::new(use_color),
            in_reply: false,
        }
    }

    /// Returns true if ANSI styling is enabled.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn reply_header(&self, speaker: &str) -> String {
        if self.use_color {
            format!("\n{ANSI_CYAN}{speaker}: {ANSI_RESET}{PROSE_COLOR}")
        } else {
            format!("\n{speaker}: ")
        }
    }

    /// The full terminal output for a reply that arrived in one piece.
    fn format_complete_reply(&self, speaker: &str, text: &str) -> String {
        let mut out = self.reply_header(speaker);
        out.push_str(&highlight_code_blocks(text, self.use_color));
        if self.use_color {
            out.push_str(ANSI_RESET);
        }
        out.push('\n');
        out
    }

    fn end_reply(&mut self) {
        if self.in_reply {
            let rest = self.highlighter.finish();
            print!("{rest}");
            if self.use_color {
                print!("{ANSI_RESET}");
            }
            self.highlighter = FenceHighlighter::new(self.use_color);
            self.in_reply = false;
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn prompt(&self, kind: PromptKind, text: &str) -> String {
        match kind {
            PromptKind::Selection => self.paint(ANSI_YELLOW, text),
            PromptKind::Chat => self.paint(ANSI_GREEN, text),
        }
    }

    fn print_banner(&mut self, title: &str, lines: &[String]) {
        self.end_reply();
        if self.use_color {
            println!("\n{ANSI_BLUE}{ANSI_BRIGHT}{title}{ANSI_RESET}");
        } else {
            println!("\n{title}");
        }
        for line in lines {
            println!("{}", self.paint(ANSI_BLUE, line));
        }
        self.flush();
    }

    fn print_menu_entry(&mut self, key: u32, name: &str, description: &str) {
        if self.use_color {
            println!("{ANSI_CYAN}[{key}]{ANSI_RESET} {ANSI_BRIGHT}{name}{ANSI_RESET}: {description}");
        } else {
            println!("[{key}] {name}: {description}");
        }
    }

    fn print_info(&mut self, info: &str) {
        self.end_reply();
        println!("{info}");
    }

    fn print_success(&mut self, message: &str) {
        self.end_reply();
        println!("{}", self.paint(ANSI_GREEN, message));
    }

    fn print_error(&mut self, error: &str) {
        self.end_reply();
        eprintln!("\n{}", self.paint(ANSI_RED, &format!("Error: {error}")));
    }

    fn start_context(&mut self) {
        print!("{}", self.paint(ANSI_YELLOW, "Reading files..."));
        self.flush();
    }

    fn context_file_loaded(&mut self, count: usize) {
        if count % PROGRESS_INTERVAL == 0 {
            print!("{}", self.paint(ANSI_YELLOW, "."));
            self.flush();
        }
    }

    fn finish_context(&mut self, context: &ProjectContext) {
        println!();
        let summary = format!(
            "\u{2705} {} files loaded into the context ({} bytes).",
            context.file_count(),
            context.text().len()
        );
        println!("{}", self.paint(ANSI_GREEN, &summary));
        let unreadable = context
            .skipped()
            .iter()
            .filter(|(_, reason)| *reason != SkipReason::IgnoredExtension)
            .count();
        if unreadable > 0 {
            println!("{unreadable} unreadable files skipped.");
        }
        self.flush();
    }

    fn start_reply(&mut self, speaker: &str) {
        self.end_reply();
        print!("{}", self.reply_header(speaker));
        self.in_reply = true;
        self.flush();
    }

    fn print_reply(&mut self, text: &str) {
        let text = self.highlighter.push(text);
        print!("{text}");
        self.flush();
    }

    fn finish_reply(&mut self) {
        self.end_reply();
        println!();
        self.flush();
    }

    fn print_complete_reply(&mut self, speaker: &str, text: &str) {
        self.end_reply();
        print!("{}", self.format_complete_reply(speaker, text));
        self.flush();
    }

    fn print_interrupted(&mut self) {
        self.end_reply();
        println!("\n[interrupted]");
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color());
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color());
        assert_eq!(renderer.prompt(PromptKind::Chat, "You: "), "You: ");
    }

    #[test]
    fn complete_reply_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert_eq!(
            renderer.format_complete_reply("Gemini", "Use:\n```rust\nfn x() {}\n```"),
            "\nGemini: Use:\n```rust\nfn x() {}\n```\n"
        );
    }

    #[test]
    fn complete_reply_highlights_code() {
        use crate::highlight::HIGHLIGHT_COLOR;

        let renderer = PlainTextRenderer::with_color(true);
        assert_eq!(
            renderer.format_complete_reply("Gemini", "a ```b``` c"),
            format!(
                "\n{ANSI_CYAN}Gemini: {ANSI_RESET}{PROSE_COLOR}a {HIGHLIGHT_COLOR}```b```{PROSE_COLOR} c{ANSI_RESET}\n"
            )
        );
    }

    #[test]
    fn colored_prompts() {
        let renderer = PlainTextRenderer::with_color(true);
        assert_eq!(
            renderer.prompt(PromptKind::Chat, "You: "),
            format!("{ANSI_GREEN}You: {ANSI_RESET}")
        );
    }
}
