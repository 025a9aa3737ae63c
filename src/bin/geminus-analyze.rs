//! Ask questions about a source tree.
//!
//! The whole project under the root directory is sent to Gemini as the first
//! turn of a conversation; every question afterwards is answered with that
//! context in view.
//!
//! # Usage
//!
//! ```bash
//! # Analyze the current directory, choosing the model from the menu
//! GEMINI_API_KEY=... geminus-analyze
//!
//! # Analyze another tree with the second model, streaming replies
//! geminus-analyze --root ../service --model 2 --stream
//!
//! # Override ignore lists and the model menu
//! geminus-analyze --config geminus.yaml
//! ```
//!
//! # Commands
//!
//! - `exit` or `quit` - Leave the session
//! - `/help` - Show available commands
//! - `/clear` - Forget the conversation, keep the project context
//! - `/stats` - Show session statistics

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;

use geminus::chat::{AnalyzerArgs, AnalyzerConfig};
use geminus::render::{PlainTextRenderer, Renderer};
use geminus::{Analyzer, Gemini, JsonLinesLogger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, free) = AnalyzerArgs::from_command_line_relaxed("geminus-analyze [OPTIONS]");
    if !free.is_empty() {
        eprintln!("Error: unexpected arguments: {}", free.join(" "));
        std::process::exit(2);
    }
    let config = match AnalyzerConfig::try_from(args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(2);
        }
    };
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut editor = DefaultEditor::new()?;

    // Flag for interrupt handling while a reply is pending
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    let analyzer = Analyzer::new(config).with_interrupt_flag(interrupted);
    let report = analyzer
        .run(&mut editor, &mut renderer, |config, api_key| {
            let mut client =
                Gemini::with_options(Some(api_key), config.base_url.clone(), Some(config.timeout))?
                    .with_max_retries(config.max_retries);
            if let Some(path) = &config.log_file {
                client = client.with_logger(Arc::new(JsonLinesLogger::open(path)?));
            }
            Ok(client)
        })
        .await;

    match report {
        Ok(report) if report.termination.is_success() => Ok(()),
        Ok(_) => std::process::exit(1),
        Err(err) if err.is_abort() => {
            renderer.print_info("");
            Ok(())
        }
        Err(err) => {
            renderer.print_error(&err.to_string());
            std::process::exit(1);
        }
    }
}
