//! One run of the analyzer: pick a model, check the credential, build the
//! context, then chat.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::chat::{AnalyzerConfig, ChatSession, Termination, run_chat_loop};
use crate::client::{ChatBackend, resolve_api_key};
use crate::context::{ProjectContext, build_context};
use crate::error::Result;
use crate::input::LineReader;
use crate::render::{RenderProgress, Renderer};
use crate::selector::{ModelDescriptor, choose_model};

/// What a finished run leaves behind.
pub struct RunReport<B: ChatBackend> {
    /// The model the session talked to.
    pub model: ModelDescriptor,
    /// Number of files in the project context.
    pub file_count: usize,
    /// The session, with its final history.
    pub session: ChatSession<B>,
    /// Why the chat loop ended.
    pub termination: Termination,
}

/// Drives the whole program flow for one configuration.
pub struct Analyzer {
    config: AnalyzerConfig,
    interrupted: Arc<AtomicBool>,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share the flag a Ctrl-C handler sets.
    pub fn with_interrupt_flag(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// The model given on the command line, or the user's pick from the menu.
    pub fn select_model(
        &self,
        reader: &mut dyn LineReader,
        renderer: &mut dyn Renderer,
    ) -> Result<ModelDescriptor> {
        match &self.config.model {
            Some(choice) => {
                let model = self.config.models.resolve(choice)?;
                renderer.print_success(&format!("Selected model: {}", model.id));
                Ok(model)
            }
            None => choose_model(&self.config.models, reader, renderer),
        }
    }

    /// Walk the project root.
    pub fn build_context(&self, renderer: &mut dyn Renderer) -> ProjectContext {
        build_context(&self.config.context, &mut RenderProgress::new(renderer))
    }

    /// Run to completion.
    ///
    /// `connect` turns the resolved API key into a backend; it is only called
    /// after a model was chosen and the context was built.
    ///
    /// # Errors
    ///
    /// Fails without contacting the backend when no model is chosen or no API
    /// key is available.  Remote failures end the loop and are reported in
    /// [`RunReport::termination`].
    pub async fn run<B, F>(
        &self,
        reader: &mut dyn LineReader,
        renderer: &mut dyn Renderer,
        connect: F,
    ) -> Result<RunReport<B>>
    where
        B: ChatBackend,
        F: FnOnce(&AnalyzerConfig, String) -> Result<B>,
    {
        let model = self.select_model(reader, renderer)?;
        let api_key = resolve_api_key(self.config.api_key.clone())?;

        let context = self.build_context(renderer);
        let file_count = context.file_count();
        let backend = connect(&self.config, api_key)?;
        let mut session = ChatSession::new(
            backend,
            model.id.clone(),
            self.config.system_instruction.clone(),
            context.into_text(),
        )
        .with_streaming(self.config.streaming)
        .with_interrupt_flag(Arc::clone(&self.interrupted));

        renderer.print_banner(
            "--- GEMINI PROJECT ANALYZER ACTIVE ---",
            &[
                format!("Model: {}", model.id),
                "The project context is ready. Ask your questions (e.g. 'Explain the architecture', 'Are there any bugs?')".to_string(),
                "Type /help for commands, exit to quit.".to_string(),
            ],
        );

        let termination = run_chat_loop(
            &mut session,
            reader,
            renderer,
            self.config.failure_policy,
        )
        .await?;
        Ok(RunReport {
            model,
            file_count,
            session,
            termination,
        })
    }
}
