//! Configuration types for the analyzer.
//!
//! This module provides CLI argument parsing via `arrrg`, the optional YAML
//! configuration file, and the resolved [`AnalyzerConfig`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::context::ContextConfig;
use crate::selector::{DEFAULT_MODEL_KEY, ModelDescriptor, ModelTable};
use crate::{Error, Result};

/// The system instruction sent with every request unless overridden.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a Senior Software Architect. You have access to the entire source code below. Your answers must be technical, precise, and cite the relevant files.";

/// Default HTTP timeout, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default number of retries for a failed request.
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Command-line arguments for the geminus-analyze tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct AnalyzerArgs {
    /// Model key or identifier; skips the menu.
    #[arrrg(optional, "Model key (1-3) or identifier; skips the menu", "MODEL")]
    pub model: Option<String>,

    /// Root of the project to analyze.
    #[arrrg(optional, "Project root to analyze (default: .)", "DIR")]
    pub root: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "YAML file overriding ignore lists, models and system instruction", "FILE")]
    pub config: Option<String>,

    /// System instruction for the model.
    #[arrrg(optional, "System instruction for the model", "PROMPT")]
    pub system: Option<String>,

    /// API key; falls back to GEMINUS_API_KEY then GEMINI_API_KEY.
    #[arrrg(optional, "API key (default: $GEMINUS_API_KEY or $GEMINI_API_KEY)", "KEY")]
    pub api_key: Option<String>,

    /// Base URL of the API.
    #[arrrg(optional, "Base URL of the Gemini API", "URL")]
    pub base_url: Option<String>,

    /// HTTP timeout in seconds.
    #[arrrg(optional, "HTTP timeout in seconds (default: 300)", "SECS")]
    pub timeout_secs: Option<u64>,

    /// Retries for transient failures.
    #[arrrg(optional, "Retries for transient failures (default: 2)", "N")]
    pub max_retries: Option<u32>,

    /// Stream replies as they are generated.
    #[arrrg(flag, "Stream replies as they are generated")]
    pub stream: bool,

    /// Keep chatting after a failed request.
    #[arrrg(flag, "Keep chatting after a failed request")]
    pub resume_on_error: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Append request/response records to this file as JSON lines.
    #[arrrg(optional, "Append API requests and responses to FILE as JSON lines", "FILE")]
    pub log_file: Option<String>,
}

/// What the chat loop does after a failed request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Report the failure and end the session.
    #[default]
    FailFast,
    /// Report the failure, drop the failed turn and keep reading input.
    Resume,
}

/// Contents of the optional YAML configuration file.
///
/// Every field is optional; absent fields keep their defaults.
///
/// ```yaml
/// ignore_dirs: [.git, target, node_modules]
/// ignore_extensions: [png, lock]
/// default_model: 2
/// models:
///   - key: 1
///     id: gemini-2.5-flash
///     description: Fast
///   - key: 2
///     id: gemini-2.5-pro
///     description: Thorough
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub ignore_dirs: Option<Vec<String>>,
    pub ignore_extensions: Option<Vec<String>>,
    pub models: Option<Vec<ModelDescriptor>>,
    pub default_model: Option<u32>,
    pub system_instruction: Option<String>,
}

impl ConfigFile {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        Self::from_yaml(&yaml)
    }

    /// Apply this file on top of `config`.
    pub fn apply(self, mut config: AnalyzerConfig) -> Result<AnalyzerConfig> {
        if let Some(dirs) = self.ignore_dirs {
            config.context = config.context.with_ignore_dirs(dirs);
        }
        if let Some(extensions) = self.ignore_extensions {
            config.context = config.context.with_ignore_extensions(extensions);
        }
        if self.models.is_some() || self.default_model.is_some() {
            let entries = self
                .models
                .unwrap_or_else(|| config.models.entries().to_vec());
            let default_key = self.default_model.unwrap_or(DEFAULT_MODEL_KEY);
            config.models = ModelTable::new(entries, default_key)?;
        }
        if let Some(instruction) = self.system_instruction {
            config.system_instruction = instruction;
        }
        Ok(config)
    }
}

/// Resolved configuration for one run of the analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Which files make up the project context.
    pub context: ContextConfig,

    /// The model menu.
    pub models: ModelTable,

    /// Model chosen on the command line, as a key or identifier.
    pub model: Option<String>,

    /// System instruction sent with every request.
    pub system_instruction: String,

    /// Explicit API key; the environment is consulted when `None`.
    pub api_key: Option<String>,

    /// Base URL override for the API.
    pub base_url: Option<String>,

    /// HTTP timeout.
    pub timeout: Duration,

    /// Retries for transient failures.
    pub max_retries: u32,

    /// Whether to stream replies.
    pub streaming: bool,

    /// What to do after a failed request.
    pub failure_policy: FailurePolicy,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// JSON-lines request log.
    pub log_file: Option<PathBuf>,
}

impl AnalyzerConfig {
    /// Creates a new AnalyzerConfig with default values.
    ///
    /// Defaults:
    /// - Root: the current directory
    /// - Models: the built-in three-entry menu, default key 1
    /// - Timeout: 300 seconds, 2 retries
    /// - Not streaming, fail fast, color enabled
    pub fn new() -> Self {
        Self {
            context: ContextConfig::default(),
            models: ModelTable::default(),
            model: None,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            api_key: None,
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            streaming: false,
            failure_policy: FailurePolicy::FailFast,
            use_color: true,
            log_file: None,
        }
    }

    /// Sets the project root.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.context.root = root.into();
        self
    }

    /// Sets the model choice, skipping the menu.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the system instruction.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets whether replies are streamed.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<AnalyzerArgs> for AnalyzerConfig {
    type Error = Error;

    /// Resolve arguments: defaults, then the config file, then explicit flags.
    fn try_from(args: AnalyzerArgs) -> Result<Self> {
        let mut config = AnalyzerConfig::new();
        if let Some(path) = &args.config {
            config = ConfigFile::load(path)?.apply(config)?;
        }
        if let Some(root) = args.root {
            config.context.root = PathBuf::from(root);
        }
        if let Some(system) = args.system {
            config.system_instruction = system;
        }
        if let Some(secs) = args.timeout_secs {
            if secs == 0 {
                return Err(Error::validation(
                    "timeout must be positive",
                    Some("timeout-secs".to_string()),
                ));
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = args.max_retries {
            config.max_retries = retries;
        }
        config.model = args.model;
        config.api_key = args.api_key;
        config.base_url = args.base_url;
        config.streaming = args.stream;
        config.failure_policy = if args.resume_on_error {
            FailurePolicy::Resume
        } else {
            FailurePolicy::FailFast
        };
        config.use_color = !args.no_color;
        config.log_file = args.log_file.map(PathBuf::from);
        Ok(config)
    }
}
