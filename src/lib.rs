// Public modules
pub mod analyzer;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod context;
pub mod error;
pub mod highlight;
pub mod input;
pub mod observability;
pub mod render;
pub mod selector;
pub mod sse;
pub mod types;

// Re-exports
pub use analyzer::{Analyzer, RunReport};
pub use client::{ChatBackend, Gemini};
pub use client_logger::{ClientLogger, JsonLinesLogger};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use types::*;
