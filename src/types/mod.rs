// Public modules
pub mod content;
pub mod finish_reason;
pub mod generate_content_request;
pub mod generate_content_response;
pub mod model;
pub mod usage_metadata;

// Re-exports
pub use content::{Content, Part, Role};
pub use finish_reason::FinishReason;
pub use generate_content_request::GenerateContentRequest;
pub use generate_content_response::{Candidate, GenerateContentResponse, PromptFeedback};
pub use model::{KnownModel, Model};
pub use usage_metadata::UsageMetadata;
