//! AI assistant client for retail inventory: categorizes items and suggests
//! category merges through any OpenAI-compatible chat-completions endpoint.

pub mod config;
pub mod error;
pub mod llm;

pub use config::{AiConfig, Provider};
pub use error::AssistantError;
pub use llm::{
    Assistant, BatchHandler, CategorizationItem, CategoryUpdate, ConnectionStatus,
    MergeSuggestion, DEFAULT_BATCH_SIZE,
};
