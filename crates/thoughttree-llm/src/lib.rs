pub mod ollama;
pub mod provider;

pub use ollama::{OllamaConfig, OllamaProvider};
pub use provider::{LlmProvider, LlmResponse, LlmStream};
