use async_trait::async_trait;
use futures::stream::BoxStream;
use thoughttree_core::{GenerationConfig, Message, Result};

/// Response from a chat completion
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text content
    pub content: String,
    /// Tokens consumed by the prompt, when the provider reports them
    pub prompt_tokens: Option<usize>,
    /// Tokens generated in the completion
    pub completion_tokens: Option<usize>,
    /// Model that produced the reply
    pub model: String,
}

/// Incremental content yielded by a streaming completion
pub type LlmStream = BoxStream<'static, Result<String>>;

/// Main trait for LLM providers.
///
/// The search engine only depends on this seam, so tests drive it with a
/// scripted in-process implementation instead of a live endpoint.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a chat completion with message history
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<LlmResponse>;

    /// Generate a chat completion, yielding content increments as they arrive
    async fn generate_chat_stream(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<LlmStream>;

    /// Check if the provider is available and ready
    async fn is_available(&self) -> bool;

    /// Get the model identifier
    fn model_name(&self) -> &str;
}
