use crate::provider::{LlmProvider, LlmResponse, LlmStream};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thoughttree_core::{GenerationConfig, Message, Result, ThoughtTreeError};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Configuration for the Ollama chat provider
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub model_name: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model_name: "llama3.1:8b".to_string(),
            base_url: "http://localhost:11434".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_ctx: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

impl OllamaOptions {
    fn from_config(config: &GenerationConfig) -> Self {
        Self {
            num_ctx: config.context_window,
            temperature: config.temperature,
            num_predict: config.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

fn parse_chunk_line(line: &str) -> Result<OllamaChatResponse> {
    serde_json::from_str(line)
        .map_err(|e| ThoughtTreeError::Parse(format!("bad Ollama stream chunk: {e}")))
}

/// Chat client for a local Ollama server (`/api/chat`)
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn post_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = OllamaChatRequest {
            model: &self.config.model_name,
            messages,
            stream,
            options: OllamaOptions::from_config(config),
        };

        debug!(
            model = %self.config.model_name,
            messages = messages.len(),
            num_ctx = config.context_window,
            "sending chat request"
        );

        let response = timeout(
            self.config.timeout,
            self.client
                .post(format!("{}/api/chat", self.config.base_url))
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| {
            ThoughtTreeError::Timeout(format!(
                "Ollama request timed out after {:?}",
                self.config.timeout
            ))
        })?
        .map_err(|e| ThoughtTreeError::Network(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ThoughtTreeError::Provider(format!(
                "Ollama API error ({status}): {error_text}"
            )));
        }

        Ok(response)
    }

    /// Check whether the configured model is served by the endpoint
    pub async fn check_availability(&self) -> Result<bool> {
        debug!("checking Ollama availability at {}", self.config.base_url);

        let response = timeout(
            Duration::from_secs(5),
            self.client
                .get(format!("{}/api/tags", self.config.base_url))
                .send(),
        )
        .await
        .map_err(|_| ThoughtTreeError::Timeout("Ollama availability check timed out".into()))?
        .map_err(|e| ThoughtTreeError::Network(format!("availability check failed: {e}")))?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let tags: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ThoughtTreeError::Parse(format!("bad tags response: {e}")))?;

        let wanted = self.config.model_name.as_str();
        let present = tags["models"]
            .as_array()
            .map(|models| {
                models.iter().any(|model| {
                    model["name"]
                        .as_str()
                        .map(|name| name == wanted || name.starts_with(wanted))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        info!(model = wanted, available = present, "Ollama model availability");
        Ok(present)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<LlmResponse> {
        let start = Instant::now();
        let response = self.post_chat(messages, config, false).await?;

        let data: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ThoughtTreeError::Parse(format!("bad Ollama response: {e}")))?;

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_tokens = ?data.prompt_eval_count,
            completion_tokens = ?data.eval_count,
            "chat completion finished"
        );

        Ok(LlmResponse {
            content: data.message.content,
            prompt_tokens: data.prompt_eval_count,
            completion_tokens: data.eval_count,
            model: self.config.model_name.clone(),
        })
    }

    async fn generate_chat_stream(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<LlmStream> {
        let response = self.post_chat(messages, config, true).await?;
        let mut body = response.bytes_stream();

        let chunks = stream! {
            let mut buf: Vec<u8> = Vec::new();
            while let Some(piece) = body.next().await {
                let piece = match piece {
                    Ok(piece) => piece,
                    Err(e) => {
                        yield Err(ThoughtTreeError::Network(format!(
                            "Ollama stream failed: {e}"
                        )));
                        return;
                    }
                };
                buf.extend_from_slice(&piece);

                // NDJSON: one chunk object per newline-terminated line
                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match parse_chunk_line(line) {
                        Ok(chunk) => {
                            if !chunk.message.content.is_empty() {
                                yield Ok(chunk.message.content);
                            }
                            if chunk.done {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("dropping malformed stream line: {e}");
                        }
                    }
                }
            }
        };

        Ok(Box::pin(chunks))
    }

    async fn is_available(&self) -> bool {
        self.check_availability().await.unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}
