use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub reasoning_content: Option<String>,
    /// Input token count reported by the provider (if available).
    /// Used for precise compaction threshold checks.
    pub input_tokens: Option<u64>,
    /// Output token count reported by the provider (if available).
    /// Used for cost tracking.
    pub output_tokens: Option<u64>,
    /// Anthropic prompt caching: tokens written to cache (billed at 125% of input rate).
    pub cache_creation_input_tokens: Option<u64>,
    /// Anthropic prompt caching: tokens read from cache (billed at 10% of input rate).
    pub cache_read_input_tokens: Option<u64>,
}

impl LLMResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ImageData {
    pub media_type: String, // "image/jpeg", "image/png", etc.
    pub data: String,       // base64-encoded
}

#[derive(Debug, Clone, Default)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    pub tool_call_id: Option<String>,
    /// Whether this tool result represents an error (for role="tool" messages)
    pub is_error: bool,
    /// Base64-encoded images attached to this message
    pub images: Vec<ImageData>,
    /// Thinking/reasoning content from extended-thinking models (Claude, DeepSeek-R1, etc.)
    pub reasoning_content: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn user_with_images(content: impl Into<String>, images: Vec<ImageData>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            images,
            ..Default::default()
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCallRequest>>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
            tool_calls,
            ..Default::default()
        }
    }

    pub fn assistant_with_thinking(
        content: impl Into<String>,
        tool_calls: Option<Vec<ToolCallRequest>>,
        reasoning_content: Option<String>,
    ) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
            tool_calls,
            reasoning_content,
            ..Default::default()
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            is_error,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value, // JSON Schema
}

/// Metrics for provider operations
#[derive(Debug, Clone, Default)]
pub struct ProviderMetrics {
    pub request_count: u64,
    pub token_count: u64,
    pub error_count: u64,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Response format constraint for LLM output.
#[derive(Debug, Clone)]
pub enum ResponseFormat {
    /// Request JSON output. Provider-specific:
    /// - OpenAI/compatible: `{"type": "json_object"}`
    /// - Gemini: `responseMimeType: "application/json"`
    /// - Anthropic: system prompt hint (no native API support)
    JsonObject,
    /// Request output matching a JSON schema (structured outputs).
    /// Falls back to `JsonObject` where unsupported.
    JsonSchema { name: String, schema: Value },
}

/// Parameters for a chat request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub model: Option<&'a str>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Tool choice mode: "auto" (default), "any" (force tool use), or "none".
    pub tool_choice: Option<String>,
    /// Optional response format constraint (JSON mode, structured output).
    pub response_format: Option<ResponseFormat>,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat(&self, req: ChatRequest<'_>) -> anyhow::Result<LLMResponse>;

    fn default_model(&self) -> &str;

    /// Pre-warm the provider's HTTP connection (TLS handshake, HTTP/2 negotiation).
    /// Default is a no-op. Providers may override to make a lightweight request.
    async fn warmup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Return accumulated provider metrics (requests, tokens, errors).
    /// Default returns zeroed metrics for providers that don't track them.
    fn metrics(&self) -> ProviderMetrics {
        ProviderMetrics::default()
    }

    /// Chat with automatic retry on transient errors, driven by the crate's
    /// single `RetryStrategy` implementation rather than a private loop.
    async fn chat_with_retry(
        &self,
        req: ChatRequest<'_>,
        retry_config: Option<RetryConfig>,
    ) -> anyhow::Result<LLMResponse> {
        let config = retry_config.unwrap_or_default();
        let policy = crate::retry::RetryPolicy {
            max_retries: config.max_retries,
            base_delay: std::time::Duration::from_millis(config.initial_delay_ms),
            max_delay: std::time::Duration::from_millis(config.max_delay_ms),
            multiplier: config.backoff_multiplier,
        };

        let messages = req.messages;
        let tools = req.tools;
        let model = req.model;
        let max_tokens = req.max_tokens;
        let temperature = req.temperature;
        let tool_choice = req.tool_choice;
        let response_format = req.response_format;

        crate::retry::retry(&policy, || {
            let chat_req = ChatRequest {
                messages: messages.clone(),
                tools: tools.clone(),
                model,
                max_tokens,
                temperature,
                tool_choice: tool_choice.clone(),
                response_format: response_format.clone(),
            };
            async {
                self.chat(chat_req).await.map_err(|e| {
                    match e.downcast::<crate::errors::BuckleyError>() {
                        Ok(be) => be,
                        // A plain anyhow error from a provider transport (network
                        // blip, non-typed HTTP failure) is assumed transient, matching
                        // this method's historical default-to-retry behavior.
                        Err(e) => crate::errors::BuckleyError::Transient(e.to_string()),
                    }
                })
            }
        })
        .await
        .map_err(anyhow::Error::from)
    }
}
