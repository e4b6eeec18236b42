//! Wire types for the native and OpenAI-compatible APIs.
//!
//! Requests are strongly typed. Upstream responses are read through
//! [`Lenient`] fields so that a missing or mistyped field degrades a single
//! value instead of failing the whole body.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// =============================================================================
// Lenient field reads
// =============================================================================

/// A field read from an untrusted JSON object.
///
/// Distinguishes a field that was not sent (or was `null`) from one that was
/// sent with an unexpected shape. Use with `#[serde(default)]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Lenient<T> {
    Absent,
    Valid(T),
    Invalid(Value),
}

impl<T> Default for Lenient<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T> Lenient<T> {
    /// The value when it was present and well-typed.
    pub fn valid(&self) -> Option<&T> {
        match self {
            Self::Valid(value) => Some(value),
            Self::Absent | Self::Invalid(_) => None,
        }
    }

    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Lenient<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(Self::Absent);
        }
        match T::deserialize(&value) {
            Ok(parsed) => Ok(Self::Valid(parsed)),
            Err(_) => Ok(Self::Invalid(value)),
        }
    }
}

// =============================================================================
// Shared request pieces
// =============================================================================

/// Chat participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message. Order within a conversation is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Sampling options forwarded to the upstream untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl RequestOptions {
    pub const fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_p.is_none()
    }
}

/// Embedding input: one text or a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

// =============================================================================
// OpenAI-compatible requests
// =============================================================================

/// Request to `/v1/chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub user: Option<String>,
    /// Native sampling options (takes precedence over top-level fields).
    #[serde(default)]
    pub options: Option<RequestOptions>,
}

/// Request to `/v1/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub options: Option<RequestOptions>,
}

/// Request to `/v1/embeddings`.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: EmbeddingInput,
    #[serde(default)]
    pub user: Option<String>,
}

// =============================================================================
// Native requests
// =============================================================================

/// Body for upstream `/api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,
}

/// Body for upstream `/api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeGenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,
}

/// Body for upstream `/api/embed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeEmbedRequest {
    pub model: String,
    pub input: EmbeddingInput,
}

/// Only the `stream` flag of an arbitrary request body.
#[derive(Debug, Default, Deserialize)]
pub struct StreamPeek {
    #[serde(default)]
    pub stream: Lenient<bool>,
}

impl StreamPeek {
    /// `true` only when the body is a JSON object whose `stream` is boolean `true`.
    pub fn is_streaming(body: &[u8]) -> bool {
        serde_json::from_slice::<Self>(body)
            .map(|peek| peek.stream.valid().copied().unwrap_or(false))
            .unwrap_or(false)
    }
}

// =============================================================================
// Native responses
// =============================================================================

/// `message` object of a native chat response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NativeMessage {
    #[serde(default)]
    pub role: Lenient<String>,
    #[serde(default)]
    pub content: Lenient<String>,
}

/// One entry of the native `/api/tags` model list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NativeModelEntry {
    #[serde(default)]
    pub name: Lenient<String>,
}

/// Any native response body or stream event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NativeResponse {
    #[serde(default)]
    pub model: Lenient<String>,
    #[serde(default)]
    pub message: Lenient<NativeMessage>,
    #[serde(default)]
    pub response: Lenient<String>,
    #[serde(default)]
    pub embedding: Lenient<Vec<Value>>,
    #[serde(default)]
    pub embeddings: Lenient<Vec<Value>>,
    #[serde(default)]
    pub models: Lenient<Vec<Lenient<NativeModelEntry>>>,
    #[serde(default)]
    pub prompt_eval_count: Lenient<u64>,
    #[serde(default)]
    pub eval_count: Lenient<u64>,
    #[serde(default)]
    pub done: Lenient<bool>,
    #[serde(default)]
    pub error: Lenient<String>,
}

impl NativeResponse {
    /// `true` only when `done` is the boolean `true`.
    pub fn is_done(&self) -> bool {
        self.done.valid().copied().unwrap_or(false)
    }

    /// Non-empty upstream error message, if the upstream reported one.
    pub fn error_message(&self) -> Option<&str> {
        self.error.valid().map(String::as_str).filter(|m| !m.is_empty())
    }
}

// =============================================================================
// OpenAI-compatible responses
// =============================================================================

/// Token usage counters, reinterpreted from native eval counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Message inside a non-streaming chat choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: Role,
    pub content: String,
}

/// Response from `/v1/chat/completions` (non-streaming).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

/// Response from `/v1/completions` (non-streaming).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<TextChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChoice {
    pub text: String,
    pub index: u32,
    pub finish_reason: Option<String>,
}

/// Streaming chunk from `/v1/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunkChoice {
    pub index: u32,
    pub delta: ChatDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Streaming chunk from `/v1/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<TextChoice>,
}

/// Response from `/v1/embeddings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingListResponse {
    /// `"list"` on success, `"error"` when the upstream sent no usable vectors.
    pub object: String,
    pub data: Vec<EmbeddingResult>,
    pub model: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub object: String,
    pub embedding: Vec<f64>,
    pub index: usize,
}

/// Response from `/v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub object: String,
    pub data: Vec<ModelData>,
}

/// A single model descriptor (OpenAI format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelData {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    pub permission: Vec<ModelPermission>,
    pub root: String,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ModelPermission {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub allow_create_engine: bool,
    pub allow_sampling: bool,
    pub allow_logprobs: bool,
    pub allow_search_indices: bool,
    pub allow_view: bool,
    pub allow_fine_tuning: bool,
    pub organization: String,
    pub group: Option<String>,
    pub is_blocking: bool,
}

// =============================================================================
// Error body
// =============================================================================

/// In-body error envelope: `{"error": "message"}`.
///
/// Errors are reported with HTTP 200 and this body, never via status codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
