//! Native ↔ OpenAI schema translation.
//!
//! Request mapping turns OpenAI request bodies into native ones. Response
//! mapping turns one native response (or one stream event) into the matching
//! OpenAI object. All functions here are pure apart from reading the clock
//! and logging; none of them can fail. Missing or mistyped upstream fields
//! degrade to empty values.

use serde_json::Value;
use tracing::warn;

use crate::models::{
    AssistantMessage, ChatChoice, ChatChunkChoice, ChatCompletionChunk, ChatCompletionRequest,
    ChatCompletionResponse, ChatDelta, CompletionRequest, EmbeddingListResponse, EmbeddingRequest,
    EmbeddingResult, Lenient, ModelData, ModelListResponse, ModelPermission, NativeChatRequest,
    NativeEmbedRequest, NativeGenerateRequest, NativeResponse, RequestOptions, Role, TextChoice,
    TextCompletionChunk, TextCompletionResponse, Usage,
};

const FINISH_STOP: &str = "stop";
const OWNED_BY: &str = "organization-owner";

/// Which OpenAI endpoint a translation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Chat,
    Completion,
    Embedding,
    ModelList,
}

impl EndpointKind {
    /// Native upstream path serving this endpoint.
    #[must_use]
    pub const fn upstream_path(self) -> &'static str {
        match self {
            Self::Chat => "/api/chat",
            Self::Completion => "/api/generate",
            Self::Embedding => "/api/embed",
            Self::ModelList => "/api/tags",
        }
    }
}

/// Synthetic response id, regenerated for every object (and every chunk).
#[must_use]
pub fn response_id() -> String {
    format!("chatcmpl-{}", chrono::Local::now().format("%Y%m%d%H%M%S"))
}

/// Translation timestamp in unix seconds.
#[must_use]
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ── Requests ───────────────────────────────────────────────────────────

/// Fold OpenAI top-level sampling fields into native options.
///
/// Values already present in `options` win.
fn merge_options(
    options: Option<RequestOptions>,
    temperature: Option<f64>,
    top_p: Option<f64>,
) -> Option<RequestOptions> {
    let mut merged = options.unwrap_or_default();
    merged.temperature = merged.temperature.or(temperature);
    merged.top_p = merged.top_p.or(top_p);
    if merged.is_empty() { None } else { Some(merged) }
}

#[must_use]
pub fn native_chat_request(request: ChatCompletionRequest) -> NativeChatRequest {
    NativeChatRequest {
        model: request.model,
        messages: request.messages,
        stream: request.stream,
        options: merge_options(request.options, request.temperature, request.top_p),
    }
}

#[must_use]
pub fn native_generate_request(request: CompletionRequest) -> NativeGenerateRequest {
    NativeGenerateRequest {
        model: request.model,
        prompt: request.prompt,
        stream: request.stream,
        options: merge_options(request.options, request.temperature, request.top_p),
    }
}

#[must_use]
pub fn native_embed_request(request: EmbeddingRequest) -> NativeEmbedRequest {
    NativeEmbedRequest {
        model: request.model,
        input: request.input,
    }
}

// ── Field readers ──────────────────────────────────────────────────────

fn counter(field: &Lenient<u64>, name: &str) -> u64 {
    match field {
        Lenient::Valid(count) => *count,
        Lenient::Absent => 0,
        Lenient::Invalid(value) => {
            warn!(field = name, value = %value, "Ignoring malformed token counter");
            0
        }
    }
}

/// Usage counters from `prompt_eval_count` / `eval_count`.
#[must_use]
pub fn usage_from(native: &NativeResponse) -> Usage {
    let prompt_tokens = counter(&native.prompt_eval_count, "prompt_eval_count");
    let completion_tokens = counter(&native.eval_count, "eval_count");
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens.saturating_add(completion_tokens),
    }
}

/// `message.content` of a chat response, or `None` if missing or mistyped.
fn chat_content(native: &NativeResponse) -> Option<&str> {
    native
        .message
        .valid()
        .and_then(|message| message.content.valid())
        .map(String::as_str)
}

fn completion_text(native: &NativeResponse) -> Option<&str> {
    native.response.valid().map(String::as_str)
}

// ── Buffered responses ─────────────────────────────────────────────────

/// Native `/api/chat` response → OpenAI chat completion.
#[must_use]
pub fn chat_response(native: &NativeResponse, model: &str) -> ChatCompletionResponse {
    let content = chat_content(native).unwrap_or_else(|| {
        warn!(model, "Upstream chat response has no usable message.content");
        ""
    });

    ChatCompletionResponse {
        id: response_id(),
        object: "chat.completion".to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: AssistantMessage {
                role: Role::Assistant,
                content: content.to_string(),
            },
            finish_reason: Some(FINISH_STOP.to_string()),
        }],
        usage: usage_from(native),
    }
}

/// Native `/api/generate` response → OpenAI text completion.
#[must_use]
pub fn completion_response(native: &NativeResponse, model: &str) -> TextCompletionResponse {
    let text = completion_text(native).unwrap_or_else(|| {
        warn!(model, "Upstream generate response has no usable response text");
        ""
    });

    TextCompletionResponse {
        id: response_id(),
        object: "text_completion".to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices: vec![TextChoice {
            text: text.to_string(),
            index: 0,
            finish_reason: Some(FINISH_STOP.to_string()),
        }],
        usage: usage_from(native),
    }
}

/// Convert one embedding vector to `f64`s.
///
/// Any numeric encoding is accepted. A non-numeric element invalidates the
/// whole vector, which then comes back empty.
fn embedding_vector(raw: &Value) -> Vec<f64> {
    let Some(items) = raw.as_array() else {
        warn!(value = %raw, "Embedding entry is not an array");
        return Vec::new();
    };
    numeric_vector(items)
}

fn numeric_vector(items: &[Value]) -> Vec<f64> {
    let mut vector = Vec::with_capacity(items.len());
    for item in items {
        match item.as_f64() {
            Some(number) => vector.push(number),
            None => {
                warn!(value = %item, "Unexpected non-numeric value in embedding");
                return Vec::new();
            }
        }
    }
    vector
}

/// Vectors from `embeddings` (preferred) or a single `embedding`, in upstream order.
fn embedding_vectors(native: &NativeResponse) -> Option<Vec<Vec<f64>>> {
    if let Some(batch) = native.embeddings.valid() {
        return Some(batch.iter().map(embedding_vector).collect());
    }
    native
        .embedding
        .valid()
        .map(|single| vec![numeric_vector(single)])
}

/// Native `/api/embed` (or legacy `/api/embeddings`) response → OpenAI embedding list.
///
/// Missing or empty vector data yields an `"error"` object with no data.
#[must_use]
pub fn embedding_response(native: &NativeResponse, model: &str) -> EmbeddingListResponse {
    let prompt_tokens = counter(&native.prompt_eval_count, "prompt_eval_count");
    let usage = Usage {
        prompt_tokens,
        completion_tokens: 0,
        total_tokens: prompt_tokens,
    };

    let vectors = match embedding_vectors(native) {
        Some(vectors) if !vectors.is_empty() => vectors,
        _ => {
            warn!(
                model,
                embeddings = ?native.embeddings,
                embedding = ?native.embedding,
                "Upstream response carries no usable embeddings"
            );
            return EmbeddingListResponse {
                object: "error".to_string(),
                data: Vec::new(),
                model: model.to_string(),
                usage: Usage::default(),
            };
        }
    };

    EmbeddingListResponse {
        object: "list".to_string(),
        data: vectors
            .into_iter()
            .enumerate()
            .map(|(index, embedding)| EmbeddingResult {
                object: "embedding".to_string(),
                embedding,
                index,
            })
            .collect(),
        model: model.to_string(),
        usage,
    }
}

/// Native `/api/tags` response → OpenAI model list.
///
/// Entries without a string `name` are skipped.
#[must_use]
pub fn model_list(native: &NativeResponse) -> ModelListResponse {
    let created = unix_now();
    let permission_id = format!("modelperm-{}", chrono::Local::now().format("%Y%m%d%H%M%S"));

    let entries = match &native.models {
        Lenient::Valid(entries) => entries.as_slice(),
        Lenient::Absent => &[],
        Lenient::Invalid(value) => {
            warn!(value = %value, "Upstream models field is not a list");
            &[]
        }
    };

    let data = entries
        .iter()
        .filter_map(|entry| {
            let name = entry.valid().and_then(|e| e.name.valid());
            if name.is_none() {
                warn!(entry = ?entry, "Skipping model entry without a name");
            }
            name
        })
        .map(|name| ModelData {
            id: name.clone(),
            object: "model".to_string(),
            created,
            owned_by: OWNED_BY.to_string(),
            permission: vec![ModelPermission {
                id: permission_id.clone(),
                object: "model_permission".to_string(),
                created,
                allow_create_engine: false,
                allow_sampling: true,
                allow_logprobs: true,
                allow_search_indices: false,
                allow_view: true,
                allow_fine_tuning: false,
                organization: "*".to_string(),
                group: None,
                is_blocking: false,
            }],
            root: name.clone(),
            parent: None,
        })
        .collect();

    ModelListResponse {
        object: "list".to_string(),
        data,
    }
}

// ── Stream chunks ──────────────────────────────────────────────────────

fn finish_reason(native: &NativeResponse) -> Option<String> {
    native.is_done().then(|| FINISH_STOP.to_string())
}

/// One native `/api/chat` stream event → OpenAI chat chunk.
#[must_use]
pub fn chat_chunk(native: &NativeResponse, model: &str) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: response_id(),
        object: "chat.completion.chunk".to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices: vec![ChatChunkChoice {
            index: 0,
            delta: ChatDelta {
                role: Some(Role::Assistant),
                content: Some(chat_content(native).unwrap_or_default().to_string()),
            },
            finish_reason: finish_reason(native),
        }],
    }
}

/// One native `/api/generate` stream event → OpenAI completion chunk.
#[must_use]
pub fn completion_chunk(native: &NativeResponse, model: &str) -> TextCompletionChunk {
    TextCompletionChunk {
        id: response_id(),
        object: "text_completion".to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices: vec![TextChoice {
            text: completion_text(native).unwrap_or_default().to_string(),
            index: 0,
            finish_reason: finish_reason(native),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, EmbeddingInput};
    use serde_json::json;

    fn native(value: Value) -> NativeResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_chat_response_round_trip() {
        let upstream = native(json!({
            "model": "llama3",
            "message": {"role": "assistant", "content": "hi"},
            "done": true,
            "prompt_eval_count": 3,
            "eval_count": 2
        }));

        let response = chat_response(&upstream, "llama3");

        assert_eq!(response.object, "chat.completion");
        assert_eq!(response.model, "llama3");
        assert!(response.id.starts_with("chatcmpl-"));
        assert_eq!(response.choices.len(), 1);
        let choice = &response.choices[0];
        assert_eq!(choice.index, 0);
        assert_eq!(choice.message.role, Role::Assistant);
        assert_eq!(choice.message.content, "hi");
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));
        assert_eq!(
            response.usage,
            Usage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5
            }
        );
    }

    #[test]
    fn test_chat_response_missing_message_degrades() {
        let response = chat_response(&native(json!({"done": true})), "m");
        assert_eq!(response.choices[0].message.content, "");
        assert_eq!(response.usage, Usage::default());

        let response = chat_response(&native(json!({"message": "oops"})), "m");
        assert_eq!(response.choices[0].message.content, "");

        let response = chat_response(&native(json!({"message": {"content": 7}})), "m");
        assert_eq!(response.choices[0].message.content, "");
    }

    #[test]
    fn test_malformed_counters_are_zero() {
        let usage = usage_from(&native(json!({"prompt_eval_count": "3", "eval_count": 4})));
        assert_eq!(
            usage,
            Usage {
                prompt_tokens: 0,
                completion_tokens: 4,
                total_tokens: 4
            }
        );
    }

    #[test]
    fn test_usage_total_saturates() {
        let usage = usage_from(&native(json!({"prompt_eval_count": u64::MAX, "eval_count": 2})));
        assert_eq!(usage.prompt_tokens, u64::MAX);
        assert_eq!(usage.total_tokens, u64::MAX);
    }

    #[test]
    fn test_completion_response() {
        let upstream = native(json!({"response": "once upon", "prompt_eval_count": 10, "eval_count": 5}));
        let response = completion_response(&upstream, "mistral");

        assert_eq!(response.object, "text_completion");
        assert_eq!(response.choices[0].text, "once upon");
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[test]
    fn test_embedding_single_vector() {
        let response = embedding_response(&native(json!({"embedding": [1, 2, 3]})), "embed");

        assert_eq!(response.object, "list");
        assert_eq!(response.model, "embed");
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0].embedding, vec![1.0, 2.0, 3.0]);
        assert_eq!(response.data[0].index, 0);
        assert_eq!(response.data[0].object, "embedding");
    }

    #[test]
    fn test_embedding_batch_assigns_positions() {
        let upstream = native(json!({
            "embeddings": [[1, 2, 3], [4.5, 5, -6]],
            "prompt_eval_count": 8
        }));
        let response = embedding_response(&upstream, "embed");

        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[0].index, 0);
        assert_eq!(response.data[1].index, 1);
        assert_eq!(response.data[1].embedding, vec![4.5, 5.0, -6.0]);
        assert_eq!(
            response.usage,
            Usage {
                prompt_tokens: 8,
                completion_tokens: 0,
                total_tokens: 8
            }
        );
    }

    #[test]
    fn test_embeddings_preferred_over_embedding() {
        let upstream = native(json!({"embedding": [9], "embeddings": [[1], [2]]}));
        assert_eq!(embedding_response(&upstream, "e").data.len(), 2);
    }

    #[test]
    fn test_embedding_missing_or_empty_is_error_object() {
        for body in [json!({}), json!({"embeddings": []}), json!({"embeddings": "x"})] {
            let response = embedding_response(&native(body), "e");
            assert_eq!(response.object, "error");
            assert!(response.data.is_empty());
            assert_eq!(response.model, "e");
        }
    }

    #[test]
    fn test_embedding_non_numeric_vector_is_emptied() {
        let response = embedding_response(&native(json!({"embeddings": [[1, "a"], [2]]})), "e");
        assert_eq!(response.object, "list");
        assert!(response.data[0].embedding.is_empty());
        assert_eq!(response.data[1].embedding, vec![2.0]);
    }

    #[test]
    fn test_model_list() {
        let upstream = native(json!({
            "models": [
                {"name": "llama3", "size": 1},
                {"size": 2},
                "garbage",
                {"name": "qwen2:7b"}
            ]
        }));
        let list = model_list(&upstream);

        assert_eq!(list.object, "list");
        let ids: Vec<_> = list.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["llama3", "qwen2:7b"]);

        let first = &list.data[0];
        assert_eq!(first.object, "model");
        assert_eq!(first.root, "llama3");
        assert_eq!(first.owned_by, "organization-owner");
        assert!(first.parent.is_none());
        assert_eq!(first.permission.len(), 1);
        assert_eq!(first.permission[0].object, "model_permission");
        assert!(first.permission[0].id.starts_with("modelperm-"));
        assert!(first.permission[0].allow_sampling);
        assert!(!first.permission[0].allow_fine_tuning);
    }

    #[test]
    fn test_model_list_without_models() {
        assert!(model_list(&native(json!({}))).data.is_empty());
        assert!(model_list(&native(json!({"models": 3}))).data.is_empty());
    }

    #[test]
    fn test_model_descriptor_wire_shape() {
        let list = model_list(&native(json!({"models": [{"name": "llama3"}]})));
        let wire = serde_json::to_value(&list).unwrap();

        assert_eq!(wire["data"][0]["id"], "llama3");
        assert_eq!(wire["data"][0]["parent"], Value::Null);
        assert_eq!(wire["data"][0]["permission"][0]["organization"], "*");
        assert_eq!(wire["data"][0]["permission"][0]["group"], Value::Null);
    }

    #[test]
    fn test_chat_chunk() {
        let chunk = chat_chunk(&native(json!({"message": {"content": "Hel"}, "done": false})), "m");
        assert_eq!(chunk.object, "chat.completion.chunk");
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
        assert_eq!(chunk.choices[0].delta.role, Some(Role::Assistant));
        assert!(chunk.choices[0].finish_reason.is_none());

        let last = chat_chunk(&native(json!({"message": {"content": ""}, "done": true})), "m");
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_completion_chunk() {
        let chunk = completion_chunk(&native(json!({"response": "lo"})), "m");
        assert_eq!(chunk.choices[0].text, "lo");
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn test_request_mapping_preserves_messages_and_folds_options() {
        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "llama3",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "again"}
            ],
            "stream": true,
            "temperature": 0.2,
            "options": {"top_p": 0.9}
        }))
        .unwrap();

        let native = native_chat_request(request);
        assert!(native.stream);
        let roles: Vec<_> = native.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(native.messages[3], ChatMessage { role: Role::User, content: "again".to_string() });
        assert_eq!(
            native.options,
            Some(RequestOptions {
                temperature: Some(0.2),
                top_p: Some(0.9)
            })
        );
    }

    #[test]
    fn test_explicit_options_win() {
        let request: CompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "prompt": "p",
            "temperature": 1.0,
            "options": {"temperature": 0.1}
        }))
        .unwrap();
        let native = native_generate_request(request);
        assert_eq!(native.options.unwrap().temperature, Some(0.1));
    }

    #[test]
    fn test_no_options_when_nothing_set() {
        let request: CompletionRequest =
            serde_json::from_value(json!({"model": "m", "prompt": "p"})).unwrap();
        assert!(native_generate_request(request).options.is_none());
    }

    #[test]
    fn test_embed_request_keeps_input_shape() {
        let request: EmbeddingRequest =
            serde_json::from_value(json!({"model": "e", "input": ["a", "b"]})).unwrap();
        let native = native_embed_request(request);
        assert_eq!(
            native.input,
            EmbeddingInput::Batch(vec!["a".to_string(), "b".to_string()])
        );
    }
}
