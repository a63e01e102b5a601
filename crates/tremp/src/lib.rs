//! Conversational ride-sharing coordinator for a geographically bounded
//! community.
//!
//! `tremp` turns free-form Hebrew chat messages into structured ride records
//! via an LLM function-calling contract, persists driver rides and hitchhiker
//! requests per user, and asynchronously matches hitchhikers to drivers whose
//! planned driving routes pass close enough to the requested endpoints. A
//! match notifies both parties with each other's phone number.
//!
//! The crate is transport-agnostic: the WhatsApp webhook adapter lives in
//! `tremp-web` and calls into [`chat::Coordinator::handle_message`] with a
//! `(phone, text, prefix, send_externally)` tuple. Everything below that entry
//! point — intent extraction, persistence, routing, matching, notification —
//! is this crate.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`chat`] | [`Coordinator`](chat::Coordinator): per-message orchestration, per-user FIFO, history |
//! | [`llm`] | Intent extraction: prompt assembly, one-shot tool call with timeout and bounded retry |
//! | [`tools`] | The closed tool set the model may call, with JSON Schema validation |
//! | [`matching`] | Pure compatibility predicates and ranking over a store snapshot |
//! | [`pipeline`] | Background geocode → route → corridor-threshold → re-match job |
//! | [`routing`] | OSRM-style driving-route client with retry budget |
//! | [`geo`] | Haversine / point-to-polyline kernel and the settlement gazetteer |
//! | [`store`] | Document-store seam and the typed, prefix-scoped ride store |
//! | [`notify`] | Match notification formatting, dedup, and the chat sink |
//! | [`records`] | Ride / request / user document types |
//! | [`admin`] | Text-command admin surface |
//! | [`config`] | Environment configuration |
//!
//! # Namespace duality
//!
//! Every read, write, match, and notification carries an explicit
//! [`Prefix`](store::Prefix). The empty prefix is production; `"test_"` is the
//! sandbox, where outbound sends are suppressed and match results are
//! returned inline. No component ever falls back to an implicit namespace,
//! so both can be exercised in a single process.

pub mod admin;
pub mod chat;
pub mod config;
pub mod error;
pub mod geo;
pub mod llm;
pub mod matching;
pub mod notify;
pub mod pipeline;
pub mod records;
pub mod retry;
pub mod routing;
pub mod store;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

/// Default chat-completions endpoint for intent extraction.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model for intent extraction.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Default public OSRM instance for driving routes.
pub const DEFAULT_ROUTING_BASE_URL: &str = "https://router.project-osrm.org";

// ── Schema generation ──────────────────────────────────────────────

/// Render a `schemars`-deriving type as the JSON Schema value the
/// function-calling API expects for tool parameters.
///
/// # Example
///
/// ```
/// use tremp::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct DeleteArgs {
///     record_id: String,
///     #[serde(default)]
///     role: Option<String>,
/// }
///
/// let schema = json_schema_for::<DeleteArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"record_id".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

// ── Request types ──────────────────────────────────────────────────

/// Body of one chat-completions call. Only the fields the coordinator sets
/// are modeled; unset knobs stay off the wire entirely.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
}

// ── Message types ──────────────────────────────────────────────────

/// Who authored a conversation message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One conversation message on the wire. At most one of `content` and
/// `tool_calls` is populated per turn.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, content)
    }

    /// An assistant turn that calls tools instead of answering in text.
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// A tool's result, addressed back to the originating call id.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::plain(MessageRole::Tool, content)
        }
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// Discriminator the function-calling wire format requires on definitions;
/// only one variant exists today.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// One callable tool, as advertised to the model.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionSpec,
}

/// Name, purpose, and parameter JSON Schema of a callable tool.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDef {
    /// Assemble a definition; the discriminator is filled in here so call
    /// sites never spell it out.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        let function = FunctionSpec {
            name: name.into(),
            description: description.into(),
            parameters,
        };
        Self {
            tool_type: ToolType::Function,
            function,
        }
    }
}

/// Discriminator on calls the model emits.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A call the model asked the runtime to perform.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCall,
}

/// Function name plus the raw JSON argument string of a [`ToolCall`].
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

// ── Response types ─────────────────────────────────────────────────

/// Wire shape of a completions response. Deserialization target only.
#[derive(Deserialize, Debug)]
struct ApiReply {
    choices: Option<Vec<ReplyChoice>>,
    error: Option<ApiFault>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize, Debug)]
struct ReplyChoice {
    message: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ReplyMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiFault {
    message: String,
}

/// Digest of one completions call, as handed to the intent layer.
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

/// Token accounting reported by the endpoint.
#[derive(Deserialize, Debug, Clone)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Thin HTTP client for a bearer-authenticated chat-completions endpoint.
///
/// This type only speaks the wire format. Deadlines, retries, prompt
/// assembly, and marker filtering all live a level up in
/// [`llm::IntentExtractor`].
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl LlmClient {
    /// Client against the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_base_url(api_key, DEFAULT_LLM_BASE_URL)
    }

    /// Client against a custom chat-completions endpoint.
    pub fn with_base_url(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .user_agent("tremp/0.3")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("http client construction failed: {e}"))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        })
    }

    /// Perform one completions call and digest the response.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "llm call: model={}, {} message(s), {} tool(s)",
            body.model,
            body.messages.len(),
            body.tools.as_ref().map_or(0, Vec::len),
        );

        let started = Instant::now();
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|e| format!("response body unreadable: {e}"))?;
        debug!(
            "llm answered HTTP {status} in {:.2}s ({} bytes)",
            started.elapsed().as_secs_f64(),
            payload.len(),
        );

        if !status.is_success() {
            return Err(format!("llm HTTP {status}: {payload}"));
        }

        let reply: ApiReply = serde_json::from_str(&payload)
            .map_err(|e| format!("llm payload did not parse: {e}"))?;
        if let Some(fault) = reply.error {
            return Err(format!("llm fault: {}", fault.message));
        }

        let usage = reply.usage;
        if let Some(counts) = usage.as_ref() {
            trace!(
                "llm tokens: {} prompt + {} completion",
                counts.prompt_tokens.unwrap_or(0),
                counts.completion_tokens.unwrap_or(0),
            );
        }

        let Some(choice) = reply.choices.unwrap_or_default().into_iter().next() else {
            debug!("llm returned an empty choice list");
            return Ok(ChatCompletion {
                content: None,
                tool_calls: Vec::new(),
                usage,
                finish_reason: None,
            });
        };
        debug!(
            "llm choice: {} text byte(s), {} tool call(s)",
            choice.message.content.as_deref().map_or(0, str::len),
            choice.message.tool_calls.as_ref().map_or(0, Vec::len),
        );

        Ok(ChatCompletion {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            usage,
            finish_reason: choice.finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_helpers_set_roles_and_payloads() {
        assert_eq!(Message::system("הנחיות").role, MessageRole::System);
        assert_eq!(Message::user("שאלה").content.as_deref(), Some("שאלה"));
        assert_eq!(Message::assistant_text("תשובה").role, MessageRole::Assistant);

        let call = ToolCall {
            id: "c9".into(),
            call_type: CallType::Function,
            function: FunctionCall {
                name: "show_help".into(),
                arguments: "{}".into(),
            },
        };
        let turn = Message::assistant_tool_calls(vec![call]);
        assert!(turn.content.is_none());
        assert_eq!(turn.tool_calls.as_ref().map(Vec::len), Some(1));

        let result = Message::tool_result("c9", "done");
        assert_eq!(result.role, MessageRole::Tool);
        assert_eq!(result.tool_call_id.as_deref(), Some("c9"));
        assert_eq!(result.content.as_deref(), Some("done"));
    }

    #[test]
    fn unset_request_knobs_stay_off_the_wire() {
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![Message::user("הודעה")],
            max_tokens: Some(256),
            temperature: None,
            tools: None,
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["max_tokens"], 256);
        assert!(wire.get("temperature").is_none());
        assert!(wire.get("tools").is_none());
        assert_eq!(wire["messages"][0]["role"], "user");
    }

    #[test]
    fn tool_def_serializes_with_function_discriminator() {
        let def = ToolDef::new(
            "view_user_records",
            "List records",
            serde_json::json!({"type": "object"}),
        );
        let wire = serde_json::to_value(&def).unwrap();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "view_user_records");
        assert_eq!(wire["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn reply_with_tool_call_deserializes() {
        let payload = r#"{
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {
                            "name": "delete_user_record",
                            "arguments": "{\"record_id\": 2, \"role\": \"driver\"}"
                        }
                    }]
                }
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 18, "total_tokens": 138}
        }"#;
        let reply: ApiReply = serde_json::from_str(payload).unwrap();
        let mut choices = reply.choices.unwrap();
        let choice = choices.remove(0);
        assert_eq!(choice.finish_reason.as_deref(), Some("tool_calls"));
        let calls = choice.message.tool_calls.unwrap();
        assert_eq!(calls[0].function.name, "delete_user_record");
        assert_eq!(reply.usage.unwrap().total_tokens, Some(138));
    }

    #[test]
    fn api_fault_deserializes() {
        let reply: ApiReply =
            serde_json::from_str(r#"{"error": {"message": "model overloaded"}}"#).unwrap();
        assert_eq!(reply.error.unwrap().message, "model overloaded");
        assert!(reply.choices.is_none());
    }
}
