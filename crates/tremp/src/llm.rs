//! Intent extraction: one bounded model call per inbound message.
//!
//! The extractor assembles the fixed Hebrew system prompt, a short history
//! window, and the tool schemas, then issues a single chat-completion call
//! under a wall-clock deadline with at most one retry. The model either
//! returns a tool call (executed by the dispatcher) or plain text (used as
//! the reply). Raw model markers are filtered before any text reaches the
//! user; a final failure produces the localized busy reply.

use crate::error::LlmError;
use crate::records::{ChatEntry, ChatRole};
use crate::retry::retryable;
use crate::{ChatCompletion, ChatRequest, LlmClient, Message, ToolCall, ToolDef};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Localized reply for any terminal model failure.
pub const BUSY_REPLY: &str = "המערכת עמוסה כרגע 🙏 נסו שוב בעוד רגע.";

/// System instruction establishing the domain and constraining replies to
/// Hebrew. The tool schemas travel separately in the request.
const SYSTEM_PROMPT: &str = "\
אתה העוזר של שירות הטרמפים הקהילתי בישראל. משתמשים כותבים לך הודעות חופשיות \
בוואטסאפ: נהגים שמציעים מקומות ברכב וטרמפיסטים שמחפשים נסיעה.\n\
תפקידך לזהות את הכוונה ולהפעיל את הכלי המתאים:\n\
- הצעת נסיעה או בקשת טרמפ חדשה או עדכון — update_user_records\n\
- בקשה לראות את הרשומות — view_user_records\n\
- מחיקת רשומה לפי מספר — delete_user_record, מחיקת הכל — delete_all_user_records\n\
- שאלה כללית על השירות — show_help\n\
כללים: ענה תמיד בעברית בלבד. אל תמציא פרטים שלא נאמרו — אם חסר פרט חיוני \
(מוצא, יעד, יום או שעה) שאל שאלה קצרה במקום להפעיל כלי. זמנים בפורמט HH:MM \
ותאריכים בפורמט YYYY-MM-DD. הפעל לכל היותר כלי אחד להודעה.";

// ── Model seam ─────────────────────────────────────────────────────

/// Boxed future returned by [`IntentModel::complete`].
pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ChatCompletion, String>> + Send + 'a>>;

/// Seam over the chat-completions oracle, dyn-compatible so tests can script
/// the model's behavior.
pub trait IntentModel: Send + Sync {
    fn complete(&self, request: ChatRequest) -> CompletionFuture<'_>;
}

impl IntentModel for LlmClient {
    fn complete(&self, request: ChatRequest) -> CompletionFuture<'_> {
        Box::pin(async move { self.chat(&request).await })
    }
}

// ── Extraction outcome ─────────────────────────────────────────────

/// What the model decided for one inbound message.
#[derive(Debug)]
pub enum Intent {
    /// A structured call for the dispatcher.
    ToolCall(ToolCall),
    /// A plain-text reply, already filtered of model markers.
    Text(String),
}

// ── Extractor ──────────────────────────────────────────────────────

/// Prompt assembly and the one-shot, deadline-bounded model call.
pub struct IntentExtractor {
    model: Arc<dyn IntentModel>,
    model_name: String,
    tools: Vec<ToolDef>,
    timeout: Duration,
    retries: u32,
    context_messages: usize,
}

impl IntentExtractor {
    pub fn new(
        model: Arc<dyn IntentModel>,
        model_name: impl Into<String>,
        tools: Vec<ToolDef>,
        timeout: Duration,
        retries: u32,
        context_messages: usize,
    ) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            tools,
            timeout,
            retries,
            context_messages,
        }
    }

    /// Extract the intent of one inbound message given bounded history.
    pub async fn extract(
        &self,
        history: &[ChatEntry],
        inbound: &str,
    ) -> Result<Intent, LlmError> {
        let messages = self.base_messages(history, inbound);

        let mut attempt = 0u32;
        loop {
            let request = ChatRequest {
                model: self.model_name.clone(),
                messages: messages.clone(),
                max_tokens: Some(1024),
                temperature: Some(0.2),
                tools: Some(self.tools.clone()),
            };

            match tokio::time::timeout(self.timeout, self.model.complete(request)).await {
                Ok(Ok(completion)) => {
                    if let Some(call) = completion.tool_calls.into_iter().next() {
                        debug!("intent: tool call {}", call.function.name);
                        return Ok(Intent::ToolCall(call));
                    }
                    if let Some(text) = completion.content {
                        let filtered = filter_model_markers(&text);
                        if !filtered.is_empty() {
                            return Ok(Intent::Text(filtered));
                        }
                    }
                    warn!("model returned neither text nor tool call");
                    if attempt >= self.retries {
                        return Err(LlmError::Unavailable("empty model response".into()));
                    }
                }
                Ok(Err(cause)) => {
                    if attempt >= self.retries || !retryable(&cause) {
                        return Err(LlmError::Unavailable(cause));
                    }
                    warn!("model call failed ({cause}), retrying");
                }
                Err(_) => {
                    if attempt >= self.retries {
                        return Err(LlmError::Timeout(self.timeout.as_secs()));
                    }
                    warn!("model call timed out, retrying");
                }
            }
            attempt += 1;
        }
    }

    /// One follow-up round after a tool error: the model sees its own call
    /// and the error result, and produces a corrective plain-text reply.
    pub async fn follow_up(
        &self,
        history: &[ChatEntry],
        inbound: &str,
        call: &ToolCall,
        tool_result: &str,
    ) -> Result<String, LlmError> {
        let mut messages = self.base_messages(history, inbound);
        messages.push(Message::assistant_tool_calls(vec![call.clone()]));
        messages.push(Message::tool_result(call.id.clone(), tool_result));

        let request = ChatRequest {
            model: self.model_name.clone(),
            messages,
            max_tokens: Some(1024),
            temperature: Some(0.2),
            tools: None,
        };

        match tokio::time::timeout(self.timeout, self.model.complete(request)).await {
            Ok(Ok(completion)) => {
                let text = completion.content.unwrap_or_default();
                let filtered = filter_model_markers(&text);
                if filtered.is_empty() {
                    Err(LlmError::Unavailable("empty follow-up response".into()))
                } else {
                    Ok(filtered)
                }
            }
            Ok(Err(cause)) => Err(LlmError::Unavailable(cause)),
            Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
        }
    }

    fn base_messages(&self, history: &[ChatEntry], inbound: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.context_messages + 2);
        messages.push(Message::system(SYSTEM_PROMPT));

        let window_start = history.len().saturating_sub(self.context_messages);
        for entry in &history[window_start..] {
            messages.push(match entry.role {
                ChatRole::User => Message::user(entry.text.clone()),
                ChatRole::Assistant => Message::assistant_text(entry.text.clone()),
            });
        }
        messages.push(Message::user(inbound));
        messages
    }
}

/// Strip raw model markers from user-visible text.
///
/// Lines carrying tool-call markup or control tokens never reach the user.
pub fn filter_model_markers(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let l = line.trim().to_lowercase();
            !(l.starts_with("<tool")
                || l.starts_with("</tool")
                || l.starts_with("<|")
                || l.contains("tool_call")
                || l.starts_with("calling tool"))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
