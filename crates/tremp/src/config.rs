//! Coordinator configuration with environment loading and sensible defaults.
//!
//! [`CoordinatorConfig`] captures every knob the coordinator needs:
//! credentials for the LLM and the chat provider, endpoint overrides for
//! tests, the history/context bounds, and the external-call deadlines.

/// History window sent to the LLM per message.
pub const DEFAULT_AI_CONTEXT_MESSAGES: usize = 5;
/// Persisted chat-history truncation bound.
pub const DEFAULT_MAX_CHAT_HISTORY: usize = 100;
/// Wall-clock deadline for a single intent-extraction call, seconds.
pub const DEFAULT_LLM_TIMEOUT_S: u64 = 45;
/// Wall-clock deadline for a single routing call, seconds.
pub const DEFAULT_ROUTE_TIMEOUT_S: u64 = 8;
/// Total wall-clock budget across routing retries, seconds.
pub const DEFAULT_ROUTE_RETRY_BUDGET_S: u64 = 30;
/// Retries for a failed intent-extraction call.
pub const DEFAULT_LLM_RETRY: u32 = 1;
/// Concurrent intent-extraction calls before new messages get a busy reply.
pub const DEFAULT_LLM_CONCURRENCY: usize = 8;
/// Concurrent routing calls.
pub const DEFAULT_ROUTE_CONCURRENCY: usize = 4;

/// Configuration for a coordinator instance.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Credential for the LLM endpoint.
    pub llm_api_key: String,
    /// Chat-completions endpoint. Default: [`crate::DEFAULT_LLM_BASE_URL`].
    pub llm_base_url: String,
    /// Model identifier. Default: [`crate::DEFAULT_LLM_MODEL`].
    pub llm_model: String,
    /// WhatsApp Cloud phone-number id for outbound sends.
    pub chat_provider_phone_id: String,
    /// Bearer token for outbound sends.
    pub chat_provider_token: String,
    /// Token echoed back during the webhook GET handshake.
    pub webhook_verify_token: String,
    /// HMAC key for `X-Hub-Signature-256` verification of webhook POSTs.
    pub webhook_app_secret: String,
    /// Identifies the document store deployment.
    pub document_store_project: String,
    /// Bearer token for the admin HTTP endpoints.
    pub admin_token: String,
    /// Phone numbers allowed to issue `/a` admin commands over chat.
    pub admin_phones: Vec<String>,
    /// Routing engine base URL. Default: [`crate::DEFAULT_ROUTING_BASE_URL`].
    pub routing_base_url: String,
    /// History window sent to the LLM. Default: 5.
    pub ai_context_messages: usize,
    /// Persisted history bound. Default: 100.
    pub max_chat_history: usize,
    /// LLM call deadline, seconds. Default: 45.
    pub llm_timeout_s: u64,
    /// Routing call deadline, seconds. Default: 8.
    pub route_timeout_s: u64,
    /// Total routing retry budget, seconds. Default: 30.
    pub route_retry_budget_s: u64,
    /// LLM retry count. Default: 1.
    pub llm_retry: u32,
    /// LLM concurrency bound. Default: 8.
    pub llm_concurrency: usize,
    /// Routing concurrency bound. Default: 4.
    pub route_concurrency: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_base_url: crate::DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: crate::DEFAULT_LLM_MODEL.to_string(),
            chat_provider_phone_id: String::new(),
            chat_provider_token: String::new(),
            webhook_verify_token: String::new(),
            webhook_app_secret: String::new(),
            document_store_project: String::new(),
            admin_token: String::new(),
            admin_phones: Vec::new(),
            routing_base_url: crate::DEFAULT_ROUTING_BASE_URL.to_string(),
            ai_context_messages: DEFAULT_AI_CONTEXT_MESSAGES,
            max_chat_history: DEFAULT_MAX_CHAT_HISTORY,
            llm_timeout_s: DEFAULT_LLM_TIMEOUT_S,
            route_timeout_s: DEFAULT_ROUTE_TIMEOUT_S,
            route_retry_budget_s: DEFAULT_ROUTE_RETRY_BUDGET_S,
            llm_retry: DEFAULT_LLM_RETRY,
            llm_concurrency: DEFAULT_LLM_CONCURRENCY,
            route_concurrency: DEFAULT_ROUTE_CONCURRENCY,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from the environment.
    ///
    /// Credentials have no fallback; numeric knobs fall back to their
    /// defaults on absence or parse failure.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            llm_api_key: env_or("LLM_API_KEY", ""),
            llm_base_url: env_or("LLM_BASE_URL", &defaults.llm_base_url),
            llm_model: env_or("LLM_MODEL", &defaults.llm_model),
            chat_provider_phone_id: env_or("CHAT_PROVIDER_PHONE_ID", ""),
            chat_provider_token: env_or("CHAT_PROVIDER_TOKEN", ""),
            webhook_verify_token: env_or("WEBHOOK_VERIFY_TOKEN", ""),
            webhook_app_secret: env_or("WEBHOOK_APP_SECRET", ""),
            document_store_project: env_or("DOCUMENT_STORE_PROJECT", ""),
            admin_token: env_or("ADMIN_TOKEN", ""),
            admin_phones: env_or("ADMIN_PHONES", "")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            routing_base_url: env_or("ROUTING_BASE_URL", &defaults.routing_base_url),
            ai_context_messages: env_parsed("AI_CONTEXT_MESSAGES", defaults.ai_context_messages),
            max_chat_history: env_parsed("MAX_CHAT_HISTORY", defaults.max_chat_history),
            llm_timeout_s: env_parsed("LLM_TIMEOUT_S", defaults.llm_timeout_s),
            route_timeout_s: env_parsed("ROUTE_TIMEOUT_S", defaults.route_timeout_s),
            route_retry_budget_s: env_parsed("ROUTE_RETRY_BUDGET_S", defaults.route_retry_budget_s),
            llm_retry: env_parsed("LLM_RETRY", defaults.llm_retry),
            llm_concurrency: env_parsed("LLM_CONCURRENCY", defaults.llm_concurrency),
            route_concurrency: env_parsed("ROUTE_CONCURRENCY", defaults.route_concurrency),
        }
    }

    /// Whether the given phone may issue chat admin commands.
    pub fn is_admin_phone(&self, phone: &str) -> bool {
        self.admin_phones.iter().any(|p| p == phone)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
