//! Chat orchestrator: the per-message entry point.
//!
//! For every inbound `(phone, text, prefix, send_externally)` the
//! [`Coordinator`] loads the user, appends the message to history, routes
//! admin commands, extracts intent through the model, executes the returned
//! tool call, persists the reply, and (on the live path) pushes it to the
//! chat sink. Some reply string is always returned — silent drops are not
//! acceptable.
//!
//! Messages from the same phone are serialized FIFO behind a per-user lock;
//! across phones there is no ordering guarantee. A bounded semaphore gates
//! the model: when it is exhausted new messages get the busy reply instead
//! of queueing without bound.

use crate::admin::{ADMIN_PREFIX, AdminHandler};
use crate::config::CoordinatorConfig;
use crate::geo::gazetteer::Gazetteer;
use crate::llm::{BUSY_REPLY, Intent, IntentExtractor, IntentModel};
use crate::notify::{ChatSink, NotificationEmitter, WhatsAppSink};
use crate::pipeline::RoutePipeline;
use crate::records::{ChatEntry, ChatRole};
use crate::routing::{OsrmClient, RouteProvider};
use crate::store::{MemoryStore, Prefix, RideStore, UserDocumentStore};
use crate::tools::{DispatchResult, Dispatcher, definitions};
use crate::LlmClient;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// The conversational ride-sharing coordinator.
pub struct Coordinator {
    config: CoordinatorConfig,
    store: Arc<RideStore>,
    dispatcher: Dispatcher,
    extractor: IntentExtractor,
    admin: AdminHandler,
    sink: Arc<dyn ChatSink>,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    llm_permits: Arc<Semaphore>,
}

impl Coordinator {
    /// Wire a coordinator from its seams. Tests pass scripted
    /// implementations; [`Coordinator::production`] passes the real clients.
    pub fn new(
        config: CoordinatorConfig,
        backend: Arc<dyn UserDocumentStore>,
        routes: Arc<dyn RouteProvider>,
        model: Arc<dyn IntentModel>,
        sink: Arc<dyn ChatSink>,
        gazetteer: &'static Gazetteer,
    ) -> Self {
        let store = Arc::new(RideStore::new(backend));
        let emitter = Arc::new(NotificationEmitter::new(sink.clone(), store.clone()));
        let pipeline = Arc::new(RoutePipeline::new(
            store.clone(),
            gazetteer,
            routes,
            emitter.clone(),
            config.route_concurrency,
        ));
        let dispatcher = Dispatcher::new(store.clone(), gazetteer, pipeline, emitter);
        let extractor = IntentExtractor::new(
            model,
            config.llm_model.clone(),
            definitions(),
            Duration::from_secs(config.llm_timeout_s),
            config.llm_retry,
            config.ai_context_messages,
        );
        let admin = AdminHandler::new(store.clone());
        let llm_permits = Arc::new(Semaphore::new(config.llm_concurrency));

        Self {
            config,
            store,
            dispatcher,
            extractor,
            admin,
            sink,
            user_locks: Mutex::new(HashMap::new()),
            llm_permits,
        }
    }

    /// Wire the production coordinator: real LLM endpoint, OSRM routing,
    /// WhatsApp sink, bundled gazetteer.
    ///
    /// The hosted document store sits behind the [`UserDocumentStore`] seam;
    /// this constructor starts from the in-memory backend and deployments
    /// swap in their adapter via [`Coordinator::new`].
    pub fn production(config: CoordinatorConfig) -> Result<Self, String> {
        let model = Arc::new(LlmClient::with_base_url(
            config.llm_api_key.clone(),
            config.llm_base_url.clone(),
        )?);
        let routes = Arc::new(
            OsrmClient::new(
                config.routing_base_url.clone(),
                Duration::from_secs(config.route_timeout_s),
                Duration::from_secs(config.route_retry_budget_s),
            )
            .map_err(|e| e.to_string())?,
        );
        let sink = Arc::new(WhatsAppSink::new(
            config.chat_provider_phone_id.clone(),
            config.chat_provider_token.clone(),
        )?);
        Ok(Self::new(
            config,
            Arc::new(MemoryStore::new()),
            routes,
            model,
            sink,
            Gazetteer::bundled(),
        ))
    }

    /// The ride store backing this coordinator (shared with the web layer).
    pub fn store(&self) -> Arc<RideStore> {
        Arc::clone(&self.store)
    }

    /// Execute an admin command on behalf of an already-authorized caller
    /// (the HTTP admin endpoint checks the bearer token at the boundary).
    pub async fn admin_command(&self, command: &str, prefix: &Prefix) -> String {
        self.admin.handle(command, prefix, true).await
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Handle one inbound chat message and return the reply.
    pub async fn handle_message(
        &self,
        phone: &str,
        text: &str,
        prefix: &Prefix,
        send_externally: bool,
    ) -> String {
        // FIFO per phone: concurrent messages from one user would race the
        // history and duplicate records.
        let lock = self.user_lock(phone);
        let _guard = lock.lock().await;

        // Persist the inbound turn before any external call, so a timeout
        // or cancellation cannot lose history.
        let history_before = match self.store.load_or_create(phone, prefix).await {
            Ok(mut doc) => {
                let history = doc.chat_history.clone();
                let now = Utc::now();
                doc.push_history(
                    ChatEntry {
                        role: ChatRole::User,
                        text: text.to_string(),
                        timestamp: now,
                    },
                    self.config.max_chat_history,
                );
                doc.last_seen = now;
                if let Err(e) = self.store.put_user(phone, prefix, doc).await {
                    warn!("failed to persist inbound for {phone}: {e}");
                }
                history
            }
            Err(e) => {
                warn!("failed to load user {phone}: {e}");
                Vec::new()
            }
        };

        if text.trim_start().starts_with(ADMIN_PREFIX) {
            let reply = self
                .admin
                .handle(text, prefix, self.config.is_admin_phone(phone))
                .await;
            return self.finish(phone, prefix, reply, send_externally).await;
        }

        // Back-pressure: a saturated model queue answers busy instead of
        // queueing unboundedly.
        let permit = match self.llm_permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("llm saturated, busy reply for {phone}");
                return self
                    .finish(phone, prefix, BUSY_REPLY.to_string(), send_externally)
                    .await;
            }
        };

        let reply = match self.extractor.extract(&history_before, text).await {
            Err(e) => {
                warn!("intent extraction failed for {phone}: {e}");
                BUSY_REPLY.to_string()
            }
            Ok(Intent::Text(reply)) => reply,
            Ok(Intent::ToolCall(call)) => {
                match self
                    .dispatcher
                    .dispatch(&call, phone, prefix, send_externally)
                    .await
                {
                    DispatchResult::Reply(outcome) => outcome.reply,
                    DispatchResult::ToolError(tool_error) => {
                        debug!("tool error for {phone}: {tool_error}");
                        match self
                            .extractor
                            .follow_up(&history_before, text, &call, &tool_error)
                            .await
                        {
                            Ok(reply) => reply,
                            Err(e) => {
                                warn!("follow-up failed for {phone}: {e}");
                                BUSY_REPLY.to_string()
                            }
                        }
                    }
                }
            }
        };
        drop(permit);

        self.finish(phone, prefix, reply, send_externally).await
    }

    /// Persist the reply turn and push it out on the live path.
    async fn finish(
        &self,
        phone: &str,
        prefix: &Prefix,
        reply: String,
        send_externally: bool,
    ) -> String {
        match self.store.load_or_create(phone, prefix).await {
            Ok(mut doc) => {
                doc.push_history(
                    ChatEntry {
                        role: ChatRole::Assistant,
                        text: reply.clone(),
                        timestamp: Utc::now(),
                    },
                    self.config.max_chat_history,
                );
                if let Err(e) = self.store.put_user(phone, prefix, doc).await {
                    warn!("failed to persist reply for {phone}: {e}");
                }
            }
            Err(e) => warn!("failed to reload user {phone}: {e}"),
        }

        if send_externally {
            if let Err(cause) = self.sink.send_text(phone, &reply).await {
                warn!("reply send to {phone} failed: {cause}");
            }
        }
        reply
    }

    fn user_lock(&self, phone: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(phone.to_string()).or_default().clone()
    }
}
