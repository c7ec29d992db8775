//! Chat exchange orchestration.
//!
//! Turns one `(session_id, message)` pair into one model reply: build the
//! context (persona preamble plus stored history), call the provider, and
//! record the exchange only if the call succeeded.

use crate::provider::{ChatRequest, Provider};
use crate::session::{SessionStore, Turn};
use chrono::{DateTime, Utc};
use orbit_common::config::ModelConfig;
use orbit_common::{Error, Result};
use std::sync::Arc;

/// Persona instructions sent as the first user turn of every context.
pub const ORBIT_PERSONALITY: &str = "You are ORBIT (Operational Response & Basic Intelligence Terminal), \
a helpful AI assistant inspired by JARVIS from Iron Man. You are professional yet friendly, \
concise and efficient in responses, knowledgeable across many domains, proactive in offering help, \
and slightly futuristic in tone. Keep responses focused and helpful. Address the user respectfully.";

/// Model acknowledgment that closes the preamble.
pub const ORBIT_ACKNOWLEDGMENT: &str = "Understood. I am ORBIT, ready to assist.";

/// Fixed generation parameters for every upstream call.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub max_output_tokens: i64,
    pub temperature: f64,
}

impl From<&ModelConfig> for GenerationSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model: config.name.clone(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

/// Successful exchange result.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// The two-turn persona preamble.
pub fn preamble() -> [Turn; 2] {
    [Turn::user(ORBIT_PERSONALITY), Turn::model(ORBIT_ACKNOWLEDGMENT)]
}

/// Runs chat exchanges against a shared session store.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<SessionStore>,
    provider: Arc<dyn Provider>,
    settings: GenerationSettings,
}

impl ChatService {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<dyn Provider>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            store,
            provider,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Run one exchange.
    ///
    /// Returns [`Error::InvalidInput`] for an empty message (the store is not
    /// touched) and [`Error::External`] when the provider fails (history is
    /// left as it was). The session is locked for the whole exchange, so
    /// concurrent requests on one session are applied in arrival order.
    pub async fn exchange(&self, session_id: &str, message: &str) -> Result<ChatOutcome> {
        if message.is_empty() {
            return Err(Error::InvalidInput("Message is required".into()));
        }

        let mut session = self.store.lock(session_id).await;

        let history: Vec<Turn> = preamble()
            .into_iter()
            .chain(session.turns().iter().cloned())
            .collect();

        let request = ChatRequest {
            model: self.settings.model.clone(),
            history,
            message: message.to_string(),
            max_tokens: self.settings.max_output_tokens,
            temperature: self.settings.temperature,
        };

        let response = self.provider.chat(request).await.map_err(|e| {
            tracing::error!(
                session_id = %session_id,
                provider = %self.provider.name(),
                status = ?e.status_code,
                error = %e,
                "Upstream model call failed"
            );
            Error::External(e.message)
        })?;

        session.push_exchange(message, response.content.as_str());

        tracing::info!(
            session_id = %session_id,
            latency_ms = response.latency_ms,
            history_len = session.len(),
            "Chat exchange completed"
        );

        Ok(ChatOutcome {
            response: response.content,
            timestamp: Utc::now(),
        })
    }

    /// Drop a session's history. Always succeeds.
    pub fn clear_session(&self, session_id: &str) {
        let existed = self.store.clear(session_id);
        tracing::info!(session_id = %session_id, existed, "Session cleared");
    }
}
