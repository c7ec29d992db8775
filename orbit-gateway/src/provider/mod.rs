//! Generative model provider abstraction.
//!
//! The gateway talks to the model through the [`Provider`] trait so the
//! chat flow does not depend on a particular vendor API.

mod gemini;

pub use gemini::GeminiProvider;

use crate::session::Turn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for model providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Send one message with prior context and wait for the full reply.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone, Error)]
#[error("[{provider}:{model}] {message}")]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Single-shot chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,
    /// Prior context, oldest first
    pub history: Vec<Turn>,
    /// New user input
    pub message: String,
    /// Maximum tokens to generate
    pub max_tokens: i64,
    /// Sampling temperature
    pub temperature: f64,
}

/// Chat reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Provider name
    pub provider: String,
    /// Model used
    pub model: String,
    /// Response content
    pub content: String,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}
