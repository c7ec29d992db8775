//! Google Gemini provider.
//!
//! Calls the `generateContent` REST method with the session context as
//! `contents` and the new user message as the final entry.

use super::{ChatRequest, ChatResponse, Provider, ProviderError};
use async_trait::async_trait;
use orbit_common::config::ModelConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "gemini";

/// Credentials travel in a header so they never appear in request URLs.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider authenticated with an API key.
pub struct GeminiProvider {
    api_key: Option<String>,
    endpoint: String,
    client: Client,
}

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

/// Finish reasons that still carry a usable reply.
const COMPLETE_FINISH_REASONS: &[&str] = &["STOP", "MAX_TOKENS"];

impl GeminiProvider {
    /// Create a provider against the given API base URL.
    pub fn new(api_key: Option<String>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Create a provider from the model section of the config.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.api_key.clone(),
            config.endpoint.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Whether an API key is available.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn error(model: &str, message: impl Into<String>, status_code: Option<u16>) -> ProviderError {
        ProviderError {
            provider: PROVIDER_NAME.into(),
            model: model.to_string(),
            message: message.into(),
            status_code,
        }
    }

    fn build_request(request: &ChatRequest) -> GenerateContentRequest {
        let mut contents: Vec<Content> = request
            .history
            .iter()
            .map(|turn| Content {
                role: turn.role.as_str(),
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        contents.push(Content {
            role: "user",
            parts: vec![Part {
                text: request.message.clone(),
            }],
        });

        GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let model = request.model.as_str();

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            Self::error(model, "Gemini API key not found. Set GEMINI_API_KEY.", None)
        })?;

        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        let url = format!("{}/{model_path}:generateContent", self.endpoint);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&Self::build_request(&request))
            .send()
            .await
            .map_err(|e| Self::error(model, format!("Request failed: {}", e.without_url()), None))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::error(
                model,
                format!("API error ({}): {}", status.as_u16(), error_text),
                Some(status.as_u16()),
            ));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| {
                Self::error(model, format!("Failed to parse response: {}", e.without_url()), None)
            })?;

        if let Some(err) = result.error {
            return Err(Self::error(model, format!("API error: {}", err.message), None));
        }

        let Some(candidate) = result.candidates.and_then(|c| c.into_iter().next()) else {
            let reason = result
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map_or_else(
                    || "No response from Gemini".to_string(),
                    |r| format!("Prompt blocked: {r}"),
                );
            return Err(Self::error(model, reason, None));
        };

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if content.is_empty() {
            if let Some(reason) = candidate
                .finish_reason
                .as_deref()
                .filter(|r| !COMPLETE_FINISH_REASONS.contains(r))
            {
                return Err(Self::error(model, format!("Response blocked: {reason}"), None));
            }
        }

        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(model = %model, latency_ms, "Gemini call completed");

        Ok(ChatResponse {
            provider: PROVIDER_NAME.into(),
            model: request.model.clone(),
            content,
            finish_reason: candidate.finish_reason,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Turn;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "gemini-1.5-flash-latest";

    fn request(message: &str, history: Vec<Turn>) -> ChatRequest {
        ChatRequest {
            model: MODEL.into(),
            history,
            message: message.into(),
            max_tokens: 500,
            temperature: 0.7,
        }
    }

    fn provider(server: &MockServer) -> GeminiProvider {
        GeminiProvider::new(
            Some("test-key".into()),
            server.uri(),
            Duration::from_secs(5),
        )
    }

    fn generate_path() -> String {
        format!("/models/{MODEL}:generateContent")
    }

    #[test]
    fn empty_key_counts_as_missing() {
        let provider = GeminiProvider::new(Some(String::new()), "http://x", Duration::from_secs(1));
        assert!(!provider.has_api_key());
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn request_body_appends_message_after_history() {
        let body = GeminiProvider::build_request(&request(
            "third",
            vec![Turn::user("first"), Turn::model("second")],
        ));
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["role"], "user");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "third");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 500);
    }

    #[tokio::test]
    async fn chat_returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "maxOutputTokens": 500 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "Good " }, { "text": "evening." }] },
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server)
            .chat(request("Hello", vec![]))
            .await
            .expect("chat");

        assert_eq!(response.content, "Good evening.");
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(response.provider, "gemini");
    }

    #[tokio::test]
    async fn chat_maps_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exhausted"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .chat(request("Hello", vec![]))
            .await
            .unwrap_err();

        assert_eq!(err.status_code, Some(429));
        assert!(err.message.contains("quota exhausted"));
    }

    #[tokio::test]
    async fn chat_reports_blocked_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .chat(request("Hello", vec![]))
            .await
            .unwrap_err();

        assert_eq!(err.message, "Prompt blocked: SAFETY");
    }

    #[tokio::test]
    async fn chat_reports_blocked_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "finishReason": "SAFETY" }]
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .chat(request("Hello", vec![]))
            .await
            .unwrap_err();

        assert_eq!(err.message, "Response blocked: SAFETY");
    }

    #[tokio::test]
    async fn chat_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .chat(request("Hello", vec![]))
            .await
            .unwrap_err();

        assert!(err.message.starts_with("Failed to parse response"));
    }

    #[tokio::test]
    async fn transport_error_does_not_expose_api_key() {
        // Nothing listens on the discard port
        let provider = GeminiProvider::new(
            Some("SECRET-KEY-123".into()),
            "http://127.0.0.1:9",
            Duration::from_secs(5),
        );

        let err = provider.chat(request("Hello", vec![])).await.unwrap_err();

        assert!(err.message.starts_with("Request failed"));
        assert!(!err.message.contains("SECRET-KEY-123"));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
    }

    #[tokio::test]
    async fn parse_error_does_not_expose_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(
            Some("SECRET-KEY-123".into()),
            server.uri(),
            Duration::from_secs(5),
        );
        let err = provider.chat(request("Hello", vec![])).await.unwrap_err();

        assert!(!err.message.contains("SECRET-KEY-123"));
    }

    #[tokio::test]
    async fn chat_without_key_fails_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(None, server.uri(), Duration::from_secs(5));
        let err = provider.chat(request("Hello", vec![])).await.unwrap_err();

        assert!(err.message.contains("GEMINI_API_KEY"));
    }
}
