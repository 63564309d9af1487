//! Reply generation over a `generateContent`-style HTTP API.
//!
//! One request per user utterance, no history, no streaming. Any failure
//! (transport, status, body shape, empty text) comes back as
//! [`AvatarError::Response`]; the conversation layer turns that into its
//! apology phrase.

use crate::config::ResponseConfig;
use crate::error::{AvatarError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Produces reply text for a user utterance.
#[async_trait]
pub trait ResponseClient: Send + Sync {
    async fn generate(&self, user_text: &str) -> Result<String>;
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    /// Build a client from config.
    ///
    /// A missing API key is not an error here: every request then fails with
    /// [`AvatarError::Response`] so the avatar can still apologise.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ResponseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AvatarError::Response(format!("cannot build HTTP client: {e}")))?;

        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            warn!(
                "no API key configured (set response.api_key or {}); replies will fail",
                config.api_key_env
            );
        }
        info!(
            "response client configured: {} model={}",
            config.base_url, config.model
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl ResponseClient for GeminiClient {
    async fn generate(&self, user_text: &str) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(AvatarError::Response("no API key configured".into()));
        };

        let started = Instant::now();
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&build_request_body(user_text))
            .send()
            .await
            .map_err(|e| AvatarError::Response(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("error body: {body}");
            return Err(AvatarError::Response(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AvatarError::Response(format!("invalid JSON: {e}")))?;
        let reply = parse_reply(&body)?;
        info!(
            "reply received in {:.2}s ({} chars)",
            started.elapsed().as_secs_f64(),
            reply.len()
        );
        Ok(reply)
    }
}

/// `{ "contents": [{ "parts": [{ "text": ... }] }] }`
pub fn build_request_body(user_text: &str) -> Value {
    serde_json::json!({
        "contents": [{
            "parts": [{ "text": user_text }]
        }]
    })
}

/// Extract `candidates[0].content.parts[0].text`.
pub fn parse_reply(body: &Value) -> Result<String> {
    let text = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| AvatarError::Response("response has no candidate text".into()))?;

    let text = text.trim();
    if text.is_empty() {
        return Err(AvatarError::Response("empty reply".into()));
    }
    Ok(text.to_owned())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_wraps_text_in_parts() {
        let body = build_request_body("hello there");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello there");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parses_first_candidate() {
        let body = json!({
            "candidates": [
                { "content": { "parts": [{ "text": "  Hi!  " }, { "text": "ignored" }] } },
                { "content": { "parts": [{ "text": "second" }] } }
            ]
        });
        assert_eq!(parse_reply(&body).unwrap(), "Hi!");
    }

    #[test]
    fn missing_candidates_is_an_error() {
        let err = parse_reply(&json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        assert!(matches!(err, Err(AvatarError::Response(_))));
        assert!(parse_reply(&json!({ "candidates": [] })).is_err());
        assert!(parse_reply(&json!({ "candidates": [{ "content": { "parts": [{ "text": 5 }] } }] })).is_err());
    }

    #[test]
    fn blank_text_is_an_error() {
        let body = json!({ "candidates": [{ "content": { "parts": [{ "text": " \n " }] } }] });
        assert!(parse_reply(&body).is_err());
    }

    #[test]
    fn endpoint_uses_model_and_trims_base() {
        let client = GeminiClient::new(&ResponseConfig {
            base_url: "http://localhost:9999/".into(),
            model: "gemini-test".into(),
            api_key: Some("k".into()),
            ..ResponseConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-test:generateContent"
        );
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let client = GeminiClient::new(&ResponseConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: None,
            api_key_env: "ACEINT_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..ResponseConfig::default()
        })
        .unwrap();
        let err = client.generate("hello").await.unwrap_err();
        assert!(err.to_string().contains("API key"));
    }
}
