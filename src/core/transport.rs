use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::api::{GenerateContentRequest, GenerateContentResponse};
use crate::utils::url::generate_content_url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    InvalidCredential,
    QuotaExceeded,
    NetworkFailure,
    EmptyResponse,
    Unknown,
}

/// A failed exchange, already reduced to something the user can act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn empty_response() -> Self {
        Self::new(
            TransportErrorKind::EmptyResponse,
            "No response generated from the API.",
        )
    }

    pub fn network(detail: impl fmt::Display) -> Self {
        debug!(%detail, "transport fault");
        Self::new(
            TransportErrorKind::NetworkFailure,
            "Network error. Please check your internet connection and try again.",
        )
    }

    /// Maps a raw provider or transport message onto an error kind.
    ///
    /// This is substring matching against messages observed from the API,
    /// not a documented contract. Keep all matching rules in here so they can
    /// be swapped for structured error codes.
    pub fn classify(raw: &str) -> Self {
        let raw = raw.trim();
        let lower = raw.to_ascii_lowercase();

        if raw.contains("API_KEY_INVALID") || raw.contains("API key") {
            Self::new(
                TransportErrorKind::InvalidCredential,
                "Invalid API key. Run 'gemchat auth' to update your API key.",
            )
        } else if lower.contains("quota") {
            Self::new(
                TransportErrorKind::QuotaExceeded,
                "API quota exceeded. Please try again later or check your API limits.",
            )
        } else if lower.contains("network") {
            Self::network(raw)
        } else if raw.is_empty() {
            Self::new(
                TransportErrorKind::Unknown,
                "Failed to get response from AI. Please try again.",
            )
        } else {
            Self::new(TransportErrorKind::Unknown, raw)
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// Sends one fully assembled request and returns the model's reply text.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        payload: &GenerateContentRequest,
        credential: &str,
    ) -> Result<String, TransportError>;
}

#[derive(Clone, Debug)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, model)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    pub fn endpoint(&self) -> String {
        generate_content_url(&self.base_url, &self.model)
    }
}

#[async_trait]
impl ChatTransport for GeminiClient {
    async fn send(
        &self,
        payload: &GenerateContentRequest,
        credential: &str,
    ) -> Result<String, TransportError> {
        let endpoint = self.endpoint();
        debug!(
            endpoint = %endpoint,
            turns = payload.contents.len(),
            "sending generateContent request"
        );

        let response = self
            .client
            .post(&endpoint)
            .query(&[("key", credential)])
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|err| TransportError::network(err.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::network(err.without_url()))?;
        debug!(status = status.as_u16(), bytes = body.len(), "received response");

        if !status.is_success() {
            return Err(TransportError::classify(&error_message_for_status(
                status.as_u16(),
                &body,
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|err| TransportError::classify(&format!("Invalid API response: {err}")))?;

        parsed
            .first_text()
            .map(str::to_owned)
            .ok_or_else(TransportError::empty_response)
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        })?;

    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Prefers the structured `error.message`; otherwise describes the status,
/// keeping any plain-text body for classification.
fn error_message_for_status(status: u16, body: &str) -> String {
    let trimmed = body.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&value) {
            return summary;
        }
        return format!("API request failed with status {status}");
    }

    if trimmed.is_empty() {
        format!("API request failed with status {status}")
    } else {
        format!("API request failed with status {status}: {trimmed}")
    }
}
