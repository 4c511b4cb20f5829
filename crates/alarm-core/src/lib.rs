//! # Alarm Core
//!
//! Core traits and types for turning tracker alarm webhooks into voice calls.
//!
//! This crate provides the building blocks shared by every backend and web adapter:
//! - [`TelemetryRecord`] and [`should_call`] for deciding whether an alarm warrants a call
//! - [`compose_message`] for turning telemetry plus an address into a [`VoiceScript`]
//! - [`AddressCache`] for memoising reverse-geocoding results
//! - [`Geocoder`] and [`CallClient`] traits implemented by provider crates
//!
//! ## Example
//!
//! ```rust,ignore
//! use alarm_core::{compose_message, should_call, CallRequest, TelemetryRecord};
//!
//! let record = TelemetryRecord::from_json(body)?;
//! if should_call(&record) {
//!     let address = cache.resolve(record.coordinates()).await;
//!     let script = compose_message(&record, &address);
//!     client.call(CallRequest { to: "+1234567890", from: "+0987654321", script: &script }).await?;
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod cache;
pub mod message;
pub mod telemetry;

pub use cache::{AddressCache, CacheSettings, LOCATION_NOT_FOUND, UNABLE_TO_FETCH_ADDRESS};
pub use message::{compose_message, floor_to_tenth, VoiceScript, CLOSING_LINE};
pub use telemetry::{should_call, Coordinates, TelemetryRecord};

/// Errors that can occur while placing a voice call
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// HTTP communication error
    #[error("http error: {0}")]
    Http(String),
    /// Authentication/authorization error
    #[error("authentication error: {0}")]
    Auth(String),
    /// Invalid request parameters
    #[error("invalid request: {0}")]
    Invalid(String),
    /// Telephony provider returned an error
    #[error("provider error: {0}")]
    Provider(String),
}

/// Errors a reverse-geocoding backend can report.
///
/// "No address for this coordinate" is not an error; geocoders return `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("http error: {0}")]
    Http(String),
    /// The API answered but refused the lookup (quota, bad key, ...).
    #[error("api error: {0}")]
    Api(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Web-specific error types for webhook processing
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("parsing failed: {0}")]
    ParseError(String),
    #[error("missing destination phone number")]
    MissingDestination,
    #[error("call dispatch failed: {0}")]
    Dispatch(#[from] CallError),
}

/// HTTP status code for web responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok = 200,
    BadRequest = 400,
    BadGateway = 502,
}

impl HttpStatus {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// A single outbound call: who to ring, which number to ring from and what to say.
#[derive(Debug, Clone, Copy)]
pub struct CallRequest<'a> {
    pub to: &'a str,
    pub from: &'a str,
    pub script: &'a VoiceScript,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResponse {
    pub id: String,
    /// Provider-reported call status, e.g. "queued".
    pub status: Option<String>,
    /// Name of the backend/provider that produced the response, e.g. "twilio".
    pub provider: &'static str,
    /// Raw provider payload for debugging / audit.
    pub raw: serde_json::Value,
}

/// Plain-text webhook response that can be converted to any framework's response type
#[derive(Debug, Clone)]
pub struct WebhookResponse {
    pub status: HttpStatus,
    pub body: String,
    pub content_type: String,
}

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

impl WebhookResponse {
    pub fn ok(message: &str) -> Self {
        Self::text(HttpStatus::Ok, message)
    }

    pub fn error(status: HttpStatus, message: &str) -> Self {
        Self::text(status, message)
    }

    fn text(status: HttpStatus, message: &str) -> Self {
        Self {
            status,
            body: message.to_string(),
            content_type: TEXT_PLAIN.to_string(),
        }
    }
}

#[async_trait]
pub trait CallClient: Send + Sync {
    /// Place a single outbound voice call that reads the script aloud.
    async fn call(&self, req: CallRequest<'_>) -> Result<CallResponse, CallError>;
}

/// Reverse geocoding: coordinate in, human-readable address out.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Stable provider key, e.g. "google".
    fn provider(&self) -> &'static str;

    /// Resolve a coordinate. `Ok(None)` means the provider has no address for it.
    async fn reverse(&self, coordinates: Coordinates) -> Result<Option<String>, GeocodeError>;
}

/// Utility to create a pseudo id if a provider doesn't return one.
pub fn fallback_id() -> String {
    Uuid::new_v4().to_string()
}

/// Lightweight header representation to avoid tying the core to any HTTP framework.
pub type Headers = Vec<(String, String)>;

/// Case-insensitive header lookup returning the first trimmed, non-empty value.
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case_and_blank_values() {
        let headers: Headers = vec![
            ("Content-Type".into(), "application/json".into()),
            ("X-Phone-Number".into(), "  +15550001111 ".into()),
            ("x-empty".into(), "   ".into()),
        ];
        assert_eq!(header_value(&headers, "x-phone-number"), Some("+15550001111"));
        assert_eq!(header_value(&headers, "x-empty"), None);
        assert_eq!(header_value(&headers, "x-missing"), None);
    }

    #[test]
    fn responses_are_plain_text() {
        let ok = WebhookResponse::ok("Call initiated");
        assert_eq!(ok.status.as_u16(), 200);
        assert_eq!(ok.body, "Call initiated");
        assert_eq!(ok.content_type, TEXT_PLAIN);

        let err = WebhookResponse::error(HttpStatus::BadGateway, "Call dispatch failed");
        assert_eq!(err.status.as_u16(), 502);
        assert_eq!(HttpStatus::BadRequest.as_u16(), 400);
    }

    #[test]
    fn dispatch_errors_convert_into_webhook_errors() {
        let err: WebhookError = CallError::Provider("HTTP 500".into()).into();
        assert!(matches!(err, WebhookError::Dispatch(_)));
        assert!(err.to_string().contains("HTTP 500"));
    }
}
