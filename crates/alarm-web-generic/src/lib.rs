use alarm_core::{
    compose_message, header_value, should_call, AddressCache, CallClient, CallRequest,
    CallResponse, Headers, HttpStatus, TelemetryRecord, WebhookError, WebhookResponse,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub const CALL_INITIATED: &str = "Call initiated";
pub const NO_CALL_MADE: &str = "No call made due to engine status or alarm event.";
pub const INVALID_PAYLOAD: &str = "Invalid JSON payload";
pub const MISSING_DESTINATION: &str = "Missing destination phone number";
pub const DISPATCH_FAILED: &str = "Call dispatch failed";

/// Header carrying the number to ring unless configured otherwise.
pub const DEFAULT_DESTINATION_HEADER: &str = "x-phone-number";

/// What happened to an accepted webhook.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    CallInitiated(CallResponse),
    NoCall,
}

/// Framework-agnostic webhook processor: telemetry in, maybe a phone call out.
#[derive(Clone)]
pub struct WebhookProcessor {
    cache: AddressCache,
    caller: Arc<dyn CallClient>,
    from_number: String,
    destination_header: String,
}

impl WebhookProcessor {
    pub fn new(cache: AddressCache, caller: Arc<dyn CallClient>, from_number: String) -> Self {
        Self {
            cache,
            caller,
            from_number,
            destination_header: DEFAULT_DESTINATION_HEADER.to_string(),
        }
    }

    pub fn with_destination_header<S: Into<String>>(mut self, header: S) -> Self {
        self.destination_header = header.into();
        self
    }

    pub fn cache(&self) -> &AddressCache {
        &self.cache
    }

    /// Process an incoming webhook request and return a framework-agnostic response
    pub async fn process_webhook(&self, headers: Headers, body: &[u8]) -> WebhookResponse {
        match self.process_webhook_internal(headers, body).await {
            Ok(WebhookOutcome::CallInitiated(_)) => WebhookResponse::ok(CALL_INITIATED),
            Ok(WebhookOutcome::NoCall) => WebhookResponse::ok(NO_CALL_MADE),
            Err(e) => self.error_to_response(e),
        }
    }

    pub async fn process_webhook_internal(
        &self,
        headers: Headers,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        let record = TelemetryRecord::from_json(body)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?
            .with_destination(header_value(&headers, &self.destination_header));
        debug!(
            "Received telemetry: {}",
            serde_json::to_string(&record).unwrap_or_default()
        );

        if !should_call(&record) {
            info!("No call made due to engine status or alarm event.");
            return Ok(WebhookOutcome::NoCall);
        }

        let to = record
            .destination_phone_number
            .as_deref()
            .ok_or(WebhookError::MissingDestination)?;

        let address = self.cache.resolve(record.coordinates()).await;
        let script = compose_message(&record, &address);
        debug!("Composed message: {}", script.text());

        let response = self
            .caller
            .call(CallRequest {
                to,
                from: &self.from_number,
                script: &script,
            })
            .await?;

        info!("Call {} initiated to {}", response.id, to);
        Ok(WebhookOutcome::CallInitiated(response))
    }

    fn error_to_response(&self, error: WebhookError) -> WebhookResponse {
        match error {
            WebhookError::ParseError(msg) => {
                error!("Error processing request: {}", msg);
                WebhookResponse::error(HttpStatus::BadRequest, INVALID_PAYLOAD)
            }
            WebhookError::MissingDestination => {
                error!(
                    "Alarm raised but no {} header to call",
                    self.destination_header
                );
                WebhookResponse::error(HttpStatus::BadRequest, MISSING_DESTINATION)
            }
            WebhookError::Dispatch(e) => {
                error!("Error placing call: {}", e);
                WebhookResponse::error(HttpStatus::BadGateway, DISPATCH_FAILED)
            }
        }
    }
}

/// Helper trait for framework adapters to convert headers
pub trait HeaderConverter {
    type HeaderType;

    fn to_generic_headers(headers: &Self::HeaderType) -> Headers;
}

/// Helper trait for framework adapters to convert responses
pub trait ResponseConverter {
    type ResponseType;

    fn from_webhook_response(response: WebhookResponse) -> Self::ResponseType;
}
