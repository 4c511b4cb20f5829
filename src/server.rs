use std::sync::Arc;
use std::time::Duration;

use alarm_core::{AddressCache, CallError, GeocodeError};
use alarm_google::GoogleGeocoder;
use alarm_twilio::TwilioClient;
use alarm_web_axum::AppState;
use alarm_web_generic::WebhookProcessor;
use axum::{http::StatusCode, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

/// Failures while wiring the service together at startup.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("geocoder setup failed: {0}")]
    Geocoder(GeocodeError),
    #[error("twilio setup failed: {0}")]
    Twilio(CallError),
}

/// Build the processor from configuration: Google geocoder behind the address cache, Twilio
/// for calls.
pub fn build_processor(config: &AppConfig) -> Result<WebhookProcessor, BuildError> {
    let geocoder = GoogleGeocoder::with_base_url(
        config.geocoding.api_key.clone(),
        config.geocoding.base_url.clone(),
    )
    .with_timeout(Duration::from_secs(config.geocoding.timeout_seconds))
    .map_err(BuildError::Geocoder)?;

    let twilio = TwilioClient::with_base_url(
        config.twilio.account_sid.clone(),
        config.twilio.auth_token.clone(),
        config.twilio.base_url.clone(),
    )
    .with_delivery(config.twiml_delivery())
    .with_timeout(Duration::from_secs(config.twilio.timeout_seconds))
    .map_err(BuildError::Twilio)?;

    let cache = AddressCache::new(Arc::new(geocoder), config.cache_settings());
    Ok(
        WebhookProcessor::new(cache, Arc::new(twilio), config.twilio.from_number.clone())
            .with_destination_header(config.webhook.destination_header.clone()),
    )
}

/// Full HTTP surface: the alarm webhook, a health check and the shared middleware stack.
pub fn app(processor: WebhookProcessor, config: &AppConfig) -> Router {
    let state = AppState { processor };
    alarm_web_axum::router(state, &config.webhook.path)
        .route("/health", get(health))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.timeout_seconds,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
