//! # Alarm Call
//!
//! Turns vehicle tracker alarm webhooks into automated voice calls.
//!
//! ## Features
//!
//! - **Alert decision**: calls only when the alarm fires while the engine is off
//! - **Reverse geocoding**: Google Maps lookups behind a one-hour in-memory address cache
//! - **Voice calls**: Twilio calls that read the alarm, location and power status aloud
//! - **Framework agnostic core**: the webhook processor knows nothing about the HTTP server
//! - **Layered configuration**: defaults, config files and environment variables
//! - **Observability**: structured logging and request tracing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use alarmcall::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     config.validate()?;
//!
//!     let app = alarmcall::server::app(alarmcall::server::build_processor(&config)?, &config);
//!     let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.port)).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The five deployment variables `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_NUMBER`,
//! `GOOGLE_MAPS_API_KEY` and `PORT` are read directly; everything else can be set through
//! `config/*.toml` files or `ALARMCALL__SECTION__KEY` variables.

pub mod config;
pub mod logging;
pub mod server;

pub use crate::config::*;

/// Common imports for Alarm Call usage
pub mod prelude {
    pub use crate::config::{
        AppConfig, CacheConfig, GeocodingConfig, LoggingConfig, ServerConfig, TwilioConfig,
        WebhookConfig,
    };
    pub use alarm_core::*;
    pub use alarm_web_generic::{WebhookOutcome, WebhookProcessor};
}
