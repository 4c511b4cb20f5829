use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use alarm_core::CacheSettings;
use alarm_twilio::{TwimlDelivery, DEFAULT_ECHO_URL};
use alarm_web_generic::DEFAULT_DESTINATION_HEADER;

/// Application configuration
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Twilio voice configuration
    pub twilio: TwilioConfig,
    /// Reverse geocoding configuration
    pub geocoding: GeocodingConfig,
    /// Address cache configuration
    pub cache: CacheConfig,
    /// Inbound webhook configuration
    pub webhook: WebhookConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
}

/// Twilio provider configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TwilioConfig {
    /// Twilio Account SID
    pub account_sid: String,
    /// Twilio Auth Token
    pub auth_token: String,
    /// Number calls are placed from
    pub from_number: String,
    /// REST API base URL (default: https://api.twilio.com)
    pub base_url: String,
    /// Echo service serving the TwiML document (default: https://twimlets.com/echo)
    pub echo_url: String,
    /// Send TwiML inline instead of through the echo service (default: false)
    pub inline_twiml: bool,
    /// Outbound request timeout in seconds (default: 10)
    pub timeout_seconds: u64,
}

/// Google geocoding configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeocodingConfig {
    /// Google Maps API key
    pub api_key: String,
    /// API base URL (default: https://maps.googleapis.com)
    pub base_url: String,
    /// Outbound request timeout in seconds (default: 10)
    pub timeout_seconds: u64,
}

/// Address cache configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Entry lifetime in seconds (default: 3600)
    pub ttl_seconds: u64,
    /// Maximum entries, 0 for unbounded (default: 10000)
    pub max_entries: usize,
}

/// Inbound webhook configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookConfig {
    /// Route the tracker posts to (default: /webhook)
    pub path: String,
    /// Header holding the number to call (default: x-phone-number)
    pub destination_header: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: json or pretty (default: json)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            timeout_seconds: 30,
        }
    }
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            base_url: "https://api.twilio.com".to_string(),
            echo_url: DEFAULT_ECHO_URL.to_string(),
            inline_twiml: false,
            timeout_seconds: 10,
        }
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://maps.googleapis.com".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            max_entries: 10_000,
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            path: "/webhook".to_string(),
            destination_header: DEFAULT_DESTINATION_HEADER.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(Config::try_from(&AppConfig::default())?)
            // Add configuration file based on environment
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (gitignored)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (prefixed with ALARMCALL__)
            .add_source(Environment::with_prefix("ALARMCALL").separator("__"))
            // Plain deployment variables win over everything else
            .set_override_option("twilio.account_sid", env::var("TWILIO_ACCOUNT_SID").ok())?
            .set_override_option("twilio.auth_token", env::var("TWILIO_AUTH_TOKEN").ok())?
            .set_override_option("twilio.from_number", env::var("TWILIO_NUMBER").ok())?
            .set_override_option("geocoding.api_key", env::var("GOOGLE_MAPS_API_KEY").ok())?
            .set_override_option("server.port", env::var("PORT").ok())?
            .build()?;

        s.try_deserialize()
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("twilio.account_sid", &self.twilio.account_sid),
            ("twilio.auth_token", &self.twilio.auth_token),
            ("twilio.from_number", &self.twilio.from_number),
            ("geocoding.api_key", &self.geocoding.api_key),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Message(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.cache.ttl_seconds == 0 {
            return Err(ConfigError::Message("cache.ttl_seconds must be positive".into()));
        }
        if !self.webhook.path.starts_with('/') {
            return Err(ConfigError::Message(format!(
                "webhook.path must start with '/': {}",
                self.webhook.path
            )));
        }
        if self.webhook.destination_header.trim().is_empty() {
            return Err(ConfigError::Message(
                "webhook.destination_header must not be empty".into(),
            ));
        }
        match self.logging.format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(ConfigError::Message(format!(
                "logging.format must be json or pretty, got {}",
                other
            ))),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache.ttl_seconds),
            max_entries: self.cache.max_entries,
        }
    }

    pub fn twiml_delivery(&self) -> TwimlDelivery {
        if self.twilio.inline_twiml {
            TwimlDelivery::Inline
        } else {
            TwimlDelivery::Echo {
                base_url: self.twilio.echo_url.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> AppConfig {
        let mut config = AppConfig::default();
        config.twilio.account_sid = "AC123".into();
        config.twilio.auth_token = "token".into();
        config.twilio.from_number = "+15550002222".into();
        config.geocoding.api_key = "key".into();
        config
    }

    #[test]
    fn defaults_match_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert_eq!(config.webhook.path, "/webhook");
        assert_eq!(config.webhook.destination_header, "x-phone-number");
        assert_eq!(
            config.twiml_delivery(),
            TwimlDelivery::Echo {
                base_url: "https://twimlets.com/echo".into()
            }
        );
    }

    #[test]
    fn missing_credentials_are_reported_together() {
        let err = AppConfig::default().validate().unwrap_err().to_string();
        assert!(err.contains("twilio.account_sid"));
        assert!(err.contains("twilio.from_number"));
        assert!(err.contains("geocoding.api_key"));
    }

    #[test]
    fn complete_config_validates() {
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = complete();
        config.cache.ttl_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = complete();
        config.webhook.path = "webhook".into();
        assert!(config.validate().is_err());

        let mut config = complete();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn inline_twiml_switches_delivery() {
        let mut config = complete();
        config.twilio.inline_twiml = true;
        assert_eq!(config.twiml_delivery(), TwimlDelivery::Inline);
        assert_eq!(config.cache_settings().ttl, Duration::from_secs(3600));
    }
}
