use alarm_core::{Coordinates, GeocodeError, Geocoder};
use async_trait::async_trait;
use serde::Deserialize;
#[cfg(feature = "reqwest")]
use std::time::Duration;

const PROVIDER: &str = "google";

/// Google Maps Geocoding API client (reverse lookups only).
#[derive(Clone, Debug)]
pub struct GoogleGeocoder {
    /// Maps Platform API key.
    pub api_key: String,
    /// API base URL; override for testing/mocking.
    pub base_url: String,
    #[cfg(feature = "reqwest")]
    http: reqwest::Client,
}

impl GoogleGeocoder {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self::with_base_url(api_key, "https://maps.googleapis.com".to_string())
    }

    pub fn with_base_url<S: Into<String>>(api_key: S, base_url: String) -> Self {
        Self {
            api_key: api_key.into(),
            base_url,
            #[cfg(feature = "reqwest")]
            http: reqwest::Client::new(),
        }
    }

    /// Bound every lookup so a stalled API cannot hold a webhook forever.
    #[cfg(feature = "reqwest")]
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, GeocodeError> {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeocodeError::Http(e.to_string()))?;
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
}

impl GeocodeResponse {
    /// First result's address; `ZERO_RESULTS` and an empty list both mean "no address".
    fn into_address(self) -> Result<Option<String>, GeocodeError> {
        match self.status.as_deref() {
            None | Some("OK") | Some("ZERO_RESULTS") => {
                Ok(self.results.into_iter().next().map(|r| r.formatted_address))
            }
            Some(status) => Err(GeocodeError::Api(match self.error_message {
                Some(msg) => format!("{}: {}", status, msg),
                None => status.to_string(),
            })),
        }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn reverse(&self, coordinates: Coordinates) -> Result<Option<String>, GeocodeError> {
        #[cfg(not(feature = "reqwest"))]
        {
            let _ = coordinates;
            return Err(GeocodeError::Http("reqwest feature disabled".into()));
        }
        #[cfg(feature = "reqwest")]
        {
            let url = format!(
                "{}/maps/api/geocode/json",
                self.base_url.trim_end_matches('/')
            );
            let latlng = format!("{},{}", coordinates.latitude, coordinates.longitude);
            let res = self
                .http
                .get(url)
                .query(&[("latlng", latlng.as_str()), ("key", self.api_key.as_str())])
                .send()
                .await
                .map_err(|e| GeocodeError::Http(e.to_string()))?;

            if !res.status().is_success() {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                return Err(GeocodeError::Api(format!("HTTP {}: {}", status, body)));
            }

            let parsed: GeocodeResponse = res
                .json()
                .await
                .map_err(|e| GeocodeError::Decode(e.to_string()))?;
            let address = parsed.into_address()?;
            tracing::debug!(
                "Geocoded {} to {}",
                latlng,
                address.as_deref().unwrap_or("<nothing>")
            );
            Ok(address)
        }
    }
}
