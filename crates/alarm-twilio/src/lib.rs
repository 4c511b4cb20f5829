use alarm_core::{CallClient, CallError, CallRequest, CallResponse, VoiceScript};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const PROVIDER: &str = "twilio";

/// Public TwiML bin that echoes back whatever document it receives in `Twiml`.
pub const DEFAULT_ECHO_URL: &str = "https://twimlets.com/echo";

/// How the spoken-response document reaches Twilio.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TwimlDelivery {
    /// Point the call `Url` at an echo service carrying the document in its query string.
    Echo { base_url: String },
    /// Send the document in the call's `Twiml` parameter.
    Inline,
}

impl Default for TwimlDelivery {
    fn default() -> Self {
        TwimlDelivery::Echo {
            base_url: DEFAULT_ECHO_URL.to_string(),
        }
    }
}

/// Twilio Programmable Voice REST client.
#[derive(Clone, Debug)]
pub struct TwilioClient {
    /// Twilio Account SID.
    pub account_sid: String,
    /// Twilio Auth Token (password for Basic auth).
    pub auth_token: String,
    /// API base URL; override for testing/mocking.
    pub base_url: String,
    pub delivery: TwimlDelivery,
    http: reqwest::Client,
}

impl TwilioClient {
    pub fn new<S: Into<String>>(account_sid: S, auth_token: S) -> Self {
        Self::with_base_url(account_sid, auth_token, "https://api.twilio.com".to_string())
    }

    pub fn with_base_url<S: Into<String>>(account_sid: S, auth_token: S, base_url: String) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            base_url,
            delivery: TwimlDelivery::default(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_delivery(mut self, delivery: TwimlDelivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, CallError> {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CallError::Http(e.to_string()))?;
        Ok(self)
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.base_url.trim_end_matches('/'),
            self.account_sid
        )
    }

    /// Form parameters for the call-creation request.
    fn call_params(&self, req: &CallRequest<'_>) -> Result<Vec<(&'static str, String)>, CallError> {
        let twiml = render_twiml(req.script);
        let document = match &self.delivery {
            TwimlDelivery::Inline => ("Twiml", twiml),
            TwimlDelivery::Echo { base_url } => ("Url", echo_url(base_url, &twiml)?.into()),
        };
        Ok(vec![
            ("To", req.to.to_string()),
            ("From", req.from.to_string()),
            document,
        ])
    }
}

/// Render the script as a TwiML `<Response>` with one `<Say>` per segment.
pub fn render_twiml(script: &VoiceScript) -> String {
    let says: String = script
        .segments()
        .iter()
        .map(|segment| format!("<Say>{}</Say>", escape_xml(segment)))
        .collect();
    format!("<Response>{}</Response>", says)
}

/// Echo-service URL that serves `twiml` back to Twilio.
pub fn echo_url(base_url: &str, twiml: &str) -> Result<Url, CallError> {
    Url::parse_with_params(base_url, &[("Twiml", twiml)])
        .map_err(|e| CallError::Invalid(format!("echo url: {}", e)))
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Deserialize)]
struct TwilioCallResponse {
    sid: Option<String>,
    status: Option<String>,
}

#[async_trait]
impl CallClient for TwilioClient {
    async fn call(&self, req: CallRequest<'_>) -> Result<CallResponse, CallError> {
        if req.to.trim().is_empty() {
            return Err(CallError::Invalid("destination number is empty".into()));
        }
        if req.from.trim().is_empty() {
            return Err(CallError::Invalid("source number is empty".into()));
        }

        let params = self.call_params(&req)?;
        let res = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| CallError::Http(e.to_string()))?;

        let status = res.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = res.text().await.unwrap_or_default();
            return Err(CallError::Auth(format!("HTTP {}: {}", status, body)));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(CallError::Provider(format!("HTTP {}: {}", status, body)));
        }

        let raw_text = res.text().await.map_err(|e| CallError::Http(e.to_string()))?;
        let raw_json: serde_json::Value = serde_json::from_str(&raw_text)
            .unwrap_or_else(|_| serde_json::json!({ "raw": raw_text }));
        let parsed: Option<TwilioCallResponse> = serde_json::from_value(raw_json.clone()).ok();
        let (sid, call_status) = parsed.map(|p| (p.sid, p.status)).unwrap_or_default();

        let id = sid.unwrap_or_else(alarm_core::fallback_id);
        tracing::info!("Twilio accepted call {} to {}", id, req.to);

        Ok(CallResponse {
            id,
            status: call_status,
            provider: PROVIDER,
            raw: raw_json,
        })
    }
}
