use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use bytes::Bytes;
use alarm_core::Headers;
use alarm_web_generic::{HeaderConverter, ResponseConverter, WebhookProcessor};

#[derive(Clone)]
pub struct AppState {
    pub processor: WebhookProcessor,
}

/// Axum-specific header converter
pub struct AxumHeaderConverter;

impl HeaderConverter for AxumHeaderConverter {
    type HeaderType = HeaderMap;

    fn to_generic_headers(headers: &Self::HeaderType) -> Headers {
        headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

/// Axum-specific response converter
pub struct AxumResponseConverter;

impl ResponseConverter for AxumResponseConverter {
    type ResponseType = Response;

    fn from_webhook_response(response: alarm_core::WebhookResponse) -> Self::ResponseType {
        let status =
            StatusCode::from_u16(response.status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let content_type = HeaderValue::from_str(&response.content_type)
            .unwrap_or(HeaderValue::from_static(alarm_core::TEXT_PLAIN));

        (status, [(header::CONTENT_TYPE, content_type)], response.body).into_response()
    }
}

/// Alarm webhook handler. The raw body is taken as bytes so undecodable payloads get the
/// processor's plain-text 400 instead of axum's JSON rejection.
pub async fn alarm_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let generic_headers = AxumHeaderConverter::to_generic_headers(&headers);
    let response = state.processor.process_webhook(generic_headers, &body).await;
    AxumResponseConverter::from_webhook_response(response)
}

/// Router with the webhook mounted as `POST {path}`.
pub fn router(state: AppState, path: &str) -> Router {
    Router::new()
        .route(path, post(alarm_webhook))
        .with_state(state)
}
