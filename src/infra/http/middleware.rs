use std::time::Instant;

use axum::extract::State;
use axum::{body::Body, http::Request, middleware::Next, response::IntoResponse, response::Response};
use subtle::ConstantTimeEq;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

use super::HttpState;
use super::error::ApiError;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "cartolina::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "cartolina::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

/// Reject requests that do not present the configured API key, either as a
/// bearer token or an `x-api-key` header.
pub async fn require_api_key(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let presented = extract_bearer(request.headers().get(axum::http::header::AUTHORIZATION))
        .or_else(|| {
            request
                .headers()
                .get("x-api-key")
                .and_then(|value| value.to_str().ok().map(str::to_string))
        });

    match presented {
        Some(token) if keys_match(&token, &state.api_key) => next.run(request).await,
        Some(_) => ApiError::unauthorized("Invalid API key").into_response(),
        None => ApiError::unauthorized("API key required").into_response(),
    }
}

fn extract_bearer(header: Option<&axum::http::HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?;
    Some(bearer.to_string())
}

fn keys_match(presented: &str, expected: &str) -> bool {
    let presented = presented.as_bytes();
    let expected = expected.as_bytes();
    if presented.len() != expected.len() {
        return false;
    }
    presented.ct_eq(expected).into()
}

#[cfg(test)]
mod tests {
    use super::{extract_bearer, keys_match};
    use axum::http::HeaderValue;

    #[test]
    fn bearer_prefix_is_required() {
        let header = HeaderValue::from_static("Bearer sekrit");
        assert_eq!(extract_bearer(Some(&header)), Some("sekrit".to_string()));

        let bare = HeaderValue::from_static("sekrit");
        assert_eq!(extract_bearer(Some(&bare)), None);
        assert_eq!(extract_bearer(None), None);
    }

    #[test]
    fn key_comparison_requires_exact_match() {
        assert!(keys_match("sekrit", "sekrit"));
        assert!(!keys_match("sekrit", "sekrit2"));
        assert!(!keys_match("", "sekrit"));
    }
}
