use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::ErrorResponse;
use crate::response::TooManyRequestsResponse;
use crate::server::AppState;
use crate::throttler::EvaluationResult;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Request extension telling handlers whether a promotional override applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideMatched(pub bool);

/// Admission control: rejects with 429 or lets the request through with
/// informational rate limit headers.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let client_ip = get_client_ip(&request);
    let path = request.uri().path().to_string();
    let authenticated = request.headers().contains_key(header::AUTHORIZATION);

    let result = match state
        .throttler
        .evaluate(client_ip.as_deref(), Some(&path), authenticated)
        .await
    {
        Ok(result) => result,
        Err(err) => {
            error!(
                target: "gatekeeper::middleware",
                error = %err,
                path = %path,
                "Rate limiter error"
            );
            return ErrorResponse::internal().into_response();
        }
    };

    if result.rejected {
        return too_many_requests(&result);
    }

    request
        .extensions_mut()
        .insert(OverrideMatched(result.override_matched));

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(result.effective_limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(result.reset_epoch_seconds));
    response
}

fn too_many_requests(result: &EvaluationResult) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(TooManyRequestsResponse::new(result.retry_after_seconds)),
    )
        .into_response();
    response.headers_mut().insert(
        header::RETRY_AFTER,
        HeaderValue::from(result.retry_after_seconds),
    );
    response
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request).unwrap_or_else(|| "unknown".to_string());

    info!(
        target: "gatekeeper::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        target: "gatekeeper::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}

/// Proxy headers first, then the peer address of the connection.
fn get_client_ip(request: &Request) -> Option<String> {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            let ip_str = ip_str.trim();
            if !ip_str.is_empty() {
                return Some(ip_str.to_string());
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}
