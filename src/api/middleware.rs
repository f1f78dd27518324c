//! API Middleware
//!
//! Role extraction, rate limiting, and request logging, layered in that
//! order (auth -> rate-limit -> logging) so logging always sees the final
//! outcome.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::domain::Role;

use super::routes::AppState;

/// The caller's identity for this request, extracted from headers. There is
/// no persisted credential store — the role model is header-driven, not
/// API-key-driven, so unlike the DB-backed scheme this replaces, a caller is
/// authenticated by declaring who they are rather than presenting a secret.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller {
    pub role: Role,
    pub user_id: Option<String>,
    pub client_id: Option<Uuid>,
}

/// Extract the caller's role from `X-Role` (required) and optional
/// `X-User-Id`/`X-Client-Id` headers.
pub async fn auth_middleware(
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let role_header = match headers.get("X-Role").and_then(|v| v.to_str().ok()) {
        Some(role) => role,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Missing X-Role header",
                    "error_code": "missing_role"
                })),
            )
                .into_response());
        }
    };

    let role = match Role::from_str(role_header) {
        Ok(role) => role,
        Err(_) => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Invalid X-Role header",
                    "error_code": "invalid_role"
                })),
            )
                .into_response());
        }
    };

    let user_id = headers
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let client_id = match headers.get("X-Client-Id").and_then(|v| v.to_str().ok()) {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Invalid X-Client-Id header format",
                        "error_code": "invalid_client_id"
                    })),
                )
                    .into_response());
            }
        },
        None => None,
    };

    request.extensions_mut().insert(AuthenticatedCaller {
        role,
        user_id,
        client_id,
    });

    let correlation_id = headers
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    request
        .extensions_mut()
        .insert(crate::domain::RequestContext::new().with_correlation_id(correlation_id));

    Ok(next.run(request).await)
}

/// Fixed-window per-caller rate limiter. Replaces the teacher's
/// `check_and_increment_rate_limit` DB function with an in-process bound,
/// since this engine has no persisted API-key identity to key a DB table on.
pub struct RateLimiter {
    limit_per_minute: i32,
    windows: Mutex<HashMap<String, (Instant, i32)>>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: i32) -> Self {
        Self {
            limit_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn check_and_increment(&self, key: &str) -> bool {
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let now = Instant::now();
        let entry = windows.entry(key.to_string()).or_insert((now, 0));

        if now.duration_since(entry.0) >= Duration::from_secs(60) {
            *entry = (now, 0);
        }

        entry.1 += 1;
        entry.1 <= self.limit_per_minute
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let caller = match request.extensions().get::<AuthenticatedCaller>() {
        Some(caller) => caller.clone(),
        None => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Auth middleware must run first",
                    "error_code": "internal_error"
                })),
            )
                .into_response());
        }
    };

    let key = caller
        .user_id
        .clone()
        .unwrap_or_else(|| format!("{:?}", caller.role));

    if !state.rate_limiter.check_and_increment(&key) {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limit exceeded",
                "error_code": "rate_limit_exceeded"
            })),
        )
            .into_response());
    }

    Ok(next.run(request).await)
}

/// Headers that should be masked in logs.
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let headers = mask_headers_for_logging(request.headers());
    let correlation_id = request
        .extensions()
        .get::<crate::domain::RequestContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_headers_redacts_sensitive_values() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-api-key", "secret-key-12345".parse().unwrap());
        headers.insert("x-role", "ceo".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);

        let api_key = masked.iter().find(|(k, _)| k == "x-api-key");
        let content_type = masked.iter().find(|(k, _)| k == "content-type");
        let role = masked.iter().find(|(k, _)| k == "x-role");

        assert_eq!(api_key.unwrap().1, "[REDACTED]");
        assert_eq!(content_type.unwrap().1, "application/json");
        assert_eq!(role.unwrap().1, "ceo");
    }

    #[test]
    fn sensitive_headers_list_covers_auth_headers() {
        assert!(SENSITIVE_HEADERS.contains(&"x-api-key"));
        assert!(SENSITIVE_HEADERS.contains(&"authorization"));
        assert!(!SENSITIVE_HEADERS.contains(&"x-role"));
    }

    #[test]
    fn rate_limiter_blocks_after_limit_within_window() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.check_and_increment("caller-a"));
        assert!(limiter.check_and_increment("caller-a"));
        assert!(!limiter.check_and_increment("caller-a"));
        assert!(limiter.check_and_increment("caller-b"));
    }
}
