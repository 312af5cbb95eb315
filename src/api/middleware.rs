//! API Middleware
//!
//! Caller-context extraction, request body and path extractors, and
//! request logging.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequest, FromRequestParts},
    http::{request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::domain::{CallerContext, CallerRole};
use crate::error::AppError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ROLE_HEADER: &str = "x-caller-role";
pub const CORRELATION_HEADER: &str = "x-correlation-id";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Read the caller from `x-tenant-id` and `x-caller-role`.
///
/// A missing or malformed header is unauthenticated. The correlation id is
/// taken from `x-correlation-id` when it parses, otherwise generated.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<CallerContext, AppError> {
    let tenant_id = header_str(headers, TENANT_HEADER)
        .ok_or_else(|| AppError::Unauthenticated(format!("missing {TENANT_HEADER} header")))?
        .parse::<Uuid>()
        .map_err(|_| AppError::Unauthenticated(format!("malformed {TENANT_HEADER} header")))?;
    if tenant_id.is_nil() {
        return Err(AppError::Unauthenticated(format!("malformed {TENANT_HEADER} header")));
    }

    let role = header_str(headers, ROLE_HEADER)
        .ok_or_else(|| AppError::Unauthenticated(format!("missing {ROLE_HEADER} header")))?
        .parse::<CallerRole>()
        .map_err(AppError::Unauthenticated)?;

    let correlation_id = header_str(headers, CORRELATION_HEADER)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    Ok(CallerContext::new(tenant_id, role).with_correlation_id(correlation_id))
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CallerContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers)
    }
}

/// JSON body whose rejection is reported as `invalid_argument`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Path parameters whose rejection is reported as `invalid_argument`
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Query string whose rejection is reported as `invalid_argument`
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let tenant_id = header_str(request.headers(), TENANT_HEADER).map(str::to_string);
    let role = header_str(request.headers(), ROLE_HEADER).map(str::to_string);
    let correlation_id = header_str(request.headers(), CORRELATION_HEADER).map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        tenant_id = ?tenant_id,
        role = ?role,
        correlation_id = ?correlation_id,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
