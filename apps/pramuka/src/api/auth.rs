//! # Authentication Module
//!
//! API key authentication and caller identification for the HTTP API.
//!
//! ## Configuration
//!
//! - `PRAMUKA_API_KEY`: If set, all requests (except /health) require this key
//!
//! ## Usage
//!
//! ```text
//! Authorization: Bearer <your-api-key>
//! X-Pramuka-Role: admin | super_admin | user
//! X-Pramuka-Institution: <institution id>
//! ```
//!
//! Sessions are issued upstream. The gateway holding the API key forwards the
//! authenticated caller's role and institution in the two `X-Pramuka-*`
//! headers, which [`Caller`] turns into a [`CallerContext`].

use super::types::ApiError;
use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{HeaderMap, Request, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use pramuka_core::{CallerContext, InstitutionId, PramukaError, Role};
use subtle::ConstantTimeEq;

/// Header carrying the caller's role.
pub const ROLE_HEADER: &str = "x-pramuka-role";

/// Header carrying the caller's institution id.
pub const INSTITUTION_HEADER: &str = "x-pramuka-institution";

// =============================================================================
// API KEY AUTHENTICATION
// =============================================================================

/// Get API key from environment variable.
///
/// Returns `Some(key)` if `PRAMUKA_API_KEY` is set and non-empty,
/// `None` otherwise (disabling authentication).
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var("PRAMUKA_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

/// Compare two keys in constant time, independent of where they differ.
fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    let max_len = provided.len().max(expected.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided.len()].copy_from_slice(provided);
    padded_expected[..expected.len()].copy_from_slice(expected);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided.len() == expected.len()
}

/// API key authentication middleware.
///
/// If `PRAMUKA_API_KEY` is set:
/// - `/health` endpoint is always allowed (for load balancer health checks)
/// - All other endpoints require `Authorization: Bearer <key>` header
pub async fn api_key_auth_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(expected) = get_api_key_from_env() else {
        return Ok(next.run(request).await);
    };

    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header_value) => {
            let provided = header_value.strip_prefix("Bearer ").unwrap_or(header_value);
            if keys_match(provided.as_bytes(), expected.as_bytes()) {
                Ok(next.run(request).await)
            } else {
                tracing::warn!(
                    event = "auth_failure",
                    reason = "invalid_api_key",
                    "Authentication failed: invalid API key"
                );
                Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
            }
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// CALLER EXTRACTOR
// =============================================================================

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub CallerContext);

fn parse_role(value: &str) -> Result<Role, PramukaError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
        "admin" => Ok(Role::Admin),
        "user" => Ok(Role::User),
        other => Err(PramukaError::InvalidInput(format!(
            "unknown role {:?}",
            other
        ))),
    }
}

/// Read the caller context from request headers.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<CallerContext, PramukaError> {
    let header_str = |name: &str| -> Result<Option<&str>, PramukaError> {
        headers
            .get(name)
            .map(|v| {
                v.to_str()
                    .map_err(|_| PramukaError::InvalidInput(format!("{} is not ASCII", name)))
            })
            .transpose()
    };

    let role = header_str(ROLE_HEADER)?
        .ok_or_else(|| PramukaError::InvalidInput(format!("missing {} header", ROLE_HEADER)))
        .and_then(parse_role)?;
    let institution_id = header_str(INSTITUTION_HEADER)?
        .map(|v| {
            v.trim().parse::<u64>().map(InstitutionId).map_err(|_| {
                PramukaError::InvalidInput(format!("{} must be a number", INSTITUTION_HEADER))
            })
        })
        .transpose()?;

    Ok(CallerContext {
        role,
        institution_id,
    })
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller(caller_from_headers(&parts.headers)?))
    }
}

// =============================================================================
// TESTS
// =============================================================================
