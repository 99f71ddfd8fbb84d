//! # Middleware Module
//!
//! Per-caller rate limiting for the Pramuka HTTP API.
//!
//! Each institution gets its own bucket, administrators share one, and
//! requests without a readable caller (including `/health`) share another.
//! One busy unit therefore cannot starve the others.
//!
//! ## Configuration
//!
//! - `PRAMUKA_RATE_LIMIT`: Requests per second per caller (default: 100, 0 disables)

use super::auth::caller_from_headers;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore,
};
use pramuka_core::InstitutionId;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Default rate limit in requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

const DEFAULT_RPS: NonZeroU32 = NonZeroU32::MIN.saturating_add(DEFAULT_RATE_LIMIT - 1);

/// Buckets kept before idle ones are dropped.
const MAX_TRACKED_CALLERS: usize = 4096;

// =============================================================================
// CALLER KEY
// =============================================================================

/// Rate-limit bucket of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallerKey {
    Admin,
    Institution(InstitutionId),
    Anonymous,
}

impl CallerKey {
    /// Bucket for the caller named in `headers`.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match caller_from_headers(headers) {
            Ok(caller) if caller.role.is_admin() => CallerKey::Admin,
            Ok(caller) => caller
                .institution_id
                .map_or(CallerKey::Anonymous, CallerKey::Institution),
            Err(_) => CallerKey::Anonymous,
        }
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Rate limiter keyed by [`CallerKey`].
pub type CallerRateLimiter =
    Arc<RateLimiter<CallerKey, DefaultKeyedStateStore<CallerKey>, DefaultClock>>;

/// Create a per-caller rate limiter. Zero falls back to the default.
pub fn create_rate_limiter(requests_per_second: u32) -> CallerRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_RPS);
    Arc::new(RateLimiter::keyed(Quota::per_second(rps)))
}

/// Value of `PRAMUKA_RATE_LIMIT`, or the default if unset or malformed.
pub fn get_rate_limit_from_env() -> u32 {
    std::env::var("PRAMUKA_RATE_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT)
}

/// Returns 429 Too Many Requests once the caller's bucket is empty.
pub async fn rate_limit_middleware(
    State(limiter): State<CallerRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if limiter.len() > MAX_TRACKED_CALLERS {
        limiter.retain_recent();
    }
    let key = CallerKey::from_headers(request.headers());
    if limiter.check_key(&key).is_err() {
        tracing::warn!(
            event = "rate_limited",
            caller = ?key,
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        return Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"));
    }
    Ok(next.run(request).await)
}

// =============================================================================
// TESTS
// =============================================================================
