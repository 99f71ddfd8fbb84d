//! # Pramuka HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Progress counts over the caller's members
//! - `GET|POST /institutions`, `GET /institutions/{id}`
//! - `GET|POST /members`, `GET|DELETE /members/{id}`
//! - `GET /members/{id}/track-a`, `POST /members/{id}/track-a/promote`
//! - `GET /members/{id}/track-b`, `POST /members/{id}/track-b/promote`
//! - `GET|POST /members/{id}/award`, `GET /members/{id}/award/eligibility`,
//!   `POST /members/{id}/award/approve`
//! - `GET|DELETE /records/{id}`, `POST /records/{id}/promote`,
//!   `POST /records/{id}/revert`
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `PRAMUKA_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `PRAMUKA_RATE_LIMIT`: Requests per second per caller (default: 100, 0 to disable)
//! - `PRAMUKA_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{
    Caller, INSTITUTION_HEADER, ROLE_HEADER, caller_from_headers, get_api_key_from_env,
};
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    ApiError, ApproveRequest, ErrorResponse, HealthResponse, InstitutionRequest, MemberRequest,
    PromoteRecordRequest, PromoteTrackARequest, PromoteTrackBRequest, RevertRequest,
    StatusResponse,
};

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use pramuka_core::{PramukaError, Registry};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the registry.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RwLock<Registry>>,
}

impl AppState {
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const CORS_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

fn cors_headers() -> [HeaderName; 4] {
    [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static(ROLE_HEADER),
        HeaderName::from_static(INSTITUTION_HEADER),
    ]
}

/// Build CORS layer from `PRAMUKA_CORS_ORIGINS`.
///
/// - `*`: allows all origins
/// - unset or without a valid origin: localhost only
/// - otherwise: the comma-separated list of origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("PRAMUKA_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (PRAMUKA_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in PRAMUKA_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(CORS_METHODS)
                    .allow_headers(cors_headers())
            }
        }
        None => {
            tracing::info!("CORS: No PRAMUKA_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(CORS_METHODS)
        .allow_headers(cors_headers())
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Rate Limiting - one bucket per caller (if enabled)
/// 4. Authentication - validates API key (if configured)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second per caller", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set PRAMUKA_API_KEY environment variable to enable authentication."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route(
            "/institutions",
            get(handlers::list_institutions_handler).post(handlers::register_institution_handler),
        )
        .route("/institutions/{id}", get(handlers::institution_handler))
        .route(
            "/members",
            get(handlers::list_members_handler).post(handlers::register_member_handler),
        )
        .route(
            "/members/{id}",
            get(handlers::member_handler).delete(handlers::delete_member_handler),
        )
        .route("/members/{id}/track-a", get(handlers::track_a_handler))
        .route(
            "/members/{id}/track-a/promote",
            post(handlers::promote_track_a_handler),
        )
        .route("/members/{id}/track-b", get(handlers::track_b_handler))
        .route(
            "/members/{id}/track-b/promote",
            post(handlers::promote_track_b_handler),
        )
        .route(
            "/members/{id}/award",
            get(handlers::award_handler).post(handlers::evaluate_award_handler),
        )
        .route(
            "/members/{id}/award/eligibility",
            get(handlers::award_eligibility_handler),
        )
        .route(
            "/members/{id}/award/approve",
            post(handlers::approve_award_handler),
        )
        .route(
            "/records/{id}",
            get(handlers::record_handler).delete(handlers::delete_record_handler),
        )
        .route("/records/{id}/promote", post(handlers::promote_record_handler))
        .route("/records/{id}/revert", post(handlers::revert_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, registry: Registry) -> Result<(), PramukaError> {
    let router = create_router(AppState::new(registry));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PramukaError::Storage(format!("Bind failed: {}", e)))?;

    tracing::info!("Pramuka HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| PramukaError::Storage(format!("Server error: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================
