//! # API Request/Response Types
//!
//! JSON structures of the HTTP API and the mapping from core errors to
//! HTTP statuses.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use pramuka_core::{
    Examiner, Gender, Institution, InstitutionId, Member, MemberId, PramukaError, Summary, Tier,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Handler result: JSON on success, an error body otherwise.
pub type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Progress counts over the caller's visible members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `redb` or `memory`.
    pub backend: String,
    #[serde(flatten)]
    pub summary: Summary,
}

// =============================================================================
// DIRECTORY REQUESTS
// =============================================================================

/// Register or update an institution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionRequest {
    pub id: u64,
    pub name: String,
    pub gudep_code_male: String,
    pub gudep_code_female: String,
}

impl From<InstitutionRequest> for Institution {
    fn from(request: InstitutionRequest) -> Self {
        Institution {
            id: InstitutionId(request.id),
            name: request.name,
            gudep_code_male: request.gudep_code_male,
            gudep_code_female: request.gudep_code_female,
            deleted: false,
        }
    }
}

/// Register or update a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRequest {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub member_number: String,
    #[serde(default)]
    pub gender: Gender,
    pub institution_id: u64,
}

impl From<MemberRequest> for Member {
    fn from(request: MemberRequest) -> Self {
        Member {
            id: MemberId(request.id),
            name: request.name,
            member_number: request.member_number,
            gender: request.gender,
            institution_id: InstitutionId(request.institution_id),
            deleted: false,
        }
    }
}

// =============================================================================
// PROMOTION REQUESTS
// =============================================================================

/// Promote a member's Track A. Without `tier` the track advances by one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromoteTrackARequest {
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub examiner: Examiner,
}

/// Promote a member's Track B in one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteTrackBRequest {
    pub category_id: u64,
    pub tier: Tier,
    #[serde(default)]
    pub examiner: Examiner,
}

/// Promote one Track B row addressed by record id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteRecordRequest {
    pub tier: Tier,
    #[serde(default)]
    pub examiner: Examiner,
}

/// Revert one tier of a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertRequest {
    pub tier: Tier,
}

/// Approve a pending award.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub approved_by: String,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine code (`not_found`, `too_soon`, ...).
    pub code: String,
    pub error: String,
}

/// A core error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub PramukaError);

impl From<PramukaError> for ApiError {
    fn from(error: PramukaError) -> Self {
        Self(error)
    }
}

impl ApiError {
    /// HTTP status of the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PramukaError::NotFound(_) => StatusCode::NOT_FOUND,
            PramukaError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PramukaError::Forbidden(_) => StatusCode::FORBIDDEN,
            PramukaError::PrerequisiteNotMet(_)
            | PramukaError::TooSoon { .. }
            | PramukaError::MissingPrerequisiteDate { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PramukaError::AlreadyPromoted { .. }
            | PramukaError::DuplicateAward(_)
            | PramukaError::HigherTierExists { .. }
            | PramukaError::Conflict(_) => StatusCode::CONFLICT,
            PramukaError::Storage(_) | PramukaError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.0.code();
        let message = if status.is_server_error() {
            tracing::error!(event = "internal_error", code, "{}", self.0);
            "Internal error".to_string()
        } else {
            tracing::warn!(event = "rejected", code, "{}", self.0);
            self.0.to_string()
        };
        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                error: message,
            }),
        )
            .into_response()
    }
}

// =============================================================================
// EXTRACTORS
// =============================================================================

/// JSON body whose rejections answer with an [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S: Send + Sync, T: DeserializeOwned> FromRequest<S> for ApiJson<T> {
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(request, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(|rejection| ApiError(PramukaError::InvalidInput(rejection.body_text())))
    }
}

/// Path parameters whose rejections answer with an [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiPath<T>(pub T);

impl<S: Send + Sync, T: DeserializeOwned + Send> FromRequestParts<S> for ApiPath<T> {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| ApiPath(value))
            .map_err(|rejection| ApiError(PramukaError::InvalidInput(rejection.body_text())))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pramuka_core::Track;

    #[test]
    fn rule_failures_are_unprocessable() {
        let error = ApiError(PramukaError::TooSoon {
            track: Track::B,
            tier: Tier::Tier2,
            previous: Tier::Tier1,
            elapsed_days: 3,
            required_days: 30,
        });
        assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            ApiError(PramukaError::DuplicateAward(MemberId(1))).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn storage_errors_are_internal() {
        let error = ApiError(PramukaError::Storage("disk full".into()));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn track_a_request_defaults() {
        let request: PromoteTrackARequest = serde_json::from_str("{}").expect("parse");
        assert!(request.tier.is_none());
        assert_eq!(request.examiner, Examiner::default());
    }

    #[test]
    fn member_request_accepts_source_gender_names() {
        let request: MemberRequest = serde_json::from_str(
            r#"{"id": 4, "name": "Rani", "gender": "Perempuan", "institution_id": 2}"#,
        )
        .expect("parse");
        let member = Member::from(request);
        assert_eq!(member.gender, Gender::Female);
        assert!(!member.deleted);
    }
}
