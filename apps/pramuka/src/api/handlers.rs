//! # API Endpoint Handlers
//!
//! Every handler scopes the registry to the request's [`Caller`] before
//! touching it. Reads share the registry lock, mutations take it exclusively
//! and emit one audit event on success.

use super::{
    AppState,
    auth::Caller,
    types::{
        ApiError, ApiJson, ApiPath, ApiResult, ApproveRequest, HealthResponse,
        InstitutionRequest, MemberRequest, PromoteRecordRequest, PromoteTrackARequest,
        PromoteTrackBRequest, RevertRequest, StatusResponse,
    },
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use pramuka_core::{
    AwardEligibility, AwardRecord, CategoryId, Institution, InstitutionId, Member, MemberId,
    MemberTrackA, MemberTrackB, Record, RecordId, ScopedRegistry, Tier, TrackRecord,
};

/// Certificate issued for `tier`, empty if the tier is not done.
fn certificate_of<R: TrackRecord>(record: &R, tier: Tier) -> &str {
    record.entry(tier).map_or("", |e| e.certificate.as_str())
}

// =============================================================================
// HEALTH & STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Progress counts over the caller's members.
pub async fn status_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> ApiResult<StatusResponse> {
    let registry = state.registry.read().await;
    let backend = if registry.is_persistent() { "redb" } else { "memory" };
    let scoped = ScopedRegistry::new(&*registry, caller)?;
    Ok(Json(StatusResponse {
        backend: backend.to_string(),
        summary: scoped.summary()?,
    }))
}

// =============================================================================
// INSTITUTIONS
// =============================================================================

pub async fn list_institutions_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> ApiResult<Vec<Institution>> {
    let registry = state.registry.read().await;
    Ok(Json(ScopedRegistry::new(&*registry, caller)?.institutions()?))
}

pub async fn institution_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Institution> {
    let registry = state.registry.read().await;
    let scoped = ScopedRegistry::new(&*registry, caller)?;
    Ok(Json(scoped.institution(InstitutionId(id))?))
}

/// Register or update an institution (administrators only).
pub async fn register_institution_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiJson(request): ApiJson<InstitutionRequest>,
) -> Result<(StatusCode, Json<Institution>), ApiError> {
    let mut registry = state.registry.write().await;
    let mut scoped = ScopedRegistry::new(&mut *registry, caller)?;
    let institution = scoped.register_institution(request.into())?;
    tracing::info!(
        event = "institution_registered",
        institution = institution.id.0,
        name = %institution.name,
        "Institution registered"
    );
    Ok((StatusCode::CREATED, Json(institution)))
}

// =============================================================================
// MEMBERS
// =============================================================================

pub async fn list_members_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> ApiResult<Vec<Member>> {
    let registry = state.registry.read().await;
    Ok(Json(ScopedRegistry::new(&*registry, caller)?.members()?))
}

pub async fn member_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Member> {
    let registry = state.registry.read().await;
    Ok(Json(ScopedRegistry::new(&*registry, caller)?.member(MemberId(id))?))
}

/// Register or update a member of the caller's institution.
pub async fn register_member_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiJson(request): ApiJson<MemberRequest>,
) -> Result<(StatusCode, Json<Member>), ApiError> {
    let mut registry = state.registry.write().await;
    let mut scoped = ScopedRegistry::new(&mut *registry, caller)?;
    let member = scoped.register_member(request.into())?;
    tracing::info!(
        event = "member_registered",
        member = member.id.0,
        institution = member.institution_id.0,
        "Member registered"
    );
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn delete_member_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Member> {
    let mut registry = state.registry.write().await;
    let mut scoped = ScopedRegistry::new(&mut *registry, caller)?;
    let member = scoped.delete_member(MemberId(id))?;
    tracing::info!(event = "member_deleted", member = id, "Member deleted");
    Ok(Json(member))
}

// =============================================================================
// TRACK A
// =============================================================================

pub async fn track_a_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Option<MemberTrackA>> {
    let registry = state.registry.read().await;
    Ok(Json(ScopedRegistry::new(&*registry, caller)?.track_a(MemberId(id))?))
}

/// Advance a member's Track A, or promote it to an explicit tier.
pub async fn promote_track_a_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
    ApiJson(request): ApiJson<PromoteTrackARequest>,
) -> ApiResult<MemberTrackA> {
    let mut registry = state.registry.write().await;
    let mut scoped = ScopedRegistry::new(&mut *registry, caller)?;
    let member = MemberId(id);
    let record = match request.tier {
        Some(tier) => scoped.promote_track_a_to(member, tier, &request.examiner)?,
        None => scoped.promote_track_a(member, &request.examiner)?,
    };
    let tier = record.highest_done().unwrap_or(Tier::Tier1);
    tracing::info!(
        event = "track_a_promoted",
        member = id,
        record = record.id.0,
        tier = %tier,
        certificate = %certificate_of(&record, tier),
        "Track A promotion"
    );
    Ok(Json(record))
}

// =============================================================================
// TRACK B
// =============================================================================

pub async fn track_b_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Vec<MemberTrackB>> {
    let registry = state.registry.read().await;
    Ok(Json(ScopedRegistry::new(&*registry, caller)?.track_b(MemberId(id))?))
}

/// Promote a member's Track B row in one category.
pub async fn promote_track_b_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
    ApiJson(request): ApiJson<PromoteTrackBRequest>,
) -> ApiResult<MemberTrackB> {
    let mut registry = state.registry.write().await;
    let mut scoped = ScopedRegistry::new(&mut *registry, caller)?;
    let row = scoped.promote_track_b(
        MemberId(id),
        CategoryId(request.category_id),
        request.tier,
        &request.examiner,
    )?;
    tracing::info!(
        event = "track_b_promoted",
        member = id,
        record = row.id.0,
        category = request.category_id,
        tier = %request.tier,
        certificate = %certificate_of(&row, request.tier),
        "Track B promotion"
    );
    Ok(Json(row))
}

// =============================================================================
// RECORDS
// =============================================================================

pub async fn record_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Record> {
    let registry = state.registry.read().await;
    Ok(Json(ScopedRegistry::new(&*registry, caller)?.record(RecordId(id))?))
}

/// Promote one Track B row addressed by record id.
pub async fn promote_record_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
    ApiJson(request): ApiJson<PromoteRecordRequest>,
) -> ApiResult<MemberTrackB> {
    let mut registry = state.registry.write().await;
    let mut scoped = ScopedRegistry::new(&mut *registry, caller)?;
    let row = scoped.promote_track_b_record(RecordId(id), request.tier, &request.examiner)?;
    tracing::info!(
        event = "track_b_promoted",
        member = row.member_id.0,
        record = id,
        category = row.category_id.0,
        tier = %request.tier,
        certificate = %certificate_of(&row, request.tier),
        "Track B promotion"
    );
    Ok(Json(row))
}

/// Revert one tier of a Track A or Track B record.
pub async fn revert_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
    ApiJson(request): ApiJson<RevertRequest>,
) -> ApiResult<Record> {
    let mut registry = state.registry.write().await;
    let mut scoped = ScopedRegistry::new(&mut *registry, caller)?;
    let record = scoped.revert_tier(RecordId(id), request.tier)?;
    tracing::info!(
        event = "tier_reverted",
        member = record.member_id().0,
        record = id,
        tier = %request.tier,
        "Tier reverted"
    );
    Ok(Json(record))
}

pub async fn delete_record_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Record> {
    let mut registry = state.registry.write().await;
    let mut scoped = ScopedRegistry::new(&mut *registry, caller)?;
    let record = scoped.delete_record(RecordId(id))?;
    tracing::info!(
        event = "record_deleted",
        member = record.member_id().0,
        record = id,
        "Record deleted"
    );
    Ok(Json(record))
}

// =============================================================================
// AWARD
// =============================================================================

pub async fn award_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Option<AwardRecord>> {
    let registry = state.registry.read().await;
    Ok(Json(ScopedRegistry::new(&*registry, caller)?.award(MemberId(id))?))
}

pub async fn award_eligibility_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<AwardEligibility> {
    let registry = state.registry.read().await;
    let scoped = ScopedRegistry::new(&*registry, caller)?;
    Ok(Json(scoped.award_eligibility(MemberId(id))?))
}

/// Create the member's pending award if every threshold holds.
pub async fn evaluate_award_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
) -> Result<(StatusCode, Json<AwardRecord>), ApiError> {
    let mut registry = state.registry.write().await;
    let mut scoped = ScopedRegistry::new(&mut *registry, caller)?;
    let award = scoped.evaluate_award(MemberId(id))?;
    tracing::info!(
        event = "award_created",
        member = id,
        count_tier2 = award.count_tier2,
        count_tier3 = award.count_tier3,
        "Award created"
    );
    Ok((StatusCode::CREATED, Json(award)))
}

/// Approve a pending award (administrators only).
pub async fn approve_award_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<u64>,
    ApiJson(request): ApiJson<ApproveRequest>,
) -> ApiResult<AwardRecord> {
    let mut registry = state.registry.write().await;
    let mut scoped = ScopedRegistry::new(&mut *registry, caller)?;
    let award = scoped.approve_award(MemberId(id), &request.approved_by)?;
    tracing::info!(
        event = "award_approved",
        member = id,
        approved_by = %request.approved_by.trim(),
        "Award approved"
    );
    Ok(Json(award))
}
