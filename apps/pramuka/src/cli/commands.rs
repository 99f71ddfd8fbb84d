//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::Backend;
use crate::api;
use crate::config::AppConfig;
use pramuka_core::{
    AwardEligibility, CategoryId, Examiner, Gender, Institution, InstitutionId, Member, MemberId,
    PramukaError, RecordId, Registry, StorageBackend, Tier, Track, TrackRecord,
};
use serde::Serialize;
use std::path::PathBuf;

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub database: PathBuf,
    pub backend: Backend,
    pub config: PathBuf,
    pub json_mode: bool,
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the registry selected by the global options.
pub fn open_registry(ctx: &Context, config: &AppConfig) -> Result<Registry, PramukaError> {
    match ctx.backend {
        Backend::Redb => Registry::with_redb(&ctx.database, config.rules.clone()),
        Backend::Memory => Registry::with_backend(StorageBackend::default(), config.rules.clone()),
    }
}

fn load(ctx: &Context) -> Result<(AppConfig, Registry), PramukaError> {
    let config = AppConfig::load(&ctx.config)?;
    let registry = open_registry(ctx, &config)?;
    Ok((config, registry))
}

fn tier(n: u8) -> Result<Tier, PramukaError> {
    Tier::from_number(n).ok_or_else(|| PramukaError::InvalidInput(format!("no tier {}", n)))
}

/// Print `value` as pretty JSON.
fn print_json<T: Serialize>(value: &T) -> Result<(), PramukaError> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| PramukaError::Serialization(e.to_string()))?;
    println!("{}", output);
    Ok(())
}

fn print_tiers<R: TrackRecord>(record: &R) {
    for tier in R::TRACK.tiers() {
        match record.entry(*tier) {
            Some(entry) if entry.done => println!(
                "  {}: {} ({})",
                tier,
                entry.certificate,
                entry.date.map(|d| d.to_string()).unwrap_or_default()
            ),
            _ => println!("  {}: -", tier),
        }
    }
}

fn print_eligibility(eligibility: &AwardEligibility) {
    println!("Track A level: {:?}", eligibility.track_a_level);
    for tally in &eligibility.tiers {
        let verdict = if tally.is_satisfied() { "ok" } else { "short" };
        println!(
            "  {} {}: {} rows, minimum {} per category [{}]",
            Track::B,
            tally.tier,
            tally.total(),
            tally.minimum,
            verdict
        );
        for (category, count) in &tally.per_category {
            println!("    {}: {}", category, count);
        }
    }
    println!(
        "Eligible: {}",
        if eligibility.is_eligible() { "yes" } else { "no" }
    );
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    ctx: &Context,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), PramukaError> {
    let (mut config, registry) = load(ctx)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    println!("Pramuka Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Address:  {}", config.server.addr());
    println!("  Backend:  {}", ctx.backend.name());
    println!("  Database: {:?}", ctx.database);
    println!("  Config:   {:?}", ctx.config);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&config.server.addr(), registry).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), PramukaError> {
    if ctx.backend == Backend::Memory {
        return Err(PramukaError::InvalidInput(
            "the memory backend has nothing to initialize".to_string(),
        ));
    }
    if ctx.database.exists() {
        if !force {
            return Err(PramukaError::InvalidInput(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&ctx.database)
            .map_err(|e| PramukaError::Storage(format!("Remove database: {}", e)))?;
    }
    load(ctx)?;
    println!("Initialized new redb database at {:?}", ctx.database);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show progress counts.
pub fn cmd_status(ctx: &Context) -> Result<(), PramukaError> {
    let (_, registry) = load(ctx)?;
    let summary = registry.summary()?;

    if ctx.json_mode {
        let output = serde_json::json!({
            "database": ctx.database.to_string_lossy(),
            "backend": ctx.backend.name(),
            "summary": summary,
        });
        return print_json(&output);
    }

    println!("Pramuka Status");
    println!("==============");
    println!("Database: {:?}", ctx.database);
    println!("Backend:  {}", ctx.backend.name());
    println!();
    println!("Members:  {}", summary.members);
    for track in [&summary.track_a, &summary.track_b] {
        println!(
            "{}: {} participants, {} not started",
            track.track, track.participants, track.not_started
        );
        for tier in &track.completed {
            println!("  {}: {}", tier.tier, tier.count);
        }
    }
    println!(
        "Awards:   {} pending, {} approved",
        summary.awards.pending, summary.awards.approved
    );
    Ok(())
}

// =============================================================================
// DIRECTORY COMMANDS
// =============================================================================

/// Register or update an institution.
pub fn cmd_institution(
    ctx: &Context,
    id: u64,
    name: String,
    male_code: String,
    female_code: String,
) -> Result<(), PramukaError> {
    let (_, mut registry) = load(ctx)?;
    let institution = registry.register_institution(Institution {
        id: InstitutionId(id),
        name,
        gudep_code_male: male_code,
        gudep_code_female: female_code,
        deleted: false,
    })?;
    tracing::info!(
        event = "institution_registered",
        institution = id,
        "Institution registered"
    );

    if ctx.json_mode {
        return print_json(&institution);
    }
    println!("Registered {} ({})", institution.id, institution.name);
    Ok(())
}

/// Register or update a member.
pub fn cmd_member(
    ctx: &Context,
    id: u64,
    name: String,
    institution: u64,
    gender: Gender,
    number: String,
) -> Result<(), PramukaError> {
    let (_, mut registry) = load(ctx)?;
    let member = registry.register_member(Member {
        id: MemberId(id),
        name,
        member_number: number,
        gender,
        institution_id: InstitutionId(institution),
        deleted: false,
    })?;
    tracing::info!(
        event = "member_registered",
        member = id,
        institution,
        "Member registered"
    );

    if ctx.json_mode {
        return print_json(&member);
    }
    println!(
        "Registered {} ({}) in {}",
        member.id, member.name, member.institution_id
    );
    Ok(())
}

// =============================================================================
// PROMOTION COMMANDS
// =============================================================================

/// Promote a member's Track A.
pub fn cmd_promote_a(
    ctx: &Context,
    member: u64,
    tier_number: Option<u8>,
    examiner: Examiner,
) -> Result<(), PramukaError> {
    let (_, mut registry) = load(ctx)?;
    let record = match tier_number {
        Some(n) => registry.promote_track_a_to(MemberId(member), tier(n)?, &examiner)?,
        None => registry.promote_track_a(MemberId(member), &examiner)?,
    };
    let promoted = record.highest_done().unwrap_or(Tier::Tier1);
    tracing::info!(
        event = "track_a_promoted",
        member,
        record = record.id.0,
        tier = %promoted,
        "Track A promotion"
    );

    if ctx.json_mode {
        return print_json(&record);
    }
    println!("{} of {} ({}):", Track::A, record.member_id, record.id);
    print_tiers(&record);
    Ok(())
}

/// Promote a Track B row by (member, category) or by record id.
pub fn cmd_promote_b(
    ctx: &Context,
    member: Option<u64>,
    category: Option<u64>,
    record: Option<u64>,
    tier_number: u8,
    examiner: Examiner,
) -> Result<(), PramukaError> {
    let target = tier(tier_number)?;
    let (_, mut registry) = load(ctx)?;
    let row = match (record, member, category) {
        (Some(record), _, _) => {
            registry.promote_track_b_record(RecordId(record), target, &examiner)?
        }
        (None, Some(member), Some(category)) => registry.promote_track_b(
            MemberId(member),
            CategoryId(category),
            target,
            &examiner,
        )?,
        _ => {
            return Err(PramukaError::InvalidInput(
                "either --record or --member with --category is required".to_string(),
            ));
        }
    };
    tracing::info!(
        event = "track_b_promoted",
        member = row.member_id.0,
        record = row.id.0,
        category = row.category_id.0,
        tier = %target,
        "Track B promotion"
    );

    if ctx.json_mode {
        return print_json(&row);
    }
    println!(
        "{} of {} in {} ({}):",
        Track::B,
        row.member_id,
        row.category_id,
        row.id
    );
    print_tiers(&row);
    Ok(())
}

/// Revert one tier of a record.
pub fn cmd_revert(ctx: &Context, record: u64, tier_number: u8) -> Result<(), PramukaError> {
    let target = tier(tier_number)?;
    let (_, mut registry) = load(ctx)?;
    let reverted = registry.revert_tier(RecordId(record), target)?;
    tracing::info!(
        event = "tier_reverted",
        member = reverted.member_id().0,
        record,
        tier = %target,
        "Tier reverted"
    );

    if ctx.json_mode {
        return print_json(&reverted);
    }
    println!("Reverted {} of {}", target, reverted.id());
    Ok(())
}

// =============================================================================
// AWARD COMMANDS
// =============================================================================

/// Show eligibility, or evaluate and create the pending award.
pub fn cmd_award(ctx: &Context, member: u64, evaluate: bool) -> Result<(), PramukaError> {
    let (_, mut registry) = load(ctx)?;
    let member_id = MemberId(member);

    if !evaluate {
        let eligibility = registry.award_eligibility(member_id)?;
        let award = registry.award(member_id)?;
        if ctx.json_mode {
            let output = serde_json::json!({
                "eligibility": eligibility,
                "award": award,
            });
            return print_json(&output);
        }
        print_eligibility(&eligibility);
        if let Some(award) = award {
            println!("Award: {:?}", award.status);
        }
        return Ok(());
    }

    let award = registry.evaluate_award(member_id)?;
    tracing::info!(
        event = "award_created",
        member,
        count_tier2 = award.count_tier2,
        count_tier3 = award.count_tier3,
        "Award created"
    );
    if ctx.json_mode {
        return print_json(&award);
    }
    println!(
        "Award for {} created: {:?} (tier2 rows {}, tier3 rows {})",
        member_id, award.status, award.count_tier2, award.count_tier3
    );
    Ok(())
}

/// Approve a pending award.
pub fn cmd_approve(ctx: &Context, member: u64, by: &str) -> Result<(), PramukaError> {
    let (_, mut registry) = load(ctx)?;
    let award = registry.approve_award(MemberId(member), by)?;
    tracing::info!(event = "award_approved", member, approved_by = %by, "Award approved");

    if ctx.json_mode {
        return print_json(&award);
    }
    println!("Award for {} approved by {}", award.member_id, by.trim());
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
