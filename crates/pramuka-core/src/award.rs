//! # Award Aggregation Engine
//!
//! Decides Garuda award eligibility from a member's records on both tracks.
//!
//! ## Rules
//!
//! 1. Track A must be at `LEVEL2` (both tiers done).
//! 2. For every Track B tier, completed rows are counted per category.
//!    The tier holds iff at least one category has completed rows and every
//!    such category reaches the tier's minimum.
//! 3. All three tiers must hold.
//!
//! An existing award fails the whole evaluation with `DuplicateAward`
//! before any threshold is looked at. The engine reads tracks through
//! [`TrackQuery`] and writes only through [`AwardStore`].

use crate::config::RuleConfig;
use crate::promotion::retrying;
use crate::records::{
    AwardRecord, AwardStatus, MemberTrackA, MemberTrackB, TrackALevel, TrackRecord,
};
use crate::store::{AwardStore, Directory, TrackQuery};
use crate::{CategoryId, MemberId, PramukaError, Tier, Track};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Completed rows per category at one tier.
pub type CategoryTally = BTreeMap<CategoryId, u32>;

/// Tally and verdict of one Track B tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTally {
    pub tier: Tier,
    pub per_category: CategoryTally,
    pub minimum: u32,
}

impl TierTally {
    /// Completed rows across all categories.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.per_category.values().fold(0, |acc, n| acc.saturating_add(*n))
    }

    /// Whether the tier's requirement holds.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        !self.per_category.is_empty() && self.per_category.values().all(|n| *n >= self.minimum)
    }

    /// Categories below the minimum.
    #[must_use]
    pub fn short_categories(&self) -> Vec<CategoryId> {
        self.per_category
            .iter()
            .filter(|(_, n)| **n < self.minimum)
            .map(|(category, _)| *category)
            .collect()
    }
}

/// Everything the award decision is based on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardEligibility {
    pub member_id: MemberId,
    pub track_a_level: TrackALevel,
    /// One tally per Track B tier, in tier order.
    pub tiers: Vec<TierTally>,
}

impl AwardEligibility {
    /// Tally of one tier.
    #[must_use]
    pub fn tally(&self, tier: Tier) -> Option<&TierTally> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.track_a_level == TrackALevel::Level2 && self.tiers.iter().all(TierTally::is_satisfied)
    }

    /// `PrerequisiteNotMet` naming the first unmet requirement.
    pub fn check(&self) -> Result<(), PramukaError> {
        if self.track_a_level != TrackALevel::Level2 {
            return Err(PramukaError::PrerequisiteNotMet(format!(
                "award requires {} {} for {}, found {:?}",
                Track::A,
                Tier::Tier2,
                self.member_id,
                self.track_a_level
            )));
        }
        for tally in &self.tiers {
            if tally.per_category.is_empty() {
                return Err(PramukaError::PrerequisiteNotMet(format!(
                    "award requires completed {} {} rows for {}",
                    Track::B,
                    tally.tier,
                    self.member_id
                )));
            }
            let short = tally.short_categories();
            if !short.is_empty() {
                let names: Vec<String> = short.iter().map(ToString::to_string).collect();
                return Err(PramukaError::PrerequisiteNotMet(format!(
                    "award requires {} completed {} {} rows per category; short: {}",
                    tally.minimum,
                    Track::B,
                    tally.tier,
                    names.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Evaluates and approves awards for a rule set.
#[derive(Debug, Clone, Copy)]
pub struct AwardEngine<'a> {
    rules: &'a RuleConfig,
}

impl<'a> AwardEngine<'a> {
    #[must_use]
    pub fn new(rules: &'a RuleConfig) -> Self {
        Self { rules }
    }

    /// Tally a member's records. Deleted records are ignored.
    #[must_use]
    pub fn assess(
        &self,
        member_id: MemberId,
        track_a: Option<&MemberTrackA>,
        rows: &[MemberTrackB],
    ) -> AwardEligibility {
        let tiers = Track::B
            .tiers()
            .iter()
            .map(|&tier| {
                let mut per_category = CategoryTally::new();
                for row in rows.iter().filter(|r| !r.deleted && r.is_done(tier)) {
                    let count = per_category.entry(row.category_id).or_insert(0);
                    *count = count.saturating_add(1);
                }
                TierTally {
                    tier,
                    per_category,
                    minimum: self.rules.award.minimum(tier),
                }
            })
            .collect();
        AwardEligibility {
            member_id,
            track_a_level: TrackALevel::of(track_a),
            tiers,
        }
    }

    /// Read-only eligibility report for a member.
    pub fn eligibility<S: TrackQuery + Directory + ?Sized>(
        &self,
        store: &S,
        member: MemberId,
    ) -> Result<AwardEligibility, PramukaError> {
        store.live_member(member)?;
        let track_a = store.track_a_for_member(member)?;
        let rows = store.track_b_for_member(member)?;
        Ok(self.assess(member, track_a.as_ref(), &rows))
    }

    /// Create the member's PENDING award if every threshold holds.
    pub fn evaluate<S: TrackQuery + AwardStore + Directory + ?Sized>(
        &self,
        store: &mut S,
        member: MemberId,
        now: DateTime<Utc>,
    ) -> Result<AwardRecord, PramukaError> {
        store.live_member(member)?;
        if store.award_for_member(member)?.is_some() {
            return Err(PramukaError::DuplicateAward(member));
        }

        let eligibility = self.eligibility(&*store, member)?;
        eligibility.check()?;

        let count = |tier| eligibility.tally(tier).map_or(0, TierTally::total);
        store.insert_award(AwardRecord {
            member_id: member,
            track_a_level: eligibility.track_a_level,
            count_tier1: self.rules.award.tier1_count_placeholder,
            count_tier2: count(Tier::Tier2),
            count_tier3: count(Tier::Tier3),
            status: AwardStatus::Pending,
            approved_by: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Move a PENDING award to APPROVED.
    pub fn approve<S: AwardStore + Directory + ?Sized>(
        &self,
        store: &mut S,
        member: MemberId,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<AwardRecord, PramukaError> {
        let approved_by = approved_by.trim();
        if approved_by.is_empty() {
            return Err(PramukaError::InvalidInput(
                "approver must not be empty".to_string(),
            ));
        }
        store.live_member(member)?;
        retrying(|| {
            let mut award = store
                .award_for_member(member)?
                .ok_or_else(|| PramukaError::NotFound(format!("award of {}", member)))?;
            if award.status == AwardStatus::Approved {
                return Err(PramukaError::InvalidInput(format!(
                    "award of {} is already approved",
                    member
                )));
            }
            let revision = award.revision;
            award.status = AwardStatus::Approved;
            award.approved_by = Some(approved_by.to_string());
            award.updated_at = now;
            store.save_award(award, revision)
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
