//! # Persisted Records
//!
//! The data model owned by the record store:
//! - `MemberTrackA`: one per member, two tiers
//! - `MemberTrackB`: one row per (member, category) completion, three tiers
//! - `AwardRecord`: at most one per member
//!
//! Both track records expose their tiers through the [`TrackRecord`] trait so
//! the promotion engine can apply one set of rules to either track.
//!
//! ## Invariants
//!
//! Within any track record, for every tier N > 1:
//! - `tierN.done ⇒ tier(N-1).done`
//! - `tierN.date.is_some() ⇔ tierN.done`

use crate::{CategoryId, Examiner, MemberId, PramukaError, RecordId, Tier, Track};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// TIER ENTRY
// =============================================================================

/// Completion state of one tier inside a track record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TierEntry {
    /// Tier flag.
    pub done: bool,
    /// Certificate number, empty until issued.
    pub certificate: String,
    /// Calendar date the tier was granted.
    pub date: Option<NaiveDate>,
    /// Who examined the member for this tier.
    pub examiner: Examiner,
}

impl TierEntry {
    /// Mark the tier complete.
    pub fn complete(&mut self, certificate: String, date: NaiveDate, examiner: Examiner) {
        self.done = true;
        self.certificate = certificate;
        self.date = Some(date);
        self.examiner = examiner;
    }

    /// Reset the tier to its not-started state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// TRACK RECORD TRAIT
// =============================================================================

/// Shared view over Track A and Track B records.
pub trait TrackRecord {
    /// The track this record belongs to.
    const TRACK: Track;

    fn id(&self) -> RecordId;
    fn member_id(&self) -> MemberId;
    fn revision(&self) -> u64;
    fn is_deleted(&self) -> bool;

    /// Tier entries in ascending order.
    fn entries(&self) -> &[TierEntry];
    fn entries_mut(&mut self) -> &mut [TierEntry];

    /// Stamp the last-modified time.
    fn touch(&mut self, now: DateTime<Utc>);

    /// Entry for a tier, `None` if the track has no such tier.
    fn entry(&self, tier: Tier) -> Option<&TierEntry> {
        self.entries().get(tier.index())
    }

    fn entry_mut(&mut self, tier: Tier) -> Option<&mut TierEntry> {
        self.entries_mut().get_mut(tier.index())
    }

    /// Whether a tier is marked done.
    fn is_done(&self, tier: Tier) -> bool {
        self.entry(tier).is_some_and(|e| e.done)
    }

    /// Highest completed tier.
    fn highest_done(&self) -> Option<Tier> {
        Self::TRACK
            .tiers()
            .iter()
            .rev()
            .copied()
            .find(|tier| self.is_done(*tier))
    }

    /// Check the ordering and dating invariants.
    fn check_invariants(&self) -> Result<(), PramukaError> {
        for tier in Self::TRACK.tiers() {
            let Some(entry) = self.entry(*tier) else {
                continue;
            };
            if entry.done != entry.date.is_some() {
                return Err(PramukaError::InvalidInput(format!(
                    "{} {} of {} has done={} but date={:?}",
                    Self::TRACK,
                    tier,
                    self.id(),
                    entry.done,
                    entry.date
                )));
            }
            if let Some(previous) = tier.previous() {
                if entry.done && !self.is_done(previous) {
                    return Err(PramukaError::InvalidInput(format!(
                        "{} {} of {} is done while {} is not",
                        Self::TRACK,
                        tier,
                        self.id(),
                        previous
                    )));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// TRACK A
// =============================================================================

/// A member's Track A (two-tier) progress. One per member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberTrackA {
    pub id: RecordId,
    pub member_id: MemberId,
    pub tiers: [TierEntry; 2],
    pub deleted: bool,
    /// Incremented by the store on every successful write.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberTrackA {
    /// A not-yet-inserted record with no completed tier.
    #[must_use]
    pub fn new(member_id: MemberId, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::UNASSIGNED,
            member_id,
            tiers: Default::default(),
            deleted: false,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TrackRecord for MemberTrackA {
    const TRACK: Track = Track::A;

    fn id(&self) -> RecordId {
        self.id
    }

    fn member_id(&self) -> MemberId {
        self.member_id
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn entries(&self) -> &[TierEntry] {
        &self.tiers
    }

    fn entries_mut(&mut self) -> &mut [TierEntry] {
        &mut self.tiers
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

// =============================================================================
// TRACK B
// =============================================================================

/// One Track B (three-tier) row of a member in a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberTrackB {
    pub id: RecordId,
    pub member_id: MemberId,
    pub category_id: CategoryId,
    pub tiers: [TierEntry; 3],
    pub deleted: bool,
    /// Incremented by the store on every successful write.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberTrackB {
    /// A not-yet-inserted row with no completed tier.
    #[must_use]
    pub fn new(member_id: MemberId, category_id: CategoryId, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::UNASSIGNED,
            member_id,
            category_id,
            tiers: Default::default(),
            deleted: false,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TrackRecord for MemberTrackB {
    const TRACK: Track = Track::B;

    fn id(&self) -> RecordId {
        self.id
    }

    fn member_id(&self) -> MemberId {
        self.member_id
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn entries(&self) -> &[TierEntry] {
        &self.tiers
    }

    fn entries_mut(&mut self) -> &mut [TierEntry] {
        &mut self.tiers
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Either kind of track record, as returned by revert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "track", rename_all = "snake_case")]
pub enum Record {
    A(MemberTrackA),
    B(MemberTrackB),
}

impl Record {
    #[must_use]
    pub fn member_id(&self) -> MemberId {
        match self {
            Record::A(r) => r.member_id,
            Record::B(r) => r.member_id,
        }
    }

    #[must_use]
    pub fn id(&self) -> RecordId {
        match self {
            Record::A(r) => r.id,
            Record::B(r) => r.id,
        }
    }
}

// =============================================================================
// AWARD
// =============================================================================

/// Track A completion level, as recorded on an award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackALevel {
    None,
    Level1,
    Level2,
}

impl TrackALevel {
    /// Level derived from a member's Track A record (deleted counts as none).
    #[must_use]
    pub fn of(record: Option<&MemberTrackA>) -> Self {
        match record.filter(|r| !r.deleted).and_then(|r| r.highest_done()) {
            None => TrackALevel::None,
            Some(Tier::Tier1) => TrackALevel::Level1,
            Some(_) => TrackALevel::Level2,
        }
    }
}

/// Approval state of an award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AwardStatus {
    Pending,
    Approved,
}

/// The capstone (Garuda) award record. At most one per member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardRecord {
    pub member_id: MemberId,
    pub track_a_level: TrackALevel,
    pub count_tier1: u32,
    pub count_tier2: u32,
    pub count_tier3: u32,
    pub status: AwardStatus,
    pub approved_by: Option<String>,
    /// Incremented by the store on every successful write.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// TESTS
// =============================================================================
