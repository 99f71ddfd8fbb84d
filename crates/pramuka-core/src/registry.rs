//! # Registry
//!
//! The high-level entry point: a storage backend, a rule set and a clock.
//!
//! Every operation reads the clock once, so the tier date, the certificate
//! year and the record timestamps of one promotion always agree.

use crate::award::{AwardEligibility, AwardEngine};
use crate::config::RuleConfig;
use crate::numbering::{CertificateScope, Numbering};
use crate::promotion::{PromotionEngine, retrying};
use crate::records::{
    AwardRecord, AwardStatus, MemberTrackA, MemberTrackB, Record, TrackRecord,
};
use crate::store::{AwardStore, Directory, RecordStore, StorageBackend, TrackQuery, TrackWrite};
use crate::{
    CategoryId, Examiner, Institution, InstitutionId, Member, MemberId, PramukaError, RecordId,
    Tier, Track,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// =============================================================================
// SUMMARY
// =============================================================================

/// Number of records with one tier done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCount {
    pub tier: Tier,
    pub count: u32,
}

/// Progress counts of one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub track: Track,
    /// Members with at least one completed tier.
    pub participants: u32,
    /// Members without any completed tier.
    pub not_started: u32,
    /// Records (Track A) or rows (Track B) with each tier done.
    pub completed: Vec<TierCount>,
}

/// Award counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardSummary {
    pub pending: u32,
    pub approved: u32,
}

/// Dashboard counts over a set of members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub members: u32,
    pub track_a: TrackSummary,
    pub track_b: TrackSummary,
    pub awards: AwardSummary,
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn summarize<R: TrackRecord>(records: &[R], members: &BTreeSet<MemberId>) -> TrackSummary {
    let visible: Vec<&R> = records
        .iter()
        .filter(|r| members.contains(&r.member_id()))
        .collect();
    let participants: BTreeSet<MemberId> = visible
        .iter()
        .filter(|r| r.highest_done().is_some())
        .map(|r| r.member_id())
        .collect();
    let completed = R::TRACK
        .tiers()
        .iter()
        .map(|&tier| TierCount {
            tier,
            count: count(visible.iter().filter(|r| r.is_done(tier)).count()),
        })
        .collect();
    TrackSummary {
        track: R::TRACK,
        participants: count(participants.len()),
        not_started: count(members.len().saturating_sub(participants.len())),
        completed,
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// A registry combines a storage backend with a rule set.
///
/// Note: Registry does NOT implement Clone. The redb handle cannot be
/// cloned.
pub struct Registry {
    backend: StorageBackend,
    rules: RuleConfig,
    clock: Clock,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backend", &self.backend)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            rules: RuleConfig::default(),
            clock: Box::new(Utc::now),
        }
    }
}

impl Registry {
    /// Create an empty in-memory registry with default rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry over `backend`. The rules are validated first.
    pub fn with_backend(backend: StorageBackend, rules: RuleConfig) -> Result<Self, PramukaError> {
        rules.validate()?;
        Ok(Self {
            backend,
            rules,
            clock: Box::new(Utc::now),
        })
    }

    /// Create a registry with persistent redb storage.
    pub fn with_redb(path: impl AsRef<Path>, rules: RuleConfig) -> Result<Self, PramukaError> {
        Self::with_backend(StorageBackend::open(path)?, rules)
    }

    /// Replace the system clock.
    pub fn set_clock(&mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) {
        self.clock = Box::new(clock);
    }

    #[must_use]
    pub fn rules(&self) -> &RuleConfig {
        &self.rules
    }

    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.backend.is_persistent()
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // =========================================================================
    // DIRECTORY
    // =========================================================================

    /// Insert or update an institution.
    pub fn register_institution(
        &mut self,
        institution: Institution,
    ) -> Result<Institution, PramukaError> {
        if institution.name.trim().is_empty() {
            return Err(PramukaError::InvalidInput(
                "institution name must not be empty".to_string(),
            ));
        }
        for code in [&institution.gudep_code_male, &institution.gudep_code_female] {
            if code.trim().is_empty() || code.contains('/') {
                return Err(PramukaError::InvalidInput(format!(
                    "gudep code {:?} of {} must be non-empty and contain no '/'",
                    code, institution.id
                )));
            }
        }
        self.backend.put_institution(institution.clone())?;
        Ok(institution)
    }

    /// Insert or update a member. Its institution must exist.
    pub fn register_member(&mut self, member: Member) -> Result<Member, PramukaError> {
        if member.name.trim().is_empty() {
            return Err(PramukaError::InvalidInput(
                "member name must not be empty".to_string(),
            ));
        }
        self.backend.live_institution(member.institution_id)?;
        self.backend.put_member(member.clone())?;
        Ok(member)
    }

    /// Soft-delete a member.
    pub fn delete_member(&mut self, id: MemberId) -> Result<Member, PramukaError> {
        let mut member = self.backend.live_member(id)?;
        member.deleted = true;
        self.backend.put_member(member.clone())?;
        Ok(member)
    }

    pub fn member(&self, id: MemberId) -> Result<Member, PramukaError> {
        self.backend.live_member(id)
    }

    /// A member as stored, including soft-deleted ones.
    pub fn stored_member(&self, id: MemberId) -> Result<Option<Member>, PramukaError> {
        self.backend.member(id)
    }

    pub fn institution(&self, id: InstitutionId) -> Result<Institution, PramukaError> {
        self.backend.live_institution(id)
    }

    /// Live members, ordered by id.
    pub fn members(&self) -> Result<Vec<Member>, PramukaError> {
        Ok(self
            .backend
            .members()?
            .into_iter()
            .filter(|m| !m.deleted)
            .collect())
    }

    /// Live institutions, ordered by id.
    pub fn institutions(&self) -> Result<Vec<Institution>, PramukaError> {
        Ok(self
            .backend
            .institutions()?
            .into_iter()
            .filter(|i| !i.deleted)
            .collect())
    }

    // =========================================================================
    // PROMOTION
    // =========================================================================

    /// Advance a member's Track A by one tier.
    pub fn promote_track_a(
        &mut self,
        member: MemberId,
        examiner: &Examiner,
    ) -> Result<MemberTrackA, PramukaError> {
        let now = self.now();
        PromotionEngine::new(&self.rules).promote_track_a(&mut self.backend, member, examiner, now)
    }

    /// Promote a member's Track A to `tier`.
    pub fn promote_track_a_to(
        &mut self,
        member: MemberId,
        tier: Tier,
        examiner: &Examiner,
    ) -> Result<MemberTrackA, PramukaError> {
        let now = self.now();
        PromotionEngine::new(&self.rules).promote_track_a_to(
            &mut self.backend,
            member,
            tier,
            examiner,
            now,
        )
    }

    /// Promote a member's Track B row in `category` to `tier`.
    pub fn promote_track_b(
        &mut self,
        member: MemberId,
        category: CategoryId,
        tier: Tier,
        examiner: &Examiner,
    ) -> Result<MemberTrackB, PramukaError> {
        let now = self.now();
        PromotionEngine::new(&self.rules).promote_track_b(
            &mut self.backend,
            member,
            category,
            tier,
            examiner,
            now,
        )
    }

    /// Promote the Track B row `record` to `tier`.
    pub fn promote_track_b_record(
        &mut self,
        record: RecordId,
        tier: Tier,
        examiner: &Examiner,
    ) -> Result<MemberTrackB, PramukaError> {
        let now = self.now();
        PromotionEngine::new(&self.rules).promote_track_b_record(
            &mut self.backend,
            record,
            tier,
            examiner,
            now,
        )
    }

    /// Clear one tier of a record.
    pub fn revert_tier(&mut self, record: RecordId, tier: Tier) -> Result<Record, PramukaError> {
        let now = self.now();
        PromotionEngine::new(&self.rules).revert(&mut self.backend, record, tier, now)
    }

    /// Soft-delete a track record. Deleted records are ignored by every rule.
    pub fn delete_record(&mut self, id: RecordId) -> Result<Record, PramukaError> {
        let now = self.now();
        let backend = &mut self.backend;
        retrying(|| match Self::find_record(backend, id)? {
            Record::A(mut record) => {
                let revision = record.revision;
                record.deleted = true;
                record.touch(now);
                Ok(Record::A(
                    backend.save_track_a(TrackWrite::update(record, revision))?,
                ))
            }
            Record::B(mut row) => {
                let revision = row.revision;
                row.deleted = true;
                row.touch(now);
                Ok(Record::B(
                    backend.save_track_b(TrackWrite::update(row, revision))?,
                ))
            }
        })
    }

    fn find_record(store: &StorageBackend, id: RecordId) -> Result<Record, PramukaError> {
        if let Some(record) = store.track_a(id)?.filter(|r| !r.deleted) {
            return Ok(Record::A(record));
        }
        if let Some(row) = store.track_b(id)?.filter(|r| !r.deleted) {
            return Ok(Record::B(row));
        }
        Err(PramukaError::NotFound(id.to_string()))
    }

    // =========================================================================
    // AWARD
    // =========================================================================

    /// Create the member's PENDING award if every threshold holds.
    pub fn evaluate_award(&mut self, member: MemberId) -> Result<AwardRecord, PramukaError> {
        let now = self.now();
        AwardEngine::new(&self.rules).evaluate(&mut self.backend, member, now)
    }

    /// Move a PENDING award to APPROVED.
    pub fn approve_award(
        &mut self,
        member: MemberId,
        approved_by: &str,
    ) -> Result<AwardRecord, PramukaError> {
        let now = self.now();
        AwardEngine::new(&self.rules).approve(&mut self.backend, member, approved_by, now)
    }

    /// Eligibility report without side effects.
    pub fn award_eligibility(&self, member: MemberId) -> Result<AwardEligibility, PramukaError> {
        AwardEngine::new(&self.rules).eligibility(&self.backend, member)
    }

    pub fn award(&self, member: MemberId) -> Result<Option<AwardRecord>, PramukaError> {
        self.backend.live_member(member)?;
        self.backend.award_for_member(member)
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    /// A live track record by id.
    pub fn record(&self, id: RecordId) -> Result<Record, PramukaError> {
        Self::find_record(&self.backend, id)
    }

    pub fn track_a(&self, member: MemberId) -> Result<Option<MemberTrackA>, PramukaError> {
        self.backend.live_member(member)?;
        self.backend.track_a_for_member(member)
    }

    pub fn track_b(&self, member: MemberId) -> Result<Vec<MemberTrackB>, PramukaError> {
        self.backend.live_member(member)?;
        self.backend.track_b_for_member(member)
    }

    /// Sequence number the next certificate of a scope will carry.
    pub fn next_certificate_number(&self, track: Track, tier: Tier) -> Result<u64, PramukaError> {
        let scope = CertificateScope::new(track, tier)?;
        Numbering::new(&self.rules).next_number(&self.backend, scope)
    }

    /// Counts over every live member.
    pub fn summary(&self) -> Result<Summary, PramukaError> {
        self.summary_where(|_| true)
    }

    /// Counts over the live members accepted by `visible`.
    pub fn summary_where(
        &self,
        visible: impl Fn(&Member) -> bool,
    ) -> Result<Summary, PramukaError> {
        let members: BTreeSet<MemberId> = self
            .members()?
            .into_iter()
            .filter(|m| visible(m))
            .map(|m| m.id)
            .collect();

        let track_a = summarize(&self.backend.track_a_records()?, &members);
        let track_b = summarize(&self.backend.track_b_records()?, &members);

        let mut awards = AwardSummary::default();
        for award in self.backend.awards()? {
            if !members.contains(&award.member_id) {
                continue;
            }
            match award.status {
                AwardStatus::Pending => awards.pending = awards.pending.saturating_add(1),
                AwardStatus::Approved => awards.approved = awards.approved.saturating_add(1),
            }
        }

        Ok(Summary {
            members: count(members.len()),
            track_a,
            track_b,
            awards,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gender;
    use chrono::{Duration, TimeZone};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register_institution(Institution {
                id: InstitutionId(1),
                name: "Gudep 01".into(),
                gudep_code_male: "01.001".into(),
                gudep_code_female: "01.002".into(),
                deleted: false,
            })
            .expect("institution");
        registry
            .register_member(Member {
                id: MemberId(1),
                name: "Dewi".into(),
                member_number: "042".into(),
                gender: Gender::Female,
                institution_id: InstitutionId(1),
                deleted: false,
            })
            .expect("member");
        registry.set_clock(|| {
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0)
                .single()
                .unwrap_or_default()
        });
        registry
    }

    #[test]
    fn member_requires_live_institution() {
        let mut registry = registry();
        let result = registry.register_member(Member {
            id: MemberId(2),
            name: "Rudi".into(),
            member_number: String::new(),
            gender: Gender::Male,
            institution_id: InstitutionId(9),
            deleted: false,
        });
        assert!(matches!(result, Err(PramukaError::NotFound(_))));
    }

    #[test]
    fn deleted_member_is_not_found() {
        let mut registry = registry();
        registry.delete_member(MemberId(1)).expect("delete");
        let result = registry.promote_track_b(
            MemberId(1),
            CategoryId(1),
            Tier::Tier1,
            &Examiner::default(),
        );
        assert!(matches!(result, Err(PramukaError::NotFound(_))));
    }

    #[test]
    fn female_member_gets_female_code() {
        let mut registry = registry();
        let row = registry
            .promote_track_b(MemberId(1), CategoryId(1), Tier::Tier1, &Examiner::default())
            .expect("promote");
        assert_eq!(row.tiers[0].certificate, "00001/TKK-PURWA/01.002-A/2025");
        assert_eq!(
            registry
                .next_certificate_number(Track::B, Tier::Tier1)
                .expect("next"),
            2
        );
    }

    #[test]
    fn deleted_rows_leave_lookups() {
        let mut registry = registry();
        let row = registry
            .promote_track_b(MemberId(1), CategoryId(1), Tier::Tier1, &Examiner::default())
            .expect("promote");
        registry.delete_record(row.id).expect("delete");
        assert!(registry.track_b(MemberId(1)).expect("rows").is_empty());
        assert!(matches!(
            registry.record(row.id),
            Err(PramukaError::NotFound(_))
        ));
    }

    #[test]
    fn summary_counts_visible_members() {
        let mut registry = registry();
        registry
            .promote_track_b(MemberId(1), CategoryId(1), Tier::Tier1, &Examiner::default())
            .expect("promote");
        registry.set_clock(|| {
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0)
                .single()
                .unwrap_or_default()
                + Duration::days(30)
        });
        registry
            .promote_track_b(MemberId(1), CategoryId(1), Tier::Tier2, &Examiner::default())
            .expect("promote");

        let summary = registry.summary().expect("summary");
        assert_eq!(summary.members, 1);
        assert_eq!(summary.track_b.participants, 1);
        assert_eq!(summary.track_b.completed[1].count, 1);
        assert_eq!(summary.track_a.not_started, 1);

        let hidden = registry.summary_where(|_| false).expect("summary");
        assert_eq!(hidden.members, 0);
        assert_eq!(hidden.track_b.completed[0].count, 0);
    }

    #[test]
    fn invalid_rules_are_rejected() {
        let mut rules = RuleConfig::default();
        rules.award.tier3_min_per_category = 0;
        assert!(Registry::with_backend(StorageBackend::default(), rules).is_err());
    }
}
