//! # Tier Promotion Engine
//!
//! Validates and applies tier promotions on both tracks.
//!
//! ## State Machine
//!
//! ```text
//! NotStarted ──► Tier1 ──► Tier2 ──► Tier3 (Track B only)
//! ```
//!
//! A promotion to tier N checks, in order:
//! 1. the preceding tier is done (`PrerequisiteNotMet`); Track A Tier1
//!    also needs a Track B row with the configured entry tier done
//! 2. tier N is not already done (`AlreadyPromoted`)
//! 3. the dwell time since the preceding tier has elapsed (`TooSoon`,
//!    `MissingPrerequisiteDate`), boundary inclusive
//!
//! It then numbers a certificate for the (track, tier) scope and writes the
//! record and the certificate claim as one conditional write. A lost race is
//! retried from a fresh read, so every check holds at write time.

use crate::config::RuleConfig;
use crate::numbering::{CertificateScope, Numbering};
use crate::primitives::{MAX_EXAMINER_FIELD_LENGTH, MAX_WRITE_ATTEMPTS};
use crate::records::{MemberTrackA, MemberTrackB, Record, TrackRecord};
use crate::store::{Directory, RecordStore, TrackWrite};
use crate::{CategoryId, Examiner, MemberId, PramukaError, RecordId, Tier, Track};
use chrono::{DateTime, NaiveDate, Utc};

/// Run a conditional operation, retrying when a concurrent write wins.
pub(crate) fn retrying<T>(
    mut attempt: impl FnMut() -> Result<T, PramukaError>,
) -> Result<T, PramukaError> {
    let mut remaining = MAX_WRITE_ATTEMPTS;
    loop {
        match attempt() {
            Err(PramukaError::Conflict(_)) if remaining > 1 => remaining -= 1,
            result => return result,
        }
    }
}

fn check_examiner(examiner: &Examiner) -> Result<(), PramukaError> {
    for (field, value) in [
        ("name", &examiner.name),
        ("address", &examiner.address),
        ("position", &examiner.position),
    ] {
        if value.chars().count() > MAX_EXAMINER_FIELD_LENGTH {
            return Err(PramukaError::InvalidInput(format!(
                "examiner {} exceeds {} characters",
                field, MAX_EXAMINER_FIELD_LENGTH
            )));
        }
    }
    Ok(())
}

/// Mark `tier` done on `record`.
fn complete<R: TrackRecord>(
    record: &mut R,
    tier: Tier,
    certificate: String,
    examiner: Examiner,
    now: DateTime<Utc>,
) -> Result<(), PramukaError> {
    let entry = record
        .entry_mut(tier)
        .ok_or_else(|| PramukaError::InvalidInput(format!("{} has no {}", R::TRACK, tier)))?;
    entry.complete(certificate, now.date_naive(), examiner);
    record.touch(now);
    Ok(())
}

/// Clear `tier` on `record`, refusing while a higher tier is done.
fn clear<R: TrackRecord>(
    mut record: R,
    tier: Tier,
    now: DateTime<Utc>,
) -> Result<R, PramukaError> {
    R::TRACK.check_tier(tier)?;
    if let Some(higher) = R::TRACK
        .tiers()
        .iter()
        .rev()
        .copied()
        .find(|t| *t > tier && record.is_done(*t))
    {
        return Err(PramukaError::HigherTierExists {
            track: R::TRACK,
            tier,
            higher,
        });
    }
    if !record.is_done(tier) {
        return Err(PramukaError::InvalidInput(format!(
            "{} {} of {} is not completed",
            R::TRACK,
            tier,
            record.id()
        )));
    }
    if let Some(entry) = record.entry_mut(tier) {
        entry.clear();
    }
    record.touch(now);
    Ok(record)
}

/// Applies promotions and reverts for a rule set.
#[derive(Debug, Clone, Copy)]
pub struct PromotionEngine<'a> {
    rules: &'a RuleConfig,
}

impl<'a> PromotionEngine<'a> {
    #[must_use]
    pub fn new(rules: &'a RuleConfig) -> Self {
        Self { rules }
    }

    // =========================================================================
    // RULE CHECKS
    // =========================================================================

    /// Check prerequisite, completion and dwell time of `tier` on `record`.
    pub fn check_promotable<R: TrackRecord>(
        &self,
        record: &R,
        tier: Tier,
        today: NaiveDate,
    ) -> Result<(), PramukaError> {
        R::TRACK.check_tier(tier)?;
        if let Some(previous) = tier.previous() {
            if !record.is_done(previous) {
                return Err(PramukaError::PrerequisiteNotMet(format!(
                    "{} {} requires {} of {}",
                    R::TRACK,
                    tier,
                    previous,
                    record.id()
                )));
            }
        }
        if record.is_done(tier) {
            return Err(PramukaError::AlreadyPromoted {
                track: R::TRACK,
                tier,
            });
        }
        self.check_dwell(record, tier, today)
    }

    /// Elapsed whole days since the preceding tier must reach the minimum.
    pub fn check_dwell<R: TrackRecord>(
        &self,
        record: &R,
        tier: Tier,
        today: NaiveDate,
    ) -> Result<(), PramukaError> {
        let (Some(required_days), Some(previous)) =
            (self.rules.min_days(R::TRACK, tier), tier.previous())
        else {
            return Ok(());
        };
        let Some(since) = record.entry(previous).and_then(|e| e.date) else {
            return Err(PramukaError::MissingPrerequisiteDate {
                track: R::TRACK,
                tier: previous,
            });
        };
        let elapsed_days = (today - since).num_days();
        if elapsed_days < i64::from(required_days) {
            return Err(PramukaError::TooSoon {
                track: R::TRACK,
                tier,
                previous,
                elapsed_days,
                required_days,
            });
        }
        Ok(())
    }

    fn check_track_b_entry<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        member: MemberId,
    ) -> Result<(), PramukaError> {
        let required = self.rules.track_a.entry_requires_track_b;
        let qualified = store
            .track_b_for_member(member)?
            .iter()
            .any(|row| row.is_done(required));
        if qualified {
            Ok(())
        } else {
            Err(PramukaError::PrerequisiteNotMet(format!(
                "{} {} requires a {} row with {} completed",
                Track::A,
                Tier::Tier1,
                Track::B,
                required
            )))
        }
    }

    // =========================================================================
    // TRACK A
    // =========================================================================

    /// Advance a member's Track A by one tier.
    pub fn promote_track_a<S: RecordStore + Directory + ?Sized>(
        &self,
        store: &mut S,
        member: MemberId,
        examiner: &Examiner,
        now: DateTime<Utc>,
    ) -> Result<MemberTrackA, PramukaError> {
        check_examiner(examiner)?;
        retrying(|| self.try_promote_track_a(store, member, None, examiner, now))
    }

    /// Promote a member's Track A to an explicit tier.
    pub fn promote_track_a_to<S: RecordStore + Directory + ?Sized>(
        &self,
        store: &mut S,
        member: MemberId,
        tier: Tier,
        examiner: &Examiner,
        now: DateTime<Utc>,
    ) -> Result<MemberTrackA, PramukaError> {
        Track::A.check_tier(tier)?;
        check_examiner(examiner)?;
        retrying(|| self.try_promote_track_a(store, member, Some(tier), examiner, now))
    }

    fn try_promote_track_a<S: RecordStore + Directory + ?Sized>(
        &self,
        store: &mut S,
        member_id: MemberId,
        tier: Option<Tier>,
        examiner: &Examiner,
        now: DateTime<Utc>,
    ) -> Result<MemberTrackA, PramukaError> {
        let member = store.live_member(member_id)?;
        let institution = store.live_institution(member.institution_id)?;
        let existing = store.track_a_for_member(member_id)?;

        let tier = match tier {
            Some(tier) => tier,
            None => match existing.as_ref().and_then(|r| r.highest_done()) {
                None => Tier::Tier1,
                Some(Tier::Tier1) => Tier::Tier2,
                Some(highest) => {
                    return Err(PramukaError::AlreadyPromoted {
                        track: Track::A,
                        tier: highest,
                    });
                }
            },
        };
        if tier == Tier::Tier1 {
            self.check_track_b_entry(&*store, member_id)?;
        }

        let (mut record, expected_revision) = match existing {
            Some(record) => {
                let revision = record.revision;
                (record, Some(revision))
            }
            None => (MemberTrackA::new(member_id, now), None),
        };
        let today = now.date_naive();
        self.check_promotable(&record, tier, today)?;

        let scope = CertificateScope::new(Track::A, tier)?;
        let claim =
            Numbering::new(self.rules).claim(&*store, scope, &member, &institution, today)?;
        complete(&mut record, tier, claim.certificate.clone(), examiner.clone(), now)?;
        store.save_track_a(TrackWrite {
            record,
            expected_revision,
            claim: Some(claim),
        })
    }

    // =========================================================================
    // TRACK B
    // =========================================================================

    /// Promote a member's Track B row in `category` to `tier`.
    ///
    /// Tier1 completes a not-started row of the category or opens a new row.
    /// Higher tiers advance the first row whose preceding tier is done and
    /// whose dwell time has elapsed.
    pub fn promote_track_b<S: RecordStore + Directory + ?Sized>(
        &self,
        store: &mut S,
        member: MemberId,
        category: CategoryId,
        tier: Tier,
        examiner: &Examiner,
        now: DateTime<Utc>,
    ) -> Result<MemberTrackB, PramukaError> {
        Track::B.check_tier(tier)?;
        check_examiner(examiner)?;
        retrying(|| {
            store.live_member(member)?;
            let rows: Vec<MemberTrackB> = store
                .track_b_for_member(member)?
                .into_iter()
                .filter(|row| row.category_id == category)
                .collect();
            let today = now.date_naive();
            let target = match tier.previous() {
                None => rows.into_iter().find(|row| !row.is_done(Tier::Tier1)),
                Some(previous) => {
                    Some(self.select_row(rows, member, category, previous, tier, today)?)
                }
            };
            let (row, expected_revision) = match target {
                Some(row) => {
                    let revision = row.revision;
                    (row, Some(revision))
                }
                None => (MemberTrackB::new(member, category, now), None),
            };
            self.finish_track_b(store, row, expected_revision, tier, examiner, now)
        })
    }

    /// Promote the Track B row `record` to `tier`.
    pub fn promote_track_b_record<S: RecordStore + Directory + ?Sized>(
        &self,
        store: &mut S,
        record: RecordId,
        tier: Tier,
        examiner: &Examiner,
        now: DateTime<Utc>,
    ) -> Result<MemberTrackB, PramukaError> {
        Track::B.check_tier(tier)?;
        check_examiner(examiner)?;
        retrying(|| {
            let row = store
                .track_b(record)?
                .filter(|row| !row.deleted)
                .ok_or_else(|| PramukaError::NotFound(record.to_string()))?;
            let revision = row.revision;
            self.finish_track_b(store, row, Some(revision), tier, examiner, now)
        })
    }

    fn finish_track_b<S: RecordStore + Directory + ?Sized>(
        &self,
        store: &mut S,
        mut row: MemberTrackB,
        expected_revision: Option<u64>,
        tier: Tier,
        examiner: &Examiner,
        now: DateTime<Utc>,
    ) -> Result<MemberTrackB, PramukaError> {
        let member = store.live_member(row.member_id)?;
        let institution = store.live_institution(member.institution_id)?;
        let today = now.date_naive();
        self.check_promotable(&row, tier, today)?;

        let scope = CertificateScope::new(Track::B, tier)?;
        let claim =
            Numbering::new(self.rules).claim(&*store, scope, &member, &institution, today)?;
        complete(&mut row, tier, claim.certificate.clone(), examiner.clone(), now)?;
        store.save_track_b(TrackWrite {
            record: row,
            expected_revision,
            claim: Some(claim),
        })
    }

    // =========================================================================
    // REVERT
    // =========================================================================

    /// Clear one tier of a record. Lower tiers are left untouched and the
    /// issued certificate number is not reused.
    pub fn revert<S: RecordStore + Directory + ?Sized>(
        &self,
        store: &mut S,
        record: RecordId,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<Record, PramukaError> {
        retrying(|| {
            if let Some(found) = store.track_a(record)?.filter(|r| !r.deleted) {
                store.live_member(found.member_id)?;
                let revision = found.revision;
                let cleared = clear(found, tier, now)?;
                return Ok(Record::A(
                    store.save_track_a(TrackWrite::update(cleared, revision))?,
                ));
            }
            if let Some(found) = store.track_b(record)?.filter(|r| !r.deleted) {
                store.live_member(found.member_id)?;
                let revision = found.revision;
                let cleared = clear(found, tier, now)?;
                return Ok(Record::B(
                    store.save_track_b(TrackWrite::update(cleared, revision))?,
                ));
            }
            Err(PramukaError::NotFound(record.to_string()))
        })
    }

    // =========================================================================
    // ROW SELECTION
    // =========================================================================

    /// The row of a category that can move from `previous` to `tier`.
    ///
    /// Among rows holding `previous`, the first one past its dwell time wins.
    /// When none is, the first candidate is returned so its own check reports
    /// the failure.
    fn select_row(
        &self,
        mut rows: Vec<MemberTrackB>,
        member: MemberId,
        category: CategoryId,
        previous: Tier,
        tier: Tier,
        today: NaiveDate,
    ) -> Result<MemberTrackB, PramukaError> {
        let candidates: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.is_done(previous) && !row.is_done(tier))
            .map(|(index, _)| index)
            .collect();
        let chosen = candidates
            .iter()
            .copied()
            .find(|index| self.check_dwell(&rows[*index], tier, today).is_ok())
            .or_else(|| candidates.first().copied());
        if let Some(index) = chosen {
            return Ok(rows.swap_remove(index));
        }
        if rows.iter().any(|row| row.is_done(tier)) {
            return Err(PramukaError::AlreadyPromoted {
                track: Track::B,
                tier,
            });
        }
        Err(PramukaError::PrerequisiteNotMet(format!(
            "{} {} requires {} in {} for {}",
            Track::B,
            tier,
            previous,
            category,
            member
        )))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::{Gender, Institution, InstitutionId, Member};
    use chrono::{Duration, TimeZone};

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .put_institution(Institution {
                id: InstitutionId(1),
                name: "Gudep 01".into(),
                gudep_code_male: "01.001".into(),
                gudep_code_female: "01.002".into(),
                deleted: false,
            })
            .expect("institution");
        store
            .put_member(Member {
                id: MemberId(1),
                name: "Andi".into(),
                member_number: "001".into(),
                gender: Gender::Male,
                institution_id: InstitutionId(1),
                deleted: false,
            })
            .expect("member");
        store
    }

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0)
            .single()
            .expect("time")
            + Duration::days(n)
    }

    #[test]
    fn retrying_gives_up_after_bounded_attempts() {
        let mut calls = 0;
        let result: Result<(), PramukaError> = retrying(|| {
            calls += 1;
            Err(PramukaError::Conflict("busy".into()))
        });
        assert!(matches!(result, Err(PramukaError::Conflict(_))));
        assert_eq!(calls, MAX_WRITE_ATTEMPTS);
    }

    #[test]
    fn retrying_stops_on_domain_error() {
        let mut calls = 0;
        let result: Result<(), PramukaError> = retrying(|| {
            calls += 1;
            Err(PramukaError::NotFound("x".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn tier1_opens_a_row() {
        let rules = RuleConfig::default();
        let engine = PromotionEngine::new(&rules);
        let mut store = seeded();
        let row = engine
            .promote_track_b(
                &mut store,
                MemberId(1),
                CategoryId(4),
                Tier::Tier1,
                &Examiner::default(),
                day(0),
            )
            .expect("promote");
        assert!(row.is_done(Tier::Tier1));
        assert_eq!(row.tiers[0].certificate, "00001/TKK-PURWA/01.001-A/2025");
        assert_eq!(row.tiers[0].date, Some(day(0).date_naive()));
    }

    #[test]
    fn dwell_boundary_is_inclusive() {
        let rules = RuleConfig::default();
        let engine = PromotionEngine::new(&rules);
        let mut store = seeded();
        let examiner = Examiner::new("Kak Rina", "Jl. Mawar", "Pembina");
        engine
            .promote_track_b(
                &mut store,
                MemberId(1),
                CategoryId(4),
                Tier::Tier1,
                &examiner,
                day(0),
            )
            .expect("tier1");

        let early = engine.promote_track_b(
            &mut store,
            MemberId(1),
            CategoryId(4),
            Tier::Tier2,
            &examiner,
            day(29),
        );
        assert!(matches!(
            early,
            Err(PramukaError::TooSoon {
                elapsed_days: 29,
                required_days: 30,
                ..
            })
        ));

        let row = engine
            .promote_track_b(
                &mut store,
                MemberId(1),
                CategoryId(4),
                Tier::Tier2,
                &examiner,
                day(30),
            )
            .expect("tier2");
        assert!(row.is_done(Tier::Tier2));
        assert_eq!(row.tiers[1].examiner, examiner);
    }

    #[test]
    fn overlong_examiner_is_rejected() {
        let rules = RuleConfig::default();
        let engine = PromotionEngine::new(&rules);
        let mut store = seeded();
        let examiner = Examiner::new("x".repeat(MAX_EXAMINER_FIELD_LENGTH + 1), "", "");
        let result = engine.promote_track_b(
            &mut store,
            MemberId(1),
            CategoryId(4),
            Tier::Tier1,
            &examiner,
            day(0),
        );
        assert!(matches!(result, Err(PramukaError::InvalidInput(_))));
    }

    #[test]
    fn revert_of_unfinished_tier_is_invalid() {
        let rules = RuleConfig::default();
        let engine = PromotionEngine::new(&rules);
        let mut store = seeded();
        let row = engine
            .promote_track_b(
                &mut store,
                MemberId(1),
                CategoryId(4),
                Tier::Tier1,
                &Examiner::default(),
                day(0),
            )
            .expect("tier1");
        let result = engine.revert(&mut store, row.id, Tier::Tier2, day(1));
        assert!(matches!(result, Err(PramukaError::InvalidInput(_))));
    }
}
