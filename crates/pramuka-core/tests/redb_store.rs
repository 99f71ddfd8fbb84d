//! # Persistence Tests
//!
//! Records, awards and certificate logs survive reopening a redb database.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pramuka_core::{
    AwardStatus, CategoryId, Examiner, Gender, Institution, InstitutionId, Member, MemberId,
    Registry, RuleConfig, Tier, Track, TrackRecord,
};
use tempfile::tempdir;

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 14, 8, 0, 0)
        .single()
        .expect("valid time")
        + Duration::days(n)
}

fn seed(registry: &mut Registry) {
    registry
        .register_institution(Institution {
            id: InstitutionId(3),
            name: "SD Muhammadiyah".into(),
            gudep_code_male: "03.117".into(),
            gudep_code_female: "03.118".into(),
            deleted: false,
        })
        .expect("institution");
    registry
        .register_member(Member {
            id: MemberId(10),
            name: "Bima".into(),
            member_number: "0310".into(),
            gender: Gender::Male,
            institution_id: InstitutionId(3),
            deleted: false,
        })
        .expect("member");
}

#[test]
fn records_survive_reopen() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("pramuka.redb");
    let examiner = Examiner::new("Kak Dewi", "Jl. Merdeka 1", "Pembina");

    let row_id = {
        let mut registry = Registry::with_redb(&path, RuleConfig::default()).expect("open");
        assert!(registry.is_persistent());
        seed(&mut registry);
        registry.set_clock(|| day(0));
        let row = registry
            .promote_track_b(MemberId(10), CategoryId(4), Tier::Tier1, &examiner)
            .expect("tier1");
        registry.set_clock(|| day(30));
        registry
            .promote_track_b(MemberId(10), CategoryId(4), Tier::Tier2, &examiner)
            .expect("tier2");
        registry.promote_track_a(MemberId(10), &examiner).expect("track a");
        row.id
    };

    let mut registry = Registry::with_redb(&path, RuleConfig::default()).expect("reopen");
    assert_eq!(registry.member(MemberId(10)).expect("member").name, "Bima");

    let rows = registry.track_b(MemberId(10)).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, row_id);
    assert_eq!(rows[0].highest_done(), Some(Tier::Tier2));
    assert_eq!(rows[0].tiers[0].certificate, "00001/TKK-PURWA/03.117-A/2025");
    assert_eq!(rows[0].tiers[1].date, Some(day(30).date_naive()));

    let track_a = registry.track_a(MemberId(10)).expect("track a").expect("record");
    assert!(track_a.is_done(Tier::Tier1));
    assert_ne!(track_a.id, row_id);

    // The certificate logs continue where they stopped.
    assert_eq!(
        registry.next_certificate_number(Track::B, Tier::Tier1).expect("next"),
        2
    );
    registry.set_clock(|| day(31));
    let second = registry
        .promote_track_b(MemberId(10), CategoryId(5), Tier::Tier1, &examiner)
        .expect("second row");
    assert!(second.tiers[0].certificate.starts_with("00002/"));
    assert!(second.id.0 > track_a.id.0);
}

#[test]
fn reverts_and_deletes_persist() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("pramuka.redb");
    let examiner = Examiner::default();

    {
        let mut registry = Registry::with_redb(&path, RuleConfig::default()).expect("open");
        seed(&mut registry);
        registry.set_clock(|| day(0));
        let first = registry
            .promote_track_b(MemberId(10), CategoryId(1), Tier::Tier1, &examiner)
            .expect("first");
        let second = registry
            .promote_track_b(MemberId(10), CategoryId(2), Tier::Tier1, &examiner)
            .expect("second");
        registry.revert_tier(first.id, Tier::Tier1).expect("revert");
        registry.delete_record(second.id).expect("delete");
    }

    let registry = Registry::with_redb(&path, RuleConfig::default()).expect("reopen");
    let rows = registry.track_b(MemberId(10)).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].highest_done(), None);
    assert!(rows[0].tiers[0].certificate.is_empty());

    // Reverting never rewinds numbering.
    assert_eq!(
        registry.next_certificate_number(Track::B, Tier::Tier1).expect("next"),
        3
    );
    assert_eq!(registry.summary().expect("summary").awards.pending, 0);
}

#[test]
fn awards_persist() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("pramuka.redb");
    let examiner = Examiner::default();

    {
        let mut registry = Registry::with_redb(&path, RuleConfig::default()).expect("open");
        seed(&mut registry);
        for category in [CategoryId(1), CategoryId(2)] {
            registry.set_clock(|| day(0));
            for _ in 0..9 {
                registry
                    .promote_track_b(MemberId(10), category, Tier::Tier1, &examiner)
                    .expect("tier1");
            }
            registry.set_clock(|| day(30));
            for _ in 0..3 {
                registry
                    .promote_track_b(MemberId(10), category, Tier::Tier2, &examiner)
                    .expect("tier2");
            }
            registry.set_clock(|| day(60));
            for _ in 0..2 {
                registry
                    .promote_track_b(MemberId(10), category, Tier::Tier3, &examiner)
                    .expect("tier3");
            }
        }
        registry.promote_track_a(MemberId(10), &examiner).expect("track a tier1");
        registry.set_clock(|| day(160));
        registry.promote_track_a(MemberId(10), &examiner).expect("track a tier2");
        registry.evaluate_award(MemberId(10)).expect("award");
    }

    let mut registry = Registry::with_redb(&path, RuleConfig::default()).expect("reopen");
    let award = registry.award(MemberId(10)).expect("award").expect("present");
    assert_eq!(award.status, AwardStatus::Pending);
    assert_eq!(award.count_tier2, 6);
    assert_eq!(award.count_tier3, 4);

    let approved = registry.approve_award(MemberId(10), "Kak Ketua").expect("approve");
    assert_eq!(approved.revision, award.revision + 1);
    assert_eq!(registry.summary().expect("summary").awards.approved, 1);
}
