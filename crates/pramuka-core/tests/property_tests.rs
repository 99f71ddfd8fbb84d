//! # Property-Based Tests
//!
//! Random sequences of promotions, reverts, deletions and clock advances
//! must never break tier ordering or certificate numbering.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pramuka_core::numbering::{next_number, parse_sequence};
use pramuka_core::{
    CategoryId, Examiner, Gender, Institution, InstitutionId, Member, MemberId, Registry,
    Tier, TrackRecord,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .expect("valid time")
        + Duration::days(n)
}

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register_institution(Institution {
            id: InstitutionId(1),
            name: "Gudep 07".into(),
            gudep_code_male: "07.001".into(),
            gudep_code_female: "07.002".into(),
            deleted: false,
        })
        .expect("institution");
    for id in 1..=2 {
        registry
            .register_member(Member {
                id: MemberId(id),
                name: format!("Peserta {}", id),
                member_number: String::new(),
                gender: if id == 1 { Gender::Male } else { Gender::Female },
                institution_id: InstitutionId(1),
                deleted: false,
            })
            .expect("member");
    }
    registry
}

/// One randomly chosen operation: kind, member, category, tier, pick, days.
type Op = (u8, u64, u64, u8, usize, i64);

fn op() -> impl Strategy<Value = Op> {
    (0u8..5, 1u64..=2, 1u64..=3, 1u8..=3, 0usize..8, 0i64..45)
}

/// Record the newly issued certificate, failing if it does not increase.
fn issued(last: &mut BTreeMap<String, u64>, certificate: &str) -> Result<(), TestCaseError> {
    let scope = certificate.split('/').nth(1).unwrap_or_default().to_string();
    let number = parse_sequence(certificate);
    prop_assert!(number.is_some(), "unparsable certificate {}", certificate);
    let number = number.unwrap_or_default();
    let previous = last.insert(scope, number).unwrap_or(0);
    prop_assert!(number > previous, "{} after {}", number, previous);
    Ok(())
}

fn check_member(registry: &Registry, member: MemberId) -> Result<(), TestCaseError> {
    for row in registry.track_b(member).expect("rows") {
        prop_assert!(row.check_invariants().is_ok());
        prop_assert!(!row.deleted);
    }
    if let Some(record) = registry.track_a(member).expect("track a") {
        prop_assert!(record.check_invariants().is_ok());
    }
    let eligibility = registry.award_eligibility(member).expect("eligibility");
    prop_assert_eq!(eligibility.is_eligible(), eligibility.check().is_ok());
    Ok(())
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Tier ordering holds and numbers strictly increase per scope.
    #[test]
    fn random_operations_keep_invariants(ops in vec(op(), 1..60)) {
        let mut registry = registry();
        let examiner = Examiner::new("Kak Rina", "", "Pembina");
        let mut today = 0i64;
        let mut last = BTreeMap::new();
        registry.set_clock(move || day(0));

        for (kind, member, category, tier, pick, days) in ops {
            let member = MemberId(member);
            let tier = Tier::from_number(tier).unwrap_or(Tier::Tier1);
            match kind {
                0 => {
                    if let Ok(row) =
                        registry.promote_track_b(member, CategoryId(category), tier, &examiner)
                    {
                        issued(&mut last, &row.tiers[tier.index()].certificate)?;
                    }
                }
                1 => {
                    if let Ok(record) = registry.promote_track_a(member, &examiner) {
                        let top = record.highest_done().unwrap_or(Tier::Tier1);
                        issued(&mut last, &record.tiers[top.index()].certificate)?;
                    }
                }
                2 => {
                    let rows = registry.track_b(member).expect("rows");
                    if let Some(row) = rows.get(pick % rows.len().max(1)) {
                        if registry.revert_tier(row.id, tier).is_ok() {
                            let after = registry.record(row.id).expect("record");
                            prop_assert_eq!(after.id(), row.id);
                        }
                    }
                }
                3 => {
                    today += days;
                    let now = day(today);
                    registry.set_clock(move || now);
                }
                _ => {
                    let rows = registry.track_b(member).expect("rows");
                    if let Some(row) = rows.get(pick % rows.len().max(1)) {
                        registry.delete_record(row.id).expect("delete");
                    }
                }
            }
            check_member(&registry, MemberId(1))?;
            check_member(&registry, MemberId(2))?;
        }
    }

    /// The next number is one past any parsable sequence.
    #[test]
    fn next_number_follows_sequence(n in 0u64..1_000_000, tail in "[A-Z/.-]{0,12}") {
        let certificate = format!("{:05}{}", n, tail);
        prop_assert_eq!(next_number(Some(&certificate)), n + 1);
    }

    /// Malformed prefixes restart at one.
    #[test]
    fn malformed_prefix_restarts(prefix in "[A-Za-z]{0,4}[0-9]{0,3}") {
        let certificate = format!("{}/TKK-PURWA/07.001-A/2025", prefix);
        prop_assert_eq!(next_number(Some(&certificate)), 1);
    }
}
