//! # Document Numbering
//!
//! Derives sequential certificate numbers per (track, tier) scope.
//!
//! ## Certificate Format
//!
//! ```text
//! {sequence:05}/{TRACK}-{TIER}/{GUDEP}-{SUFFIX}/{year}
//! 00042/TKK-MADYA/12.345-A/2025
//! ```
//!
//! The next sequence is the leading number of the most recently issued
//! certificate in the scope, plus one. A missing or malformed prefix restarts
//! the scope at 1.
//!
//! ## Exactly-once issuance
//!
//! Every issued certificate is appended to a per-scope issue log in the
//! store. A [`CertificateClaim`] records the log head it was derived from;
//! the store rejects the claim with `Conflict` if another certificate was
//! appended in the meantime, so two writers can never share a number.

use crate::config::RuleConfig;
use crate::primitives::CERTIFICATE_SEQUENCE_WIDTH;
use crate::store::TrackQuery;
use crate::{Gender, Institution, Member, PramukaError, Tier, Track};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// SCOPE
// =============================================================================

/// A numbering scope: one (track, tier) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CertificateScope {
    pub track: Track,
    pub tier: Tier,
}

impl CertificateScope {
    /// Build a scope, rejecting tiers the track does not have.
    pub fn new(track: Track, tier: Tier) -> Result<Self, PramukaError> {
        track.check_tier(tier)?;
        Ok(Self { track, tier })
    }

    /// Compact key used by persistent stores.
    #[must_use]
    pub const fn key(self) -> u8 {
        let track = match self.track {
            Track::A => 0x10,
            Track::B => 0x20,
        };
        track | self.tier.number()
    }

    /// Every scope of both tracks.
    #[must_use]
    pub fn all() -> Vec<CertificateScope> {
        [Track::A, Track::B]
            .into_iter()
            .flat_map(|track| {
                track
                    .tiers()
                    .iter()
                    .map(move |&tier| CertificateScope { track, tier })
            })
            .collect()
    }
}

impl fmt::Display for CertificateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.track, self.tier)
    }
}

/// An entry of a scope's issue log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCertificate {
    pub scope: CertificateScope,
    /// Position in the scope's issue log, starting at 0.
    pub position: u64,
    pub certificate: String,
}

/// A certificate number reserved against a known log head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateClaim {
    pub scope: CertificateScope,
    /// Log position the number was derived from, `None` for an empty log.
    pub expected_head: Option<u64>,
    pub certificate: String,
}

impl CertificateClaim {
    /// Position this claim occupies once appended.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.expected_head.map_or(0, |head| head.saturating_add(1))
    }
}

// =============================================================================
// PURE RULES
// =============================================================================

/// Leading sequence number of a certificate string.
///
/// Requires at least [`CERTIFICATE_SEQUENCE_WIDTH`] leading digits. Longer
/// digit runs are read whole so numbering keeps increasing past 99999.
#[must_use]
pub fn parse_sequence(certificate: &str) -> Option<u64> {
    let digits = certificate
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits < CERTIFICATE_SEQUENCE_WIDTH {
        return None;
    }
    certificate[..digits].parse().ok()
}

/// Next sequence number given the last issued certificate of a scope.
#[must_use]
pub fn next_number(last: Option<&str>) -> u64 {
    last.filter(|c| !c.is_empty())
        .and_then(parse_sequence)
        .map_or(1, |n| n.saturating_add(1))
}

/// Gudep code for a member's gender. Unspecified falls back to the male code.
#[must_use]
pub fn gudep_code(gender: Gender, institution: &Institution) -> &str {
    match gender {
        Gender::Female => &institution.gudep_code_female,
        Gender::Male | Gender::Unspecified => &institution.gudep_code_male,
    }
}

/// Render a certificate number.
pub fn format_certificate(
    rules: &RuleConfig,
    scope: CertificateScope,
    number: u64,
    gudep: &str,
    year: i32,
) -> Result<String, PramukaError> {
    Ok(format!(
        "{:0width$}/{}-{}/{}-{}/{}",
        number,
        rules.track_label(scope.track),
        rules.tier_label(scope.track, scope.tier)?,
        gudep,
        rules.issuer_suffix,
        year,
        width = CERTIFICATE_SEQUENCE_WIDTH
    ))
}

// =============================================================================
// NUMBERING SERVICE
// =============================================================================

/// Issues certificate claims for a rule set.
#[derive(Debug, Clone, Copy)]
pub struct Numbering<'a> {
    rules: &'a RuleConfig,
}

impl<'a> Numbering<'a> {
    #[must_use]
    pub fn new(rules: &'a RuleConfig) -> Self {
        Self { rules }
    }

    /// Next sequence number of a scope.
    pub fn next_number<Q: TrackQuery + ?Sized>(
        &self,
        store: &Q,
        scope: CertificateScope,
    ) -> Result<u64, PramukaError> {
        let last = store.latest_certificate(scope)?;
        Ok(next_number(last.as_ref().map(|c| c.certificate.as_str())))
    }

    /// Reserve the next certificate of `scope` for `member`.
    pub fn claim<Q: TrackQuery + ?Sized>(
        &self,
        store: &Q,
        scope: CertificateScope,
        member: &Member,
        institution: &Institution,
        today: NaiveDate,
    ) -> Result<CertificateClaim, PramukaError> {
        let last = store.latest_certificate(scope)?;
        let number = next_number(last.as_ref().map(|c| c.certificate.as_str()));
        let certificate = format_certificate(
            self.rules,
            scope,
            number,
            gudep_code(member.gender, institution),
            today.year(),
        )?;
        Ok(CertificateClaim {
            scope,
            expected_head: last.map(|c| c.position),
            certificate,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InstitutionId;

    fn institution() -> Institution {
        Institution {
            id: InstitutionId(1),
            name: "Gudep 01".into(),
            gudep_code_male: "01.001".into(),
            gudep_code_female: "01.002".into(),
            deleted: false,
        }
    }

    #[test]
    fn parses_five_digit_prefix() {
        assert_eq!(parse_sequence("00042/TKK-MADYA/01.001-A/2025"), Some(42));
        assert_eq!(parse_sequence("100000/TKK-MADYA/01.001-A/2025"), Some(100_000));
    }

    #[test]
    fn malformed_prefix_restarts_at_one() {
        assert_eq!(parse_sequence("42/TKK"), None);
        assert_eq!(parse_sequence("SK-00042"), None);
        assert_eq!(next_number(Some("garbage")), 1);
        assert_eq!(next_number(Some("garbage")), 1);
        assert_eq!(next_number(Some("")), 1);
        assert_eq!(next_number(None), 1);
    }

    #[test]
    fn next_number_increments() {
        assert_eq!(next_number(Some("00001/TKU-BANTARA/01.001-A/2025")), 2);
        assert_eq!(next_number(Some("99999/TKU-BANTARA/01.001-A/2025")), 100_000);
    }

    #[test]
    fn gudep_follows_gender() {
        let inst = institution();
        assert_eq!(gudep_code(Gender::Male, &inst), "01.001");
        assert_eq!(gudep_code(Gender::Female, &inst), "01.002");
        assert_eq!(gudep_code(Gender::Unspecified, &inst), "01.001");
    }

    #[test]
    fn formats_certificate() {
        let rules = RuleConfig::default();
        let scope = CertificateScope::new(Track::B, Tier::Tier2).expect("scope");
        let cert = format_certificate(&rules, scope, 7, "01.002", 2025).expect("format");
        assert_eq!(cert, "00007/TKK-MADYA/01.002-A/2025");
    }

    #[test]
    fn scope_rejects_missing_tier() {
        assert!(CertificateScope::new(Track::A, Tier::Tier3).is_err());
        assert_eq!(CertificateScope::all().len(), 5);
    }

    #[test]
    fn scope_keys_are_distinct() {
        let mut keys: Vec<u8> = CertificateScope::all().iter().map(|s| s.key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 5);
    }
}
