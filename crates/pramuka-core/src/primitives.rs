//! # Rule Primitives
//!
//! Default constants for the Pramuka rule engine.
//!
//! These are the values the organisation's regulations prescribe today.
//! The engines never read them directly: they are the defaults of
//! [`RuleConfig`](crate::config::RuleConfig), which can override each one.

/// Minimum days between Track A Tier1 (Bantara) and Tier2 (Laksana).
pub const TRACK_A_TIER2_MIN_DAYS: u32 = 100;

/// Minimum days between Track B Tier1 (Purwa) and Tier2 (Madya).
pub const TRACK_B_TIER2_MIN_DAYS: u32 = 30;

/// Minimum days between Track B Tier2 (Madya) and Tier3 (Utama).
pub const TRACK_B_TIER3_MIN_DAYS: u32 = 30;

/// Completed Track B Tier1 rows required per category for the award.
pub const AWARD_TIER1_MIN_PER_CATEGORY: u32 = 9;

/// Completed Track B Tier2 rows required per category for the award.
pub const AWARD_TIER2_MIN_PER_CATEGORY: u32 = 3;

/// Completed Track B Tier3 rows required per category for the award.
pub const AWARD_TIER3_MIN_PER_CATEGORY: u32 = 2;

/// Value persisted as `count_tier1` on a new award record.
///
/// The current regulation records a fixed placeholder here instead of the
/// tallied count. Kept as a named constant until the intended value is
/// clarified.
pub const AWARD_TIER1_COUNT_PLACEHOLDER: u32 = 0;

/// Width of the zero-padded sequence prefix of a certificate number.
pub const CERTIFICATE_SEQUENCE_WIDTH: usize = 5;

/// Issuer suffix appended to the gudep code on every certificate.
pub const CERTIFICATE_ISSUER_SUFFIX: &str = "A";

/// Certificate label of Track A.
pub const TRACK_A_LABEL: &str = "TKU";

/// Certificate labels of the Track A tiers.
pub const TRACK_A_TIER_LABELS: [&str; 2] = ["BANTARA", "LAKSANA"];

/// Certificate label of Track B.
pub const TRACK_B_LABEL: &str = "TKK";

/// Certificate labels of the Track B tiers.
pub const TRACK_B_TIER_LABELS: [&str; 3] = ["PURWA", "MADYA", "UTAMA"];

/// Attempts an engine makes when a conditional write loses a race.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Maximum length of free-text examiner fields.
pub const MAX_EXAMINER_FIELD_LENGTH: usize = 256;
