//! # Rule Configuration
//!
//! Every threshold the engines enforce, gathered into one injectable
//! structure. Defaults come from [`crate::primitives`].
//!
//! `RuleConfig` deserializes with `#[serde(default)]` at every level, so a
//! configuration file only needs to name the values it overrides:
//!
//! ```toml
//! [track_a]
//! tier2_min_days = 90
//!
//! [award]
//! tier1_min_per_category = 5
//! ```

use crate::primitives::{
    AWARD_TIER1_COUNT_PLACEHOLDER, AWARD_TIER1_MIN_PER_CATEGORY, AWARD_TIER2_MIN_PER_CATEGORY,
    AWARD_TIER3_MIN_PER_CATEGORY, CERTIFICATE_ISSUER_SUFFIX, TRACK_A_LABEL, TRACK_A_TIER_LABELS,
    TRACK_A_TIER2_MIN_DAYS, TRACK_B_LABEL, TRACK_B_TIER_LABELS, TRACK_B_TIER2_MIN_DAYS,
    TRACK_B_TIER3_MIN_DAYS,
};
use crate::{PramukaError, Tier, Track};
use serde::{Deserialize, Serialize};

// =============================================================================
// TRACK RULES
// =============================================================================

/// Rules of the two-tier Track A.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackARules {
    /// Certificate label of the track (e.g. `TKU`).
    pub label: String,
    /// Certificate labels of Tier1 and Tier2.
    pub tier_labels: [String; 2],
    /// Minimum days between Tier1 and Tier2.
    pub tier2_min_days: u32,
    /// Track B tier the member must have completed, in any category row,
    /// before Track A Tier1 may be granted.
    pub entry_requires_track_b: Tier,
}

impl Default for TrackARules {
    fn default() -> Self {
        Self {
            label: TRACK_A_LABEL.to_string(),
            tier_labels: TRACK_A_TIER_LABELS.map(String::from),
            tier2_min_days: TRACK_A_TIER2_MIN_DAYS,
            entry_requires_track_b: Tier::Tier2,
        }
    }
}

/// Rules of the three-tier Track B.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackBRules {
    /// Certificate label of the track (e.g. `TKK`).
    pub label: String,
    /// Certificate labels of Tier1, Tier2 and Tier3.
    pub tier_labels: [String; 3],
    /// Minimum days between Tier1 and Tier2.
    pub tier2_min_days: u32,
    /// Minimum days between Tier2 and Tier3.
    pub tier3_min_days: u32,
}

impl Default for TrackBRules {
    fn default() -> Self {
        Self {
            label: TRACK_B_LABEL.to_string(),
            tier_labels: TRACK_B_TIER_LABELS.map(String::from),
            tier2_min_days: TRACK_B_TIER2_MIN_DAYS,
            tier3_min_days: TRACK_B_TIER3_MIN_DAYS,
        }
    }
}

// =============================================================================
// AWARD RULES
// =============================================================================

/// Per-category minimums of the Garuda award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwardRules {
    pub tier1_min_per_category: u32,
    pub tier2_min_per_category: u32,
    pub tier3_min_per_category: u32,
    /// Persisted as `count_tier1` instead of the tallied count.
    pub tier1_count_placeholder: u32,
}

impl Default for AwardRules {
    fn default() -> Self {
        Self {
            tier1_min_per_category: AWARD_TIER1_MIN_PER_CATEGORY,
            tier2_min_per_category: AWARD_TIER2_MIN_PER_CATEGORY,
            tier3_min_per_category: AWARD_TIER3_MIN_PER_CATEGORY,
            tier1_count_placeholder: AWARD_TIER1_COUNT_PLACEHOLDER,
        }
    }
}

impl AwardRules {
    /// Minimum completed rows per category at `tier`.
    #[must_use]
    pub fn minimum(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Tier1 => self.tier1_min_per_category,
            Tier::Tier2 => self.tier2_min_per_category,
            Tier::Tier3 => self.tier3_min_per_category,
        }
    }
}

// =============================================================================
// RULE CONFIG
// =============================================================================

/// The complete, injectable rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub track_a: TrackARules,
    pub track_b: TrackBRules,
    pub award: AwardRules,
    /// Suffix appended to the gudep code (`{GUDEP}-{suffix}`).
    pub issuer_suffix: String,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            track_a: TrackARules::default(),
            track_b: TrackBRules::default(),
            award: AwardRules::default(),
            issuer_suffix: CERTIFICATE_ISSUER_SUFFIX.to_string(),
        }
    }
}

impl RuleConfig {
    /// Minimum dwell days for reaching `tier` in `track`.
    ///
    /// `None` for Tier1 (no preceding tier) and for tiers the track lacks.
    #[must_use]
    pub fn min_days(&self, track: Track, tier: Tier) -> Option<u32> {
        match (track, tier) {
            (Track::A, Tier::Tier2) => Some(self.track_a.tier2_min_days),
            (Track::B, Tier::Tier2) => Some(self.track_b.tier2_min_days),
            (Track::B, Tier::Tier3) => Some(self.track_b.tier3_min_days),
            _ => None,
        }
    }

    /// Certificate label of a track.
    #[must_use]
    pub fn track_label(&self, track: Track) -> &str {
        match track {
            Track::A => &self.track_a.label,
            Track::B => &self.track_b.label,
        }
    }

    /// Certificate label of a tier within a track.
    pub fn tier_label(&self, track: Track, tier: Tier) -> Result<&str, PramukaError> {
        track.check_tier(tier)?;
        let label = match track {
            Track::A => &self.track_a.tier_labels[tier.index()],
            Track::B => &self.track_b.tier_labels[tier.index()],
        };
        Ok(label)
    }

    /// Reject configurations the engines cannot honour.
    pub fn validate(&self) -> Result<(), PramukaError> {
        for tier in Tier::ALL {
            if self.award.minimum(tier) == 0 {
                return Err(PramukaError::InvalidInput(format!(
                    "award minimum for {} must be at least 1",
                    tier
                )));
            }
        }

        let labels = [self.track_a.label.as_str(), self.track_b.label.as_str()]
            .into_iter()
            .chain(self.track_a.tier_labels.iter().map(String::as_str))
            .chain(self.track_b.tier_labels.iter().map(String::as_str));
        for label in labels {
            if label.trim().is_empty() || label.contains('/') {
                return Err(PramukaError::InvalidInput(format!(
                    "certificate label {:?} must be non-empty and contain no '/'",
                    label
                )));
            }
        }

        if self.issuer_suffix.contains('/') {
            return Err(PramukaError::InvalidInput(
                "issuer suffix must not contain '/'".to_string(),
            ));
        }

        // Track A Tier1 may only depend on Track B tiers that exist.
        Track::B.check_tier(self.track_a.entry_requires_track_b)
    }
}

// =============================================================================
// TESTS
// =============================================================================
