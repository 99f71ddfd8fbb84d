//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the Pramuka rule engine:
//! - Identifiers (`MemberId`, `InstitutionId`, `CategoryId`, `RecordId`)
//! - Progression coordinates (`Track`, `Tier`)
//! - Collaborator views (`Member`, `Institution`, `CallerContext`)
//! - Promotion input (`Examiner`)
//! - Error types (`PramukaError`)
//!
//! ## Ordering Guarantees
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! and produce deterministic iteration order in stores and tallies.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a registered member (scout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub u64);

/// Identifier of a home institution (gugus depan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstitutionId(pub u64);

/// Identifier of a Track B subject category (bidang).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub u64);

/// Identifier of a persisted track record.
///
/// Track A and Track B records share one id space, so a `RecordId` alone is
/// enough to address a record for revert operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Placeholder carried by a record that has not been inserted yet.
    /// The store assigns the real id on insert.
    pub const UNASSIGNED: RecordId = RecordId(0);
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member #{}", self.0)
    }
}

impl fmt::Display for InstitutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "institution #{}", self.0)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "category #{}", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record #{}", self.0)
    }
}

// =============================================================================
// TRACKS & TIERS
// =============================================================================

/// One of the two parallel skill-badge programs.
///
/// | Track | Tiers | Program |
/// |-------|-------|---------|
/// | A | Tier1, Tier2 | TKU (Bantara, Laksana) |
/// | B | Tier1, Tier2, Tier3 | TKK (Purwa, Madya, Utama) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    A,
    B,
}

impl Track {
    /// Highest tier reachable in this track.
    #[must_use]
    pub const fn top_tier(self) -> Tier {
        match self {
            Track::A => Tier::Tier2,
            Track::B => Tier::Tier3,
        }
    }

    /// Whether the given tier exists in this track.
    #[must_use]
    pub fn has_tier(self, tier: Tier) -> bool {
        tier <= self.top_tier()
    }

    /// Tiers of this track in ascending order.
    #[must_use]
    pub fn tiers(self) -> &'static [Tier] {
        match self {
            Track::A => &[Tier::Tier1, Tier::Tier2],
            Track::B => &Tier::ALL,
        }
    }

    /// Ensure `tier` belongs to this track.
    pub fn check_tier(self, tier: Tier) -> Result<(), PramukaError> {
        if self.has_tier(tier) {
            Ok(())
        } else {
            Err(PramukaError::InvalidInput(format!(
                "{} has no {}",
                self, tier
            )))
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Track::A => write!(f, "Track A"),
            Track::B => write!(f, "Track B"),
        }
    }
}

/// An ordered proficiency level within a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

impl Tier {
    /// All tiers in ascending order.
    pub const ALL: [Tier; 3] = [Tier::Tier1, Tier::Tier2, Tier::Tier3];

    /// 1-based tier number.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Tier::Tier1 => 1,
            Tier::Tier2 => 2,
            Tier::Tier3 => 3,
        }
    }

    /// Zero-based position, used to index per-tier arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        self.number() as usize - 1
    }

    /// Parse a 1-based tier number.
    #[must_use]
    pub const fn from_number(n: u8) -> Option<Tier> {
        match n {
            1 => Some(Tier::Tier1),
            2 => Some(Tier::Tier2),
            3 => Some(Tier::Tier3),
            _ => None,
        }
    }

    /// The tier that must be completed before this one.
    #[must_use]
    pub const fn previous(self) -> Option<Tier> {
        match self {
            Tier::Tier1 => None,
            Tier::Tier2 => Some(Tier::Tier1),
            Tier::Tier3 => Some(Tier::Tier2),
        }
    }

    /// The tier that follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Tier> {
        match self {
            Tier::Tier1 => Some(Tier::Tier2),
            Tier::Tier2 => Some(Tier::Tier3),
            Tier::Tier3 => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tier{}", self.number())
    }
}

// =============================================================================
// COLLABORATOR VIEWS
// =============================================================================

/// Recorded gender of a member. Selects the institution's gudep code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[serde(alias = "Laki-Laki")]
    Male,
    #[serde(alias = "Perempuan")]
    Female,
    #[default]
    Unspecified,
}

/// A home institution and its certificate codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    pub id: InstitutionId,
    pub name: String,
    /// Gudep code printed on certificates of male members.
    pub gudep_code_male: String,
    /// Gudep code printed on certificates of female members.
    pub gudep_code_female: String,
    #[serde(default)]
    pub deleted: bool,
}

/// A registered member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    #[serde(default)]
    pub member_number: String,
    #[serde(default)]
    pub gender: Gender,
    pub institution_id: InstitutionId,
    #[serde(default)]
    pub deleted: bool,
}

/// Examiner metadata stored alongside a completed tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Examiner {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub position: String,
}

impl Examiner {
    /// Create examiner metadata.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        position: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            position: position.into(),
        }
    }
}

// =============================================================================
// CALLER CONTEXT
// =============================================================================

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    User,
}

impl Role {
    /// Admin roles see every institution.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }
}

/// The authenticated caller, as issued by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub role: Role,
    pub institution_id: Option<InstitutionId>,
}

impl CallerContext {
    /// An admin caller with unrestricted visibility.
    #[must_use]
    pub const fn admin() -> Self {
        Self {
            role: Role::Admin,
            institution_id: None,
        }
    }

    /// An institution-scoped user.
    #[must_use]
    pub const fn user(institution_id: InstitutionId) -> Self {
        Self {
            role: Role::User,
            institution_id: Some(institution_id),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Pramuka system.
///
/// Domain variants are expected, caller-recoverable outcomes of the rules.
/// `Conflict`, `Storage` and `Serialization` are internal.
#[derive(Debug, Error)]
pub enum PramukaError {
    /// Referenced member, institution or record does not exist or is deleted.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A required lower tier or cross-track condition is absent.
    #[error("Prerequisite not met: {0}")]
    PrerequisiteNotMet(String),

    /// The target tier is already marked done.
    #[error("{track} {tier} already promoted")]
    AlreadyPromoted { track: Track, tier: Tier },

    /// An award record already exists for this member.
    #[error("Award already registered for {0}")]
    DuplicateAward(MemberId),

    /// The minimum dwell time since the preceding tier has not elapsed.
    #[error(
        "{track} {tier} requires {required_days} days after {previous}, only {elapsed_days} elapsed"
    )]
    TooSoon {
        track: Track,
        tier: Tier,
        previous: Tier,
        elapsed_days: i64,
        required_days: u32,
    },

    /// The preceding tier is marked done but carries no completion date.
    #[error("{track} {tier} has no completion date")]
    MissingPrerequisiteDate { track: Track, tier: Tier },

    /// A revert was blocked by a completed higher tier.
    #[error("Cannot revert {track} {tier} while {higher} is completed")]
    HigherTierExists {
        track: Track,
        tier: Tier,
        higher: Tier,
    },

    /// The caller's role does not permit the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed identifiers, tiers or configuration.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A conditional write lost against a concurrent writer.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PramukaError {
    /// Whether this is an expected rule outcome rather than an internal failure.
    #[must_use]
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            PramukaError::Conflict(_) | PramukaError::Storage(_) | PramukaError::Serialization(_)
        )
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            PramukaError::NotFound(_) => "not_found",
            PramukaError::PrerequisiteNotMet(_) => "prerequisite_not_met",
            PramukaError::AlreadyPromoted { .. } => "already_promoted",
            PramukaError::DuplicateAward(_) => "duplicate_award",
            PramukaError::TooSoon { .. } => "too_soon",
            PramukaError::MissingPrerequisiteDate { .. } => "missing_prerequisite_date",
            PramukaError::HigherTierExists { .. } => "higher_tier_exists",
            PramukaError::Forbidden(_) => "forbidden",
            PramukaError::InvalidInput(_) => "invalid_input",
            PramukaError::Conflict(_) => "conflict",
            PramukaError::Storage(_) => "storage",
            PramukaError::Serialization(_) => "serialization",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
