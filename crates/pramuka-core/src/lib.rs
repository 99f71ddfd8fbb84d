//! # pramuka-core
//!
//! The skill-badge progression engine for Pramuka - THE LOGIC.
//!
//! This crate decides whether a scout may be promoted to the next tier of a
//! skill-badge track, numbers the certificates promotions issue, and decides
//! eligibility for the Garuda award that aggregates both tracks.
//!
//! ## Architecture
//!
//! ```text
//! ScopedRegistry ─► Registry ─┬─► PromotionEngine ─► Numbering
//!   (tenant scope)  (clock)   └─► AwardEngine
//!                                      │
//!                       StorageBackend (MemoryStore | RedbStore)
//! ```
//!
//! ## Architectural Constraints
//!
//! - Engines are stateless: every state change goes through the store
//! - Every write is conditional, so checks hold at write time
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod award;
pub mod config;
pub mod numbering;
pub mod primitives;
pub mod promotion;
pub mod records;
pub mod registry;
pub mod scope;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CallerContext, CategoryId, Examiner, Gender, Institution, InstitutionId, Member, MemberId,
    PramukaError, RecordId, Role, Tier, Track,
};

// =============================================================================
// RE-EXPORTS: Records & Rules
// =============================================================================

pub use config::{AwardRules, RuleConfig, TrackARules, TrackBRules};
pub use records::{
    AwardRecord, AwardStatus, MemberTrackA, MemberTrackB, Record, TierEntry, TrackALevel,
    TrackRecord,
};

// =============================================================================
// RE-EXPORTS: Engines
// =============================================================================

pub use award::{AwardEligibility, AwardEngine, CategoryTally, TierTally};
pub use numbering::{CertificateClaim, CertificateScope, IssuedCertificate, Numbering};
pub use promotion::PromotionEngine;

// =============================================================================
// RE-EXPORTS: Storage & Sessions
// =============================================================================

pub use registry::{AwardSummary, Registry, Summary, TierCount, TrackSummary};
pub use scope::ScopedRegistry;
pub use store::{
    AwardStore, Directory, MemoryStore, RecordStore, RedbStore, StorageBackend, TrackQuery,
    TrackWrite,
};
