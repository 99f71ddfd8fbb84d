//! # Record Store
//!
//! The persistence seam of the rule engine.
//!
//! Capabilities are split so each engine only sees what it needs:
//! - [`TrackQuery`]: read-only access to track records and the certificate log
//! - [`RecordStore`]: conditional writes of track records
//! - [`AwardStore`]: the award table, with a unique insert
//! - [`Directory`]: member and institution lookups
//!
//! ## Conditional Writes
//!
//! Every write states what it expects to replace:
//! - a track record carries the `revision` it was read at
//! - a certificate claim carries the log head it was numbered against
//! - an award insert fails if any award exists for the member
//!
//! A store that observes a different state rejects the write with
//! `Conflict` (or `DuplicateAward`) and applies nothing.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::numbering::{CertificateClaim, CertificateScope, IssuedCertificate};
use crate::records::{AwardRecord, MemberTrackA, MemberTrackB};
use crate::{Institution, InstitutionId, Member, MemberId, PramukaError, RecordId};
use std::path::Path;

// =============================================================================
// WRITE REQUEST
// =============================================================================

/// A conditional write of one track record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackWrite<R> {
    /// The record as it should be stored.
    pub record: R,
    /// Revision the record was read at, `None` to insert a new record.
    pub expected_revision: Option<u64>,
    /// Certificate issued by this write, appended to its scope's log.
    pub claim: Option<CertificateClaim>,
}

impl<R> TrackWrite<R> {
    /// Insert a record that does not exist yet.
    pub fn insert(record: R) -> Self {
        Self {
            record,
            expected_revision: None,
            claim: None,
        }
    }

    /// Replace a record read at `revision`.
    pub fn update(record: R, revision: u64) -> Self {
        Self {
            record,
            expected_revision: Some(revision),
            claim: None,
        }
    }

    /// Attach an issued certificate.
    #[must_use]
    pub fn with_claim(mut self, claim: CertificateClaim) -> Self {
        self.claim = Some(claim);
        self
    }
}

// =============================================================================
// TRAITS
// =============================================================================

/// Read-only view over track records and issued certificates.
///
/// `*_for_member` lookups only return live (non-deleted) records; lookups by
/// id return the record whatever its state.
pub trait TrackQuery {
    fn track_a(&self, id: RecordId) -> Result<Option<MemberTrackA>, PramukaError>;

    /// The member's live Track A record. At most one exists.
    fn track_a_for_member(&self, member: MemberId) -> Result<Option<MemberTrackA>, PramukaError>;

    fn track_b(&self, id: RecordId) -> Result<Option<MemberTrackB>, PramukaError>;

    /// The member's live Track B rows, ordered by record id.
    fn track_b_for_member(&self, member: MemberId) -> Result<Vec<MemberTrackB>, PramukaError>;

    /// Most recently issued certificate of a scope.
    fn latest_certificate(
        &self,
        scope: CertificateScope,
    ) -> Result<Option<IssuedCertificate>, PramukaError>;

    /// Every live Track A record.
    fn track_a_records(&self) -> Result<Vec<MemberTrackA>, PramukaError>;

    /// Every live Track B row.
    fn track_b_records(&self) -> Result<Vec<MemberTrackB>, PramukaError>;
}

/// Conditional writes of track records.
pub trait RecordStore: TrackQuery {
    /// Store a Track A record. Assigns an id on insert and bumps the revision.
    fn save_track_a(
        &mut self,
        write: TrackWrite<MemberTrackA>,
    ) -> Result<MemberTrackA, PramukaError>;

    /// Store a Track B row. Assigns an id on insert and bumps the revision.
    fn save_track_b(
        &mut self,
        write: TrackWrite<MemberTrackB>,
    ) -> Result<MemberTrackB, PramukaError>;
}

/// The award table.
pub trait AwardStore {
    fn award_for_member(&self, member: MemberId) -> Result<Option<AwardRecord>, PramukaError>;

    /// Insert a new award. Fails with `DuplicateAward` if one exists.
    fn insert_award(&mut self, award: AwardRecord) -> Result<AwardRecord, PramukaError>;

    /// Replace an existing award read at `expected_revision`.
    fn save_award(
        &mut self,
        award: AwardRecord,
        expected_revision: u64,
    ) -> Result<AwardRecord, PramukaError>;

    fn awards(&self) -> Result<Vec<AwardRecord>, PramukaError>;
}

/// Member and institution registry.
pub trait Directory {
    fn member(&self, id: MemberId) -> Result<Option<Member>, PramukaError>;
    fn institution(&self, id: InstitutionId) -> Result<Option<Institution>, PramukaError>;
    fn members(&self) -> Result<Vec<Member>, PramukaError>;
    fn institutions(&self) -> Result<Vec<Institution>, PramukaError>;

    /// A member that exists and is not deleted.
    fn live_member(&self, id: MemberId) -> Result<Member, PramukaError> {
        self.member(id)?
            .filter(|m| !m.deleted)
            .ok_or_else(|| PramukaError::NotFound(id.to_string()))
    }

    /// An institution that exists and is not deleted.
    fn live_institution(&self, id: InstitutionId) -> Result<Institution, PramukaError> {
        self.institution(id)?
            .filter(|i| !i.deleted)
            .ok_or_else(|| PramukaError::NotFound(id.to_string()))
    }

    /// Insert or replace a member.
    fn put_member(&mut self, member: Member) -> Result<(), PramukaError>;

    /// Insert or replace an institution.
    fn put_institution(&mut self, institution: Institution) -> Result<(), PramukaError>;
}

// =============================================================================
// SHARED WRITE CHECKS
// =============================================================================

/// Verify a write's expectation against the stored revision.
pub(crate) fn check_revision(
    id: RecordId,
    stored: Option<u64>,
    expected: Option<u64>,
) -> Result<(), PramukaError> {
    match (stored, expected) {
        (None, None) if id == RecordId::UNASSIGNED => Ok(()),
        (Some(current), Some(expected)) if current == expected => Ok(()),
        (Some(current), Some(expected)) => Err(PramukaError::Conflict(format!(
            "{} is at revision {}, write expected {}",
            id, current, expected
        ))),
        (None, Some(_)) => Err(PramukaError::NotFound(id.to_string())),
        (Some(_), None) | (None, None) => Err(PramukaError::Conflict(format!(
            "{} cannot be inserted twice",
            id
        ))),
    }
}

/// Revision a record carries after a successful write.
pub(crate) fn next_revision(expected: Option<u64>) -> u64 {
    expected.map_or(1, |revision| revision.saturating_add(1))
}

/// Verify a certificate claim against the scope's current log head.
pub(crate) fn check_claim(
    claim: &CertificateClaim,
    head: Option<u64>,
) -> Result<(), PramukaError> {
    if claim.certificate.is_empty() {
        return Err(PramukaError::InvalidInput(format!(
            "empty certificate claimed for {}",
            claim.scope
        )));
    }
    if claim.expected_head != head {
        return Err(PramukaError::Conflict(format!(
            "certificate log of {} moved while numbering",
            claim.scope
        )));
    }
    Ok(())
}

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend of a registry.
#[derive(Debug)]
pub enum StorageBackend {
    /// `BTreeMap` store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    /// Open or create a redb database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PramukaError> {
        Ok(Self::Persistent(RedbStore::open(path)?))
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, StorageBackend::Persistent(_))
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            StorageBackend::InMemory($store) => $call,
            StorageBackend::Persistent($store) => $call,
        }
    };
}

impl TrackQuery for StorageBackend {
    fn track_a(&self, id: RecordId) -> Result<Option<MemberTrackA>, PramukaError> {
        dispatch!(self, s => s.track_a(id))
    }

    fn track_a_for_member(&self, member: MemberId) -> Result<Option<MemberTrackA>, PramukaError> {
        dispatch!(self, s => s.track_a_for_member(member))
    }

    fn track_b(&self, id: RecordId) -> Result<Option<MemberTrackB>, PramukaError> {
        dispatch!(self, s => s.track_b(id))
    }

    fn track_b_for_member(&self, member: MemberId) -> Result<Vec<MemberTrackB>, PramukaError> {
        dispatch!(self, s => s.track_b_for_member(member))
    }

    fn latest_certificate(
        &self,
        scope: CertificateScope,
    ) -> Result<Option<IssuedCertificate>, PramukaError> {
        dispatch!(self, s => s.latest_certificate(scope))
    }

    fn track_a_records(&self) -> Result<Vec<MemberTrackA>, PramukaError> {
        dispatch!(self, s => s.track_a_records())
    }

    fn track_b_records(&self) -> Result<Vec<MemberTrackB>, PramukaError> {
        dispatch!(self, s => s.track_b_records())
    }
}

impl RecordStore for StorageBackend {
    fn save_track_a(
        &mut self,
        write: TrackWrite<MemberTrackA>,
    ) -> Result<MemberTrackA, PramukaError> {
        dispatch!(self, s => s.save_track_a(write))
    }

    fn save_track_b(
        &mut self,
        write: TrackWrite<MemberTrackB>,
    ) -> Result<MemberTrackB, PramukaError> {
        dispatch!(self, s => s.save_track_b(write))
    }
}

impl AwardStore for StorageBackend {
    fn award_for_member(&self, member: MemberId) -> Result<Option<AwardRecord>, PramukaError> {
        dispatch!(self, s => s.award_for_member(member))
    }

    fn insert_award(&mut self, award: AwardRecord) -> Result<AwardRecord, PramukaError> {
        dispatch!(self, s => s.insert_award(award))
    }

    fn save_award(
        &mut self,
        award: AwardRecord,
        expected_revision: u64,
    ) -> Result<AwardRecord, PramukaError> {
        dispatch!(self, s => s.save_award(award, expected_revision))
    }

    fn awards(&self) -> Result<Vec<AwardRecord>, PramukaError> {
        dispatch!(self, s => s.awards())
    }
}

impl Directory for StorageBackend {
    fn member(&self, id: MemberId) -> Result<Option<Member>, PramukaError> {
        dispatch!(self, s => s.member(id))
    }

    fn institution(&self, id: InstitutionId) -> Result<Option<Institution>, PramukaError> {
        dispatch!(self, s => s.institution(id))
    }

    fn members(&self) -> Result<Vec<Member>, PramukaError> {
        dispatch!(self, s => s.members())
    }

    fn institutions(&self) -> Result<Vec<Institution>, PramukaError> {
        dispatch!(self, s => s.institutions())
    }

    fn put_member(&mut self, member: Member) -> Result<(), PramukaError> {
        dispatch!(self, s => s.put_member(member))
    }

    fn put_institution(&mut self, institution: Institution) -> Result<(), PramukaError> {
        dispatch!(self, s => s.put_institution(institution))
    }
}
