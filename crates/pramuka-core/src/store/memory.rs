//! # In-memory Record Store
//!
//! `BTreeMap`-backed implementation of every store trait.
//!
//! All data structures use `BTreeMap` for deterministic ordering, so listings
//! and tallies come out in id order on every run.

use super::{
    AwardStore, Directory, RecordStore, TrackQuery, TrackWrite, check_claim, check_revision,
    next_revision,
};
use crate::numbering::{CertificateClaim, CertificateScope, IssuedCertificate};
use crate::records::{AwardRecord, MemberTrackA, MemberTrackB, TrackRecord};
use crate::{Institution, InstitutionId, Member, MemberId, PramukaError, RecordId};
use std::collections::BTreeMap;

/// A volatile record store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    track_a: BTreeMap<RecordId, MemberTrackA>,
    track_b: BTreeMap<RecordId, MemberTrackB>,
    awards: BTreeMap<MemberId, AwardRecord>,
    certificates: BTreeMap<CertificateScope, Vec<String>>,
    members: BTreeMap<MemberId, Member>,
    institutions: BTreeMap<InstitutionId, Institution>,
    /// Last assigned record id. Track A and Track B share the id space.
    last_record_id: u64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> RecordId {
        self.last_record_id = self.last_record_id.saturating_add(1);
        RecordId(self.last_record_id)
    }

    fn log_head(&self, scope: CertificateScope) -> Option<u64> {
        self.certificates
            .get(&scope)
            .and_then(|log| log.len().checked_sub(1))
            .map(|head| head as u64)
    }

    /// Checks shared by both tracks. Nothing is written.
    fn check_write<R: TrackRecord>(
        &self,
        write: &TrackWrite<R>,
        stored_revision: Option<u64>,
    ) -> Result<(), PramukaError> {
        write.record.check_invariants()?;
        check_revision(write.record.id(), stored_revision, write.expected_revision)?;
        if let Some(claim) = &write.claim {
            check_claim(claim, self.log_head(claim.scope))?;
        }
        Ok(())
    }

    fn append(&mut self, claim: Option<CertificateClaim>) {
        if let Some(claim) = claim {
            self.certificates
                .entry(claim.scope)
                .or_default()
                .push(claim.certificate);
        }
    }
}

impl TrackQuery for MemoryStore {
    fn track_a(&self, id: RecordId) -> Result<Option<MemberTrackA>, PramukaError> {
        Ok(self.track_a.get(&id).cloned())
    }

    fn track_a_for_member(&self, member: MemberId) -> Result<Option<MemberTrackA>, PramukaError> {
        Ok(self
            .track_a
            .values()
            .find(|r| r.member_id == member && !r.deleted)
            .cloned())
    }

    fn track_b(&self, id: RecordId) -> Result<Option<MemberTrackB>, PramukaError> {
        Ok(self.track_b.get(&id).cloned())
    }

    fn track_b_for_member(&self, member: MemberId) -> Result<Vec<MemberTrackB>, PramukaError> {
        Ok(self
            .track_b
            .values()
            .filter(|r| r.member_id == member && !r.deleted)
            .cloned()
            .collect())
    }

    fn latest_certificate(
        &self,
        scope: CertificateScope,
    ) -> Result<Option<IssuedCertificate>, PramukaError> {
        Ok(self.certificates.get(&scope).and_then(|log| {
            let position = log.len().checked_sub(1)?;
            log.last().map(|certificate| IssuedCertificate {
                scope,
                position: position as u64,
                certificate: certificate.clone(),
            })
        }))
    }

    fn track_a_records(&self) -> Result<Vec<MemberTrackA>, PramukaError> {
        Ok(self.track_a.values().filter(|r| !r.deleted).cloned().collect())
    }

    fn track_b_records(&self) -> Result<Vec<MemberTrackB>, PramukaError> {
        Ok(self.track_b.values().filter(|r| !r.deleted).cloned().collect())
    }
}

impl RecordStore for MemoryStore {
    fn save_track_a(
        &mut self,
        write: TrackWrite<MemberTrackA>,
    ) -> Result<MemberTrackA, PramukaError> {
        let stored = self.track_a.get(&write.record.id).map(|r| r.revision);
        self.check_write(&write, stored)?;
        if write.expected_revision.is_none() && !write.record.deleted {
            if let Some(existing) = self.track_a_for_member(write.record.member_id)? {
                return Err(PramukaError::Conflict(format!(
                    "{} already has Track A {}",
                    existing.member_id, existing.id
                )));
            }
        }

        let TrackWrite {
            mut record,
            expected_revision,
            claim,
        } = write;
        if record.id == RecordId::UNASSIGNED {
            record.id = self.allocate_id();
        }
        record.revision = next_revision(expected_revision);
        self.append(claim);
        self.track_a.insert(record.id, record.clone());
        Ok(record)
    }

    fn save_track_b(
        &mut self,
        write: TrackWrite<MemberTrackB>,
    ) -> Result<MemberTrackB, PramukaError> {
        let stored = self.track_b.get(&write.record.id).map(|r| r.revision);
        self.check_write(&write, stored)?;

        let TrackWrite {
            mut record,
            expected_revision,
            claim,
        } = write;
        if record.id == RecordId::UNASSIGNED {
            record.id = self.allocate_id();
        }
        record.revision = next_revision(expected_revision);
        self.append(claim);
        self.track_b.insert(record.id, record.clone());
        Ok(record)
    }
}

impl AwardStore for MemoryStore {
    fn award_for_member(&self, member: MemberId) -> Result<Option<AwardRecord>, PramukaError> {
        Ok(self.awards.get(&member).cloned())
    }

    fn insert_award(&mut self, mut award: AwardRecord) -> Result<AwardRecord, PramukaError> {
        if self.awards.contains_key(&award.member_id) {
            return Err(PramukaError::DuplicateAward(award.member_id));
        }
        award.revision = 1;
        self.awards.insert(award.member_id, award.clone());
        Ok(award)
    }

    fn save_award(
        &mut self,
        mut award: AwardRecord,
        expected_revision: u64,
    ) -> Result<AwardRecord, PramukaError> {
        let Some(current) = self.awards.get(&award.member_id) else {
            return Err(PramukaError::NotFound(format!(
                "award of {}",
                award.member_id
            )));
        };
        if current.revision != expected_revision {
            return Err(PramukaError::Conflict(format!(
                "award of {} is at revision {}, write expected {}",
                award.member_id, current.revision, expected_revision
            )));
        }
        award.revision = expected_revision.saturating_add(1);
        self.awards.insert(award.member_id, award.clone());
        Ok(award)
    }

    fn awards(&self) -> Result<Vec<AwardRecord>, PramukaError> {
        Ok(self.awards.values().cloned().collect())
    }
}

impl Directory for MemoryStore {
    fn member(&self, id: MemberId) -> Result<Option<Member>, PramukaError> {
        Ok(self.members.get(&id).cloned())
    }

    fn institution(&self, id: InstitutionId) -> Result<Option<Institution>, PramukaError> {
        Ok(self.institutions.get(&id).cloned())
    }

    fn members(&self) -> Result<Vec<Member>, PramukaError> {
        Ok(self.members.values().cloned().collect())
    }

    fn institutions(&self) -> Result<Vec<Institution>, PramukaError> {
        Ok(self.institutions.values().cloned().collect())
    }

    fn put_member(&mut self, member: Member) -> Result<(), PramukaError> {
        self.members.insert(member.id, member);
        Ok(())
    }

    fn put_institution(&mut self, institution: Institution) -> Result<(), PramukaError> {
        self.institutions.insert(institution.id, institution);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
