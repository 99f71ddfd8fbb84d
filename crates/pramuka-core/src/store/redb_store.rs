//! # redb-backed Record Store
//!
//! A disk-backed record store using the redb embedded database:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records are encoded with postcard. Every conditional write runs its checks
//! and its mutation inside one write transaction, so a rejected write leaves
//! nothing behind.

use super::{
    AwardStore, Directory, RecordStore, TrackQuery, TrackWrite, check_claim, check_revision,
    next_revision,
};
use crate::numbering::{CertificateScope, IssuedCertificate};
use crate::records::{AwardRecord, MemberTrackA, MemberTrackB, TrackRecord};
use crate::{Institution, InstitutionId, Member, MemberId, PramukaError, RecordId};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Track A records: RecordId(u64) -> serialized MemberTrackA
const TRACK_A: TableDefinition<u64, &[u8]> = TableDefinition::new("track_a");

/// Live Track A index: MemberId(u64) -> RecordId(u64)
const TRACK_A_BY_MEMBER: TableDefinition<u64, u64> = TableDefinition::new("track_a_by_member");

/// Track B rows: RecordId(u64) -> serialized MemberTrackB
const TRACK_B: TableDefinition<u64, &[u8]> = TableDefinition::new("track_b");

/// Track B index: (member_id, record_id) -> category_id
const TRACK_B_BY_MEMBER: TableDefinition<(u64, u64), u64> =
    TableDefinition::new("track_b_by_member");

/// Awards: MemberId(u64) -> serialized AwardRecord
const AWARDS: TableDefinition<u64, &[u8]> = TableDefinition::new("awards");

/// Certificate issue log: (scope key, position) -> certificate
const CERTIFICATES: TableDefinition<(u8, u64), &str> = TableDefinition::new("certificates");

/// Members: MemberId(u64) -> serialized Member
const MEMBERS: TableDefinition<u64, &[u8]> = TableDefinition::new("members");

/// Institutions: InstitutionId(u64) -> serialized Institution
const INSTITUTIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("institutions");

/// Metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const LAST_RECORD_ID: &str = "last_record_id";

fn storage(e: impl std::fmt::Display) -> PramukaError {
    PramukaError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PramukaError> {
    postcard::to_allocvec(value).map_err(|e| PramukaError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PramukaError> {
    postcard::from_bytes(bytes).map_err(|e| PramukaError::Serialization(e.to_string()))
}

fn get_decoded<T, Tbl>(table: &Tbl, key: u64) -> Result<Option<T>, PramukaError>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<u64, &'static [u8]>,
{
    table
        .get(key)
        .map_err(storage)?
        .map(|guard| decode(guard.value()))
        .transpose()
}

fn all_decoded<T, Tbl>(table: &Tbl) -> Result<Vec<T>, PramukaError>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<u64, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in table.iter().map_err(storage)? {
        let (_, value) = entry.map_err(storage)?;
        out.push(decode(value.value())?);
    }
    Ok(out)
}

fn latest_in_log<Tbl>(
    table: &Tbl,
    scope: CertificateScope,
) -> Result<Option<IssuedCertificate>, PramukaError>
where
    Tbl: ReadableTable<(u8, u64), &'static str>,
{
    let key = scope.key();
    let mut range = table.range((key, 0u64)..=(key, u64::MAX)).map_err(storage)?;
    match range.next_back() {
        Some(entry) => {
            let (position, certificate) = entry.map_err(storage)?;
            Ok(Some(IssuedCertificate {
                scope,
                position: position.value().1,
                certificate: certificate.value().to_string(),
            }))
        }
        None => Ok(None),
    }
}

/// A disk-backed record store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a record database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PramukaError> {
        let db = Database::create(path.as_ref()).map_err(storage)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage)?;
            let _ = write_txn.open_table(TRACK_A).map_err(storage)?;
            let _ = write_txn.open_table(TRACK_A_BY_MEMBER).map_err(storage)?;
            let _ = write_txn.open_table(TRACK_B).map_err(storage)?;
            let _ = write_txn.open_table(TRACK_B_BY_MEMBER).map_err(storage)?;
            let _ = write_txn.open_table(AWARDS).map_err(storage)?;
            let _ = write_txn.open_table(CERTIFICATES).map_err(storage)?;
            let _ = write_txn.open_table(MEMBERS).map_err(storage)?;
            let _ = write_txn.open_table(INSTITUTIONS).map_err(storage)?;
            let _ = write_txn.open_table(METADATA).map_err(storage)?;
            write_txn.commit().map_err(storage)?;
        }

        Ok(Self { db })
    }

    fn read<T, F>(
        &self,
        table: TableDefinition<'static, u64, &'static [u8]>,
        f: F,
    ) -> Result<T, PramukaError>
    where
        F: FnOnce(&redb::ReadOnlyTable<u64, &'static [u8]>) -> Result<T, PramukaError>,
    {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let table = read_txn.open_table(table).map_err(storage)?;
        f(&table)
    }

    fn put_encoded<T: Serialize>(
        &mut self,
        table: TableDefinition<'static, u64, &'static [u8]>,
        key: u64,
        value: &T,
    ) -> Result<(), PramukaError> {
        let bytes = encode(value)?;
        let write_txn = self.db.begin_write().map_err(storage)?;
        {
            let mut table = write_txn.open_table(table).map_err(storage)?;
            table.insert(key, bytes.as_slice()).map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;
        Ok(())
    }
}

impl TrackQuery for RedbStore {
    fn track_a(&self, id: RecordId) -> Result<Option<MemberTrackA>, PramukaError> {
        self.read(TRACK_A, |table| get_decoded(table, id.0))
    }

    fn track_a_for_member(&self, member: MemberId) -> Result<Option<MemberTrackA>, PramukaError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let index = read_txn.open_table(TRACK_A_BY_MEMBER).map_err(storage)?;
        let Some(id) = index.get(member.0).map_err(storage)?.map(|g| g.value()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(TRACK_A).map_err(storage)?;
        Ok(get_decoded::<MemberTrackA, _>(&table, id)?.filter(|r| !r.deleted))
    }

    fn track_b(&self, id: RecordId) -> Result<Option<MemberTrackB>, PramukaError> {
        self.read(TRACK_B, |table| get_decoded(table, id.0))
    }

    fn track_b_for_member(&self, member: MemberId) -> Result<Vec<MemberTrackB>, PramukaError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let index = read_txn.open_table(TRACK_B_BY_MEMBER).map_err(storage)?;
        let table = read_txn.open_table(TRACK_B).map_err(storage)?;

        let mut rows = Vec::new();
        for entry in index
            .range((member.0, 0u64)..=(member.0, u64::MAX))
            .map_err(storage)?
        {
            let (key, _) = entry.map_err(storage)?;
            let (_, id) = key.value();
            if let Some(row) = get_decoded::<MemberTrackB, _>(&table, id)? {
                if !row.deleted {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    fn latest_certificate(
        &self,
        scope: CertificateScope,
    ) -> Result<Option<IssuedCertificate>, PramukaError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let table = read_txn.open_table(CERTIFICATES).map_err(storage)?;
        latest_in_log(&table, scope)
    }

    fn track_a_records(&self) -> Result<Vec<MemberTrackA>, PramukaError> {
        let records: Vec<MemberTrackA> = self.read(TRACK_A, |table| all_decoded(table))?;
        Ok(records.into_iter().filter(|r| !r.deleted).collect())
    }

    fn track_b_records(&self) -> Result<Vec<MemberTrackB>, PramukaError> {
        let rows: Vec<MemberTrackB> = self.read(TRACK_B, |table| all_decoded(table))?;
        Ok(rows.into_iter().filter(|r| !r.deleted).collect())
    }
}

impl RecordStore for RedbStore {
    fn save_track_a(
        &mut self,
        write: TrackWrite<MemberTrackA>,
    ) -> Result<MemberTrackA, PramukaError> {
        write.record.check_invariants()?;
        let TrackWrite {
            mut record,
            expected_revision,
            claim,
        } = write;

        let write_txn = self.db.begin_write().map_err(storage)?;
        {
            let mut table = write_txn.open_table(TRACK_A).map_err(storage)?;
            let mut index = write_txn.open_table(TRACK_A_BY_MEMBER).map_err(storage)?;
            let mut log = write_txn.open_table(CERTIFICATES).map_err(storage)?;
            let mut meta = write_txn.open_table(METADATA).map_err(storage)?;

            let stored = get_decoded::<MemberTrackA, _>(&table, record.id.0)?.map(|r| r.revision);
            check_revision(record.id, stored, expected_revision)?;

            let live = index.get(record.member_id.0).map_err(storage)?.map(|g| g.value());
            if expected_revision.is_none() && !record.deleted {
                if let Some(existing) = live {
                    return Err(PramukaError::Conflict(format!(
                        "{} already has Track A {}",
                        record.member_id,
                        RecordId(existing)
                    )));
                }
            }
            if let Some(claim) = &claim {
                let head = latest_in_log(&log, claim.scope)?.map(|c| c.position);
                check_claim(claim, head)?;
            }

            if record.id == RecordId::UNASSIGNED {
                let last = meta.get(LAST_RECORD_ID).map_err(storage)?.map(|g| g.value());
                let id = last.unwrap_or(0).saturating_add(1);
                meta.insert(LAST_RECORD_ID, id).map_err(storage)?;
                record.id = RecordId(id);
            }
            record.revision = next_revision(expected_revision);

            let bytes = encode(&record)?;
            table.insert(record.id.0, bytes.as_slice()).map_err(storage)?;
            if record.deleted {
                if live == Some(record.id.0) {
                    index.remove(record.member_id.0).map_err(storage)?;
                }
            } else {
                index.insert(record.member_id.0, record.id.0).map_err(storage)?;
            }
            if let Some(claim) = &claim {
                log.insert((claim.scope.key(), claim.position()), claim.certificate.as_str())
                    .map_err(storage)?;
            }
        }
        write_txn.commit().map_err(storage)?;
        Ok(record)
    }

    fn save_track_b(
        &mut self,
        write: TrackWrite<MemberTrackB>,
    ) -> Result<MemberTrackB, PramukaError> {
        write.record.check_invariants()?;
        let TrackWrite {
            mut record,
            expected_revision,
            claim,
        } = write;

        let write_txn = self.db.begin_write().map_err(storage)?;
        {
            let mut table = write_txn.open_table(TRACK_B).map_err(storage)?;
            let mut index = write_txn.open_table(TRACK_B_BY_MEMBER).map_err(storage)?;
            let mut log = write_txn.open_table(CERTIFICATES).map_err(storage)?;
            let mut meta = write_txn.open_table(METADATA).map_err(storage)?;

            let stored = get_decoded::<MemberTrackB, _>(&table, record.id.0)?.map(|r| r.revision);
            check_revision(record.id, stored, expected_revision)?;
            if let Some(claim) = &claim {
                let head = latest_in_log(&log, claim.scope)?.map(|c| c.position);
                check_claim(claim, head)?;
            }

            if record.id == RecordId::UNASSIGNED {
                let last = meta.get(LAST_RECORD_ID).map_err(storage)?.map(|g| g.value());
                let id = last.unwrap_or(0).saturating_add(1);
                meta.insert(LAST_RECORD_ID, id).map_err(storage)?;
                record.id = RecordId(id);
            }
            record.revision = next_revision(expected_revision);

            let bytes = encode(&record)?;
            table.insert(record.id.0, bytes.as_slice()).map_err(storage)?;
            index
                .insert((record.member_id.0, record.id.0), record.category_id.0)
                .map_err(storage)?;
            if let Some(claim) = &claim {
                log.insert((claim.scope.key(), claim.position()), claim.certificate.as_str())
                    .map_err(storage)?;
            }
        }
        write_txn.commit().map_err(storage)?;
        Ok(record)
    }
}

impl AwardStore for RedbStore {
    fn award_for_member(&self, member: MemberId) -> Result<Option<AwardRecord>, PramukaError> {
        self.read(AWARDS, |table| get_decoded(table, member.0))
    }

    fn insert_award(&mut self, mut award: AwardRecord) -> Result<AwardRecord, PramukaError> {
        award.revision = 1;
        let bytes = encode(&award)?;
        let write_txn = self.db.begin_write().map_err(storage)?;
        {
            let mut table = write_txn.open_table(AWARDS).map_err(storage)?;
            if table.get(award.member_id.0).map_err(storage)?.is_some() {
                return Err(PramukaError::DuplicateAward(award.member_id));
            }
            table
                .insert(award.member_id.0, bytes.as_slice())
                .map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;
        Ok(award)
    }

    fn save_award(
        &mut self,
        mut award: AwardRecord,
        expected_revision: u64,
    ) -> Result<AwardRecord, PramukaError> {
        award.revision = expected_revision.saturating_add(1);
        let bytes = encode(&award)?;
        let write_txn = self.db.begin_write().map_err(storage)?;
        {
            let mut table = write_txn.open_table(AWARDS).map_err(storage)?;
            let Some(current) = get_decoded::<AwardRecord, _>(&table, award.member_id.0)? else {
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
            table
                .insert(award.member_id.0, bytes.as_slice())
                .map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;
        Ok(award)
    }

    fn awards(&self) -> Result<Vec<AwardRecord>, PramukaError> {
        self.read(AWARDS, |table| all_decoded(table))
    }
}

impl Directory for RedbStore {
    fn member(&self, id: MemberId) -> Result<Option<Member>, PramukaError> {
        self.read(MEMBERS, |table| get_decoded(table, id.0))
    }

    fn institution(&self, id: InstitutionId) -> Result<Option<Institution>, PramukaError> {
        self.read(INSTITUTIONS, |table| get_decoded(table, id.0))
    }

    fn members(&self) -> Result<Vec<Member>, PramukaError> {
        self.read(MEMBERS, |table| all_decoded(table))
    }

    fn institutions(&self) -> Result<Vec<Institution>, PramukaError> {
        self.read(INSTITUTIONS, |table| all_decoded(table))
    }

    fn put_member(&mut self, member: Member) -> Result<(), PramukaError> {
        self.put_encoded(MEMBERS, member.id.0, &member)
    }

    fn put_institution(&mut self, institution: Institution) -> Result<(), PramukaError> {
        self.put_encoded(INSTITUTIONS, institution.id.0, &institution)
    }
}

// =============================================================================
// TESTS
// =============================================================================
