//! # Tenant Scope
//!
//! `ScopedRegistry` applies the caller's visibility once, at the boundary.
//!
//! | Role | Sees | May |
//! |------|------|-----|
//! | SuperAdmin, Admin | every institution | everything |
//! | User | its own institution | promote, revert, evaluate, register members |
//!
//! Records of members outside the caller's institution are reported as
//! `NotFound`, never as `Forbidden`, so their existence is not revealed.
//!
//! The wrapper holds anything that dereferences to a [`Registry`]: a shared
//! borrow or read guard gives the lookups, a mutable one adds the writes.

use crate::award::AwardEligibility;
use crate::records::{AwardRecord, MemberTrackA, MemberTrackB, Record};
use crate::registry::{Registry, Summary};
use crate::{
    CallerContext, CategoryId, Examiner, Institution, InstitutionId, Member, MemberId,
    PramukaError, RecordId, Tier,
};
use std::ops::{Deref, DerefMut};

/// A registry seen through one caller's tenant scope.
#[derive(Debug)]
pub struct ScopedRegistry<R> {
    registry: R,
    caller: CallerContext,
}

impl<R: Deref<Target = Registry>> ScopedRegistry<R> {
    /// Scope `registry` to `caller`. A user without an institution is rejected.
    pub fn new(registry: R, caller: CallerContext) -> Result<Self, PramukaError> {
        if !caller.role.is_admin() && caller.institution_id.is_none() {
            return Err(PramukaError::InvalidInput(
                "user caller has no institution".to_string(),
            ));
        }
        Ok(Self { registry, caller })
    }

    #[must_use]
    pub fn caller(&self) -> CallerContext {
        self.caller
    }

    /// Whether the caller may see members of `institution`.
    #[must_use]
    pub fn can_see(&self, institution: InstitutionId) -> bool {
        self.caller.role.is_admin() || self.caller.institution_id == Some(institution)
    }

    fn require_admin(&self, action: &str) -> Result<(), PramukaError> {
        if self.caller.role.is_admin() {
            Ok(())
        } else {
            Err(PramukaError::Forbidden(format!(
                "only administrators may {}",
                action
            )))
        }
    }

    /// A live member visible to the caller.
    pub fn member(&self, id: MemberId) -> Result<Member, PramukaError> {
        let member = self.registry.member(id)?;
        if self.can_see(member.institution_id) {
            Ok(member)
        } else {
            Err(PramukaError::NotFound(id.to_string()))
        }
    }

    fn visible_record(&self, id: RecordId) -> Result<Record, PramukaError> {
        let record = self.registry.record(id)?;
        match self.member(record.member_id()) {
            Ok(_) => Ok(record),
            Err(_) => Err(PramukaError::NotFound(id.to_string())),
        }
    }

    pub fn members(&self) -> Result<Vec<Member>, PramukaError> {
        Ok(self
            .registry
            .members()?
            .into_iter()
            .filter(|m| self.can_see(m.institution_id))
            .collect())
    }

    pub fn institutions(&self) -> Result<Vec<Institution>, PramukaError> {
        Ok(self
            .registry
            .institutions()?
            .into_iter()
            .filter(|i| self.can_see(i.id))
            .collect())
    }

    pub fn institution(&self, id: InstitutionId) -> Result<Institution, PramukaError> {
        if !self.can_see(id) {
            return Err(PramukaError::NotFound(id.to_string()));
        }
        self.registry.institution(id)
    }

    pub fn record(&self, id: RecordId) -> Result<Record, PramukaError> {
        self.visible_record(id)
    }

    pub fn track_a(&self, member: MemberId) -> Result<Option<MemberTrackA>, PramukaError> {
        self.member(member)?;
        self.registry.track_a(member)
    }

    pub fn track_b(&self, member: MemberId) -> Result<Vec<MemberTrackB>, PramukaError> {
        self.member(member)?;
        self.registry.track_b(member)
    }

    pub fn award_eligibility(&self, member: MemberId) -> Result<AwardEligibility, PramukaError> {
        self.member(member)?;
        self.registry.award_eligibility(member)
    }

    pub fn award(&self, member: MemberId) -> Result<Option<AwardRecord>, PramukaError> {
        self.member(member)?;
        self.registry.award(member)
    }

    /// Counts over the members visible to the caller.
    pub fn summary(&self) -> Result<Summary, PramukaError> {
        self.registry
            .summary_where(|m| self.can_see(m.institution_id))
    }
}

impl<R: DerefMut<Target = Registry>> ScopedRegistry<R> {
    // =========================================================================
    // DIRECTORY
    // =========================================================================

    /// Institutions are managed by administrators only.
    pub fn register_institution(
        &mut self,
        institution: Institution,
    ) -> Result<Institution, PramukaError> {
        self.require_admin("register institutions")?;
        self.registry.register_institution(institution)
    }

    /// Users may only register members into their own institution, and may
    /// not take over an id held by another institution, deleted or not.
    pub fn register_member(&mut self, member: Member) -> Result<Member, PramukaError> {
        if !self.can_see(member.institution_id) {
            return Err(PramukaError::Forbidden(format!(
                "cannot register members in {}",
                member.institution_id
            )));
        }
        let existing = self.registry.stored_member(member.id)?;
        if existing.is_some_and(|m| !self.can_see(m.institution_id)) {
            return Err(PramukaError::Forbidden(format!(
                "cannot modify {}",
                member.id
            )));
        }
        self.registry.register_member(member)
    }

    pub fn delete_member(&mut self, id: MemberId) -> Result<Member, PramukaError> {
        self.member(id)?;
        self.registry.delete_member(id)
    }

    // =========================================================================
    // PROMOTION
    // =========================================================================

    pub fn promote_track_a(
        &mut self,
        member: MemberId,
        examiner: &Examiner,
    ) -> Result<MemberTrackA, PramukaError> {
        self.member(member)?;
        self.registry.promote_track_a(member, examiner)
    }

    pub fn promote_track_a_to(
        &mut self,
        member: MemberId,
        tier: Tier,
        examiner: &Examiner,
    ) -> Result<MemberTrackA, PramukaError> {
        self.member(member)?;
        self.registry.promote_track_a_to(member, tier, examiner)
    }

    pub fn promote_track_b(
        &mut self,
        member: MemberId,
        category: CategoryId,
        tier: Tier,
        examiner: &Examiner,
    ) -> Result<MemberTrackB, PramukaError> {
        self.member(member)?;
        self.registry
            .promote_track_b(member, category, tier, examiner)
    }

    pub fn promote_track_b_record(
        &mut self,
        record: RecordId,
        tier: Tier,
        examiner: &Examiner,
    ) -> Result<MemberTrackB, PramukaError> {
        self.visible_record(record)?;
        self.registry.promote_track_b_record(record, tier, examiner)
    }

    pub fn revert_tier(&mut self, record: RecordId, tier: Tier) -> Result<Record, PramukaError> {
        self.visible_record(record)?;
        self.registry.revert_tier(record, tier)
    }

    pub fn delete_record(&mut self, record: RecordId) -> Result<Record, PramukaError> {
        self.visible_record(record)?;
        self.registry.delete_record(record)
    }

    // =========================================================================
    // AWARD
    // =========================================================================

    pub fn evaluate_award(&mut self, member: MemberId) -> Result<AwardRecord, PramukaError> {
        self.member(member)?;
        self.registry.evaluate_award(member)
    }

    /// Approval is reserved to administrators.
    pub fn approve_award(
        &mut self,
        member: MemberId,
        approved_by: &str,
    ) -> Result<AwardRecord, PramukaError> {
        self.require_admin("approve awards")?;
        self.member(member)?;
        self.registry.approve_award(member, approved_by)
    }
}

// =============================================================================
// TESTS
// =============================================================================
