//! Narrow persistence ports the assignment engine depends on.
//!
//! Every aggregation the engine needs is expressed as a single batched call so that
//! implementations can answer it with one query regardless of the backing technology.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::activity::AssignmentActivity;
use crate::domain::lead::{Lead, LeadAssignment, LeadId, LeadStatus};
use crate::domain::member::{CompanyId, MemberId, OrgMember, Role};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("record `{0}` not found")]
    Missing(String),
}

/// One lead moving from `previous` to a new owner. Applied only if the lead is still owned by
/// `previous` when the write lands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeadReassignment {
    pub lead_id: LeadId,
    pub previous: Option<MemberId>,
    pub assignment: LeadAssignment,
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn find_member(&self, id: &MemberId) -> Result<Option<OrgMember>, StoreError>;

    async fn find_members(&self, ids: &[MemberId]) -> Result<Vec<OrgMember>, StoreError>;

    /// Direct reports of any id in `parent_ids`, ordered by `created_at` then id.
    async fn find_children(
        &self,
        parent_ids: &[MemberId],
        company_id: &CompanyId,
        include_inactive: bool,
    ) -> Result<Vec<OrgMember>, StoreError>;

    /// Members holding one of `roles`, ordered by `created_at` then id.
    async fn list_members(
        &self,
        company_id: &CompanyId,
        roles: &[Role],
        active_only: bool,
    ) -> Result<Vec<OrgMember>, StoreError>;

    async fn save_member(&self, member: OrgMember) -> Result<(), StoreError>;

    /// Stamps `last_assigned_at`; increments `last_assigned_index` when `bump_index` is set.
    async fn record_assignment(
        &self,
        id: &MemberId,
        at: DateTime<Utc>,
        bump_index: bool,
    ) -> Result<(), StoreError>;

    async fn set_parent(
        &self,
        id: &MemberId,
        parent_id: Option<&MemberId>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn find_lead(&self, id: &LeadId) -> Result<Option<Lead>, StoreError>;

    async fn find_lead_by_phone(
        &self,
        company_id: &CompanyId,
        phone: &str,
    ) -> Result<Option<Lead>, StoreError>;

    async fn save_lead(&self, lead: Lead) -> Result<(), StoreError>;

    /// Lead counts per assignee restricted to `statuses`. Assignees with no leads are absent.
    async fn count_leads_by_assignee(
        &self,
        assignee_ids: &[MemberId],
        statuses: &[LeadStatus],
        company_id: &CompanyId,
    ) -> Result<HashMap<MemberId, u32>, StoreError>;

    /// Lead counts per assignee for leads created in `[start, end)`, any status.
    async fn count_created_between_by_assignee(
        &self,
        assignee_ids: &[MemberId],
        company_id: &CompanyId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<MemberId, u32>, StoreError>;

    /// Leads in `statuses`, ordered by `created_at` then id.
    async fn list_leads_by_status(
        &self,
        company_id: &CompanyId,
        statuses: &[LeadStatus],
    ) -> Result<Vec<Lead>, StoreError>;

    async fn update_assignment(
        &self,
        lead_id: &LeadId,
        assignment: &LeadAssignment,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn update_status(
        &self,
        lead_id: &LeadId,
        status: LeadStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Applies all reassignments as one batch and returns the ids of the leads that moved. Rows
    /// whose current owner no longer matches `previous` are skipped.
    async fn apply_reassignments(
        &self,
        changes: &[LeadReassignment],
        at: DateTime<Utc>,
    ) -> Result<Vec<LeadId>, StoreError>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn append(&self, activity: AssignmentActivity) -> Result<(), StoreError>;

    async fn append_many(&self, activities: Vec<AssignmentActivity>) -> Result<(), StoreError>;

    /// Activities for one lead, oldest first.
    async fn list_for_lead(&self, lead_id: &LeadId)
        -> Result<Vec<AssignmentActivity>, StoreError>;
}
