use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::activity::AssignmentActivity;
use crate::domain::lead::{Lead, LeadAssignment, LeadId, LeadStatus};
use crate::domain::member::{CompanyId, MemberId, OrgMember, Role};
use crate::ports::{ActivityStore, LeadReassignment, LeadStore, MemberStore, StoreError};

/// Process-local implementation of every port, keyed by id.
#[derive(Default)]
pub struct InMemoryOrgStore {
    members: RwLock<HashMap<MemberId, OrgMember>>,
    leads: RwLock<HashMap<LeadId, Lead>>,
    activities: RwLock<Vec<AssignmentActivity>>,
}

impl InMemoryOrgStore {
    pub async fn with_members(members: impl IntoIterator<Item = OrgMember>) -> Self {
        let store = Self::default();
        {
            let mut stored = store.members.write().await;
            for member in members {
                stored.insert(member.id.clone(), member);
            }
        }
        store
    }

    pub async fn insert_leads(&self, leads: impl IntoIterator<Item = Lead>) {
        let mut stored = self.leads.write().await;
        for lead in leads {
            stored.insert(lead.id.clone(), lead);
        }
    }

    pub async fn all_leads(&self) -> Vec<Lead> {
        let leads = self.leads.read().await;
        let mut all: Vec<Lead> = leads.values().cloned().collect();
        all.sort_by(|left, right| left.id.cmp(&right.id));
        all
    }

    pub async fn all_activities(&self) -> Vec<AssignmentActivity> {
        self.activities.read().await.clone()
    }
}

fn by_creation(left: &OrgMember, right: &OrgMember) -> std::cmp::Ordering {
    left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
}

#[async_trait]
impl MemberStore for InMemoryOrgStore {
    async fn find_member(&self, id: &MemberId) -> Result<Option<OrgMember>, StoreError> {
        let members = self.members.read().await;
        Ok(members.get(id).cloned())
    }

    async fn find_members(&self, ids: &[MemberId]) -> Result<Vec<OrgMember>, StoreError> {
        let members = self.members.read().await;
        let mut found: Vec<OrgMember> = ids.iter().filter_map(|id| members.get(id).cloned()).collect();
        found.sort_by(by_creation);
        found.dedup_by(|left, right| left.id == right.id);
        Ok(found)
    }

    async fn find_children(
        &self,
        parent_ids: &[MemberId],
        company_id: &CompanyId,
        include_inactive: bool,
    ) -> Result<Vec<OrgMember>, StoreError> {
        let members = self.members.read().await;
        let mut children: Vec<OrgMember> = members
            .values()
            .filter(|member| &member.company_id == company_id)
            .filter(|member| include_inactive || member.is_active)
            .filter(|member| {
                member.parent_id.as_ref().is_some_and(|parent| parent_ids.contains(parent))
            })
            .cloned()
            .collect();
        children.sort_by(by_creation);
        Ok(children)
    }

    async fn list_members(
        &self,
        company_id: &CompanyId,
        roles: &[Role],
        active_only: bool,
    ) -> Result<Vec<OrgMember>, StoreError> {
        let members = self.members.read().await;
        let mut listed: Vec<OrgMember> = members
            .values()
            .filter(|member| &member.company_id == company_id)
            .filter(|member| roles.contains(&member.role))
            .filter(|member| !active_only || member.is_active)
            .cloned()
            .collect();
        listed.sort_by(by_creation);
        Ok(listed)
    }

    async fn save_member(&self, member: OrgMember) -> Result<(), StoreError> {
        let mut members = self.members.write().await;
        members.insert(member.id.clone(), member);
        Ok(())
    }

    async fn record_assignment(
        &self,
        id: &MemberId,
        at: DateTime<Utc>,
        bump_index: bool,
    ) -> Result<(), StoreError> {
        let mut members = self.members.write().await;
        let member = members.get_mut(id).ok_or_else(|| StoreError::Missing(id.0.clone()))?;
        member.last_assigned_at = Some(at);
        if bump_index {
            member.last_assigned_index += 1;
        }
        Ok(())
    }

    async fn set_parent(
        &self,
        id: &MemberId,
        parent_id: Option<&MemberId>,
    ) -> Result<(), StoreError> {
        let mut members = self.members.write().await;
        let member = members.get_mut(id).ok_or_else(|| StoreError::Missing(id.0.clone()))?;
        member.parent_id = parent_id.cloned();
        Ok(())
    }
}

#[async_trait]
impl LeadStore for InMemoryOrgStore {
    async fn find_lead(&self, id: &LeadId) -> Result<Option<Lead>, StoreError> {
        let leads = self.leads.read().await;
        Ok(leads.get(id).cloned())
    }

    async fn find_lead_by_phone(
        &self,
        company_id: &CompanyId,
        phone: &str,
    ) -> Result<Option<Lead>, StoreError> {
        let leads = self.leads.read().await;
        Ok(leads
            .values()
            .filter(|lead| &lead.company_id == company_id && lead.phone == phone)
            .min_by(|left, right| {
                left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
            })
            .cloned())
    }

    async fn save_lead(&self, lead: Lead) -> Result<(), StoreError> {
        let mut leads = self.leads.write().await;
        leads.insert(lead.id.clone(), lead);
        Ok(())
    }

    async fn count_leads_by_assignee(
        &self,
        assignee_ids: &[MemberId],
        statuses: &[LeadStatus],
        company_id: &CompanyId,
    ) -> Result<HashMap<MemberId, u32>, StoreError> {
        let leads = self.leads.read().await;
        let mut counts = HashMap::new();
        for lead in leads.values() {
            if &lead.company_id != company_id || !statuses.contains(&lead.status) {
                continue;
            }
            if let Some(owner) = lead.assigned_to().filter(|owner| assignee_ids.contains(owner)) {
                *counts.entry(owner.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn count_created_between_by_assignee(
        &self,
        assignee_ids: &[MemberId],
        company_id: &CompanyId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<MemberId, u32>, StoreError> {
        let leads = self.leads.read().await;
        let mut counts = HashMap::new();
        for lead in leads.values() {
            if &lead.company_id != company_id || lead.created_at < start || lead.created_at >= end {
                continue;
            }
            if let Some(owner) = lead.assigned_to().filter(|owner| assignee_ids.contains(owner)) {
                *counts.entry(owner.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn list_leads_by_status(
        &self,
        company_id: &CompanyId,
        statuses: &[LeadStatus],
    ) -> Result<Vec<Lead>, StoreError> {
        let leads = self.leads.read().await;
        let mut listed: Vec<Lead> = leads
            .values()
            .filter(|lead| &lead.company_id == company_id && statuses.contains(&lead.status))
            .cloned()
            .collect();
        listed.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(listed)
    }

    async fn update_assignment(
        &self,
        lead_id: &LeadId,
        assignment: &LeadAssignment,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut leads = self.leads.write().await;
        let lead = leads.get_mut(lead_id).ok_or_else(|| StoreError::Missing(lead_id.0.clone()))?;
        lead.assignment = assignment.clone();
        lead.updated_at = at;
        Ok(())
    }

    async fn update_status(
        &self,
        lead_id: &LeadId,
        status: LeadStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut leads = self.leads.write().await;
        let lead = leads.get_mut(lead_id).ok_or_else(|| StoreError::Missing(lead_id.0.clone()))?;
        lead.status = status;
        lead.updated_at = at;
        Ok(())
    }

    async fn apply_reassignments(
        &self,
        changes: &[LeadReassignment],
        at: DateTime<Utc>,
    ) -> Result<Vec<LeadId>, StoreError> {
        let mut leads = self.leads.write().await;
        let mut applied = Vec::new();
        for change in changes {
            let Some(lead) = leads.get_mut(&change.lead_id) else {
                continue;
            };
            if lead.assignment.assigned_to != change.previous {
                continue;
            }
            lead.assignment = change.assignment.clone();
            lead.updated_at = at;
            applied.push(change.lead_id.clone());
        }
        Ok(applied)
    }
}

#[async_trait]
impl ActivityStore for InMemoryOrgStore {
    async fn append(&self, activity: AssignmentActivity) -> Result<(), StoreError> {
        self.activities.write().await.push(activity);
        Ok(())
    }

    async fn append_many(&self, activities: Vec<AssignmentActivity>) -> Result<(), StoreError> {
        self.activities.write().await.extend(activities);
        Ok(())
    }

    async fn list_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<AssignmentActivity>, StoreError> {
        let activities = self.activities.read().await;
        Ok(activities.iter().filter(|activity| &activity.lead_id == lead_id).cloned().collect())
    }
}
