//! Company-wide redistribution of pipeline leads.
//!
//! Every pipeline lead is dealt, oldest first, to whichever executive currently carries the least
//! load. Closed and lost leads are not moved but seed each executive's starting load.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::activity::AssignmentActivity;
use crate::domain::lead::{Lead, LeadAssignment, LeadId, CLOSED_STATUSES, PIPELINE_STATUSES};
use crate::domain::member::{CompanyId, MemberId, OrgMember, LEAF_ROLES};
use crate::persister::AssignmentPersister;
use crate::ports::{ActivityStore, LeadReassignment, LeadStore, MemberStore, StoreError};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "executive_ids", rename_all = "snake_case")]
pub enum RebalanceScope {
    #[default]
    All,
    /// Only these executives take part. Leads owned by anyone else stay where they are.
    Executives(Vec<MemberId>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceResult {
    pub updated: u64,
    pub total_leads: usize,
    pub executive_count: usize,
}

type HeapKey = Reverse<(u32, Option<DateTime<Utc>>, DateTime<Utc>, MemberId, usize)>;

/// Owner for each lead, in `leads` order. Ties on load go to the executive assigned longest ago,
/// then the oldest, then the lowest id.
pub fn plan_assignments<'m>(
    roster: &'m [OrgMember],
    base_weights: &HashMap<MemberId, u32>,
    leads: &[Lead],
) -> Vec<&'m OrgMember> {
    if roster.is_empty() {
        return Vec::new();
    }

    let mut heap: BinaryHeap<HeapKey> = roster
        .iter()
        .enumerate()
        .map(|(index, member)| {
            let load = base_weights.get(&member.id).copied().unwrap_or(0);
            Reverse((load, member.last_assigned_at, member.created_at, member.id.clone(), index))
        })
        .collect();

    let mut plan = Vec::with_capacity(leads.len());
    for _ in leads {
        let Some(Reverse((load, last_assigned_at, created_at, id, index))) = heap.pop() else {
            break;
        };
        plan.push(&roster[index]);
        heap.push(Reverse((load + 1, last_assigned_at, created_at, id, index)));
    }
    plan
}

pub struct Rebalancer<'a> {
    members: &'a dyn MemberStore,
    leads: &'a dyn LeadStore,
    activities: &'a dyn ActivityStore,
    persister: AssignmentPersister<'a>,
}

impl<'a> Rebalancer<'a> {
    pub fn new(
        members: &'a dyn MemberStore,
        leads: &'a dyn LeadStore,
        activities: &'a dyn ActivityStore,
        ancestor_max_hops: u32,
    ) -> Self {
        Self {
            members,
            leads,
            activities,
            persister: AssignmentPersister::new(members, leads, activities, ancestor_max_hops),
        }
    }

    pub async fn rebalance(
        &self,
        company_id: &CompanyId,
        scope: &RebalanceScope,
        performed_by: Option<&MemberId>,
        at: DateTime<Utc>,
    ) -> Result<RebalanceResult, StoreError> {
        let roster = self.roster(company_id, scope).await?;
        let roster_ids: HashSet<&MemberId> = roster.iter().map(|member| &member.id).collect();

        let mut leads = self.leads.list_leads_by_status(company_id, PIPELINE_STATUSES).await?;
        if matches!(scope, RebalanceScope::Executives(_)) {
            leads.retain(|lead| lead.assigned_to().map_or(true, |owner| roster_ids.contains(owner)));
        }
        if roster.is_empty() {
            return Ok(RebalanceResult {
                updated: 0,
                total_leads: leads.len(),
                executive_count: 0,
            });
        }

        let ids: Vec<MemberId> = roster.iter().map(|member| member.id.clone()).collect();
        let base_weights =
            self.leads.count_leads_by_assignee(&ids, CLOSED_STATUSES, company_id).await?;
        let plan = plan_assignments(&roster, &base_weights, &leads);

        let mut resolved: HashMap<&MemberId, LeadAssignment> = HashMap::new();
        let mut changes = Vec::new();
        let mut activities = Vec::new();
        for (lead, owner) in leads.iter().zip(plan) {
            if lead.assigned_to() == Some(&owner.id) {
                continue;
            }
            let assignment = match resolved.get(&owner.id) {
                Some(assignment) => assignment.clone(),
                None => {
                    let assignment = self.persister.resolve_assignment(owner, None).await?;
                    resolved.insert(&owner.id, assignment.clone());
                    assignment
                }
            };

            let previous = lead.assigned_to().map(|id| id.0.as_str()).unwrap_or("nobody");
            activities.push(AssignmentActivity::new(
                lead.id.clone(),
                format!("Rebalanced from {previous} to {} ({})", owner.name, owner.role),
                performed_by.cloned(),
                at,
            ));
            changes.push(LeadReassignment {
                lead_id: lead.id.clone(),
                previous: lead.assignment.assigned_to.clone(),
                assignment,
            });
        }

        let updated = if changes.is_empty() {
            0
        } else {
            // Leads claimed by someone else since the snapshot are skipped and get no audit row.
            let applied = self.leads.apply_reassignments(&changes, at).await?;
            let moved: HashSet<&LeadId> = applied.iter().collect();
            activities.retain(|activity| moved.contains(&activity.lead_id));
            if !activities.is_empty() {
                self.activities.append_many(activities).await?;
            }
            applied.len() as u64
        };

        let result =
            RebalanceResult { updated, total_leads: leads.len(), executive_count: roster.len() };
        info!(
            event_name = "assignment.rebalance.completed",
            company_id = %company_id,
            updated = result.updated,
            total_leads = result.total_leads,
            executive_count = result.executive_count,
        );
        Ok(result)
    }

    async fn roster(
        &self,
        company_id: &CompanyId,
        scope: &RebalanceScope,
    ) -> Result<Vec<OrgMember>, StoreError> {
        match scope {
            RebalanceScope::All => self.members.list_members(company_id, LEAF_ROLES, true).await,
            RebalanceScope::Executives(ids) => {
                let mut roster: Vec<OrgMember> = self
                    .members
                    .find_members(ids)
                    .await?
                    .into_iter()
                    .filter(|member| member.is_active_leaf() && &member.company_id == company_id)
                    .collect();
                roster.sort_by(|left, right| {
                    left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
                });
                roster.dedup_by(|left, right| left.id == right.id);
                Ok(roster)
            }
        }
    }
}
