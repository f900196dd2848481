use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::activity::AssignmentActivity;
use crate::domain::lead::{Lead, LeadAssignment, LeadId};
use crate::domain::member::{MemberId, OrgMember, Role};
use crate::hierarchy::HierarchyWalker;
use crate::ports::{ActivityStore, LeadStore, MemberStore, StoreError};
use crate::strategy::{AssignmentMode, PendingReason, Selection};

/// Writes an assignment decision back to the stores.
///
/// The writes run one after another with no surrounding transaction. A failure part way leaves
/// the earlier writes in place; each step is logged so a partial write can be traced.
pub struct AssignmentPersister<'a> {
    members: &'a dyn MemberStore,
    leads: &'a dyn LeadStore,
    activities: &'a dyn ActivityStore,
    ancestor_max_hops: u32,
}

impl<'a> AssignmentPersister<'a> {
    pub fn new(
        members: &'a dyn MemberStore,
        leads: &'a dyn LeadStore,
        activities: &'a dyn ActivityStore,
        ancestor_max_hops: u32,
    ) -> Self {
        Self { members, leads, activities, ancestor_max_hops }
    }

    /// Ownership columns for `executive`. The manager is the nearest MANAGER ancestor, falling
    /// back to `participating_manager` and then to the direct parent.
    pub async fn resolve_assignment(
        &self,
        executive: &OrgMember,
        participating_manager: Option<&OrgMember>,
    ) -> Result<LeadAssignment, StoreError> {
        let walker = HierarchyWalker::new(self.members);
        let ancestor =
            walker.ancestor_by_role(executive, &[Role::Manager], self.ancestor_max_hops).await?;
        let assigned_manager = ancestor
            .map(|manager| manager.id)
            .or_else(|| participating_manager.map(|manager| manager.id.clone()))
            .or_else(|| executive.parent_id.clone());

        let (assigned_executive, assigned_field_executive) = match executive.role {
            Role::FieldExecutive => (None, Some(executive.id.clone())),
            _ => (Some(executive.id.clone()), None),
        };

        Ok(LeadAssignment {
            assigned_to: Some(executive.id.clone()),
            assigned_manager,
            assigned_executive,
            assigned_field_executive,
        })
    }

    pub async fn persist_selection(
        &self,
        lead: &Lead,
        selection: &Selection,
        performed_by: Option<&MemberId>,
        at: DateTime<Utc>,
    ) -> Result<LeadAssignment, StoreError> {
        self.write(
            lead,
            &selection.executive,
            selection.manager.as_ref(),
            describe_selection(selection),
            performed_by,
            at,
        )
        .await
    }

    /// Manual override path. Shares the write sequence with automatic assignment.
    pub async fn persist_manual(
        &self,
        lead: &Lead,
        executive: &OrgMember,
        performed_by: Option<&MemberId>,
        at: DateTime<Utc>,
    ) -> Result<LeadAssignment, StoreError> {
        let previous = lead
            .assigned_to()
            .map(|owner| owner.0.as_str())
            .unwrap_or("nobody");
        let action = format!(
            "Manually reassigned from {previous} to {} ({})",
            executive.name, executive.role
        );
        self.write(lead, executive, None, action, performed_by, at).await
    }

    pub async fn record_pending(
        &self,
        lead_id: &LeadId,
        reason: PendingReason,
        performed_by: Option<&MemberId>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let action = format!("Auto assignment pending: {}", reason.describe());
        self.activities
            .append(AssignmentActivity::new(lead_id.clone(), action, performed_by.cloned(), at))
            .await
    }

    async fn write(
        &self,
        lead: &Lead,
        executive: &OrgMember,
        participating_manager: Option<&OrgMember>,
        action: String,
        performed_by: Option<&MemberId>,
        at: DateTime<Utc>,
    ) -> Result<LeadAssignment, StoreError> {
        let assignment = self.resolve_assignment(executive, participating_manager).await?;

        self.leads.update_assignment(&lead.id, &assignment, at).await?;
        debug!(
            event_name = "assignment.persist.lead_updated",
            lead_id = %lead.id,
            assigned_to = %executive.id,
        );

        self.members.record_assignment(&executive.id, at, false).await?;
        if let Some(manager) = participating_manager {
            self.members.record_assignment(&manager.id, at, true).await?;
        }
        debug!(
            event_name = "assignment.persist.members_stamped",
            lead_id = %lead.id,
            executive_id = %executive.id,
            manager_id = participating_manager.map(|manager| manager.id.0.as_str()).unwrap_or(""),
        );

        self.activities
            .append(AssignmentActivity::new(lead.id.clone(), action, performed_by.cloned(), at))
            .await?;
        info!(
            event_name = "assignment.persist.completed",
            lead_id = %lead.id,
            assigned_to = %executive.id,
            assigned_manager = assignment
                .assigned_manager
                .as_ref()
                .map(|manager| manager.0.as_str())
                .unwrap_or(""),
        );

        Ok(assignment)
    }
}

fn describe_selection(selection: &Selection) -> String {
    let executive = &selection.executive;
    let load = selection
        .metrics
        .as_ref()
        .map(|metrics| {
            format!(" [active={}, today={}]", metrics.active_leads, metrics.assigned_today)
        })
        .unwrap_or_default();

    match (selection.mode, selection.manager.as_ref()) {
        (AssignmentMode::SelfAssign, _) => format!(
            "Auto assigned to {} ({}) via SELF: lead created by the assignee",
            executive.name, executive.role
        ),
        (AssignmentMode::LeaderTeam, Some(manager)) => format!(
            "Auto assigned to {} ({}) via LEADER_TEAM within {}'s team{load}",
            executive.name, executive.role, manager.name
        ),
        (AssignmentMode::LeaderHierarchy, Some(manager)) => format!(
            "Auto assigned to {} ({}) via LEADER_HIERARCHY under {}{load}",
            executive.name, executive.role, manager.name
        ),
        (mode, _) => format!(
            "Auto assigned to {} ({}) via {mode}{load}",
            executive.name, executive.role
        ),
    }
}
