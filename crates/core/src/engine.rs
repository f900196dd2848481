//! Request-scoped entry points tying strategy, persistence and rebalancing together.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::AssignmentConfig;
use crate::domain::activity::AssignmentActivity;
use crate::domain::lead::{normalize_phone, Lead, LeadId, LeadStatus};
use crate::domain::member::{CompanyId, MemberId, OrgMember};
use crate::errors::{ApplicationError, DomainError};
use crate::hierarchy::{least_loaded_manager, HierarchyWalker};
use crate::metrics::LoadMetrics;
use crate::persister::AssignmentPersister;
use crate::ports::{ActivityStore, LeadStore, MemberStore};
use crate::rebalance::{RebalanceResult, RebalanceScope, Rebalancer};
use crate::strategy::{AssignmentMode, Decision, PendingReason, StrategySelector};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub lead_id: LeadId,
    pub assigned: bool,
    pub mode: Option<AssignmentMode>,
    pub executive: Option<MemberId>,
    pub manager: Option<MemberId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<PendingReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<LoadMetrics>,
}

impl AssignmentResult {
    fn pending(lead_id: LeadId, reason: PendingReason) -> Self {
        Self {
            lead_id,
            assigned: false,
            mode: None,
            executive: None,
            manager: None,
            reason: Some(reason),
            metrics: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLead {
    pub company_id: CompanyId,
    pub name: String,
    pub phone: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub lead: Lead,
    /// Set when a lead with the same phone already existed; nothing was written.
    pub duplicate: bool,
    pub assignment: Option<AssignmentResult>,
}

pub struct AssignmentEngine {
    members: Arc<dyn MemberStore>,
    leads: Arc<dyn LeadStore>,
    activities: Arc<dyn ActivityStore>,
    config: AssignmentConfig,
    clock: Arc<dyn Clock>,
}

impl AssignmentEngine {
    pub fn new(
        members: Arc<dyn MemberStore>,
        leads: Arc<dyn LeadStore>,
        activities: Arc<dyn ActivityStore>,
        config: AssignmentConfig,
    ) -> Self {
        Self { members, leads, activities, config, clock: Arc::new(SystemClock) }
    }

    /// Builds an engine over a single store that implements every port.
    pub fn from_store<S>(store: Arc<S>, config: AssignmentConfig) -> Self
    where
        S: MemberStore + LeadStore + ActivityStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store, config)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> AssignmentConfig {
        self.config
    }

    fn persister(&self) -> AssignmentPersister<'_> {
        AssignmentPersister::new(
            self.members.as_ref(),
            self.leads.as_ref(),
            self.activities.as_ref(),
            self.config.ancestor_max_hops,
        )
    }

    pub async fn auto_assign(
        &self,
        lead_id: &LeadId,
        requester: Option<&MemberId>,
        performed_by: Option<&MemberId>,
    ) -> Result<AssignmentResult, ApplicationError> {
        let lead = self.require_lead(lead_id).await?;
        let requester = match requester {
            Some(id) => Some(self.require_member(id).await?),
            None => None,
        };
        let now = self.clock.now();

        let selector =
            StrategySelector::new(self.members.as_ref(), self.leads.as_ref(), self.config);
        let persister = self.persister();

        match selector.decide(requester.as_ref(), &lead.company_id, now).await? {
            Decision::Assign(selection) => {
                let assignment =
                    persister.persist_selection(&lead, &selection, performed_by, now).await?;
                info!(
                    event_name = "assignment.auto.completed",
                    lead_id = %lead.id,
                    company_id = %lead.company_id,
                    mode = %selection.mode,
                    executive_id = %selection.executive.id,
                );
                Ok(AssignmentResult {
                    lead_id: lead.id,
                    assigned: true,
                    mode: Some(selection.mode),
                    executive: Some(selection.executive.id),
                    manager: assignment.assigned_manager,
                    reason: None,
                    metrics: selection.metrics,
                })
            }
            Decision::Pending(reason) => {
                persister.record_pending(&lead.id, reason, performed_by, now).await?;
                warn!(
                    event_name = "assignment.auto.pending",
                    lead_id = %lead.id,
                    company_id = %lead.company_id,
                    reason = reason.as_str(),
                );
                Ok(AssignmentResult::pending(lead.id, reason))
            }
        }
    }

    pub async fn rebalance(
        &self,
        company_id: &CompanyId,
        scope: RebalanceScope,
    ) -> Result<RebalanceResult, ApplicationError> {
        let rebalancer = Rebalancer::new(
            self.members.as_ref(),
            self.leads.as_ref(),
            self.activities.as_ref(),
            self.config.ancestor_max_hops,
        );
        Ok(rebalancer.rebalance(company_id, &scope, None, self.clock.now()).await?)
    }

    /// Creates a lead unless one with the same phone already exists in the company, then runs
    /// automatic assignment on it.
    pub async fn ingest_lead(
        &self,
        new_lead: NewLead,
        requester: Option<&MemberId>,
        performed_by: Option<&MemberId>,
    ) -> Result<IngestOutcome, ApplicationError> {
        let phone = normalize_phone(&new_lead.phone);
        if phone.is_empty() {
            return Err(DomainError::InvariantViolation("lead phone is required".to_owned()).into());
        }

        if let Some(existing) = self.leads.find_lead_by_phone(&new_lead.company_id, &phone).await? {
            info!(
                event_name = "lead.ingest.duplicate",
                lead_id = %existing.id,
                company_id = %existing.company_id,
            );
            return Ok(IngestOutcome { lead: existing, duplicate: true, assignment: None });
        }

        let mut lead = Lead::new(
            Uuid::new_v4().to_string(),
            new_lead.company_id,
            new_lead.name,
            phone,
            self.clock.now(),
        );
        lead.created_by = requester.cloned();
        self.leads.save_lead(lead.clone()).await?;
        info!(event_name = "lead.ingest.created", lead_id = %lead.id, company_id = %lead.company_id);

        let assignment = self.auto_assign(&lead.id, requester, performed_by).await?;
        let lead = self.require_lead(&lead.id).await?;
        Ok(IngestOutcome { lead, duplicate: false, assignment: Some(assignment) })
    }

    /// Operator override. Capacity is not checked.
    pub async fn reassign(
        &self,
        lead_id: &LeadId,
        executive_id: &MemberId,
        performed_by: Option<&MemberId>,
    ) -> Result<Lead, ApplicationError> {
        let lead = self.require_lead(lead_id).await?;
        let executive = self.require_member(executive_id).await?;
        if executive.company_id != lead.company_id {
            return Err(invalid_assignee(&executive, "belongs to another company"));
        }
        if !executive.is_active_leaf() {
            return Err(invalid_assignee(&executive, "is not an active executive"));
        }

        self.persister().persist_manual(&lead, &executive, performed_by, self.clock.now()).await?;
        info!(
            event_name = "assignment.manual.completed",
            lead_id = %lead.id,
            executive_id = %executive.id,
        );
        self.require_lead(lead_id).await
    }

    /// Moves a lead to `status`. Ownership is kept when the lead closes.
    pub async fn update_status(
        &self,
        lead_id: &LeadId,
        status: LeadStatus,
    ) -> Result<Lead, ApplicationError> {
        let lead = self.require_lead(lead_id).await?;
        self.leads.update_status(&lead.id, status, self.clock.now()).await?;
        info!(
            event_name = "lead.status.updated",
            lead_id = %lead.id,
            from = lead.status.as_str(),
            to = status.as_str(),
        );
        self.require_lead(lead_id).await
    }

    /// Gives a parentless executive the manager with the fewest active reports. Returns the
    /// chosen manager, or `None` when the member already reports to someone or no manager exists.
    pub async fn attach_to_least_loaded_manager(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<OrgMember>, ApplicationError> {
        let member = self.require_member(member_id).await?;
        if !member.is_active_leaf() {
            return Err(invalid_assignee(&member, "only active executives are attached to a manager"));
        }
        if member.parent_id.is_some() {
            return Ok(None);
        }

        let walker = HierarchyWalker::new(self.members.as_ref());
        let Some(manager) = least_loaded_manager(&walker, &member.company_id).await? else {
            warn!(
                event_name = "hierarchy.attach.no_manager",
                member_id = %member.id,
                company_id = %member.company_id,
            );
            return Ok(None);
        };

        self.members.set_parent(&member.id, Some(&manager.id)).await?;
        info!(
            event_name = "hierarchy.attach.completed",
            member_id = %member.id,
            manager_id = %manager.id,
        );
        Ok(Some(manager))
    }

    pub async fn activities_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<AssignmentActivity>, ApplicationError> {
        let lead = self.require_lead(lead_id).await?;
        let mut activities = self.activities.list_for_lead(&lead.id).await?;
        activities.sort_by(|left, right| left.at.cmp(&right.at));
        Ok(activities)
    }

    async fn require_lead(&self, lead_id: &LeadId) -> Result<Lead, ApplicationError> {
        self.leads
            .find_lead(lead_id)
            .await?
            .ok_or_else(|| DomainError::UnknownLead(lead_id.clone()).into())
    }

    async fn require_member(&self, member_id: &MemberId) -> Result<OrgMember, ApplicationError> {
        self.members
            .find_member(member_id)
            .await?
            .ok_or_else(|| DomainError::UnknownMember(member_id.clone()).into())
    }
}

fn invalid_assignee(member: &OrgMember, reason: &str) -> ApplicationError {
    DomainError::InvalidAssignee { member_id: member.id.clone(), reason: reason.to_owned() }.into()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{AssignmentEngine, NewLead};
    use crate::clock::FixedClock;
    use crate::config::AssignmentConfig;
    use crate::domain::lead::{Lead, LeadId, LeadStatus};
    use crate::domain::member::{CompanyId, MemberId, OrgMember, Role};
    use crate::errors::{ApplicationError, DomainError};
    use crate::memory::InMemoryOrgStore;
    use crate::ports::MemberStore;
    use crate::rebalance::RebalanceScope;
    use crate::strategy::{AssignmentMode, PendingReason};

    fn company() -> CompanyId {
        CompanyId("acme".to_string())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 12, 12, 0, 0).single().expect("valid timestamp")
    }

    fn member(id: &str, role: Role, minutes: i64) -> OrgMember {
        OrgMember::new(id, id, role, company(), now() - Duration::days(30) + Duration::minutes(minutes))
    }

    async fn engine_with(
        members: Vec<OrgMember>,
        config: AssignmentConfig,
    ) -> (Arc<InMemoryOrgStore>, AssignmentEngine) {
        let store = Arc::new(InMemoryOrgStore::with_members(members).await);
        let engine = AssignmentEngine::from_store(store.clone(), config)
            .with_clock(Arc::new(FixedClock(now())));
        (store, engine)
    }

    async fn book(store: &InMemoryOrgStore, owner: &MemberId, count: usize) {
        let leads = (0..count).map(|index| {
            let mut lead = Lead::new(
                format!("{}-open-{index}", owner.0),
                company(),
                "Existing",
                format!("555{}{index}", owner.0),
                now() - Duration::days(7),
            );
            lead.assignment.assigned_to = Some(owner.clone());
            lead
        });
        store.insert_leads(leads).await;
    }

    async fn fresh_lead(store: &InMemoryOrgStore) -> LeadId {
        let lead = Lead::new("L-new", company(), "Prospect", "+91 98450 12345", now());
        let id = lead.id.clone();
        store.insert_leads([lead]).await;
        id
    }

    #[tokio::test]
    async fn least_loaded_executive_wins_via_global_fallback_without_managers() {
        let executives =
            vec![member("E1", Role::Executive, 0), member("E2", Role::Executive, 1), member("E3", Role::Executive, 2)];
        let (store, engine) = engine_with(executives, AssignmentConfig::default()).await;
        book(&store, &MemberId("E1".into()), 5).await;
        book(&store, &MemberId("E2".into()), 2).await;
        book(&store, &MemberId("E3".into()), 8).await;
        let lead_id = fresh_lead(&store).await;

        let result = engine.auto_assign(&lead_id, None, None).await.expect("assign");

        assert!(result.assigned);
        assert_eq!(result.mode, Some(AssignmentMode::GlobalFallback));
        assert_eq!(result.executive, Some(MemberId("E2".into())));
        assert_eq!(result.metrics.map(|metrics| metrics.score), Some(200));
    }

    #[tokio::test]
    async fn least_loaded_executive_wins_via_hierarchy_under_a_manager() {
        let manager = member("M", Role::Manager, 0);
        let executives = vec![
            manager.clone(),
            member("E1", Role::Executive, 1).with_parent(&manager.id),
            member("E2", Role::Executive, 2).with_parent(&manager.id),
            member("E3", Role::Executive, 3).with_parent(&manager.id),
        ];
        let (store, engine) = engine_with(executives, AssignmentConfig::default()).await;
        book(&store, &MemberId("E1".into()), 5).await;
        book(&store, &MemberId("E2".into()), 2).await;
        book(&store, &MemberId("E3".into()), 8).await;
        let lead_id = fresh_lead(&store).await;

        let result = engine.auto_assign(&lead_id, None, None).await.expect("assign");

        assert_eq!(result.mode, Some(AssignmentMode::LeaderHierarchy));
        assert_eq!(result.executive, Some(MemberId("E2".into())));
        assert_eq!(result.manager, Some(manager.id.clone()));
        let stamped = store.find_member(&manager.id).await.expect("find").expect("manager");
        assert_eq!(stamped.last_assigned_index, 1);
        assert_eq!(stamped.last_assigned_at, Some(now()));
    }

    #[tokio::test]
    async fn manager_created_lead_stays_in_team() {
        let manager = member("M", Role::Manager, 0);
        let members = vec![
            manager.clone(),
            member("E1", Role::Executive, 1).with_parent(&manager.id),
            member("E2", Role::Executive, 2).with_parent(&manager.id),
            member("E0", Role::Executive, 3),
        ];
        let (store, engine) = engine_with(members, AssignmentConfig::default()).await;
        book(&store, &MemberId("E1".into()), 3).await;
        book(&store, &MemberId("E2".into()), 1).await;
        let lead_id = fresh_lead(&store).await;

        let result =
            engine.auto_assign(&lead_id, Some(&manager.id), Some(&manager.id)).await.expect("assign");

        assert_eq!(result.mode, Some(AssignmentMode::LeaderTeam));
        assert_eq!(result.executive, Some(MemberId("E2".into())));
    }

    #[tokio::test]
    async fn field_executive_keeps_own_lead_above_capacity() {
        let field = member("F1", Role::FieldExecutive, 0);
        let config =
            AssignmentConfig { max_active_leads_per_executive: 3, ..AssignmentConfig::default() };
        let (store, engine) =
            engine_with(vec![field.clone(), member("E1", Role::Executive, 1)], config).await;
        book(&store, &field.id, 5).await;
        let lead_id = fresh_lead(&store).await;

        let result =
            engine.auto_assign(&lead_id, Some(&field.id), Some(&field.id)).await.expect("assign");

        assert_eq!(result.mode, Some(AssignmentMode::SelfAssign));
        assert_eq!(result.executive, Some(field.id.clone()));
        let lead = store.all_leads().await.into_iter().find(|lead| lead.id == lead_id).expect("lead");
        assert_eq!(lead.assignment.assigned_field_executive, Some(field.id));
        assert_eq!(lead.assignment.assigned_executive, None);
    }

    #[tokio::test]
    async fn empty_roster_leaves_lead_pending_with_one_activity() {
        let (store, engine) =
            engine_with(vec![member("M", Role::Manager, 0)], AssignmentConfig::default()).await;
        let lead_id = fresh_lead(&store).await;

        let result = engine.auto_assign(&lead_id, None, None).await.expect("assign");

        assert!(!result.assigned);
        assert_eq!(result.reason, Some(PendingReason::NoActiveExecutive));
        let payload = serde_json::to_value(&result).expect("serialize");
        assert_eq!(payload["reason"], "NO_ACTIVE_EXECUTIVE");
        assert_eq!(payload["assigned"], false);

        let activities = engine.activities_for_lead(&lead_id).await.expect("activities");
        assert_eq!(activities.len(), 1);
        assert!(activities[0].action.starts_with("Auto assignment pending:"));
    }

    #[tokio::test]
    async fn unknown_lead_and_requester_are_hard_errors() {
        let (store, engine) =
            engine_with(vec![member("E1", Role::Executive, 0)], AssignmentConfig::default()).await;
        let lead_id = fresh_lead(&store).await;

        let missing_lead =
            engine.auto_assign(&LeadId("nope".into()), None, None).await.expect_err("missing lead");
        let missing_requester = engine
            .auto_assign(&lead_id, Some(&MemberId("ghost".into())), None)
            .await
            .expect_err("missing requester");

        assert_eq!(missing_lead.error_class(), "not_found");
        assert!(matches!(
            missing_requester,
            ApplicationError::Domain(DomainError::UnknownMember(_))
        ));
        assert!(store.all_activities().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_phone_returns_existing_lead() {
        let (store, engine) =
            engine_with(vec![member("E1", Role::Executive, 0)], AssignmentConfig::default()).await;
        let first = engine
            .ingest_lead(
                NewLead {
                    company_id: company(),
                    name: "Asha".into(),
                    phone: "+91 98450-12345".into(),
                },
                None,
                None,
            )
            .await
            .expect("ingest");
        let second = engine
            .ingest_lead(
                NewLead { company_id: company(), name: "Asha K".into(), phone: "+919845012345".into() },
                None,
                None,
            )
            .await
            .expect("ingest");

        assert!(!first.duplicate);
        assert_eq!(first.lead.assigned_to(), Some(&MemberId("E1".into())));
        assert!(second.duplicate);
        assert!(second.assignment.is_none());
        assert_eq!(second.lead.id, first.lead.id);
        assert_eq!(store.all_leads().await.len(), 1);
    }

    #[tokio::test]
    async fn manual_reassignment_skips_capacity_but_checks_target() {
        let config =
            AssignmentConfig { max_active_leads_per_executive: 1, ..AssignmentConfig::default() };
        let busy = member("E1", Role::Executive, 0);
        let manager = member("M", Role::Manager, 1);
        let (store, engine) = engine_with(vec![busy.clone(), manager.clone()], config).await;
        book(&store, &busy.id, 4).await;
        let lead_id = fresh_lead(&store).await;

        let lead = engine.reassign(&lead_id, &busy.id, Some(&manager.id)).await.expect("reassign");
        let rejected = engine.reassign(&lead_id, &manager.id, None).await.expect_err("manager");

        assert_eq!(lead.assigned_to(), Some(&busy.id));
        assert_eq!(rejected.error_class(), "domain_validation");
        let activities = engine.activities_for_lead(&lead_id).await.expect("activities");
        assert_eq!(activities.len(), 1);
        assert!(activities[0].action.starts_with("Manually reassigned"));
    }

    #[tokio::test]
    async fn closing_a_lead_keeps_its_owner_and_frees_capacity() {
        let config =
            AssignmentConfig { max_active_leads_per_executive: 1, ..AssignmentConfig::default() };
        let executive = member("E1", Role::Executive, 0);
        let (store, engine) = engine_with(vec![executive.clone()], config).await;
        book(&store, &executive.id, 1).await;
        let lead_id = fresh_lead(&store).await;

        let blocked = engine.auto_assign(&lead_id, None, None).await.expect("assign");
        assert_eq!(blocked.reason, Some(PendingReason::ExecutiveCapacityReached));

        let closed = engine
            .update_status(&LeadId("E1-open-0".into()), LeadStatus::Closed)
            .await
            .expect("close");
        assert_eq!(closed.assigned_to(), Some(&executive.id));

        let retried = engine.auto_assign(&lead_id, None, None).await.expect("assign");
        assert_eq!(retried.executive, Some(executive.id));
    }

    #[tokio::test]
    async fn new_executive_attaches_to_manager_with_fewest_reports() {
        let busy = member("M-busy", Role::Manager, 0);
        let idle = member("M-idle", Role::Manager, 1);
        let hire = member("E-new", Role::Executive, 5);
        let (store, engine) = engine_with(
            vec![
                busy.clone(),
                idle.clone(),
                member("E1", Role::Executive, 2).with_parent(&busy.id),
                hire.clone(),
            ],
            AssignmentConfig::default(),
        )
        .await;

        let attached = engine.attach_to_least_loaded_manager(&hire.id).await.expect("attach");
        let again = engine.attach_to_least_loaded_manager(&hire.id).await.expect("attach");

        assert_eq!(attached.map(|manager| manager.id), Some(idle.id.clone()));
        assert!(again.is_none());
        let stored = store.find_member(&hire.id).await.expect("find").expect("hire");
        assert_eq!(stored.parent_id, Some(idle.id));
    }

    #[tokio::test]
    async fn rebalance_entry_point_reports_counts() {
        let (store, engine) = engine_with(
            vec![member("E1", Role::Executive, 0), member("E2", Role::Executive, 1)],
            AssignmentConfig::default(),
        )
        .await;
        book(&store, &MemberId("E1".into()), 4).await;

        let result = engine.rebalance(&company(), RebalanceScope::All).await.expect("rebalance");

        assert_eq!((result.updated, result.total_leads, result.executive_count), (2, 4, 2));
    }
}
