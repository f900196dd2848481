//! Assignment mode selection.
//!
//! Modes are tried in a fixed order. `SELF` short-circuits before any metrics are read; the
//! three ranked modes share one capacity-filtered candidate list.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AssignmentConfig;
use crate::domain::member::{CompanyId, MemberId, OrgMember, LEAF_ROLES};
use crate::hierarchy::HierarchyWalker;
use crate::metrics::{LoadMetrics, MetricsCollector};
use crate::ports::{LeadStore, MemberStore, StoreError};
use crate::ranking::{rank_candidates, Candidate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentMode {
    #[serde(rename = "SELF")]
    SelfAssign,
    #[serde(rename = "LEADER_TEAM")]
    LeaderTeam,
    #[serde(rename = "LEADER_HIERARCHY")]
    LeaderHierarchy,
    #[serde(rename = "GLOBAL_FALLBACK")]
    GlobalFallback,
}

impl AssignmentMode {
    /// Modes that choose among ranked candidates, in the order they are attempted.
    pub const RANKED_SEQUENCE: [AssignmentMode; 3] =
        [Self::LeaderTeam, Self::LeaderHierarchy, Self::GlobalFallback];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelfAssign => "SELF",
            Self::LeaderTeam => "LEADER_TEAM",
            Self::LeaderHierarchy => "LEADER_HIERARCHY",
            Self::GlobalFallback => "GLOBAL_FALLBACK",
        }
    }
}

impl std::fmt::Display for AssignmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingReason {
    NoActiveExecutive,
    ExecutiveCapacityReached,
}

impl PendingReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoActiveExecutive => "NO_ACTIVE_EXECUTIVE",
            Self::ExecutiveCapacityReached => "EXECUTIVE_CAPACITY_REACHED",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::NoActiveExecutive => "no active executive in company",
            Self::ExecutiveCapacityReached => "every executive is at capacity",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub mode: AssignmentMode,
    pub executive: OrgMember,
    pub manager: Option<OrgMember>,
    pub metrics: Option<LoadMetrics>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Assign(Selection),
    Pending(PendingReason),
}

pub struct StrategySelector<'a> {
    members: &'a dyn MemberStore,
    collector: MetricsCollector<'a>,
    config: AssignmentConfig,
}

impl<'a> StrategySelector<'a> {
    pub fn new(
        members: &'a dyn MemberStore,
        leads: &'a dyn LeadStore,
        config: AssignmentConfig,
    ) -> Self {
        Self {
            members,
            collector: MetricsCollector::new(leads, config.max_active_leads_per_executive),
            config,
        }
    }

    pub async fn decide(
        &self,
        requester: Option<&OrgMember>,
        company_id: &CompanyId,
        now: DateTime<Utc>,
    ) -> Result<Decision, StoreError> {
        let requester = requester.filter(|member| &member.company_id == company_id);
        if let Some(selection) = self_assign(requester) {
            return Ok(Decision::Assign(selection));
        }

        let roster = self.members.list_members(company_id, LEAF_ROLES, true).await?;
        if roster.is_empty() {
            return Ok(Decision::Pending(PendingReason::NoActiveExecutive));
        }

        let candidates = self.collector.collect(roster, company_id, now).await?;
        let ranked = rank_candidates(candidates);
        if ranked.is_empty() {
            return Ok(Decision::Pending(PendingReason::ExecutiveCapacityReached));
        }

        for mode in AssignmentMode::RANKED_SEQUENCE {
            if let Some(selection) = self.select(mode, requester, &ranked, company_id).await? {
                return Ok(Decision::Assign(selection));
            }
        }

        Ok(Decision::Pending(PendingReason::ExecutiveCapacityReached))
    }

    /// Runs the handler for a single mode against an already ranked candidate list.
    pub async fn select(
        &self,
        mode: AssignmentMode,
        requester: Option<&OrgMember>,
        ranked: &[Candidate],
        company_id: &CompanyId,
    ) -> Result<Option<Selection>, StoreError> {
        match mode {
            AssignmentMode::SelfAssign => Ok(self_assign(requester)),
            AssignmentMode::LeaderTeam => self.leader_team(requester, ranked, company_id).await,
            AssignmentMode::LeaderHierarchy => self.leader_hierarchy(ranked, company_id).await,
            AssignmentMode::GlobalFallback => Ok(global_fallback(ranked)),
        }
    }

    async fn leader_team(
        &self,
        requester: Option<&OrgMember>,
        ranked: &[Candidate],
        company_id: &CompanyId,
    ) -> Result<Option<Selection>, StoreError> {
        let Some(leader) = requester.filter(|member| member.role.is_management()) else {
            return Ok(None);
        };

        let walker = HierarchyWalker::new(self.members);
        let team = walker
            .descendant_executive_ids(&leader.id, company_id, self.config.hierarchy_max_depth)
            .await?;

        Ok(ranked.iter().find(|candidate| team.contains(&candidate.member.id)).map(|candidate| {
            Selection {
                mode: AssignmentMode::LeaderTeam,
                executive: candidate.member.clone(),
                manager: Some(leader.clone()),
                metrics: Some(candidate.metrics.clone()),
            }
        }))
    }

    async fn leader_hierarchy(
        &self,
        ranked: &[Candidate],
        company_id: &CompanyId,
    ) -> Result<Option<Selection>, StoreError> {
        let mut seen = HashSet::new();
        let parent_ids: Vec<MemberId> = ranked
            .iter()
            .filter_map(|candidate| candidate.member.parent_id.clone())
            .filter(|parent_id| seen.insert(parent_id.clone()))
            .collect();
        if parent_ids.is_empty() {
            return Ok(None);
        }

        let managers: HashMap<MemberId, OrgMember> = self
            .members
            .find_members(&parent_ids)
            .await?
            .into_iter()
            .filter(|member| {
                member.is_active
                    && member.role.is_management()
                    && &member.company_id == company_id
            })
            .map(|member| (member.id.clone(), member))
            .collect();

        // `ranked` is best-first, so the first candidate seen per manager is that team's top.
        let mut pairs: Vec<(&OrgMember, &Candidate)> = Vec::new();
        let mut grouped = HashSet::new();
        for candidate in ranked {
            let Some(manager) =
                candidate.member.parent_id.as_ref().and_then(|parent| managers.get(parent))
            else {
                continue;
            };
            if grouped.insert(manager.id.clone()) {
                pairs.push((manager, candidate));
            }
        }

        pairs.sort_by(|(left_manager, left), (right_manager, right)| {
            left.metrics
                .score
                .cmp(&right.metrics.score)
                .then_with(|| left.metrics.active_leads.cmp(&right.metrics.active_leads))
                .then_with(|| left_manager.last_assigned_at.cmp(&right_manager.last_assigned_at))
                .then_with(|| left_manager.created_at.cmp(&right_manager.created_at))
                .then_with(|| left_manager.id.cmp(&right_manager.id))
        });

        Ok(pairs.into_iter().next().map(|(manager, candidate)| Selection {
            mode: AssignmentMode::LeaderHierarchy,
            executive: candidate.member.clone(),
            manager: Some(manager.clone()),
            metrics: Some(candidate.metrics.clone()),
        }))
    }
}

/// An active leaf requester always keeps their own lead, regardless of load.
fn self_assign(requester: Option<&OrgMember>) -> Option<Selection> {
    requester.filter(|member| member.is_active_leaf()).map(|member| Selection {
        mode: AssignmentMode::SelfAssign,
        executive: member.clone(),
        manager: None,
        metrics: None,
    })
}

fn global_fallback(ranked: &[Candidate]) -> Option<Selection> {
    ranked.first().map(|candidate| Selection {
        mode: AssignmentMode::GlobalFallback,
        executive: candidate.member.clone(),
        manager: None,
        metrics: Some(candidate.metrics.clone()),
    })
}
