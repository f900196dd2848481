use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::local_day_window;
use crate::domain::lead::PIPELINE_STATUSES;
use crate::domain::member::{CompanyId, MemberId, OrgMember};
use crate::ports::{LeadStore, StoreError};
use crate::ranking::Candidate;

/// Open workload dominates; same-day intake only separates otherwise equal candidates.
pub const ACTIVE_LEAD_WEIGHT: u64 = 100;
pub const ASSIGNED_TODAY_WEIGHT: u64 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadMetrics {
    pub member_id: MemberId,
    pub active_leads: u32,
    pub assigned_today: u32,
    pub score: u64,
    pub at_capacity: bool,
}

impl LoadMetrics {
    pub fn new(
        member_id: MemberId,
        active_leads: u32,
        assigned_today: u32,
        max_active_leads: u32,
    ) -> Self {
        let score = u64::from(active_leads) * ACTIVE_LEAD_WEIGHT
            + u64::from(assigned_today) * ASSIGNED_TODAY_WEIGHT;
        Self {
            member_id,
            active_leads,
            assigned_today,
            score,
            at_capacity: active_leads >= max_active_leads,
        }
    }
}

pub struct MetricsCollector<'a> {
    leads: &'a dyn LeadStore,
    max_active_leads: u32,
}

impl<'a> MetricsCollector<'a> {
    pub fn new(leads: &'a dyn LeadStore, max_active_leads: u32) -> Self {
        Self { leads, max_active_leads }
    }

    /// Attaches load metrics to every member using two batched counts.
    pub async fn collect(
        &self,
        members: Vec<OrgMember>,
        company_id: &CompanyId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Candidate>, StoreError> {
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<MemberId> = members.iter().map(|member| member.id.clone()).collect();
        let active =
            self.leads.count_leads_by_assignee(&ids, PIPELINE_STATUSES, company_id).await?;
        let (day_start, day_end) = local_day_window(now);
        let today = self
            .leads
            .count_created_between_by_assignee(&ids, company_id, day_start, day_end)
            .await?;

        Ok(members
            .into_iter()
            .map(|member| {
                let metrics = LoadMetrics::new(
                    member.id.clone(),
                    active.get(&member.id).copied().unwrap_or(0),
                    today.get(&member.id).copied().unwrap_or(0),
                    self.max_active_leads,
                );
                Candidate { member, metrics }
            })
            .collect())
    }
}
