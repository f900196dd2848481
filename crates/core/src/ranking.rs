use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::member::{MemberId, OrgMember};
use crate::metrics::LoadMetrics;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub member: OrgMember,
    pub metrics: LoadMetrics,
}

/// `(score, active_leads, last_assigned_at, created_at, id)`. `None` for `last_assigned_at`
/// sorts first, so a member who never received a lead wins a tie.
pub type RankKey<'a> = (u64, u32, Option<DateTime<Utc>>, DateTime<Utc>, &'a MemberId);

impl Candidate {
    pub fn rank_key(&self) -> RankKey<'_> {
        (
            self.metrics.score,
            self.metrics.active_leads,
            self.member.last_assigned_at,
            self.member.created_at,
            &self.member.id,
        )
    }
}

/// Strict total order: ids are unique, so two distinct candidates never compare equal.
pub fn compare_candidates(left: &Candidate, right: &Candidate) -> Ordering {
    left.rank_key().cmp(&right.rank_key())
}

/// Drops candidates at capacity and sorts the rest best-first.
pub fn rank_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> =
        candidates.into_iter().filter(|candidate| !candidate.metrics.at_capacity).collect();
    ranked.sort_by(compare_candidates);
    ranked
}
