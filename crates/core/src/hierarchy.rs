//! Reporting-chain traversal.
//!
//! Members are only ever reached through their ids and every walk carries its own visited set,
//! so a corrupted `parent_id` chain (including a cycle) cannot make a walk revisit a member or
//! run past its configured bound.

use std::collections::{HashMap, HashSet};

use crate::domain::member::{CompanyId, MemberId, OrgMember, Role, LEAF_ROLES};
use crate::ports::{MemberStore, StoreError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentLoad {
    pub member: OrgMember,
    pub child_count: u32,
}

pub struct HierarchyWalker<'a> {
    members: &'a dyn MemberStore,
}

impl<'a> HierarchyWalker<'a> {
    pub fn new(members: &'a dyn MemberStore) -> Self {
        Self { members }
    }

    /// Breadth-first list of everyone below `root_id`, at most `max_depth` levels deep.
    pub async fn descendants(
        &self,
        root_id: &MemberId,
        company_id: &CompanyId,
        max_depth: u32,
        include_inactive: bool,
    ) -> Result<Vec<OrgMember>, StoreError> {
        let mut visited: HashSet<MemberId> = HashSet::from([root_id.clone()]);
        let mut frontier = vec![root_id.clone()];
        let mut collected = Vec::new();
        let mut depth = 0;

        while !frontier.is_empty() && depth < max_depth {
            let children =
                self.members.find_children(&frontier, company_id, include_inactive).await?;
            frontier = Vec::with_capacity(children.len());

            for child in children {
                if !visited.insert(child.id.clone()) {
                    continue;
                }
                frontier.push(child.id.clone());
                collected.push(child);
            }
            depth += 1;
        }

        Ok(collected)
    }

    /// Active leaf members anywhere under `root_id`. Inactive intermediate leaders are walked
    /// through so their reports stay reachable.
    pub async fn descendant_executive_ids(
        &self,
        root_id: &MemberId,
        company_id: &CompanyId,
        max_depth: u32,
    ) -> Result<HashSet<MemberId>, StoreError> {
        let descendants = self.descendants(root_id, company_id, max_depth, true).await?;
        Ok(descendants
            .into_iter()
            .filter(OrgMember::is_active_leaf)
            .map(|member| member.id)
            .collect())
    }

    /// First ancestor of `member` whose role is in `target_roles`.
    pub async fn ancestor_by_role(
        &self,
        member: &OrgMember,
        target_roles: &[Role],
        max_hops: u32,
    ) -> Result<Option<OrgMember>, StoreError> {
        let mut visited: HashSet<MemberId> = HashSet::from([member.id.clone()]);
        let mut next = member.parent_id.clone();
        let mut hops = 0;

        while let Some(parent_id) = next {
            if hops >= max_hops || !visited.insert(parent_id.clone()) {
                break;
            }
            hops += 1;

            let Some(parent) = self.members.find_member(&parent_id).await? else {
                break;
            };
            if parent.company_id != member.company_id {
                break;
            }
            if target_roles.contains(&parent.role) {
                return Ok(Some(parent));
            }
            next = parent.parent_id;
        }

        Ok(None)
    }

    /// Active `parent_role` members ordered by how many active `child_roles` reports they have,
    /// then by `created_at`, then by id.
    pub async fn least_loaded_parent_by_role(
        &self,
        parent_role: Role,
        child_roles: &[Role],
        company_id: &CompanyId,
    ) -> Result<Vec<ParentLoad>, StoreError> {
        let parents = self.members.list_members(company_id, &[parent_role], true).await?;
        if parents.is_empty() {
            return Ok(Vec::new());
        }

        let parent_ids: Vec<MemberId> = parents.iter().map(|parent| parent.id.clone()).collect();
        let children = self.members.find_children(&parent_ids, company_id, false).await?;

        let mut counts: HashMap<MemberId, u32> = HashMap::new();
        for child in children.iter().filter(|child| child_roles.contains(&child.role)) {
            if let Some(parent_id) = &child.parent_id {
                *counts.entry(parent_id.clone()).or_insert(0) += 1;
            }
        }

        let mut loads: Vec<ParentLoad> = parents
            .into_iter()
            .map(|member| {
                let child_count = counts.get(&member.id).copied().unwrap_or(0);
                ParentLoad { member, child_count }
            })
            .collect();
        loads.sort_by(|left, right| {
            left.child_count
                .cmp(&right.child_count)
                .then_with(|| left.member.created_at.cmp(&right.member.created_at))
                .then_with(|| left.member.id.cmp(&right.member.id))
        });

        Ok(loads)
    }
}

/// Convenience for callers that only need the default leaf filter.
pub async fn least_loaded_manager(
    walker: &HierarchyWalker<'_>,
    company_id: &CompanyId,
) -> Result<Option<OrgMember>, StoreError> {
    let loads = walker.least_loaded_parent_by_role(Role::Manager, LEAF_ROLES, company_id).await?;
    Ok(loads.into_iter().next().map(|load| load.member))
}
