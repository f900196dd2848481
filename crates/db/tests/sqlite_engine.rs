use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use leadflow_core::domain::lead::PIPELINE_STATUSES;
use leadflow_core::ports::{LeadStore, MemberStore};
use leadflow_core::{
    AssignmentConfig, AssignmentEngine, AssignmentMode, CompanyId, FixedClock, LeadId, MemberId,
    NewLead, RebalanceScope,
};
use leadflow_db::fixtures::DEMO_COMPANY_ID;
use leadflow_db::{
    connect_with_settings, migrations, DbPool, DemoOrgDataset, SqlActivityRepository,
    SqlLeadRepository, SqlMemberRepository,
};

struct Harness {
    engine: AssignmentEngine,
    members: Arc<SqlMemberRepository>,
    leads: Arc<SqlLeadRepository>,
}

async fn seeded_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    DemoOrgDataset::load(&pool).await.expect("seed");
    pool
}

fn harness(pool: DbPool) -> Harness {
    let members = Arc::new(SqlMemberRepository::new(pool.clone()));
    let leads = Arc::new(SqlLeadRepository::new(pool.clone()));
    let activities = Arc::new(SqlActivityRepository::new(pool));
    let clock = FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).single().expect("valid"));
    let engine = AssignmentEngine::new(
        members.clone(),
        leads.clone(),
        activities,
        AssignmentConfig::default(),
    )
    .with_clock(Arc::new(clock));
    Harness { engine, members, leads }
}

fn company() -> CompanyId {
    CompanyId(DEMO_COMPANY_ID.to_string())
}

#[tokio::test]
async fn unassigned_demo_lead_goes_to_idle_executive_under_oldest_manager() {
    let harness = harness(seeded_pool().await);
    let lead_id = LeadId("LEAD-008".into());

    let result = harness.engine.auto_assign(&lead_id, None, None).await.expect("assign");

    assert!(result.assigned);
    assert_eq!(result.mode, Some(AssignmentMode::LeaderHierarchy));
    assert_eq!(result.executive, Some(MemberId("EXE-002".into())));
    assert_eq!(result.manager, Some(MemberId("MGR-001".into())));

    let lead = harness.leads.find_lead(&lead_id).await.expect("find").expect("lead");
    assert_eq!(lead.assignment.assigned_executive, Some(MemberId("EXE-002".into())));
    let manager =
        harness.members.find_member(&MemberId("MGR-001".into())).await.expect("find").expect("row");
    assert_eq!(manager.last_assigned_index, 1);

    let activities = harness.engine.activities_for_lead(&lead_id).await.expect("activities");
    assert_eq!(activities.len(), 1);
    assert!(activities[0].action.contains("LEADER_HIERARCHY"));
}

#[tokio::test]
async fn ingest_by_manager_stays_in_team_and_rejects_duplicate_phone() {
    let harness = harness(seeded_pool().await);
    let manager = MemberId("MGR-002".into());

    let created = harness
        .engine
        .ingest_lead(
            NewLead {
                company_id: company(),
                name: "Ravi Kumar".into(),
                phone: "+91 98450 99999".into(),
            },
            Some(&manager),
            Some(&manager),
        )
        .await
        .expect("ingest");
    let duplicate = harness
        .engine
        .ingest_lead(
            NewLead {
                company_id: company(),
                name: "Ravi K".into(),
                phone: "+919845000001".into(),
            },
            None,
            None,
        )
        .await
        .expect("ingest duplicate");

    let assignment = created.assignment.expect("assignment attempted");
    assert_eq!(assignment.mode, Some(AssignmentMode::LeaderTeam));
    assert_eq!(assignment.executive, Some(MemberId("EXE-003".into())));
    assert_eq!(created.lead.created_by, Some(manager));
    assert!(duplicate.duplicate);
    assert_eq!(duplicate.lead.id, LeadId("LEAD-001".into()));
}

#[tokio::test]
async fn field_executive_self_assigns() {
    let harness = harness(seeded_pool().await);
    let field = MemberId("FEX-001".into());

    let result = harness
        .engine
        .auto_assign(&LeadId("LEAD-008".into()), Some(&field), Some(&field))
        .await
        .expect("assign");

    assert_eq!(result.mode, Some(AssignmentMode::SelfAssign));
    let lead =
        harness.leads.find_lead(&LeadId("LEAD-008".into())).await.expect("find").expect("lead");
    assert_eq!(lead.assignment.assigned_field_executive, Some(field));
    assert_eq!(lead.assignment.assigned_manager, Some(MemberId("MGR-001".into())));
}

#[tokio::test]
async fn rebalance_spreads_demo_book_and_drains_inactive_owner() {
    let harness = harness(seeded_pool().await);

    let result = harness.engine.rebalance(&company(), RebalanceScope::All).await.expect("rebalance");

    assert_eq!(result.total_leads, 6);
    assert_eq!(result.executive_count, 5);
    assert_eq!(result.updated, 5);

    let roster: Vec<MemberId> = ["EXE-001", "FEX-001", "EXE-002", "EXE-003", "EXE-004"]
        .into_iter()
        .map(|id| MemberId(id.to_string()))
        .collect();
    let open = harness
        .leads
        .count_leads_by_assignee(&roster, PIPELINE_STATUSES, &company())
        .await
        .expect("open counts");
    let closed = harness
        .leads
        .count_leads_by_assignee(
            &roster,
            leadflow_core::domain::lead::CLOSED_STATUSES,
            &company(),
        )
        .await
        .expect("closed counts");
    let totals: HashMap<&MemberId, u32> = roster
        .iter()
        .map(|id| {
            let total = open.get(id).copied().unwrap_or(0) + closed.get(id).copied().unwrap_or(0);
            (id, total)
        })
        .collect();
    let max = totals.values().copied().max().unwrap_or(0);
    let min = totals.values().copied().min().unwrap_or(0);
    assert!(max - min <= 1, "loads should converge: {totals:?}");

    let drained = harness
        .leads
        .find_lead(&LeadId("LEAD-007".into()))
        .await
        .expect("find")
        .expect("lead");
    assert_ne!(drained.assigned_to(), Some(&MemberId("EXE-005".into())));
}

#[tokio::test]
async fn new_hire_attaches_to_least_loaded_manager() {
    let harness = harness(seeded_pool().await);
    let hire = MemberId("EXE-004".into());

    let manager = harness.engine.attach_to_least_loaded_manager(&hire).await.expect("attach");

    assert_eq!(manager.map(|manager| manager.id), Some(MemberId("MGR-001".into())));
    let stored = harness.members.find_member(&hire).await.expect("find").expect("row");
    assert_eq!(stored.parent_id, Some(MemberId("MGR-001".into())));
}
