use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

pub const DEMO_COMPANY_ID: &str = "acme-realty";

/// `(member id, role, parent id, active)` for every seeded member.
const SEED_MEMBERS: &[(&str, &str, Option<&str>, bool)] = &[
    ("ADM-001", "ADMIN", None, true),
    ("MGR-001", "MANAGER", Some("ADM-001"), true),
    ("MGR-002", "MANAGER", Some("ADM-001"), true),
    ("TL-001", "TEAM_LEADER", Some("MGR-001"), true),
    ("EXE-001", "EXECUTIVE", Some("TL-001"), true),
    ("FEX-001", "FIELD_EXECUTIVE", Some("TL-001"), true),
    ("EXE-002", "EXECUTIVE", Some("MGR-001"), true),
    ("EXE-003", "EXECUTIVE", Some("MGR-002"), true),
    ("EXE-004", "EXECUTIVE", None, true),
    ("EXE-005", "EXECUTIVE", Some("MGR-002"), false),
];

/// `(lead id, status)` for every seeded lead.
const SEED_LEADS: &[(&str, &str)] = &[
    ("LEAD-001", "CONTACTED"),
    ("LEAD-002", "INTERESTED"),
    ("LEAD-003", "SITE_VISIT"),
    ("LEAD-004", "NEW"),
    ("LEAD-005", "CLOSED"),
    ("LEAD-006", "LOST"),
    ("LEAD-007", "NEW"),
    ("LEAD-008", "NEW"),
];

/// Demo organisation used by `leadflow seed` and the integration tests.
///
/// Covers every role, a nested team leader, an inactive executive who still owns an open lead, a
/// parentless new hire and one unassigned lead.
pub struct DemoOrgDataset;

impl DemoOrgDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_org.sql");

    /// Inserts the dataset. Rows that already exist are left as they are.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            company_id: DEMO_COMPANY_ID,
            members_seeded: SEED_MEMBERS.len(),
            leads_seeded: SEED_LEADS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(SEED_MEMBERS.len() + SEED_LEADS.len());

        for &(id, role, parent_id, active) in SEED_MEMBERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM org_member
                               WHERE id = ?1 AND company_id = ?2 AND role = ?3
                                 AND parent_id IS ?4 AND is_active = ?5)",
            )
            .bind(id)
            .bind(DEMO_COMPANY_ID)
            .bind(role)
            .bind(parent_id)
            .bind(active)
            .fetch_one(pool)
            .await?;
            checks.push((id, present == 1));
        }

        for &(id, status) in SEED_LEADS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM lead WHERE id = ?1 AND company_id = ?2)",
            )
            .bind(id)
            .bind(DEMO_COMPANY_ID)
            .fetch_one(pool)
            .await?;
            checks.push((id, present == 1));

            if matches!(status, "CLOSED" | "LOST") {
                let unchanged: i64 = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM lead WHERE id = ?1 AND status = ?2)",
                )
                .bind(id)
                .bind(status)
                .fetch_one(pool)
                .await?;
                checks.push(("terminal-status", unchanged == 1));
            }
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the dataset, including activity rows written against it.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::query(
            "DELETE FROM assignment_activity
             WHERE lead_id IN (SELECT id FROM lead WHERE company_id = ?)",
        )
        .bind(DEMO_COMPANY_ID)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM lead WHERE company_id = ?")
            .bind(DEMO_COMPANY_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM org_member WHERE company_id = ?")
            .bind(DEMO_COMPANY_ID)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub company_id: &'static str,
    pub members_seeded: usize,
    pub leads_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
