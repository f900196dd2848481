use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Sqlite};

use leadflow_core::domain::lead::{Lead, LeadAssignment, LeadId, LeadStatus};
use leadflow_core::domain::member::{CompanyId, MemberId};
use leadflow_core::ports::{LeadReassignment, LeadStore, StoreError};

use super::{column, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

const LEAD_COLUMNS: &str = "id, company_id, name, phone, status, assigned_to, assigned_manager, \
                            assigned_executive, assigned_field_executive, created_by, created_at, \
                            updated_at";

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_one(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM lead WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_lead).transpose()
    }

    async fn fetch_by_phone(
        &self,
        company_id: &CompanyId,
        phone: &str,
    ) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM lead WHERE company_id = ? AND phone = ?
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .bind(&company_id.0)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_lead).transpose()
    }

    async fn upsert(&self, lead: &Lead) -> Result<(), RepositoryError> {
        let assignment = &lead.assignment;
        sqlx::query(
            "INSERT INTO lead (id, company_id, name, phone, status, assigned_to, assigned_manager,
                               assigned_executive, assigned_field_executive, created_by,
                               created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 phone = excluded.phone,
                 status = excluded.status,
                 assigned_to = excluded.assigned_to,
                 assigned_manager = excluded.assigned_manager,
                 assigned_executive = excluded.assigned_executive,
                 assigned_field_executive = excluded.assigned_field_executive,
                 updated_at = excluded.updated_at",
        )
        .bind(&lead.id.0)
        .bind(&lead.company_id.0)
        .bind(&lead.name)
        .bind(&lead.phone)
        .bind(lead.status.as_str())
        .bind(id_text(&assignment.assigned_to))
        .bind(id_text(&assignment.assigned_manager))
        .bind(id_text(&assignment.assigned_executive))
        .bind(id_text(&assignment.assigned_field_executive))
        .bind(id_text(&lead.created_by))
        .bind(encode_timestamp(&lead.created_at))
        .bind(encode_timestamp(&lead.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_by_assignee(
        &self,
        assignee_ids: &[MemberId],
        company_id: &CompanyId,
        statuses: Option<&[LeadStatus]>,
        created_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<HashMap<MemberId, u32>, RepositoryError> {
        if assignee_ids.is_empty() || statuses.is_some_and(|statuses| statuses.is_empty()) {
            return Ok(HashMap::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT assigned_to, COUNT(1) AS lead_count FROM lead WHERE company_id = ",
        );
        builder.push_bind(company_id.0.as_str());

        builder.push(" AND assigned_to IN (");
        let mut separated = builder.separated(", ");
        for id in assignee_ids {
            separated.push_bind(id.0.as_str());
        }
        separated.push_unseparated(")");

        if let Some(statuses) = statuses {
            builder.push(" AND status IN (");
            let mut separated = builder.separated(", ");
            for status in statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }

        if let Some((start, end)) = created_window {
            builder.push(" AND created_at >= ");
            builder.push_bind(encode_timestamp(&start));
            builder.push(" AND created_at < ");
            builder.push_bind(encode_timestamp(&end));
        }
        builder.push(" GROUP BY assigned_to");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut counts = HashMap::with_capacity(rows.len());
        for row in &rows {
            let assignee: String = column(row, "assigned_to")?;
            let count: i64 = column(row, "lead_count")?;
            let count = u32::try_from(count)
                .map_err(|error| RepositoryError::Decode(format!("lead_count: {error}")))?;
            counts.insert(MemberId(assignee), count);
        }
        Ok(counts)
    }

    async fn fetch_by_status(
        &self,
        company_id: &CompanyId,
        statuses: &[LeadStatus],
    ) -> Result<Vec<Lead>, RepositoryError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {LEAD_COLUMNS} FROM lead WHERE company_id = "
        ));
        builder.push_bind(company_id.0.as_str());
        builder.push(" AND status IN (");
        let mut separated = builder.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(")");
        builder.push(" ORDER BY created_at ASC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_lead).collect()
    }

    async fn write_assignment(
        &self,
        lead_id: &LeadId,
        assignment: &LeadAssignment,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE lead
             SET assigned_to = ?, assigned_manager = ?, assigned_executive = ?,
                 assigned_field_executive = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(id_text(&assignment.assigned_to))
        .bind(id_text(&assignment.assigned_manager))
        .bind(id_text(&assignment.assigned_executive))
        .bind(id_text(&assignment.assigned_field_executive))
        .bind(encode_timestamp(&at))
        .bind(&lead_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(lead_id.0.clone()));
        }
        Ok(())
    }

    async fn write_status(
        &self,
        lead_id: &LeadId,
        status: LeadStatus,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE lead SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(encode_timestamp(&at))
            .bind(&lead_id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(lead_id.0.clone()));
        }
        Ok(())
    }

    /// One transaction for the whole batch. `IS` keeps the owner guard NULL-safe.
    async fn write_reassignments(
        &self,
        changes: &[LeadReassignment],
        at: DateTime<Utc>,
    ) -> Result<Vec<LeadId>, RepositoryError> {
        let updated_at = encode_timestamp(&at);
        let mut tx = self.pool.begin().await?;
        let mut applied = Vec::new();

        for change in changes {
            let assignment = &change.assignment;
            let result = sqlx::query(
                "UPDATE lead
                 SET assigned_to = ?, assigned_manager = ?, assigned_executive = ?,
                     assigned_field_executive = ?, updated_at = ?
                 WHERE id = ? AND assigned_to IS ?",
            )
            .bind(id_text(&assignment.assigned_to))
            .bind(id_text(&assignment.assigned_manager))
            .bind(id_text(&assignment.assigned_executive))
            .bind(id_text(&assignment.assigned_field_executive))
            .bind(&updated_at)
            .bind(&change.lead_id.0)
            .bind(id_text(&change.previous))
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() > 0 {
                applied.push(change.lead_id.clone());
            }
        }

        tx.commit().await?;
        Ok(applied)
    }
}

fn id_text(id: &Option<MemberId>) -> Option<&str> {
    id.as_ref().map(|id| id.0.as_str())
}

fn row_to_lead(row: &SqliteRow) -> Result<Lead, RepositoryError> {
    let status: String = column(row, "status")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;
    let member = |name: &str| -> Result<Option<MemberId>, RepositoryError> {
        Ok(column::<Option<String>>(row, name)?.map(MemberId))
    };

    Ok(Lead {
        id: LeadId(column(row, "id")?),
        company_id: CompanyId(column(row, "company_id")?),
        name: column(row, "name")?,
        phone: column(row, "phone")?,
        status: status
            .parse()
            .map_err(|error| RepositoryError::Decode(format!("status: {error}")))?,
        assignment: LeadAssignment {
            assigned_to: member("assigned_to")?,
            assigned_manager: member("assigned_manager")?,
            assigned_executive: member("assigned_executive")?,
            assigned_field_executive: member("assigned_field_executive")?,
        },
        created_at: decode_timestamp("created_at", &created_at)?,
        created_by: member("created_by")?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait]
impl LeadStore for SqlLeadRepository {
    async fn find_lead(&self, id: &LeadId) -> Result<Option<Lead>, StoreError> {
        Ok(self.fetch_one(id).await?)
    }

    async fn find_lead_by_phone(
        &self,
        company_id: &CompanyId,
        phone: &str,
    ) -> Result<Option<Lead>, StoreError> {
        Ok(self.fetch_by_phone(company_id, phone).await?)
    }

    async fn save_lead(&self, lead: Lead) -> Result<(), StoreError> {
        Ok(self.upsert(&lead).await?)
    }

    async fn count_leads_by_assignee(
        &self,
        assignee_ids: &[MemberId],
        statuses: &[LeadStatus],
        company_id: &CompanyId,
    ) -> Result<HashMap<MemberId, u32>, StoreError> {
        Ok(self.count_by_assignee(assignee_ids, company_id, Some(statuses), None).await?)
    }

    async fn count_created_between_by_assignee(
        &self,
        assignee_ids: &[MemberId],
        company_id: &CompanyId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<MemberId, u32>, StoreError> {
        Ok(self.count_by_assignee(assignee_ids, company_id, None, Some((start, end))).await?)
    }

    async fn list_leads_by_status(
        &self,
        company_id: &CompanyId,
        statuses: &[LeadStatus],
    ) -> Result<Vec<Lead>, StoreError> {
        Ok(self.fetch_by_status(company_id, statuses).await?)
    }

    async fn update_assignment(
        &self,
        lead_id: &LeadId,
        assignment: &LeadAssignment,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(self.write_assignment(lead_id, assignment, at).await?)
    }

    async fn update_status(
        &self,
        lead_id: &LeadId,
        status: LeadStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(self.write_status(lead_id, status, at).await?)
    }

    async fn apply_reassignments(
        &self,
        changes: &[LeadReassignment],
        at: DateTime<Utc>,
    ) -> Result<Vec<LeadId>, StoreError> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.write_reassignments(changes, at).await?)
    }
}
