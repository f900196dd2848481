use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use leadflow_core::domain::activity::{ActivityId, AssignmentActivity};
use leadflow_core::domain::lead::LeadId;
use leadflow_core::domain::member::MemberId;
use leadflow_core::ports::{ActivityStore, StoreError};

use super::{column, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

const INSERT_ACTIVITY: &str =
    "INSERT INTO assignment_activity (id, lead_id, action, performed_by, created_at)
     VALUES (?, ?, ?, ?, ?)";

pub struct SqlActivityRepository {
    pool: DbPool,
}

impl SqlActivityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, activity: &AssignmentActivity) -> Result<(), RepositoryError> {
        sqlx::query(INSERT_ACTIVITY)
            .bind(&activity.id.0)
            .bind(&activity.lead_id.0)
            .bind(&activity.action)
            .bind(activity.performed_by.as_ref().map(|member| member.0.as_str()))
            .bind(encode_timestamp(&activity.at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_batch(&self, activities: &[AssignmentActivity]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for activity in activities {
            sqlx::query(INSERT_ACTIVITY)
                .bind(&activity.id.0)
                .bind(&activity.lead_id.0)
                .bind(&activity.action)
                .bind(activity.performed_by.as_ref().map(|member| member.0.as_str()))
                .bind(encode_timestamp(&activity.at))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<AssignmentActivity>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, lead_id, action, performed_by, created_at
             FROM assignment_activity
             WHERE lead_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_activity).collect()
    }
}

fn row_to_activity(row: &SqliteRow) -> Result<AssignmentActivity, RepositoryError> {
    let created_at: String = column(row, "created_at")?;
    Ok(AssignmentActivity {
        id: ActivityId(column(row, "id")?),
        lead_id: LeadId(column(row, "lead_id")?),
        action: column(row, "action")?,
        performed_by: column::<Option<String>>(row, "performed_by")?.map(MemberId),
        at: decode_timestamp("created_at", &created_at)?,
    })
}

#[async_trait]
impl ActivityStore for SqlActivityRepository {
    async fn append(&self, activity: AssignmentActivity) -> Result<(), StoreError> {
        Ok(self.insert(&activity).await?)
    }

    async fn append_many(&self, activities: Vec<AssignmentActivity>) -> Result<(), StoreError> {
        if activities.is_empty() {
            return Ok(());
        }
        Ok(self.insert_batch(&activities).await?)
    }

    async fn list_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<AssignmentActivity>, StoreError> {
        Ok(self.fetch_for_lead(lead_id).await?)
    }
}
