use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Sqlite};

use leadflow_core::domain::member::{CompanyId, MemberId, OrgMember, Role};
use leadflow_core::ports::{MemberStore, StoreError};

use super::{column, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

const MEMBER_COLUMNS: &str = "id, company_id, name, role, parent_id, is_active, created_at, \
                              last_assigned_at, last_assigned_index";

pub struct SqlMemberRepository {
    pool: DbPool,
}

impl SqlMemberRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_ids(&self, ids: &[MemberId]) -> Result<Vec<OrgMember>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {MEMBER_COLUMNS} FROM org_member WHERE id IN ("));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.0.as_str());
        }
        separated.push_unseparated(")");
        builder.push(" ORDER BY created_at ASC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_member).collect()
    }

    async fn fetch_children(
        &self,
        parent_ids: &[MemberId],
        company_id: &CompanyId,
        include_inactive: bool,
    ) -> Result<Vec<OrgMember>, RepositoryError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MEMBER_COLUMNS} FROM org_member WHERE company_id = "
        ));
        builder.push_bind(company_id.0.as_str());
        if !include_inactive {
            builder.push(" AND is_active = 1");
        }
        builder.push(" AND parent_id IN (");
        let mut separated = builder.separated(", ");
        for parent_id in parent_ids {
            separated.push_bind(parent_id.0.as_str());
        }
        separated.push_unseparated(")");
        builder.push(" ORDER BY created_at ASC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_member).collect()
    }

    async fn fetch_by_roles(
        &self,
        company_id: &CompanyId,
        roles: &[Role],
        active_only: bool,
    ) -> Result<Vec<OrgMember>, RepositoryError> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MEMBER_COLUMNS} FROM org_member WHERE company_id = "
        ));
        builder.push_bind(company_id.0.as_str());
        if active_only {
            builder.push(" AND is_active = 1");
        }
        builder.push(" AND role IN (");
        let mut separated = builder.separated(", ");
        for role in roles {
            separated.push_bind(role.as_str());
        }
        separated.push_unseparated(")");
        builder.push(" ORDER BY created_at ASC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_member).collect()
    }

    async fn upsert(&self, member: &OrgMember) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO org_member (id, company_id, name, role, parent_id, is_active, created_at,
                                     last_assigned_at, last_assigned_index)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 company_id = excluded.company_id,
                 name = excluded.name,
                 role = excluded.role,
                 parent_id = excluded.parent_id,
                 is_active = excluded.is_active,
                 last_assigned_at = excluded.last_assigned_at,
                 last_assigned_index = excluded.last_assigned_index",
        )
        .bind(&member.id.0)
        .bind(&member.company_id.0)
        .bind(&member.name)
        .bind(member.role.as_str())
        .bind(member.parent_id.as_ref().map(|parent| parent.0.as_str()))
        .bind(member.is_active)
        .bind(encode_timestamp(&member.created_at))
        .bind(member.last_assigned_at.as_ref().map(encode_timestamp))
        .bind(i64::try_from(member.last_assigned_index).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn stamp(
        &self,
        id: &MemberId,
        at: DateTime<Utc>,
        bump_index: bool,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE org_member
             SET last_assigned_at = ?, last_assigned_index = last_assigned_index + ?
             WHERE id = ?",
        )
        .bind(encode_timestamp(&at))
        .bind(i64::from(bump_index))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.0.clone()));
        }
        Ok(())
    }

    async fn reparent(
        &self,
        id: &MemberId,
        parent_id: Option<&MemberId>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE org_member SET parent_id = ? WHERE id = ?")
            .bind(parent_id.map(|parent| parent.0.as_str()))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.0.clone()));
        }
        Ok(())
    }
}

fn row_to_member(row: &SqliteRow) -> Result<OrgMember, RepositoryError> {
    let role: String = column(row, "role")?;
    let created_at: String = column(row, "created_at")?;
    let last_assigned_at: Option<String> = column(row, "last_assigned_at")?;
    let last_assigned_index: i64 = column(row, "last_assigned_index")?;
    let is_active: i64 = column(row, "is_active")?;

    Ok(OrgMember {
        id: MemberId(column(row, "id")?),
        name: column(row, "name")?,
        role: role.parse().map_err(|error| RepositoryError::Decode(format!("role: {error}")))?,
        parent_id: column::<Option<String>>(row, "parent_id")?.map(MemberId),
        company_id: CompanyId(column(row, "company_id")?),
        is_active: is_active != 0,
        created_at: decode_timestamp("created_at", &created_at)?,
        last_assigned_at: last_assigned_at
            .as_deref()
            .map(|raw| decode_timestamp("last_assigned_at", raw))
            .transpose()?,
        last_assigned_index: u64::try_from(last_assigned_index).map_err(|error| {
            RepositoryError::Decode(format!("last_assigned_index: {error}"))
        })?,
    })
}

#[async_trait]
impl MemberStore for SqlMemberRepository {
    async fn find_member(&self, id: &MemberId) -> Result<Option<OrgMember>, StoreError> {
        let row = sqlx::query(&format!("SELECT {MEMBER_COLUMNS} FROM org_member WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.as_ref().map(row_to_member).transpose()?)
    }

    async fn find_members(&self, ids: &[MemberId]) -> Result<Vec<OrgMember>, StoreError> {
        Ok(self.fetch_by_ids(ids).await?)
    }

    async fn find_children(
        &self,
        parent_ids: &[MemberId],
        company_id: &CompanyId,
        include_inactive: bool,
    ) -> Result<Vec<OrgMember>, StoreError> {
        Ok(self.fetch_children(parent_ids, company_id, include_inactive).await?)
    }

    async fn list_members(
        &self,
        company_id: &CompanyId,
        roles: &[Role],
        active_only: bool,
    ) -> Result<Vec<OrgMember>, StoreError> {
        Ok(self.fetch_by_roles(company_id, roles, active_only).await?)
    }

    async fn save_member(&self, member: OrgMember) -> Result<(), StoreError> {
        Ok(self.upsert(&member).await?)
    }

    async fn record_assignment(
        &self,
        id: &MemberId,
        at: DateTime<Utc>,
        bump_index: bool,
    ) -> Result<(), StoreError> {
        Ok(self.stamp(id, at, bump_index).await?)
    }

    async fn set_parent(
        &self,
        id: &MemberId,
        parent_id: Option<&MemberId>,
    ) -> Result<(), StoreError> {
        Ok(self.reparent(id, parent_id).await?)
    }
}
