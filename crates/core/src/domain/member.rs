use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub String);

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for CompanyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    AssistantManager,
    TeamLeader,
    Executive,
    FieldExecutive,
}

/// Roles that can own leads directly.
pub const LEAF_ROLES: &[Role] = &[Role::Executive, Role::FieldExecutive];

impl Role {
    pub fn is_leaf(self) -> bool {
        LEAF_ROLES.contains(&self)
    }

    pub fn is_management(self) -> bool {
        !self.is_leaf()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Manager => "MANAGER",
            Self::AssistantManager => "ASSISTANT_MANAGER",
            Self::TeamLeader => "TEAM_LEADER",
            Self::Executive => "EXECUTIVE",
            Self::FieldExecutive => "FIELD_EXECUTIVE",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "MANAGER" => Ok(Self::Manager),
            "ASSISTANT_MANAGER" => Ok(Self::AssistantManager),
            "TEAM_LEADER" => Ok(Self::TeamLeader),
            "EXECUTIVE" => Ok(Self::Executive),
            "FIELD_EXECUTIVE" => Ok(Self::FieldExecutive),
            other => Err(DomainError::InvariantViolation(format!("unknown role `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMember {
    pub id: MemberId,
    pub name: String,
    pub role: Role,
    pub parent_id: Option<MemberId>,
    pub company_id: CompanyId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_assigned_at: Option<DateTime<Utc>>,
    /// Incremented whenever this member takes part in an assignment as manager. Not read by
    /// any ranking logic.
    pub last_assigned_index: u64,
}

impl OrgMember {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: Role,
        company_id: CompanyId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MemberId(id.into()),
            name: name.into(),
            role,
            parent_id: None,
            company_id,
            is_active: true,
            created_at,
            last_assigned_at: None,
            last_assigned_index: 0,
        }
    }

    pub fn with_parent(mut self, parent_id: &MemberId) -> Self {
        self.parent_id = Some(parent_id.clone());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn is_active_leaf(&self) -> bool {
        self.is_active && self.role.is_leaf()
    }
}
