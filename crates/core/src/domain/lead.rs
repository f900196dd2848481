use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::member::{CompanyId, MemberId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeadId(pub String);

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Contacted,
    Interested,
    SiteVisit,
    Closed,
    Lost,
}

/// Open statuses; leads in these count toward an owner's workload.
pub const PIPELINE_STATUSES: &[LeadStatus] =
    &[LeadStatus::New, LeadStatus::Contacted, LeadStatus::Interested, LeadStatus::SiteVisit];

pub const CLOSED_STATUSES: &[LeadStatus] = &[LeadStatus::Closed, LeadStatus::Lost];

impl LeadStatus {
    pub fn is_pipeline(self) -> bool {
        PIPELINE_STATUSES.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Contacted => "CONTACTED",
            Self::Interested => "INTERESTED",
            Self::SiteVisit => "SITE_VISIT",
            Self::Closed => "CLOSED",
            Self::Lost => "LOST",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "CONTACTED" => Ok(Self::Contacted),
            "INTERESTED" => Ok(Self::Interested),
            "SITE_VISIT" => Ok(Self::SiteVisit),
            "CLOSED" => Ok(Self::Closed),
            "LOST" => Ok(Self::Lost),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

/// Ownership columns written together whenever a lead changes hands.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadAssignment {
    pub assigned_to: Option<MemberId>,
    pub assigned_manager: Option<MemberId>,
    pub assigned_executive: Option<MemberId>,
    pub assigned_field_executive: Option<MemberId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub company_id: CompanyId,
    pub name: String,
    pub phone: String,
    pub status: LeadStatus,
    pub assignment: LeadAssignment,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<MemberId>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(
        id: impl Into<String>,
        company_id: CompanyId,
        name: impl Into<String>,
        phone: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LeadId(id.into()),
            company_id,
            name: name.into(),
            phone: normalize_phone(&phone.into()),
            status: LeadStatus::New,
            assignment: LeadAssignment::default(),
            created_at,
            created_by: None,
            updated_at: created_at,
        }
    }

    pub fn assigned_to(&self) -> Option<&MemberId> {
        self.assignment.assigned_to.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.status.is_pipeline()
    }
}

/// Strips formatting so `+91 98450-12345` and `+919845012345` compare equal.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|ch| ch.is_ascii_digit() || *ch == '+').collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{normalize_phone, Lead, LeadStatus, PIPELINE_STATUSES};
    use crate::domain::member::CompanyId;

    #[test]
    fn pipeline_subset_excludes_terminal_statuses() {
        assert_eq!(PIPELINE_STATUSES.len(), 4);
        assert!(LeadStatus::SiteVisit.is_pipeline());
        assert!(!LeadStatus::Closed.is_pipeline());
        assert!(!LeadStatus::Lost.is_pipeline());
    }

    #[test]
    fn new_leads_start_unassigned_in_new_status() {
        let lead = Lead::new("L-1", CompanyId("acme".into()), "Asha", "+91 98450-12345", Utc::now());

        assert_eq!(lead.status, LeadStatus::New);
        assert!(lead.assigned_to().is_none());
        assert_eq!(lead.phone, "+919845012345");
    }

    #[test]
    fn phone_normalization_drops_separators() {
        assert_eq!(normalize_phone("(080) 555 0101"), "0805550101");
    }

    #[test]
    fn status_parse_rejects_unknown_values() {
        assert_eq!("site_visit".parse::<LeadStatus>().expect("parse"), LeadStatus::SiteVisit);
        assert!("archived".parse::<LeadStatus>().is_err());
    }
}
