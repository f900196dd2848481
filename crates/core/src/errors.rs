use thiserror::Error;

use crate::domain::lead::LeadId;
use crate::domain::member::MemberId;
use crate::ports::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("lead `{0}` does not exist")]
    UnknownLead(LeadId),
    #[error("member `{0}` does not exist")]
    UnknownMember(MemberId),
    #[error("member `{member_id}` cannot own leads: {reason}")]
    InvalidAssignee { member_id: MemberId, reason: String },
    #[error("unknown lead status `{0}`")]
    InvalidStatus(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl ApplicationError {
    /// Stable machine-readable class used in operator payloads.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::UnknownLead(_))
            | Self::Domain(DomainError::UnknownMember(_)) => "not_found",
            Self::Domain(_) => "domain_validation",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "configuration",
        }
    }
}
