use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::lead::LeadId;
use crate::domain::member::MemberId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub String);

/// Append-only audit row explaining why a lead ended up where it is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentActivity {
    pub id: ActivityId,
    pub lead_id: LeadId,
    pub action: String,
    pub performed_by: Option<MemberId>,
    pub at: DateTime<Utc>,
}

impl AssignmentActivity {
    pub fn new(
        lead_id: LeadId,
        action: impl Into<String>,
        performed_by: Option<MemberId>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActivityId(Uuid::new_v4().to_string()),
            lead_id,
            action: action.into(),
            performed_by,
            at,
        }
    }
}
