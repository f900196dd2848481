pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod hierarchy;
pub mod memory;
pub mod metrics;
pub mod persister;
pub mod ports;
pub mod ranking;
pub mod rebalance;
pub mod strategy;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, AssignmentConfig, ConfigOverrides, LoadOptions};
pub use domain::activity::{ActivityId, AssignmentActivity};
pub use domain::lead::{Lead, LeadAssignment, LeadId, LeadStatus};
pub use domain::member::{CompanyId, MemberId, OrgMember, Role};
pub use engine::{AssignmentEngine, AssignmentResult, IngestOutcome, NewLead};
pub use errors::{ApplicationError, DomainError};
pub use hierarchy::HierarchyWalker;
pub use memory::InMemoryOrgStore;
pub use metrics::LoadMetrics;
pub use ports::{ActivityStore, LeadReassignment, LeadStore, MemberStore, StoreError};
pub use ranking::Candidate;
pub use rebalance::{RebalanceResult, RebalanceScope};
pub use strategy::{AssignmentMode, PendingReason, Selection};
