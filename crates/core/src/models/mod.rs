pub mod agent;
pub mod job;
pub mod log_entry;
pub mod progress;
pub mod report;
pub mod retry_policy;
pub mod work_item;

pub use agent::{
    AgentDescriptor, AgentKind, AgentRegistry, AgentSchema, FieldSpec, FieldType,
    InvocationConstraints, NARRATIVE_FIELD,
};
pub use job::{Job, JobStatus, JobSummary};
pub use log_entry::{LogEntry, LogLevel};
pub use progress::ProgressSnapshot;
pub use report::AnalysisReport;
pub use retry_policy::RetryPolicy;
pub use work_item::{ItemError, ItemOutcome, ItemResult, WorkItem, WorkItemRef, WorkItemStatus};
