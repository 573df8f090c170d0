//! Core domain types
//!
//! This module contains the structures tracked by the execution repositories.
//! They are shared between the orchestration engine (which mutates them) and
//! every repository backend (which persists them).

pub mod criteria;
pub mod execution;
pub mod stage;
pub mod status;

pub use criteria::{DEFAULT_PAGE_SIZE, ExecutionComparator, ExecutionCriteria};
pub use execution::{ActiveExecutionsReport, Execution, PausedDetails};
pub use stage::{Stage, SyntheticStageOwner};
pub use status::{ExecutionStatus, ExecutionType};

/// Current wall clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
