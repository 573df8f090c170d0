//! Execution status and type enums

use serde::{Deserialize, Serialize};

/// Kind of execution tracked by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionType {
    /// A run of a configured pipeline
    Pipeline,
    /// A standalone, ad hoc task run
    Orchestration,
}

impl ExecutionType {
    /// Both execution types, pipelines first
    pub const ALL: [ExecutionType; 2] = [ExecutionType::Pipeline, ExecutionType::Orchestration];
}

impl std::fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionType::Pipeline => write!(f, "PIPELINE"),
            ExecutionType::Orchestration => write!(f, "ORCHESTRATION"),
        }
    }
}

/// Lifecycle status shared by executions and stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    NotStarted,
    Running,
    Paused,
    Suspended,
    Succeeded,
    FailedContinue,
    Terminal,
    Canceled,
    Redirect,
    Stopped,
    Skipped,
    Buffered,
}

impl ExecutionStatus {
    /// Whether the status is final for the execution
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded
                | ExecutionStatus::FailedContinue
                | ExecutionStatus::Terminal
                | ExecutionStatus::Canceled
                | ExecutionStatus::Stopped
                | ExecutionStatus::Skipped
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::NotStarted => write!(f, "NOT_STARTED"),
            ExecutionStatus::Running => write!(f, "RUNNING"),
            ExecutionStatus::Paused => write!(f, "PAUSED"),
            ExecutionStatus::Suspended => write!(f, "SUSPENDED"),
            ExecutionStatus::Succeeded => write!(f, "SUCCEEDED"),
            ExecutionStatus::FailedContinue => write!(f, "FAILED_CONTINUE"),
            ExecutionStatus::Terminal => write!(f, "TERMINAL"),
            ExecutionStatus::Canceled => write!(f, "CANCELED"),
            ExecutionStatus::Redirect => write!(f, "REDIRECT"),
            ExecutionStatus::Stopped => write!(f, "STOPPED"),
            ExecutionStatus::Skipped => write!(f, "SKIPPED"),
            ExecutionStatus::Buffered => write!(f, "BUFFERED"),
        }
    }
}
