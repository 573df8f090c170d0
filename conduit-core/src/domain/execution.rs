//! Execution domain types
//!
//! An [`Execution`] is one run of a pipeline or orchestration and the unit of
//! state handled by the repository layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now_millis;
use super::stage::Stage;
use super::status::{ExecutionStatus, ExecutionType};

/// Execution record
///
/// Structure shared between the orchestration engine (mutates) and the
/// repositories (persist).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub execution_type: ExecutionType,
    pub application: String,
    pub name: Option<String>,
    pub pipeline_config_id: Option<String>,
    pub status: ExecutionStatus,
    pub build_time: Option<i64>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub stages: Vec<Stage>,
    pub paused: Option<PausedDetails>,
    pub canceled: bool,
    pub canceled_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub correlation_id: Option<String>,
    pub partition: Option<String>,
}

/// Who paused or resumed an execution, and when
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausedDetails {
    pub paused_by: Option<String>,
    pub pause_time: Option<i64>,
    pub resumed_by: Option<String>,
    pub resume_time: Option<i64>,
}

impl PausedDetails {
    /// Whether the execution is still paused
    pub fn is_paused(&self) -> bool {
        self.pause_time.is_some() && self.resume_time.is_none()
    }

    /// Time spent paused, once the execution was resumed
    pub fn paused_ms(&self) -> Option<i64> {
        match (self.pause_time, self.resume_time) {
            (Some(paused), Some(resumed)) => Some(resumed - paused),
            _ => None,
        }
    }
}

/// Number of running executions per type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveExecutionsReport {
    pub orchestrations: usize,
    pub pipelines: usize,
}

impl std::ops::Add for ActiveExecutionsReport {
    type Output = ActiveExecutionsReport;

    fn add(self, other: Self) -> Self {
        Self {
            orchestrations: self.orchestrations + other.orchestrations,
            pipelines: self.pipelines + other.pipelines,
        }
    }
}

impl Execution {
    fn new(
        execution_type: ExecutionType,
        application: impl Into<String>,
        pipeline_config_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_type,
            application: application.into(),
            name: None,
            pipeline_config_id,
            status: ExecutionStatus::NotStarted,
            build_time: None,
            start_time: None,
            end_time: None,
            stages: Vec::new(),
            paused: None,
            canceled: false,
            canceled_by: None,
            cancellation_reason: None,
            correlation_id: None,
            partition: None,
        }
    }

    /// Creates a not-yet-started pipeline execution
    pub fn pipeline(application: impl Into<String>, pipeline_config_id: impl Into<String>) -> Self {
        Self::new(
            ExecutionType::Pipeline,
            application,
            Some(pipeline_config_id.into()),
        )
    }

    /// Creates a not-yet-started orchestration
    pub fn orchestration(application: impl Into<String>) -> Self {
        Self::new(ExecutionType::Orchestration, application, None)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_build_time(mut self, build_time: i64) -> Self {
        self.build_time = Some(build_time);
        self
    }

    pub fn with_start_time(mut self, start_time: i64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Creates a stage owned by this execution and appends it
    pub fn add_stage(&mut self, stage_type: impl Into<String>, name: impl Into<String>) -> &Stage {
        let stage = Stage::new(self.execution_type, self.id.clone(), stage_type, name);
        self.stages.push(stage);
        &self.stages[self.stages.len() - 1]
    }

    pub fn stage_by_id(&self, stage_id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    /// Replaces the stage with the same id, or appends it
    pub fn upsert_stage(&mut self, stage: Stage) {
        match self.stages.iter_mut().find(|s| s.id == stage.id) {
            Some(existing) => *existing = stage,
            None => self.stages.push(stage),
        }
    }

    /// Removes a stage, returning whether it was present
    pub fn remove_stage(&mut self, stage_id: &str) -> bool {
        let before = self.stages.len();
        self.stages.retain(|s| s.id != stage_id);
        self.stages.len() != before
    }

    /// Moves the execution to `status`, stamping start and end times
    pub fn update_status(&mut self, status: ExecutionStatus) {
        self.status = status;
        if status == ExecutionStatus::Running && self.start_time.is_none() {
            self.start_time = Some(now_millis());
        } else if status.is_complete() && self.end_time.is_none() {
            self.end_time = Some(now_millis());
        }
    }

    /// Whether the correlation id of this execution is still reserved
    pub fn holds_correlation_id(&self) -> bool {
        self.correlation_id.is_some() && !self.status.is_complete()
    }
}
