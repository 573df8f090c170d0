//! Stage domain types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::status::{ExecutionStatus, ExecutionType};

/// Where a synthetic stage sits relative to the stage that spawned it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyntheticStageOwner {
    StageBefore,
    StageAfter,
}

/// A single step of an execution
///
/// Stages are owned by their execution. The owner is referenced by
/// `(execution_type, execution_id)` so a stage can be routed to the right
/// repository without holding the execution itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub execution_id: String,
    pub execution_type: ExecutionType,
    pub ref_id: Option<String>,
    pub stage_type: String,
    pub name: String,
    pub status: ExecutionStatus,
    pub context: Map<String, Value>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub parent_stage_id: Option<String>,
    pub synthetic_stage_owner: Option<SyntheticStageOwner>,
}

impl Stage {
    /// Creates a top-level stage with a fresh id
    pub fn new(
        execution_type: ExecutionType,
        execution_id: impl Into<String>,
        stage_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.into(),
            execution_type,
            ref_id: None,
            stage_type: stage_type.into(),
            name: name.into(),
            status: ExecutionStatus::NotStarted,
            context: Map::new(),
            start_time: None,
            end_time: None,
            parent_stage_id: None,
            synthetic_stage_owner: None,
        }
    }

    /// Creates a synthetic stage attached to `parent`
    pub fn synthetic(
        parent: &Stage,
        owner: SyntheticStageOwner,
        stage_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let mut stage = Self::new(
            parent.execution_type,
            parent.execution_id.clone(),
            stage_type,
            name,
        );
        stage.parent_stage_id = Some(parent.id.clone());
        stage.synthetic_stage_owner = Some(owner);
        stage
    }

    /// Whether the stage may be inserted into a running execution ad hoc
    pub fn is_synthetic(&self) -> bool {
        self.synthetic_stage_owner.is_some() && self.parent_stage_id.is_some()
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}
