//! Repository Module
//!
//! The execution repository contract and its implementations.
//!
//! Every backend implements [`ExecutionRepository`]. Callers (the
//! orchestration engine) only ever hold an `Arc<dyn ExecutionRepository>` and
//! cannot tell whether they talk to a single store or to a
//! [`DualExecutionRepository`] migrating between two.

mod dual;
mod memory;

pub use dual::DualExecutionRepository;
pub use memory::InMemoryExecutionRepository;

use async_trait::async_trait;
use conduit_core::domain::{
    ActiveExecutionsReport, Execution, ExecutionComparator, ExecutionCriteria, ExecutionStatus,
    ExecutionType, Stage,
};
use std::collections::HashSet;

use crate::error::Result;

/// Lazy, finite sequence of executions returned by enumeration queries
///
/// Each call produces a fresh stream; iterate it again by issuing the query
/// again.
pub type ExecutionStream = Box<dyn Iterator<Item = Execution> + Send>;

/// Storage contract for pipeline and orchestration executions
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    // -------------------------------------------------------------------------
    // Single execution
    // -------------------------------------------------------------------------

    /// Inserts or fully replaces an execution
    async fn store(&self, execution: &Execution) -> Result<()>;

    /// Fetches an execution, failing with `ExecutionNotFound` if absent
    async fn retrieve(&self, execution_type: ExecutionType, id: &str) -> Result<Execution>;

    /// Deletes an execution. Deleting an unknown id is not an error.
    async fn delete(&self, execution_type: ExecutionType, id: &str) -> Result<()>;

    /// Deletes several executions. Unknown ids are ignored.
    async fn delete_all(&self, execution_type: ExecutionType, ids: &[String]) -> Result<()>;

    /// Checks whether an execution with this id is stored
    async fn has_execution(&self, execution_type: ExecutionType, id: &str) -> Result<bool>;

    // -------------------------------------------------------------------------
    // Stages
    // -------------------------------------------------------------------------

    /// Replaces the stage in its owning execution, appending it if new
    async fn store_stage(&self, stage: &Stage) -> Result<()>;

    /// Persists the stage's context and fields into its owning execution
    async fn update_stage_context(&self, stage: &Stage) -> Result<()>;

    /// Inserts a synthetic stage into its owning execution
    ///
    /// Fails with `SyntheticStageRequired` for regular stages.
    async fn add_stage(&self, stage: &Stage) -> Result<()>;

    /// Drops a stage from the execution and persists the result
    async fn remove_stage(&self, execution: &Execution, stage_id: &str) -> Result<()>;

    // -------------------------------------------------------------------------
    // Lifecycle transitions
    // -------------------------------------------------------------------------

    /// Moves an execution to `CANCELED` from any status
    ///
    /// # Arguments
    /// * `user` - Who canceled the execution, recorded when present
    /// * `reason` - Free-form reason, recorded when present and non-empty
    async fn cancel(
        &self,
        execution_type: ExecutionType,
        id: &str,
        user: Option<&str>,
        reason: Option<&str>,
    ) -> Result<()>;

    /// Moves a `RUNNING` execution to `PAUSED`
    async fn pause(&self, execution_type: ExecutionType, id: &str, user: Option<&str>)
    -> Result<()>;

    /// Moves a `PAUSED` execution back to `RUNNING`
    ///
    /// `ignore_current_status` forces the transition from any status.
    async fn resume(
        &self,
        execution_type: ExecutionType,
        id: &str,
        user: Option<&str>,
        ignore_current_status: bool,
    ) -> Result<()>;

    /// Sets the status, stamping start time on `RUNNING` and end time on a
    /// complete status
    async fn update_status(
        &self,
        execution_type: ExecutionType,
        id: &str,
        status: ExecutionStatus,
    ) -> Result<()>;

    /// Whether the execution was canceled or has status `CANCELED`
    async fn is_canceled(&self, execution_type: ExecutionType, id: &str) -> Result<bool>;

    // -------------------------------------------------------------------------
    // Streams
    // -------------------------------------------------------------------------

    /// Every execution of one type
    async fn retrieve_all(&self, execution_type: ExecutionType) -> Result<ExecutionStream>;

    /// Executions of one type passing the criteria filters, one page
    ///
    /// Sorted by `criteria.sort_type`, newest id first when unset.
    async fn retrieve_by_criteria(
        &self,
        execution_type: ExecutionType,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream>;

    /// Every pipeline execution of an application
    async fn retrieve_pipelines_for_application(&self, application: &str)
    -> Result<ExecutionStream>;

    /// Newest executions of a pipeline config, at most `criteria.page_size`
    async fn retrieve_pipelines_for_pipeline_config_id(
        &self,
        pipeline_config_id: &str,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream>;

    /// Orchestrations of an application passing the criteria, newest id first
    async fn retrieve_orchestrations_for_application(
        &self,
        application: &str,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream>;

    // -------------------------------------------------------------------------
    // Lists
    // -------------------------------------------------------------------------

    /// Orchestrations of an application sorted by `sorter` (newest id first
    /// when `None`), one page
    ///
    /// # Arguments
    /// * `application` - Owning application name
    /// * `criteria` - Status and start time filters plus the page to return
    /// * `sorter` - Order applied before paginating
    async fn retrieve_sorted_orchestrations_for_application(
        &self,
        application: &str,
        criteria: &ExecutionCriteria,
        sorter: Option<ExecutionComparator>,
    ) -> Result<Vec<Execution>>;

    /// Buffered executions of both types
    async fn retrieve_buffered_executions(&self) -> Result<Vec<Execution>>;

    /// Applications with at least one execution of `execution_type`, or of
    /// any type when `None`
    async fn retrieve_all_application_names(
        &self,
        execution_type: Option<ExecutionType>,
    ) -> Result<Vec<String>>;

    /// Applications with at least `min_executions` executions of a single
    /// type (`execution_type`, or either type when `None`)
    async fn retrieve_application_names_with_min_executions(
        &self,
        execution_type: Option<ExecutionType>,
        min_executions: usize,
    ) -> Result<Vec<String>>;

    /// Ids of every execution of one type
    async fn retrieve_all_execution_ids(&self, execution_type: ExecutionType)
    -> Result<Vec<String>>;

    /// Distinct pipeline config ids with at least one execution in the
    /// application
    async fn retrieve_pipeline_config_ids_for_application(
        &self,
        application: &str,
    ) -> Result<Vec<String>>;

    /// For each config id, the ids of its most recent `criteria.page_size`
    /// executions that pass the status filter
    async fn retrieve_and_filter_pipeline_execution_ids_for_application(
        &self,
        application: &str,
        pipeline_config_ids: &[String],
        criteria: &ExecutionCriteria,
    ) -> Result<Vec<String>>;

    /// Full pipeline executions of an application for the given ids
    ///
    /// # Arguments
    /// * `application` - Owning application name
    /// * `execution_ids` - Ids to load, typically from
    ///   [`Self::retrieve_and_filter_pipeline_execution_ids_for_application`]
    /// * `query_timeout_seconds` - Upper bound for backends that run a query
    async fn retrieve_pipeline_execution_details_for_application(
        &self,
        application: &str,
        execution_ids: &[String],
        query_timeout_seconds: u64,
    ) -> Result<Vec<Execution>>;

    /// One page of pipelines whose build time lies strictly between the two
    /// boundaries
    async fn retrieve_pipelines_for_pipeline_config_ids_between_build_time_boundary(
        &self,
        pipeline_config_ids: &[String],
        build_time_start: i64,
        build_time_end: i64,
        criteria: &ExecutionCriteria,
    ) -> Result<Vec<Execution>>;

    /// Every page of [`Self::retrieve_pipelines_for_pipeline_config_ids_between_build_time_boundary`]
    ///
    /// Requests pages 1, 2, ... until one comes back shorter than
    /// `criteria.page_size`. A page size of 0 means no limit, so a single
    /// request returns everything.
    async fn retrieve_all_pipelines_for_pipeline_config_ids_between_build_time_boundary(
        &self,
        pipeline_config_ids: &[String],
        build_time_start: i64,
        build_time_end: i64,
        criteria: &ExecutionCriteria,
    ) -> Result<Vec<Execution>> {
        let page_size = criteria.page_size;
        let mut executions = Vec::new();
        let mut page = 1;

        loop {
            let results = self
                .retrieve_pipelines_for_pipeline_config_ids_between_build_time_boundary(
                    pipeline_config_ids,
                    build_time_start,
                    build_time_end,
                    &criteria.clone().with_page(page),
                )
                .await?;
            let more = page_size > 0 && results.len() >= page_size;
            executions.extend(results);

            if !more {
                break;
            }
            page += 1;
        }

        Ok(executions)
    }

    /// Number of `RUNNING` executions per type
    async fn count_active_executions(&self) -> Result<ActiveExecutionsReport>;

    // -------------------------------------------------------------------------
    // Correlation ids
    // -------------------------------------------------------------------------

    /// Resolves the active execution registered under `correlation_id`
    ///
    /// Fails with `ExecutionNotFound` when the id is unmapped, when its
    /// execution was deleted, or when that execution is complete.
    async fn retrieve_by_correlation_id(
        &self,
        execution_type: ExecutionType,
        correlation_id: &str,
    ) -> Result<Execution>;

    /// Pipeline registered under `correlation_id`
    async fn retrieve_pipeline_for_correlation_id(&self, correlation_id: &str) -> Result<Execution> {
        self.retrieve_by_correlation_id(ExecutionType::Pipeline, correlation_id)
            .await
    }

    /// Orchestration registered under `correlation_id`
    async fn retrieve_orchestration_for_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Execution> {
        self.retrieve_by_correlation_id(ExecutionType::Orchestration, correlation_id)
            .await
    }
}

// =============================================================================
// Stream helpers
// =============================================================================

/// Iterator adapter yielding the first execution seen for each id
pub struct DistinctById<I> {
    inner: I,
    seen: HashSet<String>,
}

impl<I: Iterator<Item = Execution>> DistinctById<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            seen: HashSet::new(),
        }
    }
}

impl<I: Iterator<Item = Execution>> Iterator for DistinctById<I> {
    type Item = Execution;

    fn next(&mut self) -> Option<Execution> {
        loop {
            let execution = self.inner.next()?;
            if self.seen.insert(execution.id.clone()) {
                return Some(execution);
            }
        }
    }
}

/// Chains two streams and drops repeated execution ids
pub fn merge_distinct(first: ExecutionStream, second: ExecutionStream) -> ExecutionStream {
    Box::new(DistinctById::new(first.chain(second)))
}

/// Concatenates two lists keeping the first execution seen for each id
pub fn merge_distinct_vec(first: Vec<Execution>, second: Vec<Execution>) -> Vec<Execution> {
    DistinctById::new(first.into_iter().chain(second)).collect()
}

/// Concatenates two lists of strings and removes repeats, keeping order
pub fn merge_distinct_strings(first: Vec<String>, second: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    first
        .into_iter()
        .chain(second)
        .filter(|value| seen.insert(value.clone()))
        .collect()
}
