//! Dual Execution Repository
//!
//! Composes a `primary` (preferred) and a `previous` (legacy) repository so a
//! deployment can migrate between two stores while both stay readable.
//!
//! - Single-execution operations are routed to the one backend that holds
//!   the execution; new executions land on `primary`.
//! - Enumerations query both backends and merge the results, keeping the
//!   first execution seen for each id.
//! - Correlation lookups fall back to `previous` only on `ExecutionNotFound`.

use async_trait::async_trait;
use conduit_core::domain::{
    ActiveExecutionsReport, Execution, ExecutionComparator, ExecutionCriteria, ExecutionStatus,
    ExecutionType, Stage,
};
use std::sync::Arc;
use tracing::debug;

use super::{
    ExecutionRepository, ExecutionStream, merge_distinct, merge_distinct_strings,
    merge_distinct_vec,
};
use crate::config::DualRepositoryConfig;
use crate::error::Result;
use crate::registry::RepositoryRegistry;

pub struct DualExecutionRepository {
    primary: Arc<dyn ExecutionRepository>,
    previous: Arc<dyn ExecutionRepository>,
}

impl DualExecutionRepository {
    pub fn new(
        primary: Arc<dyn ExecutionRepository>,
        previous: Arc<dyn ExecutionRepository>,
    ) -> Self {
        Self { primary, previous }
    }

    /// Resolves both roles from the registry
    pub fn from_registry(
        registry: &RepositoryRegistry,
        config: &DualRepositoryConfig,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let primary = registry.get(config.primary)?;
        let previous = registry.get(config.previous)?;
        Ok(Self::new(primary, previous))
    }

    /// Picks the backend holding `id`
    ///
    /// With a known type only that type is checked. Without one, pipelines are
    /// checked before orchestrations. Unknown ids go to `primary`.
    async fn select(
        &self,
        execution_type: Option<ExecutionType>,
        id: &str,
    ) -> Result<&Arc<dyn ExecutionRepository>> {
        let types = match execution_type {
            Some(t) => vec![t],
            None => ExecutionType::ALL.to_vec(),
        };

        for t in types {
            if self.primary.has_execution(t, id).await? {
                return Ok(&self.primary);
            }
            if self.previous.has_execution(t, id).await? {
                debug!("Routing {} {} to previous repository", t, id);
                return Ok(&self.previous);
            }
        }

        Ok(&self.primary)
    }
}

#[async_trait]
impl ExecutionRepository for DualExecutionRepository {
    async fn store(&self, execution: &Execution) -> Result<()> {
        self.select(Some(execution.execution_type), &execution.id)
            .await?
            .store(execution)
            .await
    }

    async fn retrieve(&self, execution_type: ExecutionType, id: &str) -> Result<Execution> {
        self.select(Some(execution_type), id)
            .await?
            .retrieve(execution_type, id)
            .await
    }

    async fn delete(&self, execution_type: ExecutionType, id: &str) -> Result<()> {
        self.select(Some(execution_type), id)
            .await?
            .delete(execution_type, id)
            .await
    }

    async fn delete_all(&self, execution_type: ExecutionType, ids: &[String]) -> Result<()> {
        for id in ids {
            self.delete(execution_type, id).await?;
        }
        Ok(())
    }

    async fn has_execution(&self, execution_type: ExecutionType, id: &str) -> Result<bool> {
        if self.primary.has_execution(execution_type, id).await? {
            return Ok(true);
        }
        self.previous.has_execution(execution_type, id).await
    }

    async fn store_stage(&self, stage: &Stage) -> Result<()> {
        self.select(Some(stage.execution_type), &stage.execution_id)
            .await?
            .store_stage(stage)
            .await
    }

    async fn update_stage_context(&self, stage: &Stage) -> Result<()> {
        self.select(Some(stage.execution_type), &stage.execution_id)
            .await?
            .update_stage_context(stage)
            .await
    }

    async fn add_stage(&self, stage: &Stage) -> Result<()> {
        self.select(Some(stage.execution_type), &stage.execution_id)
            .await?
            .add_stage(stage)
            .await
    }

    async fn remove_stage(&self, execution: &Execution, stage_id: &str) -> Result<()> {
        self.select(Some(execution.execution_type), &execution.id)
            .await?
            .remove_stage(execution, stage_id)
            .await
    }

    async fn cancel(
        &self,
        execution_type: ExecutionType,
        id: &str,
        user: Option<&str>,
        reason: Option<&str>,
    ) -> Result<()> {
        self.select(Some(execution_type), id)
            .await?
            .cancel(execution_type, id, user, reason)
            .await
    }

    async fn pause(
        &self,
        execution_type: ExecutionType,
        id: &str,
        user: Option<&str>,
    ) -> Result<()> {
        self.select(Some(execution_type), id)
            .await?
            .pause(execution_type, id, user)
            .await
    }

    async fn resume(
        &self,
        execution_type: ExecutionType,
        id: &str,
        user: Option<&str>,
        ignore_current_status: bool,
    ) -> Result<()> {
        self.select(Some(execution_type), id)
            .await?
            .resume(execution_type, id, user, ignore_current_status)
            .await
    }

    async fn update_status(
        &self,
        execution_type: ExecutionType,
        id: &str,
        status: ExecutionStatus,
    ) -> Result<()> {
        self.select(Some(execution_type), id)
            .await?
            .update_status(execution_type, id, status)
            .await
    }

    async fn is_canceled(&self, execution_type: ExecutionType, id: &str) -> Result<bool> {
        self.select(Some(execution_type), id)
            .await?
            .is_canceled(execution_type, id)
            .await
    }

    // =========================================================================
    // Merged enumerations
    // =========================================================================

    async fn retrieve_all(&self, execution_type: ExecutionType) -> Result<ExecutionStream> {
        let (primary, previous) = tokio::join!(
            self.primary.retrieve_all(execution_type),
            self.previous.retrieve_all(execution_type)
        );
        Ok(merge_distinct(primary?, previous?))
    }

    async fn retrieve_by_criteria(
        &self,
        execution_type: ExecutionType,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream> {
        let (primary, previous) = tokio::join!(
            self.primary.retrieve_by_criteria(execution_type, criteria),
            self.previous.retrieve_by_criteria(execution_type, criteria)
        );
        Ok(merge_distinct(primary?, previous?))
    }

    async fn retrieve_pipelines_for_application(
        &self,
        application: &str,
    ) -> Result<ExecutionStream> {
        let (primary, previous) = tokio::join!(
            self.primary.retrieve_pipelines_for_application(application),
            self.previous.retrieve_pipelines_for_application(application)
        );
        Ok(merge_distinct(primary?, previous?))
    }

    async fn retrieve_pipelines_for_pipeline_config_id(
        &self,
        pipeline_config_id: &str,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream> {
        let (primary, previous) = tokio::join!(
            self.primary
                .retrieve_pipelines_for_pipeline_config_id(pipeline_config_id, criteria),
            self.previous
                .retrieve_pipelines_for_pipeline_config_id(pipeline_config_id, criteria)
        );
        Ok(merge_distinct(primary?, previous?))
    }

    async fn retrieve_orchestrations_for_application(
        &self,
        application: &str,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream> {
        let (primary, previous) = tokio::join!(
            self.primary
                .retrieve_orchestrations_for_application(application, criteria),
            self.previous
                .retrieve_orchestrations_for_application(application, criteria)
        );
        Ok(merge_distinct(primary?, previous?))
    }

    async fn retrieve_sorted_orchestrations_for_application(
        &self,
        application: &str,
        criteria: &ExecutionCriteria,
        sorter: Option<ExecutionComparator>,
    ) -> Result<Vec<Execution>> {
        let (primary, previous) = tokio::join!(
            self.primary
                .retrieve_sorted_orchestrations_for_application(application, criteria, sorter),
            self.previous
                .retrieve_sorted_orchestrations_for_application(application, criteria, sorter)
        );
        let sorter = sorter.unwrap_or(ExecutionComparator::NaturalAsc);
        let mut merged = merge_distinct_vec(primary?, previous?);
        merged.sort_by(|a, b| sorter.compare(a, b));
        Ok(merged)
    }

    async fn retrieve_buffered_executions(&self) -> Result<Vec<Execution>> {
        let (primary, previous) = tokio::join!(
            self.primary.retrieve_buffered_executions(),
            self.previous.retrieve_buffered_executions()
        );
        Ok(merge_distinct_vec(primary?, previous?))
    }

    async fn retrieve_all_application_names(
        &self,
        execution_type: Option<ExecutionType>,
    ) -> Result<Vec<String>> {
        let (primary, previous) = tokio::join!(
            self.primary.retrieve_all_application_names(execution_type),
            self.previous.retrieve_all_application_names(execution_type)
        );
        Ok(merge_distinct_strings(primary?, previous?))
    }

    async fn retrieve_application_names_with_min_executions(
        &self,
        execution_type: Option<ExecutionType>,
        min_executions: usize,
    ) -> Result<Vec<String>> {
        let (primary, previous) = tokio::join!(
            self.primary
                .retrieve_application_names_with_min_executions(execution_type, min_executions),
            self.previous
                .retrieve_application_names_with_min_executions(execution_type, min_executions)
        );
        Ok(merge_distinct_strings(primary?, previous?))
    }

    async fn retrieve_all_execution_ids(
        &self,
        execution_type: ExecutionType,
    ) -> Result<Vec<String>> {
        let (primary, previous) = tokio::join!(
            self.primary.retrieve_all_execution_ids(execution_type),
            self.previous.retrieve_all_execution_ids(execution_type)
        );
        Ok(merge_distinct_strings(primary?, previous?))
    }

    async fn retrieve_pipeline_config_ids_for_application(
        &self,
        application: &str,
    ) -> Result<Vec<String>> {
        let (primary, previous) = tokio::join!(
            self.primary
                .retrieve_pipeline_config_ids_for_application(application),
            self.previous
                .retrieve_pipeline_config_ids_for_application(application)
        );
        Ok(merge_distinct_strings(primary?, previous?))
    }

    async fn retrieve_and_filter_pipeline_execution_ids_for_application(
        &self,
        application: &str,
        pipeline_config_ids: &[String],
        criteria: &ExecutionCriteria,
    ) -> Result<Vec<String>> {
        let (primary, previous) = tokio::join!(
            self.primary.retrieve_and_filter_pipeline_execution_ids_for_application(
                application,
                pipeline_config_ids,
                criteria
            ),
            self.previous.retrieve_and_filter_pipeline_execution_ids_for_application(
                application,
                pipeline_config_ids,
                criteria
            )
        );
        Ok(merge_distinct_strings(primary?, previous?))
    }

    async fn retrieve_pipeline_execution_details_for_application(
        &self,
        application: &str,
        execution_ids: &[String],
        query_timeout_seconds: u64,
    ) -> Result<Vec<Execution>> {
        let (primary, previous) = tokio::join!(
            self.primary.retrieve_pipeline_execution_details_for_application(
                application,
                execution_ids,
                query_timeout_seconds
            ),
            self.previous.retrieve_pipeline_execution_details_for_application(
                application,
                execution_ids,
                query_timeout_seconds
            )
        );
        Ok(merge_distinct_vec(primary?, previous?))
    }

    async fn retrieve_pipelines_for_pipeline_config_ids_between_build_time_boundary(
        &self,
        pipeline_config_ids: &[String],
        build_time_start: i64,
        build_time_end: i64,
        criteria: &ExecutionCriteria,
    ) -> Result<Vec<Execution>> {
        let (primary, previous) = tokio::join!(
            self.primary
                .retrieve_pipelines_for_pipeline_config_ids_between_build_time_boundary(
                    pipeline_config_ids,
                    build_time_start,
                    build_time_end,
                    criteria
                ),
            self.previous
                .retrieve_pipelines_for_pipeline_config_ids_between_build_time_boundary(
                    pipeline_config_ids,
                    build_time_start,
                    build_time_end,
                    criteria
                )
        );
        Ok(merge_distinct_vec(primary?, previous?))
    }

    /// Drains each backend on its own before merging
    ///
    /// Draining the merged pages would stop early whenever both backends
    /// together fill a page that neither fills alone.
    async fn retrieve_all_pipelines_for_pipeline_config_ids_between_build_time_boundary(
        &self,
        pipeline_config_ids: &[String],
        build_time_start: i64,
        build_time_end: i64,
        criteria: &ExecutionCriteria,
    ) -> Result<Vec<Execution>> {
        let (primary, previous) = tokio::join!(
            self.primary
                .retrieve_all_pipelines_for_pipeline_config_ids_between_build_time_boundary(
                    pipeline_config_ids,
                    build_time_start,
                    build_time_end,
                    criteria
                ),
            self.previous
                .retrieve_all_pipelines_for_pipeline_config_ids_between_build_time_boundary(
                    pipeline_config_ids,
                    build_time_start,
                    build_time_end,
                    criteria
                )
        );
        Ok(merge_distinct_vec(primary?, previous?))
    }

    async fn count_active_executions(&self) -> Result<ActiveExecutionsReport> {
        let (primary, previous) = tokio::join!(
            self.primary.count_active_executions(),
            self.previous.count_active_executions()
        );
        Ok(primary? + previous?)
    }

    async fn retrieve_by_correlation_id(
        &self,
        execution_type: ExecutionType,
        correlation_id: &str,
    ) -> Result<Execution> {
        match self
            .primary
            .retrieve_by_correlation_id(execution_type, correlation_id)
            .await
        {
            Err(err) if err.is_not_found() => {
                debug!(
                    "Correlation id {} not found in primary repository, trying previous",
                    correlation_id
                );
                self.previous
                    .retrieve_by_correlation_id(execution_type, correlation_id)
                    .await
            }
            result => result,
        }
    }
}
