//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use conduit_core::domain::{
    ActiveExecutionsReport, Execution, ExecutionComparator, ExecutionCriteria, ExecutionStatus,
    ExecutionType, Stage,
};
use conduit_persistence::{
    ExecutionRepository, ExecutionStream, InMemoryExecutionRepository, RepositoryError, Result,
};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduit_persistence=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// In-memory repository whose next `failures` calls fail with a backend error
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: InMemoryExecutionRepository,
    failures: AtomicU32,
    pub calls: AtomicU32,
}

impl FlakyRepository {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn trip(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match remaining {
            Ok(_) => Err(RepositoryError::backend("connection reset")),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl ExecutionRepository for FlakyRepository {
    async fn store(&self, execution: &Execution) -> Result<()> {
        self.trip()?;
        self.inner.store(execution).await
    }

    async fn retrieve(&self, execution_type: ExecutionType, id: &str) -> Result<Execution> {
        self.trip()?;
        self.inner.retrieve(execution_type, id).await
    }

    async fn delete(&self, execution_type: ExecutionType, id: &str) -> Result<()> {
        self.trip()?;
        self.inner.delete(execution_type, id).await
    }

    async fn delete_all(&self, execution_type: ExecutionType, ids: &[String]) -> Result<()> {
        self.trip()?;
        self.inner.delete_all(execution_type, ids).await
    }

    async fn has_execution(&self, execution_type: ExecutionType, id: &str) -> Result<bool> {
        self.trip()?;
        self.inner.has_execution(execution_type, id).await
    }

    async fn store_stage(&self, stage: &Stage) -> Result<()> {
        self.trip()?;
        self.inner.store_stage(stage).await
    }

    async fn update_stage_context(&self, stage: &Stage) -> Result<()> {
        self.trip()?;
        self.inner.update_stage_context(stage).await
    }

    async fn add_stage(&self, stage: &Stage) -> Result<()> {
        self.trip()?;
        self.inner.add_stage(stage).await
    }

    async fn remove_stage(&self, execution: &Execution, stage_id: &str) -> Result<()> {
        self.trip()?;
        self.inner.remove_stage(execution, stage_id).await
    }

    async fn cancel(
        &self,
        execution_type: ExecutionType,
        id: &str,
        user: Option<&str>,
        reason: Option<&str>,
    ) -> Result<()> {
        self.trip()?;
        self.inner.cancel(execution_type, id, user, reason).await
    }

    async fn pause(
        &self,
        execution_type: ExecutionType,
        id: &str,
        user: Option<&str>,
    ) -> Result<()> {
        self.trip()?;
        self.inner.pause(execution_type, id, user).await
    }

    async fn resume(
        &self,
        execution_type: ExecutionType,
        id: &str,
        user: Option<&str>,
        ignore_current_status: bool,
    ) -> Result<()> {
        self.trip()?;
        self.inner
            .resume(execution_type, id, user, ignore_current_status)
            .await
    }

    async fn update_status(
        &self,
        execution_type: ExecutionType,
        id: &str,
        status: ExecutionStatus,
    ) -> Result<()> {
        self.trip()?;
        self.inner.update_status(execution_type, id, status).await
    }

    async fn is_canceled(&self, execution_type: ExecutionType, id: &str) -> Result<bool> {
        self.trip()?;
        self.inner.is_canceled(execution_type, id).await
    }

    async fn retrieve_all(&self, execution_type: ExecutionType) -> Result<ExecutionStream> {
        self.trip()?;
        self.inner.retrieve_all(execution_type).await
    }

    async fn retrieve_by_criteria(
        &self,
        execution_type: ExecutionType,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream> {
        self.trip()?;
        self.inner.retrieve_by_criteria(execution_type, criteria).await
    }

    async fn retrieve_pipelines_for_application(
        &self,
        application: &str,
    ) -> Result<ExecutionStream> {
        self.trip()?;
        self.inner.retrieve_pipelines_for_application(application).await
    }

    async fn retrieve_pipelines_for_pipeline_config_id(
        &self,
        pipeline_config_id: &str,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream> {
        self.trip()?;
        self.inner
            .retrieve_pipelines_for_pipeline_config_id(pipeline_config_id, criteria)
            .await
    }

    async fn retrieve_orchestrations_for_application(
        &self,
        application: &str,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream> {
        self.trip()?;
        self.inner
            .retrieve_orchestrations_for_application(application, criteria)
            .await
    }

    async fn retrieve_sorted_orchestrations_for_application(
        &self,
        application: &str,
        criteria: &ExecutionCriteria,
        sorter: Option<ExecutionComparator>,
    ) -> Result<Vec<Execution>> {
        self.trip()?;
        self.inner
            .retrieve_sorted_orchestrations_for_application(application, criteria, sorter)
            .await
    }

    async fn retrieve_buffered_executions(&self) -> Result<Vec<Execution>> {
        self.trip()?;
        self.inner.retrieve_buffered_executions().await
    }

    async fn retrieve_all_application_names(
        &self,
        execution_type: Option<ExecutionType>,
    ) -> Result<Vec<String>> {
        self.trip()?;
        self.inner.retrieve_all_application_names(execution_type).await
    }

    async fn retrieve_application_names_with_min_executions(
        &self,
        execution_type: Option<ExecutionType>,
        min_executions: usize,
    ) -> Result<Vec<String>> {
        self.trip()?;
        self.inner
            .retrieve_application_names_with_min_executions(execution_type, min_executions)
            .await
    }

    async fn retrieve_all_execution_ids(
        &self,
        execution_type: ExecutionType,
    ) -> Result<Vec<String>> {
        self.trip()?;
        self.inner.retrieve_all_execution_ids(execution_type).await
    }

    async fn retrieve_pipeline_config_ids_for_application(
        &self,
        application: &str,
    ) -> Result<Vec<String>> {
        self.trip()?;
        self.inner
            .retrieve_pipeline_config_ids_for_application(application)
            .await
    }

    async fn retrieve_and_filter_pipeline_execution_ids_for_application(
        &self,
        application: &str,
        pipeline_config_ids: &[String],
        criteria: &ExecutionCriteria,
    ) -> Result<Vec<String>> {
        self.trip()?;
        self.inner
            .retrieve_and_filter_pipeline_execution_ids_for_application(
                application,
                pipeline_config_ids,
                criteria,
            )
            .await
    }

    async fn retrieve_pipeline_execution_details_for_application(
        &self,
        application: &str,
        execution_ids: &[String],
        query_timeout_seconds: u64,
    ) -> Result<Vec<Execution>> {
        self.trip()?;
        self.inner
            .retrieve_pipeline_execution_details_for_application(
                application,
                execution_ids,
                query_timeout_seconds,
            )
            .await
    }

    async fn retrieve_pipelines_for_pipeline_config_ids_between_build_time_boundary(
        &self,
        pipeline_config_ids: &[String],
        build_time_start: i64,
        build_time_end: i64,
        criteria: &ExecutionCriteria,
    ) -> Result<Vec<Execution>> {
        self.trip()?;
        self.inner
            .retrieve_pipelines_for_pipeline_config_ids_between_build_time_boundary(
                pipeline_config_ids,
                build_time_start,
                build_time_end,
                criteria,
            )
            .await
    }

    async fn count_active_executions(&self) -> Result<ActiveExecutionsReport> {
        self.trip()?;
        self.inner.count_active_executions().await
    }

    async fn retrieve_by_correlation_id(
        &self,
        execution_type: ExecutionType,
        correlation_id: &str,
    ) -> Result<Execution> {
        self.trip()?;
        self.inner
            .retrieve_by_correlation_id(execution_type, correlation_id)
            .await
    }
}
