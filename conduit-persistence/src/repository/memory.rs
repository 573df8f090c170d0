//! In-memory Execution Repository
//!
//! Complete implementation of the repository contract over process-local
//! maps. Used by tests and by small deployments that do not need durability.

use async_trait::async_trait;
use conduit_core::domain::{
    ActiveExecutionsReport, Execution, ExecutionComparator, ExecutionCriteria, ExecutionStatus,
    ExecutionType, PausedDetails, Stage, now_millis,
};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

use super::{ExecutionRepository, ExecutionStream};
use crate::error::{RepositoryError, Result};

/// Page size used when collecting buffered executions
const BUFFERED_PAGE_SIZE: usize = 100;

/// In-memory implementation of ExecutionRepository
///
/// Executions are held by value in one map per execution type, plus a map
/// from correlation id to execution id. Each map locks per key; there is no
/// transaction spanning several keys.
#[derive(Debug, Default)]
pub struct InMemoryExecutionRepository {
    pipelines: DashMap<String, Execution>,
    orchestrations: DashMap<String, Execution>,
    correlation_ids: DashMap<String, String>,
}

impl InMemoryExecutionRepository {
    /// Creates an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    fn storage(&self, execution_type: ExecutionType) -> &DashMap<String, Execution> {
        match execution_type {
            ExecutionType::Pipeline => &self.pipelines,
            ExecutionType::Orchestration => &self.orchestrations,
        }
    }

    /// Point-in-time copy of every execution of one type
    fn snapshot(&self, execution_type: ExecutionType) -> Vec<Execution> {
        self.storage(execution_type)
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn snapshot_filtered(
        &self,
        execution_type: ExecutionType,
        predicate: impl Fn(&Execution) -> bool,
    ) -> Vec<Execution> {
        self.storage(execution_type)
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Applies `update` to the stored execution under its key lock
    ///
    /// `update` must validate before mutating: an error leaves the stored
    /// execution as it was.
    fn modify<F>(&self, execution_type: ExecutionType, id: &str, update: F) -> Result<Execution>
    where
        F: FnOnce(&mut Execution) -> Result<()>,
    {
        let updated = {
            let mut entry = self
                .storage(execution_type)
                .get_mut(id)
                .ok_or_else(|| RepositoryError::not_found(execution_type, id))?;
            update(entry.value_mut())?;
            entry.value().clone()
        };

        self.track_correlation_id(&updated);
        Ok(updated)
    }

    fn is_active(&self, execution_id: &str) -> bool {
        ExecutionType::ALL.iter().any(|t| {
            self.storage(*t)
                .get(execution_id)
                .is_some_and(|e| !e.status.is_complete())
        })
    }

    /// Keeps the correlation map in step with a stored execution
    ///
    /// An active execution claims its correlation id unless another active
    /// execution already holds it. A complete execution releases it.
    fn track_correlation_id(&self, execution: &Execution) {
        let Some(correlation_id) = execution.correlation_id.as_ref() else {
            return;
        };

        if execution.holds_correlation_id() {
            let holder = self
                .correlation_ids
                .get(correlation_id)
                .map(|entry| entry.value().clone());
            match holder {
                Some(holder) if holder != execution.id && self.is_active(&holder) => {
                    debug!(
                        "Correlation id {} already held by active execution {}",
                        correlation_id, holder
                    );
                }
                _ => {
                    self.correlation_ids
                        .insert(correlation_id.clone(), execution.id.clone());
                }
            }
        } else {
            self.correlation_ids
                .remove_if(correlation_id, |_, holder| holder == &execution.id);
        }
    }

    fn sorted(mut executions: Vec<Execution>, sorter: ExecutionComparator) -> Vec<Execution> {
        executions.sort_by(|a, b| sorter.compare(a, b));
        executions
    }

    fn application_counts(&self, execution_type: ExecutionType) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.storage(execution_type).iter() {
            *counts.entry(entry.value().application.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn types_for(execution_type: Option<ExecutionType>) -> Vec<ExecutionType> {
        match execution_type {
            Some(t) => vec![t],
            None => ExecutionType::ALL.to_vec(),
        }
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn store(&self, execution: &Execution) -> Result<()> {
        let mut execution = execution.clone();
        let storage = self.storage(execution.execution_type);

        if execution.build_time.is_none() {
            let previous = storage.get(&execution.id).and_then(|e| e.build_time);
            execution.build_time = Some(previous.unwrap_or_else(now_millis));
        }

        self.track_correlation_id(&execution);
        debug!(
            "Storing {} {} ({})",
            execution.execution_type, execution.id, execution.status
        );
        storage.insert(execution.id.clone(), execution);

        Ok(())
    }

    async fn retrieve(&self, execution_type: ExecutionType, id: &str) -> Result<Execution> {
        self.storage(execution_type)
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RepositoryError::not_found(execution_type, id))
    }

    async fn delete(&self, execution_type: ExecutionType, id: &str) -> Result<()> {
        if let Some((_, execution)) = self.storage(execution_type).remove(id) {
            if let Some(correlation_id) = execution.correlation_id.as_ref() {
                self.correlation_ids
                    .remove_if(correlation_id, |_, holder| holder == &execution.id);
            }
            info!("Deleted {} {}", execution_type, id);
        }
        Ok(())
    }

    async fn delete_all(&self, execution_type: ExecutionType, ids: &[String]) -> Result<()> {
        for id in ids {
            self.delete(execution_type, id).await?;
        }
        Ok(())
    }

    async fn has_execution(&self, execution_type: ExecutionType, id: &str) -> Result<bool> {
        Ok(self.storage(execution_type).contains_key(id))
    }

    async fn store_stage(&self, stage: &Stage) -> Result<()> {
        self.modify(stage.execution_type, &stage.execution_id, |execution| {
            execution.upsert_stage(stage.clone());
            Ok(())
        })?;
        Ok(())
    }

    async fn update_stage_context(&self, stage: &Stage) -> Result<()> {
        self.store_stage(stage).await
    }

    async fn add_stage(&self, stage: &Stage) -> Result<()> {
        if !stage.is_synthetic() {
            return Err(RepositoryError::SyntheticStageRequired {
                stage_id: stage.id.clone(),
            });
        }
        self.store_stage(stage).await
    }

    async fn remove_stage(&self, execution: &Execution, stage_id: &str) -> Result<()> {
        let mut execution = execution.clone();
        execution.remove_stage(stage_id);
        self.store(&execution).await
    }

    async fn cancel(
        &self,
        execution_type: ExecutionType,
        id: &str,
        user: Option<&str>,
        reason: Option<&str>,
    ) -> Result<()> {
        self.modify(execution_type, id, |execution| {
            execution.canceled = true;
            if let Some(user) = user {
                execution.canceled_by = Some(user.to_string());
            }
            if let Some(reason) = reason.filter(|r| !r.is_empty()) {
                execution.cancellation_reason = Some(reason.to_string());
            }
            execution.update_status(ExecutionStatus::Canceled);
            Ok(())
        })?;

        info!("{} {} canceled by {:?}", execution_type, id, user);
        Ok(())
    }

    async fn pause(
        &self,
        execution_type: ExecutionType,
        id: &str,
        user: Option<&str>,
    ) -> Result<()> {
        self.modify(execution_type, id, |execution| {
            if execution.status != ExecutionStatus::Running {
                return Err(RepositoryError::UnpausablePipeline(format!(
                    "Unable to pause pipeline that is not RUNNING (executionId: {}, currentStatus: {})",
                    execution.id, execution.status
                )));
            }
            execution.status = ExecutionStatus::Paused;
            execution.paused = Some(PausedDetails {
                paused_by: user.map(str::to_string),
                pause_time: Some(now_millis()),
                ..PausedDetails::default()
            });
            Ok(())
        })?;

        info!("{} {} paused by {:?}", execution_type, id, user);
        Ok(())
    }

    async fn resume(
        &self,
        execution_type: ExecutionType,
        id: &str,
        user: Option<&str>,
        ignore_current_status: bool,
    ) -> Result<()> {
        self.modify(execution_type, id, |execution| {
            if !ignore_current_status && execution.status != ExecutionStatus::Paused {
                return Err(RepositoryError::UnresumablePipeline(format!(
                    "Unable to resume pipeline that is not PAUSED (executionId: {}, currentStatus: {})",
                    execution.id, execution.status
                )));
            }
            execution.status = ExecutionStatus::Running;
            let paused = execution.paused.get_or_insert_with(PausedDetails::default);
            paused.resumed_by = user.map(str::to_string);
            paused.resume_time = Some(now_millis());
            Ok(())
        })?;

        info!("{} {} resumed by {:?}", execution_type, id, user);
        Ok(())
    }

    async fn update_status(
        &self,
        execution_type: ExecutionType,
        id: &str,
        status: ExecutionStatus,
    ) -> Result<()> {
        self.modify(execution_type, id, |execution| {
            execution.update_status(status);
            Ok(())
        })?;
        Ok(())
    }

    async fn is_canceled(&self, execution_type: ExecutionType, id: &str) -> Result<bool> {
        let execution = self.retrieve(execution_type, id).await?;
        Ok(execution.canceled || execution.status == ExecutionStatus::Canceled)
    }

    async fn retrieve_all(&self, execution_type: ExecutionType) -> Result<ExecutionStream> {
        Ok(Box::new(self.snapshot(execution_type).into_iter()))
    }

    async fn retrieve_by_criteria(
        &self,
        execution_type: ExecutionType,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream> {
        let matching = self.snapshot_filtered(execution_type, |e| criteria.matches(e));
        let sorter = criteria.sort_type.unwrap_or(ExecutionComparator::NaturalAsc);
        let page = criteria.paginate(Self::sorted(matching, sorter));
        Ok(Box::new(page.into_iter()))
    }

    async fn retrieve_pipelines_for_application(
        &self,
        application: &str,
    ) -> Result<ExecutionStream> {
        let matching =
            self.snapshot_filtered(ExecutionType::Pipeline, |e| e.application == application);
        Ok(Box::new(matching.into_iter()))
    }

    async fn retrieve_pipelines_for_pipeline_config_id(
        &self,
        pipeline_config_id: &str,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream> {
        let matching = self.snapshot_filtered(ExecutionType::Pipeline, |e| {
            e.pipeline_config_id.as_deref() == Some(pipeline_config_id)
                && criteria.matches_status(e.status)
        });
        let newest: Vec<_> = Self::sorted(matching, ExecutionComparator::NaturalAsc)
            .into_iter()
            .take(criteria.limit())
            .collect();
        Ok(Box::new(newest.into_iter()))
    }

    async fn retrieve_orchestrations_for_application(
        &self,
        application: &str,
        criteria: &ExecutionCriteria,
    ) -> Result<ExecutionStream> {
        let orchestrations = self
            .retrieve_sorted_orchestrations_for_application(
                application,
                criteria,
                Some(ExecutionComparator::NaturalAsc),
            )
            .await?;
        Ok(Box::new(orchestrations.into_iter()))
    }

    async fn retrieve_sorted_orchestrations_for_application(
        &self,
        application: &str,
        criteria: &ExecutionCriteria,
        sorter: Option<ExecutionComparator>,
    ) -> Result<Vec<Execution>> {
        let matching = self.snapshot_filtered(ExecutionType::Orchestration, |e| {
            e.application == application && criteria.matches(e)
        });
        let sorter = sorter.unwrap_or(ExecutionComparator::NaturalAsc);
        Ok(criteria.paginate(Self::sorted(matching, sorter)))
    }

    async fn retrieve_buffered_executions(&self) -> Result<Vec<Execution>> {
        let criteria = ExecutionCriteria::new()
            .with_page_size(BUFFERED_PAGE_SIZE)
            .with_statuses([ExecutionStatus::Buffered]);

        let mut buffered = Vec::new();
        for execution_type in [ExecutionType::Orchestration, ExecutionType::Pipeline] {
            buffered.extend(self.retrieve_by_criteria(execution_type, &criteria).await?);
        }
        Ok(buffered)
    }

    async fn retrieve_all_application_names(
        &self,
        execution_type: Option<ExecutionType>,
    ) -> Result<Vec<String>> {
        self.retrieve_application_names_with_min_executions(execution_type, 1)
            .await
    }

    async fn retrieve_application_names_with_min_executions(
        &self,
        execution_type: Option<ExecutionType>,
        min_executions: usize,
    ) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();
        for t in Self::types_for(execution_type) {
            names.extend(
                self.application_counts(t)
                    .into_iter()
                    .filter(|(_, count)| *count >= min_executions)
                    .map(|(application, _)| application),
            );
        }
        Ok(names.into_iter().collect())
    }

    async fn retrieve_all_execution_ids(
        &self,
        execution_type: ExecutionType,
    ) -> Result<Vec<String>> {
        Ok(self
            .storage(execution_type)
            .iter()
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn retrieve_pipeline_config_ids_for_application(
        &self,
        application: &str,
    ) -> Result<Vec<String>> {
        let config_ids: BTreeSet<String> = self
            .storage(ExecutionType::Pipeline)
            .iter()
            .filter(|entry| entry.value().application == application)
            .filter_map(|entry| entry.value().pipeline_config_id.clone())
            .collect();
        Ok(config_ids.into_iter().collect())
    }

    async fn retrieve_and_filter_pipeline_execution_ids_for_application(
        &self,
        application: &str,
        pipeline_config_ids: &[String],
        criteria: &ExecutionCriteria,
    ) -> Result<Vec<String>> {
        let wanted: HashSet<&str> = pipeline_config_ids.iter().map(String::as_str).collect();
        let mut by_config: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for entry in self.storage(ExecutionType::Pipeline).iter() {
            let execution = entry.value();
            let Some(config_id) = execution.pipeline_config_id.as_deref() else {
                continue;
            };
            if execution.application == application
                && wanted.contains(config_id)
                && criteria.matches_status(execution.status)
            {
                by_config
                    .entry(config_id.to_string())
                    .or_default()
                    .insert(execution.id.clone());
            }
        }

        let mut ids = Vec::new();
        for execution_ids in by_config.into_values() {
            let skip = execution_ids.len().saturating_sub(criteria.limit());
            ids.extend(execution_ids.into_iter().skip(skip));
        }
        Ok(ids)
    }

    async fn retrieve_pipeline_execution_details_for_application(
        &self,
        application: &str,
        execution_ids: &[String],
        _query_timeout_seconds: u64,
    ) -> Result<Vec<Execution>> {
        let wanted: HashSet<&str> = execution_ids.iter().map(String::as_str).collect();
        Ok(self.snapshot_filtered(ExecutionType::Pipeline, |e| {
            e.application == application && wanted.contains(e.id.as_str())
        }))
    }

    async fn retrieve_pipelines_for_pipeline_config_ids_between_build_time_boundary(
        &self,
        pipeline_config_ids: &[String],
        build_time_start: i64,
        build_time_end: i64,
        criteria: &ExecutionCriteria,
    ) -> Result<Vec<Execution>> {
        let wanted: HashSet<&str> = pipeline_config_ids.iter().map(String::as_str).collect();
        let matching = self.snapshot_filtered(ExecutionType::Pipeline, |e| {
            e.pipeline_config_id
                .as_deref()
                .is_some_and(|id| wanted.contains(id))
                && e
                    .build_time
                    .is_some_and(|bt| bt > build_time_start && bt < build_time_end)
                && criteria.matches_status(e.status)
        });
        let sorter = criteria
            .sort_type
            .unwrap_or(ExecutionComparator::NaturalDesc);
        Ok(criteria.paginate(Self::sorted(matching, sorter)))
    }

    async fn count_active_executions(&self) -> Result<ActiveExecutionsReport> {
        let running = |t: ExecutionType| {
            self.storage(t)
                .iter()
                .filter(|entry| entry.value().status == ExecutionStatus::Running)
                .count()
        };
        Ok(ActiveExecutionsReport {
            orchestrations: running(ExecutionType::Orchestration),
            pipelines: running(ExecutionType::Pipeline),
        })
    }

    async fn retrieve_by_correlation_id(
        &self,
        execution_type: ExecutionType,
        correlation_id: &str,
    ) -> Result<Execution> {
        let execution_id = self
            .correlation_ids
            .get(correlation_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                RepositoryError::ExecutionNotFound(format!(
                    "No {} found for correlation ID {}",
                    execution_type, correlation_id
                ))
            })?;

        let execution = self
            .storage(execution_type)
            .get(&execution_id)
            .map(|entry| entry.value().clone());

        match execution {
            Some(execution) if !execution.status.is_complete() => Ok(execution),
            Some(_) => {
                self.correlation_ids
                    .remove_if(correlation_id, |_, holder| holder == &execution_id);
                Err(RepositoryError::ExecutionNotFound(format!(
                    "Complete {} found for correlation ID {}",
                    execution_type, correlation_id
                )))
            }
            None => {
                let exists_elsewhere = ExecutionType::ALL
                    .iter()
                    .any(|t| self.storage(*t).contains_key(&execution_id));
                if !exists_elsewhere {
                    self.correlation_ids
                        .remove_if(correlation_id, |_, holder| holder == &execution_id);
                }
                Err(RepositoryError::ExecutionNotFound(format!(
                    "No {} found for correlation ID {}",
                    execution_type, correlation_id
                )))
            }
        }
    }
}
