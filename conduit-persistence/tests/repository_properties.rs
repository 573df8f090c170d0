//! End-to-end behaviour of the repositories through the public API

mod common;

use common::{FlakyRepository, init_tracing};
use conduit_core::domain::{
    Execution, ExecutionComparator, ExecutionCriteria, ExecutionStatus, ExecutionType,
};
use conduit_persistence::{
    DualExecutionRepository, ExecutionRepository, InMemoryExecutionRepository, PersistenceRetry,
    PersistenceRetryConfig, RepositoryError, RetryPolicy,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn in_memory() -> Arc<dyn ExecutionRepository> {
    Arc::new(InMemoryExecutionRepository::new())
}

struct DualFixture {
    dual: DualExecutionRepository,
    primary: Arc<dyn ExecutionRepository>,
    previous: Arc<dyn ExecutionRepository>,
}

fn dual_fixture() -> DualFixture {
    init_tracing();
    let primary = in_memory();
    let previous = in_memory();
    DualFixture {
        dual: DualExecutionRepository::new(primary.clone(), previous.clone()),
        primary,
        previous,
    }
}

fn fast_retry(max_attempts: u32) -> PersistenceRetry {
    let policy = RetryPolicy {
        max_attempts,
        backoff: Duration::from_millis(1),
    };
    PersistenceRetry::new(PersistenceRetryConfig {
        read: policy.clone(),
        write: policy,
    })
}

// =============================================================================
// Round-trip and existence
// =============================================================================

#[tokio::test]
async fn test_round_trip_on_every_backend() {
    init_tracing();
    let fixture = dual_fixture();
    let backends: Vec<Arc<dyn ExecutionRepository>> =
        vec![in_memory(), Arc::new(fixture.dual)];

    for repository in backends {
        let mut execution = Execution::pipeline("app", "config")
            .with_status(ExecutionStatus::Running);
        execution.add_stage("bake", "Bake");

        assert!(!repository.has_execution(ExecutionType::Pipeline, &execution.id).await.unwrap());
        repository.store(&execution).await.unwrap();
        assert!(repository.has_execution(ExecutionType::Pipeline, &execution.id).await.unwrap());

        let stored = repository
            .retrieve(ExecutionType::Pipeline, &execution.id)
            .await
            .unwrap();
        assert_eq!(stored.id, execution.id);
        assert_eq!(stored.status, ExecutionStatus::Running);
        assert_eq!(stored.stages.len(), 1);
    }
}

// =============================================================================
// Dual repository
// =============================================================================

#[tokio::test]
async fn test_enumerations_deduplicate_across_backends() {
    let fixture = dual_fixture();
    let shared = Execution::pipeline("app", "config")
        .with_status(ExecutionStatus::Buffered)
        .with_build_time(500);
    let only_previous = Execution::pipeline("app", "config")
        .with_status(ExecutionStatus::Buffered)
        .with_build_time(600);
    fixture.primary.store(&shared).await.unwrap();
    fixture.previous.store(&shared).await.unwrap();
    fixture.previous.store(&only_previous).await.unwrap();

    let expected: HashSet<String> = [shared.id.clone(), only_previous.id.clone()].into();
    let dual = &fixture.dual;
    let criteria = ExecutionCriteria::new();
    let config_ids = ["config".to_string()];

    let ids = |executions: Vec<Execution>| -> Vec<String> {
        executions.into_iter().map(|e| e.id).collect()
    };
    let results = vec![
        ids(dual.retrieve_all(ExecutionType::Pipeline).await.unwrap().collect()),
        ids(dual
            .retrieve_by_criteria(ExecutionType::Pipeline, &criteria)
            .await
            .unwrap()
            .collect()),
        ids(dual.retrieve_pipelines_for_application("app").await.unwrap().collect()),
        ids(dual
            .retrieve_pipelines_for_pipeline_config_id("config", &criteria)
            .await
            .unwrap()
            .collect()),
        ids(dual.retrieve_buffered_executions().await.unwrap()),
        ids(dual
            .retrieve_all_pipelines_for_pipeline_config_ids_between_build_time_boundary(
                &config_ids,
                0,
                1_000,
                &criteria,
            )
            .await
            .unwrap()),
        ids(dual
            .retrieve_pipelines_for_pipeline_config_ids_between_build_time_boundary(
                &config_ids,
                0,
                1_000,
                &criteria,
            )
            .await
            .unwrap()),
        ids(dual
            .retrieve_pipeline_execution_details_for_application(
                "app",
                &[shared.id.clone(), only_previous.id.clone()],
                30,
            )
            .await
            .unwrap()),
        dual.retrieve_all_execution_ids(ExecutionType::Pipeline).await.unwrap(),
        dual.retrieve_and_filter_pipeline_execution_ids_for_application(
            "app",
            &config_ids,
            &criteria,
        )
        .await
        .unwrap(),
    ];

    for result in results {
        assert_eq!(result.len(), 2, "duplicate ids in {:?}", result);
        assert_eq!(result.into_iter().collect::<HashSet<_>>(), expected);
    }

    let names = dual.retrieve_all_application_names(None).await.unwrap();
    assert_eq!(names, vec!["app"]);
    let names = dual
        .retrieve_application_names_with_min_executions(Some(ExecutionType::Pipeline), 1)
        .await
        .unwrap();
    assert_eq!(names, vec!["app"]);
    let config_ids = dual
        .retrieve_pipeline_config_ids_for_application("app")
        .await
        .unwrap();
    assert_eq!(config_ids, vec!["config"]);
}

#[tokio::test]
async fn test_orchestration_enumerations_deduplicate_across_backends() {
    let fixture = dual_fixture();
    let shared = Execution::orchestration("app")
        .with_status(ExecutionStatus::Running)
        .with_build_time(100);
    let only_primary = Execution::orchestration("app")
        .with_status(ExecutionStatus::Running)
        .with_build_time(200);
    fixture.primary.store(&shared).await.unwrap();
    fixture.primary.store(&only_primary).await.unwrap();
    fixture.previous.store(&shared).await.unwrap();

    let expected: HashSet<String> = [shared.id.clone(), only_primary.id.clone()].into();
    let dual = &fixture.dual;
    let criteria = ExecutionCriteria::new();

    let stream: Vec<String> = dual
        .retrieve_orchestrations_for_application("app", &criteria)
        .await
        .unwrap()
        .map(|e| e.id)
        .collect();
    let sorted: Vec<String> = dual
        .retrieve_sorted_orchestrations_for_application(
            "app",
            &criteria,
            Some(ExecutionComparator::BuildTimeDesc),
        )
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    let all_ids = dual
        .retrieve_all_execution_ids(ExecutionType::Orchestration)
        .await
        .unwrap();

    for result in [stream, all_ids] {
        assert_eq!(result.len(), 2, "duplicate ids in {:?}", result);
        assert_eq!(result.into_iter().collect::<HashSet<_>>(), expected);
    }
    assert_eq!(sorted, vec![only_primary.id.clone(), shared.id.clone()]);

    let busy = dual
        .retrieve_application_names_with_min_executions(None, 1)
        .await
        .unwrap();
    assert_eq!(busy, vec!["app"]);
    let report = dual.count_active_executions().await.unwrap();
    assert_eq!(report.orchestrations, 3);
}

#[tokio::test]
async fn test_routing_finds_execution_on_either_backend() {
    let fixture = dual_fixture();
    let on_primary = Execution::orchestration("app").with_name("new");
    let on_previous = Execution::orchestration("app").with_name("legacy");
    fixture.primary.store(&on_primary).await.unwrap();
    fixture.previous.store(&on_previous).await.unwrap();

    for expected in [&on_primary, &on_previous] {
        let found = fixture
            .dual
            .retrieve(ExecutionType::Orchestration, &expected.id)
            .await
            .unwrap();
        assert_eq!(found.name, expected.name);
    }

    let err = fixture
        .dual
        .retrieve(ExecutionType::Orchestration, "missing")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_writes_are_never_duplicated() {
    let fixture = dual_fixture();
    let legacy = Execution::pipeline("app", "config").with_status(ExecutionStatus::Running);
    fixture.previous.store(&legacy).await.unwrap();

    fixture
        .dual
        .cancel(ExecutionType::Pipeline, &legacy.id, Some("ops"), Some("rollback"))
        .await
        .unwrap();

    assert!(!fixture.primary.has_execution(ExecutionType::Pipeline, &legacy.id).await.unwrap());
    let stored = fixture
        .previous
        .retrieve(ExecutionType::Pipeline, &legacy.id)
        .await
        .unwrap();
    assert_eq!(stored.status, ExecutionStatus::Canceled);
    assert_eq!(stored.cancellation_reason.as_deref(), Some("rollback"));
}

#[tokio::test]
async fn test_correlation_lookup_falls_back_to_previous() {
    let fixture = dual_fixture();
    let execution = Execution::orchestration("app")
        .with_status(ExecutionStatus::Running)
        .with_correlation_id("X");
    fixture.previous.store(&execution).await.unwrap();

    let found = fixture
        .dual
        .retrieve_by_correlation_id(ExecutionType::Orchestration, "X")
        .await
        .unwrap();
    assert_eq!(found.id, execution.id);

    let err = fixture
        .dual
        .retrieve_pipeline_for_correlation_id("unknown")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_correlation_lookup_propagates_backend_errors() {
    init_tracing();
    let primary = Arc::new(FlakyRepository::failing(1));
    let previous = Arc::new(FlakyRepository::default());
    let execution = Execution::orchestration("app").with_correlation_id("X");
    previous.store(&execution).await.unwrap();

    let dual = DualExecutionRepository::new(primary.clone(), previous.clone());
    let err = dual
        .retrieve_orchestration_for_correlation_id("X")
        .await
        .unwrap_err();

    assert!(matches!(err, RepositoryError::Backend { .. }));
    // store above is the only call previous has seen
    assert_eq!(previous.calls(), 1);
}

// =============================================================================
// State machine
// =============================================================================

#[tokio::test]
async fn test_pause_resume_state_machine() {
    init_tracing();
    let repository = in_memory();
    let execution = Execution::pipeline("app", "config");
    repository.store(&execution).await.unwrap();

    let err = repository
        .pause(ExecutionType::Pipeline, &execution.id, Some("alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::UnpausablePipeline(_)));

    repository
        .update_status(ExecutionType::Pipeline, &execution.id, ExecutionStatus::Running)
        .await
        .unwrap();
    repository
        .pause(ExecutionType::Pipeline, &execution.id, Some("alice"))
        .await
        .unwrap();

    let paused = repository.retrieve(ExecutionType::Pipeline, &execution.id).await.unwrap();
    assert_eq!(paused.status, ExecutionStatus::Paused);
    let details = paused.paused.unwrap();
    assert_eq!(details.paused_by.as_deref(), Some("alice"));
    assert!(details.pause_time.is_some());

    repository
        .resume(ExecutionType::Pipeline, &execution.id, Some("bob"), false)
        .await
        .unwrap();
    let resumed = repository.retrieve(ExecutionType::Pipeline, &execution.id).await.unwrap();
    assert_eq!(resumed.status, ExecutionStatus::Running);
    let details = resumed.paused.unwrap();
    assert_eq!(details.resumed_by.as_deref(), Some("bob"));
    assert!(details.resume_time.is_some());

    let err = repository
        .resume(ExecutionType::Pipeline, &execution.id, Some("bob"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::UnresumablePipeline(_)));
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn test_pagination_drain_returns_every_execution_once() {
    init_tracing();
    let repository = in_memory();
    let total = 23;
    for i in 0..total {
        let execution = Execution::pipeline("app", "config").with_build_time(10_000 + i);
        repository.store(&execution).await.unwrap();
    }

    for page_size in [1, 4, 5, 23, 50] {
        let criteria = ExecutionCriteria::new().with_page_size(page_size);
        let executions = repository
            .retrieve_all_pipelines_for_pipeline_config_ids_between_build_time_boundary(
                &["config".to_string()],
                0,
                i64::MAX,
                &criteria,
            )
            .await
            .unwrap();

        let ids: HashSet<_> = executions.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(executions.len(), total as usize, "page size {}", page_size);
        assert_eq!(ids.len(), total as usize, "page size {}", page_size);
    }
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test]
async fn test_retry_recovers_from_transient_failures() {
    init_tracing();
    let repository = FlakyRepository::failing(2);
    let retry = fast_retry(3);
    let execution = Execution::orchestration("app");

    retry.write(|| repository.store(&execution)).await.unwrap();
    assert_eq!(repository.calls(), 3);

    let stored = retry
        .read(|| repository.retrieve(ExecutionType::Orchestration, &execution.id))
        .await
        .unwrap();
    assert_eq!(stored.id, execution.id);
}

#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    init_tracing();
    let repository = FlakyRepository::failing(10);
    let retry = fast_retry(4);

    let err = retry
        .read(|| repository.retrieve(ExecutionType::Pipeline, "any"))
        .await
        .unwrap_err();

    assert!(matches!(err, RepositoryError::Backend { .. }));
    assert_eq!(repository.calls(), 4);
}
