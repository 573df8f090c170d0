//! Conduit Persistence
//!
//! Execution repositories for the orchestration engine.
//!
//! This crate provides the [`ExecutionRepository`] contract, an in-memory
//! implementation, a dual repository that spans two backends during a
//! migration, and a retry wrapper for transient backend failures.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use conduit_core::domain::{Execution, ExecutionType};
//! use conduit_persistence::{
//!     BackendKind, DualRepositoryConfig, ExecutionRepository, InMemoryExecutionRepository,
//!     PersistenceRetry, RepositoryRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = RepositoryRegistry::new()
//!         .with(BackendKind::Sql, Arc::new(InMemoryExecutionRepository::new()))
//!         .with(BackendKind::Redis, Arc::new(InMemoryExecutionRepository::new()));
//!
//!     let config = DualRepositoryConfig {
//!         enabled: true,
//!         ..DualRepositoryConfig::default()
//!     };
//!     let repository = registry.build(&config)?;
//!     let retry = PersistenceRetry::default();
//!
//!     let execution = Execution::orchestration("my-app");
//!     retry.write(|| repository.store(&execution)).await?;
//!
//!     let stored = retry
//!         .read(|| repository.retrieve(ExecutionType::Orchestration, &execution.id))
//!         .await?;
//!     assert_eq!(stored.id, execution.id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod repository;
pub mod retry;

// Re-export commonly used types
pub use config::{BackendKind, DualRepositoryConfig, PersistenceRetryConfig, RetryPolicy};
pub use error::{RepositoryError, Result};
pub use registry::RepositoryRegistry;
pub use repository::{
    DualExecutionRepository, ExecutionRepository, ExecutionStream, InMemoryExecutionRepository,
};
pub use retry::{PersistenceRetry, RetryCategory, Retryable};
