//! Repository registry
//!
//! Maps each [`BackendKind`] to the repository instance the host process
//! constructed for it, and assembles the repository handed to the engine.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{BackendKind, DualRepositoryConfig};
use crate::repository::{DualExecutionRepository, ExecutionRepository};

#[derive(Default)]
pub struct RepositoryRegistry {
    repositories: HashMap<BackendKind, Arc<dyn ExecutionRepository>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `repository` under `kind`, replacing any previous entry
    pub fn register(&mut self, kind: BackendKind, repository: Arc<dyn ExecutionRepository>) {
        self.repositories.insert(kind, repository);
    }

    pub fn with(mut self, kind: BackendKind, repository: Arc<dyn ExecutionRepository>) -> Self {
        self.register(kind, repository);
        self
    }

    pub fn get(&self, kind: BackendKind) -> anyhow::Result<Arc<dyn ExecutionRepository>> {
        self.repositories
            .get(&kind)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No execution repository registered for {}", kind))
    }

    /// Builds the repository described by `config`
    ///
    /// Dual mode wraps the primary and previous backends; otherwise the
    /// primary backend is returned as is.
    pub fn build(
        &self,
        config: &DualRepositoryConfig,
    ) -> anyhow::Result<Arc<dyn ExecutionRepository>> {
        if config.enabled {
            info!(
                "Using dual execution repository (primary: {}, previous: {})",
                config.primary, config.previous
            );
            let dual = DualExecutionRepository::from_registry(self, config)?;
            Ok(Arc::new(dual))
        } else {
            info!("Using {} execution repository", config.primary);
            self.get(config.primary)
        }
    }
}
