use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use portal_core::{Task, TaskContext, TaskOutcome, TaskResult};
use thiserror::Error;

use crate::classifier::TaskSpec;

/// Task kinds understood by the classifier prompt.
pub mod kinds {
    pub const SEARCH: &str = "search";
    pub const DOCUMENT: &str = "document";
    pub const SHEET: &str = "sheet";
    pub const SLIDES: &str = "slides";
    pub const TODO: &str = "todo";
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn kind(&self) -> &str;
    async fn execute(&self, spec: &TaskSpec, ctx: TaskContext) -> TaskResult<TaskOutcome>;
}

pub type SharedExecutor = Arc<dyn TaskExecutor>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("executor for kind '{0}' already registered")]
    DuplicateKind(String),

    #[error("invalid executor: {0}")]
    InvalidExecutor(String),
}

/// Task kind to executor map. Unknown kinds resolve to the fallback.
pub struct TaskRegistry {
    executors: DashMap<String, SharedExecutor>,
    fallback: SharedExecutor,
}

impl TaskRegistry {
    pub fn new(fallback: SharedExecutor) -> Self {
        Self {
            executors: DashMap::new(),
            fallback,
        }
    }

    pub fn register<E>(&self, executor: E) -> Result<(), RegistryError>
    where
        E: TaskExecutor + 'static,
    {
        self.register_shared(Arc::new(executor))
    }

    pub fn register_shared(&self, executor: SharedExecutor) -> Result<(), RegistryError> {
        self.register_as(executor.kind().to_string(), executor)
    }

    /// Register `executor` under an extra kind name.
    pub fn register_as(
        &self,
        kind: impl Into<String>,
        executor: SharedExecutor,
    ) -> Result<(), RegistryError> {
        let kind = normalize_kind(&kind.into());
        if kind.is_empty() {
            return Err(RegistryError::InvalidExecutor(
                "task kind cannot be empty".to_string(),
            ));
        }

        match self.executors.entry(kind) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateKind(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(executor);
                Ok(())
            }
        }
    }

    pub fn get(&self, kind: &str) -> Option<SharedExecutor> {
        self.executors
            .get(&normalize_kind(kind))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn resolve(&self, kind: &str) -> SharedExecutor {
        self.get(kind).unwrap_or_else(|| {
            log::debug!("No executor for task kind '{}', using fallback", kind);
            Arc::clone(&self.fallback)
        })
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.executors.contains_key(&normalize_kind(kind))
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.executors.iter().map(|entry| entry.key().clone()).collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Sequencer task running `spec` through its executor.
    pub fn task_for(&self, spec: TaskSpec) -> Task {
        executor_task(self.resolve(&spec.task_kind), spec)
    }
}

pub fn executor_task(executor: SharedExecutor, spec: TaskSpec) -> Task {
    let name = format!("{}:{}", executor.kind(), spec.task_kind);
    Task::new(name, move |ctx| async move { executor.execute(&spec, ctx).await })
}

fn normalize_kind(kind: &str) -> String {
    kind.trim().to_lowercase()
}
