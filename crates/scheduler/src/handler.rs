//! Task kind -> handler lookup.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tracing::debug;

use crate::error::TaskError;
use crate::model::Task;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, task: &Task) -> Result<(), TaskError>;
}

struct FnTaskHandler<F> {
    f: F,
}

#[async_trait]
impl<F> TaskHandler for FnTaskHandler<F>
where
    F: Fn(Task) -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync,
{
    async fn run(&self, task: &Task) -> Result<(), TaskError> {
        (self.f)(task.clone()).await
    }
}

/// Wrap an async closure as a [`TaskHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    Arc::new(FnTaskHandler {
        f: move |task: Task| -> BoxFuture<'static, Result<(), TaskError>> { Box::pin(f(task)) },
    })
}

#[derive(Default)]
pub struct TaskHandlerRegistry {
    handlers: DashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last registration for a kind wins.
    pub fn register(&self, kind: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), handler).is_some() {
            debug!(kind = %kind, "task handler replaced");
        }
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(kind).map(|entry| Arc::clone(entry.value()))
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        kinds.sort();
        kinds
    }
}
