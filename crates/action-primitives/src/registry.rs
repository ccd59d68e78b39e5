//! Name-indexed action dispatch.
//!
//! Handlers are written against a typed [`Action`] and erased into
//! [`DynActionHandler`] so one table can hold every action kind. The same
//! [`ActionExecutor`] type serves the background and the content context.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use scavbot_core_types::{error_response, GenericStatusPayload, StatusPayload};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::ActionContext;

/// Status message returned for names with no registered handler.
pub const ACTION_NOT_SUPPORTED: &str = "action not supported";

/// A named, typed unit of automation.
pub trait Action: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Wire name used in `command` messages.
    const NAME: &'static str;
    type Response: Serialize + DeserializeOwned + Send + Sync + 'static;
}

#[async_trait]
pub trait ActionHandler<A: Action>: Send + Sync {
    async fn execute(&self, action: A, ctx: &ActionContext) -> GenericStatusPayload<A::Response>;
}

/// Object-safe handler over raw JSON parameters.
#[async_trait]
pub trait DynActionHandler: Send + Sync {
    async fn execute_dyn(&self, parameters: Value, ctx: &ActionContext) -> StatusPayload;
}

struct TypedActionHandler<A, H> {
    handler: H,
    _marker: PhantomData<fn() -> A>,
}

#[async_trait]
impl<A, H> DynActionHandler for TypedActionHandler<A, H>
where
    A: Action,
    H: ActionHandler<A>,
{
    async fn execute_dyn(&self, parameters: Value, ctx: &ActionContext) -> StatusPayload {
        let action: A = match serde_json::from_value(parameters) {
            Ok(action) => action,
            Err(err) => {
                warn!(action_id = %ctx.action_id, action = A::NAME, %err, "invalid action parameters");
                return error_response(format!("invalid parameters for {}: {err}", A::NAME));
            }
        };
        self.handler.execute(action, ctx).await.into_untyped()
    }
}

/// Dispatch table from action name to handler.
#[derive(Default)]
pub struct ActionExecutor {
    handlers: DashMap<String, Arc<dyn DynActionHandler>>,
}

impl ActionExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `A::NAME`. Last registration wins; returns
    /// whether a previous handler was replaced.
    pub fn register<A, H>(&self, handler: H) -> bool
    where
        A: Action,
        H: ActionHandler<A> + 'static,
    {
        self.register_dyn(
            A::NAME,
            Arc::new(TypedActionHandler {
                handler,
                _marker: PhantomData,
            }),
        )
    }

    pub fn register_dyn(&self, name: impl Into<String>, handler: Arc<dyn DynActionHandler>) -> bool {
        let name = name.into();
        let replaced = self.handlers.insert(name.clone(), handler).is_some();
        if replaced {
            debug!(action = %name, "action handler replaced");
        }
        replaced
    }

    pub fn can_handle_action(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn registered_actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Run the handler for `name`. Always yields a status payload; an
    /// unregistered name yields `error` / [`ACTION_NOT_SUPPORTED`].
    pub async fn execute(&self, ctx: &ActionContext, name: &str, parameters: Value) -> StatusPayload {
        // Clone out of the map so no shard lock is held across the await.
        let handler = self.handlers.get(name).map(|entry| Arc::clone(entry.value()));
        match handler {
            Some(handler) => handler.execute_dyn(parameters, ctx).await,
            None => {
                warn!(action_id = %ctx.action_id, action = name, "no handler registered");
                error_response(ACTION_NOT_SUPPORTED)
            }
        }
    }

    /// Typed convenience over [`ActionExecutor::execute`].
    pub async fn execute_action<A: Action>(
        &self,
        ctx: &ActionContext,
        action: &A,
    ) -> GenericStatusPayload<A::Response> {
        let parameters = match serde_json::to_value(action) {
            Ok(parameters) => parameters,
            Err(err) => return error_response(format!("parameter encode failed: {err}")),
        };
        let payload = self.execute(ctx, A::NAME, parameters).await;
        let status_message = payload.status_message.clone();
        payload.decode().unwrap_or_else(|err| {
            error_response(format!(
                "response decode failed: {err}{}",
                status_message
                    .map(|m| format!(" ({m})"))
                    .unwrap_or_default()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoopOutbox;
    use crate::page::InMemoryPage;
    use scavbot_core_types::{done_response, ActionId, FullDomain, Status};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct Echo {
        text: String,
    }

    impl Action for Echo {
        const NAME: &'static str = "echo";
        type Response = String;
    }

    struct Upper;
    struct Lower;

    #[async_trait]
    impl ActionHandler<Echo> for Upper {
        async fn execute(&self, action: Echo, _ctx: &ActionContext) -> GenericStatusPayload<String> {
            done_response(action.text.to_uppercase())
        }
    }

    #[async_trait]
    impl ActionHandler<Echo> for Lower {
        async fn execute(&self, action: Echo, _ctx: &ActionContext) -> GenericStatusPayload<String> {
            done_response(action.text.to_lowercase())
        }
    }

    fn ctx() -> ActionContext {
        ActionContext::new(
            ActionId::new(),
            FullDomain::new("pl201.plemiona.pl"),
            Arc::new(InMemoryPage::new("https://pl201.plemiona.pl/game.php")),
            Arc::new(NoopOutbox),
        )
    }

    #[tokio::test]
    async fn unregistered_action_resolves_with_error_status() {
        let executor = ActionExecutor::new();
        assert!(!executor.can_handle_action("echo"));

        let payload = executor.execute(&ctx(), "echo", json!({ "text": "x" })).await;
        assert_eq!(payload.status, Status::Error);
        assert_eq!(payload.status_message.as_deref(), Some(ACTION_NOT_SUPPORTED));
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let executor = ActionExecutor::new();
        assert!(!executor.register::<Echo, _>(Upper));
        assert!(executor.register::<Echo, _>(Lower));
        assert_eq!(executor.registered_actions(), vec!["echo".to_string()]);

        let payload = executor
            .execute_action(&ctx(), &Echo { text: "MiXeD".into() })
            .await;
        assert_eq!(payload.details.as_deref(), Some("mixed"));
    }

    #[tokio::test]
    async fn malformed_parameters_become_error_status() {
        let executor = ActionExecutor::new();
        executor.register::<Echo, _>(Upper);
        let payload = executor.execute(&ctx(), "echo", json!({ "wrong": 1 })).await;
        assert_eq!(payload.status, Status::Error);
        assert!(payload
            .status_message
            .unwrap()
            .starts_with("invalid parameters for echo"));
    }
}
