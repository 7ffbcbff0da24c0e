use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::binder::{ArgumentBinder, Bindings, Convertables};
use crate::config::ReplConfig;
use crate::context::InvocationContext;
use crate::dispatch::{ResultDispatcher, ResultHandler};
use crate::error::InternalResult;
use crate::evaluator::Evaluator;
use crate::scope::{ScopeHandle, ScopeProvider};
use crate::value::Value;

/// REPL state shared by every invocation: the scope provider, the last
/// dispatched result, and the handler that delivers results.
///
/// Concurrent invocations are not serialized against each other; whichever
/// dispatch finishes last owns `_`.
pub struct ReplFeature {
    config: ReplConfig,
    scope: RwLock<ScopeProvider>,
    last_result: RwLock<Value>,
    binder: ArgumentBinder,
    handler: Arc<dyn ResultHandler>,
}

impl ReplFeature {
    pub fn new(config: ReplConfig) -> Self {
        let handler = Arc::new(ResultDispatcher::new(&config));
        Self::with_handler(config, handler)
    }

    /// Uses `handler` in place of the default dispatcher.
    pub fn with_handler(config: ReplConfig, handler: Arc<dyn ResultHandler>) -> Self {
        Self {
            scope: RwLock::new(ScopeProvider::new(config.flags.retain)),
            last_result: RwLock::new(Value::Null),
            binder: ArgumentBinder::new(&config.flags.scope_prefix),
            handler,
            config,
        }
    }

    pub fn config(&self) -> &ReplConfig {
        &self.config
    }

    /// The retained scope, or a fresh one when retention is off.
    pub async fn scope(&self) -> ScopeHandle {
        self.scope.read().await.scope()
    }

    pub async fn is_retaining(&self) -> bool {
        self.scope.read().await.is_retaining()
    }

    /// Switches retention. Turning it on starts from an empty scope.
    /// Returns `false` when the feature was already in the requested mode.
    pub async fn set_retention(&self, retain: bool) -> bool {
        let mut provider = self.scope.write().await;
        if provider.is_retaining() == retain {
            return false;
        }
        *provider = ScopeProvider::new(retain);
        info!(retain, "variable retention changed");
        true
    }

    pub async fn last_result(&self) -> Value {
        self.last_result.read().await.clone()
    }

    pub async fn get_convertables(&self, ctx: &InvocationContext) -> (Bindings, Convertables) {
        let last_result = self.last_result().await;
        self.binder.bind(ctx, last_result)
    }

    /// Delivers one value and returns what should become `_`.
    pub async fn handle_result(&self, ctx: &InvocationContext, value: Value) -> InternalResult<Value> {
        self.handler.handle_result(ctx, value).await
    }

    /// Evaluates `source` and delivers every value it yields, in order.
    /// Returns how many values were delivered. The first error ends the run;
    /// values already delivered stay delivered.
    pub async fn execute(
        &self,
        ctx: &InvocationContext,
        evaluator: &dyn Evaluator,
        source: &str,
    ) -> InternalResult<usize> {
        let scope = self.scope().await;
        let (bindings, convertables) = self.get_convertables(ctx).await;
        debug!(
            invocation = %ctx.id,
            bindings = bindings.len(),
            convertables = convertables.len(),
            "starting evaluation"
        );

        let mut values = evaluator
            .evaluate(source, scope, bindings, &convertables)
            .await?;
        let mut delivered = 0;
        while let Some(value) = values.next().await {
            let retained = self.handle_result(ctx, value?).await?;
            *self.last_result.write().await = retained;
            delivered += 1;
        }
        debug!(invocation = %ctx.id, delivered, "evaluation finished");
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChannelRef, ChatError, MessageRef, MockChatClient, UserRef};
    use crate::dispatch::MockResultHandler;
    use crate::error::Error;
    use crate::evaluator::{EvalError, LiteralEvaluator};
    use pretty_assertions::assert_eq;

    fn context() -> InvocationContext {
        InvocationContext::from_message(
            Arc::new(MockChatClient::new()),
            UserRef::new(2, "me"),
            ChannelRef::new(20, "general"),
            MessageRef::new(10, 20, UserRef::new(1, "alice"), "!py"),
        )
    }

    fn retaining_config() -> ReplConfig {
        let mut config = ReplConfig::default();
        config.flags.retain = true;
        config
    }

    #[tokio::test]
    async fn test_retention_toggle() {
        let feature = ReplFeature::with_handler(
            ReplConfig::default(),
            Arc::new(MockResultHandler::new()),
        );
        assert!(!feature.is_retaining().await);
        assert!(!Arc::ptr_eq(&feature.scope().await, &feature.scope().await));

        assert!(feature.set_retention(true).await);
        assert!(!feature.set_retention(true).await);
        let retained = feature.scope().await;
        assert!(Arc::ptr_eq(&retained, &feature.scope().await));

        assert!(feature.set_retention(false).await);
        assert!(!Arc::ptr_eq(&retained, &feature.scope().await));
    }

    #[tokio::test]
    async fn test_turning_retention_on_starts_empty() {
        let feature = ReplFeature::with_handler(retaining_config(), Arc::new(MockResultHandler::new()));
        feature.scope().await.write().await.set("x", Value::Integer(1));
        feature.set_retention(false).await;
        feature.set_retention(true).await;
        assert!(feature.scope().await.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_last_result_is_what_the_handler_returns() {
        let mut handler = MockResultHandler::new();
        handler
            .expect_handle_result()
            .times(2)
            .returning(|_, value| Ok(Value::from(format!("sent {}", value.repr()))));
        let feature = ReplFeature::with_handler(ReplConfig::default(), Arc::new(handler));

        let delivered = feature
            .execute(&context(), &LiteralEvaluator::new(), "1; 2")
            .await
            .unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(feature.last_result().await, Value::from("sent 2"));
        let (bindings, _) = feature.get_convertables(&context()).await;
        assert_eq!(bindings.get("_"), Some(&Value::from("sent 2")));
    }

    #[tokio::test]
    async fn test_failed_dispatch_keeps_previous_result() {
        let mut handler = MockResultHandler::new();
        let mut calls = 0;
        handler.expect_handle_result().times(2).returning(move |_, value| {
            calls += 1;
            if calls == 1 {
                Ok(value)
            } else {
                Err(Error::Chat(ChatError::SendFailed("gone".to_string())))
            }
        });
        let feature = ReplFeature::with_handler(ReplConfig::default(), Arc::new(handler));

        let result = feature
            .execute(&context(), &LiteralEvaluator::new(), "1; 2; 3")
            .await;

        assert!(matches!(result, Err(Error::Chat(ChatError::SendFailed(_)))));
        assert_eq!(feature.last_result().await, Value::Integer(1));
    }

    #[tokio::test]
    async fn test_evaluation_error_stops_the_run() {
        let mut handler = MockResultHandler::new();
        handler
            .expect_handle_result()
            .times(1)
            .returning(|_, value| Ok(value));
        let feature = ReplFeature::with_handler(ReplConfig::default(), Arc::new(handler));

        let result = feature
            .execute(&context(), &LiteralEvaluator::new(), "\"ok\"; missing; 3")
            .await;

        assert!(matches!(
            result,
            Err(Error::Eval(EvalError::UndefinedName(name))) if name == "missing"
        ));
        assert_eq!(feature.last_result().await, Value::from("ok"));
    }

    #[tokio::test]
    async fn test_scope_survives_invocations_when_retaining() {
        let mut handler = MockResultHandler::new();
        handler.expect_handle_result().returning(|_, value| Ok(value));
        let feature = ReplFeature::with_handler(retaining_config(), Arc::new(handler));
        let evaluator = LiteralEvaluator::new();

        feature.execute(&context(), &evaluator, "x = 41").await.unwrap();
        feature.execute(&context(), &evaluator, "x").await.unwrap();
        assert_eq!(feature.last_result().await, Value::Integer(41));
    }

    #[tokio::test]
    async fn test_scope_is_dropped_without_retention() {
        let mut handler = MockResultHandler::new();
        handler.expect_handle_result().returning(|_, value| Ok(value));
        let feature = ReplFeature::with_handler(ReplConfig::default(), Arc::new(handler));
        let evaluator = LiteralEvaluator::new();

        feature.execute(&context(), &evaluator, "x = 41").await.unwrap();
        let result = feature.execute(&context(), &evaluator, "x").await;
        assert!(matches!(result, Err(Error::Eval(EvalError::UndefinedName(_)))));
    }
}
