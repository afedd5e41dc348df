//! Wrappers applied around every registered handler.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Instant};

use futures::FutureExt;
use serde_json::Value;
use tracing::{error, info, warn};

use super::{BoxedHandler, HandlerContext, HandlerError, HandlerFuture};

/// Decorates a handler.
pub trait Middleware: Send + Sync {
    /// Wrap `next`, the handler registered for `message_type`.
    fn wrap(&self, message_type: &'static str, next: BoxedHandler) -> BoxedHandler;
}

/// Ordered middleware; the first added runs outermost.
#[derive(Default, Clone)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    /// Chain without middleware.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware inside the ones already added.
    pub fn then(mut self, middleware: impl Middleware + 'static) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Wrap `handler` with every layer.
    pub fn apply(&self, message_type: &'static str, handler: BoxedHandler) -> BoxedHandler {
        self.layers
            .iter()
            .rev()
            .fold(handler, |next, layer| layer.wrap(message_type, next))
    }
}

/// Turns a handler panic into [`HandlerError::PanicRecovered`].
pub struct Recovery;

impl Middleware for Recovery {
    fn wrap(&self, message_type: &'static str, next: BoxedHandler) -> BoxedHandler {
        Arc::new(move |ctx: HandlerContext, payload: Value| -> HandlerFuture {
            let next = next.clone();
            let player_id = ctx.player_id;
            Box::pin(async move {
                let call = AssertUnwindSafe(async move { next.call(ctx, payload).await });
                match call.catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(message_type, %player_id, panic = %message, "handler panicked");
                        Err(HandlerError::PanicRecovered(message))
                    }
                }
            })
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Logs every handled message with its outcome and latency.
pub struct Logging;

impl Middleware for Logging {
    fn wrap(&self, message_type: &'static str, next: BoxedHandler) -> BoxedHandler {
        Arc::new(move |ctx: HandlerContext, payload: Value| -> HandlerFuture {
            let next = next.clone();
            Box::pin(async move {
                let player_id = ctx.player_id;
                let started = Instant::now();
                let result = next.call(ctx, payload).await;
                let latency_ms = started.elapsed().as_millis() as u64;
                match &result {
                    Ok(()) => info!(message_type, %player_id, latency_ms, "message handled"),
                    Err(err) => warn!(
                        message_type,
                        %player_id,
                        latency_ms,
                        code = err.code(),
                        kind = ?err.kind(),
                        error = %err,
                        "message failed"
                    ),
                }
                result
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use uuid::Uuid;

    use super::*;
    use crate::{state::AppState, telemetry::TraceContext};

    fn context() -> HandlerContext {
        HandlerContext {
            state: AppState::for_tests(),
            player_id: Uuid::now_v7(),
            locale: None,
            trace: TraceContext::default(),
        }
    }

    fn panicking() -> BoxedHandler {
        Arc::new(|_ctx: HandlerContext, _payload: Value| -> HandlerFuture {
            Box::pin(async { panic!("boom") })
        })
    }

    struct Record(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl Middleware for Record {
        fn wrap(&self, _message_type: &'static str, next: BoxedHandler) -> BoxedHandler {
            let (name, log) = (self.0, self.1.clone());
            Arc::new(move |ctx: HandlerContext, payload: Value| -> HandlerFuture {
                log.lock().unwrap().push(name);
                next.call(ctx, payload)
            })
        }
    }

    #[tokio::test]
    async fn recovery_converts_panics() {
        let handler = Chain::new().then(Recovery).apply("boom", panicking());
        let err = handler.call(context(), Value::Null).await.unwrap_err();
        assert!(matches!(err, HandlerError::PanicRecovered(ref m) if m == "boom"));
        assert_eq!(err.code(), "PANIC_RECOVERED");
    }

    #[tokio::test]
    async fn first_layer_runs_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner: BoxedHandler = Arc::new(|_ctx: HandlerContext, _payload: Value| -> HandlerFuture {
            Box::pin(async { Ok(()) })
        });
        let handler = Chain::new()
            .then(Record("outer", log.clone()))
            .then(Record("inner", log.clone()))
            .then(Logging)
            .apply("noop", inner);

        handler.call(context(), Value::Null).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
    }
}
