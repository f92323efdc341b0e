//! The client runtime (§4.5). Calls `rpcToServer` endpoints, answers `rpcToClient` requests the
//! server initiates, and supports dynamic event subscription (§4.5.4).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::contract::Contract;
use crate::engine::{Engine, EventHandlerFn, EventSink, Role, RpcHandlerMap};
use crate::envelope::Payload;
use crate::error::RpcError;
use crate::transport::Transport;
use crate::RuntimeConfig;

/// Client-side event dispatch (§4.5.4): a dynamic, subscribe/dispose registry. "Multiple
/// subscribers per channel are allowed; they are invoked sequentially in registration order; an
/// exception in one does not prevent the others from running" — preserved here as the Open
/// Question decision to keep serial `await`ed invocation (SPEC_FULL.md §9).
#[derive(Default)]
struct SubscriberRegistry {
    subscribers: Mutex<HashMap<String, Vec<(u64, EventHandlerFn)>>>,
    next_id: AtomicU64,
}

#[async_trait]
impl EventSink for SubscriberRegistry {
    // Handlers run with a plain `.await`, no `catch_unwind` boundary: a handler that panics
    // unwinds this connection's dispatch task rather than merely skipping that one subscriber.
    async fn dispatch(&self, channel: &str, payload: Payload) -> bool {
        let handlers: Vec<EventHandlerFn> = {
            let guard = self.subscribers.lock().await;
            match guard.get(channel) {
                Some(v) if !v.is_empty() => v.iter().map(|(_, h)| Arc::clone(h)).collect(),
                _ => return false,
            }
        };
        for handler in handlers {
            handler(payload.clone()).await;
        }
        true
    }

    async fn has_handler(&self, channel: &str) -> bool {
        self.subscribers.lock().await.get(channel).is_some_and(|v| !v.is_empty())
    }
}

impl SubscriberRegistry {
    async fn subscribe(&self, channel: String, handler: EventHandlerFn) -> (String, u64) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().await.entry(channel.clone()).or_default().push((id, handler));
        (channel, id)
    }

    async fn unsubscribe(&self, channel: &str, id: u64) {
        if let Some(v) = self.subscribers.lock().await.get_mut(channel) {
            v.retain(|(existing, _)| *existing != id);
        }
    }
}

/// Disposer returned by [`ClientRuntime::subscribe`]. Dropping it without calling `dispose`
/// leaves the subscription active — call `dispose` explicitly to stop receiving events.
pub struct Subscription {
    registry: Arc<SubscriberRegistry>,
    channel: String,
    id: u64,
}

impl Subscription {
    pub async fn dispose(self) {
        self.registry.unsubscribe(&self.channel, self.id).await;
    }
}

/// The client side of the runtime pair (§4.5).
pub struct ClientRuntime {
    engine: Arc<Engine>,
    subscribers: Arc<SubscriberRegistry>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientRuntime {
    /// Connects over `transport`, immediately sending the initial `hello` (§4.5.1), and spawns
    /// the inbound-dispatch task. `rpc_handlers` answers `rpcToClient` requests the server
    /// initiates (§4.5.3 symmetry: "the client dispatches `rpc_req` against `rpcToClient`
    /// handlers").
    pub async fn connect(
        transport: Arc<dyn Transport>,
        contract: Arc<Contract>,
        config: RuntimeConfig,
        rpc_handlers: RpcHandlerMap,
    ) -> Self {
        let subscribers = Arc::new(SubscriberRegistry::default());
        let engine = Engine::new(
            Role::Client,
            transport,
            Arc::new(config),
            contract,
            Arc::new(rpc_handlers),
            subscribers.clone(),
        );

        let dispatch_task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run().await })
        };

        engine.send_hello().await;

        ClientRuntime { engine, subscribers, dispatch_task: Mutex::new(Some(dispatch_task)) }
    }

    /// Calls an `rpcToServer` endpoint with a typed request, returning the validated, typed
    /// response (§4.5.2).
    pub async fn call<Req, Res>(&self, channel: &str, request: Req) -> Result<Res, RpcError>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)
            .map_err(|e| RpcError::Transport(format!("failed to encode request: {e}")))?;
        let response = self.call_raw(channel, payload).await?;
        serde_json::from_value(response)
            .map_err(|e| RpcError::Transport(format!("failed to decode response: {e}")))
    }

    /// Untyped variant of [`Self::call`], operating directly on JSON payloads.
    pub async fn call_raw(&self, channel: &str, payload: Payload) -> Result<Payload, RpcError> {
        self.engine.call(channel, payload).await
    }

    /// Emits a fire-and-forget event. Validation/middleware/send failures are logged, never
    /// surfaced to the caller (§4.5.2).
    pub fn emit<P: Serialize>(&self, channel: impl Into<String>, payload: P) {
        let channel = channel.into();
        match serde_json::to_value(payload) {
            Ok(value) => {
                self.engine.emit(channel, value);
            }
            Err(e) => {
                tracing::error!("failed to encode event payload for '{channel}': {e}");
            }
        }
    }

    /// Subscribes `handler` to `channel`. Multiple subscribers are invoked sequentially in
    /// registration order (§4.5.4); malformed payloads (failing to decode as `P`) are dropped
    /// for that one handler.
    pub async fn subscribe<P, F>(&self, channel: impl Into<String>, handler: F) -> Subscription
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) + Send + Sync + 'static,
    {
        let channel = channel.into();
        let handler = Arc::new(handler);
        let boxed: EventHandlerFn = Arc::new(move |payload: Payload| {
            let handler = Arc::clone(&handler);
            let parsed = serde_json::from_value::<P>(payload);
            Box::pin(async move {
                if let Ok(value) = parsed {
                    handler(value);
                }
            }) as BoxFuture<'static, ()>
        });
        let (channel, id) = self.subscribers.subscribe(channel, boxed).await;
        Subscription { registry: Arc::clone(&self.subscribers), channel, id }
    }

    /// The capability list most recently advertised by the server's `hello`.
    pub async fn peer_features(&self) -> Vec<String> {
        self.engine.peer_features().await
    }

    /// Closes the transport and rejects every outstanding call with a shutdown error (§4.5.5).
    /// Idempotent: a second call is a no-op beyond re-running transport close.
    pub async fn close(&self) {
        self.engine.shutdown(RpcError::Shutdown).await;
        if let Some(handle) = self.dispatch_task.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_registry_invokes_multiple_subscribers_in_order() {
        let registry = SubscriberRegistry::default();
        let observed = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let observed = observed.clone();
            let handler: EventHandlerFn = Arc::new(move |_payload| {
                let observed = observed.clone();
                Box::pin(async move {
                    observed.lock().await.push(i);
                })
            });
            registry.subscribe("chat".into(), handler).await;
        }

        let dispatched = registry.dispatch("chat", serde_json::json!(null)).await;
        assert!(dispatched);
        assert_eq!(*observed.lock().await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn dispatch_on_unknown_channel_reports_no_subscriber() {
        let registry = SubscriberRegistry::default();
        assert!(!registry.dispatch("nope", serde_json::json!(null)).await);
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_invocations() {
        let registry = Arc::new(SubscriberRegistry::default());
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        let handler: EventHandlerFn = Arc::new(move |_| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                *calls.lock().await += 1;
            })
        });
        let (channel, id) = registry.subscribe("chat".into(), handler).await;
        registry.dispatch("chat", serde_json::json!(null)).await;
        registry.unsubscribe(&channel, id).await;
        let dispatched_after = registry.dispatch("chat", serde_json::json!(null)).await;
        assert!(!dispatched_after);
        assert_eq!(*calls.lock().await, 1);
    }
}
