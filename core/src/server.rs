//! The server runtime (§4.5). Accepting connections is out of scope (§1 Non-goals) — the
//! application hands each already-established transport to [`ServerRuntime::add_connection`],
//! which wraps it in the shared dispatcher and returns a handle for calling into that one peer.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::contract::Contract;
use crate::engine::{Engine, EventHandlerFn, FixedEventSink, Role, RpcHandlerMap};
use crate::envelope::Payload;
use crate::error::RpcError;
use crate::transport::Transport;
use crate::RuntimeConfig;

/// One established peer connection (§4.5). Each `Connection` owns its own [`Engine`] and
/// inbound-dispatch task; calling into one connection never blocks another.
#[derive(Clone)]
pub struct Connection {
    engine: Arc<Engine>,
    dispatch_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Connection {
    /// Calls an `rpcToClient` endpoint on this connection's peer (§4.5.2).
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

    /// Emits an event to this connection's peer. Failures are logged, never surfaced (§4.5.2).
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

    /// The capability list most recently advertised by this peer's `hello`.
    pub async fn peer_features(&self) -> Vec<String> {
        self.engine.peer_features().await
    }

    /// Closes this connection only, rejecting its own outstanding calls (§4.5.5).
    pub async fn close(&self) {
        self.engine.shutdown(RpcError::Shutdown).await;
        if let Some(handle) = self.dispatch_task.lock().await.take() {
            handle.abort();
        }
    }
}

/// The server side of the runtime pair (§4.5). One `ServerRuntime` serves many connections
/// against a single shared [`Contract`] and fixed `rpcToServer`/event handler set.
pub struct ServerRuntime {
    contract: Arc<Contract>,
    config: Arc<RuntimeConfig>,
    rpc_handlers: Arc<RpcHandlerMap>,
    event_handlers: Arc<HashMap<String, EventHandlerFn>>,
    connections: Mutex<Vec<Connection>>,
}

impl ServerRuntime {
    /// `rpc_handlers` answers `rpcToServer` requests; `event_handlers` answers client-emitted
    /// events (§4.5.4: "the server holds a fixed map supplied at construction," unlike the
    /// client's dynamic subscribe/dispose registry).
    pub fn new(
        contract: Arc<Contract>,
        config: RuntimeConfig,
        rpc_handlers: RpcHandlerMap,
        event_handlers: HashMap<String, EventHandlerFn>,
    ) -> Self {
        ServerRuntime {
            contract,
            config: Arc::new(config),
            rpc_handlers: Arc::new(rpc_handlers),
            event_handlers: Arc::new(event_handlers),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Wraps `transport` in a new connection, sends its `hello`, and spawns its inbound-dispatch
    /// task (§4.5.1). The returned handle can call into and emit toward that one peer.
    pub async fn add_connection(&self, transport: Arc<dyn Transport>) -> Connection {
        let event_sink = Arc::new(FixedEventSink((*self.event_handlers).clone()));
        let engine = Engine::new(
            Role::Server,
            transport,
            Arc::clone(&self.config),
            Arc::clone(&self.contract),
            Arc::clone(&self.rpc_handlers),
            event_sink,
        );

        let dispatch_task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run().await })
        };

        engine.send_hello().await;

        let connection = Connection { engine, dispatch_task: Arc::new(Mutex::new(Some(dispatch_task))) };
        self.connections.lock().await.push(connection.clone());
        connection
    }

    /// Closes every connection currently tracked by this runtime.
    pub async fn close(&self) {
        let connections: Vec<Connection> = self.connections.lock().await.drain(..).collect();
        for connection in connections {
            connection.close().await;
        }
    }

    /// Number of connections currently tracked (primarily for tests).
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Contract;

    fn empty_contract() -> Arc<Contract> {
        Arc::new(Contract::builder().build())
    }

    #[tokio::test]
    async fn new_server_runtime_tracks_no_connections() {
        let server = ServerRuntime::new(empty_contract(), RuntimeConfig::default(), HashMap::new(), HashMap::new());
        assert_eq!(server.connection_count().await, 0);
    }
}
