//! The runtime configuration surface (§6.3, §3a). Named and constructible, matching the shape of
//! `coclai_runtime::RuntimeConfig` in the retrieval pack: a plain struct with public fields and a
//! `with_*`-style builder chain, shared as `Arc<RuntimeConfig>` between a runtime's tasks.

use std::sync::Arc;
use std::time::Duration;

use crate::envelope::Envelope;
use crate::id::{IdGenerator, SharedIdGenerator, UuidV4Generator};
use crate::logger::{Logger, SharedLogger, TracingLogger};
use crate::middleware::Middleware;

/// Invoked for envelope `kind`s the runtime doesn't recognize (§4.5.3, §7.7).
pub type UnknownEnvelopeHook = Arc<dyn Fn(Envelope) + Send + Sync>;

#[derive(Clone)]
pub struct RuntimeConfig {
    /// Stamped on all outbound envelopes' `v`. Default 1.
    pub version: u32,
    /// Per-RPC timeout. `None` disables (default).
    pub timeout: Option<Duration>,
    /// Correlation-id generator. Default: random UUID v4.
    pub id_generator: SharedIdGenerator,
    /// Ordered middleware, applied in registration order on both directions.
    pub middlewares: Vec<Arc<dyn Middleware>>,
    /// Capability strings advertised in the initial `hello`.
    pub features: Vec<String>,
    /// Invoked for envelope kinds outside {`rpc_req`,`rpc_res`,`rpc_err`,`event`,`hello`}.
    pub on_unknown_envelope: Option<UnknownEnvelopeHook>,
    /// Logger; default forwards to `tracing`.
    pub logger: SharedLogger,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            version: 1,
            timeout: None,
            id_generator: Arc::new(UuidV4Generator),
            middlewares: Vec::new(),
            features: Vec::new(),
            on_unknown_envelope: None,
            logger: Arc::new(TracingLogger),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Arc::new(id_generator);
        self
    }

    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn with_on_unknown_envelope(mut self, hook: impl Fn(Envelope) + Send + Sync + 'static) -> Self {
        self.on_unknown_envelope = Some(Arc::new(hook));
        self
    }

    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_version_one_and_no_timeout() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.version, 1);
        assert!(cfg.timeout.is_none());
        assert!(cfg.middlewares.is_empty());
    }

    #[test]
    fn builder_chain_overrides_fields() {
        let cfg = RuntimeConfig::new()
            .with_version(2)
            .with_timeout(Duration::from_millis(50))
            .with_features(vec!["presence".into()]);
        assert_eq!(cfg.version, 2);
        assert_eq!(cfg.timeout, Some(Duration::from_millis(50)));
        assert_eq!(cfg.features, vec!["presence".to_string()]);
    }
}
