//! Contract registry (§3, §4.2). Declarative description of RPC endpoints and event channels,
//! each carrying up to two validators.
//!
//! Per Design Note #1 the typed, reflection-based method-proxy idea from the distilled design
//! becomes a string-keyed dispatch map over an opaque `Payload` here; `ClientRuntime`/`Connection`
//! lay small generic, typed wrappers (`call`, `emit`, ...) on top of this map.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::envelope::Payload;
use crate::error::ValidationError;

type ValidatorFn =
    Arc<dyn Fn(String, Payload) -> BoxFuture<'static, Result<Payload, ValidationError>> + Send + Sync>;

/// Up to two validators for one payload slot (a request, a response, or an event payload).
///
/// "Validators are pure functions (possibly async) that return the validated/normalized value or
/// fail with a validation error. When both a function and a schema validator are present the
/// function takes precedence; the schema is consulted only if no function is provided." (§3)
#[derive(Clone, Default)]
pub struct Validator {
    function: Option<ValidatorFn>,
    schema: Option<ValidatorFn>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("has_function", &self.function.is_some())
            .field("has_schema", &self.schema.is_some())
            .finish()
    }
}

impl Validator {
    /// No validation: the payload passes through unchanged.
    pub fn none() -> Self {
        Validator { function: None, schema: None }
    }

    /// A synchronous validator over the typed payload. Wrapping/unwrapping JSON happens here so
    /// callers write ordinary `T -> Result<T, String>` closures.
    pub fn function<T, F>(f: F) -> Self
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(T) -> Result<T, String> + Send + Sync + 'static,
    {
        Validator {
            function: Some(wrap_typed(f)),
            schema: None,
        }
    }

    /// An async validator over the typed payload.
    pub fn async_function<T, F, Fut>(f: F) -> Self
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, String>> + Send + 'static,
    {
        Validator {
            function: Some(wrap_typed_async(f)),
            schema: None,
        }
    }

    /// A Standard-Schema-style fallback validator, consulted only when no `function` validator
    /// is set (§3).
    pub fn schema<T, F>(f: F) -> Self
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(T) -> Result<T, String> + Send + Sync + 'static,
    {
        Validator {
            function: None,
            schema: Some(wrap_typed(f)),
        }
    }

    /// Both a function and a schema validator; the function takes precedence at validation time.
    pub fn with_fallback(mut self, schema: Validator) -> Self {
        self.schema = schema.function.or(schema.schema);
        self
    }

    pub async fn validate(&self, channel: &str, payload: Payload) -> Result<Payload, ValidationError> {
        if let Some(f) = &self.function {
            return f(channel.to_string(), payload).await;
        }
        if let Some(s) = &self.schema {
            return s(channel.to_string(), payload).await;
        }
        Ok(payload)
    }
}

fn wrap_typed<T, F>(f: F) -> ValidatorFn
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn(T) -> Result<T, String> + Send + Sync + 'static,
{
    Arc::new(move |channel: String, payload: Payload| {
        let f = &f;
        let result = serde_json::from_value::<T>(payload)
            .map_err(|e| ValidationError::new(channel.clone(), format!("payload did not match expected shape: {e}")))
            .and_then(|value| {
                f(value).map_err(|msg| ValidationError::new(channel.clone(), msg))
            })
            .and_then(|validated| {
                serde_json::to_value(validated)
                    .map_err(|e| ValidationError::new(channel.clone(), format!("failed to re-encode validated payload: {e}")))
            });
        Box::pin(async move { result })
    })
}

fn wrap_typed_async<T, F, Fut>(f: F) -> ValidatorFn
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<T, String>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |channel: String, payload: Payload| {
        let f = Arc::clone(&f);
        Box::pin(async move {
            let value = serde_json::from_value::<T>(payload).map_err(|e| {
                ValidationError::new(channel.clone(), format!("payload did not match expected shape: {e}"))
            })?;
            let validated = f(value).await.map_err(|msg| ValidationError::new(channel.clone(), msg))?;
            serde_json::to_value(validated).map_err(|e| {
                ValidationError::new(channel.clone(), format!("failed to re-encode validated payload: {e}"))
            })
        })
    })
}

/// A single entry in a contract describing one RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcDescriptor {
    pub name: String,
    pub request_validator: Validator,
    pub response_validator: Validator,
}

/// A single entry in a contract describing one event channel.
#[derive(Debug, Clone)]
pub struct EventDescriptor {
    pub name: String,
    pub validator: Validator,
}

/// Declares an RPC endpoint named `name` with no validation. Chain `.request(...)` /
/// `.response(...)` to attach validators (§4.2).
pub fn rpc(name: impl Into<String>) -> RpcDescriptor {
    RpcDescriptor {
        name: name.into(),
        request_validator: Validator::none(),
        response_validator: Validator::none(),
    }
}

impl RpcDescriptor {
    pub fn request(mut self, validator: Validator) -> Self {
        self.request_validator = validator;
        self
    }

    pub fn response(mut self, validator: Validator) -> Self {
        self.response_validator = validator;
        self
    }
}

/// Declares an event channel named `name` with no validation.
pub fn event(name: impl Into<String>) -> EventDescriptor {
    EventDescriptor {
        name: name.into(),
        validator: Validator::none(),
    }
}

impl EventDescriptor {
    pub fn payload(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }
}

/// The compile-time-typed description of all RPC endpoints and event channels, in both
/// directions (§3). Built once at application boot and treated as immutable thereafter.
#[derive(Debug, Clone, Default)]
pub struct Contract {
    pub rpc_to_server: HashMap<String, RpcDescriptor>,
    pub rpc_to_client: HashMap<String, RpcDescriptor>,
    pub events: HashMap<String, EventDescriptor>,
}

impl Contract {
    pub fn builder() -> ContractBuilder {
        ContractBuilder::default()
    }
}

/// Identity helper that assembles a `Contract` from its three declaration maps (§4.2).
#[derive(Default)]
pub struct ContractBuilder {
    rpc_to_server: HashMap<String, RpcDescriptor>,
    rpc_to_client: HashMap<String, RpcDescriptor>,
    events: HashMap<String, EventDescriptor>,
}

impl ContractBuilder {
    pub fn rpc_to_server(mut self, descriptor: RpcDescriptor) -> Self {
        self.rpc_to_server.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn rpc_to_client(mut self, descriptor: RpcDescriptor) -> Self {
        self.rpc_to_client.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn event(mut self, descriptor: EventDescriptor) -> Self {
        self.events.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn build(self) -> Contract {
        Contract {
            rpc_to_server: self.rpc_to_server,
            rpc_to_client: self.rpc_to_client,
            events: self.events,
        }
    }
}
