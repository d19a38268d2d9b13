//! Handler registry for dispatching requests by service method.
//!
//! The registry maps method names to handlers. Each handler decodes the
//! request body into its own argument type, so the transport never needs to
//! know the shape of any payload.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Body;
use crate::error::{RpcError, Result};

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A decoded request waiting to run; resolves to the encoded reply.
pub type Call = BoxFuture<'static, Result<Body>>;

/// The capability the request pipeline dispatches to.
pub trait RequestHandler: Send + Sync + 'static {
    /// Decode `argument` for `service_method` and return the pending call.
    ///
    /// Runs on the connection's read loop, so it must not block. Errors
    /// returned here (unknown method, argument of the wrong shape) are
    /// answered immediately; errors from the returned call are answered
    /// when it completes.
    fn handle(&self, service_method: &str, argument: Body) -> Result<Call>;
}

impl<F> RequestHandler for F
where
    F: Fn(&str, Body) -> Result<Call> + Send + Sync + 'static,
{
    fn handle(&self, service_method: &str, argument: Body) -> Result<Call> {
        self(service_method, argument)
    }
}

/// Trait for registered method handlers.
pub trait Handler: Send + Sync + 'static {
    /// Decode the argument and start the call.
    fn call(&self, argument: &Body) -> Result<Call>;
}

/// Wrapper that decodes the argument before calling the handler and
/// encodes the reply in the same format.
pub struct TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    fn call(&self, argument: &Body) -> Result<Call> {
        let codec_type = argument.codec_type();
        let parsed: T = argument.decode()?;

        let fut = (self.handler)(parsed);
        Ok(Box::pin(async move {
            let reply = fut.await?;
            Body::encode(codec_type, &reply)
        }))
    }
}

/// Registry mapping service method names to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    methods: HashMap<String, Box<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for a service method.
    ///
    /// Registering the same name twice replaces the earlier handler.
    pub fn register<F, T, R, Fut>(&mut self, service_method: &str, handler: F) -> &mut Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.methods
            .insert(service_method.to_string(), Box::new(TypedHandler::new(handler)));
        self
    }

    /// Get a handler by service method.
    pub fn get(&self, service_method: &str) -> Option<&dyn Handler> {
        self.methods.get(service_method).map(|h| h.as_ref())
    }

    /// Whether a service method is registered.
    pub fn contains(&self, service_method: &str) -> bool {
        self.methods.contains_key(service_method)
    }

    /// Registered service method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl RequestHandler for HandlerRegistry {
    fn handle(&self, service_method: &str, argument: Body) -> Result<Call> {
        let handler = self
            .get(service_method)
            .ok_or_else(|| RpcError::HandlerNotFound(service_method.to_string()))?;

        handler.call(&argument)
    }
}
