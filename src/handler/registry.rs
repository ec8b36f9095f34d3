//! Handler registry for dispatching inbound requests.
//!
//! Request handlers are keyed by B2B message type; handlers for traffic on
//! other HDLC addresses (such as the network tunnel) are keyed by address.
//!
//! # Example
//!
//! ```
//! use b2b_link::codec::{GetStatus, ParamRequest};
//! use b2b_link::handler::HandlerRegistry;
//! use b2b_link::protocol::MessageType;
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register(MessageType::GetReq, |req: ParamRequest, ctx| async move {
//!     ctx.respond_get(GetStatus::NotSupported, req.reading_type, &[]).await
//! });
//!
//! assert!(registry.has_handler(MessageType::GetReq.as_u16()));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use bytes::Bytes;

use super::RequestContext;
use crate::codec::{ParamRequest, TimeSet};
use crate::error::{B2bError, Result};
use crate::protocol::MessageType;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle a request with the raw body bytes.
    fn call(&self, body: Bytes, ctx: RequestContext) -> BoxFuture<'static, HandlerResult>;
}

/// Message bodies a handler can take as its first argument.
pub trait FromBody: Sized + Send + 'static {
    /// Decode the body that followed the packet header.
    fn from_body(body: Bytes) -> Result<Self>;
}

impl FromBody for () {
    fn from_body(_body: Bytes) -> Result<Self> {
        Ok(())
    }
}

impl FromBody for Bytes {
    fn from_body(body: Bytes) -> Result<Self> {
        Ok(body)
    }
}

impl FromBody for ParamRequest {
    fn from_body(body: Bytes) -> Result<Self> {
        ParamRequest::decode(body)
    }
}

impl FromBody for TimeSet {
    fn from_body(body: Bytes) -> Result<Self> {
        TimeSet::decode(&body).ok_or_else(|| {
            B2bError::Protocol(format!("Time body too short: {} bytes", body.len()))
        })
    }
}

/// Wrapper that decodes the body before calling the handler.
pub struct TypedHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: FromBody,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: FromBody,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut> Handler for TypedHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: FromBody,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, body: Bytes, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        let parsed = match T::from_body(body) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        Box::pin((self.handler)(parsed, ctx))
    }
}

/// Registry mapping message types and addresses to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    /// Request handlers by raw message type.
    requests: HashMap<u16, Box<dyn Handler>>,
    /// Handlers for frames on addresses other than the B2B address.
    non_b2b: HashMap<u8, Box<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a request message type.
    ///
    /// Replaces any handler already registered for `kind`. Response types
    /// are routed to the correlator and never reach the registry.
    pub fn register<F, T, Fut>(&mut self, kind: MessageType, handler: F)
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: FromBody,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if kind.is_response() {
            tracing::warn!("Handler for response type {:?} will never be called", kind);
        }
        self.requests
            .insert(kind.as_u16(), Box::new(TypedHandler::new(handler)));
    }

    /// Register a handler for raw frames received on `address`.
    ///
    /// The handler receives the whole information field.
    pub fn register_non_b2b<F, Fut>(&mut self, address: u8, handler: F)
    where
        F: Fn(Bytes, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.non_b2b
            .insert(address, Box::new(TypedHandler::new(handler)));
    }

    /// Check if a handler exists for a raw message type.
    pub fn has_handler(&self, message_type: u16) -> bool {
        self.requests.contains_key(&message_type)
    }

    /// Check if a handler exists for an HDLC address.
    pub fn has_non_b2b_handler(&self, address: u8) -> bool {
        self.non_b2b.contains_key(&address)
    }

    /// Get a request handler by raw message type.
    pub fn get_handler(&self, message_type: u16) -> Option<&dyn Handler> {
        self.requests.get(&message_type).map(|h| h.as_ref())
    }

    /// Number of registered request handlers.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check if no request handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Dispatch a request body to the handler for its message type.
    pub async fn dispatch(&self, message_type: u16, body: Bytes, ctx: RequestContext) -> Result<()> {
        let handler = self
            .get_handler(message_type)
            .ok_or(B2bError::HandlerNotFound(message_type))?;

        handler.call(body, ctx).await
    }

    /// Dispatch a non-B2B frame to the handler for its address.
    pub async fn dispatch_non_b2b(&self, address: u8, data: Bytes, ctx: RequestContext) -> Result<()> {
        let handler = self.non_b2b.get(&address).ok_or_else(|| {
            B2bError::Protocol(format!("No handler for HDLC address {}", address))
        })?;

        handler.call(data, ctx).await
    }
}
