//! Handler module - inbound request handling.
//!
//! Provides:
//! - [`HandlerRegistry`] - maps message types and HDLC addresses to handlers
//! - [`RequestContext`] - lets handlers reply or start their own exchanges
//!
//! # Example
//!
//! ```
//! use b2b_link::codec::TimeSet;
//! use b2b_link::handler::HandlerRegistry;
//! use b2b_link::protocol::MessageType;
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register(MessageType::TimeReq, |_: (), ctx| async move {
//!     ctx.respond_time(&TimeSet::now()).await
//! });
//!
//! registry.register(MessageType::TimeSync, |time: TimeSet, _ctx| async move {
//!     println!("peer time {}", time.seconds);
//!     Ok(())
//! });
//! ```

mod context;
mod registry;

pub use context::RequestContext;
pub use registry::{BoxFuture, FromBody, Handler, HandlerRegistry, HandlerResult, TypedHandler};
