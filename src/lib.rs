//! # b2b-link
//!
//! Async Rust implementation of the Aclara board-to-board (B2B) protocol.
//!
//! Two boards exchange request/response packets over a serial byte stream.
//! Each packet carries a 7-byte Big Endian header and travels inside an HDLC
//! frame.
//!
//! ## Architecture
//!
//! - **Framing** ([`protocol`]): HDLC flags, byte stuffing and CRC-16/X.25
//! - **Packets** ([`protocol`], [`codec`]): header and message bodies
//! - **Exchanges** ([`correlator`], [`message`]): one outstanding request at
//!   a time, matched on type and handle, with retries and timeouts
//! - **Inbound** ([`dispatch`], [`handler`]): responses go to the waiting
//!   requester, requests go to registered handlers
//! - **Output** ([`writer`]): a single task owns the write half, so frames
//!   never interleave
//!
//! ## Example
//!
//! ```no_run
//! use b2b_link::codec::{GetStatus, ParamRequest};
//! use b2b_link::ClientBuilder;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (a, b) = tokio::io::duplex(4096);
//!
//!     let _meter = ClientBuilder::new()
//!         .answer_echo()
//!         .on_get(|req: ParamRequest, ctx| async move {
//!             ctx.respond_get(GetStatus::Success, req.reading_type, &[1, 2, 3, 4])
//!                 .await
//!         })
//!         .start_stream(a);
//!
//!     let radio = ClientBuilder::new().start_stream(b);
//!
//!     let mut value = [0u8; 16];
//!     let reply = radio.messenger().get_parameter(0x0102, &mut value).await;
//!     assert_eq!(reply.status, GetStatus::Success);
//!     assert_eq!(&value[..reply.len], &[1, 2, 3, 4]);
//! }
//! ```

pub mod buffer_pool;
pub mod codec;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod message;
pub mod protocol;
pub mod writer;

mod client;

pub use client::{Client, ClientBuilder};
pub use codec::{GetStatus, ParamReply, SetStatus, TimeSet};
pub use config::LinkConfig;
pub use error::{B2bError, Result};
pub use handler::RequestContext;
pub use message::Messenger;
pub use protocol::MessageType;
