//! Request context for handlers.
//!
//! Provides the reply helpers for inbound requests:
//! - `respond_get` - answer a get request
//! - `respond_set` - answer a set request
//! - `respond_time` - answer a time request
//! - `respond_echo` - answer an echo request
//!
//! Replies reuse the request's handle so the peer's correlator accepts
//! them. Handlers that need to start their own exchanges use
//! [`RequestContext::messenger`].
//!
//! # Example
//!
//! ```
//! use b2b_link::codec::{ParamRequest, SetStatus};
//! use b2b_link::error::Result;
//! use b2b_link::handler::RequestContext;
//!
//! async fn read_only(req: ParamRequest, ctx: RequestContext) -> Result<()> {
//!     ctx.respond_set(SetStatus::ReadOnly, req.reading_type, &[]).await
//! }
//! ```

use crate::codec::{GetStatus, SetStatus, TimeSet};
use crate::error::{B2bError, Result};
use crate::message::Messenger;
use crate::protocol::{MessageType, PacketHeader, B2B_HDLC_ADDR};

/// Context passed to request handlers.
///
/// `RequestContext` is `Clone` and can be moved into spawned tasks. A
/// context without a messenger (see [`RequestContext::new`]) accepts every
/// reply and sends nothing.
#[derive(Clone)]
pub struct RequestContext {
    /// HDLC address the frame arrived on.
    address: u8,
    /// Header of the request, `None` for non-B2B frames.
    header: Option<PacketHeader>,
    messenger: Option<Messenger>,
}

impl RequestContext {
    /// Create a context for a B2B request (for testing without a link).
    pub fn new(header: PacketHeader) -> Self {
        Self {
            address: B2B_HDLC_ADDR,
            header: Some(header),
            messenger: None,
        }
    }

    /// Create a context for a B2B request that replies through `messenger`.
    pub fn with_messenger(header: PacketHeader, messenger: Messenger) -> Self {
        Self {
            address: B2B_HDLC_ADDR,
            header: Some(header),
            messenger: Some(messenger),
        }
    }

    /// Create a context for a frame received on a non-B2B address.
    pub fn non_b2b(address: u8, messenger: Option<Messenger>) -> Self {
        Self {
            address,
            header: None,
            messenger,
        }
    }

    /// HDLC address the frame arrived on.
    #[inline]
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Header of the request.
    #[inline]
    pub fn header(&self) -> Option<&PacketHeader> {
        self.header.as_ref()
    }

    /// Handle of the request.
    #[inline]
    pub fn handle(&self) -> Option<u16> {
        self.header.map(|h| h.handle)
    }

    /// Message type of the request, if known.
    #[inline]
    pub fn message_type(&self) -> Option<MessageType> {
        self.header.and_then(|h| h.kind())
    }

    /// Messenger for sending new messages to the peer.
    pub fn messenger(&self) -> Option<&Messenger> {
        self.messenger.as_ref()
    }

    /// Answer a get request.
    pub async fn respond_get(&self, status: GetStatus, reading_type: u16, value: &[u8]) -> Result<()> {
        let Some((messenger, handle)) = self.reply_target()? else {
            return Ok(());
        };
        messenger
            .send_get_resp(status, handle, reading_type, value)
            .await
    }

    /// Answer a set request with the value that was accepted.
    pub async fn respond_set(&self, status: SetStatus, reading_type: u16, value: &[u8]) -> Result<()> {
        let Some((messenger, handle)) = self.reply_target()? else {
            return Ok(());
        };
        messenger
            .send_set_resp(status, handle, reading_type, value)
            .await
    }

    /// Answer a time request.
    pub async fn respond_time(&self, time: &TimeSet) -> Result<()> {
        let Some((messenger, handle)) = self.reply_target()? else {
            return Ok(());
        };
        messenger.send_time_resp(handle, time).await
    }

    /// Answer an echo request.
    pub async fn respond_echo(&self) -> Result<()> {
        let Some((messenger, handle)) = self.reply_target()? else {
            return Ok(());
        };
        messenger.send_echo_resp(handle).await
    }

    /// Messenger and handle to reply with; `None` in testing mode.
    fn reply_target(&self) -> Result<Option<(&Messenger, u16)>> {
        let handle = self.handle().ok_or_else(|| {
            B2bError::Protocol(format!(
                "Frame on address {} is not a B2B request",
                self.address
            ))
        })?;

        Ok(self.messenger.as_ref().map(|m| (m, handle)))
    }
}
