//! Inbound frame dispatcher.
//!
//! Runs on the receive task for every frame the HDLC decoder completes:
//!
//! 1. Overflowed frames are dropped.
//! 2. Frames on other addresses go to the non-B2B handler for that address.
//! 3. B2B packets shorter than a header, or whose header fails validation,
//!    are dropped.
//! 4. Responses are offered to the correlator synchronously, before the
//!    next byte is read.
//! 5. Requests are handed to their registered handler on a spawned task.
//!
//! Nothing is ever sent back for a dropped frame; the peer's own timeout
//! and retry cover it.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;

use crate::correlator::Correlator;
use crate::handler::{HandlerRegistry, RequestContext};
use crate::message::Messenger;
use crate::protocol::{PacketHeader, RxFrame, B2B_HDLC_ADDR, HEADER_SIZE};

/// What became of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Frame did not fit in the receive buffer.
    Overflow,
    /// Non-B2B frame handed to its address handler.
    NonB2b,
    /// Non-B2B frame with no handler, or no handler capacity.
    NonB2bDropped,
    /// B2B frame shorter than a packet header.
    TooShort,
    /// Version or length check failed.
    InvalidHeader,
    /// Response matched the armed exchange.
    ResponseDelivered,
    /// Response nobody was waiting for.
    ResponseDropped,
    /// Request handed to its handler.
    RequestDispatched,
    /// Request with no handler, or no handler capacity.
    RequestDropped,
}

/// Routes completed frames to the correlator or to request handlers.
pub struct Dispatcher {
    correlator: Arc<Correlator>,
    registry: Arc<HandlerRegistry>,
    messenger: Messenger,
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    /// Create a dispatcher running at most `max_concurrent_handlers`
    /// handlers at once.
    pub fn new(
        messenger: Messenger,
        registry: Arc<HandlerRegistry>,
        max_concurrent_handlers: usize,
    ) -> Self {
        Self {
            correlator: messenger.correlator().clone(),
            registry,
            messenger,
            semaphore: Arc::new(Semaphore::new(max_concurrent_handlers)),
        }
    }

    /// Handle one completed frame.
    ///
    /// Must be called from within a tokio runtime; request handlers are
    /// spawned onto it.
    pub fn handle_frame(&self, frame: RxFrame) -> Disposition {
        if frame.overflow {
            tracing::error!("B2B HDLC frame overflow detected");
            return Disposition::Overflow;
        }

        if frame.address != B2B_HDLC_ADDR {
            return self.handle_non_b2b(frame);
        }

        if frame.data.len() < HEADER_SIZE {
            tracing::warn!(
                "B2B packet smaller than header detected: {} bytes",
                frame.data.len()
            );
            return Disposition::TooShort;
        }

        let Some(header) = PacketHeader::decode(&frame.data) else {
            return Disposition::TooShort;
        };

        if let Err(e) = header.validate(frame.data.len()) {
            tracing::warn!("B2B invalid header detected: {}", e);
            return Disposition::InvalidHeader;
        }

        let body = frame.data.slice(HEADER_SIZE..);

        if header.is_response() {
            if self.correlator.deliver_response(&header, &body) {
                Disposition::ResponseDelivered
            } else {
                Disposition::ResponseDropped
            }
        } else {
            self.handle_request(header, body)
        }
    }

    fn handle_request(&self, header: PacketHeader, body: Bytes) -> Disposition {
        tracing::debug!(
            "B2B got request {} handle {}",
            header.message_type,
            header.handle
        );

        if !self.registry.has_handler(header.message_type) {
            tracing::warn!("B2B drop unhandled type {}", header.message_type);
            return Disposition::RequestDropped;
        }

        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(
                    "Handler capacity reached, dropping request type {} handle {}",
                    header.message_type,
                    header.handle
                );
                return Disposition::RequestDropped;
            }
        };

        let ctx = RequestContext::with_messenger(header, self.messenger.clone());
        let registry = self.registry.clone();
        let message_type = header.message_type;

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(e) = registry.dispatch(message_type, body, ctx).await {
                tracing::error!("Handler error for message type {}: {}", message_type, e);
            }
        });

        Disposition::RequestDispatched
    }

    fn handle_non_b2b(&self, frame: RxFrame) -> Disposition {
        let address = frame.address;
        tracing::debug!("B2B got non-B2B data on address {}", address);

        if !self.registry.has_non_b2b_handler(address) {
            tracing::warn!("No handler for HDLC address {}, dropping frame", address);
            return Disposition::NonB2bDropped;
        }

        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(
                    "Handler capacity reached, dropping frame on address {}",
                    address
                );
                return Disposition::NonB2bDropped;
            }
        };

        let ctx = RequestContext::non_b2b(address, Some(self.messenger.clone()));
        let registry = self.registry.clone();

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(e) = registry.dispatch_non_b2b(address, frame.data, ctx).await {
                tracing::error!("Handler error for address {}: {}", address, e);
            }
        });

        Disposition::NonB2b
    }

    /// Handlers that may still be started.
    pub fn available_handlers(&self) -> usize {
        self.semaphore.available_permits()
    }
}
