//! Request/response correlation.
//!
//! At most one request/response exchange is in flight on the link. An
//! exchange runs:
//!
//! ```text
//! IDLE ──lock──► drain stale ──► ARMED ──tx──► wait ─┬─► RESOLVED
//!                                  ▲                  │
//!                                  └──── retry ◄──────┴─► TIMED_OUT
//! ```
//!
//! The receive task delivers response packets through
//! [`Correlator::deliver_response`]. A response is queued only while an
//! exchange is armed and only if its message type and handle both match;
//! the descriptor is cleared before queuing so a second copy is dropped.
//!
//! Retries resend the same frame with the same handle, so a late answer to
//! an earlier attempt satisfies a later one.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::buffer_pool::{PacketBuf, PacketPool};
use crate::error::Result;
use crate::protocol::{HdlcFrame, MessageType, PacketHeader};
use crate::writer::{OutboundFrame, WriterHandle};

/// Default depth of the response queue.
pub const DEFAULT_RESPONSE_QUEUE_DEPTH: usize = 10;

/// The response an armed exchange is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedResponse {
    /// Expected response message type.
    pub message_type: MessageType,
    /// Handle the response must echo.
    pub handle: u16,
}

impl ExpectedResponse {
    fn matches(&self, header: &PacketHeader) -> bool {
        self.message_type.as_u16() == header.message_type && self.handle == header.handle
    }
}

/// Single-flight request/response correlator.
pub struct Correlator {
    writer: WriterHandle,
    pool: PacketPool,
    /// Exchange lock; owning the receiver is owning the exchange.
    exchange: tokio::sync::Mutex<mpsc::Receiver<PacketBuf>>,
    /// Response queue, fed by the receive task.
    responses: mpsc::Sender<PacketBuf>,
    /// Armed descriptor, `None` when not waiting.
    expected: Mutex<Option<ExpectedResponse>>,
    /// Next handle to issue.
    handle: AtomicU16,
}

impl Correlator {
    /// Create a correlator transmitting through `writer`.
    ///
    /// `queue_depth` bounds how many responses may wait in the queue; it is
    /// clamped to at least 1.
    pub fn new(writer: WriterHandle, pool: PacketPool, queue_depth: usize) -> Self {
        let (responses, rx) = mpsc::channel(queue_depth.max(1));
        Self {
            writer,
            pool,
            exchange: tokio::sync::Mutex::new(rx),
            responses,
            expected: Mutex::new(None),
            handle: AtomicU16::new(0),
        }
    }

    /// Issue the next handle.
    ///
    /// Returns the current counter value and increments it, wrapping at
    /// 16 bits. Never waits on an exchange in progress.
    #[inline]
    pub fn next_handle(&self) -> u16 {
        self.handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Transmit a frame without expecting a response.
    pub async fn transmit(&self, frame: &HdlcFrame<'_>) -> Result<()> {
        self.writer.send_frame(frame).await
    }

    /// Send a request and wait for its response.
    ///
    /// Transmits `frame` up to `retries + 1` times, waiting `timeout` after
    /// each attempt. Returns the response body, or `None` if every attempt
    /// timed out. Errors only if the frame cannot be handed to the writer.
    pub async fn send_request(
        &self,
        frame: &HdlcFrame<'_>,
        retries: u8,
        timeout: Duration,
        expected: MessageType,
        handle: u16,
    ) -> Result<Option<PacketBuf>> {
        let mut responses = self.exchange.lock().await;

        while let Ok(stale) = responses.try_recv() {
            tracing::debug!("B2B discarding stale response of {} bytes", stale.len());
        }

        let _armed = Armed::arm(
            &self.expected,
            ExpectedResponse {
                message_type: expected,
                handle,
            },
        );

        let encoded = OutboundFrame::encode(frame);

        for attempt in 0..=retries {
            if attempt > 0 {
                tracing::debug!(
                    "B2B retry {} of {} for {:?} handle {}",
                    attempt,
                    retries,
                    expected,
                    handle
                );
            }

            self.writer.send(encoded.clone()).await?;

            match tokio::time::timeout(timeout, responses.recv()).await {
                Ok(Some(resp)) => return Ok(Some(resp)),
                // Sender lives in self, so the queue cannot close
                Ok(None) => return Ok(None),
                Err(_) => {}
            }
        }

        tracing::debug!("B2B no {:?} for handle {}", expected, handle);
        Ok(None)
    }

    /// Offer a received response packet to the armed exchange.
    ///
    /// Returns `true` if it matched and was queued.
    pub fn deliver_response(&self, header: &PacketHeader, body: &[u8]) -> bool {
        let mut expected = lock(&self.expected);

        match *expected {
            Some(ref want) if want.matches(header) => {}
            _ => {
                tracing::warn!(
                    "B2B dropping unexpected response type {} handle {}",
                    header.message_type,
                    header.handle
                );
                return false;
            }
        }

        let buf = match self.pool.alloc_response(body) {
            Ok(buf) => buf,
            Err(e) => {
                tracing::error!(
                    "B2B could not buffer response type {} of length {}: {}",
                    header.message_type,
                    body.len(),
                    e
                );
                return false;
            }
        };

        // Close the window before queuing; the next frame may be a duplicate
        *expected = None;
        drop(expected);

        tracing::debug!("B2B got resp {}", header.message_type);

        match self.responses.try_send(buf) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("B2B response queue full, dropping response");
                false
            }
        }
    }

    /// Check if an exchange is waiting for a response.
    pub fn is_waiting(&self) -> bool {
        lock(&self.expected).is_some()
    }

    /// The response currently waited for, if any.
    pub fn expected(&self) -> Option<ExpectedResponse> {
        *lock(&self.expected)
    }

    /// Packet buffer pool shared with the message builders.
    pub fn pool(&self) -> &PacketPool {
        &self.pool
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Armed descriptor, cleared on drop so every exit path disarms.
struct Armed<'a> {
    slot: &'a Mutex<Option<ExpectedResponse>>,
}

impl<'a> Armed<'a> {
    fn arm(slot: &'a Mutex<Option<ExpectedResponse>>, expected: ExpectedResponse) -> Self {
        *lock(slot) = Some(expected);
        Self { slot }
    }
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HdlcDecoder, RxFrame, HEADER_SIZE};
    use crate::writer::spawn_writer_task_default;
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn correlator() -> (Arc<Correlator>, DuplexStream) {
        let (link, peer) = duplex(4096);
        let (writer, _task) = spawn_writer_task_default(link);
        let correlator = Arc::new(Correlator::new(
            writer,
            PacketPool::default(),
            DEFAULT_RESPONSE_QUEUE_DEPTH,
        ));
        (correlator, peer)
    }

    fn header(kind: MessageType, handle: u16, body_len: usize) -> PacketHeader {
        PacketHeader::new(kind, (HEADER_SIZE + body_len) as u16, handle)
    }

    async fn read_frames(peer: &mut DuplexStream, decoder: &mut HdlcDecoder) -> Vec<RxFrame> {
        let mut buf = [0u8; 256];
        let n = peer.read(&mut buf).await.unwrap();
        decoder.push(&buf[..n])
    }

    async fn wait_armed(correlator: &Correlator) {
        while !correlator.is_waiting() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_handles_post_increment_and_wrap() {
        let (correlator, _peer) = correlator();

        assert_eq!(correlator.next_handle(), 0);
        assert_eq!(correlator.next_handle(), 1);

        correlator.handle.store(u16::MAX, Ordering::Relaxed);
        assert_eq!(correlator.next_handle(), u16::MAX);
        assert_eq!(correlator.next_handle(), 0);
    }

    #[tokio::test]
    async fn test_response_not_waiting_is_dropped() {
        let (correlator, _peer) = correlator();

        let delivered = correlator.deliver_response(&header(MessageType::EchoResp, 0, 0), &[]);
        assert!(!delivered);
        assert_eq!(correlator.pool().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_matching_response_resolves_exchange() {
        let (correlator, mut peer) = correlator();
        let packet = header(MessageType::GetReq, 7, 2).encode();

        let c = correlator.clone();
        let exchange = tokio::spawn(async move {
            c.send_request(
                &HdlcFrame::ui(1, &packet),
                0,
                Duration::from_secs(5),
                MessageType::GetResp,
                7,
            )
            .await
        });

        let mut decoder = HdlcDecoder::new();
        let frames = read_frames(&mut peer, &mut decoder).await;
        assert_eq!(frames.len(), 1);
        wait_armed(&correlator).await;

        assert!(correlator.deliver_response(&header(MessageType::GetResp, 7, 3), &[0, 0, 1]));
        assert!(!correlator.is_waiting());

        let resp = exchange.await.unwrap().unwrap().unwrap();
        assert_eq!(&resp[..], &[0, 0, 1]);
    }

    #[tokio::test]
    async fn test_mismatched_handle_and_type_rejected() {
        let (correlator, mut peer) = correlator();
        let packet = header(MessageType::EchoReq, 3, 0).encode();

        let c = correlator.clone();
        let exchange = tokio::spawn(async move {
            c.send_request(
                &HdlcFrame::ui(1, &packet),
                0,
                Duration::from_millis(200),
                MessageType::EchoResp,
                3,
            )
            .await
        });

        let mut decoder = HdlcDecoder::new();
        read_frames(&mut peer, &mut decoder).await;
        wait_armed(&correlator).await;

        assert!(!correlator.deliver_response(&header(MessageType::EchoResp, 4, 0), &[]));
        assert!(!correlator.deliver_response(&header(MessageType::GetResp, 3, 0), &[]));
        assert!(correlator.is_waiting());

        assert!(exchange.await.unwrap().unwrap().is_none());
        assert!(!correlator.is_waiting());
    }

    #[tokio::test]
    async fn test_response_buffered_when_requests_hold_pool() {
        let (link, mut peer) = duplex(4096);
        let (writer, _task) = spawn_writer_task_default(link);
        let pool = PacketPool::new(4, 64);
        let correlator = Arc::new(Correlator::new(
            writer,
            pool.clone(),
            DEFAULT_RESPONSE_QUEUE_DEPTH,
        ));

        // Requests queued behind the exchange hold every shared slot
        let held: Vec<_> = (0..4).map(|_| pool.alloc(HEADER_SIZE).unwrap()).collect();
        assert_eq!(pool.available(), 0);

        let packet = header(MessageType::EchoReq, 2, 0).encode();
        let c = correlator.clone();
        let exchange = tokio::spawn(async move {
            c.send_request(
                &HdlcFrame::ui(1, &packet),
                0,
                Duration::from_secs(5),
                MessageType::EchoResp,
                2,
            )
            .await
        });

        let mut decoder = HdlcDecoder::new();
        read_frames(&mut peer, &mut decoder).await;
        wait_armed(&correlator).await;

        assert!(correlator.deliver_response(&header(MessageType::EchoResp, 2, 0), &[]));
        assert!(exchange.await.unwrap().unwrap().is_some());

        drop(held);
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_response_dropped() {
        let (correlator, mut peer) = correlator();
        let packet = header(MessageType::EchoReq, 9, 0).encode();

        let c = correlator.clone();
        let exchange = tokio::spawn(async move {
            c.send_request(
                &HdlcFrame::ui(1, &packet),
                0,
                Duration::from_secs(5),
                MessageType::EchoResp,
                9,
            )
            .await
        });

        let mut decoder = HdlcDecoder::new();
        read_frames(&mut peer, &mut decoder).await;
        wait_armed(&correlator).await;

        let resp = header(MessageType::EchoResp, 9, 0);
        assert!(correlator.deliver_response(&resp, &[]));
        assert!(!correlator.deliver_response(&resp, &[]));

        assert!(exchange.await.unwrap().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retries_transmit_same_frame() {
        let (correlator, mut peer) = correlator();
        let packet = header(MessageType::EchoReq, 1, 0).encode();
        let timeout = Duration::from_millis(50);

        let start = Instant::now();
        let result = correlator
            .send_request(&HdlcFrame::ui(1, &packet), 2, timeout, MessageType::EchoResp, 1)
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert!(result.is_none());
        assert!(elapsed >= timeout * 3);
        assert!(elapsed < timeout * 5, "took {:?}", elapsed);
        assert!(!correlator.is_waiting());

        drop(correlator);
        let mut wire = Vec::new();
        peer.read_to_end(&mut wire).await.unwrap();
        let frames = HdlcDecoder::new().push(&wire);

        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.data == frames[0].data));
    }

    #[tokio::test]
    async fn test_stale_response_drained() {
        let (correlator, mut peer) = correlator();

        // Leave a response in the queue without anyone collecting it
        *lock(&correlator.expected) = Some(ExpectedResponse {
            message_type: MessageType::EchoResp,
            handle: 5,
        });
        assert!(correlator.deliver_response(&header(MessageType::EchoResp, 5, 0), &[]));
        assert_eq!(correlator.pool().outstanding(), 1);

        let packet = header(MessageType::EchoReq, 5, 0).encode();
        let result = correlator
            .send_request(
                &HdlcFrame::ui(1, &packet),
                0,
                Duration::from_millis(20),
                MessageType::EchoResp,
                5,
            )
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(correlator.pool().outstanding(), 0);

        let mut decoder = HdlcDecoder::new();
        assert_eq!(read_frames(&mut peer, &mut decoder).await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_exchange_disarms() {
        let (correlator, _peer) = correlator();
        let packet = header(MessageType::EchoReq, 2, 0).encode();

        let c = correlator.clone();
        let exchange = tokio::spawn(async move {
            c.send_request(
                &HdlcFrame::ui(1, &packet),
                0,
                Duration::from_secs(60),
                MessageType::EchoResp,
                2,
            )
            .await
        });

        wait_armed(&correlator).await;
        exchange.abort();
        let _ = exchange.await;

        assert!(!correlator.is_waiting());
    }
}
