//! Client builder and receive loop.
//!
//! The [`ClientBuilder`] registers request handlers and link settings. The
//! [`Client`] owns the lifecycle of one end of the link:
//! 1. Spawn the writer task on the write half
//! 2. Build the correlator and messenger around it
//! 3. Spawn the receive loop, which feeds every byte to the HDLC decoder
//!    and every completed frame to the dispatcher
//!
//! # Example
//!
//! ```no_run
//! use b2b_link::codec::{GetStatus, ParamRequest};
//! use b2b_link::Client;
//!
//! # async fn run(port: tokio::io::DuplexStream) -> b2b_link::error::Result<()> {
//! let client = Client::builder()
//!     .answer_echo()
//!     .on_get(|req: ParamRequest, ctx| async move {
//!         ctx.respond_get(GetStatus::NotSupported, req.reading_type, &[]).await
//!     })
//!     .retries(2)
//!     .start_stream(port);
//!
//! if client.messenger().echo().await {
//!     println!("peer is alive");
//! }
//!
//! client.wait_for_shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::buffer_pool::PacketPool;
use crate::codec::{ParamRequest, TimeSet};
use crate::config::LinkConfig;
use crate::correlator::Correlator;
use crate::dispatch::Dispatcher;
use crate::error::{B2bError, Result};
use crate::handler::{FromBody, HandlerRegistry, HandlerResult, RequestContext};
use crate::message::Messenger;
use crate::protocol::{HdlcDecoder, MessageType, NW_HDLC_ADDR};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Size of the buffer each read from the link fills.
const READ_BUFFER_SIZE: usize = 4096;

/// Builder for configuring and starting one end of a B2B link.
pub struct ClientBuilder {
    registry: HandlerRegistry,
    config: LinkConfig,
}

impl ClientBuilder {
    /// Create a new client builder with default settings.
    pub fn new() -> Self {
        Self::from_config(LinkConfig::default())
    }

    /// Create a client builder from a loaded configuration.
    pub fn from_config(config: LinkConfig) -> Self {
        Self {
            registry: HandlerRegistry::new(),
            config,
        }
    }

    /// Register a handler for any request message type.
    pub fn handle<F, T, Fut>(mut self, kind: MessageType, handler: F) -> Self
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: FromBody,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register(kind, handler);
        self
    }

    /// Handle get parameter requests.
    ///
    /// Reply with [`RequestContext::respond_get`].
    pub fn on_get<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(ParamRequest, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle(MessageType::GetReq, handler)
    }

    /// Handle set parameter requests.
    ///
    /// Reply with [`RequestContext::respond_set`].
    pub fn on_set<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(ParamRequest, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle(MessageType::SetReq, handler)
    }

    /// Handle time requests.
    pub fn on_time_request<F, Fut>(self, handler: F) -> Self
    where
        F: Fn((), RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle(MessageType::TimeReq, handler)
    }

    /// Handle time sync broadcasts.
    pub fn on_time_sync<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(TimeSet, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle(MessageType::TimeSync, handler)
    }

    /// Handle echo requests with custom logic.
    pub fn on_echo<F, Fut>(self, handler: F) -> Self
    where
        F: Fn((), RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle(MessageType::EchoReq, handler)
    }

    /// Answer every echo request immediately.
    pub fn answer_echo(self) -> Self {
        self.on_echo(|_: (), ctx| async move { ctx.respond_echo().await })
    }

    /// Handle reset commands.
    pub fn on_reset<F, Fut>(self, handler: F) -> Self
    where
        F: Fn((), RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle(MessageType::Reset, handler)
    }

    /// Handle decommission commands.
    pub fn on_decommission<F, Fut>(self, handler: F) -> Self
    where
        F: Fn((), RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle(MessageType::Decom, handler)
    }

    /// Handle refresh network requests.
    pub fn on_refresh_network<F, Fut>(self, handler: F) -> Self
    where
        F: Fn((), RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle(MessageType::RefreshNwReq, handler)
    }

    /// Handle traffic tunneled on the network address.
    ///
    /// The handler receives the whole information field, gateway header
    /// included.
    pub fn on_gateway_traffic<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Bytes, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_non_b2b(NW_HDLC_ADDR, handler)
    }

    /// Handle raw frames received on an HDLC address other than B2B.
    pub fn on_non_b2b<F, Fut>(mut self, address: u8, handler: F) -> Self
    where
        F: Fn(Bytes, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register_non_b2b(address, handler);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the Maximum Receive Unit.
    ///
    /// Default: 2048
    pub fn mru(mut self, mru: usize) -> Self {
        self.config.mru = mru;
        self
    }

    /// Set the retries after the first attempt of a request.
    ///
    /// Default: 1
    pub fn retries(mut self, retries: u8) -> Self {
        self.config.retries = retries;
        self
    }

    /// Set the wait per attempt for a response.
    ///
    /// Default: 500 ms
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the wait per attempt for an identity response.
    ///
    /// Default: 5 seconds
    pub fn identity_timeout(mut self, timeout: Duration) -> Self {
        self.config.identity_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the response queue depth.
    ///
    /// Default: 10
    pub fn response_queue_depth(mut self, depth: usize) -> Self {
        self.config.response_queue_depth = depth;
        self
    }

    /// Set the number of packet buffers.
    ///
    /// Default: 16
    pub fn pool_buffers(mut self, count: usize) -> Self {
        self.config.pool_buffers = count;
        self
    }

    /// Set the maximum number of concurrent handlers.
    ///
    /// When this limit is reached, new requests are dropped with a warning.
    /// Default: 32
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Set the maximum pending frames for backpressure.
    ///
    /// Default: 256
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.max_pending_frames = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 256
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.backpressure_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Start the link on separate read and write halves.
    ///
    /// Spawns the writer task and the receive loop, so it must be called
    /// from within a tokio runtime.
    pub fn start<R, W>(self, reader: R, writer: W) -> Client
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Client::start(self.registry, self.config, reader, writer)
    }

    /// Start the link on a single bidirectional stream.
    pub fn start_stream<S>(self, stream: S) -> Client
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.start(reader, writer)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running end of a B2B link.
///
/// Use [`messenger()`](Client::messenger) to send messages to the peer and
/// `wait_for_shutdown()` to block until the link closes.
pub struct Client {
    messenger: Messenger,
    writer: WriterHandle,
    shutdown_rx: oneshot::Receiver<()>,
    reader_task: JoinHandle<()>,
    _writer_task: JoinHandle<Result<()>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    fn start<R, W>(registry: HandlerRegistry, config: LinkConfig, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer, writer_task) = spawn_writer_task(writer, config.writer_config());

        let pool = PacketPool::new(config.pool_buffers, config.max_packet());
        let correlator = Arc::new(Correlator::new(
            writer.clone(),
            pool,
            config.response_queue_depth,
        ));
        let messenger = Messenger::new(correlator)
            .with_retries(config.retries)
            .with_timeout(config.response_timeout())
            .with_identity_timeout(config.identity_timeout());

        let dispatcher = Dispatcher::new(
            messenger.clone(),
            Arc::new(registry),
            config.max_concurrent_handlers,
        );
        let decoder = HdlcDecoder::with_mru(config.mru);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let reader_task = tokio::spawn(async move {
            if let Err(e) = Self::read_loop(reader, decoder, dispatcher).await {
                tracing::error!("Read loop error: {}", e);
            }
            let _ = shutdown_tx.send(());
        });

        Client {
            messenger,
            writer,
            shutdown_rx,
            reader_task,
            _writer_task: writer_task,
        }
    }

    /// Receive loop: every byte goes through the decoder, and every frame
    /// it completes is dispatched before the next byte is looked at.
    async fn read_loop<R: AsyncRead + Unpin>(
        mut reader: R,
        mut decoder: HdlcDecoder,
        dispatcher: Dispatcher,
    ) -> Result<()> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!("B2B link closed");
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) => return Err(B2bError::Io(e)),
            };

            for &byte in &buf[..n] {
                if let Some(frame) = decoder.on_rx_byte(byte) {
                    dispatcher.handle_frame(frame);
                }
            }
        }
    }

    /// Messenger for sending messages to the peer.
    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Get the current backpressure status.
    pub fn is_backpressure_active(&self) -> bool {
        self.writer.is_backpressure_active()
    }

    /// Get the current pending frame count.
    pub fn pending_frames(&self) -> usize {
        self.writer.pending_count()
    }

    /// Stop the receive loop.
    ///
    /// Messengers already handed out can still transmit.
    pub fn stop(&self) {
        self.reader_task.abort();
    }

    /// Wait for shutdown (link closed or read error).
    ///
    /// This consumes the client and blocks until the receive loop ends.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let _ = self.shutdown_rx.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::GetStatus;

    #[test]
    fn test_builder_default() {
        let builder = ClientBuilder::default();
        assert_eq!(builder.config, LinkConfig::default());
        assert!(builder.registry.is_empty());
    }

    #[test]
    fn test_builder_registers_handlers() {
        let builder = Client::builder()
            .answer_echo()
            .on_get(|req: ParamRequest, ctx| async move {
                ctx.respond_get(GetStatus::NotSupported, req.reading_type, &[])
                    .await
            })
            .on_time_sync(|_: TimeSet, _ctx| async { Ok(()) })
            .on_reset(|_: (), _ctx| async { Ok(()) })
            .on_gateway_traffic(|_: Bytes, _ctx| async { Ok(()) });

        assert!(builder.registry.has_handler(MessageType::EchoReq.as_u16()));
        assert!(builder.registry.has_handler(MessageType::GetReq.as_u16()));
        assert!(builder.registry.has_handler(MessageType::TimeSync.as_u16()));
        assert!(builder.registry.has_handler(MessageType::Reset.as_u16()));
        assert!(!builder.registry.has_handler(MessageType::SetReq.as_u16()));
        assert!(builder.registry.has_non_b2b_handler(NW_HDLC_ADDR));
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Client::builder()
            .mru(512)
            .retries(3)
            .response_timeout(Duration::from_millis(100))
            .identity_timeout(Duration::from_secs(1))
            .response_queue_depth(4)
            .pool_buffers(8)
            .max_concurrent_handlers(2)
            .max_pending_frames(64)
            .channel_capacity(32)
            .backpressure_timeout(Duration::from_secs(10));

        let config = &builder.config;
        assert_eq!(config.mru, 512);
        assert_eq!(config.retries, 3);
        assert_eq!(config.response_timeout(), Duration::from_millis(100));
        assert_eq!(config.identity_timeout(), Duration::from_secs(1));
        assert_eq!(config.response_queue_depth, 4);
        assert_eq!(config.pool_buffers, 8);
        assert_eq!(config.max_concurrent_handlers, 2);
        assert_eq!(config.max_pending_frames, 64);
        assert_eq!(config.channel_capacity, 32);
        assert_eq!(config.backpressure_timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_shutdown_when_link_closes() {
        let (local, remote) = tokio::io::duplex(1024);
        let client = Client::builder().start_stream(local);

        assert_eq!(client.pending_frames(), 0);
        assert!(!client.is_backpressure_active());

        drop(remote);
        client.wait_for_shutdown().await.unwrap();
    }
}
