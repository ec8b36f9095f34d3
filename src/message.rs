//! B2B message builders.
//!
//! Every builder follows the same shape: allocate a pool buffer for
//! header + body, store the header with a handle, fill the body, wrap the
//! packet in a UI frame and either run a request/response exchange through
//! the [`Correlator`] or transmit it directly.
//!
//! Request/response builders never return errors. A timeout or a local
//! failure is reported the same way as a failed exchange (`GenErr`,
//! `None` or `false`), which is what callers act on.

use std::sync::Arc;
use std::time::Duration;

use crate::buffer_pool::{PacketBuf, PacketPool};
use crate::codec::{
    GetStatus, ParamReply, ParamResponse, ParamStatus, SetStatus, TimeSet, GET_REQ_BODY_SIZE,
    SET_REQ_BASE_SIZE, TIME_BODY_SIZE,
};
use crate::correlator::Correlator;
use crate::error::{B2bError, Result};
use crate::protocol::{
    store_u16, HdlcFrame, MessageType, PacketHeader, B2B_HDLC_ADDR, HEADER_SIZE, NW_HDLC_ADDR,
};

/// Default retries after the first attempt.
pub const DEFAULT_RETRIES: u8 = 1;

/// Default wait per attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Wait per attempt for identity requests.
pub const IDENTITY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Sends B2B messages to the peer board.
///
/// Cheap to clone; all clones share one correlator, so their
/// request/response exchanges are serialized. A request holds its packet
/// buffer while it waits for the exchange; once the pool is used up,
/// further requests fail locally instead of queuing.
#[derive(Clone)]
pub struct Messenger {
    correlator: Arc<Correlator>,
    pool: PacketPool,
    retries: u8,
    timeout: Duration,
    identity_timeout: Duration,
}

impl Messenger {
    /// Create a messenger with default retry and timeout settings.
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self {
            pool: correlator.pool().clone(),
            correlator,
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            identity_timeout: IDENTITY_TIMEOUT,
        }
    }

    /// Set the number of retries after the first attempt.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    /// Set the wait per attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the wait per attempt for identity requests.
    pub fn with_identity_timeout(mut self, timeout: Duration) -> Self {
        self.identity_timeout = timeout;
        self
    }

    /// The correlator this messenger sends through.
    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Retries after the first attempt.
    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// Wait per attempt.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // Request/response builders

    /// Read one reading from the peer into `buf`.
    ///
    /// On success `len` is the number of value bytes stored.
    pub async fn get_parameter(&self, reading_type: u16, buf: &mut [u8]) -> ParamReply<GetStatus> {
        tracing::debug!("B2B send get param req {}", reading_type);

        let resp = self
            .request(
                MessageType::GetReq,
                MessageType::GetResp,
                self.timeout,
                GET_REQ_BODY_SIZE,
                |body| store_u16(body, reading_type),
            )
            .await;

        param_reply(resp, reading_type, buf)
    }

    /// Write one reading on the peer.
    ///
    /// `value` carries the new value in and, on success, the value the peer
    /// accepted out.
    pub async fn set_parameter(&self, reading_type: u16, value: &mut [u8]) -> ParamReply<SetStatus> {
        tracing::debug!("B2B send set param req {}", reading_type);

        let resp = {
            let new_value: &[u8] = value;
            self.request(
                MessageType::SetReq,
                MessageType::SetResp,
                self.timeout,
                SET_REQ_BASE_SIZE + new_value.len(),
                |body| {
                    store_u16(body, reading_type);
                    body[SET_REQ_BASE_SIZE..].copy_from_slice(new_value);
                },
            )
            .await
        };

        param_reply(resp, reading_type, value)
    }

    /// Fetch the peer's identity blob into `buf`.
    ///
    /// Returns the number of bytes stored, or `None` if there was no
    /// response or it does not fit in `buf`.
    pub async fn identity(&self, buf: &mut [u8]) -> Option<usize> {
        tracing::debug!("B2B send ident req");

        let resp = self
            .request(
                MessageType::IdentReq,
                MessageType::IdentResp,
                self.identity_timeout,
                0,
                |_| {},
            )
            .await;

        let resp = completed(resp)?;
        if resp.len() > buf.len() {
            tracing::warn!(
                "B2B identity of {} bytes does not fit in {}",
                resp.len(),
                buf.len()
            );
            return None;
        }
        buf[..resp.len()].copy_from_slice(&resp);
        Some(resp.len())
    }

    /// Request the peer's time.
    pub async fn request_time(&self) -> Option<TimeSet> {
        tracing::debug!("B2B send time req");

        let resp = self
            .request(
                MessageType::TimeReq,
                MessageType::TimeResp,
                self.timeout,
                0,
                |_| {},
            )
            .await;

        let resp = completed(resp)?;
        let time = TimeSet::decode(&resp);
        if time.is_none() {
            tracing::warn!("B2B time response too short: {} bytes", resp.len());
        }
        time
    }

    /// Check that the peer is alive.
    pub async fn echo(&self) -> bool {
        tracing::debug!("B2B send echo req");

        let resp = self
            .request(
                MessageType::EchoReq,
                MessageType::EchoResp,
                self.timeout,
                0,
                |_| {},
            )
            .await;

        completed(resp).is_some()
    }

    // Fire-and-forget builders

    /// Ask the peer to reset.
    pub async fn send_reset(&self) -> Result<()> {
        tracing::debug!("B2B send reset");
        self.send_empty(MessageType::Reset).await
    }

    /// Ask the peer to decommission.
    pub async fn send_decommission(&self) -> Result<()> {
        tracing::debug!("B2B send decom");
        self.send_empty(MessageType::Decom).await
    }

    /// Ask the peer to refresh its network state.
    pub async fn send_refresh_network(&self) -> Result<()> {
        tracing::debug!("B2B send refresh network req");
        self.send_empty(MessageType::RefreshNwReq).await
    }

    /// Relay network-layer bytes to the peer untouched.
    ///
    /// Sent on the network tunnel address, not the B2B address.
    pub async fn send_gateway_traffic(&self, payload: &[u8]) -> Result<()> {
        tracing::debug!("B2B send gateway traffic, {} bytes", payload.len());

        let handle = self.correlator.next_handle();
        let packet = self.build(MessageType::BasicGateway, handle, payload.len(), |body| {
            body.copy_from_slice(payload)
        })?;
        self.correlator
            .transmit(&HdlcFrame::ui(NW_HDLC_ADDR, &packet))
            .await
    }

    /// Broadcast the local time.
    pub async fn send_time_sync(&self, time: &TimeSet) -> Result<()> {
        tracing::debug!("B2B send time sync");

        let handle = self.correlator.next_handle();
        self.send_packet(MessageType::TimeSync, handle, TIME_BODY_SIZE, |body| {
            time.encode_into(body)
        })
        .await
    }

    // Reply builders

    /// Answer a time request.
    pub async fn send_time_resp(&self, handle: u16, time: &TimeSet) -> Result<()> {
        tracing::debug!("B2B send time resp");
        self.send_packet(MessageType::TimeResp, handle, TIME_BODY_SIZE, |body| {
            time.encode_into(body)
        })
        .await
    }

    /// Answer a get request.
    pub async fn send_get_resp(
        &self,
        status: GetStatus,
        handle: u16,
        reading_type: u16,
        value: &[u8],
    ) -> Result<()> {
        tracing::debug!("B2B send get param resp");
        self.send_param_resp(MessageType::GetResp, status, handle, reading_type, value)
            .await
    }

    /// Answer a set request.
    pub async fn send_set_resp(
        &self,
        status: SetStatus,
        handle: u16,
        reading_type: u16,
        value: &[u8],
    ) -> Result<()> {
        tracing::debug!("B2B send set param resp");
        self.send_param_resp(MessageType::SetResp, status, handle, reading_type, value)
            .await
    }

    /// Answer an echo request.
    pub async fn send_echo_resp(&self, handle: u16) -> Result<()> {
        tracing::debug!("B2B send echo resp");
        self.send_packet(MessageType::EchoResp, handle, 0, |_| {}).await
    }

    async fn send_param_resp<S: ParamStatus>(
        &self,
        kind: MessageType,
        status: S,
        handle: u16,
        reading_type: u16,
        value: &[u8],
    ) -> Result<()> {
        let resp = ParamResponse {
            status: status.as_u8(),
            reading_type,
            value,
        };
        self.send_packet(kind, handle, resp.encoded_len(), |body| {
            resp.encode_into(body)
        })
        .await
    }

    async fn send_empty(&self, kind: MessageType) -> Result<()> {
        let handle = self.correlator.next_handle();
        self.send_packet(kind, handle, 0, |_| {}).await
    }

    async fn send_packet<F>(&self, kind: MessageType, handle: u16, body_len: usize, fill: F) -> Result<()>
    where
        F: FnOnce(&mut [u8]),
    {
        let packet = self.build(kind, handle, body_len, fill)?;
        self.correlator
            .transmit(&HdlcFrame::ui(B2B_HDLC_ADDR, &packet))
            .await
    }

    async fn request<F>(
        &self,
        kind: MessageType,
        expected: MessageType,
        timeout: Duration,
        body_len: usize,
        fill: F,
    ) -> Result<Option<PacketBuf>>
    where
        F: FnOnce(&mut [u8]),
    {
        let handle = self.correlator.next_handle();
        let packet = self.build(kind, handle, body_len, fill)?;

        self.correlator
            .send_request(
                &HdlcFrame::ui(B2B_HDLC_ADDR, &packet),
                self.retries,
                timeout,
                expected,
                handle,
            )
            .await
    }

    /// Allocate a packet and store its header; `fill` writes the body.
    fn build<F>(&self, kind: MessageType, handle: u16, body_len: usize, fill: F) -> Result<PacketBuf>
    where
        F: FnOnce(&mut [u8]),
    {
        let len = HEADER_SIZE + body_len;
        let length = u16::try_from(len).map_err(|_| B2bError::PacketTooLarge {
            len,
            max: usize::from(u16::MAX),
        })?;

        let mut packet = self.pool.alloc(len)?;
        PacketHeader::new(kind, length, handle).encode_into(&mut packet);
        fill(&mut packet[HEADER_SIZE..]);
        Ok(packet)
    }
}

/// Unwrap a finished exchange, logging local failures.
fn completed(resp: Result<Option<PacketBuf>>) -> Option<PacketBuf> {
    match resp {
        Ok(Some(resp)) => Some(resp),
        Ok(None) => None,
        Err(e) => {
            tracing::error!("B2B request failed: {}", e);
            None
        }
    }
}

fn param_reply<S: ParamStatus>(
    resp: Result<Option<PacketBuf>>,
    reading_type: u16,
    out: &mut [u8],
) -> ParamReply<S> {
    let Some(resp) = completed(resp) else {
        return ParamReply::failed();
    };

    match ParamResponse::decode(&resp) {
        Some(parsed) => parsed.copy_value(reading_type, out),
        None => {
            tracing::warn!("B2B parameter response too short: {} bytes", resp.len());
            ParamReply::failed()
        }
    }
}
