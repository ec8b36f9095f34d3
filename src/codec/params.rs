//! Get/Set parameter bodies and status codes.
//!
//! ```text
//! Get request:   reading type (u16)
//! Set request:   reading type (u16) | value...
//! Get/Set resp:  status (u8) | echoed reading type (u16) | value...
//! ```

use bytes::Bytes;

use crate::error::{B2bError, Result};
use crate::protocol::{get_u16, store_u16};

/// Body size of a Get request.
pub const GET_REQ_BODY_SIZE: usize = 2;

/// Body size of a Set request without its value.
pub const SET_REQ_BASE_SIZE: usize = 2;

/// Body size of a Get or Set response without its value.
pub const PARAM_RESP_BASE_SIZE: usize = 3;

/// Status codes shared by Get and Set responses.
pub trait ParamStatus: From<u8> + Copy + PartialEq + std::fmt::Debug {
    /// Request succeeded.
    const SUCCESS: Self;
    /// Generic failure, also used for every local failure.
    const GEN_ERR: Self;

    /// Wire value.
    fn as_u8(self) -> u8;
}

/// Result of a Get request.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetStatus {
    Success = 0,
    NotSupported = 254,
    GenErr = 255,
}

impl From<u8> for GetStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => GetStatus::Success,
            254 => GetStatus::NotSupported,
            _ => GetStatus::GenErr,
        }
    }
}

impl ParamStatus for GetStatus {
    const SUCCESS: Self = GetStatus::Success;
    const GEN_ERR: Self = GetStatus::GenErr;

    fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Result of a Set request.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetStatus {
    Success = 0,
    ReadOnly = 1,
    Invalid = 2,
    NotSupported = 254,
    GenErr = 255,
}

impl From<u8> for SetStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => SetStatus::Success,
            1 => SetStatus::ReadOnly,
            2 => SetStatus::Invalid,
            254 => SetStatus::NotSupported,
            _ => SetStatus::GenErr,
        }
    }
}

impl ParamStatus for SetStatus {
    const SUCCESS: Self = SetStatus::Success;
    const GEN_ERR: Self = SetStatus::GenErr;

    fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Outcome of a Get or Set exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamReply<S> {
    /// Status reported by the peer, or `GEN_ERR` on any local failure.
    pub status: S,
    /// Value bytes copied into the caller's buffer (0 unless successful).
    pub len: usize,
}

impl<S: ParamStatus> ParamReply<S> {
    /// Failed exchange with nothing copied.
    pub fn failed() -> Self {
        Self {
            status: S::GEN_ERR,
            len: 0,
        }
    }

    /// Check if the peer reported success.
    pub fn is_success(&self) -> bool {
        self.status == S::SUCCESS
    }
}

/// Decoded Get or Set request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRequest {
    /// Requested reading type.
    pub reading_type: u16,
    /// New value (Set only, empty for Get).
    pub value: Bytes,
}

impl ParamRequest {
    /// Decode a request body.
    pub fn decode(mut body: Bytes) -> Result<Self> {
        if body.len() < SET_REQ_BASE_SIZE {
            return Err(B2bError::Protocol(format!(
                "Parameter request body too short: {} bytes",
                body.len()
            )));
        }
        let reading_type = get_u16(&body);
        let value = body.split_off(SET_REQ_BASE_SIZE);
        Ok(Self {
            reading_type,
            value,
        })
    }
}

/// Decoded Get or Set response body, borrowing the value bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamResponse<'a> {
    /// Raw status byte.
    pub status: u8,
    /// Reading type echoed by the peer.
    pub reading_type: u16,
    /// Returned value.
    pub value: &'a [u8],
}

impl<'a> ParamResponse<'a> {
    /// Decode a response body. Returns `None` if it is too short.
    pub fn decode(body: &'a [u8]) -> Option<Self> {
        if body.len() < PARAM_RESP_BASE_SIZE {
            return None;
        }
        Some(Self {
            status: body[0],
            reading_type: get_u16(&body[1..3]),
            value: &body[PARAM_RESP_BASE_SIZE..],
        })
    }

    /// Interpret the response to a request for `reading_type`, copying the
    /// value into `out` on success.
    ///
    /// A mismatched echoed type or a value longer than `out` turns the
    /// result into `GEN_ERR` whatever status the peer sent.
    pub fn copy_value<S: ParamStatus>(&self, reading_type: u16, out: &mut [u8]) -> ParamReply<S> {
        if self.reading_type != reading_type || self.value.len() > out.len() {
            return ParamReply::failed();
        }

        let status = S::from(self.status);
        if status != S::SUCCESS {
            return ParamReply { status, len: 0 };
        }

        out[..self.value.len()].copy_from_slice(self.value);
        ParamReply {
            status,
            len: self.value.len(),
        }
    }

    /// Write a response body into `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than `PARAM_RESP_BASE_SIZE + value.len()`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0] = self.status;
        store_u16(&mut buf[1..3], self.reading_type);
        buf[PARAM_RESP_BASE_SIZE..PARAM_RESP_BASE_SIZE + self.value.len()]
            .copy_from_slice(self.value);
    }

    /// Encoded body length.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        PARAM_RESP_BASE_SIZE + self.value.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_is_gen_err() {
        assert_eq!(GetStatus::from(0), GetStatus::Success);
        assert_eq!(GetStatus::from(254), GetStatus::NotSupported);
        assert_eq!(GetStatus::from(1), GetStatus::GenErr);
        assert_eq!(SetStatus::from(2), SetStatus::Invalid);
        assert_eq!(SetStatus::from(77), SetStatus::GenErr);
    }

    #[test]
    fn test_status_wire_values() {
        assert_eq!(GetStatus::GenErr.as_u8(), 255);
        assert_eq!(SetStatus::ReadOnly.as_u8(), 1);
        assert_eq!(SetStatus::NotSupported.as_u8(), 254);
    }

    #[test]
    fn test_decode_get_request() {
        let req = ParamRequest::decode(Bytes::from_static(&[0x12, 0x34])).unwrap();
        assert_eq!(req.reading_type, 0x1234);
        assert!(req.value.is_empty());
    }

    #[test]
    fn test_decode_set_request_with_value() {
        let req = ParamRequest::decode(Bytes::from_static(&[0x00, 0x05, 0xAA, 0xBB])).unwrap();
        assert_eq!(req.reading_type, 5);
        assert_eq!(&req.value[..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_decode_short_request() {
        assert!(ParamRequest::decode(Bytes::from_static(&[0x01])).is_err());
    }

    #[test]
    fn test_response_success_copies_value() {
        let body = [0, 0x00, 0x2A, 1, 2, 3, 4];
        let resp = ParamResponse::decode(&body).unwrap();

        let mut out = [0u8; 4];
        let reply: ParamReply<GetStatus> = resp.copy_value(0x2A, &mut out);

        assert_eq!(reply.status, GetStatus::Success);
        assert_eq!(reply.len, 4);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_response_type_mismatch() {
        let body = [0, 0x00, 0x2B, 1];
        let resp = ParamResponse::decode(&body).unwrap();

        let mut out = [0u8; 4];
        let reply: ParamReply<GetStatus> = resp.copy_value(0x2A, &mut out);
        assert_eq!(reply, ParamReply::failed());
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn test_response_oversize_overrides_status() {
        let body = [0, 0x00, 0x07, 1, 2, 3];
        let resp = ParamResponse::decode(&body).unwrap();

        let mut out = [0u8; 2];
        let reply: ParamReply<SetStatus> = resp.copy_value(7, &mut out);
        assert_eq!(reply.status, SetStatus::GenErr);
        assert_eq!(reply.len, 0);
    }

    #[test]
    fn test_response_failure_status_passed_through() {
        let body = [1, 0x00, 0x07];
        let resp = ParamResponse::decode(&body).unwrap();

        let reply: ParamReply<SetStatus> = resp.copy_value(7, &mut []);
        assert_eq!(reply.status, SetStatus::ReadOnly);
        assert!(!reply.is_success());
    }

    #[test]
    fn test_response_too_short() {
        assert!(ParamResponse::decode(&[0, 1]).is_none());
    }

    #[test]
    fn test_response_encode() {
        let resp = ParamResponse {
            status: SetStatus::Success.as_u8(),
            reading_type: 0x0102,
            value: &[9, 8],
        };
        let mut buf = vec![0u8; resp.encoded_len()];
        resp.encode_into(&mut buf);

        assert_eq!(buf, [0, 0x01, 0x02, 9, 8]);
        assert_eq!(ParamResponse::decode(&buf), Some(resp));
    }
}
