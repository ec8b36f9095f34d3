//! B2B packet header encoding and decoding.
//!
//! Implements the 7-byte header carried at the start of every B2B packet:
//! ```text
//! ┌─────────┬──────────┬──────────┬──────────┐
//! │ Version │ Length   │ Msg Type │ Handle   │
//! │ 1 byte  │ 2 bytes  │ 2 bytes  │ 2 bytes  │
//! │         │ uint16 BE│ uint16 BE│ uint16 BE│
//! └─────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! `Length` counts the whole packet, header included. All multi-byte
//! integers are Big Endian, including the ones in message bodies.

use crate::error::{B2bError, Result};

/// Header size in bytes (fixed, exactly 7).
pub const HEADER_SIZE: usize = 7;

/// Supported B2B protocol version.
pub const B2B_VERSION: u8 = 1;

/// HDLC address carrying B2B packets.
pub const B2B_HDLC_ADDR: u8 = 1;

/// HDLC address carrying network tunnel traffic.
pub const NW_HDLC_ADDR: u8 = 2;

/// B2B message types.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    GetReq = 0,
    GetResp = 1,
    SetReq = 2,
    SetResp = 3,
    BasicGateway = 4,
    TimeReq = 6,
    TimeResp = 7,
    TimeSync = 8,
    Reset = 9,
    EchoReq = 10,
    EchoResp = 11,
    Decom = 12,
    IdentReq = 13,
    IdentResp = 14,
    RefreshNwReq = 15,
}

impl MessageType {
    /// Wire value of this message type.
    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Check if this type answers a request.
    ///
    /// Responses are routed to the correlator, everything else to the
    /// request handlers.
    #[inline]
    pub fn is_response(self) -> bool {
        matches!(
            self,
            MessageType::GetResp
                | MessageType::EchoResp
                | MessageType::SetResp
                | MessageType::TimeResp
                | MessageType::IdentResp
        )
    }
}

impl TryFrom<u16> for MessageType {
    type Error = B2bError;

    fn try_from(value: u16) -> Result<Self> {
        let kind = match value {
            0 => MessageType::GetReq,
            1 => MessageType::GetResp,
            2 => MessageType::SetReq,
            3 => MessageType::SetResp,
            4 => MessageType::BasicGateway,
            6 => MessageType::TimeReq,
            7 => MessageType::TimeResp,
            8 => MessageType::TimeSync,
            9 => MessageType::Reset,
            10 => MessageType::EchoReq,
            11 => MessageType::EchoResp,
            12 => MessageType::Decom,
            13 => MessageType::IdentReq,
            14 => MessageType::IdentResp,
            15 => MessageType::RefreshNwReq,
            other => {
                return Err(B2bError::Protocol(format!(
                    "Unknown message type {}",
                    other
                )))
            }
        };
        Ok(kind)
    }
}

impl From<MessageType> for u16 {
    fn from(kind: MessageType) -> Self {
        kind.as_u16()
    }
}

/// Decoded B2B packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Protocol version.
    pub version: u8,
    /// Total packet length including this header.
    pub length: u16,
    /// Raw message type (see [`MessageType`]).
    pub message_type: u16,
    /// Correlation token echoed by responses.
    pub handle: u16,
}

impl PacketHeader {
    /// Create a header for the supported protocol version.
    pub fn new(message_type: MessageType, length: u16, handle: u16) -> Self {
        Self {
            version: B2B_VERSION,
            length,
            message_type: message_type.as_u16(),
            handle,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use b2b_link::protocol::{MessageType, PacketHeader, HEADER_SIZE};
    ///
    /// let header = PacketHeader::new(MessageType::EchoReq, 7, 42);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(bytes, [1, 0, 7, 0, 10, 0, 42]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into the start of an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (7 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0] = self.version;
        store_u16(&mut buf[1..3], self.length);
        store_u16(&mut buf[3..5], self.message_type);
        store_u16(&mut buf[5..7], self.handle);
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Pure decode: no field is validated. Returns `None` if buffer is too
    /// short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            version: buf[0],
            length: get_u16(&buf[1..3]),
            message_type: get_u16(&buf[3..5]),
            handle: get_u16(&buf[5..7]),
        })
    }

    /// Validate the header against the bytes actually received.
    ///
    /// Checks:
    /// - Version equals [`B2B_VERSION`]
    /// - Length equals `received_len`
    pub fn validate(&self, received_len: usize) -> Result<()> {
        if self.version != B2B_VERSION {
            return Err(B2bError::Protocol(format!(
                "Unsupported version {}",
                self.version
            )));
        }

        if usize::from(self.length) != received_len {
            return Err(B2bError::Protocol(format!(
                "Header length {} does not match {} bytes received",
                self.length, received_len
            )));
        }

        Ok(())
    }

    /// Typed message type, if the code is known.
    #[inline]
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::try_from(self.message_type).ok()
    }

    /// Check if this header belongs to a response packet.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.kind().is_some_and(MessageType::is_response)
    }

    /// Body length implied by the header.
    #[inline]
    pub fn body_len(&self) -> usize {
        usize::from(self.length).saturating_sub(HEADER_SIZE)
    }
}

/// Store a header at the start of a packet buffer (standalone function).
#[inline]
pub fn store_header(buf: &mut [u8], header: &PacketHeader) {
    header.encode_into(buf);
}

/// Decode a header from packet bytes (standalone function).
#[inline]
pub fn get_header(buf: &[u8]) -> Option<PacketHeader> {
    PacketHeader::decode(buf)
}

/// Store a u16 in B2B byte order.
#[inline]
pub fn store_u16(buf: &mut [u8], value: u16) {
    buf[..2].copy_from_slice(&value.to_be_bytes());
}

/// Store a u32 in B2B byte order.
#[inline]
pub fn store_u32(buf: &mut [u8], value: u32) {
    buf[..4].copy_from_slice(&value.to_be_bytes());
}

/// Read a u16 in B2B byte order.
#[inline]
pub fn get_u16(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[0], buf[1]])
}

/// Read a u32 in B2B byte order.
#[inline]
pub fn get_u32(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = PacketHeader::new(MessageType::GetReq, 9, 0xBEEF);
        let encoded = original.encode();
        let decoded = PacketHeader::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = PacketHeader {
            version: 0x01,
            length: 0x0203,
            message_type: 0x0405,
            handle: 0x0607,
        };
        let bytes = header.encode();

        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 6];
        assert!(PacketHeader::decode(&buf).is_none());
    }

    #[test]
    fn test_decode_ignores_trailing_body() {
        let mut packet = PacketHeader::new(MessageType::SetReq, 10, 3).encode().to_vec();
        packet.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

        let header = PacketHeader::decode(&packet).unwrap();
        assert_eq!(header.kind(), Some(MessageType::SetReq));
        assert_eq!(header.body_len(), 3);
    }

    #[test]
    fn test_validate_version_mismatch() {
        let mut header = PacketHeader::new(MessageType::EchoReq, 7, 0);
        header.version = 2;

        let result = header.validate(7);
        assert!(result.unwrap_err().to_string().contains("Unsupported version"));
    }

    #[test]
    fn test_validate_length_mismatch() {
        let header = PacketHeader::new(MessageType::EchoReq, 8, 0);

        assert!(header.validate(7).is_err());
        assert!(header.validate(8).is_ok());
    }

    #[test]
    fn test_response_classification() {
        let responses = [
            MessageType::GetResp,
            MessageType::SetResp,
            MessageType::TimeResp,
            MessageType::EchoResp,
            MessageType::IdentResp,
        ];
        let requests = [
            MessageType::GetReq,
            MessageType::SetReq,
            MessageType::BasicGateway,
            MessageType::TimeReq,
            MessageType::TimeSync,
            MessageType::Reset,
            MessageType::EchoReq,
            MessageType::Decom,
            MessageType::IdentReq,
            MessageType::RefreshNwReq,
        ];

        assert!(responses.iter().all(|t| t.is_response()));
        assert!(requests.iter().all(|t| !t.is_response()));
    }

    #[test]
    fn test_message_type_codes() {
        for code in 0u16..=15 {
            match MessageType::try_from(code) {
                Ok(kind) => assert_eq!(kind.as_u16(), code),
                Err(_) => assert_eq!(code, 5),
            }
        }
        assert!(MessageType::try_from(0x1234).is_err());
    }

    #[test]
    fn test_unknown_type_is_not_response() {
        let header = PacketHeader {
            version: B2B_VERSION,
            length: 7,
            message_type: 99,
            handle: 0,
        };
        assert!(header.kind().is_none());
        assert!(!header.is_response());
    }

    #[test]
    fn test_integer_helpers() {
        let mut buf = [0u8; 6];
        store_u16(&mut buf, 0xA1B2);
        store_u32(&mut buf[2..], 0x0102_0304);

        assert_eq!(buf, [0xA1, 0xB2, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(get_u16(&buf), 0xA1B2);
        assert_eq!(get_u32(&buf[2..]), 0x0102_0304);
    }

    #[test]
    fn test_standalone_functions() {
        let header = PacketHeader::new(MessageType::TimeSync, 17, 65535);

        let mut buf = [0u8; HEADER_SIZE];
        store_header(&mut buf, &header);
        assert_eq!(buf, header.encode());
        assert_eq!(get_header(&buf), Some(header));
    }
}
