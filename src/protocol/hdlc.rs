//! HDLC framing: byte stuffing, FCS, and incremental frame reassembly.
//!
//! Wire layout of one frame:
//! ```text
//! ┌──────┬─────────┬─────────┬─────────────┬─────────┬──────┐
//! │ 0x7E │ Address │ Control │ Information │ FCS     │ 0x7E │
//! │      │ 1 byte  │ 1 byte  │ 0..MRU      │ 2 bytes │      │
//! └──────┴─────────┴─────────┴─────────────┴─────────┴──────┘
//! ```
//!
//! Every byte between the flags that equals `0x7E` or `0x7D` is sent as
//! `0x7D` followed by the byte with bit 5 toggled. The FCS is CRC-16/X.25
//! over address, control and information, sent least significant byte
//! first.
//!
//! The decoder is a small state machine fed one byte at a time from the
//! receive loop. Any flag resynchronizes it, so line noise costs at most
//! the frame it lands in.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::{HdlcFrame, RxFrame};

/// Start/stop flag of a frame.
pub const FLAG_SEQUENCE: u8 = 0x7E;

/// Asynchronous control escape.
pub const CONTROL_ESCAPE: u8 = 0x7D;

/// Transparency modifier applied to escaped bytes.
pub const ESCAPE_BIT: u8 = 0x20;

/// Default Maximum Receive Unit (largest information field accepted).
pub const DEFAULT_MRU: usize = 2048;

/// Address, control and FCS bytes surrounding the information field.
pub const FRAME_OVERHEAD: usize = ADDR_SIZE + CTRL_SIZE + FCS_SIZE;

const ADDR_SIZE: usize = 1;
const CTRL_SIZE: usize = 1;
const FCS_SIZE: usize = 2;
const INFO_OFFSET: usize = ADDR_SIZE + CTRL_SIZE;

/// CRC16-CCITT generator, bit reversed: x^16 + x^12 + x^5 + 1.
const FCS_POLYNOMIAL: u16 = 0x8408;
const FCS_INIT: u16 = 0xFFFF;
const FCS_INVERT: u16 = 0xFFFF;
/// Residue left after running the CRC over a frame and its own FCS.
const FCS_MAGIC: u16 = 0xF0B8;

/// Fold one byte into a running FCS.
pub fn update_fcs(mut fcs: u16, byte: u8) -> u16 {
    fcs ^= u16::from(byte);
    for _ in 0..8 {
        if fcs & 1 != 0 {
            fcs = (fcs >> 1) ^ FCS_POLYNOMIAL;
        } else {
            fcs >>= 1;
        }
    }
    fcs
}

/// Compute the FCS that is transmitted for `data`.
pub fn compute_fcs(data: &[u8]) -> u16 {
    data.iter().fold(FCS_INIT, |fcs, &b| update_fcs(fcs, b)) ^ FCS_INVERT
}

/// Encode a frame, handing each wire byte to `tx` in order.
///
/// This is the byte-sink form of the encoder; it runs entirely in the
/// caller's context and blocks only if `tx` does.
pub fn encode_frame_with<F>(frame: &HdlcFrame<'_>, mut tx: F)
where
    F: FnMut(u8),
{
    let mut fcs = FCS_INIT;

    tx(FLAG_SEQUENCE);

    let head = [frame.address, frame.control];
    for &byte in head.iter().chain(frame.packet) {
        fcs = update_fcs(fcs, byte);
        tx_escaped(byte, &mut tx);
    }

    let fcs = fcs ^ FCS_INVERT;
    for byte in fcs.to_le_bytes() {
        tx_escaped(byte, &mut tx);
    }

    tx(FLAG_SEQUENCE);
}

/// Encode a frame into a contiguous buffer ready for the writer.
///
/// # Example
///
/// ```
/// use b2b_link::protocol::{encode_frame, HdlcFrame, FLAG_SEQUENCE};
///
/// let bytes = encode_frame(&HdlcFrame::ui(1, &[0x7E]));
/// assert_eq!(bytes[0], FLAG_SEQUENCE);
/// assert_eq!(&bytes[1..5], &[0x01, 0x03, 0x7D, 0x5E]);
/// assert_eq!(bytes[bytes.len() - 1], FLAG_SEQUENCE);
/// ```
pub fn encode_frame(frame: &HdlcFrame<'_>) -> Bytes {
    // Worst case every byte is escaped
    let mut buf = BytesMut::with_capacity(2 + 2 * (FRAME_OVERHEAD + frame.packet.len()));
    encode_frame_with(frame, |byte| buf.put_u8(byte));
    buf.freeze()
}

fn tx_escaped<F: FnMut(u8)>(byte: u8, tx: &mut F) {
    if byte == CONTROL_ESCAPE || byte == FLAG_SEQUENCE {
        tx(CONTROL_ESCAPE);
        tx(byte ^ ESCAPE_BIT);
    } else {
        tx(byte);
    }
}

/// Incremental frame decoder.
///
/// Feed received bytes with [`on_rx_byte`](Self::on_rx_byte) or
/// [`push`](Self::push); a frame is returned as soon as its closing flag
/// arrives, before the next byte is consumed.
pub struct HdlcDecoder {
    /// Unescaped bytes of the frame in progress, FCS included.
    buffer: BytesMut,
    /// Running FCS over `buffer` (and any overflowed bytes).
    fcs: u16,
    /// Previous byte was a control escape.
    escape: bool,
    /// More bytes arrived than fit in the buffer.
    overflow: bool,
    /// Maximum information field length.
    mru: usize,
}

impl HdlcDecoder {
    /// Create a decoder with the default MRU.
    pub fn new() -> Self {
        Self::with_mru(DEFAULT_MRU)
    }

    /// Create a decoder accepting information fields up to `mru` bytes.
    pub fn with_mru(mru: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(mru + FRAME_OVERHEAD),
            fcs: FCS_INIT,
            escape: false,
            overflow: false,
            mru,
        }
    }

    /// Maximum information field length.
    #[inline]
    pub fn mru(&self) -> usize {
        self.mru
    }

    /// Process one received byte.
    ///
    /// Returns the completed frame when `byte` is a closing flag of a frame
    /// with a good FCS. Frames that overflowed are still returned, with
    /// `overflow` set, so the consumer can log and drop them.
    pub fn on_rx_byte(&mut self, byte: u8) -> Option<RxFrame> {
        if byte == FLAG_SEQUENCE {
            let frame = self.finish_frame();
            self.reset();
            return frame;
        }

        let byte = if self.escape {
            self.escape = false;
            byte ^ ESCAPE_BIT
        } else if byte == CONTROL_ESCAPE {
            self.escape = true;
            return None;
        } else {
            byte
        };

        self.fcs = update_fcs(self.fcs, byte);

        // Keep tracking the FCS past the end of the buffer so an oversized
        // but intact frame is still reported
        if self.buffer.len() >= self.mru + FRAME_OVERHEAD {
            self.overflow = true;
            return None;
        }

        self.buffer.put_u8(byte);
        None
    }

    /// Process a chunk of received bytes and collect every completed frame.
    pub fn push(&mut self, data: &[u8]) -> Vec<RxFrame> {
        data.iter().filter_map(|&b| self.on_rx_byte(b)).collect()
    }

    /// Discard any partial frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fcs = FCS_INIT;
        self.escape = false;
        self.overflow = false;
    }

    /// Number of bytes buffered for the frame in progress.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if no frame is in progress.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn finish_frame(&mut self) -> Option<RxFrame> {
        if self.escape {
            tracing::debug!("HDLC frame aborted by flag after escape");
            return None;
        }

        // Need address, control, and FCS; anything shorter is idle fill
        if self.buffer.len() < FRAME_OVERHEAD {
            return None;
        }

        if self.fcs != FCS_MAGIC {
            tracing::debug!(
                "HDLC frame FCS error, {} bytes discarded",
                self.buffer.len()
            );
            return None;
        }

        let len = self.buffer.len();
        let mut raw = self.buffer.split_to(len);
        let address = raw[0];
        let control = raw[1];
        raw.truncate(len - FCS_SIZE);
        let data = raw.split_off(INFO_OFFSET).freeze();

        tracing::debug!(
            "HDLC got frame addr {} ctrl {:#04x} data len {}",
            address,
            control,
            data.len()
        );

        Some(RxFrame {
            address,
            control,
            data,
            overflow: self.overflow,
        })
    }
}

impl Default for HdlcDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::UI_CONTROL;

    fn decode_all(bytes: &[u8]) -> Vec<RxFrame> {
        HdlcDecoder::new().push(bytes)
    }

    #[test]
    fn test_fcs_check_value() {
        // CRC-16/X.25 check value for "123456789"
        assert_eq!(compute_fcs(b"123456789"), 0x906E);
    }

    #[test]
    fn test_fcs_residue_is_magic() {
        let data = b"board to board";
        let fcs = compute_fcs(data);

        let residue = data
            .iter()
            .chain(fcs.to_le_bytes().iter())
            .fold(FCS_INIT, |acc, &b| update_fcs(acc, b));
        assert_eq!(residue, FCS_MAGIC);
    }

    #[test]
    fn test_encode_layout() {
        let bytes = encode_frame(&HdlcFrame::ui(1, b"hi"));
        let fcs = compute_fcs(&[1, UI_CONTROL, b'h', b'i']).to_le_bytes();

        assert_eq!(
            &bytes[..],
            &[FLAG_SEQUENCE, 1, UI_CONTROL, b'h', b'i', fcs[0], fcs[1], FLAG_SEQUENCE]
        );
    }

    #[test]
    fn test_encode_escapes_special_bytes() {
        let bytes = encode_frame(&HdlcFrame::ui(0x7D, &[0x7E, 0x01, 0x7D]));

        // No flag may appear between the delimiters
        let inner = &bytes[1..bytes.len() - 1];
        assert!(!inner.contains(&FLAG_SEQUENCE));
        assert_eq!(&inner[..2], &[CONTROL_ESCAPE, 0x5D]);
        assert_eq!(&inner[3..8], &[CONTROL_ESCAPE, 0x5E, 0x01, CONTROL_ESCAPE, 0x5D]);
    }

    #[test]
    fn test_encode_with_byte_sink_matches_buffer() {
        let frame = HdlcFrame::ui(2, b"\x7e\x7d payload");
        let mut sunk = Vec::new();
        encode_frame_with(&frame, |b| sunk.push(b));

        assert_eq!(&sunk[..], &encode_frame(&frame)[..]);
    }

    #[test]
    fn test_roundtrip() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let bytes = encode_frame(&HdlcFrame::ui(1, &payload));

        let frames = decode_all(&bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].address, 1);
        assert_eq!(frames[0].control, UI_CONTROL);
        assert_eq!(&frames[0].data[..], &payload[..]);
        assert!(!frames[0].overflow);
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        let bytes = encode_frame(&HdlcFrame::new(9, 0x13, &[]));

        let frames = decode_all(&bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].address, 9);
        assert_eq!(frames[0].control, 0x13);
        assert!(frames[0].data.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let bytes = encode_frame(&HdlcFrame::ui(1, b"one byte at a time"));
        let mut decoder = HdlcDecoder::new();

        let (last, body) = bytes.split_last().unwrap();
        for &b in body {
            assert!(decoder.on_rx_byte(b).is_none());
        }
        let frame = decoder.on_rx_byte(*last).unwrap();

        assert_eq!(&frame.data[..], b"one byte at a time");
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_frame(&HdlcFrame::ui(1, b"first")));
        stream.extend_from_slice(&encode_frame(&HdlcFrame::ui(2, b"second")));
        stream.extend_from_slice(&encode_frame(&HdlcFrame::ui(1, b"third")));

        let frames = decode_all(&stream);
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[1].data[..], b"second");
        assert_eq!(frames[1].address, 2);
    }

    #[test]
    fn test_payload_at_mru_fits() {
        let payload = vec![0x55; 16];
        let bytes = encode_frame(&HdlcFrame::ui(1, &payload));

        let frames = HdlcDecoder::with_mru(16).push(&bytes);
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].overflow);
        assert_eq!(frames[0].data.len(), 16);
    }

    #[test]
    fn test_overflow_detected() {
        let payload = vec![0xA5; 17];
        let bytes = encode_frame(&HdlcFrame::ui(1, &payload));

        let frames = HdlcDecoder::with_mru(16).push(&bytes);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].overflow);
        assert!(!frames[0].is_valid());
    }

    #[test]
    fn test_decoder_recovers_after_overflow() {
        let mut decoder = HdlcDecoder::with_mru(8);
        let big = encode_frame(&HdlcFrame::ui(1, &[0u8; 32]));
        let small = encode_frame(&HdlcFrame::ui(1, b"ok"));

        assert!(decoder.push(&big)[0].overflow);
        let frames = decoder.push(&small);
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].overflow);
        assert_eq!(&frames[0].data[..], b"ok");
    }

    #[test]
    fn test_corrupted_frame_dropped() {
        let mut bytes = encode_frame(&HdlcFrame::ui(1, b"payload")).to_vec();
        bytes[4] ^= 0x01;

        assert!(decode_all(&bytes).is_empty());
    }

    #[test]
    fn test_resync_on_garbage() {
        let mut stream = vec![0x11, 0x22, 0x33];
        stream.extend_from_slice(&encode_frame(&HdlcFrame::ui(1, b"after noise")));

        let frames = decode_all(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].data[..], b"after noise");
    }

    #[test]
    fn test_flag_after_escape_aborts_frame() {
        let mut stream = vec![FLAG_SEQUENCE, 1, UI_CONTROL, 0x41, 0x42, CONTROL_ESCAPE];
        stream.extend_from_slice(&encode_frame(&HdlcFrame::ui(1, b"next")));

        let frames = decode_all(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].data[..], b"next");
    }

    #[test]
    fn test_back_to_back_flags_ignored() {
        let stream = [FLAG_SEQUENCE, FLAG_SEQUENCE, FLAG_SEQUENCE, 0x01, FLAG_SEQUENCE];
        assert!(decode_all(&stream).is_empty());
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let bytes = encode_frame(&HdlcFrame::ui(1, b"partial"));
        let mut decoder = HdlcDecoder::new();

        decoder.push(&bytes[..5]);
        assert!(!decoder.is_empty());

        decoder.reset();
        assert!(decoder.is_empty());
        assert_eq!(decoder.len(), 0);
    }
}
