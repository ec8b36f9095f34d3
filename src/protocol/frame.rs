//! HDLC frame types and control values.
//!
//! [`HdlcFrame`] is what gets handed to the encoder for transmission,
//! [`RxFrame`] is what the decoder reports once a closing flag arrives.
//! Uses `bytes::Bytes` so received payloads can be shared without copying.
//!
//! # Example
//!
//! ```
//! use b2b_link::protocol::{ControlInfo, FrameKind, HdlcFrame, UI_CONTROL};
//!
//! let packet = [1u8, 0, 7, 0, 10, 0, 0];
//! let frame = HdlcFrame::new(1, UI_CONTROL, &packet);
//!
//! assert_eq!(frame.packet, &packet);
//! assert_eq!(ControlInfo::from_control(frame.control).kind, FrameKind::Unnumbered);
//! ```

use bytes::Bytes;

const SEQ_MASK: u8 = 0x07;
const UCMD_MASK: u8 = 0x3B;
const SCMD_MASK: u8 = 0x03;

const SEND_SEQ_OFFSET: u8 = 1;
const REC_SEQ_OFFSET: u8 = 5;
const PF_BIT_OFFSET: u8 = 4;
const SCMD_OFFSET: u8 = 2;
const UCMD_OFFSET: u8 = 2;

const I_FRAME_MASK: u8 = 0x01;
const SU_FRAME_MASK: u8 = 0x03;

/// Control value for unnumbered information frames, the only kind the
/// B2B link sends.
pub const UI_CONTROL: u8 = FrameKind::Unnumbered as u8;

/// Unnumbered commands.
pub mod ucmd {
    /// Set Normal Response Mode.
    pub const SNRM: u8 = 0x20;
    /// Set Asynchronous Response Mode.
    pub const SARM: u8 = 0x03;
    /// Set Asynchronous Balanced Mode.
    pub const SABM: u8 = 0x0B;
    /// Disconnect.
    pub const DISC: u8 = 0x10;
    /// Set Normal Response Mode Extended.
    pub const SNRME: u8 = 0x33;
    /// Set Asynchronous Response Mode Extended.
    pub const SARME: u8 = 0x13;
    /// Set Asynchronous Balanced Mode Extended.
    pub const SABME: u8 = 0x1B;
    /// Set Initialization Mode.
    pub const SIM: u8 = 0x01;
    /// Unnumbered Poll.
    pub const UP: u8 = 0x08;
    /// Unnumbered Information.
    pub const UI: u8 = 0x00;
    /// Exchange ID.
    pub const XID: u8 = 0x2B;
    /// Reset.
    pub const RSET: u8 = 0x23;
    /// Test.
    pub const TEST: u8 = 0x38;
    /// Set Mode.
    pub const SM: u8 = 0x30;
    /// Unnumbered Information with Header.
    pub const UIH: u8 = 0x3B;
}

/// Standard responses to unnumbered commands.
pub mod uresp {
    /// Unnumbered Acknowledgement.
    pub const UA: u8 = 0x18;
    /// Frame Error.
    pub const FRMR: u8 = 0x21;
    /// Disconnected Mode.
    pub const DM: u8 = 0x03;
    /// Request Disconnect.
    pub const RD: u8 = 0x10;
    /// Request Initialization Mode.
    pub const RIM: u8 = 0x01;
    /// Unnumbered Information.
    pub const UI: u8 = 0x00;
    /// Exchange ID.
    pub const XID: u8 = 0x2B;
    /// Test.
    pub const TEST: u8 = 0x38;
    /// Unnumbered Information with Header.
    pub const UIH: u8 = 0x3B;
}

/// Supervisory commands.
pub mod scmd {
    /// Receive Ready.
    pub const RR: u8 = 0x00;
    /// Reject.
    pub const REJ: u8 = 0x01;
    /// Receive Not Ready.
    pub const RNR: u8 = 0x02;
    /// Selective Reject.
    pub const SREJ: u8 = 0x03;
}

/// HDLC frame kinds, as encoded in the low bits of the control value.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Information frame with data.
    #[default]
    Information = 0x00,
    /// Supervisory frame for error and flow control.
    Supervisory = 0x01,
    /// Unnumbered frame for miscellaneous data and link control.
    Unnumbered = 0x03,
}

/// Everything that can be carried in an HDLC control value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlInfo {
    /// Frame kind.
    pub kind: FrameKind,
    /// Unnumbered command (see [`ucmd`]), U-frames only.
    pub u_command: u8,
    /// Supervisory command (see [`scmd`]), S-frames only.
    pub s_command: u8,
    /// Send sequence, I-frames only.
    pub send_sequence: u8,
    /// Receive sequence, I and S-frames.
    pub rec_sequence: u8,
    /// Poll/Final bit.
    pub pf_bit: bool,
}

impl ControlInfo {
    /// Unnumbered frame carrying `command`.
    pub fn unnumbered(command: u8, pf_bit: bool) -> Self {
        Self {
            kind: FrameKind::Unnumbered,
            u_command: command,
            pf_bit,
            ..Self::default()
        }
    }

    /// Supervisory frame carrying `command`.
    pub fn supervisory(command: u8, rec_sequence: u8, pf_bit: bool) -> Self {
        Self {
            kind: FrameKind::Supervisory,
            s_command: command,
            rec_sequence,
            pf_bit,
            ..Self::default()
        }
    }

    /// Numbered information frame.
    pub fn information(send_sequence: u8, rec_sequence: u8, pf_bit: bool) -> Self {
        Self {
            kind: FrameKind::Information,
            send_sequence,
            rec_sequence,
            pf_bit,
            ..Self::default()
        }
    }

    /// Build the raw control value.
    pub fn to_control(&self) -> u8 {
        let mut control = self.kind as u8;
        let pf = if self.pf_bit { 1 << PF_BIT_OFFSET } else { 0 };

        match self.kind {
            FrameKind::Information => {
                control |= (self.send_sequence & SEQ_MASK) << SEND_SEQ_OFFSET;
                control |= pf;
                control |= (self.rec_sequence & SEQ_MASK) << REC_SEQ_OFFSET;
            }
            FrameKind::Supervisory => {
                control |= (self.s_command & SCMD_MASK) << SCMD_OFFSET;
                control |= pf;
                control |= (self.rec_sequence & SEQ_MASK) << REC_SEQ_OFFSET;
            }
            FrameKind::Unnumbered => {
                control |= self.u_command << UCMD_OFFSET;
                control |= pf;
            }
        }

        control
    }

    /// Parse a raw control value.
    pub fn from_control(value: u8) -> Self {
        let kind = if value & I_FRAME_MASK == 0 {
            FrameKind::Information
        } else if value & SU_FRAME_MASK == FrameKind::Unnumbered as u8 {
            FrameKind::Unnumbered
        } else {
            FrameKind::Supervisory
        };
        let pf_bit = value & (1 << PF_BIT_OFFSET) != 0;

        match kind {
            FrameKind::Information => Self {
                kind,
                send_sequence: (value >> SEND_SEQ_OFFSET) & SEQ_MASK,
                rec_sequence: (value >> REC_SEQ_OFFSET) & SEQ_MASK,
                pf_bit,
                ..Self::default()
            },
            FrameKind::Supervisory => Self {
                kind,
                s_command: (value >> SCMD_OFFSET) & SCMD_MASK,
                rec_sequence: (value >> REC_SEQ_OFFSET) & SEQ_MASK,
                pf_bit,
                ..Self::default()
            },
            FrameKind::Unnumbered => Self {
                kind,
                u_command: (value >> UCMD_OFFSET) & UCMD_MASK,
                pf_bit,
                ..Self::default()
            },
        }
    }
}

/// Frame to be transmitted.
///
/// Borrows the packet bytes; the frame only lives until it is encoded.
#[derive(Debug, Clone, Copy)]
pub struct HdlcFrame<'a> {
    /// Destination address.
    pub address: u8,
    /// Control value.
    pub control: u8,
    /// Information field.
    pub packet: &'a [u8],
}

impl<'a> HdlcFrame<'a> {
    /// Create a new frame.
    pub fn new(address: u8, control: u8, packet: &'a [u8]) -> Self {
        Self {
            address,
            control,
            packet,
        }
    }

    /// Create a UI frame, the kind used for all B2B traffic.
    pub fn ui(address: u8, packet: &'a [u8]) -> Self {
        Self::new(address, UI_CONTROL, packet)
    }
}

/// Frame reassembled by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    /// Address the frame was sent to.
    pub address: u8,
    /// Control value.
    pub control: u8,
    /// Information field (truncated when `overflow` is set).
    pub data: Bytes,
    /// Set if the frame did not fit in the receive buffer.
    pub overflow: bool,
}

impl RxFrame {
    /// A frame is only usable if it was received completely.
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.overflow
    }

    /// Parsed control information.
    #[inline]
    pub fn control_info(&self) -> ControlInfo {
        ControlInfo::from_control(self.control)
    }
}
