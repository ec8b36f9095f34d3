//! Protocol module - HDLC framing and the B2B packet header.
//!
//! This module implements the two lower layers of the link:
//! - HDLC frame encoding and incremental decoding (flags, escaping, FCS)
//! - HDLC control values and frame types
//! - 7-byte B2B header encoding/decoding

mod frame;
mod hdlc;
mod wire_format;

pub use frame::{scmd, ucmd, uresp, ControlInfo, FrameKind, HdlcFrame, RxFrame, UI_CONTROL};
pub use hdlc::{
    compute_fcs, encode_frame, encode_frame_with, update_fcs, HdlcDecoder, CONTROL_ESCAPE,
    DEFAULT_MRU, ESCAPE_BIT, FLAG_SEQUENCE, FRAME_OVERHEAD,
};
pub use wire_format::{
    get_header, get_u16, get_u32, store_header, store_u16, store_u32, MessageType, PacketHeader,
    B2B_HDLC_ADDR, B2B_VERSION, HEADER_SIZE, NW_HDLC_ADDR,
};
