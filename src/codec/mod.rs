//! Codec module - B2B message bodies.
//!
//! - `params` - Get/Set request and response bodies, status codes
//! - `time` - time request/response and time sync bodies
//!
//! Bodies follow the packet header and use the same Big Endian byte order.
//! Reading types are opaque 16-bit codes.
//!
//! # Example
//!
//! ```
//! use b2b_link::codec::{GetStatus, ParamReply, ParamResponse};
//!
//! let body = [0, 0x00, 0x2A, 0xDE, 0xAD];
//! let resp = ParamResponse::decode(&body).unwrap();
//!
//! let mut value = [0u8; 2];
//! let reply: ParamReply<GetStatus> = resp.copy_value(0x2A, &mut value);
//! assert!(reply.is_success());
//! assert_eq!(value, [0xDE, 0xAD]);
//! ```

mod params;
mod time;

pub use params::{
    GetStatus, ParamReply, ParamRequest, ParamResponse, ParamStatus, SetStatus,
    GET_REQ_BODY_SIZE, PARAM_RESP_BASE_SIZE, SET_REQ_BASE_SIZE,
};
pub use time::{TimeSet, TIME_BODY_SIZE};
