//! Time request/response and time sync bodies.
//!
//! ```text
//! ┌────────────┬──────────┬───────────────┬───────────┐
//! │ QFrac      │ Seconds  │ Leap | Poll   │ Precision │
//! │ u32 BE     │ u32 BE   │ 2 bits|6 bits │ i8        │
//! └────────────┴──────────┴───────────────┴───────────┘
//! ```
//!
//! `QFrac` is the fractional second in units of 2^-32 s.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::{get_u32, store_u32};

/// Encoded size of a time body.
pub const TIME_BODY_SIZE: usize = 10;

const LEAP_SHIFT: u8 = 6;
const LEAP_MASK: u8 = 0x03;
const POLL_MASK: u8 = 0x3F;

/// Timestamp plus the sync quality fields exchanged between boards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimeSet {
    /// Seconds since the Unix epoch.
    pub seconds: u32,
    /// Fractional second, 2^-32 s units.
    pub q_frac: u32,
    /// Leap second indicator (2 bits).
    pub leap_indicator: u8,
    /// Poll interval exponent (6 bits).
    pub poll: u8,
    /// Clock precision exponent.
    pub precision: i8,
}

impl TimeSet {
    /// Snapshot the host clock.
    ///
    /// Leap indicator, poll and precision are zero; set them before sending
    /// if the local clock has better information.
    pub fn from_system_time(now: SystemTime) -> Self {
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
        let q_frac = ((u64::from(since_epoch.subsec_nanos()) << 32) / 1_000_000_000) as u32;

        Self {
            seconds: since_epoch.as_secs() as u32,
            q_frac,
            ..Self::default()
        }
    }

    /// Snapshot the current host clock.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Write the body into `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`TIME_BODY_SIZE`].
    pub fn encode_into(&self, buf: &mut [u8]) {
        store_u32(&mut buf[0..4], self.q_frac);
        store_u32(&mut buf[4..8], self.seconds);
        buf[8] = ((self.leap_indicator & LEAP_MASK) << LEAP_SHIFT) | (self.poll & POLL_MASK);
        buf[9] = self.precision as u8;
    }

    /// Encode into a fixed array.
    pub fn encode(&self) -> [u8; TIME_BODY_SIZE] {
        let mut buf = [0u8; TIME_BODY_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Decode a body. Returns `None` if it is too short.
    pub fn decode(body: &[u8]) -> Option<Self> {
        if body.len() < TIME_BODY_SIZE {
            return None;
        }
        let leap_poll = body[8];
        Some(Self {
            q_frac: get_u32(&body[0..4]),
            seconds: get_u32(&body[4..8]),
            leap_indicator: (leap_poll >> LEAP_SHIFT) & LEAP_MASK,
            poll: leap_poll & POLL_MASK,
            precision: body[9] as i8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_layout() {
        let time = TimeSet {
            seconds: 0x0102_0304,
            q_frac: 0x8000_0000,
            leap_indicator: 3,
            poll: 5,
            precision: -20,
        };

        assert_eq!(
            time.encode(),
            [0x80, 0, 0, 0, 0x01, 0x02, 0x03, 0x04, 0xC5, 0xEC]
        );
        assert_eq!(TimeSet::decode(&time.encode()), Some(time));
    }

    #[test]
    fn test_fields_are_masked() {
        let time = TimeSet {
            leap_indicator: 0xFF,
            poll: 0xFF,
            ..TimeSet::default()
        };
        let decoded = TimeSet::decode(&time.encode()).unwrap();

        assert_eq!(decoded.leap_indicator, 3);
        assert_eq!(decoded.poll, 0x3F);
    }

    #[test]
    fn test_decode_short_body() {
        assert!(TimeSet::decode(&[0u8; 9]).is_none());
    }

    #[test]
    fn test_from_system_time() {
        let now = UNIX_EPOCH + Duration::new(1_700_000_000, 500_000_000);
        let time = TimeSet::from_system_time(now);

        assert_eq!(time.seconds, 1_700_000_000);
        assert_eq!(time.q_frac, 0x8000_0000);
        assert_eq!(time.precision, 0);
    }
}
