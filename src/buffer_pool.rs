//! Bounded packet buffer pool.
//!
//! Every outbound packet and every queued response lives in a
//! [`PacketBuf`] taken from a [`PacketPool`]. The pool only counts
//! outstanding buffers; allocation fails immediately once the count reaches
//! capacity, and a buffer gives its slot back when dropped, so every exit
//! path frees.
//!
//! # Configuration
//!
//! - `capacity`: Maximum buffers outstanding at once (default: 16)
//! - `max_packet`: Largest buffer that may be requested (default: MRU)
//!
//! On top of `capacity`, [`RESPONSE_RESERVE`] slots are held back for
//! [`PacketPool::alloc_response`]. Requests waiting for the exchange each
//! hold a packet, so without the reserve a full pool would leave no room
//! to buffer the response they are all waiting on.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{B2bError, Result};
use crate::protocol::DEFAULT_MRU;

/// Default number of buffers that may be outstanding.
pub const DEFAULT_POOL_BUFFERS: usize = 16;

/// Slots reserved for received responses; one exchange is armed at a time.
pub const RESPONSE_RESERVE: usize = 1;

/// Shared handle to the packet buffer pool.
///
/// Cheap to clone; clones share the same outstanding count.
#[derive(Clone)]
pub struct PacketPool {
    outstanding: Arc<AtomicUsize>,
    /// Response slots in use, out of `RESPONSE_RESERVE`.
    reserved: Arc<AtomicUsize>,
    capacity: usize,
    max_packet: usize,
}

impl PacketPool {
    /// Create a pool of `capacity` buffers of at most `max_packet` bytes.
    pub fn new(capacity: usize, max_packet: usize) -> Self {
        Self {
            outstanding: Arc::new(AtomicUsize::new(0)),
            reserved: Arc::new(AtomicUsize::new(0)),
            capacity,
            max_packet,
        }
    }

    /// Allocate a zeroed buffer of exactly `len` bytes.
    pub fn alloc(&self, len: usize) -> Result<PacketBuf> {
        self.check_len(len)?;

        if !take_slot(&self.outstanding, self.capacity) {
            tracing::error!("Packet pool exhausted ({} buffers)", self.capacity);
            return Err(B2bError::PoolExhausted);
        }

        Ok(PacketBuf {
            data: vec![0u8; len],
            outstanding: self.outstanding.clone(),
        })
    }

    /// Allocate a buffer for a received response holding a copy of `data`.
    ///
    /// Takes a reserved slot first and falls back to the shared ones, so a
    /// response can be buffered while requests hold every shared slot.
    pub fn alloc_response(&self, data: &[u8]) -> Result<PacketBuf> {
        self.check_len(data.len())?;

        let slot = if take_slot(&self.reserved, RESPONSE_RESERVE) {
            self.reserved.clone()
        } else if take_slot(&self.outstanding, self.capacity) {
            self.outstanding.clone()
        } else {
            tracing::error!(
                "Packet pool exhausted ({} buffers + {} reserved)",
                self.capacity,
                RESPONSE_RESERVE
            );
            return Err(B2bError::PoolExhausted);
        };

        Ok(PacketBuf {
            data: data.to_vec(),
            outstanding: slot,
        })
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_packet {
            tracing::error!("Packet alloc of {} bytes exceeds {}", len, self.max_packet);
            return Err(B2bError::PacketTooLarge {
                len,
                max: self.max_packet,
            });
        }
        Ok(())
    }

    /// Buffers currently outstanding, reserved slots included.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire) + self.reserved.load(Ordering::Acquire)
    }

    /// Buffers that can still be allocated with [`alloc`](Self::alloc).
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.outstanding.load(Ordering::Acquire))
    }

    /// Maximum outstanding buffers.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest buffer that can be allocated.
    #[inline]
    pub fn max_packet(&self) -> usize {
        self.max_packet
    }
}

/// Take one slot from `counter` unless it is already at `limit`.
fn take_slot(counter: &AtomicUsize, limit: usize) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (current < limit).then_some(current + 1)
        })
        .is_ok()
}

impl Default for PacketPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_BUFFERS, DEFAULT_MRU)
    }
}

impl fmt::Debug for PacketPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketPool")
            .field("outstanding", &self.outstanding())
            .field("reserved", &self.reserved.load(Ordering::Acquire))
            .field("capacity", &self.capacity)
            .field("max_packet", &self.max_packet)
            .finish()
    }
}

/// A buffer borrowed from a [`PacketPool`].
///
/// Releases its pool slot on drop.
pub struct PacketBuf {
    data: Vec<u8>,
    /// Counter the slot was taken from.
    outstanding: Arc<AtomicUsize>,
}

impl Deref for PacketBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PacketBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PacketBuf {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::Release);
    }
}

impl fmt::Debug for PacketBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuf")
            .field("len", &self.data.len())
            .finish()
    }
}
