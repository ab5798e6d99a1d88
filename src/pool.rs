//! Reusable scratch buffers for the two allocation-heavy paths: the
//! per-packet inbound frame pipeline and enunciate snapshots.
//!
//! Both pools are growable free lists with O(1) acquire/release. Leases hand
//! the buffer back on drop, so a snapshot can be lent across the recognition
//! call and still find its way home on every exit path.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::codec::MAX_FRAME_SIZE;
use crate::ring_buffer::BYTES_PER_SECOND;

/// Scratch space for one inbound frame: decode at 48 kHz, downsample to
/// 16 kHz, serialize to bytes.
pub struct InboundFrameBuffers {
    pub decode: Vec<i16>,
    pub downsample: Vec<i16>,
    pub bytes: Vec<u8>,
}

impl InboundFrameBuffers {
    fn new() -> Self {
        Self {
            decode: vec![0i16; MAX_FRAME_SIZE],
            downsample: vec![0i16; MAX_FRAME_SIZE / 3],
            bytes: vec![0u8; MAX_FRAME_SIZE / 3 * 2],
        }
    }
}

static INBOUND_POOL: Lazy<Mutex<Vec<InboundFrameBuffers>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Process-wide lease on a set of inbound frame buffers.
pub struct InboundLease {
    bufs: Option<InboundFrameBuffers>,
}

/// Acquires inbound frame buffers, reusing a free set when available.
pub fn acquire_inbound() -> InboundLease {
    let bufs = INBOUND_POOL
        .lock()
        .unwrap()
        .pop()
        .unwrap_or_else(InboundFrameBuffers::new);
    InboundLease { bufs: Some(bufs) }
}

impl Deref for InboundLease {
    type Target = InboundFrameBuffers;
    fn deref(&self) -> &Self::Target {
        self.bufs.as_ref().expect("lease already released")
    }
}

impl DerefMut for InboundLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.bufs.as_mut().expect("lease already released")
    }
}

impl Drop for InboundLease {
    fn drop(&mut self) {
        if let Some(bufs) = self.bufs.take() {
            INBOUND_POOL.lock().unwrap().push(bufs);
        }
    }
}

/// Pool of byte buffers sized to the worst-case snapshot
/// (`max_lookback_sec × 32000` bytes).
pub struct SnapshotPool {
    free: Mutex<Vec<Vec<u8>>>,
    buf_bytes: usize,
}

impl SnapshotPool {
    pub fn new(max_lookback_sec: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            buf_bytes: max_lookback_sec.max(1) * BYTES_PER_SECOND,
        })
    }

    /// Acquires a full-size snapshot buffer. The lease returns it on drop.
    pub fn acquire(self: &Arc<Self>) -> SnapshotLease {
        let buf = self
            .free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buf_bytes]);
        SnapshotLease {
            buf: Some(buf),
            pool: self.clone(),
        }
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buf_bytes
    }

    fn release(&self, buf: Vec<u8>) {
        self.free.lock().unwrap().push(buf);
    }
}

/// Scoped lease on a snapshot buffer.
pub struct SnapshotLease {
    buf: Option<Vec<u8>>,
    pool: Arc<SnapshotPool>,
}

impl Deref for SnapshotLease {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.buf.as_deref().expect("lease already released")
    }
}

impl DerefMut for SnapshotLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf.as_deref_mut().expect("lease already released")
    }
}

impl Drop for SnapshotLease {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_lease_sizes() {
        let lease = acquire_inbound();
        assert_eq!(lease.decode.len(), MAX_FRAME_SIZE);
        assert_eq!(lease.downsample.len(), MAX_FRAME_SIZE / 3);
        assert_eq!(lease.bytes.len(), MAX_FRAME_SIZE / 3 * 2);
    }

    #[test]
    fn snapshot_buffers_are_reused() {
        let pool = SnapshotPool::new(2);
        {
            let mut lease = pool.acquire();
            lease[0] = 0x42;
        }
        // Returned on drop; the next acquire hands the same buffer back.
        let lease = pool.acquire();
        assert_eq!(lease.len(), 2 * BYTES_PER_SECOND);
        assert_eq!(lease[0], 0x42);
        assert!(pool.free.lock().unwrap().is_empty());
    }

    #[test]
    fn snapshot_pool_grows_under_contention() {
        let pool = SnapshotPool::new(1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.free.lock().unwrap().len(), 2);
    }
}
