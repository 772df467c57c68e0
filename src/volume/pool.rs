//! Best-effort recycling pool for volume buffers.
//!
//! The pool is a bounded cache, not a recycling guarantee: `release` drops
//! the buffer when the pool is full, and a memory-pressure hook may clear
//! retained buffers at any moment. The slot queue therefore transports
//! [`Weak`] handles, and every consumer treats a handle that resolves to
//! nothing exactly like an empty pool.

use super::{ElementType, VolumeBuffer, VolumeDims};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Bounded pool of reusable [`VolumeBuffer`]s keyed by (element, dims).
pub struct VolumePool {
    capacity: usize,
    slots_tx: Sender<Weak<VolumeBuffer>>,
    slots_rx: Receiver<Weak<VolumeBuffer>>,
    /// Strong side keeping queued buffers alive until acquired or reclaimed.
    retained: Mutex<Vec<Arc<VolumeBuffer>>>,
}

impl VolumePool {
    /// Creates a pool holding at most `capacity` buffers. Capacity is fixed
    /// for the lifetime of the pool.
    pub fn new(capacity: usize) -> Self {
        let (slots_tx, slots_rx) = bounded(capacity.max(1));
        log::debug!("[VolumePool::new] capacity={}", capacity.max(1));
        Self {
            capacity: capacity.max(1),
            slots_tx,
            slots_rx,
            retained: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffers currently queued. Entries may still resolve to
    /// nothing by the time they are acquired.
    pub fn available(&self) -> usize {
        self.slots_rx.len()
    }

    /// Acquires a buffer of exactly the requested shape, waiting up to
    /// `timeout` for one to come back. A timeout, a reclaimed handle, or a
    /// shape mismatch all fall back to a fresh zeroed allocation; a timed
    /// caller never blocks past its budget and never comes away empty.
    pub fn acquire(
        &self,
        timeout: Duration,
        element: ElementType,
        dims: VolumeDims,
    ) -> VolumeBuffer {
        match self.slots_rx.recv_timeout(timeout) {
            Ok(handle) => match self.claim(handle) {
                Some(buffer) if buffer.matches(element, dims) => buffer,
                Some(_) => {
                    log::trace!(
                        "[VolumePool::acquire] shape mismatch, allocating {} {}",
                        element,
                        dims
                    );
                    VolumeBuffer::zeroed(element, dims)
                }
                None => {
                    log::trace!("[VolumePool::acquire] entry reclaimed, allocating fresh");
                    VolumeBuffer::zeroed(element, dims)
                }
            },
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                VolumeBuffer::zeroed(element, dims)
            }
        }
    }

    /// Acquires whatever buffer comes back first, for callers that do not
    /// know the desired shape up front. Returns `None` on timeout or when
    /// the polled entry was reclaimed; never allocates.
    pub fn acquire_any(&self, timeout: Duration) -> Option<VolumeBuffer> {
        match self.slots_rx.recv_timeout(timeout) {
            Ok(handle) => self.claim(handle),
            Err(_) => None,
        }
    }

    /// Offers a buffer back without blocking. At capacity the buffer is
    /// silently dropped.
    pub fn release(&self, buffer: VolumeBuffer) {
        let entry = Arc::new(buffer);
        let handle = Arc::downgrade(&entry);
        if self.slots_tx.try_send(handle).is_ok() {
            self.retained.lock().push(entry);
        } else {
            log::trace!("[VolumePool::release] pool full, dropping buffer");
        }
    }

    /// Memory-pressure hook: drops every retained buffer. Handles still in
    /// the queue resolve to nothing afterwards and acquisition falls back to
    /// fresh allocation.
    pub fn reclaim(&self) {
        let mut retained = self.retained.lock();
        let bytes: u64 = retained.iter().map(|b| b.size_in_bytes()).sum();
        let count = retained.len();
        retained.clear();
        if count > 0 {
            log::info!(
                "[VolumePool::reclaim] released {} buffers ({} bytes)",
                count,
                bytes
            );
        }
    }

    /// Drains the pool, releasing every still-live buffer.
    pub fn close(&self) {
        while self.slots_rx.try_recv().is_ok() {}
        self.reclaim();
    }

    /// Resolves a queued handle to an exclusively owned buffer. Returns
    /// `None` when the entry was reclaimed in the meantime.
    fn claim(&self, handle: Weak<VolumeBuffer>) -> Option<VolumeBuffer> {
        let entry = handle.upgrade()?;
        {
            let mut retained = self.retained.lock();
            retained.retain(|kept| !Arc::ptr_eq(kept, &entry));
        }
        // The queue slot and the retained entry are gone, so this is the
        // last strong reference.
        Arc::try_unwrap(entry).ok()
    }
}

impl Drop for VolumePool {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIMS: VolumeDims = VolumeDims {
        width: 8,
        height: 8,
        depth: 8,
    };

    #[test]
    fn test_empty_pool_zero_timeout_allocates_fresh() {
        let pool = VolumePool::new(4);
        let buffer = pool.acquire(Duration::ZERO, ElementType::U8, DIMS);
        assert!(buffer.matches(ElementType::U8, DIMS));
        assert_eq!(buffer.size_in_bytes(), 512);
    }

    #[test]
    fn test_release_then_acquire_reuses_buffer() {
        let pool = VolumePool::new(4);
        let mut buffer = VolumeBuffer::zeroed(ElementType::U8, DIMS);
        buffer.as_bytes_mut()[0] = 42;
        pool.release(buffer);
        assert_eq!(pool.available(), 1);

        let recycled = pool.acquire(Duration::ZERO, ElementType::U8, DIMS);
        // Recycled buffers keep their previous contents.
        assert_eq!(recycled.as_bytes()[0], 42);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_shape_mismatch_allocates_fresh() {
        let pool = VolumePool::new(4);
        pool.release(VolumeBuffer::zeroed(ElementType::U8, DIMS));

        let other_dims = VolumeDims::new(16, 16, 16);
        let buffer = pool.acquire(Duration::ZERO, ElementType::U8, other_dims);
        assert!(buffer.matches(ElementType::U8, other_dims));
    }

    #[test]
    fn test_element_mismatch_allocates_fresh() {
        let pool = VolumePool::new(4);
        pool.release(VolumeBuffer::zeroed(ElementType::U8, DIMS));

        let buffer = pool.acquire(Duration::ZERO, ElementType::U16, DIMS);
        assert!(buffer.matches(ElementType::U16, DIMS));
    }

    #[test]
    fn test_release_beyond_capacity_drops() {
        let pool = VolumePool::new(2);
        for _ in 0..5 {
            pool.release(VolumeBuffer::zeroed(ElementType::U8, DIMS));
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_reclaim_forces_fresh_allocation() {
        let pool = VolumePool::new(4);
        let mut buffer = VolumeBuffer::zeroed(ElementType::U8, DIMS);
        buffer.as_bytes_mut()[0] = 42;
        pool.release(buffer);

        pool.reclaim();

        // The queued handle is dead; the acquired buffer must be fresh.
        let buffer = pool.acquire(Duration::ZERO, ElementType::U8, DIMS);
        assert_eq!(buffer.as_bytes()[0], 0);
    }

    #[test]
    fn test_acquire_any_returns_none_when_empty() {
        let pool = VolumePool::new(4);
        assert!(pool.acquire_any(Duration::ZERO).is_none());
    }

    #[test]
    fn test_acquire_any_returns_released_buffer() {
        let pool = VolumePool::new(4);
        pool.release(VolumeBuffer::zeroed(ElementType::I16, DIMS));
        let buffer = pool.acquire_any(Duration::from_millis(100)).expect("buffer");
        assert!(buffer.matches(ElementType::I16, DIMS));
    }

    #[test]
    fn test_close_drains_pool() {
        let pool = VolumePool::new(4);
        pool.release(VolumeBuffer::zeroed(ElementType::U8, DIMS));
        pool.release(VolumeBuffer::zeroed(ElementType::U8, DIMS));
        pool.close();
        assert_eq!(pool.available(), 0);
        assert!(pool.acquire_any(Duration::ZERO).is_none());
    }
}
