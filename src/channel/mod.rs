//! Per-layer producer/consumer hand-off of volume data.
//!
//! A producer thread submits a buffer and blocks until the render thread
//! has copied it into device-visible storage, bounding how far producers
//! can run ahead. The render thread polls all layers under one brief lock
//! acquisition per layer (`take_pending`), uploads, then fires the
//! completion signal (`signal_consumed`).
//!
//! The completion signal is a fresh one-shot latch per submission rather
//! than a toggled flag: a new submission logically invalidates an in-flight
//! wait, and replacing the latch avoids lost-wakeup races. The displaced
//! waiter simply times out (see the crate-level notes on preserved
//! behavior).

use crate::renderer::signals::RendererSignals;
use crate::volume::{VolumeBuffer, VolumeDims, VoxelSize};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One-shot completion signal, created fresh for every submission.
pub(crate) struct CopyLatch {
    fired: Mutex<bool>,
    signal: Condvar,
}

impl CopyLatch {
    pub(crate) fn new() -> Self {
        Self {
            fired: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    /// Fires the latch. Waiters past and future observe the signal; firing
    /// twice is harmless.
    pub(crate) fn fire(&self) {
        let mut fired = self.fired.lock();
        *fired = true;
        self.signal.notify_all();
    }

    /// Waits up to `timeout` for the latch to fire. Spurious wake-ups
    /// re-enter the wait against the absolute deadline, so they never
    /// consume the timeout budget.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut fired = self.fired.lock();
        while !*fired {
            if self.signal.wait_until(&mut fired, deadline).timed_out() {
                return *fired;
            }
        }
        true
    }
}

/// A buffer taken off a layer's pending slot, ready for device upload.
pub(crate) struct PendingUpload {
    pub(crate) volume: VolumeBuffer,
    pub(crate) voxel_size: VoxelSize,
    /// True when this buffer's dimensions differ from the previous upload
    /// on this layer; consumed exactly once to force device-side
    /// reallocation.
    pub(crate) dims_changed: bool,
}

struct ChannelState {
    pending: Option<(VolumeBuffer, VoxelSize)>,
    latch: Option<Arc<CopyLatch>>,
    last_dims: Option<VolumeDims>,
    dims_changed: bool,
}

/// Hand-off slot for one render layer.
///
/// Invariant: at most one pending buffer at a time. Accepting a new buffer
/// while a prior one is unconsumed replaces both the buffer and the
/// completion latch; the prior submitter's wait times out silently.
pub struct LayerDataChannel {
    index: usize,
    signals: Arc<RendererSignals>,
    state: Mutex<ChannelState>,
}

impl LayerDataChannel {
    pub(crate) fn new(index: usize, signals: Arc<RendererSignals>) -> Self {
        Self {
            index,
            signals,
            state: Mutex::new(ChannelState {
                pending: None,
                latch: None,
                last_dims: None,
                dims_changed: false,
            }),
        }
    }

    /// Producer-side hand-off. Stores the buffer as pending, installs a
    /// fresh completion latch, marks the renderer-wide change flags, then
    /// blocks outside the layer lock until the render thread consumes the
    /// buffer or `timeout` elapses. Returns whether consumption completed
    /// in time.
    pub(crate) fn submit(
        &self,
        volume: VolumeBuffer,
        voxel_size: VoxelSize,
        timeout: Duration,
    ) -> bool {
        let latch = {
            let mut state = self.state.lock();
            let dims = volume.dims();
            if state.last_dims != Some(dims) {
                state.dims_changed = true;
                state.last_dims = Some(dims);
            }
            if state.pending.is_some() {
                log::debug!(
                    "[LayerDataChannel::submit] layer {} replacing unconsumed buffer",
                    self.index
                );
            }
            state.pending = Some((volume, voxel_size));
            let latch = Arc::new(CopyLatch::new());
            state.latch = Some(Arc::clone(&latch));
            self.signals.notify_change();
            latch
        };
        latch.wait(timeout)
    }

    /// Render-thread side: returns and clears the pending buffer, consuming
    /// the dims-changed flag into the result. A second call in the same
    /// frame returns `None`. Does not fire the completion latch.
    pub(crate) fn take_pending(&self) -> Option<PendingUpload> {
        let mut state = self.state.lock();
        let (volume, voxel_size) = state.pending.take()?;
        let dims_changed = state.dims_changed;
        state.dims_changed = false;
        Some(PendingUpload {
            volume,
            voxel_size,
            dims_changed,
        })
    }

    /// Render-thread side: fires the current submission's latch exactly
    /// once. Further calls before the next submission are no-ops.
    pub(crate) fn signal_consumed(&self) {
        let latch = self.state.lock().latch.take();
        if let Some(latch) = latch {
            latch.fire();
        }
    }

    /// True when a buffer is waiting to be consumed.
    pub(crate) fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::ElementType;
    use std::thread;

    fn channel() -> Arc<LayerDataChannel> {
        Arc::new(LayerDataChannel::new(0, Arc::new(RendererSignals::new())))
    }

    fn cube(side: u32) -> VolumeBuffer {
        VolumeBuffer::zeroed(ElementType::U8, VolumeDims::new(side, side, side))
    }

    #[test]
    fn test_handoff_completes_with_prompt_consumer() {
        let channel = channel();
        let consumer = Arc::clone(&channel);

        let render_thread = thread::spawn(move || loop {
            if let Some(upload) = consumer.take_pending() {
                assert_eq!(upload.volume.size_in_bytes(), 262_144);
                consumer.signal_consumed();
                break;
            }
            thread::sleep(Duration::from_millis(1));
        });

        // 64^3 unsigned bytes, consumed within a few milliseconds.
        let completed = channel.submit(cube(64), VoxelSize::default(), Duration::from_secs(5));
        assert!(completed);
        render_thread.join().expect("render thread");
    }

    #[test]
    fn test_submit_times_out_without_consumer() {
        let channel = channel();
        let start = Instant::now();
        let completed = channel.submit(cube(4), VoxelSize::default(), Duration::from_millis(50));
        assert!(!completed);
        assert!(start.elapsed() >= Duration::from_millis(50));
        // The buffer stays pending for a late consumer.
        assert!(channel.has_pending());
    }

    #[test]
    fn test_second_submission_replaces_first() {
        let channel = channel();
        let mut first = cube(4);
        first.as_bytes_mut()[0] = 1;
        let mut second = cube(4);
        second.as_bytes_mut()[0] = 2;

        assert!(!channel.submit(first, VoxelSize::default(), Duration::ZERO));
        assert!(!channel.submit(second, VoxelSize::default(), Duration::ZERO));

        // The renderer observes only the second buffer.
        let upload = channel.take_pending().expect("pending buffer");
        assert_eq!(upload.volume.as_bytes()[0], 2);
        assert!(channel.take_pending().is_none());
    }

    #[test]
    fn test_dims_changed_flag_consumed_once() {
        let channel = channel();

        assert!(!channel.submit(cube(4), VoxelSize::default(), Duration::ZERO));
        let upload = channel.take_pending().expect("pending");
        // First upload on the layer counts as a dimension change.
        assert!(upload.dims_changed);
        channel.signal_consumed();

        assert!(!channel.submit(cube(4), VoxelSize::default(), Duration::ZERO));
        let upload = channel.take_pending().expect("pending");
        assert!(!upload.dims_changed);
        channel.signal_consumed();

        assert!(!channel.submit(cube(8), VoxelSize::default(), Duration::ZERO));
        let upload = channel.take_pending().expect("pending");
        assert!(upload.dims_changed);
    }

    #[test]
    fn test_signal_consumed_without_submission_is_noop() {
        let channel = channel();
        channel.signal_consumed();
        channel.signal_consumed();
    }

    #[test]
    fn test_displaced_waiter_times_out_silently() {
        let channel = channel();
        let producer = Arc::clone(&channel);

        let first = thread::spawn(move || {
            producer.submit(cube(4), VoxelSize::default(), Duration::from_millis(200))
        });
        thread::sleep(Duration::from_millis(20));

        // Overwrite the pending buffer, then consume and signal: only the
        // second submission's latch fires.
        let consumer = Arc::clone(&channel);
        let second = thread::spawn(move || {
            consumer.submit(cube(4), VoxelSize::default(), Duration::from_secs(5))
        });
        thread::sleep(Duration::from_millis(20));
        channel.take_pending().expect("pending");
        channel.signal_consumed();

        assert!(!first.join().expect("first producer"));
        assert!(second.join().expect("second producer"));
    }

    #[test]
    fn test_submission_marks_renderer_signals() {
        let signals = Arc::new(RendererSignals::new());
        let channel = LayerDataChannel::new(0, Arc::clone(&signals));
        signals
            .parameters_changed
            .store(false, std::sync::atomic::Ordering::SeqCst);

        assert!(!channel.submit(cube(4), VoxelSize::default(), Duration::ZERO));
        assert!(signals
            .parameters_changed
            .load(std::sync::atomic::Ordering::SeqCst));
        assert!(signals.lod.is_kernel_run_needed());
    }

    #[test]
    fn test_latch_fires_before_wait_begins() {
        let latch = CopyLatch::new();
        latch.fire();
        assert!(latch.wait(Duration::ZERO));
    }
}
