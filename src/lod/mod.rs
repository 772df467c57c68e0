//! Adaptive level-of-detail multi-pass scheduler.
//!
//! When rendering parameters or volume data change, the controller starts a
//! multi-pass sequence: a Fibonacci number of reduced-quality passes that
//! blend into the accumulation target, each offset by a low-discrepancy
//! phase so successive passes decorrelate. While the user keeps
//! interacting, the sequence restarts from scratch because partial progress
//! renders a stale view. When a sequence completes, the pass count is
//! re-fitted to the current ray-march step budget.
//!
//! All state is atomic; the controller is shared by the render thread
//! (`before_frame`) and any thread that reports parameter changes or user
//! input.

use crate::constants::lod::{
    fibonacci, FIBONACCI, INITIAL_FIBONACCI_INDEX, INTERACTION_MARGIN, MAX_RENDER_STEPS_PER_PASS,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

lazy_static::lazy_static! {
    /// Process-wide epoch the interaction timestamps are measured against.
    static ref PROCESS_EPOCH: Instant = Instant::now();
}

/// Sentinel for "no interaction recorded".
const NEVER: u64 = u64::MAX;

fn monotonic_ns() -> u64 {
    PROCESS_EPOCH.elapsed().as_nanos() as u64
}

/// Multi-pass scheduling state for one renderer.
pub struct AdaptiveLodController {
    active: AtomicBool,
    in_progress: AtomicBool,
    fibonacci_index: AtomicUsize,
    generator: AtomicU32,
    pass_index: AtomicU32,
    current_max_steps: AtomicU32,
    last_interaction_ns: AtomicU64,
}

impl AdaptiveLodController {
    pub fn new() -> Self {
        let controller = Self {
            active: AtomicBool::new(true),
            in_progress: AtomicBool::new(false),
            fibonacci_index: AtomicUsize::new(INITIAL_FIBONACCI_INDEX),
            generator: AtomicU32::new(1),
            pass_index: AtomicU32::new(0),
            current_max_steps: AtomicU32::new(0),
            last_interaction_ns: AtomicU64::new(NEVER),
        };
        controller.set_fibonacci_index(INITIAL_FIBONACCI_INDEX);
        controller
    }

    /// Enables or disables adaptive multi-pass rendering. While inactive the
    /// pass count reports 1, so any change completes in a single
    /// full-quality pass.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// A rendering parameter or the volume data changed; a (new) multi-pass
    /// sequence is required.
    pub fn notify_change_occurred(&self) {
        self.in_progress.store(true, Ordering::SeqCst);
    }

    /// The caller's current full-quality ray-march step budget. Consulted
    /// only when a sequence completes, to re-fit the pass count.
    pub fn notify_max_steps(&self, max_steps: u32) {
        self.current_max_steps.store(max_steps, Ordering::SeqCst);
    }

    /// True while a multi-pass sequence is in progress and the kernel must
    /// run this frame.
    pub fn is_kernel_run_needed(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// The first pass of a sequence draws over a cleared accumulation
    /// target; later passes blend into it.
    pub fn is_buffer_clearing_needed(&self) -> bool {
        self.pass_index.load(Ordering::SeqCst) == 0
    }

    pub fn pass_index(&self) -> u32 {
        self.pass_index.load(Ordering::SeqCst)
    }

    pub fn number_of_passes(&self) -> u32 {
        if !self.is_active() {
            return 1;
        }
        fibonacci(self.fibonacci_index.load(Ordering::SeqCst))
    }

    /// Low-discrepancy dithering offset for the current pass, in `[0, 1)`.
    pub fn phase(&self) -> f32 {
        let passes = self.number_of_passes();
        let generator = self.generator.load(Ordering::SeqCst);
        let pass = self.pass_index.load(Ordering::SeqCst);
        ((pass * generator) % passes) as f32 / passes as f32
    }

    /// Advances the sequence at the top of every frame. Restarts from pass 0
    /// while the user is interacting; otherwise steps forward, and on the
    /// final pass re-fits the pass count and returns to idle.
    pub fn before_frame(&self) {
        if !self.in_progress.load(Ordering::SeqCst) {
            return;
        }
        if self.is_interacting() {
            // The view is stale; partial progress is worthless.
            log::trace!("[AdaptiveLodController::before_frame] interaction, restarting sequence");
            self.pass_index.store(0, Ordering::SeqCst);
            return;
        }
        let next = self.pass_index.load(Ordering::SeqCst) + 1;
        if next < self.number_of_passes() {
            self.pass_index.store(next, Ordering::SeqCst);
        } else {
            log::debug!(
                "[AdaptiveLodController::before_frame] sequence of {} passes complete",
                self.number_of_passes()
            );
            self.in_progress.store(false, Ordering::SeqCst);
            if self.is_active() {
                self.refit_fibonacci_index();
            }
            self.pass_index.store(0, Ordering::SeqCst);
        }
    }

    /// Extension point mirroring `before_frame`; currently nothing happens
    /// after a frame.
    pub fn after_frame(&self) {}

    pub fn notify_interaction_start(&self) {
        self.last_interaction_ns
            .store(monotonic_ns(), Ordering::SeqCst);
    }

    pub fn notify_interaction_end(&self) {
        self.last_interaction_ns.store(NEVER, Ordering::SeqCst);
    }

    /// True within the hysteresis margin after the last reported input, so
    /// brief pauses between drag events do not trigger a full-quality pass.
    pub fn is_interacting(&self) -> bool {
        let last = self.last_interaction_ns.load(Ordering::SeqCst);
        if last == NEVER {
            return false;
        }
        monotonic_ns().saturating_sub(last) < INTERACTION_MARGIN.as_nanos() as u64
    }

    fn set_fibonacci_index(&self, index: usize) {
        self.fibonacci_index.store(index, Ordering::SeqCst);
        self.generator.store(fibonacci(index - 1), Ordering::SeqCst);
    }

    /// Re-derives the table position from the current step budget: the
    /// ideal pass count keeps each pass near `MAX_RENDER_STEPS_PER_PASS`
    /// steps, and the first table entry exceeding it wins. Scenes needing
    /// many steps get split into more, cheaper passes.
    fn refit_fibonacci_index(&self) {
        let steps = self.current_max_steps.load(Ordering::SeqCst);
        let target = (steps as f32 / MAX_RENDER_STEPS_PER_PASS as f32).round() as u32;
        for position in 1..FIBONACCI.len() {
            if fibonacci(position) > target {
                log::trace!(
                    "[AdaptiveLodController::refit_fibonacci_index] steps={} target={} -> index {}",
                    steps,
                    target,
                    position
                );
                self.set_fibonacci_index(position);
                break;
            }
        }
    }
}

impl Default for AdaptiveLodController {
    fn default() -> Self {
        Self::new()
    }
}
