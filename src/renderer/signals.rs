//! Renderer-wide change flags shared by parameter setters and the
//! per-layer hand-off channels.
//!
//! Everything here is atomic so the notify-changed routine can be invoked
//! from call sites that already hold the renderer-wide lock or a layer
//! lock without ever nesting lock acquisition.

use crate::lod::AdaptiveLodController;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) struct RendererSignals {
    /// Set by every parameter mutation and volume submission; consumed once
    /// per frame by the orchestration step.
    pub(crate) parameters_changed: AtomicBool,
    /// One-shot capture request, cleared after a notification round.
    pub(crate) capture_requested: AtomicBool,
    pub(crate) lod: AdaptiveLodController,
}

impl RendererSignals {
    pub(crate) fn new() -> Self {
        Self {
            parameters_changed: AtomicBool::new(true),
            capture_requested: AtomicBool::new(false),
            lod: AdaptiveLodController::new(),
        }
    }

    /// Records that rendering parameters or volume data changed: the next
    /// frame must run the kernel, a multi-pass sequence (re)starts, and the
    /// change counts as user interaction for the LOD hysteresis.
    pub(crate) fn notify_change(&self) {
        self.parameters_changed.store(true, Ordering::SeqCst);
        self.lod.notify_change_occurred();
        self.lod.notify_interaction_start();
    }
}
