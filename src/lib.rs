//! Lumen Engine - real-time multi-layer volume rendering core.
//!
//! The engine orchestrates three cooperating pieces around an external GPU
//! backend:
//!
//! - [`channel::LayerDataChannel`] - per-layer producer/consumer hand-off
//!   of volume data, with a one-shot completion signal bounding how far
//!   producers run ahead of the render thread
//! - [`lod::AdaptiveLodController`] - the adaptive level-of-detail
//!   scheduler splitting rendering into Fibonacci-many cheap passes while
//!   the view changes
//! - [`volume::VolumePool`] - a bounded, best-effort buffer recycling pool
//!
//! [`VolumeRenderer`] ties them together once per frame and drives a
//! [`renderer::RenderBackend`] implementation; [`renderer::HeadlessBackend`]
//! is an in-RAM stand-in for tests and headless runs.

pub mod channel;
pub mod config;
pub mod constants;
pub mod error;
pub mod lod;
pub mod renderer;
pub mod transfer;
pub mod volume;

pub use config::RendererConfig;
pub use error::{BackendError, RenderError, RenderResult, VolumeError};
pub use lod::AdaptiveLodController;
pub use renderer::{
    CaptureListener, DeviceLimits, FrameReport, HeadlessBackend, KernelInvocation,
    RenderAlgorithm, RenderBackend, VolumeRenderer, VolumeSnapshot,
};
pub use transfer::TransferFunction;
pub use volume::{ElementType, VolumeBuffer, VolumeDims, VolumePool, VoxelSize};
