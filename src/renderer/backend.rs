//! Backend trait the renderer drives once per frame.
//!
//! The GPU side of the engine lives behind this trait: device-limit
//! queries, device-visible volume storage, transfer-function upload, the
//! render-kernel launch, and the ordered teardown sequence. Every method is
//! called from the render thread only.

use super::layer::RenderAlgorithm;
use crate::error::BackendError;
use crate::volume::{ElementType, VolumeDims};
use glam::Mat4;

/// Capacity limits reported by the rendering device.
#[derive(Debug, Clone, Copy)]
pub struct DeviceLimits {
    /// Largest single volume buffer the device accepts, in bytes.
    pub max_volume_bytes: u64,
    /// Largest extent per axis.
    pub max_dims: VolumeDims,
}

/// One render-kernel launch for one layer.
#[derive(Debug, Clone)]
pub struct KernelInvocation {
    pub inverse_view: Mat4,
    pub inverse_projection: Mat4,
    pub algorithm: RenderAlgorithm,
    pub brightness: f32,
    pub transfer_range_min: f32,
    pub transfer_range_max: f32,
    pub gamma: f32,
    /// Dithering level, already scaled down over the multi-pass sequence.
    pub dithering: f32,
    /// Ray-march step budget for this pass.
    pub max_steps: u32,
    /// Low-discrepancy phase offset decorrelating successive passes.
    pub phase: f32,
    /// True when the accumulation target must be cleared before this pass.
    pub clear_buffer: bool,
}

/// Device-side collaborator of the renderer core.
///
/// Implementations do not need to be thread-safe beyond `Send`; the
/// renderer serializes all calls on the render thread.
pub trait RenderBackend: Send {
    fn limits(&self) -> DeviceLimits;

    /// Output target size, used for the projection aspect ratio.
    fn viewport(&self) -> (u32, u32);

    /// Makes device-visible storage of exactly this shape exist for the
    /// layer, reallocating when the shape differs from what is held.
    fn ensure_volume_storage(
        &mut self,
        layer: usize,
        element: ElementType,
        dims: VolumeDims,
    ) -> Result<(), BackendError>;

    /// Copies voxel bytes into the layer's device-visible storage.
    fn upload_volume(&mut self, layer: usize, bytes: &[u8]) -> Result<(), BackendError>;

    /// Uploads the layer's transfer function samples.
    fn upload_transfer_function(
        &mut self,
        layer: usize,
        samples: &[f32],
    ) -> Result<(), BackendError>;

    /// Launches the render kernel for one layer. Returns whether the
    /// layer's output was updated.
    fn invoke_kernel(
        &mut self,
        layer: usize,
        invocation: &KernelInvocation,
    ) -> Result<bool, BackendError>;

    /// Zeroes the layer's output target (used for invisible layers).
    fn clear_output(&mut self, layer: usize) -> Result<(), BackendError>;

    /// Reads the layer's device-side volume back for capture. `None` when
    /// the layer holds no volume yet.
    fn read_volume(
        &mut self,
        layer: usize,
    ) -> Result<Option<(Vec<u8>, ElementType, VolumeDims)>, BackendError>;

    // Teardown, driven in order by `VolumeRenderer::close`. Each stage is
    // independently fault-tolerant at the call site: a failure is logged
    // and the remaining stages still run.

    fn release_volume_storage(&mut self, layer: usize) -> Result<(), BackendError>;

    fn release_transfer_storage(&mut self, layer: usize) -> Result<(), BackendError>;

    fn unload_kernel_module(&mut self) -> Result<(), BackendError>;

    fn release_context(&mut self) -> Result<(), BackendError>;

    fn release_device(&mut self) -> Result<(), BackendError>;
}
