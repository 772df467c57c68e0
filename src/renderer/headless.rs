//! In-memory backend for demos and tests.
//!
//! Holds every layer's "device" storage in RAM and records kernel
//! launches instead of running one. Useful wherever the real device is
//! unavailable: unit tests, headless demo runs, CI.

use super::backend::{DeviceLimits, KernelInvocation, RenderBackend};
use crate::error::BackendError;
use crate::volume::{ElementType, VolumeDims};

/// Record of one kernel launch, for assertions and demo logging.
#[derive(Debug, Clone)]
pub struct InvocationRecord {
    pub layer: usize,
    pub max_steps: u32,
    pub phase: f32,
    pub dithering: f32,
    pub clear_buffer: bool,
}

struct HeadlessLayer {
    storage: Option<(ElementType, VolumeDims, Vec<u8>)>,
    transfer_samples: Vec<f32>,
    output_cleared: u32,
    allocations: u32,
}

/// RAM-backed [`RenderBackend`] implementation.
pub struct HeadlessBackend {
    limits: DeviceLimits,
    viewport: (u32, u32),
    layers: Vec<HeadlessLayer>,
    invocations: Vec<InvocationRecord>,
    module_loaded: bool,
    context_alive: bool,
    device_alive: bool,
    kernel_fault: Option<String>,
}

impl HeadlessBackend {
    pub fn new(layer_count: usize, limits: DeviceLimits, viewport: (u32, u32)) -> Self {
        let layers = (0..layer_count)
            .map(|_| HeadlessLayer {
                storage: None,
                transfer_samples: Vec::new(),
                output_cleared: 0,
                allocations: 0,
            })
            .collect();
        Self {
            limits,
            viewport,
            layers,
            invocations: Vec::new(),
            module_loaded: true,
            context_alive: true,
            device_alive: true,
            kernel_fault: None,
        }
    }

    /// Convenience constructor with roomy limits for tests and demos.
    pub fn with_default_limits(layer_count: usize) -> Self {
        Self::new(
            layer_count,
            DeviceLimits {
                max_volume_bytes: 512 * 1024 * 1024,
                max_dims: VolumeDims::new(2048, 2048, 2048),
            },
            (1280, 720),
        )
    }

    /// Kernel launches recorded so far.
    pub fn invocations(&self) -> &[InvocationRecord] {
        &self.invocations
    }

    /// Times the given layer's output target was zeroed.
    pub fn output_cleared(&self, layer: usize) -> u32 {
        self.layers[layer].output_cleared
    }

    /// Device-side storage allocations performed for the layer.
    pub fn allocations(&self, layer: usize) -> u32 {
        self.layers[layer].allocations
    }

    /// Bytes currently held for the layer, if any.
    pub fn stored_bytes(&self, layer: usize) -> Option<&[u8]> {
        self.layers[layer]
            .storage
            .as_ref()
            .map(|(_, _, bytes)| bytes.as_slice())
    }

    pub fn is_torn_down(&self) -> bool {
        !self.module_loaded
            && !self.context_alive
            && !self.device_alive
            && self.layers.iter().all(|l| l.storage.is_none())
    }

    /// Makes the next kernel launch fail, for error-path tests.
    pub fn inject_kernel_fault(&mut self, message: &str) {
        self.kernel_fault = Some(message.to_string());
    }
}

impl RenderBackend for HeadlessBackend {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn ensure_volume_storage(
        &mut self,
        layer: usize,
        element: ElementType,
        dims: VolumeDims,
    ) -> Result<(), BackendError> {
        let slot = &mut self.layers[layer];
        let matches = matches!(
            &slot.storage,
            Some((held_element, held_dims, _)) if *held_element == element && *held_dims == dims
        );
        if !matches {
            let size = (element.bytes_per_voxel() * dims.voxel_count()) as usize;
            slot.storage = Some((element, dims, vec![0u8; size]));
            slot.allocations += 1;
            log::debug!(
                "[HeadlessBackend::ensure_volume_storage] layer {} allocated {} {}",
                layer,
                element,
                dims
            );
        }
        Ok(())
    }

    fn upload_volume(&mut self, layer: usize, bytes: &[u8]) -> Result<(), BackendError> {
        let slot = &mut self.layers[layer];
        match &mut slot.storage {
            Some((_, _, storage)) if storage.len() == bytes.len() => {
                storage.copy_from_slice(bytes);
                Ok(())
            }
            Some((_, _, storage)) => Err(BackendError::OperationFailed {
                operation: "upload_volume".to_string(),
                message: format!(
                    "layer {} upload of {} bytes into {} byte storage",
                    layer,
                    bytes.len(),
                    storage.len()
                ),
            }),
            None => Err(BackendError::StorageAllocation {
                layer,
                message: "no storage allocated".to_string(),
            }),
        }
    }

    fn upload_transfer_function(
        &mut self,
        layer: usize,
        samples: &[f32],
    ) -> Result<(), BackendError> {
        self.layers[layer].transfer_samples = samples.to_vec();
        Ok(())
    }

    fn invoke_kernel(
        &mut self,
        layer: usize,
        invocation: &KernelInvocation,
    ) -> Result<bool, BackendError> {
        if let Some(message) = self.kernel_fault.take() {
            return Err(BackendError::KernelLaunch { layer, message });
        }
        self.invocations.push(InvocationRecord {
            layer,
            max_steps: invocation.max_steps,
            phase: invocation.phase,
            dithering: invocation.dithering,
            clear_buffer: invocation.clear_buffer,
        });
        Ok(true)
    }

    fn clear_output(&mut self, layer: usize) -> Result<(), BackendError> {
        self.layers[layer].output_cleared += 1;
        Ok(())
    }

    fn read_volume(
        &mut self,
        layer: usize,
    ) -> Result<Option<(Vec<u8>, ElementType, VolumeDims)>, BackendError> {
        Ok(self.layers[layer]
            .storage
            .as_ref()
            .map(|(element, dims, bytes)| (bytes.clone(), *element, *dims)))
    }

    fn release_volume_storage(&mut self, layer: usize) -> Result<(), BackendError> {
        self.layers[layer].storage = None;
        Ok(())
    }

    fn release_transfer_storage(&mut self, layer: usize) -> Result<(), BackendError> {
        self.layers[layer].transfer_samples.clear();
        Ok(())
    }

    fn unload_kernel_module(&mut self) -> Result<(), BackendError> {
        self.module_loaded = false;
        Ok(())
    }

    fn release_context(&mut self) -> Result<(), BackendError> {
        self.context_alive = false;
        Ok(())
    }

    fn release_device(&mut self) -> Result<(), BackendError> {
        self.device_alive = false;
        Ok(())
    }
}
