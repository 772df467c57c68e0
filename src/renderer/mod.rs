//! Renderer core: per-frame orchestration over N layer channels, one
//! adaptive LOD controller and the device backend.
//!
//! Two lock tiers keep producers, control threads and the render thread
//! apart: each [`LayerDataChannel`] carries its own lock for the pending
//! buffer hand-off, and one renderer-wide lock guards all layer/camera
//! state. The renderer-wide lock covers only the bookkeeping part of a
//! frame; the kernel launches run against an immutable parameter snapshot
//! so UI-thread setters are never blocked behind a slow device call.

mod backend;
mod camera;
mod capture;
mod headless;
mod layer;
pub(crate) mod signals;

pub use backend::{DeviceLimits, KernelInvocation, RenderBackend};
pub use capture::{CaptureListener, VolumeSnapshot};
pub use headless::{HeadlessBackend, InvocationRecord};
pub use layer::RenderAlgorithm;

use crate::channel::LayerDataChannel;
use crate::config::RendererConfig;
use crate::constants::lod::MIN_STEPS_PER_PASS;
use crate::error::{RenderError, RenderResult, VolumeError};
use crate::lod::AdaptiveLodController;
use crate::transfer::TransferFunction;
use crate::volume::{ElementType, VolumeBuffer, VolumeDims, VolumePool, VoxelSize};
use camera::CameraState;
use glam::{Quat, Vec3};
use layer::{LayerRenderParams, RenderLayerState};
use parking_lot::Mutex;
use signals::RendererSignals;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Layers whose volume data was uploaded this frame.
    pub data_updated: Vec<bool>,
    /// Layers whose output the kernel refreshed this frame.
    pub layers_updated: Vec<bool>,
    /// Whether any kernel work ran at all.
    pub kernel_ran: bool,
}

struct RendererShared {
    layers: Vec<RenderLayerState>,
    camera: CameraState,
}

/// Multi-layer volume renderer driving a [`RenderBackend`].
///
/// All methods take `&self`; the renderer is meant to be shared behind an
/// [`Arc`] between producer threads (`submit_volume`), control threads
/// (parameter setters) and the render thread (`render_frame`).
pub struct VolumeRenderer<B: RenderBackend> {
    element: ElementType,
    limits: DeviceLimits,
    backend: Mutex<B>,
    channels: Vec<LayerDataChannel>,
    shared: Mutex<RendererShared>,
    signals: Arc<RendererSignals>,
    capture_listeners: Mutex<Vec<Box<dyn CaptureListener>>>,
    closed: AtomicBool,
}

impl<B: RenderBackend> VolumeRenderer<B> {
    pub fn new(config: &RendererConfig, backend: B) -> anyhow::Result<Self> {
        config.validate()?;

        let limits = backend.limits();
        let signals = Arc::new(RendererSignals::new());
        signals.lod.set_active(config.adaptive_lod);

        let channels = (0..config.render_layers)
            .map(|index| LayerDataChannel::new(index, Arc::clone(&signals)))
            .collect();
        let layers = (0..config.render_layers)
            .map(|index| RenderLayerState::new(index, config.render_layers))
            .collect();

        log::info!(
            "[VolumeRenderer::new] {} layer(s), element {}, device budget {} bytes, max dims {}",
            config.render_layers,
            config.element_type,
            limits.max_volume_bytes,
            limits.max_dims
        );

        Ok(Self {
            element: config.element_type,
            limits,
            backend: Mutex::new(backend),
            channels,
            shared: Mutex::new(RendererShared {
                layers,
                camera: CameraState::new(),
            }),
            signals,
            capture_listeners: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn layer_count(&self) -> usize {
        self.channels.len()
    }

    pub fn element_type(&self) -> ElementType {
        self.element
    }

    /// The adaptive LOD controller, for observation and direct interaction
    /// notifications.
    pub fn lod(&self) -> &AdaptiveLodController {
        &self.signals.lod
    }

    /// A buffer pool pre-sized for this renderer's producers.
    pub fn create_compatible_pool(&self, capacity: usize) -> VolumePool {
        VolumePool::new(capacity)
    }

    // ------------------------------------------------------------------
    // Volume submission (producer threads)
    // ------------------------------------------------------------------

    /// Hands a volume to a layer and waits up to `timeout` for the render
    /// thread to copy it into device-visible storage. `Ok(true)` means the
    /// copy completed; `Ok(false)` means the wait timed out (the buffer may
    /// still be consumed later, or be displaced by a newer submission).
    pub fn submit_volume(
        &self,
        layer: usize,
        volume: VolumeBuffer,
        voxel_size: VoxelSize,
        timeout: Duration,
    ) -> RenderResult<bool> {
        let channel = self.channel(layer)?;
        self.validate_against_limits(&volume)?;
        Ok(channel.submit(volume, voxel_size, timeout))
    }

    /// Raw-bytes entry point: validates the byte length against the
    /// declared dimensions before anything else.
    pub fn submit_volume_bytes(
        &self,
        layer: usize,
        bytes: Vec<u8>,
        dims: VolumeDims,
        voxel_size: VoxelSize,
        timeout: Duration,
    ) -> RenderResult<bool> {
        let volume = VolumeBuffer::from_bytes(self.element, dims, bytes)?;
        self.submit_volume(layer, volume, voxel_size, timeout)
    }

    /// True when any layer holds an unconsumed volume.
    pub fn is_new_volume_data_available(&self) -> bool {
        self.channels.iter().any(|channel| channel.has_pending())
    }

    fn validate_against_limits(&self, volume: &VolumeBuffer) -> Result<(), VolumeError> {
        if volume.size_in_bytes() > self.limits.max_volume_bytes {
            return Err(VolumeError::VolumeTooLarge {
                size_in_bytes: volume.size_in_bytes(),
                max_bytes: self.limits.max_volume_bytes,
            });
        }
        if !volume.dims().fits_within(&self.limits.max_dims) {
            return Err(VolumeError::DimensionsTooLarge {
                dims: volume.dims(),
                max_dims: self.limits.max_dims,
            });
        }
        Ok(())
    }

    fn channel(&self, layer: usize) -> RenderResult<&LayerDataChannel> {
        self.channels
            .get(layer)
            .ok_or(RenderError::LayerOutOfRange {
                layer,
                layers: self.channels.len(),
            })
    }

    // ------------------------------------------------------------------
    // Parameter setters (control threads)
    // ------------------------------------------------------------------

    fn with_layer(
        &self,
        layer: usize,
        mutate: impl FnOnce(&mut RenderLayerState, ElementType),
    ) -> RenderResult<()> {
        if layer >= self.channels.len() {
            return Err(RenderError::LayerOutOfRange {
                layer,
                layers: self.channels.len(),
            });
        }
        let mut shared = self.shared.lock();
        mutate(&mut shared.layers[layer], self.element);
        self.signals.notify_change();
        Ok(())
    }

    fn with_camera(&self, mutate: impl FnOnce(&mut CameraState)) {
        let mut shared = self.shared.lock();
        mutate(&mut shared.camera);
        self.signals.notify_change();
    }

    pub fn set_brightness(&self, layer: usize, brightness: f32) -> RenderResult<()> {
        self.with_layer(layer, |state, element| {
            state.set_brightness(brightness, element)
        })
    }

    pub fn set_gamma(&self, layer: usize, gamma: f32) -> RenderResult<()> {
        self.with_layer(layer, |state, _| state.gamma = gamma)
    }

    pub fn set_transfer_range(&self, layer: usize, min: f32, max: f32) -> RenderResult<()> {
        self.with_layer(layer, |state, _| state.set_transfer_range(min, max))
    }

    pub fn set_transfer_range_min(&self, layer: usize, min: f32) -> RenderResult<()> {
        self.with_layer(layer, |state, _| {
            state.transfer_range_min = min.clamp(0.0, 1.0)
        })
    }

    pub fn set_transfer_range_max(&self, layer: usize, max: f32) -> RenderResult<()> {
        self.with_layer(layer, |state, _| {
            state.transfer_range_max = max.clamp(0.0, 1.0)
        })
    }

    pub fn set_dithering(&self, layer: usize, dithering: f32) -> RenderResult<()> {
        self.with_layer(layer, |state, _| state.dithering = dithering)
    }

    pub fn set_quality(&self, layer: usize, quality: f32) -> RenderResult<()> {
        self.with_layer(layer, |state, _| state.set_quality(quality))
    }

    pub fn set_render_algorithm(
        &self,
        layer: usize,
        algorithm: RenderAlgorithm,
    ) -> RenderResult<()> {
        self.with_layer(layer, |state, _| state.algorithm = algorithm)
    }

    /// Advances the layer to the next algorithm in the cycle.
    pub fn cycle_render_algorithm(&self, layer: usize) -> RenderResult<()> {
        self.with_layer(layer, |state, _| state.algorithm = state.algorithm.next())
    }

    /// Cycles the algorithm of every layer at once.
    pub fn cycle_render_algorithms(&self) {
        let mut shared = self.shared.lock();
        for state in &mut shared.layers {
            state.algorithm = state.algorithm.next();
        }
        self.signals.notify_change();
    }

    pub fn set_layer_visible(&self, layer: usize, visible: bool) -> RenderResult<()> {
        self.with_layer(layer, |state, _| state.visible = visible)
    }

    pub fn set_transfer_function(
        &self,
        layer: usize,
        transfer_function: TransferFunction,
    ) -> RenderResult<()> {
        self.with_layer(layer, |state, _| state.transfer_function = transfer_function)
    }

    pub fn set_voxel_size(&self, layer: usize, voxel_size: VoxelSize) -> RenderResult<()> {
        self.with_layer(layer, |state, _| state.voxel_size = voxel_size)
    }

    /// Restores neutral brightness, gamma and transfer ranges on all layers.
    pub fn reset_brightness_gamma_ranges(&self) {
        let mut shared = self.shared.lock();
        for state in &mut shared.layers {
            state.brightness = 1.0;
            state.gamma = 1.0;
            state.transfer_range_min = 0.0;
            state.transfer_range_max = 1.0;
        }
        self.signals.notify_change();
    }

    pub fn brightness(&self, layer: usize) -> f32 {
        self.shared.lock().layers[layer].brightness
    }

    pub fn gamma(&self, layer: usize) -> f32 {
        self.shared.lock().layers[layer].gamma
    }

    pub fn transfer_range(&self, layer: usize) -> (f32, f32) {
        let shared = self.shared.lock();
        let state = &shared.layers[layer];
        (state.transfer_range_min, state.transfer_range_max)
    }

    pub fn quality(&self, layer: usize) -> f32 {
        self.shared.lock().layers[layer].quality
    }

    pub fn dithering(&self, layer: usize) -> f32 {
        self.shared.lock().layers[layer].dithering
    }

    pub fn render_algorithm(&self, layer: usize) -> RenderAlgorithm {
        self.shared.lock().layers[layer].algorithm
    }

    pub fn is_layer_visible(&self, layer: usize) -> bool {
        self.shared.lock().layers[layer].visible
    }

    pub fn volume_dims(&self, layer: usize) -> Option<VolumeDims> {
        self.shared.lock().layers[layer].dims
    }

    pub fn voxel_size(&self, layer: usize) -> VoxelSize {
        self.shared.lock().layers[layer].voxel_size
    }

    // ------------------------------------------------------------------
    // Camera
    // ------------------------------------------------------------------

    pub fn set_rotation(&self, rotation: Quat) {
        self.with_camera(|camera| camera.rotation = rotation);
    }

    pub fn rotation(&self) -> Quat {
        self.shared.lock().camera.rotation
    }

    pub fn set_translation_x(&self, x: f32) {
        self.with_camera(|camera| camera.translation.x = x);
    }

    pub fn set_translation_y(&self, y: f32) {
        self.with_camera(|camera| camera.translation.y = y);
    }

    pub fn set_translation_z(&self, z: f32) {
        self.with_camera(|camera| camera.translation.z = z);
    }

    pub fn add_translation_x(&self, dx: f32) {
        self.with_camera(|camera| camera.translation.x += dx);
    }

    pub fn add_translation_y(&self, dy: f32) {
        self.with_camera(|camera| camera.translation.y += dy);
    }

    pub fn add_translation_z(&self, dz: f32) {
        self.with_camera(|camera| camera.translation.z += dz);
    }

    pub fn translation(&self) -> Vec3 {
        self.shared.lock().camera.translation
    }

    pub fn set_fov(&self, fov: f32) {
        self.with_camera(|camera| camera.set_fov(fov));
    }

    pub fn add_fov(&self, delta: f32) {
        self.with_camera(|camera| {
            let fov = camera.fov;
            camera.set_fov(fov + delta)
        });
    }

    pub fn fov(&self) -> f32 {
        self.shared.lock().camera.fov
    }

    pub fn reset_rotation_translation(&self) {
        self.with_camera(|camera| camera.reset());
    }

    // ------------------------------------------------------------------
    // LOD and capture control
    // ------------------------------------------------------------------

    pub fn set_adaptive_lod_active(&self, active: bool) {
        self.signals.lod.set_active(active);
    }

    pub fn adaptive_lod_active(&self) -> bool {
        self.signals.lod.is_active()
    }

    pub fn toggle_adaptive_lod(&self) {
        self.set_adaptive_lod_active(!self.adaptive_lod_active());
    }

    pub fn notify_interaction_start(&self) {
        self.signals.lod.notify_interaction_start();
    }

    pub fn notify_interaction_end(&self) {
        self.signals.lod.notify_interaction_end();
    }

    pub fn add_capture_listener(&self, listener: Box<dyn CaptureListener>) {
        self.capture_listeners.lock().push(listener);
    }

    /// Requests a one-shot capture of every layer's volume on the next
    /// frame.
    pub fn request_capture(&self) {
        self.signals.capture_requested.store(true, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Per-frame orchestration (render thread)
    // ------------------------------------------------------------------

    /// Runs one frame: consumes pending volume uploads, advances the LOD
    /// sequence, and launches the kernel for every visible layer when
    /// anything changed. Backend failures propagate to the caller; channel
    /// and LOD state remain consistent and the changed flag stays set so
    /// the next frame retries.
    pub fn render_frame(&self) -> RenderResult<FrameReport> {
        let layer_count = self.channels.len();
        let mut backend = self.backend.lock();

        // Bookkeeping under the renderer-wide lock.
        let (params, run_needed, data_updated, inverse_view, inverse_projection) = {
            let mut shared = self.shared.lock();

            if self.signals.capture_requested.swap(false, Ordering::SeqCst) {
                self.capture_layers(&mut *backend, &shared)?;
            }

            let mut data_updated = vec![false; layer_count];
            for (index, channel) in self.channels.iter().enumerate() {
                if let Some(upload) = channel.take_pending() {
                    let dims = upload.volume.dims();
                    let state = &mut shared.layers[index];
                    state.dims = Some(dims);
                    state.voxel_size = upload.voxel_size;

                    if upload.dims_changed {
                        // Force a fresh device-side allocation for the new
                        // shape before uploading into it.
                        backend.release_volume_storage(index)?;
                    }
                    backend.ensure_volume_storage(index, self.element, dims)?;
                    backend.upload_volume(index, upload.volume.as_bytes())?;
                    channel.signal_consumed();
                    data_updated[index] = true;
                    log::debug!(
                        "[VolumeRenderer::render_frame] layer {} uploaded {} voxels ({})",
                        index,
                        dims.voxel_count(),
                        dims
                    );
                }
            }

            let any_updated = data_updated.iter().any(|&updated| updated);
            let run_needed = any_updated
                || self.signals.parameters_changed.load(Ordering::SeqCst)
                || self.signals.lod.is_kernel_run_needed();

            self.signals.lod.before_frame();
            let max_steps = shared
                .layers
                .iter()
                .filter(|state| state.visible)
                .map(|state| state.max_steps())
                .max()
                .unwrap_or(0);
            self.signals.lod.notify_max_steps(max_steps);

            let (width, height) = backend.viewport();
            let aspect = width as f32 / height.max(1) as f32;
            let (inverse_view, inverse_projection) = shared.camera.inverse_matrices(aspect);

            let params: Vec<LayerRenderParams> = shared
                .layers
                .iter()
                .map(LayerRenderParams::snapshot)
                .collect();

            (
                params,
                run_needed,
                data_updated,
                inverse_view,
                inverse_projection,
            )
        };

        // Kernel launches, outside the renderer-wide lock.
        let mut layers_updated = vec![false; layer_count];
        if run_needed {
            let passes = self.signals.lod.number_of_passes();
            let pass = self.signals.lod.pass_index();
            let phase = self.signals.lod.phase();
            let clear_buffer = self.signals.lod.is_buffer_clearing_needed();
            // Saturating: a concurrent set_active(false) can shrink the pass
            // count below an in-flight pass index.
            let lod_scale = passes.saturating_sub(pass) as f32 / passes as f32;

            for (index, layer) in params.iter().enumerate() {
                if !layer.has_volume {
                    continue;
                }
                if !layer.visible {
                    backend.clear_output(index)?;
                    continue;
                }

                let (max_steps, dithering) = match layer.algorithm {
                    RenderAlgorithm::MaxProjection => (
                        (layer.max_steps / passes).max(MIN_STEPS_PER_PASS),
                        layer.dithering * lod_scale,
                    ),
                    RenderAlgorithm::IsoSurface => (
                        ((layer.max_steps * (1 + pass)) / (2 * passes)).max(MIN_STEPS_PER_PASS),
                        (layer.dithering * lod_scale).powi(2),
                    ),
                };

                backend.upload_transfer_function(index, &layer.transfer_samples)?;
                let invocation = KernelInvocation {
                    inverse_view,
                    inverse_projection,
                    algorithm: layer.algorithm,
                    brightness: layer.brightness,
                    transfer_range_min: layer.transfer_range_min,
                    transfer_range_max: layer.transfer_range_max,
                    gamma: layer.gamma,
                    dithering,
                    max_steps,
                    phase,
                    clear_buffer,
                };
                layers_updated[index] = backend.invoke_kernel(index, &invocation)?;
            }
        }

        self.signals
            .parameters_changed
            .store(false, Ordering::SeqCst);
        self.signals.lod.after_frame();

        Ok(FrameReport {
            data_updated,
            layers_updated,
            kernel_ran: run_needed,
        })
    }

    fn capture_layers(&self, backend: &mut B, shared: &RendererShared) -> RenderResult<()> {
        let listeners = self.capture_listeners.lock();
        for (index, state) in shared.layers.iter().enumerate() {
            if let Some((bytes, element, dims)) = backend.read_volume(index)? {
                let snapshot = VolumeSnapshot {
                    bytes,
                    element,
                    dims,
                    voxel_size: state.voxel_size,
                };
                for listener in listeners.iter() {
                    listener.volume_captured(index, &snapshot);
                }
            }
        }
        log::info!(
            "[VolumeRenderer::capture_layers] notified {} listener(s)",
            listeners.len()
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Releases device resources in dependency order. Each stage is
    /// fault-tolerant: a failure is logged and the remaining stages still
    /// run, so a fault mid-teardown does not leak everything behind it.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("[VolumeRenderer::close] tearing down device resources");
        let mut backend = self.backend.lock();
        let _shared = self.shared.lock();

        for index in 0..self.channels.len() {
            if let Err(e) = backend.release_volume_storage(index) {
                log::error!(
                    "[VolumeRenderer::close] releasing volume storage for layer {}: {}",
                    index,
                    e
                );
            }
        }
        for index in 0..self.channels.len() {
            if let Err(e) = backend.release_transfer_storage(index) {
                log::error!(
                    "[VolumeRenderer::close] releasing transfer storage for layer {}: {}",
                    index,
                    e
                );
            }
        }
        if let Err(e) = backend.unload_kernel_module() {
            log::error!("[VolumeRenderer::close] unloading kernel module: {}", e);
        }
        if let Err(e) = backend.release_context() {
            log::error!("[VolumeRenderer::close] releasing context: {}", e);
        }
        if let Err(e) = backend.release_device() {
            log::error!("[VolumeRenderer::close] releasing device: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn renderer(layers: usize) -> VolumeRenderer<HeadlessBackend> {
        let config = RendererConfig {
            render_layers: layers,
            ..RendererConfig::default()
        };
        VolumeRenderer::new(&config, HeadlessBackend::with_default_limits(layers))
            .expect("renderer")
    }

    fn cube(side: u32) -> VolumeBuffer {
        VolumeBuffer::zeroed(ElementType::U8, VolumeDims::new(side, side, side))
    }

    #[test]
    fn test_submission_consumed_by_frame() {
        let renderer = Arc::new(renderer(1));
        let producer_side = Arc::clone(&renderer);

        let producer = thread::spawn(move || {
            let mut volume = cube(64);
            volume.as_bytes_mut()[0] = 7;
            producer_side.submit_volume(0, volume, VoxelSize::default(), Duration::from_secs(5))
        });

        // Drive frames until the upload lands.
        let mut uploaded = false;
        for _ in 0..500 {
            let report = renderer.render_frame().expect("frame");
            if report.data_updated[0] {
                uploaded = true;
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert!(uploaded);
        assert!(producer.join().expect("producer").expect("submit"));

        let backend = renderer.backend.lock();
        assert_eq!(backend.stored_bytes(0).expect("storage")[0], 7);
        assert_eq!(backend.allocations(0), 1);
    }

    #[test]
    fn test_inconsistent_bytes_fail_fast() {
        let renderer = renderer(1);
        // 10x10x10 u8 declares 1000 bytes; hand in 900.
        let result = renderer.submit_volume_bytes(
            0,
            vec![0u8; 900],
            VolumeDims::new(10, 10, 10),
            VoxelSize::default(),
            Duration::from_secs(5),
        );
        assert!(matches!(
            result,
            Err(RenderError::Volume(
                VolumeError::InconsistentBufferSize { .. }
            ))
        ));
    }

    #[test]
    fn test_oversized_volume_rejected() {
        let config = RendererConfig::default();
        let backend = HeadlessBackend::new(
            1,
            DeviceLimits {
                max_volume_bytes: 1024,
                max_dims: VolumeDims::new(64, 64, 64),
            },
            (640, 480),
        );
        let renderer = VolumeRenderer::new(&config, backend).expect("renderer");

        let result =
            renderer.submit_volume(0, cube(32), VoxelSize::default(), Duration::from_secs(1));
        assert!(matches!(
            result,
            Err(RenderError::Volume(VolumeError::VolumeTooLarge { .. }))
        ));

        // 128x1x1 fits the byte budget but exceeds the per-axis maximum.
        let thin = VolumeBuffer::zeroed(ElementType::U8, VolumeDims::new(128, 1, 1));
        let result = renderer.submit_volume(0, thin, VoxelSize::default(), Duration::from_secs(1));
        assert!(matches!(
            result,
            Err(RenderError::Volume(VolumeError::DimensionsTooLarge { .. }))
        ));
    }

    #[test]
    fn test_layer_out_of_range() {
        let renderer = renderer(2);
        let result =
            renderer.submit_volume(5, cube(4), VoxelSize::default(), Duration::from_secs(1));
        assert!(matches!(
            result,
            Err(RenderError::LayerOutOfRange {
                layer: 5,
                layers: 2
            })
        ));
        assert!(renderer.set_brightness(5, 1.0).is_err());
    }

    #[test]
    fn test_first_pass_clears_then_blends() {
        let renderer = renderer(1);
        let _ = renderer.submit_volume(0, cube(64), VoxelSize::default(), Duration::ZERO);

        renderer.render_frame().expect("frame");
        // The submission counts as interaction; wait out the hysteresis so
        // the next frame advances past pass 0.
        thread::sleep(Duration::from_millis(150));
        renderer.render_frame().expect("frame");

        let backend = renderer.backend.lock();
        let invocations = backend.invocations();
        assert!(invocations.len() >= 2);
        assert!(invocations[0].clear_buffer);
        assert!(!invocations[invocations.len() - 1].clear_buffer);
    }

    #[test]
    fn test_max_projection_step_budget_split_across_passes() {
        let renderer = renderer(1);
        let _ = renderer.submit_volume(0, cube(64), VoxelSize::default(), Duration::ZERO);
        renderer.render_frame().expect("frame");

        let backend = renderer.backend.lock();
        // Diagonal of 64^3 is ~110.8 steps at quality 1; split over 8
        // passes that lands below the per-pass floor of 16.
        assert_eq!(backend.invocations()[0].max_steps, 16);
    }

    #[test]
    fn test_invisible_layer_output_is_zeroed() {
        let renderer = renderer(2);
        let _ = renderer.submit_volume(0, cube(8), VoxelSize::default(), Duration::ZERO);
        let _ = renderer.submit_volume(1, cube(8), VoxelSize::default(), Duration::ZERO);
        renderer.set_layer_visible(1, false).expect("visibility");

        renderer.render_frame().expect("frame");

        let backend = renderer.backend.lock();
        assert!(backend.invocations().iter().all(|inv| inv.layer == 0));
        assert_eq!(backend.output_cleared(1), 1);
    }

    #[test]
    fn test_idle_renderer_skips_kernel() {
        let renderer = renderer(1);
        let _ = renderer.submit_volume(0, cube(8), VoxelSize::default(), Duration::ZERO);

        // Wait out the interaction hysteresis, then run the multi-pass
        // sequence dry.
        thread::sleep(Duration::from_millis(150));
        loop {
            let report = renderer.render_frame().expect("frame");
            if !report.kernel_ran {
                break;
            }
        }
        let report = renderer.render_frame().expect("frame");
        assert!(!report.kernel_ran);
        assert!(report.layers_updated.iter().all(|&updated| !updated));
    }

    #[test]
    fn test_parameter_change_triggers_kernel_run() {
        let renderer = renderer(1);
        let _ = renderer.submit_volume(0, cube(8), VoxelSize::default(), Duration::ZERO);
        thread::sleep(Duration::from_millis(150));
        while renderer.render_frame().expect("frame").kernel_ran {}

        renderer.set_brightness(0, 2.0).expect("brightness");
        let report = renderer.render_frame().expect("frame");
        assert!(report.kernel_ran);
    }

    #[test]
    fn test_backend_fault_keeps_changed_flag_set() {
        let renderer = renderer(1);
        let _ = renderer.submit_volume(0, cube(8), VoxelSize::default(), Duration::ZERO);
        renderer.render_frame().expect("frame");

        renderer.set_gamma(0, 2.0).expect("gamma");
        renderer.backend.lock().inject_kernel_fault("simulated");
        assert!(renderer.render_frame().is_err());

        // The changed flag survived the fault; the next frame retries.
        let report = renderer.render_frame().expect("frame");
        assert!(report.kernel_ran);
    }

    #[test]
    fn test_capture_fires_once() {
        struct Collector(mpsc::Sender<(usize, VolumeDims)>);
        impl CaptureListener for Collector {
            fn volume_captured(&self, layer: usize, snapshot: &VolumeSnapshot) {
                self.0.send((layer, snapshot.dims)).ok();
            }
        }

        let renderer = renderer(1);
        let (tx, rx) = mpsc::channel();
        renderer.add_capture_listener(Box::new(Collector(tx)));

        let _ = renderer.submit_volume(0, cube(8), VoxelSize::isotropic(0.5), Duration::ZERO);
        renderer.render_frame().expect("frame");
        renderer.request_capture();
        renderer.render_frame().expect("frame");
        renderer.render_frame().expect("frame");

        let captured: Vec<_> = rx.try_iter().collect();
        assert_eq!(captured, vec![(0, VolumeDims::new(8, 8, 8))]);
    }

    #[test]
    fn test_dimension_change_reallocates_storage() {
        let renderer = renderer(1);
        let _ = renderer.submit_volume(0, cube(8), VoxelSize::default(), Duration::ZERO);
        renderer.render_frame().expect("frame");
        let _ = renderer.submit_volume(0, cube(8), VoxelSize::default(), Duration::ZERO);
        renderer.render_frame().expect("frame");
        // Same shape twice: one allocation.
        assert_eq!(renderer.backend.lock().allocations(0), 1);

        let _ = renderer.submit_volume(0, cube(16), VoxelSize::default(), Duration::ZERO);
        renderer.render_frame().expect("frame");
        assert_eq!(renderer.backend.lock().allocations(0), 2);
        assert_eq!(renderer.volume_dims(0), Some(VolumeDims::new(16, 16, 16)));
    }

    #[test]
    fn test_close_tears_down_in_order_and_is_idempotent() {
        let renderer = renderer(2);
        let _ = renderer.submit_volume(0, cube(8), VoxelSize::default(), Duration::ZERO);
        renderer.render_frame().expect("frame");

        renderer.close();
        renderer.close();
        assert!(renderer.backend.lock().is_torn_down());
    }

    #[test]
    fn test_cycle_render_algorithm() {
        let renderer = renderer(1);
        assert_eq!(renderer.render_algorithm(0), RenderAlgorithm::MaxProjection);
        renderer.cycle_render_algorithm(0).expect("cycle");
        assert_eq!(renderer.render_algorithm(0), RenderAlgorithm::IsoSurface);
        renderer.cycle_render_algorithms();
        assert_eq!(renderer.render_algorithm(0), RenderAlgorithm::MaxProjection);
    }

    #[test]
    fn test_setters_mark_parameters_changed() {
        let renderer = renderer(1);
        let _ = renderer.submit_volume(0, cube(8), VoxelSize::default(), Duration::ZERO);
        thread::sleep(Duration::from_millis(150));
        while renderer.render_frame().expect("frame").kernel_ran {}

        renderer.set_fov(0.5);
        assert!(renderer.signals.parameters_changed.load(Ordering::SeqCst));
        assert!(renderer.lod().is_kernel_run_needed());
    }
}
