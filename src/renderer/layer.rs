//! Per-layer rendering state and its parameter clamps.

use crate::transfer::TransferFunction;
use crate::volume::{ElementType, VolumeDims, VoxelSize};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ray-marching algorithm used for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderAlgorithm {
    MaxProjection,
    IsoSurface,
}

impl RenderAlgorithm {
    /// Next algorithm in the cycle order.
    pub fn next(self) -> Self {
        match self {
            RenderAlgorithm::MaxProjection => RenderAlgorithm::IsoSurface,
            RenderAlgorithm::IsoSurface => RenderAlgorithm::MaxProjection,
        }
    }
}

impl Default for RenderAlgorithm {
    fn default() -> Self {
        RenderAlgorithm::MaxProjection
    }
}

impl fmt::Display for RenderAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderAlgorithm::MaxProjection => write!(f, "max projection"),
            RenderAlgorithm::IsoSurface => write!(f, "iso surface"),
        }
    }
}

/// Mutable state of one render layer. All mutation happens under the
/// renderer-wide lock; the frame step works from a [`LayerRenderParams`]
/// snapshot instead.
pub(crate) struct RenderLayerState {
    pub(crate) visible: bool,
    pub(crate) algorithm: RenderAlgorithm,
    pub(crate) brightness: f32,
    pub(crate) gamma: f32,
    pub(crate) transfer_range_min: f32,
    pub(crate) transfer_range_max: f32,
    pub(crate) dithering: f32,
    pub(crate) quality: f32,
    pub(crate) transfer_function: TransferFunction,
    pub(crate) dims: Option<VolumeDims>,
    pub(crate) voxel_size: VoxelSize,
}

impl RenderLayerState {
    pub(crate) fn new(layer_index: usize, layer_count: usize) -> Self {
        // A single-layer renderer gets the neutral gray ramp; multi-layer
        // setups get distinguishable color gradients.
        let transfer_function = if layer_count == 1 {
            TransferFunction::default_gray()
        } else {
            TransferFunction::gradient_for_layer(layer_index)
        };
        Self {
            visible: true,
            algorithm: RenderAlgorithm::default(),
            brightness: 1.0,
            gamma: 1.0,
            transfer_range_min: 0.0,
            transfer_range_max: 1.0,
            dithering: 1.0,
            quality: 1.0,
            transfer_function,
            dims: None,
            voxel_size: VoxelSize::default(),
        }
    }

    /// Full-quality ray-march step budget: the volume diagonal scaled by
    /// the quality factor. Zero until the first volume arrives.
    pub(crate) fn max_steps(&self) -> u32 {
        match self.dims {
            Some(dims) => (dims.diagonal() * self.quality as f64) as u32,
            None => 0,
        }
    }

    pub(crate) fn set_brightness(&mut self, brightness: f32, element: ElementType) {
        self.brightness = brightness.clamp(0.0, element.max_brightness());
    }

    pub(crate) fn set_transfer_range(&mut self, min: f32, max: f32) {
        self.transfer_range_min = min.clamp(0.0, 1.0);
        self.transfer_range_max = max.clamp(0.0, 1.0);
    }

    pub(crate) fn set_quality(&mut self, quality: f32) {
        self.quality = quality.clamp(0.0, 1.0);
    }
}

/// Immutable snapshot of one layer's render parameters, captured under the
/// renderer-wide lock and consumed by the kernel invocation outside it.
pub(crate) struct LayerRenderParams {
    pub(crate) visible: bool,
    pub(crate) algorithm: RenderAlgorithm,
    pub(crate) brightness: f32,
    pub(crate) gamma: f32,
    pub(crate) transfer_range_min: f32,
    pub(crate) transfer_range_max: f32,
    pub(crate) dithering: f32,
    pub(crate) transfer_samples: Vec<f32>,
    pub(crate) max_steps: u32,
    pub(crate) has_volume: bool,
}

impl LayerRenderParams {
    pub(crate) fn snapshot(state: &RenderLayerState) -> Self {
        Self {
            visible: state.visible,
            algorithm: state.algorithm,
            brightness: state.brightness,
            gamma: state.gamma,
            transfer_range_min: state.transfer_range_min,
            transfer_range_max: state.transfer_range_max,
            dithering: state.dithering,
            transfer_samples: state.transfer_function.samples().to_vec(),
            max_steps: state.max_steps(),
            has_volume: state.dims.is_some(),
        }
    }
}
