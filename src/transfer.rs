//! Transfer function curves mapping voxel intensity to color and opacity.
//!
//! A curve is a flat array of RGBA control points, sampled with linear
//! interpolation by the kernel. Editing UIs live outside the core; the
//! presets here cover the common single-layer gray ramp and a cycle of
//! color gradients for multi-layer setups.

/// Per-layer gradient colors, cycled by layer index.
const LAYER_COLORS: [[f32; 3]; 6] = [
    [0.0, 0.5, 1.0], // blue
    [1.0, 0.2, 0.2], // red
    [0.2, 1.0, 0.2], // green
    [1.0, 1.0, 0.2], // yellow
    [1.0, 0.2, 1.0], // magenta
    [0.2, 1.0, 1.0], // cyan
];

/// An RGBA control-point curve.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    samples: Vec<f32>,
}

impl TransferFunction {
    /// Builds a curve from RGBA control points.
    pub fn from_rgba_points(points: &[[f32; 4]]) -> Self {
        let mut samples = Vec::with_capacity(points.len() * 4);
        for point in points {
            samples.extend_from_slice(point);
        }
        Self { samples }
    }

    /// Gray ramp from transparent black to opaque white; the default for a
    /// single-layer renderer.
    pub fn default_gray() -> Self {
        Self::from_rgba_points(&[[0.0, 0.0, 0.0, 0.0], [1.0, 1.0, 1.0, 1.0]])
    }

    /// Gradient from transparent black to one of the preset layer colors,
    /// cycling with the layer index.
    pub fn gradient_for_layer(layer_index: usize) -> Self {
        let [r, g, b] = LAYER_COLORS[layer_index % LAYER_COLORS.len()];
        Self::from_rgba_points(&[[0.0, 0.0, 0.0, 0.0], [r, g, b, 1.0]])
    }

    /// Flat RGBA sample array handed to the backend.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn control_point_count(&self) -> usize {
        self.samples.len() / 4
    }
}

impl Default for TransferFunction {
    fn default() -> Self {
        Self::default_gray()
    }
}
