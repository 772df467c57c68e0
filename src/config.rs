//! Renderer configuration: defaults, validation and TOML loading.

use crate::constants::core::{
    DEFAULT_POOL_CAPACITY, DEFAULT_RENDER_LAYERS, DEFAULT_SUBMIT_TIMEOUT_SECS, MAX_RENDER_LAYERS,
};
use crate::volume::ElementType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Construction-time configuration for a [`crate::VolumeRenderer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of independently parameterized render layers.
    pub render_layers: usize,
    /// Voxel element kind shared by all layers.
    pub element_type: ElementType,
    /// Capacity of pools created via `create_compatible_pool`.
    pub pool_capacity: usize,
    /// Default producer hand-off timeout, in seconds.
    pub submit_timeout_secs: u64,
    /// Whether adaptive multi-pass LOD starts enabled.
    pub adaptive_lod: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            render_layers: DEFAULT_RENDER_LAYERS,
            element_type: ElementType::default(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            submit_timeout_secs: DEFAULT_SUBMIT_TIMEOUT_SECS,
            adaptive_lod: true,
        }
    }
}

impl RendererConfig {
    /// Validates configuration parameters, with actionable messages.
    pub fn validate(&self) -> Result<()> {
        if self.render_layers == 0 {
            anyhow::bail!("RendererConfig: render_layers cannot be 0");
        }
        if self.render_layers > MAX_RENDER_LAYERS {
            anyhow::bail!(
                "RendererConfig: render_layers {} exceeds maximum of {}; \
                 each layer holds its own device-side volume storage",
                self.render_layers,
                MAX_RENDER_LAYERS
            );
        }
        if self.pool_capacity == 0 {
            anyhow::bail!(
                "RendererConfig: pool_capacity cannot be 0; use 1 to effectively \
                 disable recycling"
            );
        }
        if self.submit_timeout_secs == 0 {
            anyhow::bail!(
                "RendererConfig: submit_timeout_secs cannot be 0; producers would \
                 never wait for the render thread"
            );
        }
        log::debug!("[RendererConfig::validate] configuration valid: {:?}", self);
        Ok(())
    }

    /// Loads a configuration from a TOML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading renderer config from {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("parsing renderer config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Default hand-off timeout as a [`Duration`].
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
}
