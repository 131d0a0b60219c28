//! Configuration management for the mockup compositor

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::blend::BlendTuning;
use crate::composite::{RenderSettings, DEFAULT_MIN_RESOLUTION};
use crate::export::DEFAULT_JPEG_QUALITY;
use crate::session::SessionOptions;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8092,
        }
    }
}

/// Render pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Mockups smaller than this on their long edge are upscaled first
    pub min_resolution: u32,
    /// Decoded image pairs kept in memory
    pub cache_capacity: usize,
    /// Quiet period before a full render after an edit. Applies to
    /// `PreviewSession`s and is advertised through `/api/info`.
    pub debounce_ms: u64,
    /// Fast preview frame interval during drags, for
    /// `PreviewSession::run_frame_loop` and `/api/info`
    pub frame_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            min_resolution: DEFAULT_MIN_RESOLUTION,
            cache_capacity: 16,
            debounce_ms: 30,
            frame_interval_ms: 16,
        }
    }
}

impl RenderConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub jpeg_quality: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub render: RenderConfig,

    /// Realism blend heuristics
    #[serde(default)]
    pub blend: BlendTuning,

    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {:?}", path);
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory {:?}", parent))?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            min_resolution: self.render.min_resolution,
            tuning: self.blend,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            settings: self.render_settings(),
            debounce: self.render.debounce(),
            cache_capacity: self.render.cache_capacity,
        }
    }
}
