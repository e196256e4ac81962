//! Engine configuration loaded from TOML or RON files

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::render::BackendType;

/// Errors produced while loading or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The file contents could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
    /// The value could not be serialized.
    #[error("Serialize error: {0}")]
    Serialize(String),
    /// The file extension names no supported format.
    #[error("Unsupported config format, expected .toml or .ron")]
    UnsupportedFormat,
}

/// File persistence for configuration types. The format is chosen by file
/// extension: `.toml` or `.ron`.
pub trait Config: Serialize + DeserializeOwned {
    /// Load a value of this type from the file at `path`.
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            Some("ron") => ron::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat),
        }
    }

    /// Write this value to the file at `path`.
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat),
        };
        fs::write(path, content)?;
        Ok(())
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name reported to the rendering API and used in logs.
    pub application_name: String,
    /// Cap the main loop to `target_frame_rate` when true.
    pub limit_frame_rate: bool,
    /// Frame rate the limiter aims for.
    pub target_frame_rate: u32,
    /// Window placement and size.
    pub window: WindowConfig,
    /// Renderer backend settings.
    pub renderer: RendererConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            application_name: "Ember Application".to_string(),
            limit_frame_rate: false,
            target_frame_rate: 60,
            window: WindowConfig::default(),
            renderer: RendererConfig::default(),
        }
    }
}

impl Config for EngineConfig {}

/// Window placement and size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Title bar text.
    pub title: String,
    /// Initial horizontal position in screen coordinates.
    pub x: i32,
    /// Initial vertical position in screen coordinates.
    pub y: i32,
    /// Initial client width in pixels.
    pub width: u32,
    /// Initial client height in pixels.
    pub height: u32,
    /// Whether the user may resize the window.
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Ember Application".to_string(),
            x: 100,
            y: 100,
            width: 1280,
            height: 720,
            resizable: true,
        }
    }
}

/// Renderer backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Which rendering backend to create.
    pub backend: BackendType,
    /// Enable API validation layers when available.
    pub validation: bool,
    /// Number of frames the CPU may record ahead of the GPU.
    pub max_frames_in_flight: u32,
    /// Refuse integrated GPUs during device selection.
    pub require_discrete_gpu: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Vulkan,
            validation: cfg!(debug_assertions),
            max_frames_in_flight: 2,
            require_discrete_gpu: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_usable_window() {
        let config = EngineConfig::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.renderer.max_frames_in_flight, 2);
        assert_eq!(config.renderer.backend, BackendType::Vulkan);
        assert!(!config.limit_frame_rate);
        assert_eq!(config.target_frame_rate, 60);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            application_name = "Demo"

            [window]
            width = 800
            height = 600
            "#,
        )
        .unwrap();

        assert_eq!(parsed.application_name, "Demo");
        assert_eq!(parsed.window.width, 800);
        assert_eq!(parsed.window.height, 600);
        assert_eq!(parsed.window.title, "Ember Application");
        assert_eq!(parsed.renderer.max_frames_in_flight, 2);
        assert!(!parsed.renderer.require_discrete_gpu);
    }

    #[test]
    fn toml_file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "ember_config_round_trip_{}.toml",
            std::process::id()
        ));

        let mut config = EngineConfig::default();
        config.application_name = "Round Trip".to_string();
        config.window.width = 1600;
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.application_name, "Round Trip");
        assert_eq!(loaded.window.width, 1600);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let path = std::env::temp_dir().join(format!(
            "ember_config_bad_ext_{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "application_name = \"x\"").unwrap();

        let err = EngineConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat));

        let _ = std::fs::remove_file(&path);
    }
}
