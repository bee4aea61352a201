//! Application configuration: YAML file plus command-line overrides.

use clap::ValueEnum;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// What to do when a wrapped GPU call reports a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GpuErrorPolicy {
    /// Log the error and keep rendering (default)
    #[default]
    Log,
    /// Log the error and abort the process
    Abort,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid log level {0:?}")]
    LogLevel(String),
}

/// Application settings. Every field may be omitted from the YAML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Two-section shader file
    pub shader: PathBuf,
    /// Wait for vertical sync when presenting
    pub vsync: bool,
    /// Background color (RGBA)
    pub clear_color: [f64; 4],
    /// Initial value of `u_Color`
    pub color: [f32; 4],
    /// Per-frame change of the red channel
    pub color_step: f32,
    /// Maximum tracing level
    pub log_level: String,
    pub gpu_error_policy: GpuErrorPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "quadshade".to_string(),
            width: 640,
            height: 480,
            shader: PathBuf::from("res/shaders/Basic.shader"),
            vsync: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            color: [0.2, 0.3, 0.8, 1.0],
            color_step: 0.05,
            log_level: "info".to_string(),
            gpu_error_policy: GpuErrorPolicy::Log,
        }
    }
}

/// Values given on the command line; `Some` wins over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub shader: Option<PathBuf>,
    pub log_level: Option<String>,
    pub gpu_error_policy: Option<GpuErrorPolicy>,
}

impl AppConfig {
    /// Loads a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Loads `path` if given, otherwise the defaults, then applies overrides.
    pub fn resolve(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(title) = overrides.title {
            self.title = title;
        }
        if let Some(width) = overrides.width {
            self.width = width;
        }
        if let Some(height) = overrides.height {
            self.height = height;
        }
        if let Some(shader) = overrides.shader {
            self.shader = shader;
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = log_level;
        }
        if let Some(policy) = overrides.gpu_error_policy {
            self.gpu_error_policy = policy;
        }
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
    }

    pub fn present_mode(&self) -> wgpu::PresentMode {
        if self.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        }
    }

    pub fn clear_color(&self) -> wgpu::Color {
        let [r, g, b, a] = self.clear_color;
        wgpu::Color { r, g, b, a }
    }
}
