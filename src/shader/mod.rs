//! Shader source loading, stage compilation and program linking.

mod compiler;
mod loader;
mod program;

pub use compiler::{compile_stage, link_stages, CompiledShader, LinkedStages, UniformBlock, UniformMember};
pub use loader::{load_shader_source, parse_shader_source, parse_shader_str};
pub use program::{ShaderProgram, UniformLocation};

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One half of a shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// The matching naga front-end stage.
    pub fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }

    /// The matching wgpu visibility flag.
    pub fn to_wgpu(self) -> wgpu::ShaderStages {
        match self {
            ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
            ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Vertex and fragment GLSL sources split out of a single shader file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderSourcePair {
    /// Vertex stage source text
    pub vertex: String,
    /// Fragment stage source text
    pub fragment: String,
}

/// Errors raised while loading, compiling or linking shaders.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to read shader source {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to compile {stage} shader:\n{log}")]
    Compile { stage: ShaderStage, log: String },

    #[error("failed to link shader program: {log}")]
    Link { log: String },

    #[error("shader program failed validation: {log}")]
    Validation { log: String },

    #[error("invalid uniform write: {log}")]
    Uniform { log: String },
}

impl ShaderError {
    /// The stage that failed to compile, if this is a compile error.
    pub fn stage(&self) -> Option<ShaderStage> {
        match self {
            ShaderError::Compile { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
