//! quadshade: draws an animated quad from a two-section GLSL shader file.
//!
//! The shader file is split into vertex and fragment sources, compiled and
//! linked into a program, and used to draw a static quad whose color uniform
//! pulses every frame.

pub mod animation;
pub mod config;
pub mod gpu;
pub mod output;
pub mod quad;
pub mod shader;
