//! Presenting the quad to a window.

pub mod window_output;

pub use window_output::WindowRenderer;
