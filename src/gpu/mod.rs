//! GPU device setup and call diagnostics.

mod context;
mod diagnostics;

pub use context::GpuContext;
pub use diagnostics::{check_call, GpuCallError};
