//! Call-site diagnostics for GPU calls.
//!
//! [`gpu_call!`](crate::gpu_call) runs one expression inside a validation
//! error scope and turns a captured error into a [`GpuCallError`] carrying
//! the expression text, file and line.

use super::GpuContext;
use thiserror::Error;
use tracing::error;

/// A validation error raised by a single wrapped GPU call.
#[derive(Debug, Error)]
#[error("[wgpu error] {message}\n  in `{call}` at {file}:{line}")]
pub struct GpuCallError {
    pub call: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub message: String,
}

/// Runs `f` in a validation error scope.
///
/// Errors left behind by earlier, unwrapped calls are logged and discarded
/// first so they are not blamed on this call. Prefer the
/// [`gpu_call!`](crate::gpu_call) macro, which fills in the call site.
pub fn check_call<T>(
    ctx: &GpuContext,
    call: &'static str,
    file: &'static str,
    line: u32,
    f: impl FnOnce() -> T,
) -> Result<T, GpuCallError> {
    ctx.drain_uncaptured_errors();

    let scope = ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    match pollster::block_on(scope.pop()) {
        None => Ok(value),
        Some(source) => {
            let err = GpuCallError {
                call,
                file,
                line,
                message: source.to_string(),
            };
            error!("{}", err);
            Err(err)
        }
    }
}

/// Wraps a GPU call with [`check_call`], recording its source text and
/// location.
///
/// ```ignore
/// let buffer = gpu_call!(&ctx, ctx.device.create_buffer(&desc))?;
/// ```
#[macro_export]
macro_rules! gpu_call {
    ($ctx:expr, $call:expr) => {
        $crate::gpu::check_call($ctx, stringify!($call), file!(), line!(), || $call)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_call_site() {
        let err = GpuCallError {
            call: "ctx.queue.write_buffer(&buffer, 0, &data)",
            file: "src/output/window_output.rs",
            line: 42,
            message: "Validation Error".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("ctx.queue.write_buffer(&buffer, 0, &data)"));
        assert!(text.contains("src/output/window_output.rs:42"));
    }

    #[test]
    fn test_invalid_call_is_captured() {
        let Ok(ctx) = GpuContext::headless() else {
            eprintln!("no GPU adapter available, skipping");
            return;
        };

        let ok = crate::gpu_call!(&ctx, ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("diagnostics ok"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        let buffer = ok.unwrap();

        // Writes must be a multiple of four bytes.
        let err = crate::gpu_call!(&ctx, ctx.queue.write_buffer(&buffer, 0, &[1u8, 2, 3])).unwrap_err();
        assert!(err.call.contains("write_buffer"));
        assert!(err.file.ends_with("diagnostics.rs"));
    }

    #[test]
    fn test_earlier_errors_are_not_blamed_on_next_call() {
        let Ok(ctx) = GpuContext::headless() else {
            eprintln!("no GPU adapter available, skipping");
            return;
        };

        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("diagnostics drain"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Unwrapped and invalid: lands in the uncaptured handler.
        ctx.queue.write_buffer(&buffer, 0, &[1u8, 2, 3]);

        let result = crate::gpu_call!(&ctx, ctx.queue.write_buffer(&buffer, 0, &[0u8; 4]));
        assert!(result.is_ok());
        assert!(ctx.take_uncaptured_errors().is_empty());
    }
}
