//! Shared GPU context for wgpu resources.

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Errors wgpu reported outside of any error scope, oldest first.
type UncapturedErrors = Arc<Mutex<Vec<String>>>;

/// Device, queue and the adapter they came from.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    uncaptured: UncapturedErrors,
}

impl GpuContext {
    /// Creates an instance with every backend enabled.
    pub fn instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    /// Initialize a GPU context able to present to `surface`.
    /// If `surface` is None, initializes for headless/offscreen use.
    pub fn new(instance: wgpu::Instance, surface: Option<&wgpu::Surface<'_>>) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))
        .map_err(|e| anyhow!("Failed to obtain GPU adapter: {:?}", e))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("quadshade Device"),
            required_features: wgpu::Features::empty(),
            required_limits: if surface.is_some() {
                wgpu::Limits::default()
            } else {
                wgpu::Limits::downlevel_defaults()
            },
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))?;

        // The default handler panics; collect instead so callers can report them.
        let uncaptured = UncapturedErrors::default();
        let sink = uncaptured.clone();
        device.on_uncaptured_error(Arc::new(move |error: wgpu::Error| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(error.to_string());
        }));

        let context = Self {
            instance,
            adapter,
            device,
            queue,
            uncaptured,
        };
        context.log_adapter_info();
        Ok(context)
    }

    /// Headless context, used by tests and tools.
    pub fn headless() -> Result<Self> {
        Self::new(Self::instance(), None)
    }

    /// Logs the adapter's name, vendor, backend and driver.
    pub fn log_adapter_info(&self) {
        let adapter = self.adapter.get_info();
        info!("GPU: {} ({:?})", adapter.name, adapter.device_type);
        info!("Vendor: {:#06x}, device: {:#06x}", adapter.vendor, adapter.device);
        info!("Backend: {:?}, driver: {} {}", adapter.backend, adapter.driver, adapter.driver_info);
    }

    /// Removes and returns errors reported outside of any error scope.
    pub fn take_uncaptured_errors(&self) -> Vec<String> {
        std::mem::take(&mut *self.uncaptured.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Logs and discards errors left over from earlier calls.
    pub fn drain_uncaptured_errors(&self) {
        for error in self.take_uncaptured_errors() {
            warn!("[wgpu] pending error: {}", error);
        }
    }
}
