//! Window output backend using winit and wgpu.

use crate::animation::ColorPulse;
use crate::config::{AppConfig, GpuErrorPolicy};
use crate::gpu::{GpuCallError, GpuContext};
use crate::gpu_call;
use crate::quad::QuadVertex;
use crate::shader::{load_shader_source, ShaderProgram, UniformLocation};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

/// Name of the animated color uniform.
pub const COLOR_UNIFORM: &str = "u_Color";

/// Byte size of a `vec4` uniform.
const VEC4_SIZE: u32 = 16;

/// Keeps the color uniform only if it can take a `vec4`.
fn color_uniform(location: Option<UniformLocation>) -> Option<UniformLocation> {
    match location {
        Some(location) if location.size == VEC4_SIZE => Some(location),
        Some(location) => {
            warn!(
                "Uniform {} is {} bytes, expected a vec4; color animation disabled",
                COLOR_UNIFORM, location.size
            );
            None
        }
        None => {
            warn!("Uniform {} not found, color animation disabled", COLOR_UNIFORM);
            None
        }
    }
}

/// Handles window rendering state.
pub struct WindowRenderer {
    surface: wgpu::Surface<'static>,
    ctx: GpuContext,
    config: wgpu::SurfaceConfiguration,
    program: Option<ShaderProgram>,
    color_location: Option<UniformLocation>,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    pulse: ColorPulse,
    clear_color: wgpu::Color,
    policy: GpuErrorPolicy,
    window: Arc<Window>,
}

impl WindowRenderer {
    /// Creates the surface, device, quad buffers and shader program.
    ///
    /// A shader that fails to load or build is logged and leaves the renderer
    /// clearing the window without drawing; GPU setup failures are errors.
    pub fn new(window: Arc<Window>, app: &AppConfig) -> Result<Self> {
        let instance = GpuContext::instance();
        let surface = instance.create_surface(window.clone())?;
        let ctx = GpuContext::new(instance, Some(&surface))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&ctx.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("Surface is not supported by the selected adapter"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: app.present_mode(),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        gpu_call!(&ctx, surface.configure(&ctx.device, &config))?;

        let vertex_buffer = gpu_call!(
            &ctx,
            ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Vertex Buffer"),
                contents: bytemuck::cast_slice(QuadVertex::VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            })
        )?;

        let index_buffer = gpu_call!(
            &ctx,
            ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Index Buffer"),
                contents: bytemuck::cast_slice(QuadVertex::INDICES),
                usage: wgpu::BufferUsages::INDEX,
            })
        )?;

        let program = match load_shader_source(&app.shader)
            .and_then(|sources| ShaderProgram::new(&ctx, &sources, &[QuadVertex::layout()], surface_format))
        {
            Ok(program) => Some(program),
            Err(e) => {
                error!("Shader unavailable, drawing disabled: {}", e);
                None
            }
        };

        let color_location = program
            .as_ref()
            .and_then(|p| color_uniform(p.uniform_location(COLOR_UNIFORM)));

        info!("Window renderer ready ({:?}, {}x{})", surface_format, config.width, config.height);

        Ok(Self {
            surface,
            ctx,
            config,
            program,
            color_location,
            vertex_buffer,
            index_buffer,
            pulse: ColorPulse::new(app.color, app.color_step),
            clear_color: app.clear_color(),
            policy: app.gpu_error_policy,
            window,
        })
    }

    /// Resizes the surface.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.configure_surface();
        }
    }

    fn configure_surface(&self) {
        let result = gpu_call!(&self.ctx, self.surface.configure(&self.ctx.device, &self.config));
        self.check(result);
    }

    /// Applies the configured GPU error policy to a wrapped call's result.
    fn check<T>(&self, result: Result<T, GpuCallError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(_) if self.policy == GpuErrorPolicy::Abort => {
                error!("Aborting on GPU error");
                std::process::abort();
            }
            Err(_) => None,
        }
    }

    /// Draws one frame and advances the color animation.
    pub fn render(&mut self) -> Result<()> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.configure_surface();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("Timed out waiting for the next surface texture");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        if let (Some(program), Some(location)) = (&self.program, self.color_location) {
            let color = self.pulse.current();
            let result = gpu_call!(&self.ctx, program.set_uniform_4f(&self.ctx.queue, location, color));
            if let Some(Err(e)) = self.check(result) {
                warn!("Color animation disabled: {}", e);
                self.color_location = None;
            }
        }

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Quad Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Quad Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if let Some(program) = &self.program {
                program.bind(&mut render_pass);
                render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(0..QuadVertex::INDICES.len() as u32, 0, 0..1);
            }
        }

        let result = gpu_call!(&self.ctx, self.ctx.queue.submit(std::iter::once(encoder.finish())));
        self.check(result);
        self.window.pre_present_notify();
        output.present();

        self.pulse.advance();
        Ok(())
    }

    /// Returns a reference to the window.
    pub fn window(&self) -> &Window {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_uniform_requires_vec4() {
        let vec4 = UniformLocation { binding: 0, offset: 0, size: 16 };
        let vec3 = UniformLocation { binding: 0, offset: 0, size: 12 };
        assert_eq!(color_uniform(Some(vec4)), Some(vec4));
        assert_eq!(color_uniform(Some(vec3)), None);
        assert_eq!(color_uniform(None), None);
    }
}
