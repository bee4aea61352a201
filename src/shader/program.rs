//! Linked shader program backed by a wgpu render pipeline.

use super::{compile_stage, link_stages, LinkedStages, ShaderError, ShaderSourcePair, ShaderStage, UniformBlock};
use crate::gpu::GpuContext;
use std::borrow::Cow;
use std::num::NonZeroU64;
use tracing::info;

/// Where a named uniform lives: its block binding plus byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub binding: u32,
    pub offset: u32,
    pub size: u32,
}

/// A vertex + fragment pair that compiled, linked and passed pipeline
/// validation. Dropping it releases the pipeline and its uniform buffers.
pub struct ShaderProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniforms: Vec<(UniformBlock, wgpu::Buffer)>,
}

impl ShaderProgram {
    /// Compiles both sources, links them and builds the render pipeline.
    pub fn new(
        ctx: &GpuContext,
        sources: &ShaderSourcePair,
        vertex_buffers: &[wgpu::VertexBufferLayout<'_>],
        target: wgpu::TextureFormat,
    ) -> Result<Self, ShaderError> {
        let vertex = compile_stage(ShaderStage::Vertex, &sources.vertex);
        let fragment = compile_stage(ShaderStage::Fragment, &sources.fragment);
        let linked = link_stages(vertex, fragment)?;
        Self::from_linked(ctx, &linked, vertex_buffers, target)
    }

    /// Builds the render pipeline for already linked stages.
    ///
    /// Pipeline creation runs inside a validation scope; anything wgpu
    /// rejects comes back as [`ShaderError::Validation`].
    pub fn from_linked(
        ctx: &GpuContext,
        linked: &LinkedStages,
        vertex_buffers: &[wgpu::VertexBufferLayout<'_>],
        target: wgpu::TextureFormat,
    ) -> Result<Self, ShaderError> {
        let program = crate::gpu_call!(ctx, Self::build(&ctx.device, linked, vertex_buffers, target))
            .map_err(|e| ShaderError::Validation { log: e.message })?;
        info!("Shader program linked ({} uniform block(s))", program.uniforms.len());
        Ok(program)
    }

    fn build(
        device: &wgpu::Device,
        linked: &LinkedStages,
        vertex_buffers: &[wgpu::VertexBufferLayout<'_>],
        target: wgpu::TextureFormat,
    ) -> Self {
        // Stage modules only need to outlive pipeline creation.
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(linked.vertex.wgsl())),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(linked.fragment.wgsl())),
        });

        let layout_entries: Vec<_> = linked
            .uniforms
            .iter()
            .map(|block| wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility: block.visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(block.size as u64),
                },
                count: None,
            })
            .collect();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform Bind Group Layout"),
            entries: &layout_entries,
        });

        let uniforms: Vec<(UniformBlock, wgpu::Buffer)> = linked
            .uniforms
            .iter()
            .map(|block| {
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: block.name.as_deref(),
                    size: block.size as wgpu::BufferAddress,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                (block.clone(), buffer)
            })
            .collect();

        let group_entries: Vec<_> = uniforms
            .iter()
            .map(|(block, buffer)| wgpu::BindGroupEntry {
                binding: block.binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform Bind Group"),
            layout: &bind_group_layout,
            entries: &group_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shader Program Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shader Program"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(super::compiler::ENTRY_POINT),
                buffers: vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(super::compiler::ENTRY_POINT),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group,
            uniforms,
        }
    }

    /// Looks up a uniform block member by name.
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.iter().find_map(|(block, _)| {
            block.member(name).map(|member| UniformLocation {
                binding: block.binding,
                offset: member.offset,
                size: member.size,
            })
        })
    }

    /// Writes a plain-old-data value to a uniform. The value must be
    /// exactly as large as the uniform.
    pub fn set_uniform<T: bytemuck::Pod>(
        &self,
        queue: &wgpu::Queue,
        location: UniformLocation,
        value: &T,
    ) -> Result<(), ShaderError> {
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() != location.size as usize {
            return Err(ShaderError::Uniform {
                log: format!(
                    "uniform at binding {} offset {} is {} bytes, got {}",
                    location.binding,
                    location.offset,
                    location.size,
                    bytes.len()
                ),
            });
        }
        let (_, buffer) = self
            .uniforms
            .iter()
            .find(|(block, _)| block.binding == location.binding)
            .ok_or_else(|| ShaderError::Uniform {
                log: format!("no uniform block at binding {}", location.binding),
            })?;
        queue.write_buffer(buffer, location.offset as wgpu::BufferAddress, bytes);
        Ok(())
    }

    pub fn set_uniform_4f(
        &self,
        queue: &wgpu::Queue,
        location: UniformLocation,
        value: [f32; 4],
    ) -> Result<(), ShaderError> {
        self.set_uniform(queue, location, &value)
    }

    /// Binds the pipeline and its uniforms for drawing.
    pub fn bind(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.bind_group, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quad::QuadVertex;
    use crate::shader::parse_shader_str;

    const SHADER: &str = include_str!("../../res/shaders/Basic.shader");

    #[test]
    fn test_basic_shader_builds_valid_program() {
        let Ok(ctx) = GpuContext::headless() else {
            eprintln!("no GPU adapter available, skipping");
            return;
        };

        let sources = parse_shader_str(SHADER);
        let program = ShaderProgram::new(&ctx, &sources, &[QuadVertex::layout()], wgpu::TextureFormat::Rgba8Unorm).unwrap();

        let location = program.uniform_location("u_Color").unwrap();
        assert_eq!(location, UniformLocation { binding: 0, offset: 0, size: 16 });
        program.set_uniform_4f(&ctx.queue, location, [0.2, 0.3, 0.8, 1.0]).unwrap();
        assert!(ctx.take_uncaptured_errors().is_empty());
    }

    #[test]
    fn test_broken_vertex_stage_is_reported() {
        let Ok(ctx) = GpuContext::headless() else {
            eprintln!("no GPU adapter available, skipping");
            return;
        };

        let mut sources = parse_shader_str(SHADER);
        sources.vertex = sources.vertex.replace("gl_Position =", "gl_Position");
        let err = ShaderProgram::new(&ctx, &sources, &[QuadVertex::layout()], wgpu::TextureFormat::Rgba8Unorm)
            .err()
            .unwrap();
        assert_eq!(err.stage(), Some(ShaderStage::Vertex));
    }

    #[test]
    fn test_vec3_color_rejects_four_floats() {
        let Ok(ctx) = GpuContext::headless() else {
            eprintln!("no GPU adapter available, skipping");
            return;
        };

        let mut sources = parse_shader_str(SHADER);
        sources.fragment = sources
            .fragment
            .replace("vec4 u_Color;", "vec3 u_Color;")
            .replace("color = u_Color;", "color = vec4(u_Color, 1.0);");
        let program = ShaderProgram::new(&ctx, &sources, &[QuadVertex::layout()], wgpu::TextureFormat::Rgba8Unorm).unwrap();

        let location = program.uniform_location("u_Color").unwrap();
        assert_eq!(location.size, 12);
        let err = program
            .set_uniform_4f(&ctx.queue, location, [0.2, 0.3, 0.8, 1.0])
            .unwrap_err();
        assert!(matches!(err, ShaderError::Uniform { .. }));
        program.set_uniform(&ctx.queue, location, &[0.2f32, 0.3, 0.8]).unwrap();
    }
}
