//! Static quad geometry.

use bytemuck::{Pod, Zeroable};

/// A 2D vertex of the quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
}

impl QuadVertex {
    /// Corners of a quad centred on the origin, counter-clockwise.
    pub const VERTICES: &'static [QuadVertex] = &[
        QuadVertex { position: [-0.5, -0.5] },
        QuadVertex { position: [0.5, -0.5] },
        QuadVertex { position: [0.5, 0.5] },
        QuadVertex { position: [-0.5, 0.5] },
    ];

    /// Indices for the quad (two triangles).
    pub const INDICES: &'static [u16] = &[0, 1, 2, 2, 3, 0];

    /// Returns the vertex buffer layout: `position` at location 0.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_reference_vertices() {
        assert_eq!(QuadVertex::INDICES.len(), 6);
        assert!(QuadVertex::INDICES
            .iter()
            .all(|&i| (i as usize) < QuadVertex::VERTICES.len()));
    }

    #[test]
    fn test_layout_matches_vertex_size() {
        let layout = QuadVertex::layout();
        assert_eq!(layout.array_stride, 8);
        assert_eq!(bytemuck::cast_slice::<_, u8>(QuadVertex::VERTICES).len(), 32);
    }
}
