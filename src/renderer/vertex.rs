use bytemuck::{Pod, Zeroable};
use std::mem;

use super::backend::VertexLayout;

/// Full-screen quad vertex in clip space.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ScreenVertex {
    pub pos: [f32; 2],
}

impl ScreenVertex {
    pub const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    /// Two triangles covering the whole viewport.
    pub const QUAD: [ScreenVertex; 6] = [
        ScreenVertex { pos: [-1.0, -1.0] },
        ScreenVertex { pos: [-1.0, 1.0] },
        ScreenVertex { pos: [1.0, 1.0] },
        ScreenVertex { pos: [-1.0, -1.0] },
        ScreenVertex { pos: [1.0, 1.0] },
        ScreenVertex { pos: [1.0, -1.0] },
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ScreenVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// Sprite, point and line vertex used by the CPU-side batches.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct BatchVertex {
    pub pos: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl BatchVertex {
    pub const ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x2,
        2 => Float32x4
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<BatchVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// Chunk and model vertex. `color.rgb` carries baked block light and
/// `color.a` sun light.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct WorldVertex {
    pub pos: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
    pub normal: [f32; 3],
}

impl WorldVertex {
    pub const ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x2,
        2 => Float32x4,
        3 => Float32x3
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<WorldVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

#[inline]
pub fn wv(pos: [f32; 3], uv: [f32; 2], color: [f32; 4], normal: [f32; 3]) -> WorldVertex {
    WorldVertex {
        pos,
        uv,
        color,
        normal,
    }
}

impl VertexLayout {
    pub fn stride(self) -> usize {
        match self {
            VertexLayout::Screen => mem::size_of::<ScreenVertex>(),
            VertexLayout::Batch => mem::size_of::<BatchVertex>(),
            VertexLayout::World => mem::size_of::<WorldVertex>(),
        }
    }

    pub fn buffer_layout<'a>(self) -> wgpu::VertexBufferLayout<'a> {
        match self {
            VertexLayout::Screen => ScreenVertex::layout(),
            VertexLayout::Batch => BatchVertex::layout(),
            VertexLayout::World => WorldVertex::layout(),
        }
    }
}
