use glam::{Vec3, Vec4};

use super::backend::{Primitive, ProgramId, RenderBackend, TextureId, TextureSlot, VertexLayout};
use super::vertex::BatchVertex;

pub const BATCH3D_CAPACITY: usize = 4096;
pub const LINE_BATCH_CAPACITY: usize = 4096;

/// Sub-rectangle of a texture in normalized coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvRegion {
    pub u1: f32,
    pub v1: f32,
    pub u2: f32,
    pub v2: f32,
}

impl Default for UvRegion {
    fn default() -> Self {
        Self {
            u1: 0.0,
            v1: 0.0,
            u2: 1.0,
            v2: 1.0,
        }
    }
}

impl UvRegion {
    pub fn new(u1: f32, v1: f32, u2: f32, v2: f32) -> Self {
        Self { u1, v1, u2, v2 }
    }

    /// Scales the region around its centre; negative factors mirror it.
    pub fn scale(&mut self, x: f32, y: f32) {
        let (cu, cv) = ((self.u1 + self.u2) * 0.5, (self.v1 + self.v2) * 0.5);
        let (hw, hh) = ((self.u2 - self.u1) * 0.5 * x, (self.v2 - self.v1) * 0.5 * y);
        self.u1 = cu - hw;
        self.u2 = cu + hw;
        self.v1 = cv - hh;
        self.v2 = cv + hh;
    }

    /// Maps a `0..1` coordinate into this region.
    pub fn apply(&self, uv: [f32; 2]) -> [f32; 2] {
        [
            self.u1 + uv[0] * (self.u2 - self.u1),
            self.v1 + uv[1] * (self.v2 - self.v1),
        ]
    }
}

fn batch_vertex(pos: Vec3, u: f32, v: f32, color: Vec4) -> BatchVertex {
    BatchVertex {
        pos: pos.to_array(),
        uv: [u, v],
        color: color.to_array(),
    }
}

/// CPU-side batch of textured sprites and points drawn with one program.
pub struct Batch3d {
    vertices: Vec<BatchVertex>,
    capacity: usize,
    program: Option<ProgramId>,
    texture: Option<TextureId>,
    texture_bound: bool,
}

impl Batch3d {
    pub fn new(capacity: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(capacity),
            capacity,
            program: None,
            texture: None,
            texture_bound: false,
        }
    }

    /// Starts a batch for `program`; pending vertices are discarded.
    pub fn begin(&mut self, program: ProgramId) {
        self.vertices.clear();
        self.program = Some(program);
        self.texture_bound = false;
    }

    /// Switches the main texture, flushing what was drawn with the previous
    /// one.
    pub fn texture(&mut self, backend: &mut dyn RenderBackend, texture: Option<TextureId>) {
        if self.texture_bound && self.texture == texture {
            return;
        }
        self.flush(backend);
        backend.bind_texture(TextureSlot::Main, texture);
        self.texture = texture;
        self.texture_bound = true;
    }

    /// Quad centred on `pos` spanning `right * w` and `up * h` in each
    /// direction.
    #[allow(clippy::too_many_arguments)]
    pub fn sprite(
        &mut self,
        backend: &mut dyn RenderBackend,
        pos: Vec3,
        up: Vec3,
        right: Vec3,
        w: f32,
        h: f32,
        uv: UvRegion,
        tint: Vec4,
    ) {
        if self.vertices.len() + 6 > self.capacity {
            self.flush(backend);
        }
        let (r, u) = (right * w, up * h);
        self.vertices.extend_from_slice(&[
            batch_vertex(pos - r - u, uv.u1, uv.v1, tint),
            batch_vertex(pos + r + u, uv.u2, uv.v2, tint),
            batch_vertex(pos - r + u, uv.u1, uv.v2, tint),
            batch_vertex(pos - r - u, uv.u1, uv.v1, tint),
            batch_vertex(pos + r - u, uv.u2, uv.v1, tint),
            batch_vertex(pos + r + u, uv.u2, uv.v2, tint),
        ]);
    }

    pub fn point(&mut self, backend: &mut dyn RenderBackend, pos: Vec3, tint: Vec4) {
        if self.vertices.len() + 1 > self.capacity {
            self.flush_points(backend);
        }
        self.vertices.push(batch_vertex(pos, 0.0, 0.0, tint));
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn flush(&mut self, backend: &mut dyn RenderBackend) {
        self.flush_as(backend, Primitive::Triangles);
    }

    pub fn flush_points(&mut self, backend: &mut dyn RenderBackend) {
        self.flush_as(backend, Primitive::Points);
    }

    fn flush_as(&mut self, backend: &mut dyn RenderBackend, primitive: Primitive) {
        if self.vertices.is_empty() {
            return;
        }
        if let Some(program) = self.program {
            backend.draw_vertices(
                program,
                primitive,
                VertexLayout::Batch,
                bytemuck::cast_slice(&self.vertices),
            );
        }
        self.vertices.clear();
    }
}

/// Batch of colored line segments for outlines and debug geometry.
pub struct LineBatch {
    vertices: Vec<BatchVertex>,
    capacity: usize,
    program: Option<ProgramId>,
    width: f32,
}

impl LineBatch {
    pub fn new(capacity: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(capacity),
            capacity,
            program: None,
            width: 1.0,
        }
    }

    pub fn begin(&mut self, program: ProgramId) {
        self.vertices.clear();
        self.program = Some(program);
    }

    /// Requested width; backends without wide lines draw 1px lines.
    pub fn line_width(&mut self, width: f32) {
        self.width = width;
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn line(&mut self, backend: &mut dyn RenderBackend, a: Vec3, b: Vec3, color: Vec4) {
        if self.vertices.len() + 2 > self.capacity {
            self.flush(backend);
        }
        self.vertices.push(batch_vertex(a, 0.0, 0.0, color));
        self.vertices.push(batch_vertex(b, 0.0, 0.0, color));
    }

    /// Wireframe box centred on `center`.
    pub fn cube(&mut self, backend: &mut dyn RenderBackend, center: Vec3, size: Vec3, color: Vec4) {
        let h = size * 0.5;
        let corner = |x: f32, y: f32, z: f32| center + Vec3::new(x * h.x, y * h.y, z * h.z);
        for (sy, sz) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            self.line(backend, corner(-1.0, sy, sz), corner(1.0, sy, sz), color);
        }
        for (sx, sz) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            self.line(backend, corner(sx, -1.0, sz), corner(sx, 1.0, sz), color);
        }
        for (sx, sy) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            self.line(backend, corner(sx, sy, -1.0), corner(sx, sy, 1.0), color);
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn flush(&mut self, backend: &mut dyn RenderBackend) {
        if self.vertices.is_empty() {
            return;
        }
        if let Some(program) = self.program {
            backend.draw_vertices(
                program,
                Primitive::Lines,
                VertexLayout::Batch,
                bytemuck::cast_slice(&self.vertices),
            );
        }
        self.vertices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::{Command, RecordingBackend};

    #[test]
    fn sprite_batch_flushes_when_full() {
        let mut backend = RecordingBackend::new();
        let mut batch = Batch3d::new(12);
        batch.begin(ProgramId(2));
        for _ in 0..3 {
            batch.sprite(
                &mut backend,
                Vec3::ZERO,
                Vec3::Y,
                Vec3::X,
                1.0,
                1.0,
                UvRegion::default(),
                Vec4::ONE,
            );
        }
        assert_eq!(backend.draws().count(), 1);
        assert_eq!(batch.len(), 6);
    }

    #[test]
    fn texture_switch_flushes_pending_vertices() {
        let mut backend = RecordingBackend::new();
        let mut batch = Batch3d::new(BATCH3D_CAPACITY);
        batch.begin(ProgramId(1));
        batch.texture(&mut backend, Some(TextureId(4)));
        batch.point(&mut backend, Vec3::ONE, Vec4::ONE);
        batch.texture(&mut backend, Some(TextureId(4)));
        assert_eq!(backend.draws().count(), 0);
        batch.texture(&mut backend, None);
        assert_eq!(backend.draws().count(), 1);
        assert!(matches!(
            backend.commands().last(),
            Some(Command::BindTexture(TextureSlot::Main, None))
        ));
    }

    #[test]
    fn cube_outline_has_twelve_edges() {
        let mut backend = RecordingBackend::new();
        let mut lines = LineBatch::new(LINE_BATCH_CAPACITY);
        lines.begin(ProgramId(0));
        lines.cube(&mut backend, Vec3::splat(0.5), Vec3::ONE, Vec4::ONE);
        assert_eq!(lines.len(), 24);
        lines.flush(&mut backend);
        let (_, _, bytes) = backend.draws().next().expect("line draw");
        assert_eq!(bytes.len(), 24 * std::mem::size_of::<BatchVertex>());
    }
}
