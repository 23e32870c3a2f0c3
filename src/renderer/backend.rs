use glam::Vec3;

use super::state::RenderState;
use crate::error::RenderError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

/// Cubemap face in the usual +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> CubeFace {
        Self::ALL[index % 6]
    }

    /// Screen-space x, y and view direction of the face, used by the sky
    /// generator to turn a face pixel into a world direction.
    pub fn basis(self) -> [Vec3; 3] {
        const X_AXES: [Vec3; 6] = [
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        const Y_AXES: [Vec3; 6] = [
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        const Z_AXES: [Vec3; 6] = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let i = self.index();
        [X_AXES[i], Y_AXES[i], Z_AXES[i]]
    }
}

/// Where draws land. Each variant names the resource kind directly so no
/// caller ever has to ask what a texture id "really" is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    #[default]
    Screen,
    /// Color + depth framebuffer created with `create_framebuffer`.
    Framebuffer(TextureId),
    /// Depth-only shadow map created with `create_depth_map`.
    DepthMap(TextureId),
    CubemapFace(TextureId, CubeFace),
}

impl RenderTarget {
    pub fn texture(&self) -> Option<TextureId> {
        match *self {
            RenderTarget::Screen => None,
            RenderTarget::Framebuffer(id)
            | RenderTarget::DepthMap(id)
            | RenderTarget::CubemapFace(id, _) => Some(id),
        }
    }

    pub fn has_color(&self) -> bool {
        !matches!(self, RenderTarget::DepthMap(_))
    }

    pub fn has_depth(&self) -> bool {
        !matches!(self, RenderTarget::CubemapFace(..))
    }
}

/// Texture units shared by every program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Main,
    Skybox,
    Shadows0,
    Shadows1,
    /// Depth attachment of a framebuffer, read by the deferred resolve.
    Depth,
}

impl TextureSlot {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Triangles,
    Lines,
    Points,
}

/// Vertex formats understood by the backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// `ScreenVertex`: 2-D clip-space position.
    Screen,
    /// `BatchVertex`: position, uv, color.
    Batch,
    /// `WorldVertex`: position, uv, color, normal.
    World,
}

/// The narrow command interface every pass submits through.
///
/// Fixed-function state is never set piecemeal: [`DrawContext`] owns the
/// state stack and pushes the complete [`RenderState`] whenever it changes.
///
/// [`DrawContext`]: super::DrawContext
pub trait RenderBackend {
    fn apply_state(&mut self, state: &RenderState);

    /// Clears the current target.
    fn clear(&mut self, color: Option<[f32; 4]>, depth: bool);

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> TextureId;
    fn create_depth_map(&mut self, resolution: u32) -> TextureId;
    fn create_cubemap(&mut self, size: u32) -> TextureId;
    fn create_framebuffer(&mut self, width: u32, height: u32) -> TextureId;
    fn release_texture(&mut self, texture: TextureId);

    /// Copies the depth attachment of framebuffer `src` into `dst`.
    fn copy_depth(&mut self, src: TextureId, dst: TextureId);

    /// Compiles (or recompiles) the program `id` from preprocessed source.
    fn compile_program(&mut self, id: ProgramId, name: &str, source: &str)
        -> Result<(), RenderError>;

    /// Replaces the uniform block of `program`. Writes are ordered with
    /// draws: a draw sees the last write issued before it.
    fn write_uniforms(&mut self, program: ProgramId, bytes: &[u8]);

    /// `None` binds a neutral fallback texture.
    fn bind_texture(&mut self, slot: TextureSlot, texture: Option<TextureId>);

    fn create_mesh(&mut self, layout: VertexLayout, bytes: &[u8], vertex_count: u32) -> MeshId;
    fn draw_mesh(&mut self, program: ProgramId, mesh: MeshId);
    fn release_mesh(&mut self, mesh: MeshId);

    /// Draws a transient vertex stream.
    fn draw_vertices(
        &mut self,
        program: ProgramId,
        primitive: Primitive,
        layout: VertexLayout,
        bytes: &[u8],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_basis_is_orthonormal() {
        for face in CubeFace::ALL {
            let [x, y, z] = face.basis();
            assert!((x.length() - 1.0).abs() < 1e-6);
            assert!(x.dot(y).abs() < 1e-6);
            assert!(y.dot(z).abs() < 1e-6);
            assert!(x.dot(z).abs() < 1e-6);
        }
    }

    #[test]
    fn face_index_round_trips_modulo_six() {
        assert_eq!(CubeFace::from_index(7), CubeFace::NegativeX);
        assert_eq!(CubeFace::from_index(5).index(), 5);
    }
}
