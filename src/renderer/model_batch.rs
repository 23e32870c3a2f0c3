use glam::{Mat3, Mat4, Vec3, Vec4};

use super::backend::{Primitive, ProgramId, RenderBackend, TextureSlot, VertexLayout};
use super::collaborators::ModelBatch;
use super::vertex::WorldVertex;
use crate::assets::Assets;
use crate::models::{Model, TEXTURE_NOTFOUND};

struct PendingMesh {
    texture: String,
    vertices: Vec<WorldVertex>,
}

/// Transforms model vertices on the CPU and draws them grouped by texture.
#[derive(Default)]
pub struct MeshModelBatch {
    pending: Vec<PendingMesh>,
}

impl MeshModelBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_vertices(&self) -> usize {
        self.pending.iter().map(|mesh| mesh.vertices.len()).sum()
    }

    fn bucket(&mut self, texture: &str) -> &mut Vec<WorldVertex> {
        let index = match self.pending.iter().position(|mesh| mesh.texture == texture) {
            Some(index) => index,
            None => {
                self.pending.push(PendingMesh {
                    texture: texture.to_string(),
                    vertices: Vec::new(),
                });
                self.pending.len() - 1
            }
        };
        &mut self.pending[index].vertices
    }
}

impl ModelBatch for MeshModelBatch {
    fn draw(&mut self, matrix: Mat4, tint: Vec4, model: &Model) {
        let normal_matrix = Mat3::from_mat4(matrix).inverse().transpose();
        for mesh in &model.meshes {
            let shade = if mesh.shading { tint } else { Vec4::ONE };
            let bucket = self.bucket(&mesh.texture);
            bucket.extend(mesh.vertices.iter().map(|vertex| WorldVertex {
                pos: matrix
                    .transform_point3(Vec3::from_array(vertex.pos))
                    .to_array(),
                uv: vertex.uv,
                color: (Vec4::from_array(vertex.color) * shade).to_array(),
                normal: (normal_matrix * Vec3::from_array(vertex.normal))
                    .normalize_or_zero()
                    .to_array(),
            }));
        }
    }

    fn render(&mut self, backend: &mut dyn RenderBackend, assets: &Assets, program: ProgramId) {
        let fallback = format!("blocks:{TEXTURE_NOTFOUND}");
        for mesh in self.pending.drain(..) {
            if mesh.vertices.is_empty() {
                continue;
            }
            let region = assets.texture_region(&mesh.texture, &fallback);
            backend.bind_texture(TextureSlot::Main, region.texture);
            let vertices: Vec<WorldVertex> = mesh
                .vertices
                .into_iter()
                .map(|vertex| WorldVertex {
                    uv: region.region.apply(vertex.uv),
                    ..vertex
                })
                .collect();
            backend.draw_vertices(
                program,
                Primitive::Triangles,
                VertexLayout::World,
                bytemuck::cast_slice(&vertices),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Atlas;
    use crate::renderer::backend::TextureId;
    use crate::renderer::batch3d::UvRegion;
    use crate::renderer::recording::{Command, RecordingBackend};
    use crate::renderer::shaders::ShaderRegistry;

    #[test]
    fn instances_are_grouped_by_texture_and_remapped() {
        let mut atlas = Atlas::new(TextureId(5));
        atlas.add("stone", UvRegion::new(0.5, 0.5, 1.0, 1.0));
        let mut assets = Assets::new(ShaderRegistry::new());
        assets.add_atlas("blocks", atlas);

        let mut model = Model::flat();
        model.meshes[0].texture = "blocks:stone".into();

        let mut batch = MeshModelBatch::new();
        batch.draw(Mat4::from_translation(Vec3::X), Vec4::ONE, &model);
        batch.draw(Mat4::IDENTITY, Vec4::splat(0.5), &model);
        assert_eq!(batch.pending_vertices(), 12);

        let mut backend = RecordingBackend::new();
        batch.render(&mut backend, &assets, ProgramId(1));
        assert_eq!(batch.pending_vertices(), 0);

        let draws: Vec<_> = backend.draws().collect();
        assert_eq!(draws.len(), 1);
        let stride = std::mem::size_of::<WorldVertex>();
        let vertex = |i: usize| -> WorldVertex {
            bytemuck::pod_read_unaligned(&draws[0].2[i * stride..(i + 1) * stride])
        };
        assert_eq!(vertex(0).pos[0], 0.5);
        assert_eq!(vertex(0).uv, [0.5, 0.5]);
        assert_eq!(vertex(6).color[0], 0.5);
        assert!(backend
            .commands()
            .iter()
            .any(|c| matches!(c, Command::BindTexture(TextureSlot::Main, Some(TextureId(5))))));
    }
}
