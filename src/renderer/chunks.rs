//! Chunk meshes for levels held in memory.
//!
//! Meshing runs wherever the host likes; finished [`ChunkMesh`]es are sent
//! to [`LevelChunks`], which uploads them on its next `update`.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};

use glam::{IVec3, Vec3};
use log::debug;

use super::backend::{MeshId, ProgramId, RenderBackend, TextureId, TextureSlot, VertexLayout};
use super::batch3d::UvRegion;
use super::collaborators::ChunksRenderer;
use super::draw_context::DrawContext;
use super::frustum::Frustum;
use super::vertex::WorldVertex;
use crate::assets::Atlas;
use crate::camera::Camera;
use crate::content::{BlockDef, BlockId, BlockModel, Light, BLOCK_AIR, BLOCK_VOID};
use crate::level::{Level, SparseLevel};
use crate::models::TEXTURE_NOTFOUND;

pub const CHUNK_SIZE: i32 = 16;
/// Horizontal distance from the player within which chunks cast shadows.
pub const SHADOW_DISTANCE: f32 = 96.0;

/// Face normals with the in-plane axes `right` and `up`, wound so that
/// `right x up` points along the normal. Face `i` uses texture face `i`.
const FACES: [(IVec3, Vec3, Vec3); 6] = [
    (IVec3::new(0, 0, 1), Vec3::X, Vec3::Y),
    (IVec3::new(0, 0, -1), Vec3::NEG_X, Vec3::Y),
    (IVec3::new(0, 1, 0), Vec3::X, Vec3::NEG_Z),
    (IVec3::new(0, -1, 0), Vec3::X, Vec3::Z),
    (IVec3::new(1, 0, 0), Vec3::NEG_Z, Vec3::Y),
    (IVec3::new(-1, 0, 0), Vec3::Z, Vec3::Y),
];

pub fn chunk_of(position: IVec3) -> IVec3 {
    position.div_euclid(IVec3::splat(CHUNK_SIZE))
}

/// Vertex color of a face lit by `light`: block light in rgb, sun in alpha.
pub fn light_color(light: Light) -> [f32; 4] {
    let channel = |c: u8| light.channel(c) as f32 / 15.0;
    [
        channel(Light::RED),
        channel(Light::GREEN),
        channel(Light::BLUE),
        channel(Light::SUN),
    ]
}

/// CPU-side geometry of one chunk in world coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkMesh {
    pub coord: IVec3,
    pub opaque: Vec<WorldVertex>,
    pub translucent: Vec<WorldVertex>,
}

impl ChunkMesh {
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.translucent.is_empty()
    }
}

fn push_quad(
    out: &mut Vec<WorldVertex>,
    pos: Vec3,
    right: Vec3,
    up: Vec3,
    uv: UvRegion,
    color: [f32; 4],
) {
    let normal = right.cross(up).normalize_or_zero().to_array();
    let mut vertex = |p: Vec3, u: f32, v: f32| {
        out.push(WorldVertex {
            pos: p.to_array(),
            uv: [u, v],
            color,
            normal,
        })
    };
    vertex(pos - right - up, uv.u1, uv.v1);
    vertex(pos + right - up, uv.u2, uv.v1);
    vertex(pos + right + up, uv.u2, uv.v2);
    vertex(pos - right - up, uv.u1, uv.v1);
    vertex(pos + right + up, uv.u2, uv.v2);
    vertex(pos - right + up, uv.u1, uv.v2);
}

/// Builds chunk meshes from a [`Level`], resolving face textures in the
/// block atlas.
pub struct ChunkMesher<'a> {
    level: &'a dyn Level,
    atlas: Option<&'a Atlas>,
}

impl<'a> ChunkMesher<'a> {
    pub fn new(level: &'a dyn Level, atlas: Option<&'a Atlas>) -> Self {
        Self { level, atlas }
    }

    pub fn mesh(&self, coord: IVec3) -> ChunkMesh {
        let mut mesh = ChunkMesh {
            coord,
            ..Default::default()
        };
        let origin = coord * CHUNK_SIZE;
        for y in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    let position = origin + IVec3::new(x, y, z);
                    let Some(voxel) = self.level.voxel_at(position) else {
                        continue;
                    };
                    if voxel.id == BLOCK_AIR || voxel.id == BLOCK_VOID {
                        continue;
                    }
                    let Some(def) = self.level.content().block(voxel.id) else {
                        debug!("Voxel at {} has unknown id {}", position, voxel.id);
                        continue;
                    };
                    let out = if def.translucent {
                        &mut mesh.translucent
                    } else {
                        &mut mesh.opaque
                    };
                    match def.model {
                        BlockModel::X => self.cross(out, position, def),
                        _ => self.cube(out, position, voxel.id, def),
                    }
                }
            }
        }
        mesh
    }

    /// Meshes every chunk holding at least one stored voxel, in coordinate
    /// order.
    pub fn mesh_level(level: &SparseLevel, atlas: Option<&Atlas>) -> Vec<ChunkMesh> {
        let coords: HashSet<IVec3> = level.voxels().map(|(pos, _)| chunk_of(*pos)).collect();
        let mut coords: Vec<IVec3> = coords.into_iter().collect();
        coords.sort_by_key(|c| (c.x, c.y, c.z));
        let mesher = ChunkMesher::new(level, atlas);
        coords
            .into_iter()
            .map(|coord| mesher.mesh(coord))
            .filter(|mesh| !mesh.is_empty())
            .collect()
    }

    fn region(&self, texture: &str) -> UvRegion {
        self.atlas
            .and_then(|atlas| atlas.get(texture).or_else(|| atlas.get(TEXTURE_NOTFOUND)))
            .unwrap_or_default()
    }

    fn occludes(&self, id: BlockId) -> bool {
        self.level
            .content()
            .block(id)
            .is_some_and(|def| def.model != BlockModel::X && !def.translucent)
    }

    /// Faces against unloaded space stay hidden; faces between two voxels
    /// of the same translucent block are merged away.
    fn face_visible(&self, id: BlockId, neighbor: IVec3) -> bool {
        match self.level.voxel_at(neighbor) {
            None => false,
            Some(voxel) if voxel.id == BLOCK_AIR => true,
            Some(voxel) => voxel.id != id && !self.occludes(voxel.id),
        }
    }

    fn cube(&self, out: &mut Vec<WorldVertex>, position: IVec3, id: BlockId, def: &BlockDef) {
        let center = position.as_vec3() + Vec3::splat(0.5);
        for (face, (normal, right, up)) in FACES.iter().enumerate() {
            let neighbor = position + *normal;
            if !self.face_visible(id, neighbor) {
                continue;
            }
            let color = light_color(self.level.light_at(neighbor));
            push_quad(
                out,
                center + normal.as_vec3() * 0.5,
                *right * 0.5,
                *up * 0.5,
                self.region(&def.texture_faces[face]),
                color,
            );
        }
    }

    /// Two crossed diagonal planes, each emitted for both sides.
    fn cross(&self, out: &mut Vec<WorldVertex>, position: IVec3, def: &BlockDef) {
        let center = position.as_vec3() + Vec3::splat(0.5);
        let color = light_color(self.level.light_at(position));
        let uv = self.region(&def.texture_faces[0]);
        let up = Vec3::Y * 0.5;
        for right in [Vec3::new(0.5, 0.0, 0.5), Vec3::new(0.5, 0.0, -0.5)] {
            push_quad(out, center, right, up, uv, color);
            push_quad(out, center, -right, up, uv, color);
        }
    }
}

struct GpuChunk {
    opaque: Option<MeshId>,
    translucent: Option<MeshId>,
    min: Vec3,
    max: Vec3,
}

impl GpuChunk {
    fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    fn visible(&self, frustum: Option<&Frustum>) -> bool {
        frustum.map_or(true, |f| f.is_box_visible(self.min, self.max))
    }
}

fn upload(backend: &mut dyn RenderBackend, vertices: &[WorldVertex]) -> Option<MeshId> {
    (!vertices.is_empty()).then(|| {
        backend.create_mesh(
            VertexLayout::World,
            bytemuck::cast_slice(vertices),
            vertices.len() as u32,
        )
    })
}

/// [`ChunksRenderer`] drawing uploaded chunk meshes with the block atlas.
pub struct LevelChunks {
    atlas: Option<TextureId>,
    receiver: Receiver<ChunkMesh>,
    chunks: HashMap<IVec3, GpuChunk>,
}

impl LevelChunks {
    /// Returns the renderer and the sender meshes are delivered through.
    pub fn new(atlas: Option<TextureId>) -> (Self, Sender<ChunkMesh>) {
        let (sender, receiver) = mpsc::channel();
        let chunks = Self {
            atlas,
            receiver,
            chunks: HashMap::new(),
        };
        (chunks, sender)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks passing `keep`, ordered by distance to `eye`; nearest first
    /// unless `back_to_front` is set.
    fn ordered<'s>(
        &'s self,
        eye: Vec3,
        back_to_front: bool,
        keep: impl Fn(&GpuChunk) -> bool,
    ) -> Vec<&'s GpuChunk> {
        let mut chunks: Vec<&GpuChunk> = self.chunks.values().filter(|c| keep(c)).collect();
        chunks.sort_by(|a, b| {
            let order = a
                .center()
                .distance_squared(eye)
                .partial_cmp(&b.center().distance_squared(eye))
                .unwrap_or(Ordering::Equal);
            if back_to_front {
                order.reverse()
            } else {
                order
            }
        });
        chunks
    }
}

impl ChunksRenderer for LevelChunks {
    fn update(&mut self, backend: &mut dyn RenderBackend) {
        let mut uploaded = 0;
        while let Ok(mesh) = self.receiver.try_recv() {
            if let Some(old) = self.chunks.remove(&mesh.coord) {
                for id in [old.opaque, old.translucent].into_iter().flatten() {
                    backend.release_mesh(id);
                }
            }
            if mesh.is_empty() {
                continue;
            }
            let min = (mesh.coord * CHUNK_SIZE).as_vec3();
            self.chunks.insert(
                mesh.coord,
                GpuChunk {
                    opaque: upload(backend, &mesh.opaque),
                    translucent: upload(backend, &mesh.translucent),
                    min,
                    max: min + Vec3::splat(CHUNK_SIZE as f32),
                },
            );
            uploaded += 1;
        }
        if uploaded > 0 {
            debug!(
                "Uploaded {} chunk meshes ({} resident)",
                uploaded,
                self.chunks.len()
            );
        }
    }

    fn draw_chunks(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: &Camera,
        program: ProgramId,
        frustum: Option<&Frustum>,
    ) {
        let backend = ctx.backend();
        backend.bind_texture(TextureSlot::Main, self.atlas);
        for chunk in self.ordered(camera.position, false, |c| c.visible(frustum)) {
            if let Some(mesh) = chunk.opaque {
                backend.draw_mesh(program, mesh);
            }
        }
    }

    fn draw_shadows_pass(
        &mut self,
        ctx: &mut DrawContext<'_>,
        shadow_camera: &Camera,
        program: ProgramId,
        player_camera: &Camera,
    ) {
        let frustum = Frustum::from_view_projection(&shadow_camera.proj_view(true));
        let player = player_camera.position;
        let near_player = |chunk: &GpuChunk| {
            let center = chunk.center();
            let offset = Vec3::new(center.x - player.x, 0.0, center.z - player.z);
            offset.length() <= SHADOW_DISTANCE + CHUNK_SIZE as f32
        };
        let backend = ctx.backend();
        for chunk in self.ordered(player, false, |c| near_player(c) && c.visible(Some(&frustum))) {
            if let Some(mesh) = chunk.opaque {
                backend.draw_mesh(program, mesh);
            }
        }
    }

    fn draw_sorted_meshes(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: &Camera,
        program: ProgramId,
    ) {
        let backend = ctx.backend();
        backend.bind_texture(TextureSlot::Main, self.atlas);
        for chunk in self.ordered(camera.position, true, |c| c.translucent.is_some()) {
            if let Some(mesh) = chunk.translucent {
                backend.draw_mesh(program, mesh);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentIndex;
    use crate::renderer::recording::{Command, RecordingBackend};
    use crate::renderer::state::Viewport;

    fn level_with(blocks: &[(IVec3, BlockId)], content: ContentIndex) -> SparseLevel {
        let mut level = SparseLevel::new(content);
        for (pos, id) in blocks {
            level.set_block(*pos, *id);
        }
        level
    }

    fn content() -> (ContentIndex, BlockId, BlockId) {
        let mut content = ContentIndex::new();
        let stone = content.add_block(BlockDef::new("stone"));
        let mut glass = BlockDef::new("glass");
        glass.translucent = true;
        let glass = content.add_block(glass);
        (content, stone, glass)
    }

    #[test]
    fn hidden_faces_are_skipped() {
        let (content, stone, _) = content();
        let level = level_with(&[(IVec3::ZERO, stone), (IVec3::X, stone)], content);
        let mesh = ChunkMesher::new(&level, None).mesh(IVec3::ZERO);
        // Two cubes sharing a face: 10 visible faces of 6 vertices.
        assert_eq!(mesh.opaque.len(), 60);
        assert!(mesh.translucent.is_empty());
    }

    #[test]
    fn faces_wind_counter_clockwise_outwards() {
        let (content, stone, _) = content();
        let level = level_with(&[(IVec3::new(3, 3, 3), stone)], content);
        let mesh = ChunkMesher::new(&level, None).mesh(IVec3::ZERO);
        let center = Vec3::splat(3.5);
        for tri in mesh.opaque.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from_array(tri[i].pos));
            let facing = (b - a).cross(c - a);
            assert!(facing.dot(a - center) > 0.0);
            assert!(facing.normalize().dot(Vec3::from_array(tri[0].normal)) > 0.99);
        }
    }

    #[test]
    fn translucent_blocks_merge_with_their_own_kind() {
        let (content, stone, glass) = content();
        let level = level_with(
            &[(IVec3::ZERO, glass), (IVec3::X, glass), (IVec3::Y, stone)],
            content,
        );
        let mesh = ChunkMesher::new(&level, None).mesh(IVec3::ZERO);
        // The glass pair hides its shared face; stone shows through glass.
        assert_eq!(mesh.translucent.len(), 9 * 6);
        assert_eq!(mesh.opaque.len(), 6 * 6);
    }

    #[test]
    fn vertex_color_carries_light_of_the_neighbor() {
        let (content, stone, _) = content();
        let mut level = level_with(&[(IVec3::ZERO, stone)], content);
        level.set_light(IVec3::Y, Light::new(15, 0, 0, 3));
        let mesh = ChunkMesher::new(&level, None).mesh(IVec3::ZERO);
        let top = mesh
            .opaque
            .iter()
            .find(|v| v.normal == [0.0, 1.0, 0.0])
            .map(|v| v.color);
        assert_eq!(top, Some([1.0, 0.0, 0.0, 0.2]));
    }

    #[test]
    fn level_meshing_visits_occupied_chunks_only() {
        let (content, stone, _) = content();
        let level = level_with(
            &[(IVec3::ZERO, stone), (IVec3::new(-1, 40, 0), stone)],
            content,
        );
        let meshes = ChunkMesher::mesh_level(&level, None);
        let coords: Vec<IVec3> = meshes.iter().map(|m| m.coord).collect();
        assert_eq!(coords, vec![IVec3::new(-1, 2, 0), IVec3::ZERO]);
    }

    #[test]
    fn translucent_chunks_draw_back_to_front() {
        let (content, _, glass) = content();
        let level = level_with(
            &[(IVec3::new(1, 1, 1), glass), (IVec3::new(1, 1, 40), glass)],
            content,
        );
        let (mut chunks, sender) = LevelChunks::new(Some(TextureId(9)));
        for mesh in ChunkMesher::mesh_level(&level, None) {
            sender.send(mesh).unwrap();
        }
        let mut backend = RecordingBackend::new();
        chunks.update(&mut backend);
        assert_eq!(chunks.len(), 2);

        let created: Vec<MeshId> = backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::CreateMesh(id, ..) => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(created.len(), 2);

        let camera = Camera::new(Vec3::new(1.0, 1.0, 0.0), 1.0);
        {
            let mut ctx = DrawContext::new(&mut backend, Viewport::new(8, 8));
            chunks.draw_sorted_meshes(&mut ctx, &camera, ProgramId(3));
        }
        let drawn: Vec<MeshId> = backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Draw { mesh, .. } => *mesh,
                _ => None,
            })
            .collect();
        // Chunk (0, 0, 2) is farther from the camera and goes first.
        assert_eq!(drawn, vec![created[1], created[0]]);
    }

    #[test]
    fn replaced_chunks_release_their_meshes() {
        let (content, stone, _) = content();
        let level = level_with(&[(IVec3::ZERO, stone)], content);
        let (mut chunks, sender) = LevelChunks::new(None);
        let mut backend = RecordingBackend::new();
        let mesh = ChunkMesher::new(&level, None).mesh(IVec3::ZERO);
        sender.send(mesh).unwrap();
        chunks.update(&mut backend);
        sender.send(ChunkMesh::default()).unwrap();
        chunks.update(&mut backend);
        assert!(chunks.is_empty());
        assert!(backend
            .commands()
            .iter()
            .any(|c| matches!(c, Command::ReleaseMesh(_))));
    }
}
