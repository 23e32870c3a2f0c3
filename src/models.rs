use glam::Vec3;
use log::{error, warn};
use serde_json::Value;

use crate::assets::Assets;
use crate::content::{Aabb, BlockDef, BlockModel, ContentIndex, ItemDef, ItemIcon};
use crate::error::RenderError;
use crate::renderer::batch3d::UvRegion;
use crate::renderer::vertex::WorldVertex;

pub const TEXTURE_NOTFOUND: &str = "notfound";
/// Model every block icon starts from; face `i` is textured `$i`.
pub const BLOCK_MODEL: &str = "block";
/// Flat quad textured `$0`, used for sprite icons and X-shaped blocks.
pub const FLAT_MODEL: &str = "drop-item";

const ITEM_MODEL_SCALE: f32 = 0.2;
const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

#[derive(Clone, Debug, PartialEq)]
pub struct ModelMesh {
    /// `atlas:region`, a plain texture name, or `$N` before texture faces
    /// are assigned.
    pub texture: String,
    pub vertices: Vec<WorldVertex>,
    pub shading: bool,
}

impl ModelMesh {
    pub fn new(texture: impl Into<String>) -> Self {
        Self {
            texture: texture.into(),
            vertices: Vec::new(),
            shading: true,
        }
    }

    fn push(&mut self, pos: Vec3, uv: [f32; 2], normal: Vec3) {
        self.vertices.push(WorldVertex {
            pos: pos.to_array(),
            uv,
            color: WHITE,
            normal: normal.to_array(),
        });
    }

    /// Two triangles spanning `pos ± right ± up`.
    pub fn add_plane(&mut self, pos: Vec3, right: Vec3, up: Vec3, normal: Vec3, uv: UvRegion) {
        self.push(pos - right - up, [uv.u1, uv.v1], normal);
        self.push(pos + right - up, [uv.u2, uv.v1], normal);
        self.push(pos + right + up, [uv.u2, uv.v2], normal);
        self.push(pos - right - up, [uv.u1, uv.v1], normal);
        self.push(pos + right + up, [uv.u2, uv.v2], normal);
        self.push(pos - right + up, [uv.u1, uv.v2], normal);
    }

    /// Box around `center` with half extents `half`. Faces are +Z, -Z, +Y,
    /// -Y, +X, -X.
    pub fn add_box(&mut self, center: Vec3, half: Vec3, uvs: &[UvRegion; 6], enabled: [bool; 6]) {
        let (x, y, z) = (Vec3::X * half.x, Vec3::Y * half.y, Vec3::Z * half.z);
        let faces = [
            (center + z, x, y, Vec3::Z),
            (center - z, -x, y, Vec3::NEG_Z),
            (center + y, x, -z, Vec3::Y),
            (center - y, x, z, Vec3::NEG_Y),
            (center + x, -z, y, Vec3::X),
            (center - x, z, y, Vec3::NEG_X),
        ];
        for (i, (pos, right, up, normal)) in faces.into_iter().enumerate() {
            if enabled[i] {
                self.add_plane(pos, right, up, normal, uvs[i]);
            }
        }
    }

    pub fn scale(&mut self, factor: Vec3) {
        for vertex in &mut self.vertices {
            vertex.pos = (Vec3::from_array(vertex.pos) * factor).to_array();
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    pub meshes: Vec<ModelMesh>,
}

impl Model {
    pub fn add_mesh(&mut self, texture: impl Into<String>) -> &mut ModelMesh {
        self.meshes.push(ModelMesh::new(texture));
        let last = self.meshes.len() - 1;
        &mut self.meshes[last]
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|mesh| mesh.vertices.len()).sum()
    }

    /// Unit cube centred on the origin with one mesh per face.
    pub fn block() -> Self {
        let mut model = Model::default();
        let uvs = [UvRegion::default(); 6];
        for face in 0..6 {
            let mut enabled = [false; 6];
            enabled[face] = true;
            model
                .add_mesh(format!("${face}"))
                .add_box(Vec3::ZERO, Vec3::splat(0.5), &uvs, enabled);
        }
        model
    }

    /// Unit quad facing +Z.
    pub fn flat() -> Self {
        let mut model = Model::default();
        model.add_mesh("$0").add_plane(
            Vec3::ZERO,
            Vec3::X * 0.5,
            Vec3::Y * 0.5,
            Vec3::Z,
            UvRegion::default(),
        );
        model
    }
}

/// Builds block and item models from content definitions.
pub struct ModelsGenerator;

impl ModelsGenerator {
    /// Stores the generic models every generated model derives from.
    pub fn register_builtin(assets: &mut Assets) {
        assets.add_model(BLOCK_MODEL, Model::block());
        assets.add_model(FLAT_MODEL, Model::flat());
    }

    /// Creates `<block>.model` for every custom block and `<item>.model`
    /// for every item.
    pub fn prepare(content: &ContentIndex, assets: &mut Assets) -> Result<(), RenderError> {
        for def in content.blocks() {
            if def.model != BlockModel::Custom {
                continue;
            }
            let Some(raw) = &def.custom_model else {
                warn!("Block `{}` uses a custom model without primitives", def.name);
                continue;
            };
            let model = Self::load_custom_block_model(raw, assets, true);
            assets.add_model(Self::block_model_name(def), model);
        }
        for item in content.items() {
            let model = Self::generate(item, content, assets)?;
            assets.add_model(item.model_name.clone(), model);
        }
        Ok(())
    }

    pub fn block_model_name(def: &BlockDef) -> String {
        format!("{}.model", def.name)
    }

    /// Model shown for an item in hand and on the ground.
    pub fn generate(
        item: &ItemDef,
        content: &ContentIndex,
        assets: &Assets,
    ) -> Result<Model, RenderError> {
        match &item.icon {
            ItemIcon::None => Ok(Model::default()),
            ItemIcon::Sprite(texture) => Self::flat_model(texture, assets),
            ItemIcon::Block(block_name) => {
                let Some(block) = content.find_block(block_name) else {
                    warn!(
                        "Item `{}` shows unknown block `{}` as its icon",
                        item.name, block_name
                    );
                    return Ok(Model::default());
                };
                Self::block_icon_model(block, assets)
            }
        }
    }

    fn block_icon_model(block: &BlockDef, assets: &Assets) -> Result<Model, RenderError> {
        match block.model {
            BlockModel::X => {
                return Self::flat_model(&format!("blocks:{}", block.texture_faces[0]), assets);
            }
            BlockModel::Custom => {
                let mut model = assets.require_model(&Self::block_model_name(block))?.clone();
                for mesh in &mut model.meshes {
                    mesh.scale(Vec3::splat(ITEM_MODEL_SCALE));
                }
                return Ok(model);
            }
            BlockModel::Block | BlockModel::Aabb => {}
        }
        let mut model = assets.require_model(BLOCK_MODEL)?.clone();
        let aabb_scale = (block.model == BlockModel::Aabb).then(|| {
            let size = block
                .hitboxes
                .first()
                .copied()
                .unwrap_or_else(Aabb::unit)
                .size();
            let m = size.max_element().min(1.0);
            size / m
        });
        for mesh in &mut model.meshes {
            if let Some(scale) = aabb_scale {
                mesh.scale(scale);
            }
            mesh.scale(Vec3::splat(ITEM_MODEL_SCALE));
        }
        configure_textures(&mut model, &block.texture_faces);
        Ok(model)
    }

    fn flat_model(texture: &str, assets: &Assets) -> Result<Model, RenderError> {
        let mut model = assets.require_model(FLAT_MODEL)?.clone();
        for mesh in &mut model.meshes {
            if mesh.texture == "$0" {
                mesh.texture = texture.to_string();
            }
        }
        Ok(model)
    }

    /// Assembles a model from `aabbs` and `tetragons` primitive lists.
    ///
    /// Box entries are `[x, y, z, w, h, d]` followed by either one texture
    /// for all faces or six textures. Tetragon entries are
    /// `[x, y, z, xw_x, xw_y, xw_z, yh_x, yh_y, yh_z, texture]`.
    pub fn load_custom_block_model(primitives: &Value, assets: &Assets, shading: bool) -> Model {
        let mut model = Model::default();

        let boxes = primitives.get("aabbs").and_then(Value::as_array);
        for (i, entry) in boxes.into_iter().flatten().enumerate() {
            let Some(values) = entry.as_array() else {
                warn!("aabbs[{}] is not an array, skipped", i);
                continue;
            };
            let Some(numbers) = read_numbers(values, 6) else {
                warn!("aabbs[{}] needs six numbers, skipped", i);
                continue;
            };
            let a = Vec3::new(numbers[0], numbers[1], numbers[2]);
            let aabb = Aabb::new(a, a + Vec3::new(numbers[3], numbers[4], numbers[5]));
            let textures = box_textures(values, i);

            let mut uvs: [UvRegion; 6] =
                std::array::from_fn(|face| region_for(&textures[5 - face], assets));
            uvs[2].scale(-1.0, -1.0);
            uvs[5].scale(-1.0, 1.0);

            let mesh = model.add_mesh("blocks:");
            mesh.shading = shading;
            mesh.add_box(aabb.center(), aabb.size() * 0.5, &uvs, [true; 6]);
        }

        let tetragons = primitives.get("tetragons").and_then(Value::as_array);
        for (i, entry) in tetragons.into_iter().flatten().enumerate() {
            let values = entry.as_array().map(Vec::as_slice).unwrap_or(&[]);
            let (Some(numbers), Some(texture)) =
                (read_numbers(values, 9), values.get(9).and_then(Value::as_str))
            else {
                warn!("tetragons[{}] needs nine numbers and a texture, skipped", i);
                continue;
            };
            let p = Vec3::new(numbers[0], numbers[1], numbers[2]);
            let xw = Vec3::new(numbers[3], numbers[4], numbers[5]);
            let yh = Vec3::new(numbers[6], numbers[7], numbers[8]);
            let points = [p, p + xw, p + xw + yh, p + yh];
            let normal = (points[1] - points[0])
                .cross(points[2] - points[0])
                .normalize_or_zero();

            let uv = region_for(texture, assets);
            let mesh = model.add_mesh("blocks:");
            mesh.shading = shading;
            for (index, uv) in [
                (0, [uv.u1, uv.v1]),
                (1, [uv.u2, uv.v1]),
                (2, [uv.u2, uv.v2]),
                (0, [uv.u1, uv.v1]),
                (2, [uv.u2, uv.v2]),
                (3, [uv.u1, uv.v2]),
            ] {
                mesh.push(points[index], uv, normal);
            }
        }
        model
    }
}

/// Replaces `$N` texture references with the block's N-th texture face.
fn configure_textures(model: &mut Model, texture_faces: &[String; 6]) {
    for mesh in &mut model.meshes {
        let Some(index) = mesh.texture.strip_prefix('$') else {
            continue;
        };
        let Ok(index) = index.parse::<usize>() else {
            warn!("Malformed texture reference `{}`", mesh.texture);
            continue;
        };
        match texture_faces.get(index) {
            Some(face) => mesh.texture = format!("blocks:{face}"),
            None => {
                error!("Texture face index {} is out of range", index);
                mesh.texture = format!("blocks:{TEXTURE_NOTFOUND}");
            }
        }
    }
}

fn read_numbers(values: &[Value], count: usize) -> Option<Vec<f32>> {
    values
        .get(..count)?
        .iter()
        .map(|value| value.as_f64().map(|n| n as f32))
        .collect()
}

fn box_textures(values: &[Value], index: usize) -> [String; 6] {
    let name = |value: &Value| value.as_str().unwrap_or(TEXTURE_NOTFOUND).to_string();
    match values.len() {
        7 => std::array::from_fn(|_| name(&values[6])),
        12 => std::array::from_fn(|face| name(&values[6 + face])),
        len => {
            warn!(
                "aabbs[{}] has {} entries; expected 7 or 12, using `{}`",
                index, len, TEXTURE_NOTFOUND
            );
            std::array::from_fn(|_| TEXTURE_NOTFOUND.to_string())
        }
    }
}

fn region_for(texture: &str, assets: &Assets) -> UvRegion {
    assets.texture_region(&format!("blocks:{texture}"), "").region
}
