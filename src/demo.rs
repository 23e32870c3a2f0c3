//! Built-in world shown by the binary: a small hilly island with a few
//! torches, flowers and a glass wall, textured from a generated atlas.

use glam::{IVec3, Vec3};
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::assets::{Assets, Atlas};
use crate::camera::Camera;
use crate::content::{
    Aabb, BlockDef, BlockId, BlockModel, ContentIndex, ItemDef, ItemIcon, ItemId, Light,
    Selection, Voxel, BLOCK_AIR,
};
use crate::level::{Level, Player, SparseLevel};
use crate::models::TEXTURE_NOTFOUND;
use crate::renderer::backend::{RenderBackend, TextureId};
use crate::renderer::batch3d::UvRegion;

pub const ATLAS_NAME: &str = "blocks";
const TILE: usize = 16;
const TILES_PER_ROW: usize = 4;
/// Half extent of the generated island.
const WORLD_RADIUS: i32 = 24;
const EYE_HEIGHT: f32 = 1.6;
const TORCH_EMISSION: [u8; 3] = [15, 12, 6];

/// Atlas tiles: name, base color and alpha.
const TILES: [(&str, [u8; 3], u8); 7] = [
    (TEXTURE_NOTFOUND, [255, 0, 255], 255),
    ("stone", [118, 118, 124], 255),
    ("grass", [86, 156, 60], 255),
    ("dirt", [128, 90, 56], 255),
    ("glass", [196, 226, 250], 96),
    ("torch", [255, 196, 80], 255),
    ("flower", [226, 62, 84], 255),
];

/// Pixels of the block atlas with the region of every tile.
pub struct AtlasImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub regions: Vec<(String, UvRegion)>,
}

pub fn atlas_image(seed: u64) -> AtlasImage {
    let rows = TILES.len().div_ceil(TILES_PER_ROW);
    let (width, height) = (TILES_PER_ROW * TILE, rows * TILE);
    let mut rgba = vec![0u8; width * height * 4];
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut regions = Vec::with_capacity(TILES.len());

    for (index, (name, color, alpha)) in TILES.iter().enumerate() {
        let (col, row) = (index % TILES_PER_ROW, index / TILES_PER_ROW);
        for y in 0..TILE {
            for x in 0..TILE {
                let shade: f32 = rng.gen_range(0.85..1.0);
                let a = match *name {
                    // Flower petals in a diamond, transparent elsewhere.
                    "flower" if x.abs_diff(TILE / 2) + y.abs_diff(TILE / 2) > TILE / 3 => 0,
                    "glass" if x == 0 || y == 0 || x == TILE - 1 || y == TILE - 1 => 255,
                    _ => *alpha,
                };
                let offset = ((row * TILE + y) * width + col * TILE + x) * 4;
                for (channel, value) in color.iter().enumerate() {
                    rgba[offset + channel] = (*value as f32 * shade) as u8;
                }
                rgba[offset + 3] = a;
            }
        }
        // Texture rows run top-down while UVs start at the bottom.
        let (w, h) = (TILE as f32 / width as f32, TILE as f32 / height as f32);
        let v2 = 1.0 - row as f32 * h;
        regions.push((
            name.to_string(),
            UvRegion::new(col as f32 * w, v2 - h, (col + 1) as f32 * w, v2),
        ));
    }

    AtlasImage {
        width: width as u32,
        height: height as u32,
        rgba,
        regions,
    }
}

/// Uploads the generated atlas and registers it under [`ATLAS_NAME`].
pub fn load_atlas(backend: &mut dyn RenderBackend, assets: &mut Assets) -> TextureId {
    let image = atlas_image(7);
    let texture = backend.create_texture(image.width, image.height, &image.rgba);
    let mut atlas = Atlas::new(texture);
    for (name, region) in image.regions {
        atlas.add(name, region);
    }
    assets.add_atlas(ATLAS_NAME, atlas);
    texture
}

pub struct DemoBlocks {
    pub stone: BlockId,
    pub grass: BlockId,
    pub dirt: BlockId,
    pub glass: BlockId,
    pub torch: BlockId,
    pub flower: BlockId,
}

fn block(name: &str, faces: [&str; 6]) -> BlockDef {
    let mut def = BlockDef::new(format!("demo:{name}"));
    def.texture_faces = faces.map(str::to_string);
    def
}

pub fn demo_content() -> (ContentIndex, DemoBlocks, ItemId) {
    let mut content = ContentIndex::new();

    let stone = content.add_block(block("stone", ["stone"; 6]));
    let grass = content.add_block(block(
        "grass",
        ["dirt", "dirt", "grass", "dirt", "dirt", "dirt"],
    ));
    let dirt = content.add_block(block("dirt", ["dirt"; 6]));

    let mut glass_def = block("glass", ["glass"; 6]);
    glass_def.translucent = true;
    let glass = content.add_block(glass_def);

    let mut torch_def = block("torch", ["torch"; 6]);
    torch_def.emission = TORCH_EMISSION;
    torch_def.model = BlockModel::Aabb;
    torch_def.hitboxes = vec![Aabb::new(
        Vec3::new(0.4, 0.0, 0.4),
        Vec3::new(0.6, 0.7, 0.6),
    )];
    let torch = content.add_block(torch_def);

    let mut flower_def = block("flower", ["flower"; 6]);
    flower_def.model = BlockModel::X;
    flower_def.hitboxes = vec![Aabb::new(Vec3::splat(0.2), Vec3::new(0.8, 0.8, 0.8))];
    let flower = content.add_block(flower_def);

    let mut torch_item = ItemDef::new("demo:torch.item");
    torch_item.emission = TORCH_EMISSION;
    torch_item.icon = ItemIcon::Block("demo:torch".into());
    let torch_item = content.add_item(torch_item);

    let mut stone_item = ItemDef::new("demo:stone.item");
    stone_item.icon = ItemIcon::Block("demo:stone".into());
    content.add_item(stone_item);

    let blocks = DemoBlocks {
        stone,
        grass,
        dirt,
        glass,
        torch,
        flower,
    };
    (content, blocks, torch_item)
}

fn height_at(x: i32, z: i32) -> i32 {
    let (fx, fz) = (x as f32, z as f32);
    let hills = (fx * 0.21).sin() * 2.5 + (fz * 0.17).cos() * 2.0 + ((fx + fz) * 0.09).sin() * 1.5;
    let edge = (fx.hypot(fz) / WORLD_RADIUS as f32).powi(4) * 6.0;
    (8.0 + hills - edge).round() as i32
}

/// Spreads block light from `source` with one level lost per block of
/// Manhattan distance.
fn light_up(level: &mut SparseLevel, source: IVec3, emission: [u8; 3]) {
    let radius = emission.iter().copied().max().unwrap_or(0) as i32;
    for dy in -radius..=radius {
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                let offset = IVec3::new(dx, dy, dz);
                let distance = offset.abs().element_sum();
                if distance > radius {
                    continue;
                }
                let position = source + offset;
                let old = level.light_at(position);
                let channel = |c: usize, ch: u8| {
                    let value = (emission[c] as i32 - distance).max(0) as u8;
                    value.max(old.channel(ch))
                };
                level.set_light(
                    position,
                    Light::new(
                        channel(0, Light::RED),
                        channel(1, Light::GREEN),
                        channel(2, Light::BLUE),
                        old.channel(Light::SUN),
                    ),
                );
            }
        }
    }
}

pub struct DemoWorld {
    pub level: SparseLevel,
    pub player: Player,
    pub blocks: DemoBlocks,
}

impl DemoWorld {
    pub fn generate(seed: u64) -> Self {
        let (content, blocks, torch_item) = demo_content();
        let mut level = SparseLevel::new(content);
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut torches = Vec::new();

        for z in -WORLD_RADIUS..WORLD_RADIUS {
            for x in -WORLD_RADIUS..WORLD_RADIUS {
                let top = height_at(x, z);
                if top < 1 {
                    continue;
                }
                for y in 0..top {
                    let id = match top - y {
                        1 => blocks.grass,
                        2..=3 => blocks.dirt,
                        _ => blocks.stone,
                    };
                    level.set_block(IVec3::new(x, y, z), id);
                }
                let above = IVec3::new(x, top, z);
                match rng.gen_range(0..100) {
                    0..=5 => level.set_block(above, blocks.flower),
                    6 if torches.len() < 8 => {
                        level.set_block(above, blocks.torch);
                        torches.push(above);
                    }
                    _ => {}
                }
            }
        }

        for y in 0..4 {
            for x in -3..=3 {
                let base = height_at(x, 6);
                level.set_block(IVec3::new(x, base + y, 6), blocks.glass);
            }
        }
        for torch in &torches {
            light_up(&mut level, *torch, TORCH_EMISSION);
        }
        info!(
            "Demo world generated: {} voxels, {} torches",
            level.voxels().count(),
            torches.len()
        );

        let spawn = Vec3::new(0.5, height_at(0, 0) as f32 + 0.01, -4.5);
        let player = Player {
            position: spawn,
            chosen_item: torch_item,
            ..Player::default()
        };
        Self {
            level,
            player,
            blocks,
        }
    }

    pub fn spawn_camera(&self, fov: f32) -> Camera {
        Camera::new(self.player.position + Vec3::Y * EYE_HEIGHT, fov)
    }

    /// Camera position for a player standing at `position`.
    pub fn eye(position: Vec3) -> Vec3 {
        position + Vec3::Y * EYE_HEIGHT
    }
}

/// First solid voxel along `direction` within `max_distance`, sampled at
/// small steps.
pub fn pick(
    level: &dyn Level,
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
) -> Option<Selection> {
    const STEP: f32 = 0.05;
    let direction = direction.normalize_or_zero();
    if direction == Vec3::ZERO {
        return None;
    }
    let mut previous = origin.floor().as_ivec3();
    let mut travelled = 0.0;
    while travelled <= max_distance {
        let point = origin + direction * travelled;
        let cell = point.floor().as_ivec3();
        if cell != previous || travelled == 0.0 {
            if let Some(voxel) = level.voxel_at(cell).filter(|v: &Voxel| v.id != BLOCK_AIR) {
                let normal = (previous - cell).as_vec3();
                return Some(Selection {
                    voxel,
                    position: cell,
                    hit_position: point,
                    normal: if normal.length_squared() == 1.0 {
                        normal
                    } else {
                        -direction
                    },
                });
            }
            previous = cell;
        }
        travelled += STEP;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atlas_regions_tile_the_image() {
        let image = atlas_image(1);
        assert_eq!(image.rgba.len(), (image.width * image.height * 4) as usize);
        assert_eq!(image.regions.len(), TILES.len());
        let (_, first) = &image.regions[0];
        assert_eq!(first.u1, 0.0);
        assert_eq!(first.v2, 1.0);
        for (_, region) in &image.regions {
            assert!(region.u1 < region.u2 && region.v1 < region.v2);
            assert!(region.v1 >= 0.0 && region.u2 <= 1.0);
        }
    }

    #[test]
    fn torches_light_their_surroundings() {
        let world = DemoWorld::generate(3);
        let torch = world
            .level
            .voxels()
            .find(|(_, v)| v.id == world.blocks.torch)
            .map(|(p, _)| *p);
        if let Some(torch) = torch {
            assert_eq!(world.level.light_at(torch).channel(Light::RED), 15);
            let near = world.level.light_at(torch + IVec3::X).channel(Light::RED);
            assert!(near >= 14);
        }
    }

    #[test]
    fn pick_reports_the_entered_face() {
        let (content, blocks, _) = demo_content();
        let mut level = SparseLevel::new(content);
        level.set_block(IVec3::new(0, 0, -3), blocks.stone);
        let hit = pick(&level, Vec3::new(0.5, 0.5, 0.5), Vec3::NEG_Z, 8.0);
        let hit = hit.map(|s| (s.position, s.normal));
        assert_eq!(hit, Some((IVec3::new(0, 0, -3), Vec3::Z)));
        assert!(pick(&level, Vec3::new(0.5, 0.5, 0.5), Vec3::Z, 8.0).is_none());
    }
}
