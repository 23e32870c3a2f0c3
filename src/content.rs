use glam::{IVec3, Vec3};

use crate::error::RenderError;

pub type BlockId = u16;
pub type ItemId = u16;

pub const BLOCK_AIR: BlockId = 0;
/// Id reported for voxels outside of loaded chunks and for "no selection".
pub const BLOCK_VOID: BlockId = BlockId::MAX;
pub const ITEM_EMPTY: ItemId = 0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub a: Vec3,
    pub b: Vec3,
}

impl Aabb {
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self { a, b }
    }

    pub fn from_size(position: Vec3, size: Vec3) -> Self {
        Self::new(position, position + size)
    }

    pub fn unit() -> Self {
        Self::new(Vec3::ZERO, Vec3::ONE)
    }

    pub fn min(&self) -> Vec3 {
        self.a.min(self.b)
    }

    pub fn max(&self) -> Vec3 {
        self.a.max(self.b)
    }

    pub fn size(&self) -> Vec3 {
        self.max() - self.min()
    }

    pub fn center(&self) -> Vec3 {
        (self.a + self.b) * 0.5
    }
}

/// How a block's mesh is produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum BlockModel {
    #[default]
    Block,
    Aabb,
    X,
    /// Assembled from the `custom_model` description.
    Custom,
}

#[derive(Clone, Debug)]
pub struct BlockDef {
    pub name: String,
    pub hitboxes: Vec<Aabb>,
    pub rotatable: bool,
    /// Hit-boxes per rotation state, used when `rotatable` is set.
    pub rotation_hitboxes: Vec<Vec<Aabb>>,
    /// Light emission per channel, 0..=15.
    pub emission: [u8; 3],
    /// Texture drawn over the screen while the camera is inside the block.
    pub overlay_texture: String,
    /// Texture names of the six faces in +Z, -Z, +Y, -Y, +X, -X order.
    pub texture_faces: [String; 6],
    /// Drawn in the sorted translucent pass instead of with opaque chunks.
    pub translucent: bool,
    pub model: BlockModel,
    pub custom_model: Option<serde_json::Value>,
}

impl BlockDef {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            texture_faces: std::array::from_fn(|_| name.clone()),
            name,
            hitboxes: vec![Aabb::unit()],
            rotatable: false,
            rotation_hitboxes: Vec::new(),
            emission: [0; 3],
            overlay_texture: String::new(),
            translucent: false,
            model: BlockModel::Block,
            custom_model: None,
        }
    }

    /// Hit-boxes of the block in the given rotation state.
    pub fn hitboxes_for(&self, rotation: u8) -> &[Aabb] {
        if self.rotatable {
            if let Some(boxes) = self.rotation_hitboxes.get(rotation as usize) {
                return boxes;
            }
        }
        &self.hitboxes
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ItemIcon {
    None,
    /// Rendered as a small copy of the block model.
    Block(String),
    /// Flat sprite taken from the atlas.
    Sprite(String),
}

#[derive(Clone, Debug)]
pub struct ItemDef {
    pub name: String,
    pub emission: [u8; 3],
    pub model_name: String,
    pub icon: ItemIcon,
}

impl ItemDef {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            model_name: format!("{name}.model"),
            name,
            emission: [0; 3],
            icon: ItemIcon::None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Voxel {
    pub id: BlockId,
    pub rotation: u8,
}

impl Voxel {
    pub const VOID: Voxel = Voxel {
        id: BLOCK_VOID,
        rotation: 0,
    };

    pub fn new(id: BlockId) -> Self {
        Self { id, rotation: 0 }
    }
}

/// Packed light value: four 4-bit channels (red, green, blue, sun).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Light(pub u16);

impl Light {
    pub const RED: u8 = 0;
    pub const GREEN: u8 = 1;
    pub const BLUE: u8 = 2;
    pub const SUN: u8 = 3;

    pub fn new(r: u8, g: u8, b: u8, s: u8) -> Self {
        Self(
            (r & 0xF) as u16
                | ((g & 0xF) as u16) << 4
                | ((b & 0xF) as u16) << 8
                | ((s & 0xF) as u16) << 12,
        )
    }

    pub fn channel(self, channel: u8) -> u8 {
        ((self.0 >> (channel << 2)) & 0xF) as u8
    }
}

/// Result of the voxel raycast from the player's camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Selection {
    pub voxel: Voxel,
    pub position: IVec3,
    pub hit_position: Vec3,
    pub normal: Vec3,
}

/// Block and item definitions addressed by numeric id.
#[derive(Debug, Default)]
pub struct ContentIndex {
    blocks: Vec<BlockDef>,
    items: Vec<ItemDef>,
}

impl ContentIndex {
    /// Creates an index holding the `core:air` block and the `core:empty` item.
    pub fn new() -> Self {
        let mut air = BlockDef::new("core:air");
        air.hitboxes.clear();
        Self {
            blocks: vec![air],
            items: vec![ItemDef::new("core:empty")],
        }
    }

    pub fn add_block(&mut self, def: BlockDef) -> BlockId {
        self.blocks.push(def);
        (self.blocks.len() - 1) as BlockId
    }

    pub fn add_item(&mut self, def: ItemDef) -> ItemId {
        self.items.push(def);
        (self.items.len() - 1) as ItemId
    }

    pub fn block(&self, id: BlockId) -> Option<&BlockDef> {
        self.blocks.get(id as usize)
    }

    pub fn item(&self, id: ItemId) -> Option<&ItemDef> {
        self.items.get(id as usize)
    }

    pub fn find_block(&self, name: &str) -> Option<&BlockDef> {
        self.blocks.iter().find(|def| def.name == name)
    }

    pub fn require_block(&self, id: BlockId) -> Result<&BlockDef, RenderError> {
        self.block(id).ok_or(RenderError::UnknownBlock(id))
    }

    pub fn require_item(&self, id: ItemId) -> Result<&ItemDef, RenderError> {
        self.item(id).ok_or(RenderError::UnknownItem(id))
    }

    pub fn blocks(&self) -> &[BlockDef] {
        &self.blocks
    }

    pub fn items(&self) -> &[ItemDef] {
        &self.items
    }
}
