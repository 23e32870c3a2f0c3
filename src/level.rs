use std::collections::HashMap;

use glam::{IVec3, Vec3};

use crate::content::{BlockId, ContentIndex, ItemId, Light, Selection, Voxel, ITEM_EMPTY};

/// Read access to the world being rendered.
pub trait Level {
    /// Time of day in `0..1`; 0.5 is noon.
    fn daytime(&self) -> f32;
    /// World fog scalar in `0..1`.
    fn fog(&self) -> f32;
    fn content(&self) -> &ContentIndex;
    /// `None` outside of loaded chunks.
    fn voxel_at(&self, position: IVec3) -> Option<Voxel>;
    fn light_at(&self, position: IVec3) -> Light;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CameraMode {
    #[default]
    FirstPerson,
    ThirdPerson,
    ThirdPersonFront,
    Spectator,
}

/// Per-frame snapshot of the player as far as rendering is concerned.
#[derive(Clone, Debug)]
pub struct Player {
    pub position: Vec3,
    /// Yaw, pitch and roll in degrees.
    pub rotation: Vec3,
    pub chosen_item: ItemId,
    pub selection: Option<Selection>,
    pub camera_mode: CameraMode,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            chosen_item: ITEM_EMPTY,
            selection: None,
            camera_mode: CameraMode::FirstPerson,
        }
    }
}

/// In-memory level backed by sparse voxel and light maps.
#[derive(Debug)]
pub struct SparseLevel {
    pub daytime: f32,
    pub fog: f32,
    pub content: ContentIndex,
    voxels: HashMap<IVec3, Voxel>,
    lights: HashMap<IVec3, Light>,
    /// Light reported for positions that have no explicit entry.
    pub ambient: Light,
}

impl SparseLevel {
    pub fn new(content: ContentIndex) -> Self {
        Self {
            daytime: 0.5,
            fog: 0.0,
            content,
            voxels: HashMap::new(),
            lights: HashMap::new(),
            ambient: Light::new(0, 0, 0, 15),
        }
    }

    pub fn set_block(&mut self, position: IVec3, id: BlockId) {
        self.voxels.insert(position, Voxel::new(id));
    }

    pub fn set_light(&mut self, position: IVec3, light: Light) {
        self.lights.insert(position, light);
    }

    pub fn voxels(&self) -> impl Iterator<Item = (&IVec3, &Voxel)> {
        self.voxels.iter()
    }
}

impl Level for SparseLevel {
    fn daytime(&self) -> f32 {
        self.daytime
    }

    fn fog(&self) -> f32 {
        self.fog
    }

    fn content(&self) -> &ContentIndex {
        &self.content
    }

    fn voxel_at(&self, position: IVec3) -> Option<Voxel> {
        Some(
            self.voxels
                .get(&position)
                .copied()
                .unwrap_or(Voxel::new(0)),
        )
    }

    fn light_at(&self, position: IVec3) -> Light {
        self.lights.get(&position).copied().unwrap_or(self.ambient)
    }
}
