// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Uniform block shared by the world programs: `main`, `entity`,
/// `translucent`, `shadows` and `deferred_lighting`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct WorldUniforms {
    pub model: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub shadows_matrix: [[[f32; 4]; 4]; 2],
    pub camera_pos: [f32; 3],
    pub timer: f32,
    pub sun_dir: [f32; 3],
    pub day_time: f32,
    pub torchlight_color: [f32; 3],
    pub torchlight_distance: f32,
    pub light_dir: [f32; 3],
    pub gamma: f32,
    pub fog_factor: f32,
    pub fog_curve: f32,
    pub weather_fog_opacity: f32,
    pub weather_fog_density: f32,
    pub weather_fog_curve: f32,
    pub shadows_opacity: f32,
    pub shadows_softness: f32,
    pub shadows_res: f32,
    pub enable_shadows: u32,
    pub alpha_clip: u32,
    pub opacity: f32,
    pub debug_lights: u32,
}

impl WorldUniforms {
    pub fn new() -> Self {
        Self {
            model: Mat4::IDENTITY.to_cols_array_2d(),
            proj: Mat4::IDENTITY.to_cols_array_2d(),
            view: Mat4::IDENTITY.to_cols_array_2d(),
            shadows_matrix: [Mat4::IDENTITY.to_cols_array_2d(); 2],
            gamma: 1.0,
            fog_curve: 1.0,
            weather_fog_density: 1.0,
            weather_fog_curve: 1.0,
            shadows_opacity: 1.0,
            shadows_softness: 1.0,
            opacity: 1.0,
            ..Self::zeroed()
        }
    }

    pub fn torchlight(&self) -> Vec3 {
        Vec3::from_array(self.torchlight_color)
    }
}

impl Default for WorldUniforms {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-face parameters of the `skybox_gen` program.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct SkyGenUniforms {
    pub x_axis: [f32; 3],
    pub quality: f32,
    pub y_axis: [f32; 3],
    pub mie: f32,
    pub z_axis: [f32; 3],
    pub fog: f32,
    pub light_dir: [f32; 3],
    pub day_time: f32,
}

/// Camera-facing sky plane drawn behind everything by `background`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct BackgroundUniforms {
    pub view: [[f32; 4]; 4],
    pub light_dir: [f32; 3],
    pub zoom: f32,
    pub mie: f32,
    pub fog: f32,
    pub aspect: f32,
    pub day_time: f32,
}

/// `lines` and `ui3d` programs.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct BatchUniforms {
    pub proj_view: [[f32; 4]; 4],
    pub apply: [[f32; 4]; 4],
}

impl BatchUniforms {
    pub fn new(proj_view: Mat4) -> Self {
        Self {
            proj_view: proj_view.to_cols_array_2d(),
            apply: Mat4::IDENTITY.to_cols_array_2d(),
        }
    }
}

/// Final composite to the screen.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ScreenUniforms {
    pub gamma: f32,
    pub timer: f32,
    pub _padding: [f32; 2],
}
