use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Mat4, Vec3, Vec4};
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::backend::{
    CubeFace, Primitive, ProgramId, RenderBackend, RenderTarget, TextureId, TextureSlot,
    VertexLayout,
};
use super::batch3d::{Batch3d, UvRegion, BATCH3D_CAPACITY};
use super::draw_context::DrawContext;
use super::state::{BlendMode, Viewport};
use super::uniforms::{BackgroundUniforms, BatchUniforms, SkyGenUniforms};
use super::vertex::ScreenVertex;
use crate::assets::Assets;
use crate::camera::Camera;
use crate::error::RenderError;

pub const STARS_COUNT: usize = 3000;
pub const STARS_SEED: u64 = 632;
/// Combined change of turbidity and daytime that forces all six faces to be
/// regenerated at once.
pub const FULL_REFRESH_THRESHOLD: f32 = 0.01;
const SUN_ALTITUDE: f32 = PI * 0.25;
const DEPTH_SCALE: f32 = 1e3;

/// Billboard orbiting the sky with the time of day.
#[derive(Clone, Debug)]
pub struct SkySprite {
    pub texture: String,
    /// Angle added to the daytime angle.
    pub phase: f32,
    pub distance: f32,
    /// Emissive sprites keep full brightness at night.
    pub emissive: bool,
    pub altitude: f32,
}

impl SkySprite {
    fn new(texture: &str, phase: f32, distance: f32, emissive: bool) -> Self {
        Self {
            texture: texture.to_string(),
            phase,
            distance,
            emissive,
            altitude: SUN_ALTITUDE,
        }
    }

    /// Moon, moon flare and sun.
    pub fn defaults() -> Vec<SkySprite> {
        vec![
            SkySprite::new("misc/moon", PI * 0.5, 4.0, false),
            SkySprite::new("misc/moon_flare", PI * 0.5, 0.5, false),
            SkySprite::new("misc/sun", PI * 1.5, 4.0, true),
        ]
    }
}

/// Rotation of the celestial sphere for a daytime angle.
fn sky_rotation(angle: f32, altitude: f32) -> Mat4 {
    Mat4::from_axis_angle(Vec3::NEG_Z, -angle + FRAC_PI_2) * Mat4::from_rotation_x(altitude)
}

/// Procedurally generated sky cubemap plus sun, moon and stars.
///
/// Each [`refresh`](SkyboxEngine::refresh) regenerates one face chosen
/// round-robin from its own frame counter, or all six faces when the sky
/// changed noticeably since the previous call.
pub struct SkyboxEngine {
    size: u32,
    cubemap: TextureId,
    program: ProgramId,
    frame: u64,
    previous: Option<(f32, f32)>,
    mie: f32,
    light_dir: Vec3,
    sprites: Vec<SkySprite>,
    batch: Batch3d,
    faces_refreshed: u64,
}

impl SkyboxEngine {
    pub fn new(backend: &mut dyn RenderBackend, size: u32, program: ProgramId) -> Self {
        let cubemap = backend.create_cubemap(size);
        info!("Skybox cubemap created at {}x{} per face", size, size);
        Self {
            size,
            cubemap,
            program,
            frame: 0,
            previous: None,
            mie: 1.0,
            light_dir: Vec3::NEG_Z,
            sprites: SkySprite::defaults(),
            batch: Batch3d::new(BATCH3D_CAPACITY),
            faces_refreshed: 0,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn cubemap(&self) -> TextureId {
        self.cubemap
    }

    /// Direction light comes from, as of the last refresh.
    pub fn light_dir(&self) -> Vec3 {
        self.light_dir
    }

    pub fn faces_refreshed(&self) -> u64 {
        self.faces_refreshed
    }

    pub fn sprites_mut(&mut self) -> &mut Vec<SkySprite> {
        &mut self.sprites
    }

    pub fn face_for_frame(frame: u64) -> CubeFace {
        CubeFace::from_index((frame % 6) as usize)
    }

    pub fn bind(&self, backend: &mut dyn RenderBackend) {
        backend.bind_texture(TextureSlot::Skybox, Some(self.cubemap));
    }

    pub fn release(&mut self, backend: &mut dyn RenderBackend) {
        backend.release_texture(self.cubemap);
    }

    /// Regenerates one or all cubemap faces. Returns the faces drawn.
    pub fn refresh(
        &mut self,
        pctx: &mut DrawContext<'_>,
        daytime: f32,
        mie: f32,
        quality: u32,
    ) -> Vec<CubeFace> {
        self.frame += 1;

        let sun_angle = ((daytime - 0.25) * 360.0).to_radians();
        let x = -(sun_angle + FRAC_PI_2).cos() * SUN_ALTITUDE;
        let y = sun_angle - FRAC_PI_2;
        let rotation = Mat4::from_rotation_y(y) * Mat4::from_rotation_x(x);
        self.light_dir = rotation.transform_vector3(Vec3::NEG_Z);
        self.mie = mie;

        let faces = match self.previous {
            Some((prev_mie, prev_daytime))
                if (mie - prev_mie).abs() + (daytime - prev_daytime).abs()
                    < FULL_REFRESH_THRESHOLD =>
            {
                vec![Self::face_for_frame(self.frame)]
            }
            _ => CubeFace::ALL.to_vec(),
        };
        self.previous = Some((mie, daytime));

        let mut ctx = pctx.sub();
        ctx.set_depth_mask(false);
        ctx.set_depth_test(false);
        ctx.set_viewport(Viewport::new(self.size, self.size));
        for &face in &faces {
            let [x_axis, y_axis, z_axis] = face.basis();
            let uniforms = SkyGenUniforms {
                x_axis: x_axis.to_array(),
                quality: quality as f32,
                y_axis: y_axis.to_array(),
                mie,
                z_axis: z_axis.to_array(),
                fog: mie - 1.0,
                light_dir: self.light_dir.to_array(),
                day_time: daytime,
            };
            ctx.set_framebuffer(RenderTarget::CubemapFace(self.cubemap, face));
            let backend = ctx.backend();
            backend.write_uniforms(self.program, bytemuck::bytes_of(&uniforms));
            backend.draw_vertices(
                self.program,
                Primitive::Triangles,
                VertexLayout::Screen,
                bytemuck::cast_slice(&ScreenVertex::QUAD),
            );
        }
        self.faces_refreshed += faces.len() as u64;
        faces
    }

    /// Camera-facing sky plane evaluated from the sky model directly.
    pub fn draw_background(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: &Camera,
        program: ProgramId,
    ) {
        let viewport = ctx.viewport();
        let uniforms = BackgroundUniforms {
            view: camera.view(false).to_cols_array_2d(),
            light_dir: self.light_dir.to_array(),
            zoom: camera.zoom * camera.fov() / FRAC_PI_2,
            mie: self.mie,
            fog: self.mie - 1.0,
            aspect: viewport.aspect_ratio(),
            day_time: self.previous.map_or(0.0, |(_, daytime)| daytime),
        };
        let mut bctx = ctx.sub();
        bctx.set_depth_mask(false);
        let backend = bctx.backend();
        backend.write_uniforms(program, bytemuck::bytes_of(&uniforms));
        backend.draw_vertices(
            program,
            Primitive::Triangles,
            VertexLayout::Screen,
            bytemuck::cast_slice(&ScreenVertex::QUAD),
        );
    }

    /// Background, celestial sprites and stars.
    pub fn draw(
        &mut self,
        pctx: &mut DrawContext<'_>,
        camera: &Camera,
        assets: &Assets,
        daytime: f32,
        fog: f32,
    ) -> Result<(), RenderError> {
        let background = assets.shaders.require("background")?;
        let ui3d = assets.shaders.require("ui3d")?;

        self.draw_background(pctx, camera, background);

        let mut ctx = pctx.sub();
        ctx.set_blend_mode(BlendMode::Addition);
        ctx.set_depth_mask(false);
        let backend = ctx.backend();
        backend.write_uniforms(
            ui3d,
            bytemuck::bytes_of(&BatchUniforms::new(camera.proj_view(false))),
        );
        self.batch.begin(ui3d);

        let angle = daytime * TAU;
        let opacity = (1.0 - fog).powi(7);
        for sprite in &self.sprites {
            self.batch.texture(backend, assets.texture(&sprite.texture));

            let rotation = sky_rotation(daytime * TAU + sprite.phase, sprite.altitude).transpose();
            let pos =
                rotation.transform_vector3(Vec3::new(0.0, sprite.distance * DEPTH_SCALE, 0.0));
            let up = rotation.transform_vector3(Vec3::new(DEPTH_SCALE, 0.0, 0.0));
            let right = rotation.transform_vector3(Vec3::new(0.0, 0.0, DEPTH_SCALE));
            let mut tint = Vec4::new(1.0, 1.0, 1.0, opacity);
            if !sprite.emissive {
                tint *= 0.6 + angle.cos() * 0.4;
            }
            self.batch
                .sprite(backend, pos, up, right, 1.0, 1.0, UvRegion::default(), tint);
        }
        self.batch.flush(backend);
        self.draw_stars(backend, angle, opacity);
        Ok(())
    }

    /// Star positions come from a fixed seed so they never move between
    /// frames; only their opacity follows the time of day.
    fn draw_stars(&mut self, backend: &mut dyn RenderBackend, angle: f32, opacity: f32) {
        let night = angle.cos();
        if night <= 0.0 {
            return;
        }
        let fade = (0.2 + night.sqrt() * 0.5) - 0.05;
        self.batch.texture(backend, None);

        let rotation = sky_rotation(angle, SUN_ALTITUDE).transpose();
        let mut random = SmallRng::seed_from_u64(STARS_SEED);
        for _ in 0..STARS_COUNT {
            let direction = Vec3::new(
                random.gen::<f32>() - 0.5,
                random.gen::<f32>() - 0.5,
                random.gen::<f32>() - 0.5,
            );
            let brightness: f32 = random.gen();
            let pos = rotation.transform_vector3(direction);
            if pos.y < 0.0 {
                continue;
            }
            let tint = Vec4::new(1.0, 1.0, 1.0, brightness * fade * opacity);
            self.batch.point(backend, pos * DEPTH_SCALE, tint);
        }
        self.batch.flush_points(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::{RecordingBackend, TextureKind};

    fn faces_drawn(backend: &RecordingBackend) -> usize {
        backend
            .draws()
            .filter(|(_, state, _)| matches!(state.target, RenderTarget::CubemapFace(..)))
            .count()
    }

    #[test]
    fn first_refresh_draws_every_face() {
        let mut backend = RecordingBackend::new();
        let mut skybox = SkyboxEngine::new(&mut backend, 64, ProgramId(0));
        assert_eq!(
            backend.texture_kind(skybox.cubemap()),
            Some(TextureKind::Cubemap { size: 64 })
        );
        let mut ctx = DrawContext::new(&mut backend, Viewport::new(320, 240));
        let faces = skybox.refresh(&mut ctx, 0.5, 1.0, 4);
        assert_eq!(faces.len(), 6);
        drop(ctx);
        assert_eq!(faces_drawn(&backend), 6);
        assert_eq!(backend.current_state().target, RenderTarget::Screen);
        assert!(backend.current_state().depth_mask);
    }

    #[test]
    fn small_changes_refresh_one_face_round_robin() {
        let mut backend = RecordingBackend::new();
        let mut skybox = SkyboxEngine::new(&mut backend, 16, ProgramId(0));
        let mut ctx = DrawContext::new(&mut backend, Viewport::new(320, 240));
        skybox.refresh(&mut ctx, 0.25, 1.0, 4);

        let mut seen = Vec::new();
        for i in 0..6 {
            let faces = skybox.refresh(&mut ctx, 0.25 + i as f32 * 0.001, 1.0, 4);
            assert_eq!(faces.len(), 1);
            seen.push(faces[0]);
        }
        seen.sort_by_key(|face| face.index());
        seen.dedup();
        assert_eq!(seen.len(), 6);

        let faces = skybox.refresh(&mut ctx, 0.3, 1.0, 4);
        assert_eq!(faces.len(), 6);
    }

    #[test]
    fn stars_are_deterministic_and_hidden_at_noon() {
        let mut backend = RecordingBackend::new();
        let mut skybox = SkyboxEngine::new(&mut backend, 16, ProgramId(0));
        let mut assets = Assets::new(crate::renderer::shaders::ShaderRegistry::new());
        assets.shaders.register("background", "");
        assets.shaders.register("ui3d", "");
        let camera = Camera::default();

        let mut point_draws = Vec::new();
        for daytime in [0.0, 0.0, 0.5] {
            backend.take_commands();
            {
                let mut ctx = DrawContext::new(&mut backend, Viewport::new(100, 100));
                skybox.draw(&mut ctx, &camera, &assets, daytime, 0.0).unwrap();
            }
            let points: Vec<Vec<u8>> = backend
                .commands()
                .iter()
                .filter_map(|c| match c {
                    crate::renderer::recording::Command::Draw {
                        primitive: Primitive::Points,
                        vertices,
                        ..
                    } => Some(vertices.clone()),
                    _ => None,
                })
                .collect();
            point_draws.push(points);
        }
        assert!(!point_draws[0].is_empty());
        assert_eq!(point_draws[0], point_draws[1]);
        assert!(point_draws[2].is_empty());
    }

    #[test]
    fn light_dir_follows_daytime() {
        let mut backend = RecordingBackend::new();
        let mut skybox = SkyboxEngine::new(&mut backend, 16, ProgramId(0));
        let mut ctx = DrawContext::new(&mut backend, Viewport::new(320, 240));
        skybox.refresh(&mut ctx, 0.5, 1.0, 4);
        let noon = skybox.light_dir();
        skybox.refresh(&mut ctx, 0.0, 1.0, 4);
        let midnight = skybox.light_dir();
        assert!((noon.length() - 1.0).abs() < 1e-5);
        assert!(noon.y * midnight.y < 0.0);
    }
}
