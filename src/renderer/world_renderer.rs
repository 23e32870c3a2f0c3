use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec3, Vec4};
use log::info;

use super::backend::{CubeFace, ProgramId, RenderBackend, TextureSlot};
use super::batch3d::{Batch3d, LineBatch, BATCH3D_CAPACITY, LINE_BATCH_CAPACITY};
use super::collaborators::WorldCollaborators;
use super::config::RenderConfig;
use super::draw_context::DrawContext;
use super::frustum::Frustum;
use super::shaders::{ShaderPipelineConfig, ShaderRegistry};
use super::shadows::{Cascade, ShadowLifecycle, ShadowPassEngine};
use super::skybox::SkyboxEngine;
use super::uniforms::{BatchUniforms, WorldUniforms};
use crate::assets::Assets;
use crate::camera::Camera;
use crate::content::{Light, BLOCK_AIR, BLOCK_VOID};
use crate::error::RenderError;
use crate::level::{CameraMode, Level, Player};
use crate::models::TEXTURE_NOTFOUND;
use crate::settings::RenderSettings;
use crate::weather::Weather;

/// Sky scattering samples used for cubemap generation.
pub const SKYBOX_QUALITY: u32 = 4;
pub const TORCHLIGHT_MULTIPLIER: f32 = 0.75;
pub const TORCHLIGHT_DISTANCE: f32 = 8.0;
/// How fast the held item catches up with the camera rotation.
const HAND_SWAY_SPEED: f32 = 24.0;
const HAND_OFFSET: Vec3 = Vec3::new(0.06, 0.035, -0.1);
const HAND_SCALE: f32 = 0.1;
const HUD_CAMERA_FAR: f32 = 10.0;
const HUD_CAMERA_FOV: f32 = 0.9;
/// Selection outlines are grown by this much to stay clear of the faces.
const SELECTION_PADDING: f32 = 0.01;
/// Half size of the in-block overlay quad; covers the clip-space square.
const OVERLAY_HALF_EXTENT: f32 = 2.0;

/// Everything a frame reads from the outside world.
pub struct FrameInput<'a> {
    pub camera: &'a mut Camera,
    pub player: &'a Player,
    pub level: &'a dyn Level,
    pub settings: &'a RenderSettings,
    pub hud_visible: bool,
    pub pause: bool,
    /// Real time since the previous frame in seconds.
    pub delta: f32,
}

/// What one call to [`WorldRenderer::draw`] did.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameStats {
    /// Frame counter value the frame was drawn with.
    pub frame: u64,
    pub shaders_recompiled: bool,
    pub shadow_lifecycle: ShadowLifecycle,
    pub cascades: Vec<Cascade>,
    pub skybox_faces: Vec<CubeFace>,
    pub torchlight: Vec3,
}

struct Programs {
    main: ProgramId,
    entity: ProgramId,
    translucent: ProgramId,
    deferred: ProgramId,
    lines: ProgramId,
    shadows: ProgramId,
    ui3d: ProgramId,
}

impl Programs {
    fn require(shaders: &ShaderRegistry) -> Result<Self, RenderError> {
        Ok(Self {
            main: shaders.require("main")?,
            entity: shaders.require("entity")?,
            translucent: shaders.require("translucent")?,
            deferred: shaders.require("deferred_lighting")?,
            lines: shaders.require("lines")?,
            shadows: shaders.require("shadows")?,
            ui3d: shaders.require("ui3d")?,
        })
    }
}

/// Per-frame values shared by every world program.
#[derive(Clone, Copy)]
struct FrameEnv {
    daytime: f32,
    clouds: f32,
    gamma: f32,
    fog_curve: f32,
    fog_factor: f32,
    torchlight: Vec3,
}

/// Color an emissive item casts around the player.
pub fn torchlight_color(emission: [u8; 3]) -> Vec3 {
    Vec3::new(emission[0] as f32, emission[1] as f32, emission[2] as f32) / 15.0
        * TORCHLIGHT_MULTIPLIER
}

/// Sprite tint for a light sample: each channel plus sunlight, capped at 1.
pub fn light_tint(light: Light) -> Vec4 {
    let sun = light.channel(Light::SUN) as f32 / 15.0;
    let channel = |ch: u8| (light.channel(ch) as f32 / 15.0 + sun).min(1.0);
    Vec4::new(
        channel(Light::RED),
        channel(Light::GREEN),
        channel(Light::BLUE),
        1.0,
    )
}

/// Sequences every pass of a world frame.
///
/// The frame counter advances exactly once per [`draw`](WorldRenderer::draw)
/// and is never reset; it alone decides which shadow cascade is redrawn.
pub struct WorldRenderer {
    shadows: ShadowPassEngine,
    skybox: SkyboxEngine,
    frustum: Frustum,
    lines: LineBatch,
    batch3d: Batch3d,
    collaborators: WorldCollaborators,
    weather: Weather,
    config: RenderConfig,
    timer: f32,
    frame: u64,
    /// Held item rotation of the previous frame, lagging behind the camera.
    hand_rotation: Quat,
}

impl WorldRenderer {
    /// Compiles every registered program and creates the sky cubemap.
    pub fn new(
        backend: &mut dyn RenderBackend,
        assets: &mut Assets,
        settings: &RenderSettings,
        collaborators: WorldCollaborators,
    ) -> Result<Self, RenderError> {
        assets.shaders.compile_all(backend)?;
        let skybox_gen = assets.shaders.require("skybox_gen")?;
        let skybox = SkyboxEngine::new(backend, settings.graphics.skybox_resolution, skybox_gen);
        info!("World renderer ready");
        Ok(Self {
            shadows: ShadowPassEngine::new(),
            skybox,
            frustum: Frustum::default(),
            lines: LineBatch::new(LINE_BATCH_CAPACITY),
            batch3d: Batch3d::new(BATCH3D_CAPACITY),
            collaborators,
            weather: Weather::new(),
            config: RenderConfig::default(),
            timer: 0.0,
            frame: 0,
            hand_rotation: Quat::IDENTITY,
        })
    }

    pub fn weather(&self) -> &Weather {
        &self.weather
    }

    pub fn weather_mut(&mut self) -> &mut Weather {
        &mut self.weather
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RenderConfig {
        &mut self.config
    }

    pub fn set_debug(&mut self, flag: bool) {
        self.config.set_debug(flag);
    }

    pub fn toggle_lights_debug(&mut self) {
        self.config.toggle_lights_debug();
    }

    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    pub fn timer(&self) -> f32 {
        self.timer
    }

    /// Orientation the first-person hands are drawn with; trails the camera.
    pub fn hand_rotation(&self) -> Quat {
        self.hand_rotation
    }

    pub fn shadows(&self) -> &ShadowPassEngine {
        &self.shadows
    }

    pub fn skybox(&self) -> &SkyboxEngine {
        &self.skybox
    }

    /// Draws one frame and leaves the composited image on `pctx`'s target.
    pub fn draw(
        &mut self,
        pctx: &mut DrawContext<'_>,
        assets: &mut Assets,
        input: FrameInput<'_>,
    ) -> Result<FrameStats, RenderError> {
        let delta = if input.pause { 0.0 } else { input.delta };
        self.timer += delta;
        self.weather.update(delta);

        input.camera.set_aspect_ratio(pctx.viewport().aspect_ratio());
        let camera: &Camera = input.camera;
        let (level, player, settings) = (input.level, input.player, input.settings);
        let graphics = &settings.graphics;
        let advanced = graphics.advanced_render;

        let programs = Programs::require(&assets.shaders)?;

        let shadow_lifecycle = self
            .shadows
            .configure(pctx.backend(), graphics.effective_shadows_quality());
        let pipeline = ShaderPipelineConfig::from_settings(graphics, self.shadows.is_enabled());
        let shaders_recompiled = assets.shaders.apply_config(pctx.backend(), pipeline)?;
        let assets: &Assets = assets;

        let daytime = level.daytime();
        let clouds = level.fog().max(self.weather.clouds());
        let mie = 1.0 + level.fog().max(clouds * 0.5) * 2.0;
        let skybox_faces = self.skybox.refresh(pctx, daytime, mie, SKYBOX_QUALITY);

        self.collaborators.chunks.update(pctx.backend());

        let item = level.content().require_item(player.chosen_item)?;
        let env = FrameEnv {
            daytime,
            clouds,
            gamma: graphics.gamma,
            fog_curve: graphics.fog_curve,
            fog_factor: settings.chunks.fog_factor(),
            torchlight: torchlight_color(item.emission),
        };

        let cascades = self.refresh_shadows(pctx, camera, &env, programs.shadows);
        let frame = self.frame;
        self.frame += 1;

        {
            let mut wctx = pctx.sub();
            self.collaborators
                .post_processing
                .use_target(&mut wctx, advanced);
            wctx.clear_depth();
            {
                let mut ctx = wctx.sub();
                ctx.set_depth_test(true);
                ctx.set_cull_face(true);
                self.render_level(&mut ctx, assets, &input, camera, &env, &programs, delta)?;
                if input.hud_visible && self.config.debug() {
                    let show_chunk_borders = self.config.show_chunk_borders();
                    self.collaborators.guides.render_debug_lines(
                        &mut ctx,
                        camera,
                        &mut self.lines,
                        programs.lines,
                        show_chunk_borders,
                    );
                }
            }
            self.collaborators
                .texts
                .render(&mut wctx, camera, input.hud_visible, true);
        }

        self.skybox.bind(pctx.backend());
        if advanced {
            let uniforms = self.world_uniforms(camera, &env, env.fog_factor);
            let backend = pctx.backend();
            backend.write_uniforms(programs.deferred, bytemuck::bytes_of(&uniforms));
            self.bind_shadow_maps(backend);
            self.collaborators
                .post_processing
                .render_deferred_shading(pctx, assets, self.timer, camera)?;
        }

        {
            let mut ctx = pctx.sub();
            ctx.set_depth_test(true);
            let target = if advanced {
                self.collaborators
                    .post_processing
                    .bind_depth_buffer(ctx.backend())
            } else {
                self.collaborators.post_processing.framebuffer_target()
            };
            ctx.set_framebuffer(target);
            self.skybox.draw(&mut ctx, camera, assets, daytime, clouds)?;

            {
                let mut sctx = ctx.sub();
                sctx.set_cull_face(true);
                let uniforms = self.world_uniforms(camera, &env, env.fog_factor);
                let backend = sctx.backend();
                self.skybox.bind(backend);
                self.bind_shadow_maps(backend);
                backend.write_uniforms(programs.translucent, bytemuck::bytes_of(&uniforms));
                self.collaborators
                    .chunks
                    .draw_sorted_meshes(&mut sctx, camera, programs.translucent);
            }

            let base = self.world_uniforms(camera, &env, env.fog_factor);
            for preset in self.weather.presets() {
                let (alpha_clip, opacity) = preset.precipitation_opacity();
                let uniforms = WorldUniforms {
                    alpha_clip: alpha_clip as u32,
                    opacity,
                    ..base
                };
                ctx.backend()
                    .write_uniforms(programs.entity, bytemuck::bytes_of(&uniforms));
                if preset.has_precipitation() {
                    self.collaborators.precipitation.render(
                        &mut ctx,
                        camera,
                        programs.entity,
                        delta,
                        preset,
                    );
                }
            }
        }

        self.collaborators
            .post_processing
            .render(pctx, assets, self.timer, camera)?;

        if player.camera_mode == CameraMode::FirstPerson {
            let mut ctx = pctx.sub();
            ctx.set_depth_test(true);
            ctx.set_cull_face(true);
            self.render_hands(
                &mut ctx,
                assets,
                camera,
                player,
                level,
                &env,
                programs.entity,
                delta,
            )?;
        }
        self.render_block_overlay(pctx, assets, camera, level, programs.ui3d)?;

        Ok(FrameStats {
            frame,
            shaders_recompiled,
            shadow_lifecycle,
            cascades,
            skybox_faces,
            torchlight: env.torchlight,
        })
    }

    fn refresh_shadows(
        &mut self,
        pctx: &mut DrawContext<'_>,
        camera: &Camera,
        env: &FrameEnv,
        program: ProgramId,
    ) -> Vec<Cascade> {
        let base = WorldUniforms {
            enable_shadows: 0,
            ..self.world_uniforms(camera, env, 0.0)
        };
        let chunks = &mut self.collaborators.chunks;
        self.shadows
            .refresh(pctx, camera, env.daytime, self.frame, |ctx, shadow_camera| {
                let uniforms = WorldUniforms {
                    proj: shadow_camera.projection().to_cols_array_2d(),
                    view: shadow_camera.view(true).to_cols_array_2d(),
                    camera_pos: shadow_camera.position.to_array(),
                    ..base
                };
                ctx.backend()
                    .write_uniforms(program, bytemuck::bytes_of(&uniforms));
                chunks.draw_shadows_pass(ctx, shadow_camera, program, camera);
            })
    }

    #[allow(clippy::too_many_arguments)]
    fn render_level(
        &mut self,
        ctx: &mut DrawContext<'_>,
        assets: &Assets,
        input: &FrameInput<'_>,
        camera: &Camera,
        env: &FrameEnv,
        programs: &Programs,
        delta: f32,
    ) -> Result<(), RenderError> {
        let collaborators = &mut self.collaborators;
        collaborators.texts.render(ctx, camera, input.hud_visible, false);

        let culling = input.settings.graphics.frustum_culling;
        if culling {
            self.frustum.update(&camera.proj_view(true));
        }
        let frustum = culling.then_some(&self.frustum);

        let uniforms = WorldUniforms {
            alpha_clip: 1,
            opacity: 1.0,
            ..world_uniforms(
                &self.shadows,
                &self.skybox,
                &self.weather,
                &self.config,
                self.timer,
                camera,
                env,
                env.fog_factor,
            )
        };
        let backend = ctx.backend();
        backend.write_uniforms(programs.entity, bytemuck::bytes_of(&uniforms));
        self.skybox.bind(backend);
        bind_shadow_maps(&self.shadows, backend);

        collaborators.entities.render(
            collaborators.model_batch.as_mut(),
            assets,
            frustum,
            delta,
            input.pause,
        );
        collaborators
            .model_batch
            .render(ctx.backend(), assets, programs.entity);
        collaborators
            .particles
            .render(ctx, camera, programs.entity, delta);

        let uniforms = world_uniforms(
            &self.shadows,
            &self.skybox,
            &self.weather,
            &self.config,
            self.timer,
            camera,
            env,
            env.fog_factor,
        );
        ctx.backend()
            .write_uniforms(programs.main, bytemuck::bytes_of(&uniforms));
        collaborators
            .chunks
            .draw_chunks(ctx, camera, programs.main, frustum);
        collaborators
            .block_wraps
            .draw(ctx, input.player, programs.main);

        if input.hud_visible {
            self.render_lines(
                ctx,
                camera,
                input.player,
                input.level,
                programs.lines,
                input.settings,
            )?;
        }
        Ok(())
    }

    fn render_lines(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: &Camera,
        player: &Player,
        level: &dyn Level,
        program: ProgramId,
        settings: &RenderSettings,
    ) -> Result<(), RenderError> {
        ctx.backend().write_uniforms(
            program,
            bytemuck::bytes_of(&BatchUniforms::new(camera.proj_view(true))),
        );
        self.lines.begin(program);

        if let Some(selection) = player.selection.filter(|s| s.voxel.id != BLOCK_VOID) {
            let block = level.content().require_block(selection.voxel.id)?;
            let origin = selection.position.as_vec3();
            self.lines.line_width(2.0);
            for hitbox in block.hitboxes_for(selection.voxel.rotation) {
                self.lines.cube(
                    ctx.backend(),
                    origin + hitbox.center(),
                    hitbox.size() + Vec3::splat(SELECTION_PADDING),
                    Vec4::new(0.0, 0.0, 0.0, 1.0),
                );
            }
            if self.config.debug() {
                self.lines.line(
                    ctx.backend(),
                    selection.hit_position,
                    selection.hit_position + selection.normal * 0.5,
                    Vec4::new(1.0, 0.0, 1.0, 1.0),
                );
            }
            self.lines.flush(ctx.backend());
        }

        if self.config.show_entities_debug() {
            let frustum = settings.graphics.frustum_culling.then_some(&self.frustum);
            let mut dctx = ctx.sub();
            self.collaborators
                .entities
                .render_debug(&mut dctx, &mut self.lines, frustum);
            self.lines.flush(dctx.backend());
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn render_hands(
        &mut self,
        ctx: &mut DrawContext<'_>,
        assets: &Assets,
        camera: &Camera,
        player: &Player,
        level: &dyn Level,
        env: &FrameEnv,
        program: ProgramId,
        delta: f32,
    ) -> Result<(), RenderError> {
        let item = level.content().require_item(player.chosen_item)?;

        let mut hud_camera = camera.clone();
        hud_camera.far = HUD_CAMERA_FAR;
        hud_camera.set_fov(HUD_CAMERA_FOV);
        hud_camera.position = Vec3::ZERO;

        let target = Quat::from_mat4(&camera.rotation);
        let rotation = self
            .hand_rotation
            .slerp(target, (delta * HAND_SWAY_SPEED).min(1.0));
        self.hand_rotation = rotation;

        let offset = -(camera.position - player.position);
        let angle = (player.rotation.x - 90.0).to_radians();
        let (sin, cos) = angle.sin_cos();
        let offset = Vec3::new(
            offset.x * cos - offset.z * sin,
            offset.y,
            offset.x * sin + offset.z * cos,
        );
        let matrix = Mat4::from_quat(rotation)
            * Mat4::from_translation(HAND_OFFSET)
            * Mat4::from_scale(Vec3::splat(HAND_SCALE))
            * Mat4::from_rotation_y(-FRAC_PI_2)
            * Mat4::from_translation(offset);

        let Some(model) = assets.model(&item.model_name) else {
            return Ok(());
        };
        let light = level.light_at(camera.position.floor().as_ivec3());
        self.collaborators
            .model_batch
            .draw(matrix, light_tint(light), model);

        ctx.clear_depth();
        let uniforms = WorldUniforms {
            alpha_clip: 1,
            ..self.world_uniforms(&hud_camera, env, 0.0)
        };
        let backend = ctx.backend();
        backend.write_uniforms(program, bytemuck::bytes_of(&uniforms));
        self.skybox.bind(backend);
        self.collaborators
            .model_batch
            .render(backend, assets, program);
        Ok(())
    }

    /// Tints the screen with the overlay texture of the block the camera is
    /// inside of, e.g. water.
    fn render_block_overlay(
        &mut self,
        pctx: &mut DrawContext<'_>,
        assets: &Assets,
        camera: &Camera,
        level: &dyn Level,
        program: ProgramId,
    ) -> Result<(), RenderError> {
        let position = camera.position.floor().as_ivec3();
        let Some(voxel) = level.voxel_at(position) else {
            return Ok(());
        };
        if voxel.id == BLOCK_AIR || voxel.id == BLOCK_VOID {
            return Ok(());
        }
        let block = level.content().require_block(voxel.id)?;
        if block.overlay_texture.is_empty() {
            return Ok(());
        }
        let fallback = format!("blocks:{TEXTURE_NOTFOUND}");
        let region = assets.texture_region(&block.overlay_texture, &fallback);

        let mut ctx = pctx.sub();
        ctx.set_depth_test(false);
        ctx.set_cull_face(false);
        let backend = ctx.backend();
        backend.write_uniforms(
            program,
            bytemuck::bytes_of(&BatchUniforms::new(Mat4::IDENTITY)),
        );
        self.batch3d.begin(program);
        self.batch3d.texture(backend, region.texture);
        self.batch3d.sprite(
            backend,
            Vec3::ZERO,
            Vec3::Y,
            Vec3::X,
            OVERLAY_HALF_EXTENT,
            OVERLAY_HALF_EXTENT,
            region.region,
            light_tint(level.light_at(position)),
        );
        self.batch3d.flush(backend);
        Ok(())
    }

    fn world_uniforms(&self, camera: &Camera, env: &FrameEnv, fog_factor: f32) -> WorldUniforms {
        world_uniforms(
            &self.shadows,
            &self.skybox,
            &self.weather,
            &self.config,
            self.timer,
            camera,
            env,
            fog_factor,
        )
    }

    fn bind_shadow_maps(&self, backend: &mut dyn RenderBackend) {
        bind_shadow_maps(&self.shadows, backend);
    }
}

fn bind_shadow_maps(shadows: &ShadowPassEngine, backend: &mut dyn RenderBackend) {
    let texture = |cascade| shadows.map(cascade).map(|map| map.texture);
    backend.bind_texture(TextureSlot::Shadows0, texture(Cascade::Near));
    backend.bind_texture(TextureSlot::Shadows1, texture(Cascade::Wide));
}

#[allow(clippy::too_many_arguments)]
fn world_uniforms(
    shadows: &ShadowPassEngine,
    skybox: &SkyboxEngine,
    weather: &Weather,
    config: &RenderConfig,
    timer: f32,
    camera: &Camera,
    env: &FrameEnv,
    fog_factor: f32,
) -> WorldUniforms {
    WorldUniforms {
        model: Mat4::IDENTITY.to_cols_array_2d(),
        proj: camera.projection().to_cols_array_2d(),
        view: camera.view(true).to_cols_array_2d(),
        shadows_matrix: shadows.matrices().map(|m| m.to_cols_array_2d()),
        camera_pos: camera.position.to_array(),
        timer,
        sun_dir: shadows.sun_direction().to_array(),
        day_time: env.daytime,
        torchlight_color: env.torchlight.to_array(),
        torchlight_distance: TORCHLIGHT_DISTANCE,
        light_dir: skybox.light_dir().to_array(),
        gamma: env.gamma,
        fog_factor,
        fog_curve: env.fog_curve,
        weather_fog_opacity: weather.fog_opacity(),
        weather_fog_density: weather.fog_density(),
        weather_fog_curve: weather.fog_curve(),
        shadows_opacity: 1.0 - env.clouds,
        shadows_softness: 1.0 + env.clouds * 4.0,
        shadows_res: shadows.resolution() as f32,
        enable_shadows: shadows.is_enabled() as u32,
        alpha_clip: 0,
        opacity: 1.0,
        debug_lights: config.lights_debug() as u32,
    }
}
