// app.rs
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};
use log::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, MouseButton, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::KeyCode,
    window::{CursorGrabMode, Window, WindowId},
};

use crate::assets::Assets;
use crate::camera::Camera;
use crate::demo::{self, DemoWorld};
use crate::error::{AppError, RenderError};
use crate::input::{Input, WinitInput};
use crate::level::CameraMode;
use crate::models::ModelsGenerator;
use crate::renderer::chunks::{ChunkMesher, LevelChunks};
use crate::renderer::collaborators::{Inactive, WorldCollaborators};
use crate::renderer::config::DebugFlags;
use crate::renderer::shaders::ShaderRegistry;
use crate::renderer::{
    ChunkBorderGuides, DrawContext, FrameInput, MeshModelBatch, ScenePostProcess, WgpuBackend,
    WorldRenderer,
};
use crate::settings::RenderSettings;

const CAMERA_FOV: f32 = 1.4;
const MOVE_SPEED: f32 = 6.0;
const MOUSE_SENSITIVITY: f32 = 0.0025;
const PICK_DISTANCE: f32 = 8.0;
/// Seconds of real time per in-game day.
const DAY_LENGTH: f32 = 300.0;
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
const MAX_FRAME_DELTA: f32 = 0.25;

/// Sets up the demo world, the renderer and everything they share.
pub fn build_collaborators(
    backend: &mut dyn crate::renderer::RenderBackend,
    assets: &mut Assets,
    world: &DemoWorld,
) -> Result<WorldCollaborators, RenderError> {
    ModelsGenerator::register_builtin(assets);
    let atlas = demo::load_atlas(backend, assets);
    ModelsGenerator::prepare(&world.level.content, assets)?;

    let (chunks, sender) = LevelChunks::new(Some(atlas));
    for mesh in ChunkMesher::mesh_level(&world.level, assets.atlas(demo::ATLAS_NAME)) {
        // The receiver lives in `chunks`, which outlives this loop.
        let _ = sender.send(mesh);
    }

    Ok(WorldCollaborators {
        chunks: Box::new(chunks),
        entities: Box::new(Inactive),
        model_batch: Box::new(MeshModelBatch::new()),
        particles: Box::new(Inactive),
        precipitation: Box::new(Inactive),
        texts: Box::new(Inactive),
        block_wraps: Box::new(Inactive),
        guides: Box::new(ChunkBorderGuides),
        post_processing: Box::new(ScenePostProcess::new()),
    })
}

struct AppState {
    window: Arc<Window>,
    backend: WgpuBackend,
    assets: Assets,
    renderer: WorldRenderer,
    world: DemoWorld,
    camera: Camera,
    yaw: f32,
    pitch: f32,
    hud_visible: bool,
    paused: bool,
    last_frame: Instant,
}

impl AppState {
    fn new(window: Arc<Window>, settings: &RenderSettings) -> Result<Self, RenderError> {
        let mut backend = pollster::block_on(WgpuBackend::new(window.clone(), settings))?;
        let mut assets = Assets::new(ShaderRegistry::with_builtin_shaders());
        let world = DemoWorld::generate(632);
        let collaborators = build_collaborators(&mut backend, &mut assets, &world)?;
        let renderer = WorldRenderer::new(&mut backend, &mut assets, settings, collaborators)?;
        let camera = world.spawn_camera(CAMERA_FOV);

        Ok(Self {
            window,
            backend,
            assets,
            renderer,
            world,
            camera,
            // Facing +Z, towards the glass wall.
            yaw: PI,
            pitch: 0.0,
            hud_visible: true,
            paused: false,
            last_frame: Instant::now(),
        })
    }

    fn set_cursor_locked(&self, input: &mut WinitInput, locked: bool) {
        let grab = if locked {
            self.window
                .set_cursor_grab(CursorGrabMode::Confined)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Locked))
        } else {
            self.window.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(err) = grab {
            warn!("Cursor grab failed: {err}");
        }
        self.window.set_cursor_visible(!locked);
        input.set_cursor_locked(locked);
    }

    /// Applies controls; returns false when the user asked to quit.
    fn handle_input(&mut self, input: &mut WinitInput, delta: f32) -> bool {
        if input.jpressed(KeyCode::Escape) {
            if input.cursor().locked {
                self.set_cursor_locked(input, false);
            } else {
                return false;
            }
        }
        if input.jclicked(MouseButton::Left) && !input.cursor().locked {
            self.set_cursor_locked(input, true);
        }

        let config = self.renderer.config_mut();
        if input.jpressed(KeyCode::F3) {
            config.toggle(DebugFlags::DEBUG);
        }
        if input.jpressed(KeyCode::F4) {
            config.toggle(DebugFlags::CHUNK_BORDERS);
        }
        if input.jpressed(KeyCode::F6) {
            self.renderer.toggle_lights_debug();
        }
        if input.jpressed(KeyCode::F1) {
            self.hud_visible = !self.hud_visible;
        }
        if input.jpressed(KeyCode::KeyP) {
            self.paused = !self.paused;
        }
        if input.jpressed(KeyCode::F5) {
            let player = &mut self.world.player;
            player.camera_mode = match player.camera_mode {
                CameraMode::FirstPerson => CameraMode::ThirdPerson,
                CameraMode::ThirdPerson => CameraMode::ThirdPersonFront,
                CameraMode::ThirdPersonFront => CameraMode::Spectator,
                CameraMode::Spectator => CameraMode::FirstPerson,
            };
            info!("Camera mode: {:?}", player.camera_mode);
        }

        let cursor = input.cursor();
        if cursor.locked {
            self.yaw -= cursor.delta.x * MOUSE_SENSITIVITY;
            self.pitch = (self.pitch - cursor.delta.y * MOUSE_SENSITIVITY).clamp(-1.55, 1.55);
        }
        self.camera.set_rotation(
            Mat4::from_rotation_y(self.yaw) * Mat4::from_rotation_x(self.pitch),
        );

        let flat_front =
            Vec3::new(self.camera.front.x, 0.0, self.camera.front.z).normalize_or_zero();
        let mut movement = Vec3::ZERO;
        for (key, direction) in [
            (KeyCode::KeyW, flat_front),
            (KeyCode::KeyS, -flat_front),
            (KeyCode::KeyD, self.camera.right),
            (KeyCode::KeyA, -self.camera.right),
            (KeyCode::Space, Vec3::Y),
            (KeyCode::ShiftLeft, Vec3::NEG_Y),
        ] {
            if input.pressed(key) {
                movement += direction;
            }
        }
        self.camera.position += movement.normalize_or_zero() * MOVE_SPEED * delta;
        true
    }

    fn update_player(&mut self) {
        let player = &mut self.world.player;
        player.position = self.camera.position - DemoWorld::eye(Vec3::ZERO);
        player.rotation = Vec3::new(self.yaw.to_degrees(), self.pitch.to_degrees(), 0.0);
        player.selection = demo::pick(
            &self.world.level,
            self.camera.position,
            self.camera.front,
            PICK_DISTANCE,
        );
    }

    fn redraw(&mut self, settings: &RenderSettings) -> Result<(), RenderError> {
        let now = Instant::now();
        let delta = (now - self.last_frame).as_secs_f32().min(MAX_FRAME_DELTA);
        self.last_frame = now;

        if !self.paused {
            let level = &mut self.world.level;
            level.daytime = (level.daytime + delta / DAY_LENGTH).fract();
        }
        self.update_player();

        if !self.backend.begin_frame()? {
            return Ok(());
        }

        let viewport = self.backend.surface_size();
        let stats = {
            let mut pctx = DrawContext::new(&mut self.backend, viewport);
            pctx.clear(Some(CLEAR_COLOR), true);
            self.renderer.draw(
                &mut pctx,
                &mut self.assets,
                FrameInput {
                    camera: &mut self.camera,
                    player: &self.world.player,
                    level: &self.world.level,
                    settings,
                    hud_visible: self.hud_visible,
                    pause: self.paused,
                    delta,
                },
            )
        };
        self.backend.end_frame();
        let stats = stats?;
        if stats.shaders_recompiled {
            info!("Frame {}: shader variants recompiled", stats.frame);
        }
        Ok(())
    }
}

/// Window shell around [`WorldRenderer`].
pub struct App {
    settings: RenderSettings,
    input: WinitInput,
    state: Option<AppState>,
    error: Option<AppError>,
}

impl App {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            input: WinitInput::new(),
            state: None,
            error: None,
        }
    }

    /// Error that stopped the event loop, if any.
    pub fn take_error(&mut self) -> Option<AppError> {
        self.error.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: AppError) {
        error!("{err}");
        self.error = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let resolution = &self.settings.resolution;
        let attributes = Window::default_attributes()
            .with_title("voxel world renderer")
            .with_inner_size(PhysicalSize::new(resolution.width, resolution.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => return self.fail(event_loop, err.into()),
        };
        match AppState::new(window, &self.settings) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => self.fail(event_loop, err.into()),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if id != state.window.id() {
            return;
        }
        self.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => event_loop.exit(),
            WindowEvent::Resized(size) => state.backend.resize(size.width, size.height),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = state.window.inner_size();
                state.backend.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                self.input.poll_events();
                let delta = (Instant::now() - state.last_frame)
                    .as_secs_f32()
                    .min(MAX_FRAME_DELTA);
                if !state.handle_input(&mut self.input, delta) {
                    event_loop.exit();
                    return;
                }
                if let Err(err) = state.redraw(&self.settings) {
                    return self.fail(event_loop, err.into());
                }
                state.window.request_redraw();
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _: &ActiveEventLoop, _: DeviceId, event: DeviceEvent) {
        self.input.handle_device_event(&event);
    }
}
