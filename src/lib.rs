pub mod app;
pub mod assets;
pub mod camera;
pub mod content;
pub mod demo;
pub mod error;
pub mod input;
pub mod level;
pub mod models;
pub mod renderer;
pub mod settings;
pub mod weather;

use app::App;
use assets::Assets;
use demo::DemoWorld;
use error::AppError;
use renderer::shaders::ShaderRegistry;
use renderer::state::Viewport;
use renderer::{DrawContext, FrameInput, FrameStats, RecordingBackend, WorldRenderer};
use settings::RenderSettings;
use winit::event_loop::EventLoop;

/// Simulated frame time for headless runs.
const HEADLESS_DELTA: f32 = 1.0 / 60.0;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

pub fn run() -> Result<(), AppError> {
    init_logging();

    log::info!("Starting voxel world renderer");

    let event_loop = EventLoop::new()?;
    let mut app = App::new(RenderSettings::load());

    let result = event_loop.run_app(&mut app);

    if let Err(ref err) = result {
        log::error!("Application error: {}", err);
    }
    if let Some(err) = app.take_error() {
        return Err(err);
    }

    log::info!("Application shutdown complete");

    result.map_err(AppError::from)
}

/// Renders `frames` frames of the demo world into a [`RecordingBackend`]
/// and returns per-frame statistics.
pub fn run_headless(frames: u32) -> Result<Vec<FrameStats>, AppError> {
    init_logging();

    let settings = RenderSettings::load();
    let viewport = Viewport::new(settings.resolution.width, settings.resolution.height);
    let mut backend = RecordingBackend::new();
    let mut assets = Assets::new(ShaderRegistry::with_builtin_shaders());
    let mut world = DemoWorld::generate(632);
    let collaborators = app::build_collaborators(&mut backend, &mut assets, &world)?;
    let mut renderer = WorldRenderer::new(&mut backend, &mut assets, &settings, collaborators)?;
    let mut camera = world.spawn_camera(1.4);

    log::info!(
        "Rendering {frames} headless frames at {}x{}",
        viewport.width,
        viewport.height
    );

    let mut stats = Vec::with_capacity(frames as usize);
    for _ in 0..frames {
        world.level.daytime = (world.level.daytime + HEADLESS_DELTA / 30.0).fract();
        let mut pctx = DrawContext::new(&mut backend, viewport);
        pctx.clear(Some([0.0, 0.0, 0.0, 1.0]), true);
        let frame = renderer.draw(
            &mut pctx,
            &mut assets,
            FrameInput {
                camera: &mut camera,
                player: &world.player,
                level: &world.level,
                settings: &settings,
                hud_visible: true,
                pause: false,
                delta: HEADLESS_DELTA,
            },
        )?;
        log::debug!(
            "Frame {}: {:?}, {} cascades, {} skybox faces",
            frame.frame,
            frame.shadow_lifecycle,
            frame.cascades.len(),
            frame.skybox_faces.len()
        );
        drop(pctx);
        backend.take_commands();
        stats.push(frame);
    }
    log::info!("Headless run complete");
    Ok(stats)
}
