#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use world_renderer::app::build_collaborators;
use world_renderer::assets::Assets;
use world_renderer::camera::Camera;
use world_renderer::demo::DemoWorld;
use world_renderer::error::RenderError;
use world_renderer::level::Player;
use world_renderer::renderer::backend::{
    Primitive, ProgramId, RenderBackend, RenderTarget, VertexLayout,
};
use world_renderer::renderer::batch3d::LineBatch;
use world_renderer::renderer::collaborators::{
    BlockWrapsRenderer, ChunksRenderer, EntitiesRenderer, GuidesRenderer, ModelBatch,
    ParticlesRenderer, PostProcessing, PrecipitationRenderer, TextsRenderer, WorldCollaborators,
};
use world_renderer::renderer::frustum::Frustum;
use world_renderer::renderer::recording::Command;
use world_renderer::renderer::shaders::ShaderRegistry;
use world_renderer::renderer::state::Viewport;
use world_renderer::renderer::{
    DrawContext, FrameInput, FrameStats, MeshModelBatch, RecordingBackend, ScenePostProcess,
    WorldRenderer,
};
use world_renderer::settings::RenderSettings;
use world_renderer::weather::WeatherPreset;

pub const VIEWPORT: Viewport = Viewport {
    width: 320,
    height: 180,
};
pub const DELTA: f32 = 1.0 / 60.0;

/// Names of the collaborator calls in the order the renderer made them.
pub type PassLog = Rc<RefCell<Vec<&'static str>>>;

pub struct Harness {
    pub backend: RecordingBackend,
    pub assets: Assets,
    pub world: DemoWorld,
    pub renderer: WorldRenderer,
    pub camera: Camera,
    pub settings: RenderSettings,
    /// Commands of the last frame.
    pub commands: Vec<Command>,
}

impl Harness {
    /// Demo world drawn by the collaborators the application uses.
    pub fn demo(settings: RenderSettings) -> Self {
        Self::build(settings, |backend, assets, world| {
            build_collaborators(backend, assets, world).unwrap()
        })
    }

    /// Demo world drawn by collaborators that only record being called.
    pub fn logged(settings: RenderSettings) -> (Self, PassLog) {
        let log = PassLog::default();
        let collaborators = logging_collaborators(&log);
        let harness = Self::build(settings, move |_, _, _| collaborators);
        (harness, log)
    }

    fn build(
        settings: RenderSettings,
        collaborators: impl FnOnce(
            &mut RecordingBackend,
            &mut Assets,
            &DemoWorld,
        ) -> WorldCollaborators,
    ) -> Self {
        let mut backend = RecordingBackend::new();
        let mut assets = Assets::new(ShaderRegistry::with_builtin_shaders());
        let world = DemoWorld::generate(632);
        let collaborators = collaborators(&mut backend, &mut assets, &world);
        let renderer =
            WorldRenderer::new(&mut backend, &mut assets, &settings, collaborators).unwrap();
        let camera = world.spawn_camera(1.4);
        backend.take_commands();
        Self {
            backend,
            assets,
            world,
            renderer,
            camera,
            settings,
            commands: Vec::new(),
        }
    }

    pub fn try_frame(&mut self) -> Result<FrameStats, RenderError> {
        let stats = {
            let mut pctx = DrawContext::new(&mut self.backend, VIEWPORT);
            pctx.clear(Some([0.0, 0.0, 0.0, 1.0]), true);
            self.renderer.draw(
                &mut pctx,
                &mut self.assets,
                FrameInput {
                    camera: &mut self.camera,
                    player: &self.world.player,
                    level: &self.world.level,
                    settings: &self.settings,
                    hud_visible: true,
                    pause: false,
                    delta: DELTA,
                },
            )
        };
        self.commands = self.backend.take_commands();
        stats
    }

    pub fn frame(&mut self) -> FrameStats {
        self.try_frame().unwrap()
    }

    pub fn count(&self, matches: impl Fn(&Command) -> bool) -> usize {
        self.commands
            .iter()
            .filter(|command| matches(command))
            .count()
    }
}

struct Logger(PassLog);

impl Logger {
    fn push(&self, name: &'static str) {
        self.0.borrow_mut().push(name);
    }
}

impl ChunksRenderer for Logger {
    fn update(&mut self, _: &mut dyn RenderBackend) {
        self.push("chunks.update");
    }

    fn draw_chunks(
        &mut self,
        _: &mut DrawContext<'_>,
        _: &Camera,
        _: ProgramId,
        _: Option<&Frustum>,
    ) {
        self.push("chunks.opaque");
    }

    fn draw_shadows_pass(&mut self, _: &mut DrawContext<'_>, _: &Camera, _: ProgramId, _: &Camera) {
        self.push("chunks.shadows");
    }

    fn draw_sorted_meshes(&mut self, _: &mut DrawContext<'_>, _: &Camera, _: ProgramId) {
        self.push("chunks.translucent");
    }
}

impl EntitiesRenderer for Logger {
    fn render(&mut self, _: &mut dyn ModelBatch, _: &Assets, _: Option<&Frustum>, _: f32, _: bool) {
        self.push("entities");
    }

    fn render_debug(&mut self, _: &mut DrawContext<'_>, _: &mut LineBatch, _: Option<&Frustum>) {
        self.push("entities.debug");
    }
}

impl ParticlesRenderer for Logger {
    fn render(&mut self, _: &mut DrawContext<'_>, _: &Camera, _: ProgramId, _: f32) {
        self.push("particles");
    }
}

impl PrecipitationRenderer for Logger {
    fn render(
        &mut self,
        ctx: &mut DrawContext<'_>,
        _: &Camera,
        program: ProgramId,
        _: f32,
        _: &WeatherPreset,
    ) {
        self.push("precipitation");
        // Empty draw marking where precipitation lands in the command stream.
        ctx.backend()
            .draw_vertices(program, Primitive::Points, VertexLayout::Batch, &[]);
    }
}

impl TextsRenderer for Logger {
    fn render(&mut self, _: &mut DrawContext<'_>, _: &Camera, _: bool, front_layer: bool) {
        self.push(if front_layer { "texts.front" } else { "texts" });
    }
}

impl BlockWrapsRenderer for Logger {
    fn draw(&mut self, _: &mut DrawContext<'_>, _: &Player, _: ProgramId) {
        self.push("block_wraps");
    }
}

impl GuidesRenderer for Logger {
    fn render_debug_lines(
        &mut self,
        _: &mut DrawContext<'_>,
        _: &Camera,
        _: &mut LineBatch,
        _: ProgramId,
        _: bool,
    ) {
        self.push("guides");
    }
}

/// Real scene targets, with every call logged.
struct LoggedPostProcess {
    inner: ScenePostProcess,
    log: Logger,
}

impl PostProcessing for LoggedPostProcess {
    fn use_target(&mut self, ctx: &mut DrawContext<'_>, deferred: bool) {
        self.log.push("post.use_target");
        self.inner.use_target(ctx, deferred);
    }

    fn render_deferred_shading(
        &mut self,
        ctx: &mut DrawContext<'_>,
        assets: &Assets,
        timer: f32,
        camera: &Camera,
    ) -> Result<(), RenderError> {
        self.log.push("post.deferred");
        self.inner.render_deferred_shading(ctx, assets, timer, camera)
    }

    fn bind_depth_buffer(&mut self, backend: &mut dyn RenderBackend) -> RenderTarget {
        self.log.push("post.bind_depth");
        self.inner.bind_depth_buffer(backend)
    }

    fn framebuffer_target(&self) -> RenderTarget {
        self.inner.framebuffer_target()
    }

    fn render(
        &mut self,
        ctx: &mut DrawContext<'_>,
        assets: &Assets,
        timer: f32,
        camera: &Camera,
    ) -> Result<(), RenderError> {
        self.log.push("post.composite");
        self.inner.render(ctx, assets, timer, camera)
    }
}

pub fn logging_collaborators(log: &PassLog) -> WorldCollaborators {
    let logger = || Box::new(Logger(log.clone()));
    WorldCollaborators {
        chunks: logger(),
        entities: logger(),
        model_batch: Box::new(MeshModelBatch::new()),
        particles: logger(),
        precipitation: logger(),
        texts: logger(),
        block_wraps: logger(),
        guides: logger(),
        post_processing: Box::new(LoggedPostProcess {
            inner: ScenePostProcess::new(),
            log: Logger(log.clone()),
        }),
    }
}
