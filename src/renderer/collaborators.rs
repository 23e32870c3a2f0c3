//! Interfaces of the renderers the world renderer delegates to.
//!
//! The world renderer decides when each of these runs, against which target
//! and with which program; what they draw is their own business.

use glam::{Mat4, Vec4};

use super::backend::{ProgramId, RenderBackend, RenderTarget};
use super::batch3d::LineBatch;
use super::draw_context::DrawContext;
use super::frustum::Frustum;
use crate::assets::Assets;
use crate::camera::Camera;
use crate::error::RenderError;
use crate::level::Player;
use crate::models::Model;
use crate::weather::WeatherPreset;

pub trait ChunksRenderer {
    /// Uploads meshes that finished building since the last frame.
    fn update(&mut self, backend: &mut dyn RenderBackend);

    fn draw_chunks(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: &Camera,
        program: ProgramId,
        frustum: Option<&Frustum>,
    );

    /// Draws shadow casters around `player_camera` as seen from
    /// `shadow_camera`.
    fn draw_shadows_pass(
        &mut self,
        ctx: &mut DrawContext<'_>,
        shadow_camera: &Camera,
        program: ProgramId,
        player_camera: &Camera,
    );

    /// Translucent geometry, back to front.
    fn draw_sorted_meshes(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: &Camera,
        program: ProgramId,
    );
}

/// Collects model instances and draws them in one go.
pub trait ModelBatch {
    fn draw(&mut self, matrix: Mat4, tint: Vec4, model: &Model);

    fn render(&mut self, backend: &mut dyn RenderBackend, assets: &Assets, program: ProgramId);
}

pub trait EntitiesRenderer {
    fn render(
        &mut self,
        batch: &mut dyn ModelBatch,
        assets: &Assets,
        frustum: Option<&Frustum>,
        delta: f32,
        pause: bool,
    );

    fn render_debug(
        &mut self,
        ctx: &mut DrawContext<'_>,
        lines: &mut LineBatch,
        frustum: Option<&Frustum>,
    );
}

pub trait ParticlesRenderer {
    fn render(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: &Camera,
        program: ProgramId,
        delta: f32,
    );
}

pub trait PrecipitationRenderer {
    fn render(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: &Camera,
        program: ProgramId,
        delta: f32,
        preset: &WeatherPreset,
    );
}

pub trait TextsRenderer {
    fn render(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: &Camera,
        hud_visible: bool,
        front_layer: bool,
    );
}

/// Outlines drawn around blocks being broken or highlighted.
pub trait BlockWrapsRenderer {
    fn draw(&mut self, ctx: &mut DrawContext<'_>, player: &Player, program: ProgramId);
}

pub trait GuidesRenderer {
    fn render_debug_lines(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: &Camera,
        lines: &mut LineBatch,
        program: ProgramId,
        show_chunk_borders: bool,
    );
}

/// Owner of the intermediate framebuffers and the final composite.
pub trait PostProcessing {
    /// Points `ctx` at the framebuffer the world pass renders into.
    fn use_target(&mut self, ctx: &mut DrawContext<'_>, deferred: bool);

    /// Resolves the G-buffer into the scene framebuffer with the
    /// `deferred_lighting` program, whose uniforms are already written.
    fn render_deferred_shading(
        &mut self,
        ctx: &mut DrawContext<'_>,
        assets: &Assets,
        timer: f32,
        camera: &Camera,
    ) -> Result<(), RenderError>;

    /// Makes the G-buffer depth available to the scene framebuffer and
    /// returns that framebuffer.
    fn bind_depth_buffer(&mut self, backend: &mut dyn RenderBackend) -> RenderTarget;

    fn framebuffer_target(&self) -> RenderTarget;

    /// Composites the scene framebuffer onto the context's target.
    fn render(
        &mut self,
        ctx: &mut DrawContext<'_>,
        assets: &Assets,
        timer: f32,
        camera: &Camera,
    ) -> Result<(), RenderError>;
}

/// Renderer that draws nothing, for collaborators a host does not have.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inactive;

impl EntitiesRenderer for Inactive {
    fn render(
        &mut self,
        _: &mut dyn ModelBatch,
        _: &Assets,
        _: Option<&Frustum>,
        _: f32,
        _: bool,
    ) {
    }

    fn render_debug(&mut self, _: &mut DrawContext<'_>, _: &mut LineBatch, _: Option<&Frustum>) {}
}

impl ParticlesRenderer for Inactive {
    fn render(&mut self, _: &mut DrawContext<'_>, _: &Camera, _: ProgramId, _: f32) {}
}

impl PrecipitationRenderer for Inactive {
    fn render(
        &mut self,
        _: &mut DrawContext<'_>,
        _: &Camera,
        _: ProgramId,
        _: f32,
        _: &WeatherPreset,
    ) {
    }
}

impl TextsRenderer for Inactive {
    fn render(&mut self, _: &mut DrawContext<'_>, _: &Camera, _: bool, _: bool) {}
}

impl BlockWrapsRenderer for Inactive {
    fn draw(&mut self, _: &mut DrawContext<'_>, _: &Player, _: ProgramId) {}
}

/// Everything the world renderer draws through but does not own the logic
/// of.
pub struct WorldCollaborators {
    pub chunks: Box<dyn ChunksRenderer>,
    pub entities: Box<dyn EntitiesRenderer>,
    pub model_batch: Box<dyn ModelBatch>,
    pub particles: Box<dyn ParticlesRenderer>,
    pub precipitation: Box<dyn PrecipitationRenderer>,
    pub texts: Box<dyn TextsRenderer>,
    pub block_wraps: Box<dyn BlockWrapsRenderer>,
    pub guides: Box<dyn GuidesRenderer>,
    pub post_processing: Box<dyn PostProcessing>,
}
