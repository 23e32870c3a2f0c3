//! Intermediate framebuffers and the final composite.

use log::debug;

use super::backend::{
    Primitive, ProgramId, RenderBackend, RenderTarget, TextureId, TextureSlot, VertexLayout,
};
use super::collaborators::PostProcessing;
use super::draw_context::DrawContext;
use super::state::Viewport;
use super::uniforms::ScreenUniforms;
use super::vertex::ScreenVertex;
use crate::assets::Assets;
use crate::camera::Camera;
use crate::error::RenderError;

struct SceneTargets {
    size: Viewport,
    /// Lit scene, sampled by the composite.
    scene: TextureId,
    /// Albedo and depth written by the world pass when rendering deferred.
    gbuffer: TextureId,
}

/// Renders the world into an offscreen framebuffer and composites it onto
/// the screen with the `screen` program.
///
/// Targets follow the viewport of the context handed to
/// [`use_target`](PostProcessing::use_target) and are recreated when it
/// changes size.
pub struct ScenePostProcess {
    targets: Option<SceneTargets>,
    gamma: f32,
    clear_color: [f32; 4],
}

impl Default for ScenePostProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenePostProcess {
    pub fn new() -> Self {
        Self {
            targets: None,
            gamma: 1.0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Output gamma applied by the composite, on top of the world lighting.
    pub fn set_gamma(&mut self, gamma: f32) {
        self.gamma = gamma;
    }

    pub fn size(&self) -> Option<Viewport> {
        self.targets.as_ref().map(|targets| targets.size)
    }

    pub fn scene_texture(&self) -> Option<TextureId> {
        self.targets.as_ref().map(|targets| targets.scene)
    }

    pub fn gbuffer_texture(&self) -> Option<TextureId> {
        self.targets.as_ref().map(|targets| targets.gbuffer)
    }

    /// Ignores zero-sized viewports, which happen while a window is
    /// minimized.
    fn resize(&mut self, backend: &mut dyn RenderBackend, size: Viewport) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        if self.size() == Some(size) {
            return;
        }
        self.release(backend);
        debug!("Resizing scene targets to {}x{}", size.width, size.height);
        self.targets = Some(SceneTargets {
            size,
            scene: backend.create_framebuffer(size.width, size.height),
            gbuffer: backend.create_framebuffer(size.width, size.height),
        });
    }

    pub fn release(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(targets) = self.targets.take() {
            backend.release_texture(targets.scene);
            backend.release_texture(targets.gbuffer);
        }
    }

    fn draw_quad(backend: &mut dyn RenderBackend, program: ProgramId) {
        backend.draw_vertices(
            program,
            Primitive::Triangles,
            VertexLayout::Screen,
            bytemuck::cast_slice(&ScreenVertex::QUAD),
        );
    }
}

impl PostProcessing for ScenePostProcess {
    fn use_target(&mut self, ctx: &mut DrawContext<'_>, deferred: bool) {
        let viewport = ctx.viewport();
        self.resize(ctx.backend(), viewport);
        let Some(targets) = &self.targets else {
            return;
        };
        let texture = if deferred {
            targets.gbuffer
        } else {
            targets.scene
        };
        ctx.set_framebuffer(RenderTarget::Framebuffer(texture));
        ctx.clear(Some(self.clear_color), true);
    }

    fn render_deferred_shading(
        &mut self,
        ctx: &mut DrawContext<'_>,
        assets: &Assets,
        _timer: f32,
        _camera: &Camera,
    ) -> Result<(), RenderError> {
        let program = assets.shaders.require("deferred_lighting")?;
        let Some(targets) = &self.targets else {
            return Ok(());
        };
        let mut ctx = ctx.sub_with_target(RenderTarget::Framebuffer(targets.scene));
        ctx.set_depth_test(false);
        ctx.set_depth_mask(false);
        ctx.set_cull_face(false);
        let backend = ctx.backend();
        backend.bind_texture(TextureSlot::Main, Some(targets.gbuffer));
        backend.bind_texture(TextureSlot::Depth, Some(targets.gbuffer));
        Self::draw_quad(backend, program);
        backend.bind_texture(TextureSlot::Depth, None);
        Ok(())
    }

    fn bind_depth_buffer(&mut self, backend: &mut dyn RenderBackend) -> RenderTarget {
        if let Some(targets) = &self.targets {
            backend.copy_depth(targets.gbuffer, targets.scene);
        }
        self.framebuffer_target()
    }

    fn framebuffer_target(&self) -> RenderTarget {
        match &self.targets {
            Some(targets) => RenderTarget::Framebuffer(targets.scene),
            None => RenderTarget::Screen,
        }
    }

    fn render(
        &mut self,
        ctx: &mut DrawContext<'_>,
        assets: &Assets,
        timer: f32,
        _camera: &Camera,
    ) -> Result<(), RenderError> {
        let program = assets.shaders.require("screen")?;
        let Some(targets) = &self.targets else {
            return Ok(());
        };
        let mut ctx = ctx.sub();
        ctx.set_depth_test(false);
        ctx.set_depth_mask(false);
        ctx.set_cull_face(false);
        let uniforms = ScreenUniforms {
            gamma: self.gamma,
            timer,
            _padding: [0.0; 2],
        };
        let backend = ctx.backend();
        backend.write_uniforms(program, bytemuck::bytes_of(&uniforms));
        backend.bind_texture(TextureSlot::Main, Some(targets.scene));
        Self::draw_quad(backend, program);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::{Command, RecordingBackend, TextureKind};
    use crate::renderer::shaders::ShaderRegistry;

    fn assets() -> Assets {
        let mut shaders = ShaderRegistry::new();
        shaders.register("deferred_lighting", "");
        shaders.register("screen", "");
        Assets::new(shaders)
    }

    #[test]
    fn targets_follow_viewport_size() {
        let mut backend = RecordingBackend::new();
        let mut post = ScenePostProcess::new();
        {
            let mut ctx = DrawContext::new(&mut backend, Viewport::new(640, 480));
            post.use_target(&mut ctx, false);
        }
        let scene = post.scene_texture().unwrap();
        assert_eq!(
            backend.texture_kind(scene),
            Some(TextureKind::Framebuffer {
                width: 640,
                height: 480
            })
        );
        assert_eq!(
            backend.current_state().target,
            RenderTarget::Framebuffer(scene)
        );

        {
            let mut ctx = DrawContext::new(&mut backend, Viewport::new(640, 480));
            post.use_target(&mut ctx, true);
        }
        assert_eq!(post.scene_texture(), Some(scene));

        {
            let mut ctx = DrawContext::new(&mut backend, Viewport::new(800, 600));
            post.use_target(&mut ctx, false);
        }
        assert_ne!(post.scene_texture(), Some(scene));
        assert!(backend.texture_kind(scene).is_none());
        assert_eq!(backend.live_textures().len(), 2);
    }

    #[test]
    fn deferred_world_pass_targets_gbuffer() {
        let mut backend = RecordingBackend::new();
        let mut post = ScenePostProcess::new();
        let mut ctx = DrawContext::new(&mut backend, Viewport::new(64, 64));
        post.use_target(&mut ctx, true);
        let gbuffer = post.gbuffer_texture().unwrap();
        assert_eq!(ctx.target(), RenderTarget::Framebuffer(gbuffer));
    }

    #[test]
    fn depth_is_copied_before_forward_passes() {
        let mut backend = RecordingBackend::new();
        let mut post = ScenePostProcess::new();
        {
            let mut ctx = DrawContext::new(&mut backend, Viewport::new(64, 64));
            post.use_target(&mut ctx, true);
        }
        let target = post.bind_depth_buffer(&mut backend);
        let scene = post.scene_texture().unwrap();
        let gbuffer = post.gbuffer_texture().unwrap();
        assert_eq!(target, RenderTarget::Framebuffer(scene));
        assert!(backend.commands().iter().any(|c| matches!(
            c,
            Command::CopyDepth { src, dst } if *src == gbuffer && *dst == scene
        )));
    }

    #[test]
    fn composite_samples_scene() {
        let assets = assets();
        let screen = assets.shaders.require("screen").unwrap();
        let mut backend = RecordingBackend::new();
        let mut post = ScenePostProcess::new();
        {
            let mut ctx = DrawContext::new(&mut backend, Viewport::new(32, 32));
            post.use_target(&mut ctx, false);
        }
        {
            let mut ctx = DrawContext::new(&mut backend, Viewport::new(32, 32));
            post.render(&mut ctx, &assets, 1.5, &Camera::default()).unwrap();
        }
        let draws: Vec<_> = backend.draws().collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].0, screen);
        assert_eq!(draws[0].1.target, RenderTarget::Screen);
        assert!(!draws[0].1.depth_test);
        let uniforms: ScreenUniforms =
            bytemuck::pod_read_unaligned(backend.last_uniforms(screen).unwrap());
        assert_eq!(uniforms.timer, 1.5);
    }

    #[test]
    fn missing_composite_program_is_fatal() {
        let mut backend = RecordingBackend::new();
        let mut post = ScenePostProcess::new();
        let mut ctx = DrawContext::new(&mut backend, Viewport::new(32, 32));
        let assets = Assets::new(ShaderRegistry::new());
        let result = post.render(&mut ctx, &assets, 0.0, &Camera::default());
        assert!(result.is_err());
    }
}
