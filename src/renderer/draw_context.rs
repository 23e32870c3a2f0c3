use super::backend::{RenderBackend, RenderTarget};
use super::state::{BlendMode, Rect, RenderState, Viewport};

/// Scoped graphics state.
///
/// A child created with [`DrawContext::sub`] starts from its parent's state;
/// its setters take effect immediately and the parent's state is restored
/// when the child is dropped. Children must be dropped in reverse order of
/// creation, which the borrow on the parent enforces.
pub struct DrawContext<'a> {
    backend: &'a mut dyn RenderBackend,
    parent: Option<RenderState>,
    state: RenderState,
}

impl<'a> DrawContext<'a> {
    /// Root context drawing to the screen with default state.
    pub fn new(backend: &'a mut dyn RenderBackend, viewport: Viewport) -> Self {
        let state = RenderState::new(viewport);
        backend.apply_state(&state);
        Self {
            backend,
            parent: None,
            state,
        }
    }

    pub fn sub(&mut self) -> DrawContext<'_> {
        DrawContext {
            parent: Some(self.state),
            state: self.state,
            backend: &mut *self.backend,
        }
    }

    /// Child context drawing into `target`.
    pub fn sub_with_target(&mut self, target: RenderTarget) -> DrawContext<'_> {
        let mut ctx = self.sub();
        ctx.set_framebuffer(target);
        ctx
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn viewport(&self) -> Viewport {
        self.state.viewport
    }

    pub fn target(&self) -> RenderTarget {
        self.state.target
    }

    pub fn backend(&mut self) -> &mut dyn RenderBackend {
        &mut *self.backend
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.update(|state| state.viewport = viewport);
    }

    pub fn set_framebuffer(&mut self, target: RenderTarget) {
        self.update(|state| state.target = target);
    }

    pub fn set_depth_test(&mut self, flag: bool) {
        self.update(|state| state.depth_test = flag);
    }

    pub fn set_depth_mask(&mut self, flag: bool) {
        self.update(|state| state.depth_mask = flag);
    }

    pub fn set_cull_face(&mut self, flag: bool) {
        self.update(|state| state.cull_face = flag);
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.update(|state| state.blend_mode = mode);
    }

    /// Narrows the scissor to `rect`; the result is the intersection with
    /// the inherited scissor (or the viewport when none is set).
    pub fn set_scissors(&mut self, rect: Rect) {
        let current = self
            .state
            .scissor
            .unwrap_or_else(|| self.state.viewport.full_rect());
        let area = current.intersect(&rect);
        self.update(|state| state.scissor = Some(area));
    }

    pub fn clear(&mut self, color: Option<[f32; 4]>, depth: bool) {
        self.backend.clear(color, depth);
    }

    pub fn clear_depth(&mut self) {
        self.backend.clear(None, true);
    }

    fn update(&mut self, apply: impl FnOnce(&mut RenderState)) {
        let before = self.state;
        apply(&mut self.state);
        if self.state != before {
            self.backend.apply_state(&self.state);
        }
    }
}

impl Drop for DrawContext<'_> {
    fn drop(&mut self) {
        if let Some(parent) = self.parent {
            if parent != self.state {
                self.backend.apply_state(&parent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::TextureId;
    use crate::renderer::recording::RecordingBackend;

    #[test]
    fn child_state_is_restored_on_drop() {
        let mut backend = RecordingBackend::new();
        let parent_state;
        {
            let mut root = DrawContext::new(&mut backend, Viewport::new(800, 600));
            parent_state = *root.state();
            let mut child = root.sub();
            child.set_depth_test(true);
            child.set_blend_mode(BlendMode::Addition);
            {
                let mut grandchild = child.sub_with_target(RenderTarget::DepthMap(TextureId(3)));
                grandchild.set_viewport(Viewport::new(512, 512));
            }
        }

        let states: Vec<RenderState> = backend.applied_states().collect();
        let restored_child = states[states.len() - 2];
        assert_eq!(restored_child.target, RenderTarget::Screen);
        assert_eq!(restored_child.viewport, Viewport::new(800, 600));
        assert!(restored_child.depth_test);
        assert_eq!(restored_child.blend_mode, BlendMode::Addition);
        assert_eq!(backend.current_state(), parent_state);
    }

    #[test]
    fn sibling_passes_do_not_leak_state() {
        let mut backend = RecordingBackend::new();
        {
            let mut root = DrawContext::new(&mut backend, Viewport::new(64, 64));
            {
                let mut first = root.sub();
                first.set_cull_face(true);
                first.set_depth_mask(false);
            }
            let mut second = root.sub();
            second.set_depth_test(true);
            assert!(!second.state().cull_face);
            assert!(second.state().depth_mask);
        }
        let last = backend.current_state();
        assert!(!last.cull_face);
        assert!(!last.depth_test);
        assert!(last.depth_mask);
    }

    #[test]
    fn nested_scissors_intersect() {
        let mut backend = RecordingBackend::new();
        let mut root = DrawContext::new(&mut backend, Viewport::new(100, 100));
        let mut outer = root.sub();
        outer.set_scissors(Rect::new(10, 10, 60, 60));
        let mut inner = outer.sub();
        inner.set_scissors(Rect::new(40, 40, 90, 90));
        assert_eq!(inner.state().scissor, Some(Rect::new(40, 40, 60, 60)));
        inner.set_scissors(Rect::new(70, 70, 80, 80));
        assert_eq!(inner.state().scissor, Some(Rect::ZERO));
    }
}
