use glam::Vec4;
use log::warn;

use super::state::{Rect, Viewport};

/// Window-level scissor stack.
///
/// Areas are pushed as `x, y, width, height` and stored in corner form. Every
/// push is intersected with the current area, so nested areas can only
/// shrink. An empty or inverted intersection yields a zero-area scissor.
#[derive(Debug, Clone)]
pub struct ScissorStack {
    viewport: Viewport,
    area: Vec4,
    stack: Vec<Vec4>,
}

impl ScissorStack {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            area: full_area(viewport),
            stack: Vec::new(),
        }
    }

    pub fn push(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.stack.push(self.area);

        let mut area = Vec4::new(x, y, width + x.ceil(), height + y.ceil());
        area.x = area.x.max(self.area.x);
        area.y = area.y.max(self.area.y);
        area.z = area.z.min(self.area.z);
        area.w = area.w.min(self.area.w);
        self.area = area;
    }

    /// Restores the area that was current before the matching `push`.
    pub fn pop(&mut self) {
        match self.stack.pop() {
            Some(area) => self.area = area,
            None => warn!("extra ScissorStack::pop call"),
        }
    }

    /// Drops every pushed area, called once per presented frame.
    pub fn reset(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.area = full_area(viewport);
        self.stack.clear();
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Scissor to apply, `None` while nothing is pushed.
    pub fn effective(&self) -> Option<Rect> {
        if self.stack.is_empty() {
            return None;
        }
        let area = self.area;
        if area.z < 0.0 || area.w < 0.0 {
            return Some(Rect::ZERO);
        }
        let width = (area.z - area.x).ceil().max(0.0) as i32;
        let height = (area.w - area.y).ceil().max(0.0) as i32;
        if width == 0 || height == 0 {
            return Some(Rect::ZERO);
        }
        let x0 = area.x as i32;
        let y0 = area.y as i32;
        Some(Rect::new(x0, y0, x0 + width, y0 + height))
    }
}

fn full_area(viewport: Viewport) -> Vec4 {
    Vec4::new(0.0, 0.0, viewport.width as f32, viewport.height as f32)
}
