use super::backend::RenderTarget;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Straight alpha blending.
    #[default]
    Normal,
    Addition,
    Inversion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn full_rect(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }
}

/// Rectangle in corner form with a top-left origin. A rectangle whose
/// `x1 <= x0` or `y1 <= y0` covers no pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        x0: 0,
        y0: 0,
        x1: 0,
        y1: 0,
    };

    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        (self.x1 - self.x0).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y1 - self.y0).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let rect = Rect::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        );
        if rect.is_empty() {
            Rect::ZERO
        } else {
            rect
        }
    }
}

/// Complete fixed-function state a draw is issued under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub target: RenderTarget,
    pub viewport: Viewport,
    /// `None` disables the scissor test.
    pub scissor: Option<Rect>,
    pub depth_test: bool,
    pub depth_mask: bool,
    pub cull_face: bool,
    pub blend_mode: BlendMode,
}

impl RenderState {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            target: RenderTarget::Screen,
            viewport,
            scissor: None,
            depth_test: false,
            depth_mask: true,
            cull_face: false,
            blend_mode: BlendMode::Normal,
        }
    }

    /// Depth values are written only while the depth test is on.
    pub fn depth_write(&self) -> bool {
        self.depth_test && self.depth_mask
    }

    /// Scissor clipped to the viewport; `None` when no clipping applies.
    pub fn effective_scissor(&self) -> Option<Rect> {
        self.scissor
            .map(|rect| rect.intersect(&self.viewport.full_rect()))
    }
}
