//! View-frustum culling against planes extracted from a view-projection
//! matrix with a `0..1` clip-space depth range.

use glam::{Mat4, Vec3, Vec4};

use crate::content::Aabb;

const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Six inward-pointing planes; `(a, b, c)` is the unit normal and `d` the
/// signed distance term.
#[derive(Clone, Debug)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Default for Frustum {
    fn default() -> Self {
        Self::from_view_projection(&Mat4::IDENTITY)
    }
}

impl Frustum {
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let mut frustum = Self {
            planes: [Vec4::ZERO; 6],
        };
        frustum.update(vp);
        frustum
    }

    /// Re-extracts the planes, called once per frame when culling is on.
    pub fn update(&mut self, vp: &Mat4) {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        self.planes[LEFT] = rows[3] + rows[0];
        self.planes[RIGHT] = rows[3] - rows[0];
        self.planes[BOTTOM] = rows[3] + rows[1];
        self.planes[TOP] = rows[3] - rows[1];
        self.planes[NEAR] = rows[2];
        self.planes[FAR] = rows[3] - rows[2];

        for plane in &mut self.planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }
    }

    /// Conservative test: never rejects a box that is at least partially
    /// inside the frustum.
    pub fn is_box_visible(&self, min: Vec3, max: Vec3) -> bool {
        for plane in &self.planes {
            let normal = plane.truncate();
            let p = Vec3::select(normal.cmpge(Vec3::ZERO), max, min);
            if normal.dot(p) + plane.w < 0.0 {
                return false;
            }
        }
        true
    }

    pub fn is_visible(&self, aabb: &Aabb) -> bool {
        self.is_box_visible(aabb.min(), aabb.max())
    }
}
