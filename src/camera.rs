use glam::{Mat4, Vec3, Vec4};

/// A free-look camera.
///
/// Orientation is stored as a rotation matrix; `front`, `right` and `up` are
/// derived from it every time the rotation changes. Orthographic cameras use
/// `fov` as the vertical extent of the view volume unless an explicit
/// projection has been installed with [`Camera::set_projection`].
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Mat4,
    pub front: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub zoom: f32,
    pub near: f32,
    pub far: f32,
    pub perspective: bool,
    fov: f32,
    aspect: f32,
    projection: Option<Mat4>,
}

impl Camera {
    pub fn new(position: Vec3, fov: f32) -> Self {
        let mut camera = Self {
            position,
            rotation: Mat4::IDENTITY,
            front: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
            zoom: 1.0,
            near: 0.05,
            far: 1500.0,
            perspective: true,
            fov,
            aspect: 1.0,
            projection: None,
        };
        camera.update_vectors();
        camera
    }

    /// Applies a rotation around Z, then Y, then X on top of the current one.
    pub fn rotate(&mut self, x: f32, y: f32, z: f32) {
        self.rotation = self.rotation
            * Mat4::from_rotation_z(z)
            * Mat4::from_rotation_y(y)
            * Mat4::from_rotation_x(x);
        self.update_vectors();
    }

    pub fn set_rotation(&mut self, rotation: Mat4) {
        self.rotation = rotation;
        self.update_vectors();
    }

    pub fn update_vectors(&mut self) {
        let rotation = self.rotation;
        let axis = |direction: Vec3| rotation.transform_vector3(direction).normalize_or_zero();
        self.front = axis(Vec3::NEG_Z);
        self.right = axis(Vec3::X);
        self.up = axis(Vec3::Y);
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov;
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect
    }

    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    /// Installs an explicit projection that overrides the one derived from
    /// fov/aspect/near/far.
    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = Some(projection);
    }

    pub fn reset_projection(&mut self) {
        self.projection = None;
    }

    pub fn projection(&self) -> Mat4 {
        if let Some(projection) = self.projection {
            return projection;
        }
        if self.perspective {
            Mat4::perspective_rh(self.fov * self.zoom, self.aspect, self.near, self.far)
        } else {
            let height = self.fov * self.zoom;
            let width = height * self.aspect;
            Mat4::orthographic_rh(0.0, width, 0.0, height, self.near, self.far)
        }
    }

    /// View matrix; `with_position == false` keeps only the orientation, which
    /// is what sky rendering wants.
    pub fn view(&self, with_position: bool) -> Mat4 {
        if with_position {
            Mat4::look_at_rh(self.position, self.position + self.front, self.up)
        } else {
            Mat4::look_at_rh(Vec3::ZERO, self.front, self.up)
        }
    }

    pub fn proj_view(&self, with_position: bool) -> Mat4 {
        self.projection() * self.view(with_position)
    }

    /// Transforms a world-space point into this camera's view space.
    pub fn to_view_space(&self, point: Vec3) -> Vec4 {
        self.view(true) * point.extend(1.0)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 90f32.to_radians())
    }
}
