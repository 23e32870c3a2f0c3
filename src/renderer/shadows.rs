use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

use glam::{Mat4, Vec3};
use log::info;

use super::backend::{RenderBackend, RenderTarget, TextureId};
use super::draw_context::DrawContext;
use super::state::Viewport;
use crate::camera::Camera;

pub const MIN_SHADOW_MAP_RESOLUTION: u32 = 512;

/// Snapping grid of the shadow camera anchor.
const ANCHOR_GRID: f32 = 4.0;
/// The anchor only follows the player once it is this far away.
const RECENTER_DISTANCE: f32 = 5.0;
/// Sun angle changes in steps of this fraction of a day.
const SUN_CYCLE_STEP: f32 = 1.0 / 500.0;
const SUN_DISTANCE: f32 = 500.0;
const SHADOW_NEAR: f32 = 0.1;
const SHADOW_FAR: f32 = 1000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cascade {
    Near,
    Wide,
}

impl Cascade {
    pub const ALL: [Cascade; 2] = [Cascade::Near, Cascade::Wide];

    /// Even frames draw the near cascade, odd frames the wide one.
    pub fn for_frame(frame: u64) -> Cascade {
        if frame % 2 == 0 {
            Cascade::Near
        } else {
            Cascade::Wide
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Area covered relative to the near cascade.
    pub fn scale(self) -> f32 {
        match self {
            Cascade::Near => 1.0,
            Cascade::Wide => 3.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShadowMap {
    pub texture: TextureId,
    pub resolution: u32,
}

impl ShadowMap {
    pub fn target(&self) -> RenderTarget {
        RenderTarget::DepthMap(self.texture)
    }
}

/// What [`ShadowPassEngine::configure`] did to the shadow maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowLifecycle {
    Unchanged,
    Allocated,
    Resized,
    Released,
}

struct CascadeState {
    camera: Camera,
    anchor: Option<Vec3>,
    map: Option<ShadowMap>,
    refreshes: u64,
}

impl CascadeState {
    fn new() -> Self {
        let mut camera = Camera::default();
        camera.near = SHADOW_NEAR;
        camera.far = SHADOW_FAR;
        camera.perspective = false;
        camera.set_aspect_ratio(1.0);
        Self {
            camera,
            anchor: None,
            map: None,
            refreshes: 0,
        }
    }
}

/// Directional-light shadow maps for a near and a wide cascade.
///
/// Only one cascade is re-aimed and redrawn per frame; the other keeps the
/// camera and depth content of its last refresh. Freshly allocated maps are
/// both drawn on the next refresh so no undefined depth is ever sampled.
pub struct ShadowPassEngine {
    cascades: [CascadeState; 2],
    quality: u32,
    needs_priming: bool,
}

impl Default for ShadowPassEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowPassEngine {
    pub fn new() -> Self {
        Self {
            cascades: [CascadeState::new(), CascadeState::new()],
            quality: 0,
            needs_priming: false,
        }
    }

    pub fn resolution_for(quality: u32) -> u32 {
        MIN_SHADOW_MAP_RESOLUTION << quality
    }

    /// Brings the shadow maps in line with `quality`; zero releases them.
    pub fn configure(&mut self, backend: &mut dyn RenderBackend, quality: u32) -> ShadowLifecycle {
        let resolution = Self::resolution_for(quality);
        let current = self.cascades[0].map.map(|map| map.resolution);
        let change = match (quality, current) {
            (0, None) => return ShadowLifecycle::Unchanged,
            (0, Some(_)) => {
                self.release(backend);
                info!("Shadows disabled, shadow maps released");
                ShadowLifecycle::Released
            }
            (_, Some(res)) if res == resolution => return ShadowLifecycle::Unchanged,
            (_, Some(_)) => {
                self.release(backend);
                self.allocate(backend, resolution);
                info!("Shadow maps resized to {}x{}", resolution, resolution);
                ShadowLifecycle::Resized
            }
            (_, None) => {
                self.allocate(backend, resolution);
                info!("Shadow maps allocated at {}x{}", resolution, resolution);
                ShadowLifecycle::Allocated
            }
        };
        self.quality = quality;
        change
    }

    fn allocate(&mut self, backend: &mut dyn RenderBackend, resolution: u32) {
        for state in &mut self.cascades {
            state.map = Some(ShadowMap {
                texture: backend.create_depth_map(resolution),
                resolution,
            });
        }
        self.needs_priming = true;
    }

    fn release(&mut self, backend: &mut dyn RenderBackend) {
        for state in &mut self.cascades {
            if let Some(map) = state.map.take() {
                backend.release_texture(map.texture);
            }
        }
        self.needs_priming = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.cascades[0].map.is_some()
    }

    pub fn quality(&self) -> u32 {
        self.quality
    }

    pub fn resolution(&self) -> u32 {
        self.cascades[0].map.map_or(0, |map| map.resolution)
    }

    pub fn map(&self, cascade: Cascade) -> Option<&ShadowMap> {
        self.cascades[cascade.index()].map.as_ref()
    }

    pub fn camera(&self, cascade: Cascade) -> &Camera {
        &self.cascades[cascade.index()].camera
    }

    /// Snapped position the cascade is currently centred on.
    pub fn anchor(&self, cascade: Cascade) -> Option<Vec3> {
        self.cascades[cascade.index()].anchor
    }

    pub fn refresh_count(&self, cascade: Cascade) -> u64 {
        self.cascades[cascade.index()].refreshes
    }

    /// Light-space projection-view matrices of both cascades.
    pub fn matrices(&self) -> [Mat4; 2] {
        Cascade::ALL.map(|cascade| self.camera(cascade).proj_view(true))
    }

    /// Direction the sun shines in, taken from the near cascade.
    pub fn sun_direction(&self) -> Vec3 {
        self.camera(Cascade::Near).front
    }

    /// Sun angle in radians for `daytime`, quantized to [`SUN_CYCLE_STEP`].
    pub fn sun_angle(daytime: f32) -> f32 {
        let mut t = daytime - 0.25;
        if t < 0.0 {
            t += 1.0;
        }
        let t = t % 0.5;
        let stepped = (t / SUN_CYCLE_STEP).floor() * SUN_CYCLE_STEP;
        (90.0 - (stepped + 0.25) * 360.0).to_radians()
    }

    /// Re-aims `cascade` at the sun around `player_camera`.
    pub fn aim(&mut self, cascade: Cascade, player_camera: &Camera, daytime: f32) {
        let resolution = self.resolution().max(MIN_SHADOW_MAP_RESOLUTION);
        let size = resolution as f32 * 0.32 / (1u32 << self.quality) as f32 * cascade.scale();

        let state = &mut self.cascades[cascade.index()];
        let base = (player_camera.position / ANCHOR_GRID).floor() * ANCHOR_GRID;
        let anchor = match state.anchor {
            Some(previous)
                if previous.distance_squared(base) <= RECENTER_DISTANCE * RECENTER_DISTANCE =>
            {
                previous
            }
            _ => base,
        };
        state.anchor = Some(anchor);

        let sun_angle = Self::sun_angle(daytime);
        let camera = &mut state.camera;
        camera.position = anchor;
        camera.set_fov(size);
        camera.set_rotation(Mat4::IDENTITY);
        camera.rotate(
            -(sun_angle + FRAC_PI_2).cos() * FRAC_PI_4,
            sun_angle - FRAC_PI_2,
            0.0,
        );
        camera.position -= camera.front * SUN_DISTANCE;

        let view = camera.view(true);
        let corner = (camera.right + camera.up) * size * 0.5;
        let min = view * (camera.position - corner).extend(1.0);
        let max = view * (camera.position + corner).extend(1.0);
        camera.set_projection(Mat4::orthographic_rh(
            min.x, max.x, min.y, max.y, SHADOW_NEAR, SHADOW_FAR,
        ));
    }

    /// Re-aims and redraws the cascade due on `frame`, or both after the
    /// maps were (re)allocated. `draw` renders the casters into the bound
    /// shadow map. Returns the cascades that were drawn.
    pub fn refresh(
        &mut self,
        ctx: &mut DrawContext<'_>,
        player_camera: &Camera,
        daytime: f32,
        frame: u64,
        mut draw: impl FnMut(&mut DrawContext<'_>, &Camera),
    ) -> Vec<Cascade> {
        if !self.is_enabled() {
            return Vec::new();
        }
        let cascades = if std::mem::take(&mut self.needs_priming) {
            Cascade::ALL.to_vec()
        } else {
            vec![Cascade::for_frame(frame)]
        };
        for &cascade in &cascades {
            self.aim(cascade, player_camera, daytime);
            let state = &mut self.cascades[cascade.index()];
            let Some(map) = state.map else {
                continue;
            };
            let mut sctx = ctx.sub();
            sctx.set_depth_test(true);
            sctx.set_cull_face(true);
            sctx.set_viewport(Viewport::new(map.resolution, map.resolution));
            sctx.set_framebuffer(map.target());
            sctx.clear_depth();
            draw(&mut sctx, &state.camera);
            state.refreshes += 1;
        }
        cascades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::{Command, RecordingBackend, TextureKind};

    #[test]
    fn quality_changes_reallocate_both_maps() {
        let mut backend = RecordingBackend::new();
        let mut engine = ShadowPassEngine::new();
        assert_eq!(engine.configure(&mut backend, 0), ShadowLifecycle::Unchanged);
        assert_eq!(engine.configure(&mut backend, 1), ShadowLifecycle::Allocated);
        assert_eq!(engine.resolution(), 1024);
        assert_eq!(engine.configure(&mut backend, 1), ShadowLifecycle::Unchanged);
        assert_eq!(engine.configure(&mut backend, 2), ShadowLifecycle::Resized);
        assert_eq!(backend.live_textures().len(), 2);
        assert!(backend
            .live_textures()
            .values()
            .all(|kind| *kind == TextureKind::DepthMap { resolution: 2048 }));
        assert_eq!(engine.configure(&mut backend, 0), ShadowLifecycle::Released);
        assert!(backend.live_textures().is_empty());
        assert!(!engine.is_enabled());
    }

    #[test]
    fn sun_angle_is_quantized() {
        let a = ShadowPassEngine::sun_angle(0.5 + SUN_CYCLE_STEP * 0.25);
        let b = ShadowPassEngine::sun_angle(0.5 + SUN_CYCLE_STEP * 0.75);
        assert_eq!(a, b);
        let c = ShadowPassEngine::sun_angle(0.5 + SUN_CYCLE_STEP * 2.5);
        assert!(c < a);
    }

    #[test]
    fn anchor_has_hysteresis() {
        let mut engine = ShadowPassEngine::new();
        let mut player = Camera::default();
        engine.aim(Cascade::Near, &player, 0.5);
        assert_eq!(engine.anchor(Cascade::Near), Some(Vec3::ZERO));

        player.position = Vec3::new(4.5, 0.0, 0.0);
        engine.aim(Cascade::Near, &player, 0.5);
        assert_eq!(engine.anchor(Cascade::Near), Some(Vec3::ZERO));

        player.position = Vec3::new(9.0, 0.0, 0.0);
        engine.aim(Cascade::Near, &player, 0.5);
        assert_eq!(engine.anchor(Cascade::Near), Some(Vec3::new(8.0, 0.0, 0.0)));
        assert_eq!(engine.anchor(Cascade::Wide), None);
    }

    #[test]
    fn first_refresh_after_allocation_draws_both_cascades() {
        let mut backend = RecordingBackend::new();
        let mut engine = ShadowPassEngine::new();
        engine.configure(&mut backend, 1);
        let player = Camera::default();
        let mut ctx = DrawContext::new(&mut backend, Viewport::new(640, 480));

        let mut drawn = 0;
        let first = engine.refresh(&mut ctx, &player, 0.3, 7, |_, _| drawn += 1);
        assert_eq!(first, vec![Cascade::Near, Cascade::Wide]);
        let second = engine.refresh(&mut ctx, &player, 0.3, 8, |_, _| drawn += 1);
        assert_eq!(second, vec![Cascade::Near]);
        assert_eq!(drawn, 3);
        drop(ctx);

        let depth_clears = backend
            .commands()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Command::Clear {
                        target: RenderTarget::DepthMap(_),
                        depth: true,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(depth_clears, 3);
        assert_eq!(backend.current_state().target, RenderTarget::Screen);
    }

    #[test]
    fn shadow_projection_contains_anchor() {
        let mut backend = RecordingBackend::new();
        let mut engine = ShadowPassEngine::new();
        engine.configure(&mut backend, 1);
        let player = Camera::new(Vec3::new(10.0, 64.0, -3.0), 1.2);
        engine.aim(Cascade::Wide, &player, 0.4);
        let anchor = engine.anchor(Cascade::Wide).unwrap_or_default();
        let clip = engine.matrices()[1] * anchor.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
        assert!((0.0..=1.0).contains(&ndc.z));
    }
}
