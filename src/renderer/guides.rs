use glam::{Vec3, Vec4};

use super::backend::ProgramId;
use super::batch3d::LineBatch;
use super::chunks::{chunk_of, CHUNK_SIZE};
use super::collaborators::GuidesRenderer;
use super::draw_context::DrawContext;
use super::uniforms::BatchUniforms;
use crate::camera::Camera;

/// Height of the vertical lines marking neighbouring chunk corners.
const BORDER_HEIGHT: f32 = 256.0;
/// Distance in front of the camera at which the axis gizmo is drawn.
const AXES_DISTANCE: f32 = 1.0;
const AXES_LENGTH: f32 = 0.05;

/// Debug lines: the chunk grid around the camera and a world axis gizmo.
#[derive(Debug, Default)]
pub struct ChunkBorderGuides;

impl ChunkBorderGuides {
    fn draw_borders(ctx: &mut DrawContext<'_>, camera: &Camera, lines: &mut LineBatch) {
        let size = CHUNK_SIZE as f32;
        let chunk = chunk_of(camera.position.floor().as_ivec3());
        let origin = (chunk * CHUNK_SIZE).as_vec3();
        let backend = ctx.backend();

        lines.cube(
            backend,
            origin + Vec3::splat(size * 0.5),
            Vec3::splat(size),
            Vec4::new(0.0, 0.0, 1.0, 1.0),
        );
        for dz in -1..=2 {
            for dx in -1..=2 {
                let x = origin.x + dx as f32 * size;
                let z = origin.z + dz as f32 * size;
                lines.line(
                    backend,
                    Vec3::new(x, origin.y - BORDER_HEIGHT * 0.5, z),
                    Vec3::new(x, origin.y + BORDER_HEIGHT * 0.5, z),
                    Vec4::new(0.8, 0.8, 0.0, 1.0),
                );
            }
        }
        lines.flush(backend);
    }

    fn draw_axes(ctx: &mut DrawContext<'_>, camera: &Camera, lines: &mut LineBatch) {
        let center = camera.position + camera.front * AXES_DISTANCE;
        let mut actx = ctx.sub();
        actx.set_depth_test(false);
        let backend = actx.backend();
        for (axis, color) in [
            (Vec3::X, Vec4::new(1.0, 0.0, 0.0, 1.0)),
            (Vec3::Y, Vec4::new(0.0, 1.0, 0.0, 1.0)),
            (Vec3::Z, Vec4::new(0.0, 0.0, 1.0, 1.0)),
        ] {
            lines.line(backend, center, center + axis * AXES_LENGTH, color);
        }
        lines.flush(backend);
    }
}

impl GuidesRenderer for ChunkBorderGuides {
    fn render_debug_lines(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: &Camera,
        lines: &mut LineBatch,
        program: ProgramId,
        show_chunk_borders: bool,
    ) {
        ctx.backend().write_uniforms(
            program,
            bytemuck::bytes_of(&BatchUniforms::new(camera.proj_view(true))),
        );
        lines.begin(program);
        lines.line_width(1.0);
        if show_chunk_borders {
            Self::draw_borders(ctx, camera, lines);
        }
        Self::draw_axes(ctx, camera, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::RecordingBackend;
    use crate::renderer::state::Viewport;

    fn draws(show_chunk_borders: bool) -> Vec<(usize, bool)> {
        let mut backend = RecordingBackend::new();
        let camera = Camera::new(Vec3::new(5.0, 70.0, -3.0), 1.0);
        let mut lines = LineBatch::new(1024);
        {
            let mut ctx = DrawContext::new(&mut backend, Viewport::new(16, 16));
            ctx.set_depth_test(true);
            ChunkBorderGuides.render_debug_lines(
                &mut ctx,
                &camera,
                &mut lines,
                ProgramId(4),
                show_chunk_borders,
            );
        }
        backend
            .draws()
            .map(|(_, state, bytes)| (bytes.len(), state.depth_test))
            .collect()
    }

    #[test]
    fn axes_ignore_depth_and_borders_are_optional() {
        let without = draws(false);
        assert_eq!(without.len(), 1);
        assert!(!without[0].1);

        let with = draws(true);
        assert_eq!(with.len(), 2);
        assert!(with[0].1);
        // 12 box edges plus 16 corner posts, two vertices each.
        let stride = std::mem::size_of::<crate::renderer::vertex::BatchVertex>();
        assert_eq!(with[0].0, (12 + 16) * 2 * stride);
    }
}
