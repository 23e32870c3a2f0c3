mod common;

use common::Harness;
use glam::{Mat4, Vec3};
use world_renderer::content::{BlockDef, ITEM_EMPTY};
use world_renderer::level::CameraMode;
use world_renderer::renderer::backend::Primitive;
use world_renderer::renderer::recording::Command;
use world_renderer::renderer::uniforms::WorldUniforms;
use world_renderer::renderer::{DebugFlags, RenderState, RenderTarget};
use world_renderer::settings::RenderSettings;
use world_renderer::weather::{FallParams, WeatherPreset};

fn falling(texture: &str, opaque: bool) -> WeatherPreset {
    WeatherPreset {
        fall: FallParams {
            texture: texture.to_string(),
            opaque,
            ..FallParams::default()
        },
        ..WeatherPreset::default()
    }
}

#[test]
fn deferred_frame_runs_passes_in_order() {
    let (mut harness, log) = Harness::logged(RenderSettings::default());
    harness.frame();
    assert_eq!(
        *log.borrow(),
        vec![
            "chunks.update",
            "chunks.shadows",
            "chunks.shadows",
            "post.use_target",
            "texts",
            "entities",
            "particles",
            "chunks.opaque",
            "block_wraps",
            "texts.front",
            "post.deferred",
            "post.bind_depth",
            "chunks.translucent",
            "post.composite",
        ]
    );
}

#[test]
fn forward_frame_skips_deferred_shading() {
    let mut settings = RenderSettings::default();
    settings.graphics.advanced_render = false;
    let (mut harness, log) = Harness::logged(settings);
    harness.frame();
    let log = log.borrow();
    assert!(!log.contains(&"chunks.shadows"));
    assert!(!log.contains(&"post.deferred"));
    assert!(!log.contains(&"post.bind_depth"));
    assert_eq!(log.last(), Some(&"post.composite"));
}

#[test]
fn debug_guides_only_with_hud_and_debug_flag() {
    let (mut harness, log) = Harness::logged(RenderSettings::default());
    harness.frame();
    assert!(!log.borrow().contains(&"guides"));

    harness.renderer.config_mut().set_flag(DebugFlags::DEBUG, true);
    log.borrow_mut().clear();
    harness.frame();
    let log = log.borrow();
    let guides = log.iter().position(|n| *n == "guides");
    let front = log.iter().position(|n| *n == "texts.front");
    assert!(guides.is_some());
    assert!(guides < front);
}

#[test]
fn second_frame_reuses_every_resource() {
    let mut harness = Harness::demo(RenderSettings::default());
    let first = harness.frame();
    assert!(harness.count(|c| matches!(c, Command::CreateMesh(..))) > 0);
    assert!(harness.count(|c| matches!(c, Command::CreateTexture(..))) > 0);

    let second = harness.frame();
    assert_eq!(second.frame, first.frame + 1);
    assert!(!second.shaders_recompiled);
    assert_eq!(
        harness.count(|c| matches!(
            c,
            Command::CreateTexture(..)
                | Command::ReleaseTexture(_)
                | Command::CreateMesh(..)
                | Command::ReleaseMesh(_)
                | Command::CompileProgram { .. }
        )),
        0
    );
}

#[test]
fn shader_variants_recompile_once_per_change() {
    let mut harness = Harness::demo(RenderSettings::default());
    assert!(harness.frame().shaders_recompiled);
    let compiles = harness.assets.shaders.compile_count();
    assert!(!harness.frame().shaders_recompiled);
    assert_eq!(harness.assets.shaders.compile_count(), compiles);

    harness.settings.graphics.ssao = true;
    assert!(harness.frame().shaders_recompiled);
    let recompiled = harness.count(|c| matches!(c, Command::CompileProgram { .. }));
    assert!(recompiled > 0);
    assert!(!harness.frame().shaders_recompiled);
    assert_eq!(harness.count(|c| matches!(c, Command::CompileProgram { .. })), 0);
}

#[test]
fn torchlight_comes_from_the_held_item() {
    let mut harness = Harness::demo(RenderSettings::default());
    let lit = harness.frame().torchlight;
    assert!((lit - Vec3::new(0.75, 0.6, 0.3)).length() < 1e-5);

    harness.world.player.chosen_item = ITEM_EMPTY;
    assert_eq!(harness.frame().torchlight, Vec3::ZERO);
}

#[test]
fn hands_are_drawn_only_in_first_person() {
    // Compared frames refresh the same shadow cascade.
    let mut harness = Harness::demo(RenderSettings::default());
    harness.frame();
    harness.frame();
    let first_person = harness.count(|c| matches!(c, Command::Draw { .. }));

    harness.world.player.camera_mode = CameraMode::ThirdPerson;
    harness.frame();
    harness.frame();
    let third_person = harness.count(|c| matches!(c, Command::Draw { .. }));
    assert!(third_person < first_person);
}

#[test]
fn timer_and_frame_counter_advance_per_frame() {
    let mut harness = Harness::demo(RenderSettings::default());
    harness.frame();
    harness.frame();
    assert!((harness.renderer.timer() - 2.0 * common::DELTA).abs() < 1e-6);
    assert_eq!(harness.renderer.frame_index(), 2);
}

#[test]
fn blended_presets_draw_precipitation_with_their_own_opacity() {
    let (mut harness, log) = Harness::logged(RenderSettings::default());
    let weather = harness.renderer.weather_mut();
    weather.change(falling("snow", true), 0.0, "snow");
    weather.change(falling("rain", false), 2.0, "rain");
    weather.update(1.0);
    let expected: Vec<(u32, f32)> = weather
        .presets()
        .iter()
        .map(|preset| {
            let (alpha_clip, opacity) = preset.precipitation_opacity();
            (alpha_clip as u32, opacity)
        })
        .collect();
    assert_eq!(expected, vec![(1, 0.25), (0, 0.5)]);

    harness.frame();
    let log = log.borrow();
    assert_eq!(log.iter().filter(|n| **n == "precipitation").count(), 2);
    let translucent = log.iter().position(|n| *n == "chunks.translucent");
    let precipitation = log.iter().position(|n| *n == "precipitation");
    let composite = log.iter().position(|n| *n == "post.composite");
    assert!(translucent < precipitation && precipitation < composite);

    // Uniforms in effect for each precipitation draw.
    let mut written = std::collections::HashMap::new();
    let mut seen = Vec::new();
    for command in &harness.commands {
        match command {
            Command::WriteUniforms { program, bytes } => {
                written.insert(*program, bytes.clone());
            }
            Command::Draw {
                program,
                primitive: Primitive::Points,
                vertices,
                ..
            } if vertices.is_empty() => {
                let uniforms: WorldUniforms = bytemuck::pod_read_unaligned(&written[program]);
                seen.push((uniforms.alpha_clip, uniforms.opacity));
            }
            _ => {}
        }
    }
    assert_eq!(seen, expected);
}

#[test]
fn hands_trail_the_camera_rotation() {
    let mut harness = Harness::demo(RenderSettings::default());
    harness.frame();
    harness.camera.set_rotation(Mat4::from_rotation_y(1.2));
    let before = harness.renderer.hand_rotation();
    harness.frame();
    let after = harness.renderer.hand_rotation();

    let target = glam::Quat::from_mat4(&harness.camera.rotation);
    let remaining = after.angle_between(target);
    assert!(remaining > 1e-3);
    assert!(remaining < before.angle_between(target));
    assert!(after.angle_between(before) > 1e-3);
}

#[test]
fn frame_ends_on_the_screen_with_the_root_state() {
    for advanced in [true, false] {
        let mut settings = RenderSettings::default();
        settings.graphics.advanced_render = advanced;
        let mut harness = Harness::demo(settings);
        harness.frame();
        let state = harness.backend.current_state();
        assert_eq!(state.target, RenderTarget::Screen);
        assert_eq!(state.scissor, None);
        assert_eq!(state, RenderState::new(common::VIEWPORT));
    }
}

#[test]
fn block_overlay_spans_past_the_screen_edges() {
    let mut harness = Harness::demo(RenderSettings::default());
    let mut water = BlockDef::new("water");
    water.overlay_texture = "blocks:glass".to_string();
    let level = &mut harness.world.level;
    let water = level.content.add_block(water);
    level.set_block(harness.camera.position.floor().as_ivec3(), water);
    harness.frame();

    // The overlay is the last draw of the frame.
    let vertices = harness
        .commands
        .iter()
        .rev()
        .find_map(|command| match command {
            Command::Draw { vertices, .. } => Some(vertices),
            _ => None,
        })
        .unwrap();
    let floats: Vec<f32> = vertices
        .chunks_exact(4)
        .map(|bytes| f32::from_ne_bytes(bytes.try_into().unwrap()))
        .collect();
    // Position, uv and color: nine floats per vertex.
    let corners: Vec<&[f32]> = floats.chunks_exact(9).collect();
    assert_eq!(corners.len(), 6);
    for corner in corners {
        assert_eq!(corner[0].abs(), 2.0);
        assert_eq!(corner[1].abs(), 2.0);
        assert_eq!(corner[2], 0.0);
    }
}
