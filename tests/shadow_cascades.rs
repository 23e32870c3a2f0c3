mod common;

use common::Harness;
use world_renderer::renderer::recording::{Command, TextureKind};
use world_renderer::renderer::shadows::{Cascade, ShadowLifecycle};
use world_renderer::settings::RenderSettings;

#[test]
fn cascades_alternate_after_priming() {
    let (mut harness, log) = Harness::logged(RenderSettings::default());

    let first = harness.frame();
    assert_eq!(first.shadow_lifecycle, ShadowLifecycle::Allocated);
    assert_eq!(first.cascades, vec![Cascade::Near, Cascade::Wide]);
    let shadow_passes = log
        .borrow()
        .iter()
        .filter(|n| **n == "chunks.shadows")
        .count();
    assert_eq!(shadow_passes, 2);

    for _ in 0..6 {
        let stats = harness.frame();
        assert_eq!(stats.shadow_lifecycle, ShadowLifecycle::Unchanged);
        assert_eq!(stats.cascades, vec![Cascade::for_frame(stats.frame)]);
    }
    let shadows = harness.renderer.shadows();
    assert_eq!(shadows.refresh_count(Cascade::Near), 4);
    assert_eq!(shadows.refresh_count(Cascade::Wide), 4);
}

#[test]
fn resizing_shadow_maps_primes_both_cascades_again() {
    let mut harness = Harness::demo(RenderSettings::default());
    harness.frame();
    harness.frame();

    harness.settings.graphics.shadows_quality = 2;
    let stats = harness.frame();
    assert_eq!(stats.shadow_lifecycle, ShadowLifecycle::Resized);
    assert_eq!(stats.cascades.len(), 2);
    let created: Vec<_> = harness
        .commands
        .iter()
        .filter_map(|command| match command {
            Command::CreateTexture(_, kind) => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(created, vec![TextureKind::DepthMap { resolution: 2048 }; 2]);
    assert_eq!(harness.count(|c| matches!(c, Command::ReleaseTexture(_))), 2);
}

#[test]
fn simple_pipeline_releases_shadows_and_recompiles() {
    let mut harness = Harness::demo(RenderSettings::default());
    harness.frame();
    assert!(harness.renderer.shadows().is_enabled());

    harness.settings.graphics.advanced_render = false;
    let stats = harness.frame();
    assert_eq!(stats.shadow_lifecycle, ShadowLifecycle::Released);
    assert!(stats.cascades.is_empty());
    assert!(stats.shaders_recompiled);
    assert!(!harness.renderer.shadows().is_enabled());

    let stats = harness.frame();
    assert_eq!(stats.shadow_lifecycle, ShadowLifecycle::Unchanged);
    assert!(!stats.shaders_recompiled);
}
