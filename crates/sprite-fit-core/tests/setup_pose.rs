use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use sprite_fit_core::pipeline::Project;
use sprite_fit_core::report::SETUP_POSE;

fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 255]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn single_asset_without_scaling() {
    let json = br#"{
        "bones": [{"name": "root"}],
        "slots": [{"name": "hero", "bone": "root", "attachment": "hero"}],
        "skins": [{"name": "default", "attachments": {"hero": {"hero": {"width": 512, "height": 512}}}}],
        "animations": {"idle": {"slots": {"hero": {"attachment": [{"time": 0, "name": "hero"}]}}}}
    }"#;
    let mut project = Project::new();
    project.ingest_image("hero.png", png_bytes(512, 512)).unwrap();
    project.ingest_skeleton("hero", json).unwrap();
    project.finish_ingest();

    let report = project.analyze();
    assert_eq!(report.stats.len(), 1);
    let stat = &report.stats[0];
    assert_eq!(stat.key, "hero.png");
    assert_eq!(stat.max_render, (512, 512));
    assert_eq!(stat.frame, 0);
    assert_eq!(stat.source_animation, "idle");
    assert!(report.unused.is_empty());
    assert!(report.missing_images.is_empty());

    let tasks = project.plan(&report, 0);
    assert_eq!(tasks.len(), 1);
    assert!(!tasks[0].is_resize);
    assert_eq!(tasks[0].target, (512, 512));
    assert_eq!(tasks[0].reduction, 0.0);
}

#[test]
fn setup_pose_never_displaces_an_animation() {
    // Setup renders the sprite at 3x; the only animation shrinks it to 1.5x.
    // The global stat must come from the animation, not from setup.
    let json = br#"{
        "bones": [{"name": "root", "scaleX": 3, "scaleY": 3}],
        "slots": [{"name": "a", "bone": "root", "attachment": "img"}],
        "skins": [{"name": "default", "attachments": {"a": {"img": {"width": 64, "height": 64}}}}],
        "animations": {"idle": {"bones": {"root": {"scale": [{"time": 0, "x": 0.5, "y": 0.5}]}}}}
    }"#;
    let mut project = Project::new();
    project.ingest_image("img.png", png_bytes(64, 64)).unwrap();
    project.ingest_skeleton("s3", json).unwrap();
    project.finish_ingest();

    let report = project.analyze();
    let stat = &report.stats[0];
    assert_eq!(stat.source_animation, "idle");
    assert_eq!(stat.max_render.0, 96); // ceil(64 * 1.5), not 192
    assert_eq!(stat.max_render.1, 96);

    // The setup-pose report itself still shows the 3x observation.
    let setup = report
        .animations
        .iter()
        .find(|r| r.animation == SETUP_POSE)
        .unwrap();
    assert_eq!(setup.usages[0].max_width, 192);
}

#[test]
fn setup_pose_covers_images_no_animation_touches() {
    let json = br#"{
        "bones": [{"name": "root", "scaleX": 2, "scaleY": 2}],
        "slots": [{"name": "a", "bone": "root", "attachment": "img"}],
        "skins": [{"name": "default", "attachments": {"a": {"img": {"width": 32, "height": 32}}}}],
        "animations": {}
    }"#;
    let mut project = Project::new();
    project.ingest_image("img.png", png_bytes(32, 32)).unwrap();
    project.ingest_skeleton("only-setup", json).unwrap();
    project.finish_ingest();

    let report = project.analyze();
    let stat = &report.stats[0];
    assert_eq!(stat.source_animation, SETUP_POSE);
    assert_eq!(stat.max_render, (64, 64));
}

#[test]
fn local_override_excludes_animation_from_global_maxima() {
    let json = br#"{
        "bones": [{"name": "root"}],
        "slots": [{"name": "a", "bone": "root", "attachment": "img"}],
        "skins": [{"name": "default", "attachments": {"a": {"img": {"width": 50, "height": 50}}}}],
        "animations": {
            "big": {"bones": {"root": {"scale": [{"time": 0, "x": 4, "y": 4}]}}},
            "small": {"bones": {"root": {"scale": [{"time": 0, "x": 2, "y": 2}]}}}
        }
    }"#;
    let mut project = Project::new();
    project.ingest_image("img.png", png_bytes(50, 50)).unwrap();
    project.ingest_skeleton("ovr", json).unwrap();
    project.finish_ingest();

    // Without the override, "big" wins.
    let report = project.analyze();
    assert_eq!(report.stats[0].source_animation, "big");
    assert_eq!(report.stats[0].max_render, (200, 200));

    // Locally overriding "big" leaves "small" as the global source, but the
    // usage itself is still reported, flagged as ignored.
    project
        .overrides
        .local
        .insert(sprite_fit_core::analyzer::Overrides::local_key(
            "big", "a", "img.png",
        ));
    let report = project.analyze();
    assert_eq!(report.stats[0].source_animation, "small");
    assert_eq!(report.stats[0].max_render, (100, 100));
    let big = report
        .animations
        .iter()
        .find(|r| r.animation == "big")
        .unwrap();
    assert!(big.usages[0].ignored);
}

#[test]
fn global_override_percentage_rescales_targets() {
    let json = br#"{
        "bones": [{"name": "root"}],
        "slots": [{"name": "a", "bone": "root", "attachment": "img"}],
        "skins": [{"name": "default", "attachments": {"a": {"img": {"width": 100, "height": 100}}}}],
        "animations": {"idle": {"slots": {"a": {"attachment": [{"time": 0, "name": "img"}]}}}}
    }"#;
    let mut project = Project::new();
    project.ingest_image("img.png", png_bytes(100, 100)).unwrap();
    project.ingest_skeleton("pct", json).unwrap();
    project.finish_ingest();
    project.overrides.global.insert("img.png".into(), 50);

    let report = project.analyze();
    let stat = &report.stats[0];
    assert_eq!(stat.max_render, (50, 50));
    assert_eq!(stat.override_pct, Some(50));
}
