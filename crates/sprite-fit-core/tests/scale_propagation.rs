use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use sprite_fit_core::analyzer::{analyze_skeleton, sample_scale, Overrides};
use sprite_fit_core::index::ImageIndex;
use sprite_fit_core::report::AnimationReport;
use sprite_fit_core::skeleton::{ScaleKey, SkeletonDocument};

fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(w, h, Rgba([200, 100, 50, 255]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn animation<'a>(reports: &'a [AnimationReport], name: &str) -> &'a AnimationReport {
    reports.iter().find(|r| r.animation == name).unwrap()
}

#[test]
fn parent_scale_keyframe_drives_child_attachment() {
    // root scales linearly from 1 to 2 over one second; the hand slot sits on
    // `arm` and is carried along via the implicit-slot rule.
    let json = br#"{
        "bones": [{"name": "root"}, {"name": "arm", "parent": "root"}],
        "slots": [{"name": "hand", "bone": "arm", "attachment": "hand"}],
        "skins": [{"name": "default", "attachments": {"hand": {"hand": {"width": 100, "height": 100}}}}],
        "animations": {"grow": {"bones": {"root": {"scale": [
            {"time": 0, "x": 1, "y": 1},
            {"time": 1, "x": 2, "y": 2}
        ]}}}}
    }"#;
    let doc = SkeletonDocument::parse("s2", json).unwrap();
    let mut index = ImageIndex::new();
    index.add_image("hand.png", png_bytes(100, 100)).unwrap();

    let analysis = analyze_skeleton(&doc, &index, &Overrides::default());
    let grow = animation(&analysis.animations, "grow");
    assert_eq!(grow.usages.len(), 1);
    let usage = &grow.usages[0];
    assert_eq!(usage.key, "hand.png");
    assert_eq!(usage.max_width, 200);
    assert_eq!(usage.max_height, 200);
    assert_eq!(usage.frame, 30);
    assert!(usage.scale_timeline);
    assert_eq!(usage.bone_path, "root/arm");
}

#[test]
fn stepped_key_holds_until_next_key() {
    let keys = vec![
        ScaleKey {
            time: 0.0,
            x: 1.0,
            y: 1.0,
            stepped: true,
        },
        ScaleKey {
            time: 1.0,
            x: 4.0,
            y: 4.0,
            stepped: false,
        },
    ];
    assert_eq!(sample_scale(&keys, 0.5), (1.0, 1.0));
    assert_eq!(sample_scale(&keys, 0.999), (1.0, 1.0));
    assert_eq!(sample_scale(&keys, 1.0), (4.0, 4.0));
}

#[test]
fn linear_interpolation_between_keys() {
    let keys = vec![
        ScaleKey {
            time: 0.0,
            x: 1.0,
            y: 2.0,
            stepped: false,
        },
        ScaleKey {
            time: 2.0,
            x: 3.0,
            y: 4.0,
            stepped: false,
        },
    ];
    let (x, y) = sample_scale(&keys, 1.0);
    assert!((x - 2.0).abs() < 1e-6);
    assert!((y - 3.0).abs() < 1e-6);
    // outside the keyed range the nearest key holds
    assert_eq!(sample_scale(&keys, -1.0), (1.0, 2.0));
    assert_eq!(sample_scale(&keys, 5.0), (3.0, 4.0));
}

#[test]
fn stepped_dip_still_reaches_final_key() {
    let json = br#"{
        "bones": [{"name": "root"}],
        "slots": [{"name": "s", "bone": "root", "attachment": "img"}],
        "skins": [{"name": "default", "attachments": {"s": {"img": {"width": 10, "height": 10}}}}],
        "animations": {"step": {"bones": {"root": {"scale": [
            {"time": 0, "x": 1, "y": 1, "curve": "stepped"},
            {"time": 1, "x": 4, "y": 4}
        ]}}}}
    }"#;
    let doc = SkeletonDocument::parse("s4", json).unwrap();
    let mut index = ImageIndex::new();
    index.add_image("img.png", png_bytes(10, 10)).unwrap();

    let analysis = analyze_skeleton(&doc, &index, &Overrides::default());
    let step = animation(&analysis.animations, "step");
    let usage = &step.usages[0];
    assert!((usage.scale_x - 4.0).abs() < 1e-5);
    assert_eq!(usage.frame, 30);
    assert_eq!(usage.max_width, 40);
}

#[test]
fn unanimated_bone_reports_exact_setup_cumulative() {
    // Negative setup scale: magnitude 2 * 1.5 = 3, sign is only a flip. The
    // translate timeline activates the slot without touching scale.
    let json = br#"{
        "bones": [{"name": "root", "scaleX": -2, "scaleY": 1},
                   {"name": "arm", "parent": "root", "scaleX": 1.5, "scaleY": 1}],
        "slots": [{"name": "s", "bone": "arm", "attachment": "img"}],
        "skins": [{"name": "default", "attachments": {"s": {"img": {"width": 10, "height": 10}}}}],
        "animations": {"wave": {"bones": {"root": {"translate": [{"time": 0, "x": 5}]}}}}
    }"#;
    let doc = SkeletonDocument::parse("setup", json).unwrap();
    let mut index = ImageIndex::new();
    index.add_image("img.png", png_bytes(10, 10)).unwrap();

    let analysis = analyze_skeleton(&doc, &index, &Overrides::default());
    let wave = animation(&analysis.animations, "wave");
    let usage = &wave.usages[0];
    assert_eq!(usage.scale_x, 3.0);
    assert_eq!(usage.scale_y, 1.0);
    assert_eq!(usage.frame, 0);
    assert!(!usage.scale_timeline);
}

#[test]
fn attachment_scale_multiplies_bone_scale() {
    let json = br#"{
        "bones": [{"name": "root", "scaleX": 2, "scaleY": 2}],
        "slots": [{"name": "s", "bone": "root", "attachment": "img"}],
        "skins": [{"name": "default", "attachments": {"s": {"img": {"scaleX": 0.5, "scaleY": 3, "width": 100, "height": 100}}}}],
        "animations": {}
    }"#;
    let doc = SkeletonDocument::parse("att", json).unwrap();
    let mut index = ImageIndex::new();
    index.add_image("img.png", png_bytes(100, 100)).unwrap();

    let analysis = analyze_skeleton(&doc, &index, &Overrides::default());
    let setup = animation(&analysis.animations, "Setup Pose");
    let usage = &setup.usages[0];
    assert_eq!(usage.max_width, 100); // 100 * 2 * 0.5
    assert_eq!(usage.max_height, 600); // 100 * 2 * 3
}
