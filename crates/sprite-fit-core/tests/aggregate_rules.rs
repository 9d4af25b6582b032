use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use sprite_fit_core::aggregate::aggregate;
use sprite_fit_core::analyzer::Overrides;
use sprite_fit_core::index::ImageIndex;
use sprite_fit_core::report::{
    AnimationReport, AssetUsage, SkeletonAnalysis, SETUP_POSE,
};

fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(w, h, Rgba([7, 7, 7, 255]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn usage(key: &str, w: u32, h: u32, skin: &str) -> AssetUsage {
    AssetUsage {
        bone_path: "root".into(),
        slot: "s".into(),
        key: key.into(),
        scale_x: 1.0,
        scale_y: 1.0,
        frame: 0,
        skin: skin.into(),
        scale_timeline: false,
        show_skin_label: false,
        ignored: false,
        max_width: w,
        max_height: h,
    }
}

fn analysis(skeleton: &str, animations: Vec<AnimationReport>) -> SkeletonAnalysis {
    SkeletonAnalysis {
        skeleton: skeleton.into(),
        animations,
        missing_images: vec![],
        clip_path_refs: vec![],
        skins: vec!["default".into()],
        events: vec![],
        control_bones: vec![],
        canonical_data_missing: false,
    }
}

fn report(skeleton: &str, animation: &str, usages: Vec<AssetUsage>) -> AnimationReport {
    AnimationReport {
        skeleton: skeleton.into(),
        animation: animation.into(),
        usages,
    }
}

#[test]
fn larger_area_wins_within_a_skeleton() {
    let mut index = ImageIndex::new();
    index.add_image("img.png", png_bytes(64, 64)).unwrap();
    let a = analysis(
        "s",
        vec![
            report("s", "small", vec![usage("img.png", 10, 10, "default")]),
            report("s", "big", vec![usage("img.png", 40, 40, "default")]),
        ],
    );
    let merged = aggregate(&[a], &index, &Overrides::default());
    assert_eq!(merged.stats.len(), 1);
    assert_eq!(merged.stats[0].source_animation, "big");
    assert_eq!(merged.stats[0].max_render, (40, 40));
}

#[test]
fn equal_area_prefers_the_non_default_skin() {
    let mut index = ImageIndex::new();
    index.add_image("img.png", png_bytes(64, 64)).unwrap();
    let a = analysis(
        "s",
        vec![
            report("s", "one", vec![usage("img.png", 30, 30, "default")]),
            report("s", "two", vec![usage("img.png", 30, 30, "armored")]),
            report("s", "three", vec![usage("img.png", 30, 30, "default")]),
        ],
    );
    let merged = aggregate(&[a], &index, &Overrides::default());
    assert_eq!(merged.stats[0].skin, "armored");
    assert_eq!(merged.stats[0].source_animation, "two");
}

#[test]
fn setup_pose_only_fills_gaps() {
    let mut index = ImageIndex::new();
    index.add_image("touched.png", png_bytes(64, 64)).unwrap();
    index.add_image("static.png", png_bytes(64, 64)).unwrap();
    let a = analysis(
        "s",
        vec![
            report(
                "s",
                SETUP_POSE,
                vec![
                    usage("touched.png", 60, 60, "default"),
                    usage("static.png", 20, 20, "default"),
                ],
            ),
            report("s", "walk", vec![usage("touched.png", 30, 30, "default")]),
        ],
    );
    let merged = aggregate(&[a], &index, &Overrides::default());
    let touched = merged.stats.iter().find(|s| s.key == "touched.png").unwrap();
    assert_eq!(touched.source_animation, "walk");
    assert_eq!(touched.max_render, (30, 30));
    let st = merged.stats.iter().find(|s| s.key == "static.png").unwrap();
    assert_eq!(st.source_animation, SETUP_POSE);
}

#[test]
fn cross_skeleton_merge_compares_area_only() {
    let mut index = ImageIndex::new();
    index.add_image("img.png", png_bytes(64, 64)).unwrap();
    let first = analysis(
        "alpha",
        vec![report("alpha", "a", vec![usage("img.png", 30, 30, "default")])],
    );
    // Equal area in the second skeleton, non-default skin: the skin
    // tie-break applies only within one skeleton, so the earlier record
    // stays.
    let second = analysis(
        "beta",
        vec![report("beta", "b", vec![usage("img.png", 30, 30, "fancy")])],
    );
    let merged = aggregate(&[first.clone(), second.clone()], &index, &Overrides::default());
    assert_eq!(merged.stats[0].source_skeleton, "alpha");

    // A strictly larger record in the second skeleton does win.
    let bigger = analysis(
        "beta",
        vec![report("beta", "b", vec![usage("img.png", 31, 31, "fancy")])],
    );
    let merged = aggregate(&[first, bigger], &index, &Overrides::default());
    assert_eq!(merged.stats[0].source_skeleton, "beta");
}

#[test]
fn used_unused_and_page_backings_partition_the_index() {
    let mut index = ImageIndex::new();
    index.add_image("used.png", png_bytes(8, 8)).unwrap();
    index.add_image("orphan.png", png_bytes(8, 8)).unwrap();
    index.add_image("sprites.png", png_bytes(8, 8)).unwrap();
    index.add_page_name("sprites.png");

    let a = analysis(
        "s",
        vec![report("s", "anim", vec![usage("used.png", 8, 8, "default")])],
    );
    let merged = aggregate(&[a], &index, &Overrides::default());
    assert_eq!(merged.unused, ["orphan.png"]);

    let used: Vec<&str> = merged.stats.iter().map(|s| s.key.as_str()).collect();
    let mut all: Vec<&str> = used.clone();
    all.extend(merged.unused.iter().map(|s| s.as_str()));
    all.push("sprites.png");
    all.sort();
    let mut keys: Vec<&str> = index.keys().collect();
    keys.sort();
    assert_eq!(all, keys);
}

#[test]
fn clip_path_references_stay_out_of_the_unused_set() {
    let mut index = ImageIndex::new();
    index.add_image("mask.png", png_bytes(8, 8)).unwrap();
    index.add_image("orphan.png", png_bytes(8, 8)).unwrap();

    let mut a = analysis("s", vec![]);
    a.clip_path_refs = vec!["mask.png".into()];
    let merged = aggregate(&[a], &index, &Overrides::default());
    assert!(merged.stats.is_empty());
    assert_eq!(merged.unused, ["orphan.png"]);
}

#[test]
fn report_level_lists_are_merged_and_sorted() {
    let index = ImageIndex::new();
    let mut a = analysis("a", vec![]);
    a.skins = vec!["default".into(), "red".into()];
    a.events = vec!["step".into()];
    a.control_bones = vec!["ctrl_b".into()];
    let mut b = analysis("b", vec![]);
    b.skins = vec!["blue".into(), "default".into()];
    b.events = vec!["jump".into()];
    b.control_bones = vec!["ctrl_a".into()];
    b.canonical_data_missing = true;

    let merged = aggregate(&[a, b], &index, &Overrides::default());
    assert_eq!(merged.skins, ["blue", "default", "red"]);
    assert_eq!(merged.events, ["jump", "step"]);
    assert_eq!(merged.control_bones, ["ctrl_a", "ctrl_b"]);
    assert!(merged.canonical_data_missing);
}
