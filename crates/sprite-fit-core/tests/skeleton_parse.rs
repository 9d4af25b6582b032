use sprite_fit_core::error::SpriteFitError;
use sprite_fit_core::skeleton::SkeletonDocument;

#[test]
fn parses_minimal_document() {
    let json = br#"{
        "bones": [{"name": "root"}, {"name": "arm", "parent": "root", "scaleX": 2}],
        "slots": [{"name": "hand", "bone": "arm", "attachment": "hand"}],
        "skins": [{"name": "default", "attachments": {"hand": {"hand": {"width": 64, "height": 64}}}}],
        "animations": {"idle": {"slots": {"hand": {"attachment": [{"time": 0, "name": "hand"}]}}}}
    }"#;
    let doc = SkeletonDocument::parse("hero", json).unwrap();
    assert_eq!(doc.bones.len(), 2);
    assert_eq!(doc.bones[1].parent, Some(0));
    assert_eq!(doc.setup_cumulative_scale(1), (2.0, 1.0));
    assert_eq!(doc.bone_path(1), "root/arm");
    assert_eq!(doc.animations.0.len(), 1);
    let def = doc.skins[0]
        .attachments
        .get("hand")
        .and_then(|atts| atts.get("hand"))
        .unwrap();
    assert_eq!(def.width, Some(64));
    assert!(def.kind.is_textured());
}

#[test]
fn legacy_skin_map_is_accepted_in_order() {
    let json = br#"{
        "bones": [{"name": "root"}],
        "slots": [{"name": "a", "bone": "root"}],
        "skins": {"default": {"a": {"img": {}}}, "alt": {"a": {"img2": {}}}},
        "animations": {}
    }"#;
    let doc = SkeletonDocument::parse("legacy", json).unwrap();
    assert_eq!(doc.skins.len(), 2);
    assert_eq!(doc.skins[0].name, "default");
    assert_eq!(doc.skins[1].name, "alt");
}

#[test]
fn animation_order_follows_document_order() {
    let json = br#"{
        "bones": [{"name": "root"}],
        "slots": [],
        "skins": [],
        "animations": {"zeta": {}, "alpha": {}, "mid": {}}
    }"#;
    let doc = SkeletonDocument::parse("anims", json).unwrap();
    let names: Vec<&str> = doc.animations.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["zeta", "alpha", "mid"]);
}

#[test]
fn bone_cycle_is_rejected() {
    let json = br#"{
        "bones": [{"name": "a", "parent": "b"}, {"name": "b", "parent": "a"}],
        "slots": [], "skins": [], "animations": {}
    }"#;
    let err = SkeletonDocument::parse("bad", json).unwrap_err();
    assert!(matches!(err, SpriteFitError::MalformedSkeleton { .. }));
}

#[test]
fn unknown_parent_is_rejected() {
    let json = br#"{
        "bones": [{"name": "a", "parent": "ghost"}],
        "slots": [], "skins": [], "animations": {}
    }"#;
    assert!(SkeletonDocument::parse("bad", json).is_err());
}

#[test]
fn unknown_slot_bone_is_rejected() {
    let json = br#"{
        "bones": [{"name": "a"}],
        "slots": [{"name": "s", "bone": "ghost"}],
        "skins": [], "animations": {}
    }"#;
    assert!(SkeletonDocument::parse("bad", json).is_err());
}

#[test]
fn garbage_json_is_rejected() {
    assert!(SkeletonDocument::parse("bad", b"{not json").is_err());
}

#[test]
fn stepped_curve_marker_survives_compilation() {
    let json = br#"{
        "bones": [{"name": "root"}],
        "slots": [],
        "skins": [],
        "animations": {"a": {"bones": {"root": {"scale": [
            {"time": 1, "x": 4, "y": 4},
            {"time": 0, "x": 1, "y": 1, "curve": "stepped"}
        ]}}}}
    }"#;
    let doc = SkeletonDocument::parse("s", json).unwrap();
    let (_, anim) = &doc.animations.0[0];
    let tl = anim.bones.get("root").unwrap();
    // keys come back sorted by time
    assert_eq!(tl.scale[0].time, 0.0);
    assert!(tl.scale[0].stepped);
    assert!(!tl.scale[1].stepped);
}

#[test]
fn bezier_curves_are_treated_as_linear() {
    let json = br#"{
        "bones": [{"name": "root"}],
        "slots": [],
        "skins": [],
        "animations": {"a": {"bones": {"root": {"scale": [
            {"time": 0, "x": 1, "y": 1, "curve": [0.25, 0, 0.75, 1]},
            {"time": 1, "x": 2, "y": 2}
        ]}}}}
    }"#;
    let doc = SkeletonDocument::parse("s", json).unwrap();
    let (_, anim) = &doc.animations.0[0];
    let tl = anim.bones.get("root").unwrap();
    assert!(!tl.scale[0].stepped);
}

#[test]
fn non_textured_kinds_are_classified() {
    let json = br#"{
        "bones": [{"name": "root"}],
        "slots": [{"name": "s", "bone": "root"}],
        "skins": [{"name": "default", "attachments": {"s": {
            "cut": {"type": "clipping"},
            "rail": {"type": "path"},
            "box": {"type": "boundingbox"},
            "cloth": {"type": "mesh", "width": 10, "height": 10}
        }}}],
        "animations": {}
    }"#;
    let doc = SkeletonDocument::parse("kinds", json).unwrap();
    let atts = doc.skins[0].attachments.get("s").unwrap();
    assert!(!atts.get("cut").unwrap().kind.is_textured());
    assert!(!atts.get("rail").unwrap().kind.is_textured());
    assert!(!atts.get("box").unwrap().kind.is_textured());
    assert!(atts.get("cloth").unwrap().kind.is_textured());
}

#[test]
fn control_bones_are_collected_sorted() {
    let json = br#"{
        "bones": [{"name": "root"}, {"name": "ctrl_z", "parent": "root"}, {"name": "ctrl_a", "parent": "root"}],
        "slots": [], "skins": [], "animations": {}
    }"#;
    let doc = SkeletonDocument::parse("ctl", json).unwrap();
    assert_eq!(doc.control_bones(), ["ctrl_a", "ctrl_z"]);
}
