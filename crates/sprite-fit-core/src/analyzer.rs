//! Skeleton analysis: propagate scale through the bone forest over each
//! animation's timeline and record, per attachment, the largest extent it is
//! ever rendered with.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use tracing::instrument;

use crate::index::{normalize_key, ImageIndex};
use crate::report::{
    AnimationReport, AssetUsage, SkeletonAnalysis, DEFAULT_SKIN, SETUP_POSE,
};
use crate::skeleton::{Animation, AttachmentKind, ScaleKey, SkeletonDocument};

/// Timeline sampling rate. Oscillations faster than half this rate can be
/// undersampled; that is a documented limitation, not a bug to work around.
pub const SAMPLE_RATE: f32 = 30.0;

/// Scale-comparison tolerance for skin tie-breaking.
const SCALE_EPSILON: f32 = 1e-4;

/// User-supplied resolution overrides.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Normalized image key -> percentage applied to the raw maximum.
    pub global: HashMap<String, u32>,
    /// Composite keys of per-animation scale overrides; the animation still
    /// reports the usage but it is excluded from global maxima.
    pub local: std::collections::HashSet<String>,
}

impl Overrides {
    /// Composite key for a local (animation, slot, image) override.
    pub fn local_key(animation: &str, slot: &str, image_key: &str) -> String {
        format!("{animation}|{slot}|{image_key}")
    }

    pub fn percentage_for(&self, image_key: &str) -> Option<u32> {
        self.global.get(image_key).copied()
    }
}

/// Per-bone maximum over one animation's samples.
#[derive(Debug, Clone, Copy)]
struct BoneMax {
    /// Absolute magnitudes; sign is a flip, not a size.
    x: f32,
    y: f32,
    /// round(time * 30) of the winning sample.
    frame: u32,
    /// A scale timeline on this bone or an ancestor exists in the animation.
    affected: bool,
}

/// Instantaneous timeline value. Linear between keys; a stepped key holds
/// until the next one. Outside the keyed range the nearest key's value holds.
/// An empty timeline samples as identity.
pub fn sample_scale(keys: &[ScaleKey], t: f32) -> (f32, f32) {
    let Some(first) = keys.first() else {
        return (1.0, 1.0);
    };
    if t <= first.time {
        return (first.x, first.y);
    }
    let last = keys.last().expect("non-empty");
    if t >= last.time {
        return (last.x, last.y);
    }
    for w in keys.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if t >= a.time && t < b.time {
            if a.stepped {
                return (a.x, a.y);
            }
            let span = b.time - a.time;
            if span <= 0.0 {
                return (a.x, a.y);
            }
            let f = (t - a.time) / span;
            return (a.x + (b.x - a.x) * f, a.y + (b.y - a.y) * f);
        }
    }
    (last.x, last.y)
}

fn cumulative_scale(
    doc: &SkeletonDocument,
    keys: &[&[ScaleKey]],
    t: f32,
    idx: usize,
    memo: &mut [Option<(f32, f32)>],
) -> (f32, f32) {
    if let Some(v) = memo[idx] {
        return v;
    }
    let bone = &doc.bones[idx];
    let (px, py) = match bone.parent {
        Some(p) => cumulative_scale(doc, keys, t, p, memo),
        None => (1.0, 1.0),
    };
    let (ax, ay) = sample_scale(keys[idx], t);
    let v = (px * bone.scale_x * ax, py * bone.scale_y * ay);
    memo[idx] = Some(v);
    v
}

/// Sample the animation at the fixed grid plus every scale key time and fold
/// the absolute cumulative scale into a per-bone running maximum.
fn bone_maxima(doc: &SkeletonDocument, anim: Option<&Animation>) -> Vec<BoneMax> {
    let n = doc.bones.len();
    let mut keys: Vec<&[ScaleKey]> = vec![&[]; n];
    if let Some(a) = anim {
        for (bone_name, tl) in a.bones.iter() {
            if let Some(&i) = doc.bone_index.get(bone_name) {
                keys[i] = &tl.scale;
            }
        }
    }

    let mut affected = vec![false; n];
    for i in 0..n {
        let mut cur = Some(i);
        while let Some(c) = cur {
            if !keys[c].is_empty() {
                affected[i] = true;
                break;
            }
            cur = doc.bones[c].parent;
        }
    }

    let mut times: Vec<f32> = vec![0.0];
    if keys.iter().any(|k| !k.is_empty()) {
        let duration = keys
            .iter()
            .flat_map(|k| k.iter())
            .map(|k| k.time)
            .fold(0.0f32, f32::max);
        let frames = (duration * SAMPLE_RATE).ceil() as u32;
        times = (0..=frames).map(|f| f as f32 / SAMPLE_RATE).collect();
        times.extend(keys.iter().flat_map(|k| k.iter()).map(|k| k.time));
        times.sort_by(f32::total_cmp);
        times.dedup_by(|a, b| (*a - *b).abs() < 1e-6);
    }

    let mut best: Vec<Option<BoneMax>> = vec![None; n];
    let mut memo: Vec<Option<(f32, f32)>> = vec![None; n];
    for &t in &times {
        memo.fill(None);
        let frame = (t * SAMPLE_RATE).round() as u32;
        for i in 0..n {
            let (cx, cy) = cumulative_scale(doc, &keys, t, i, &mut memo);
            let (ax, ay) = (cx.abs(), cy.abs());
            let axis = ax.max(ay);
            let replace = match &best[i] {
                None => true,
                Some(b) => axis > b.x.max(b.y) + 1e-6,
            };
            if replace {
                best[i] = Some(BoneMax {
                    x: ax,
                    y: ay,
                    frame,
                    affected: affected[i],
                });
            }
        }
    }
    best.into_iter()
        .map(|b| b.expect("at least one sample"))
        .collect()
}

/// Accumulator for one (slot, image) composite key within one animation.
struct UsageAccum {
    slot: String,
    key: String,
    bone: usize,
    scale_x: f32,
    scale_y: f32,
    frame: u32,
    skin: String,
    scale_timeline: bool,
    seen_in_default: bool,
    effective: (u32, u32),
}

struct AnimationPass<'a> {
    doc: &'a SkeletonDocument,
    index: &'a ImageIndex,
    overrides: &'a Overrides,
    bone_max: Vec<BoneMax>,
    order: Vec<(String, String)>,
    accums: HashMap<(String, String), UsageAccum>,
    missing: &'a mut BTreeSet<String>,
}

impl<'a> AnimationPass<'a> {
    fn contribute(&mut self, slot_idx: usize, attachment_name: &str, skin_name: &str) {
        let slot = &self.doc.slots[slot_idx];
        let Some(skin) = self.doc.skins.iter().find(|s| s.name == skin_name) else {
            return;
        };
        let Some(def) = skin
            .attachments
            .get(&slot.name)
            .and_then(|atts| atts.get(attachment_name))
        else {
            return;
        };
        if !def.kind.is_textured() {
            return;
        }
        let lookup = def.lookup_key(attachment_name);
        let Some(asset) = self.index.find(lookup) else {
            self.missing.insert(normalize_key(lookup));
            return;
        };

        let bm = self.bone_max[slot.bone];
        let sx = bm.x * def.scale_x.abs();
        let sy = bm.y * def.scale_y.abs();
        let axis = sx.max(sy);
        let is_default = skin_name == DEFAULT_SKIN;

        let effective = asset.effective();
        let composite = (slot.name.clone(), asset.key.clone());
        match self.accums.entry(composite) {
            Entry::Vacant(vacant) => {
                self.order.push(vacant.key().clone());
                vacant.insert(UsageAccum {
                    slot: slot.name.clone(),
                    key: asset.key.clone(),
                    bone: slot.bone,
                    scale_x: sx,
                    scale_y: sy,
                    frame: bm.frame,
                    skin: skin_name.to_string(),
                    scale_timeline: bm.affected,
                    seen_in_default: is_default,
                    effective,
                });
            }
            Entry::Occupied(mut occupied) => {
                let acc = occupied.get_mut();
                acc.seen_in_default |= is_default;
                let cur_axis = acc.scale_x.max(acc.scale_y);
                let wins = axis > cur_axis + SCALE_EPSILON
                    || ((axis - cur_axis).abs() <= SCALE_EPSILON
                        && is_default
                        && acc.skin != DEFAULT_SKIN);
                if wins {
                    acc.scale_x = sx;
                    acc.scale_y = sy;
                    acc.frame = bm.frame;
                    acc.skin = skin_name.to_string();
                    acc.scale_timeline = bm.affected;
                }
            }
        }
    }

    fn finish(self, animation_name: &str) -> AnimationReport {
        let mut usages = Vec::with_capacity(self.order.len());
        for composite in &self.order {
            let acc = &self.accums[composite];
            let raw_w = (acc.effective.0 as f64 * acc.scale_x as f64).ceil() as u32;
            let raw_h = (acc.effective.1 as f64 * acc.scale_y as f64).ceil() as u32;
            let (max_width, max_height) = match self.overrides.percentage_for(&acc.key) {
                Some(p) => (
                    (raw_w as f64 * p as f64 / 100.0).ceil() as u32,
                    (raw_h as f64 * p as f64 / 100.0).ceil() as u32,
                ),
                None => (raw_w, raw_h),
            };
            let ignored = self
                .overrides
                .local
                .contains(&Overrides::local_key(animation_name, &acc.slot, &acc.key));
            usages.push(AssetUsage {
                bone_path: self.doc.bone_path(acc.bone),
                slot: acc.slot.clone(),
                key: acc.key.clone(),
                scale_x: acc.scale_x,
                scale_y: acc.scale_y,
                frame: acc.frame,
                skin: acc.skin.clone(),
                scale_timeline: acc.scale_timeline,
                show_skin_label: acc.skin != DEFAULT_SKIN && acc.seen_in_default,
                ignored,
                max_width,
                max_height,
            });
        }
        AnimationReport {
            skeleton: self.doc.name.clone(),
            animation: animation_name.to_string(),
            usages,
        }
    }
}

fn analyze_animation(
    doc: &SkeletonDocument,
    index: &ImageIndex,
    overrides: &Overrides,
    animation_name: &str,
    anim: Option<&Animation>,
    missing: &mut BTreeSet<String>,
) -> AnimationReport {
    let skin_names: Vec<String> = doc.skins.iter().map(|s| s.name.clone()).collect();
    let mut pass = AnimationPass {
        doc,
        index,
        overrides,
        bone_max: bone_maxima(doc, anim),
        order: Vec::new(),
        accums: HashMap::new(),
        missing,
    };

    match anim {
        None => {
            // Setup pose: every slot's setup attachment under every skin.
            for (slot_idx, slot) in doc.slots.iter().enumerate() {
                let Some(att) = slot.attachment.clone() else {
                    continue;
                };
                for skin in &skin_names {
                    pass.contribute(slot_idx, &att, skin);
                }
            }
        }
        Some(a) => {
            // Slots named in attachment timelines contribute every name they
            // ever switch to.
            for (slot_idx, slot) in doc.slots.iter().enumerate() {
                if let Some(tl) = a.slots.get(&slot.name) {
                    for name in tl.attachment_names.iter().flatten() {
                        for skin in &skin_names {
                            pass.contribute(slot_idx, name, skin);
                        }
                    }
                }
            }
            // Slots without attachment keys but touched by any timeline keep
            // their setup attachment on screen. A keyed ancestor bone moves
            // the slot just as much as a keyed own bone does.
            let mut bone_keyed = vec![false; doc.bones.len()];
            for (bone_name, tl) in a.bones.iter() {
                if !tl.scale.is_empty() || tl.has_other_keys {
                    if let Some(&i) = doc.bone_index.get(bone_name) {
                        bone_keyed[i] = true;
                    }
                }
            }
            for (slot_idx, slot) in doc.slots.iter().enumerate() {
                if a.slot_has_attachment_keys(&slot.name) {
                    continue;
                }
                let slot_keyed = a.slots.get(&slot.name).is_some();
                let mut bone_active = false;
                let mut cur = Some(slot.bone);
                while let Some(b) = cur {
                    if bone_keyed[b] {
                        bone_active = true;
                        break;
                    }
                    cur = doc.bones[b].parent;
                }
                if !(slot_keyed || bone_active) {
                    continue;
                }
                let Some(att) = slot.attachment.clone() else {
                    continue;
                };
                for skin in &skin_names {
                    pass.contribute(slot_idx, &att, skin);
                }
            }
        }
    }

    pass.finish(animation_name)
}

/// Analyze one skeleton document against the current image index.
///
/// Pure: the result is a function of the document, the index snapshot and
/// the overrides.
#[instrument(skip_all, fields(skeleton = %doc.name))]
pub fn analyze_skeleton(
    doc: &SkeletonDocument,
    index: &ImageIndex,
    overrides: &Overrides,
) -> SkeletonAnalysis {
    let mut missing = BTreeSet::new();
    // Canonical data is a document-level property: any textured attachment
    // anywhere in the skins lacking declared dimensions sets the flag.
    let canonical_missing = doc.skins.iter().any(|skin| {
        skin.attachments.iter().any(|(_, atts)| {
            atts.iter().any(|(_, def)| {
                def.kind.is_textured() && (def.width.is_none() || def.height.is_none())
            })
        })
    });

    // Clipping masks and path guides reference images without rendering
    // them; their keys are kept out of used/unused accounting entirely.
    let mut clip_path_refs = BTreeSet::new();
    for skin in &doc.skins {
        for (_, atts) in skin.attachments.iter() {
            for (att_name, def) in atts.iter() {
                if matches!(def.kind, AttachmentKind::Clipping | AttachmentKind::Path) {
                    if let Some(asset) = index.find(def.lookup_key(att_name)) {
                        clip_path_refs.insert(asset.key.clone());
                    }
                }
            }
        }
    }

    let mut animations = Vec::with_capacity(doc.animations.0.len() + 1);
    animations.push(analyze_animation(
        doc,
        index,
        overrides,
        SETUP_POSE,
        None,
        &mut missing,
    ));
    for (name, anim) in doc.animations.iter() {
        animations.push(analyze_animation(
            doc,
            index,
            overrides,
            name,
            Some(anim),
            &mut missing,
        ));
    }

    let mut skins: Vec<String> = doc.skins.iter().map(|s| s.name.clone()).collect();
    skins.sort();
    skins.dedup();
    let mut events = doc.events.clone();
    events.sort();

    SkeletonAnalysis {
        skeleton: doc.name.clone(),
        animations,
        missing_images: missing.into_iter().collect(),
        clip_path_refs: clip_path_refs.into_iter().collect(),
        skins,
        events,
        control_bones: doc.control_bones(),
        canonical_data_missing: canonical_missing,
    }
}
