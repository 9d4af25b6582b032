//! Skeleton document parsing.
//!
//! The input is a JSON tree with `bones`, `slots`, `skins` and `animations`
//! sections. Raw serde types mirror the on-disk shape; [`SkeletonDocument`]
//! is the compiled form the analyzer consumes: parents resolved to indices,
//! the bone graph validated as a forest, map sections kept in document order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::{Result, SpriteFitError};

/// A JSON object deserialized into a vector so entry order survives.
/// Enumeration order in reports follows input order, so the usual map
/// types are not an option here.
#[derive(Debug, Clone)]
pub struct Ordered<T>(pub Vec<(String, T)>);

impl<T> Default for Ordered<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Ordered<T> {
    pub fn get(&self, key: &str) -> Option<&T> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
    pub fn iter(&self) -> impl Iterator<Item = &(String, T)> {
        self.0.iter()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Ordered<T> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor<T>(PhantomData<T>);
        impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
            type Value = Ordered<T>;
            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object")
            }
            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut out = Vec::new();
                while let Some((k, v)) = map.next_entry::<String, T>()? {
                    out.push((k, v));
                }
                Ok(Ordered(out))
            }
        }
        d.deserialize_map(OrderedVisitor(PhantomData))
    }
}

fn one() -> f32 {
    1.0
}

// ---------- raw (on-disk) shapes ----------

#[derive(Debug, Clone, Deserialize)]
struct RawDocument {
    #[serde(default)]
    bones: Vec<RawBone>,
    #[serde(default)]
    slots: Vec<RawSlot>,
    #[serde(default)]
    skins: RawSkins,
    #[serde(default)]
    animations: Ordered<RawAnimation>,
    #[serde(default)]
    events: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawBone {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(rename = "scaleX", default = "one")]
    scale_x: f32,
    #[serde(rename = "scaleY", default = "one")]
    scale_y: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSlot {
    name: String,
    bone: String,
    #[serde(default)]
    attachment: Option<String>,
}

/// Skins come in two shapes: a list of `{name, attachments}` entries, or the
/// legacy object keyed by skin name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawSkins {
    List(Vec<RawSkinEntry>),
    Map(Ordered<Ordered<Ordered<RawAttachment>>>),
}

impl Default for RawSkins {
    fn default() -> Self {
        RawSkins::List(Vec::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawSkinEntry {
    name: String,
    #[serde(default)]
    attachments: Ordered<Ordered<RawAttachment>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAttachment {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(rename = "scaleX", default = "one")]
    scale_x: f32,
    #[serde(rename = "scaleY", default = "one")]
    scale_y: f32,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    height: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAnimation {
    #[serde(default)]
    slots: Ordered<RawSlotTimeline>,
    #[serde(default)]
    bones: Ordered<RawBoneTimeline>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSlotTimeline {
    #[serde(default)]
    attachment: Vec<RawAttachmentKey>,
    #[serde(flatten)]
    other: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAttachmentKey {
    #[serde(default)]
    #[allow(dead_code)]
    time: f32,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawBoneTimeline {
    #[serde(default)]
    scale: Vec<RawScaleKey>,
    #[serde(flatten)]
    other: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawScaleKey {
    #[serde(default)]
    time: f32,
    #[serde(default = "one")]
    x: f32,
    #[serde(default = "one")]
    y: f32,
    #[serde(default)]
    curve: Option<serde_json::Value>,
}

// ---------- compiled shapes ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Region,
    Mesh,
    Clipping,
    Path,
    BoundingBox,
}

impl AttachmentKind {
    fn from_raw(s: Option<&str>) -> Self {
        match s {
            None | Some("region") => AttachmentKind::Region,
            Some("mesh") | Some("linkedmesh") | Some("skinnedmesh") => AttachmentKind::Mesh,
            Some("clipping") => AttachmentKind::Clipping,
            Some("path") => AttachmentKind::Path,
            _ => AttachmentKind::BoundingBox,
        }
    }

    /// Only regions and meshes reference pixels.
    pub fn is_textured(self) -> bool {
        matches!(self, AttachmentKind::Region | AttachmentKind::Mesh)
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentDef {
    /// Image lookup key; falls back to the attachment name when absent.
    pub path: Option<String>,
    pub kind: AttachmentKind,
    pub scale_x: f32,
    pub scale_y: f32,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl AttachmentDef {
    /// The image-lookup key for this attachment.
    pub fn lookup_key<'a>(&'a self, attachment_name: &'a str) -> &'a str {
        self.path.as_deref().unwrap_or(attachment_name)
    }
}

#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub scale_x: f32,
    pub scale_y: f32,
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub name: String,
    pub bone: usize,
    pub attachment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Skin {
    pub name: String,
    /// slot name -> (attachment name -> def), both levels in document order.
    pub attachments: Ordered<Ordered<AttachmentDef>>,
}

#[derive(Debug, Clone, Copy)]
pub struct ScaleKey {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    /// `curve: "stepped"`: hold this key's value until the next key.
    pub stepped: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SlotTimeline {
    pub attachment_names: Vec<Option<String>>,
    /// The slot carries keys other than attachment switches (color etc.).
    pub has_other_keys: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BoneTimeline {
    /// Scale keys sorted by time.
    pub scale: Vec<ScaleKey>,
    /// Translate/rotate/shear keys exist (not interpreted, but they mark the
    /// bone as active in the animation).
    pub has_other_keys: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Animation {
    pub slots: Ordered<SlotTimeline>,
    pub bones: Ordered<BoneTimeline>,
}

impl Animation {
    /// True when the named slot has at least one attachment key here.
    pub fn slot_has_attachment_keys(&self, slot: &str) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|tl| !tl.attachment_names.is_empty())
    }
}

/// One logical project: the compiled skeleton description.
#[derive(Debug, Clone)]
pub struct SkeletonDocument {
    /// Identifier, usually the source file stem.
    pub name: String,
    pub bones: Vec<Bone>,
    pub bone_index: HashMap<String, usize>,
    pub slots: Vec<Slot>,
    pub skins: Vec<Skin>,
    pub animations: Ordered<Animation>,
    pub events: Vec<String>,
}

impl SkeletonDocument {
    /// Parse and compile a skeleton JSON document.
    ///
    /// Fails on malformed JSON, unknown bone references and bone-graph
    /// cycles; a rejected document must not poison sibling documents, so all
    /// errors come back as [`SpriteFitError::MalformedSkeleton`].
    pub fn parse(name: &str, bytes: &[u8]) -> Result<Self> {
        let raw: RawDocument =
            serde_json::from_slice(bytes).map_err(|e| SpriteFitError::MalformedSkeleton {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        compile(name, raw)
    }

    /// Root-to-bone names joined with `/`, e.g. `root/arm/hand`.
    pub fn bone_path(&self, mut idx: usize) -> String {
        let mut parts = vec![self.bones[idx].name.as_str()];
        while let Some(p) = self.bones[idx].parent {
            parts.push(self.bones[p].name.as_str());
            idx = p;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Setup-pose cumulative scale of a bone: the product of setup scales
    /// down the parent chain.
    pub fn setup_cumulative_scale(&self, idx: usize) -> (f32, f32) {
        let mut sx = self.bones[idx].scale_x;
        let mut sy = self.bones[idx].scale_y;
        let mut cur = idx;
        while let Some(p) = self.bones[cur].parent {
            sx *= self.bones[p].scale_x;
            sy *= self.bones[p].scale_y;
            cur = p;
        }
        (sx, sy)
    }

    /// Bones whose name marks them as rig controls.
    pub fn control_bones(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .bones
            .iter()
            .filter(|b| b.name.starts_with("ctrl_"))
            .map(|b| b.name.clone())
            .collect();
        out.sort();
        out
    }
}

fn malformed(name: &str, reason: impl Into<String>) -> SpriteFitError {
    SpriteFitError::MalformedSkeleton {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn compile(name: &str, raw: RawDocument) -> Result<SkeletonDocument> {
    let mut bone_index = HashMap::with_capacity(raw.bones.len());
    for (i, b) in raw.bones.iter().enumerate() {
        if bone_index.insert(b.name.clone(), i).is_some() {
            return Err(malformed(name, format!("duplicate bone '{}'", b.name)));
        }
    }

    let mut bones = Vec::with_capacity(raw.bones.len());
    for b in &raw.bones {
        let parent = match &b.parent {
            Some(p) => Some(
                *bone_index
                    .get(p)
                    .ok_or_else(|| malformed(name, format!("unknown parent bone '{p}'")))?,
            ),
            None => None,
        };
        bones.push(Bone {
            name: b.name.clone(),
            parent,
            scale_x: b.scale_x,
            scale_y: b.scale_y,
        });
    }

    // The bone graph must be a forest; walk each parent chain with a step
    // budget to reject cycles.
    for (i, bone) in bones.iter().enumerate() {
        let mut cur = bone.parent;
        let mut steps = 0usize;
        while let Some(p) = cur {
            steps += 1;
            if steps > bones.len() {
                return Err(malformed(
                    name,
                    format!("bone hierarchy cycle involving '{}'", bones[i].name),
                ));
            }
            cur = bones[p].parent;
        }
    }

    let mut slots = Vec::with_capacity(raw.slots.len());
    for s in &raw.slots {
        let bone = *bone_index
            .get(&s.bone)
            .ok_or_else(|| malformed(name, format!("slot '{}' references unknown bone '{}'", s.name, s.bone)))?;
        slots.push(Slot {
            name: s.name.clone(),
            bone,
            attachment: s.attachment.clone(),
        });
    }

    let skins = match raw.skins {
        RawSkins::List(entries) => entries
            .into_iter()
            .map(|e| Skin {
                name: e.name,
                attachments: compile_skin_attachments(e.attachments),
            })
            .collect(),
        RawSkins::Map(map) => map
            .0
            .into_iter()
            .map(|(skin_name, atts)| Skin {
                name: skin_name,
                attachments: compile_skin_attachments(atts),
            })
            .collect(),
    };

    let animations = Ordered(
        raw.animations
            .0
            .into_iter()
            .map(|(anim_name, a)| (anim_name, compile_animation(a)))
            .collect(),
    );

    Ok(SkeletonDocument {
        name: name.to_string(),
        bones,
        bone_index,
        slots,
        skins,
        animations,
        events: raw.events.into_keys().collect(),
    })
}

fn compile_skin_attachments(
    raw: Ordered<Ordered<RawAttachment>>,
) -> Ordered<Ordered<AttachmentDef>> {
    Ordered(
        raw.0
            .into_iter()
            .map(|(slot, atts)| {
                let defs = atts
                    .0
                    .into_iter()
                    .map(|(att_name, a)| {
                        let def = AttachmentDef {
                            path: a.path,
                            kind: AttachmentKind::from_raw(a.kind.as_deref()),
                            scale_x: a.scale_x,
                            scale_y: a.scale_y,
                            width: a.width.map(|v| v.round().max(0.0) as u32),
                            height: a.height.map(|v| v.round().max(0.0) as u32),
                        };
                        (att_name, def)
                    })
                    .collect();
                (slot, Ordered(defs))
            })
            .collect(),
    )
}

fn compile_animation(raw: RawAnimation) -> Animation {
    let slots = Ordered(
        raw.slots
            .0
            .into_iter()
            .map(|(slot, tl)| {
                let compiled = SlotTimeline {
                    attachment_names: tl.attachment_keys_names(),
                    has_other_keys: !tl.other.is_empty(),
                };
                (slot, compiled)
            })
            .collect(),
    );
    let bones = Ordered(
        raw.bones
            .0
            .into_iter()
            .map(|(bone, tl)| {
                let mut scale: Vec<ScaleKey> = tl
                    .scale
                    .iter()
                    .map(|k| ScaleKey {
                        time: k.time,
                        x: k.x,
                        y: k.y,
                        stepped: matches!(&k.curve, Some(serde_json::Value::String(s)) if s == "stepped"),
                    })
                    .collect();
                scale.sort_by(|a, b| a.time.total_cmp(&b.time));
                let compiled = BoneTimeline {
                    scale,
                    has_other_keys: !tl.other.is_empty(),
                };
                (bone, compiled)
            })
            .collect(),
    );
    Animation { slots, bones }
}

impl RawSlotTimeline {
    fn attachment_keys_names(&self) -> Vec<Option<String>> {
        self.attachment.iter().map(|k| k.name.clone()).collect()
    }
}
