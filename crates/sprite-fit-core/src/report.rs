//! Analysis report types. These are derived state: regenerated whenever the
//! skeletons, overrides or image index change, and they own no pixel data.

use serde::{Deserialize, Serialize};

/// The synthetic animation name carrying setup-pose observations.
pub const SETUP_POSE: &str = "Setup Pose";

/// The skin every document is expected to carry.
pub const DEFAULT_SKIN: &str = "default";

/// One (animation, slot, image) observation: the largest scale this asset is
/// rendered with in that animation, and where the maximum came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetUsage {
    /// Root-to-bone names joined with `/`.
    pub bone_path: String,
    pub slot: String,
    /// Resolved image key in the index.
    pub key: String,
    /// Maximum absolute scales observed, attachment scale included.
    pub scale_x: f32,
    pub scale_y: f32,
    /// round(time * 30) of the sample that produced the maximum.
    pub frame: u32,
    /// Skin that drove the maximum.
    pub skin: String,
    /// A scale timeline on this bone or an ancestor affected the value.
    pub scale_timeline: bool,
    /// The winning skin is not `default` but the attachment also appears in
    /// `default`; UIs should label the skin.
    pub show_skin_label: bool,
    /// A local per-animation override excludes this record from global maxima.
    pub ignored: bool,
    /// Render extent: ceil(effective size x scale), override applied.
    pub max_width: u32,
    pub max_height: u32,
}

/// All usages of one animation, in first-seen order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationReport {
    pub skeleton: String,
    pub animation: String,
    pub usages: Vec<AssetUsage>,
}

impl AnimationReport {
    pub fn is_setup_pose(&self) -> bool {
        self.animation == SETUP_POSE
    }
}

/// The merged, global view of one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetStat {
    pub key: String,
    pub physical: (u32, u32),
    pub canonical: Option<(u32, u32)>,
    /// Maximum render extent across all animations and skins.
    pub max_render: (u32, u32),
    pub scale_x: f32,
    pub scale_y: f32,
    pub source_animation: String,
    pub source_skeleton: String,
    pub frame: u32,
    pub skin: String,
    /// User override percentage, when one applies to this image.
    pub override_pct: Option<u32>,
    /// Canonical and physical dimensions disagree.
    pub dimension_mismatch: bool,
}

impl AssetStat {
    pub fn area(&self) -> u64 {
        (self.max_render.0 as u64) * (self.max_render.1 as u64)
    }
}

/// Per-skeleton analysis, before cross-skeleton merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkeletonAnalysis {
    pub skeleton: String,
    /// Setup Pose first, then animations in document order.
    pub animations: Vec<AnimationReport>,
    /// Attachment paths that resolved to no indexed image.
    pub missing_images: Vec<String>,
    /// Image keys referenced only through clipping/path attachments. They
    /// never render, so they stay out of used and unused accounting alike.
    pub clip_path_refs: Vec<String>,
    pub skins: Vec<String>,
    pub events: Vec<String>,
    pub control_bones: Vec<String>,
    /// Some region/mesh attachment lacks declared width/height.
    pub canonical_data_missing: bool,
}

/// The merged result over every ingested skeleton.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub animations: Vec<AnimationReport>,
    pub stats: Vec<AssetStat>,
    /// Index keys never used by any animation and not atlas page backings.
    pub unused: Vec<String>,
    pub missing_images: Vec<String>,
    pub skins: Vec<String>,
    pub events: Vec<String>,
    pub control_bones: Vec<String>,
    pub canonical_data_missing: bool,
}
