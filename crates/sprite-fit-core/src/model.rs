use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle (pixels). `x,y` is top-left; `w,h` are sizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
    pub fn area(&self) -> u64 {
        (self.w as u64) * (self.h as u64)
    }
    /// Returns true if `r` is fully inside `self` (inclusive edges).
    pub fn contains(&self, r: &Rect) -> bool {
        r.x >= self.x
            && r.y >= self.y
            && r.x + r.w <= self.x + self.w
            && r.y + r.h <= self.y + self.h
    }
    pub fn intersects(&self, r: &Rect) -> bool {
        !(self.x >= r.x + r.w
            || r.x >= self.x + self.w
            || self.y >= r.y + r.h
            || r.y >= self.y + self.h)
    }
}

/// How an image entered the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Dropped/walked in as a standalone file.
    Loose,
    /// Cut out of an atlas page.
    AtlasExtracted,
}

/// One indexed image: the blob plus everything the analyzer needs to size it.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    /// Normalized lookup key (slash-delimited, lowercase).
    pub key: String,
    /// Original path as supplied by the ingester.
    pub source_path: String,
    pub blob: Vec<u8>,
    /// Pixel extent measured from the decoded image.
    pub physical: (u32, u32),
    /// Intrinsic extent adopted from a skeleton definition, when one matches.
    pub canonical: Option<(u32, u32)>,
    pub kind: AssetKind,
}

impl ImageAsset {
    /// Dimensions used in analysis: canonical when the skeleton declares them,
    /// physical otherwise.
    pub fn effective(&self) -> (u32, u32) {
        self.canonical.unwrap_or(self.physical)
    }

    /// Informational flag: the skeleton's declared size disagrees with the file.
    pub fn dimension_mismatch(&self) -> bool {
        matches!(self.canonical, Some(c) if c != self.physical)
    }
}

/// One region record from an atlas manifest, in logical (unrotated) orientation.
///
/// `width`/`height` describe the sprite; when `rotated` is set the on-page
/// footprint is the swap (stored 90 degrees counter-clockwise).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasRegion {
    pub page_name: String,
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub rotated: bool,
    pub index: i32,
}

impl AtlasRegion {
    /// Width of the rectangle as stored on the page.
    pub fn stored_width(&self) -> u32 {
        if self.rotated {
            self.height
        } else {
            self.width
        }
    }
    /// Height of the rectangle as stored on the page.
    pub fn stored_height(&self) -> u32 {
        if self.rotated {
            self.width
        } else {
            self.height
        }
    }
}

/// Parsed atlas manifest: ordered regions plus the page names they live on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtlasMetadata {
    pub regions: Vec<AtlasRegion>,
}

impl AtlasMetadata {
    /// Page names in first-seen order, deduplicated.
    pub fn page_names(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for r in &self.regions {
            if !out.iter().any(|p| p == &r.page_name) {
                out.push(r.page_name.clone());
            }
        }
        out
    }
}

/// A rectangle placed by the packer; `x,y,w,h` is the content area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackedRect {
    pub key: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// One packed output page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasPage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub rects: Vec<PackedRect>,
    /// usedArea / (width * height).
    pub efficiency: f64,
}

/// A task the packer could not place because it exceeds the page on some axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OversizeTask {
    pub key: String,
    pub width: u32,
    pub height: u32,
}

/// Result of a packing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackResult {
    pub pages: Vec<AtlasPage>,
    pub oversized: Vec<OversizeTask>,
}

