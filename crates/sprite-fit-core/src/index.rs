//! Image index and key canonicalization.
//!
//! Every ingested image lands here under a normalized key. Skeletons
//! contribute canonical dimensions; atlases contribute extracted sprites and
//! register their page names so backing textures never count as unused.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{AssetKind, ImageAsset};

/// Extensions tried during lookup, in precedence order.
pub const LOOKUP_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".webp"];

/// Normalize a path into an index key: forward slashes, trimmed, lowercase.
pub fn normalize_key(path: &str) -> String {
    path.replace('\\', "/").trim().to_lowercase()
}

/// Strip one trailing image extension, if any.
pub fn strip_extension(key: &str) -> &str {
    for ext in LOOKUP_EXTENSIONS {
        if let Some(stem) = key.strip_suffix(ext) {
            return stem;
        }
    }
    key
}

#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    assets: HashMap<String, ImageAsset>,
    /// Insertion order of keys, for deterministic enumeration.
    order: Vec<String>,
    /// Canonical dimensions contributed by skeletons, keyed by the lowercase
    /// extension-stripped attachment path. Kept so images ingested later
    /// still adopt them.
    canonical: HashMap<String, (u32, u32)>,
    /// Sanitized atlas page names (normalized).
    pages: HashSet<String>,
}

impl ImageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn clear(&mut self) {
        self.assets.clear();
        self.order.clear();
        self.canonical.clear();
        self.pages.clear();
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|k| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&ImageAsset> {
        self.assets.get(key)
    }

    /// Ingest a loose image blob. The physical extent is measured by decoding
    /// the header; re-ingesting a key replaces the blob but keeps its place
    /// in enumeration order.
    pub fn add_image(&mut self, path: &str, blob: Vec<u8>) -> Result<()> {
        let decoded = image::load_from_memory(&blob)?;
        let physical = (decoded.width(), decoded.height());
        self.insert(path, blob, physical, AssetKind::Loose);
        Ok(())
    }

    /// Ingest a sprite extracted from an atlas page; dimensions are already
    /// known so no decode happens here.
    pub fn add_extracted(&mut self, path: &str, blob: Vec<u8>, physical: (u32, u32)) {
        self.insert(path, blob, physical, AssetKind::AtlasExtracted);
    }

    fn insert(&mut self, path: &str, blob: Vec<u8>, physical: (u32, u32), kind: AssetKind) {
        let key = normalize_key(path);
        let canonical = self.canonical_for(strip_extension(&key));
        debug!(key = %key, w = physical.0, h = physical.1, ?kind, "index image");
        if self
            .assets
            .insert(
                key.clone(),
                ImageAsset {
                    key: key.clone(),
                    source_path: path.trim().to_string(),
                    blob,
                    physical,
                    canonical,
                    kind,
                },
            )
            .is_none()
        {
            self.order.push(key);
        }
    }

    /// Canonical dimensions for an extension-stripped asset key: an exact
    /// stem match, or the most specific (longest) declared stem the asset
    /// key ends with.
    fn canonical_for(&self, stem: &str) -> Option<(u32, u32)> {
        if let Some(&dims) = self.canonical.get(stem) {
            return Some(dims);
        }
        self.canonical
            .iter()
            .filter(|(decl, _)| stem.ends_with(&format!("/{decl}")))
            .max_by_key(|(decl, _)| decl.len())
            .map(|(_, &dims)| dims)
    }

    /// Adopt canonical dimensions declared by a skeleton attachment. The key
    /// is the attachment path stripped of extension; any current or future
    /// asset matching it picks the dimensions up.
    pub fn add_canonical(&mut self, path: &str, width: u32, height: u32) {
        let stem = strip_extension(&normalize_key(path)).to_string();
        self.canonical.insert(stem.clone(), (width, height));
        if let Some(asset_key) = self.resolve(&stem) {
            let asset = self.assets.get_mut(&asset_key).expect("resolved key");
            if asset.canonical != Some((width, height)) {
                if asset.physical != (width, height) {
                    warn!(
                        key = %asset_key,
                        declared_w = width,
                        declared_h = height,
                        physical_w = asset.physical.0,
                        physical_h = asset.physical.1,
                        "canonical dimensions disagree with decoded image"
                    );
                }
                asset.canonical = Some((width, height));
            }
        }
    }

    /// Register an atlas page backing texture name.
    pub fn add_page_name(&mut self, name: &str) {
        self.pages.insert(normalize_key(name));
    }

    /// True when `key` (full or basename) names an atlas page backing.
    pub fn is_page_backing(&self, key: &str) -> bool {
        if self.pages.contains(key) {
            return true;
        }
        match key.rsplit_once('/') {
            Some((_, base)) => self.pages.contains(base),
            None => self.pages.iter().any(|p| {
                p.rsplit_once('/').map(|(_, b)| b) == Some(key)
            }),
        }
    }

    /// Look an image up by attachment path.
    ///
    /// Precedence: exact normalized key; exact plus each known extension;
    /// then a suffix match on `/<requested>` (with optional extension),
    /// preferring the shortest matching key.
    pub fn find(&self, requested: &str) -> Option<&ImageAsset> {
        self.resolve(requested).and_then(|k| self.assets.get(&k))
    }

    fn resolve(&self, requested: &str) -> Option<String> {
        let req = normalize_key(requested);
        if req.is_empty() {
            return None;
        }
        if self.assets.contains_key(&req) {
            return Some(req);
        }
        for ext in LOOKUP_EXTENSIONS {
            let with_ext = format!("{req}{ext}");
            if self.assets.contains_key(&with_ext) {
                return Some(with_ext);
            }
        }
        // Fuzzy fallback: the requested path may be rooted differently from
        // the ingested one. Shortest key wins (closest to the tree top);
        // lexicographic order breaks exact-length ties deterministically.
        let mut best: Option<&str> = None;
        for key in self.assets.keys() {
            let matches = key.ends_with(&format!("/{req}"))
                || LOOKUP_EXTENSIONS
                    .iter()
                    .any(|ext| key.ends_with(&format!("/{req}{ext}")));
            if matches {
                best = match best {
                    None => Some(key),
                    Some(b) if (key.len(), key.as_str()) < (b.len(), b) => Some(key),
                    Some(b) => Some(b),
                };
            }
        }
        best.map(|k| k.to_string())
    }
}
