//! Optimization planning: turn merged stats into an ordered task list.
//! The planner never touches pixel data.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::index::ImageIndex;
use crate::model::AssetKind;
use crate::report::AssetStat;

/// One unit of work for the resampler: resize (or plain copy) a single image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationTask {
    pub key: String,
    pub source_path: String,
    pub physical: (u32, u32),
    pub target: (u32, u32),
    /// target != physical.
    pub is_resize: bool,
    /// Seed for the resampler's alpha-mode detection.
    pub premultiplied: bool,
    /// Area saved relative to the physical image, percent.
    pub reduction: f32,
}

/// Compare path strings alphabetically, but with digit runs compared as
/// numbers, so `page_2` sorts before `page_10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let ab = a.as_bytes();
    let bb = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);
    while i < ab.len() && j < bb.len() {
        let (ca, cb) = (ab[i], bb[j]);
        if ca.is_ascii_digit() && cb.is_ascii_digit() {
            let si = i;
            while i < ab.len() && ab[i].is_ascii_digit() {
                i += 1;
            }
            let sj = j;
            while j < bb.len() && bb[j].is_ascii_digit() {
                j += 1;
            }
            let na: u64 = a[si..i].parse().unwrap_or(u64::MAX);
            let nb: u64 = b[sj..j].parse().unwrap_or(u64::MAX);
            match na.cmp(&nb) {
                Ordering::Equal => {}
                other => return other,
            }
        } else {
            match ca.cmp(&cb) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                other => return other,
            }
        }
    }
    ab.len().cmp(&bb.len())
}

/// Build the task list for `buffer_pct` percent of safety headroom.
///
/// Targets are the buffered maxima clamped down to the physical extent and up
/// to 1x1. Resizes sort first, plain copies last, each group in natural
/// alphabetical order.
pub fn plan(stats: &[AssetStat], index: &ImageIndex, buffer_pct: u32) -> Vec<OptimizationTask> {
    let factor = 1.0 + buffer_pct as f64 / 100.0;
    let mut tasks: Vec<OptimizationTask> = Vec::new();
    for stat in stats {
        let Some(asset) = index.find(&stat.key) else {
            continue;
        };
        let (pw, ph) = asset.physical;
        let tw = ((stat.max_render.0 as f64 * factor).ceil() as u32).clamp(1, pw.max(1));
        let th = ((stat.max_render.1 as f64 * factor).ceil() as u32).clamp(1, ph.max(1));
        let physical_area = (pw as f64) * (ph as f64);
        let target_area = (tw as f64) * (th as f64);
        let reduction = if physical_area > 0.0 {
            (100.0 * (1.0 - target_area / physical_area)).max(0.0) as f32
        } else {
            0.0
        };
        tasks.push(OptimizationTask {
            key: asset.key.clone(),
            source_path: asset.source_path.clone(),
            physical: (pw, ph),
            target: (tw, th),
            is_resize: (tw, th) != (pw, ph),
            premultiplied: asset.kind == AssetKind::AtlasExtracted,
            reduction,
        });
    }
    tasks.sort_by(|a, b| {
        b.is_resize
            .cmp(&a.is_resize)
            .then_with(|| natural_cmp(&a.key, &b.key))
    });
    tasks
}
