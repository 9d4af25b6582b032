//! Report aggregation: fold per-animation usages into one global stat per
//! image, then merge across skeletons.
//!
//! The aggregation order rules live in exactly two fold functions; everything
//! else is bookkeeping. With the setup-pose exclusion made explicit the
//! result is order-independent across skeletons and animations.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::analyzer::Overrides;
use crate::index::ImageIndex;
use crate::report::{
    AnalysisReport, AssetStat, SkeletonAnalysis, DEFAULT_SKIN,
};

struct StatEntry {
    stat: AssetStat,
    from_setup: bool,
}

/// Fold one candidate into the per-image table.
///
/// Priority: first observation wins an empty slot; a setup-pose observation
/// never displaces an animation's, even when larger; otherwise larger area
/// wins; on equal area a non-default skin displaces `default` (documentation
/// clarity), else the earlier record stays.
fn fold_stat(
    table: &mut HashMap<String, StatEntry>,
    order: &mut Vec<String>,
    cand: AssetStat,
    cand_setup: bool,
) {
    match table.entry(cand.key.clone()) {
        Entry::Vacant(slot) => {
            order.push(cand.key.clone());
            slot.insert(StatEntry {
                stat: cand,
                from_setup: cand_setup,
            });
        }
        Entry::Occupied(mut slot) => {
            let cur = slot.get_mut();
            if cand_setup && !cur.from_setup {
                return;
            }
            let replace = if !cand_setup && cur.from_setup {
                true
            } else if cand.area() > cur.stat.area() {
                true
            } else {
                cand.area() == cur.stat.area()
                    && cur.stat.skin == DEFAULT_SKIN
                    && cand.skin != DEFAULT_SKIN
            };
            if replace {
                cur.stat = cand;
                cur.from_setup = cand_setup;
            }
        }
    }
}

/// Cross-skeleton merge: area comparison only; ties keep the earlier record.
fn fold_merge(table: &mut HashMap<String, AssetStat>, order: &mut Vec<String>, cand: AssetStat) {
    match table.entry(cand.key.clone()) {
        Entry::Vacant(slot) => {
            order.push(cand.key.clone());
            slot.insert(cand);
        }
        Entry::Occupied(mut slot) => {
            if cand.area() > slot.get().area() {
                slot.insert(cand);
            }
        }
    }
}

/// Aggregate one skeleton's animation reports into per-image stats.
pub fn aggregate_skeleton(
    analysis: &SkeletonAnalysis,
    index: &ImageIndex,
    overrides: &Overrides,
) -> Vec<AssetStat> {
    let mut table: HashMap<String, StatEntry> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for report in &analysis.animations {
        let is_setup = report.is_setup_pose();
        for usage in &report.usages {
            if usage.ignored {
                continue;
            }
            let Some(asset) = index.get(&usage.key) else {
                continue;
            };
            let cand = AssetStat {
                key: usage.key.clone(),
                physical: asset.physical,
                canonical: asset.canonical,
                max_render: (usage.max_width, usage.max_height),
                scale_x: usage.scale_x,
                scale_y: usage.scale_y,
                source_animation: report.animation.clone(),
                source_skeleton: report.skeleton.clone(),
                frame: usage.frame,
                skin: usage.skin.clone(),
                override_pct: overrides.percentage_for(&usage.key),
                dimension_mismatch: asset.dimension_mismatch(),
            };
            fold_stat(&mut table, &mut order, cand, is_setup);
        }
    }
    order
        .into_iter()
        .map(|k| table.remove(&k).expect("ordered key").stat)
        .collect()
}

/// Merge every skeleton's analysis into the final report.
pub fn aggregate(
    analyses: &[SkeletonAnalysis],
    index: &ImageIndex,
    overrides: &Overrides,
) -> AnalysisReport {
    let mut table: HashMap<String, AssetStat> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for analysis in analyses {
        for stat in aggregate_skeleton(analysis, index, overrides) {
            fold_merge(&mut table, &mut order, stat);
        }
    }
    let stats: Vec<AssetStat> = order
        .iter()
        .map(|k| table.remove(k).expect("ordered key"))
        .collect();

    let used: std::collections::HashSet<&str> = stats.iter().map(|s| s.key.as_str()).collect();
    // Keys referenced only through clipping/path attachments never render;
    // they belong to neither the used nor the unused set.
    let clip_refs: std::collections::HashSet<&str> = analyses
        .iter()
        .flat_map(|a| a.clip_path_refs.iter().map(|k| k.as_str()))
        .collect();
    let unused: Vec<String> = index
        .keys()
        .filter(|k| !used.contains(k) && !clip_refs.contains(k) && !index.is_page_backing(k))
        .map(|k| k.to_string())
        .collect();

    let mut animations = Vec::new();
    let mut missing = std::collections::BTreeSet::new();
    let mut skins = Vec::new();
    let mut events = Vec::new();
    let mut control_bones = Vec::new();
    let mut canonical_data_missing = false;
    for analysis in analyses {
        animations.extend(analysis.animations.iter().cloned());
        missing.extend(analysis.missing_images.iter().cloned());
        skins.extend(analysis.skins.iter().cloned());
        events.extend(analysis.events.iter().cloned());
        control_bones.extend(analysis.control_bones.iter().cloned());
        canonical_data_missing |= analysis.canonical_data_missing;
    }
    skins.sort();
    skins.dedup();
    events.sort();
    events.dedup();
    control_bones.sort();
    control_bones.dedup();

    AnalysisReport {
        animations,
        stats,
        unused,
        missing_images: missing.into_iter().collect(),
        skins,
        events,
        control_bones,
        canonical_data_missing,
    }
}
