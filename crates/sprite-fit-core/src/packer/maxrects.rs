//! MaxRects packing with the Best Short-Side Fit heuristic.
//!
//! The free list starts as the full page (grown by one padding so edge
//! placements do not pay for a gap that nothing will ever occupy). Requests
//! are inflated by the padding on the right and bottom; placed nodes split
//! every intersecting free rectangle into up to four residual strips, and
//! contained free rectangles are pruned afterwards.

use tracing::debug;

use super::PagePacker;
use crate::error::{Result, SpriteFitError};
use crate::model::{AtlasPage, OversizeTask, PackResult, PackedRect, Rect};
use crate::pipeline::CancelToken;
use crate::plan::natural_cmp;

pub struct MaxRectsPacker {
    page_size: u32,
    padding: u32,
    free: Vec<Rect>,
    used_area: u64,
}

impl MaxRectsPacker {
    pub fn new(page_size: u32, padding: u32) -> Self {
        Self {
            page_size,
            padding,
            free: vec![Rect::new(0, 0, page_size + padding, page_size + padding)],
            used_area: 0,
        }
    }

    /// Best Short-Side Fit: minimize the smaller leftover axis, then the
    /// larger one; positional tie-break keeps results deterministic.
    fn find_position(&self, w: u32, h: u32) -> Option<Rect> {
        let mut best: Option<(i64, i64, u32, u32)> = None; // short, long, y, x
        let mut best_rect = None;
        for fr in &self.free {
            if fr.w < w || fr.h < h {
                continue;
            }
            let leftover_w = (fr.w - w) as i64;
            let leftover_h = (fr.h - h) as i64;
            let short = leftover_w.min(leftover_h);
            let long = leftover_w.max(leftover_h);
            let score = (short, long, fr.y, fr.x);
            if best.map_or(true, |b| score < b) {
                best = Some(score);
                best_rect = Some(Rect::new(fr.x, fr.y, w, h));
            }
        }
        best_rect
    }

    fn place(&mut self, node: &Rect) {
        let mut new_free: Vec<Rect> = Vec::with_capacity(self.free.len() + 4);
        for fr in &self.free {
            if !fr.intersects(node) {
                new_free.push(*fr);
                continue;
            }
            let fr_x2 = fr.x + fr.w;
            let fr_y2 = fr.y + fr.h;
            let n_x2 = node.x + node.w;
            let n_y2 = node.y + node.h;
            let ix1 = fr.x.max(node.x);
            let iy1 = fr.y.max(node.y);
            let ix2 = fr_x2.min(n_x2);
            let iy2 = fr_y2.min(n_y2);

            // top strip
            if iy1 > fr.y {
                new_free.push(Rect::new(fr.x, fr.y, fr.w, iy1 - fr.y));
            }
            // bottom strip
            if iy2 < fr_y2 {
                new_free.push(Rect::new(fr.x, iy2, fr.w, fr_y2 - iy2));
            }
            // left strip of the overlap band
            if ix1 > fr.x && iy2 > iy1 {
                new_free.push(Rect::new(fr.x, iy1, ix1 - fr.x, iy2 - iy1));
            }
            // right strip of the overlap band
            if ix2 < fr_x2 && iy2 > iy1 {
                new_free.push(Rect::new(ix2, iy1, fr_x2 - ix2, iy2 - iy1));
            }
        }
        self.free = new_free;
        self.prune();
    }

    /// Drop every free rectangle contained in another. Quadratic, but it is
    /// what keeps the free list sound at 2k-4k page sizes.
    fn prune(&mut self) {
        let mut i = 0;
        while i < self.free.len() {
            let a = self.free[i];
            let mut remove_i = false;
            let mut j = i + 1;
            while j < self.free.len() {
                let b = self.free[j];
                if b.contains(&a) {
                    remove_i = true;
                    break;
                }
                if a.contains(&b) {
                    self.free.remove(j);
                    continue;
                }
                j += 1;
            }
            if remove_i {
                self.free.remove(i);
            } else {
                i += 1;
            }
        }
    }
}

impl PagePacker for MaxRectsPacker {
    fn can_pack(&self, w: u32, h: u32) -> bool {
        self.find_position(w + self.padding, h + self.padding).is_some()
    }

    fn pack(&mut self, key: &str, w: u32, h: u32) -> Option<PackedRect> {
        let node = self.find_position(w + self.padding, h + self.padding)?;
        self.place(&node);
        self.used_area += (w as u64) * (h as u64);
        Some(PackedRect {
            key: key.to_string(),
            x: node.x,
            y: node.y,
            w,
            h,
        })
    }

    fn used_area(&self) -> u64 {
        self.used_area
    }

    fn free_rects(&self) -> &[Rect] {
        &self.free
    }
}

/// Pack `(key, width, height)` items into as many pages as needed.
///
/// Items sort by decreasing height (key order on ties); each page is filled
/// until nothing else fits, then a new page opens. Items exceeding the page
/// on either axis are reported, not packed. An empty task list is an error;
/// cancellation is honored between pages.
pub fn pack_tasks(
    items: &[(String, u32, u32)],
    page_size: u32,
    padding: u32,
    cancel: &CancelToken,
) -> Result<PackResult> {
    if items.is_empty() {
        return Err(SpriteFitError::Empty);
    }
    let mut oversized: Vec<OversizeTask> = Vec::new();
    let mut remaining: Vec<&(String, u32, u32)> = Vec::new();
    for item in items {
        if item.1 > page_size || item.2 > page_size || item.1 == 0 || item.2 == 0 {
            oversized.push(OversizeTask {
                key: item.0.clone(),
                width: item.1,
                height: item.2,
            });
        } else {
            remaining.push(item);
        }
    }
    remaining.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| natural_cmp(&a.0, &b.0)));

    let mut pages: Vec<AtlasPage> = Vec::new();
    let page_area = (page_size as f64) * (page_size as f64);
    while !remaining.is_empty() {
        cancel.check()?;
        let mut packer = MaxRectsPacker::new(page_size, padding);
        let mut rects: Vec<PackedRect> = Vec::new();
        remaining.retain(|item| match packer.pack(&item.0, item.1, item.2) {
            Some(r) => {
                rects.push(r);
                false
            }
            None => true,
        });
        if rects.is_empty() {
            // Nothing fit on a fresh page; the leftovers can never be placed.
            for item in remaining.drain(..) {
                oversized.push(OversizeTask {
                    key: item.0.clone(),
                    width: item.1,
                    height: item.2,
                });
            }
            break;
        }
        let efficiency = packer.used_area() as f64 / page_area;
        debug!(
            page = pages.len(),
            rects = rects.len(),
            efficiency,
            "packed page"
        );
        pages.push(AtlasPage {
            name: format!("page_{}.png", pages.len()),
            width: page_size,
            height: page_size,
            rects,
            efficiency,
        });
    }
    Ok(PackResult { pages, oversized })
}
