//! Session orchestration: ingest sources into a project, analyze, plan,
//! resample, pack.
//!
//! The project is mutated only during ingestion; analysis and planning are
//! pure functions over the resulting snapshot. Resampling and packing are
//! stateless services invoked per task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use tracing::{info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::aggregate::aggregate;
use crate::analyzer::{analyze_skeleton, Overrides};
use crate::atlas::{pages_to_manifest, parse_atlas};
use crate::error::{Result, SpriteFitError};
use crate::index::{normalize_key, ImageIndex};
use crate::model::PackResult;
use crate::packer::pack_tasks;
use crate::plan::{plan, OptimizationTask};
use crate::report::AnalysisReport;
use crate::resample::resample;
use crate::skeleton::SkeletonDocument;
use crate::unpack::{encode_png, unpack_atlas};

/// Cooperative cancellation flag. Checked between tasks and between pages,
/// never inside a pixel loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SpriteFitError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Index lifecycle. Mutation is additive while ingesting; `clear` returns to
/// `Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Empty,
    Ingesting,
    Ready,
}

/// One analysis session: skeletons, the image index and user overrides.
#[derive(Debug, Default)]
pub struct Project {
    pub skeletons: Vec<SkeletonDocument>,
    pub index: ImageIndex,
    pub overrides: Overrides,
    state: SessionState,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Reset everything.
    pub fn clear(&mut self) {
        self.skeletons.clear();
        self.index.clear();
        self.overrides = Overrides::default();
        self.state = SessionState::Empty;
    }

    /// Ingest a loose image file.
    pub fn ingest_image(&mut self, path: &str, blob: Vec<u8>) -> Result<()> {
        self.state = SessionState::Ingesting;
        self.index.add_image(path, blob)
    }

    /// Ingest a skeleton JSON document. A malformed document is rejected
    /// without touching the documents already ingested.
    pub fn ingest_skeleton(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let doc = SkeletonDocument::parse(name, bytes)?;
        self.state = SessionState::Ingesting;
        // Contribute canonical dimensions for every textured attachment that
        // declares them.
        for skin in &doc.skins {
            for (_, atts) in skin.attachments.iter() {
                for (att_name, def) in atts.iter() {
                    if let (true, Some(w), Some(h)) =
                        (def.kind.is_textured(), def.width, def.height)
                    {
                        self.index.add_canonical(def.lookup_key(att_name), w, h);
                    }
                }
            }
        }
        info!(
            skeleton = %doc.name,
            bones = doc.bones.len(),
            animations = doc.animations.0.len(),
            "ingested skeleton"
        );
        self.skeletons.push(doc);
        Ok(())
    }

    /// Ingest an atlas manifest. Regions whose page image is already indexed
    /// are unpacked into standalone extracted assets; a missing page skips
    /// that atlas with a warning.
    pub fn ingest_atlas(&mut self, name: &str, text: &str) -> Result<()> {
        let meta = parse_atlas(text)?;
        self.state = SessionState::Ingesting;
        for page in meta.page_names() {
            self.index.add_page_name(&page);
        }
        let sprites = unpack_atlas(&meta, &self.index)?;
        let count = sprites.len();
        for sprite in sprites {
            let dims = sprite.rgba.dimensions();
            let blob = encode_png(&sprite.rgba)?;
            self.index.add_extracted(&sprite.file_name, blob, dims);
        }
        info!(atlas = %name, regions = meta.regions.len(), extracted = count, "ingested atlas");
        Ok(())
    }

    /// Mark ingestion complete.
    pub fn finish_ingest(&mut self) {
        if self.state == SessionState::Ingesting {
            self.state = SessionState::Ready;
        }
    }

    /// Analyze every skeleton against the current index snapshot and merge
    /// the results. Pure with respect to the session.
    #[instrument(skip_all)]
    pub fn analyze(&self) -> AnalysisReport {
        let analyses: Vec<_> = self
            .skeletons
            .iter()
            .map(|doc| analyze_skeleton(doc, &self.index, &self.overrides))
            .collect();
        aggregate(&analyses, &self.index, &self.overrides)
    }

    /// Build the optimization task list for a safety-buffer percentage.
    pub fn plan(&self, report: &AnalysisReport, buffer_pct: u32) -> Vec<OptimizationTask> {
        plan(&report.stats, &self.index, buffer_pct)
    }

    /// Run one resample task. A failed resample falls back to the unchanged
    /// source blob; only a vanished asset is an error.
    pub fn resample_task(&self, task: &OptimizationTask) -> Result<Vec<u8>> {
        let asset = self
            .index
            .get(&task.key)
            .ok_or_else(|| SpriteFitError::AssetMissing {
                key: task.key.clone(),
            })?;
        if !task.is_resize {
            return Ok(asset.blob.clone());
        }
        match resample(&asset.blob, task.target, task.premultiplied) {
            Ok(blob) => Ok(blob),
            Err(e) => {
                warn!(key = %task.key, error = %e, "resample failed; emitting source unchanged");
                Ok(asset.blob.clone())
            }
        }
    }

    /// Resample a batch of tasks. Cancellation is checked between tasks;
    /// partial output is discarded. With the `parallel` feature the batch
    /// fans out; each task is self-contained.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub fn resample_batch(
        &self,
        tasks: &[OptimizationTask],
        cancel: &CancelToken,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        #[cfg(feature = "parallel")]
        {
            tasks
                .par_iter()
                .map(|task| {
                    cancel.check()?;
                    Ok((task.key.clone(), self.resample_task(task)?))
                })
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            let mut out = Vec::with_capacity(tasks.len());
            for task in tasks {
                cancel.check()?;
                out.push((task.key.clone(), self.resample_task(task)?));
            }
            Ok(out)
        }
    }

    /// Pack resized targets into atlas pages (layout only).
    pub fn pack(
        &self,
        tasks: &[OptimizationTask],
        page_size: u32,
        padding: u32,
        cancel: &CancelToken,
    ) -> Result<PackResult> {
        let items: Vec<(String, u32, u32)> = tasks
            .iter()
            .map(|t| (t.key.clone(), t.target.0, t.target.1))
            .collect();
        pack_tasks(&items, page_size, padding, cancel)
    }
}

/// Composite packed pages from resampled blobs. Returns RGBA canvases paired
/// with the manifest text describing them.
pub fn compose_pages(
    result: &PackResult,
    blobs: &[(String, Vec<u8>)],
    cancel: &CancelToken,
) -> Result<(Vec<(String, RgbaImage)>, String)> {
    let mut canvases = Vec::with_capacity(result.pages.len());
    for page in &result.pages {
        cancel.check()?;
        let mut canvas = RgbaImage::new(page.width, page.height);
        for rect in &page.rects {
            let Some((_, blob)) = blobs.iter().find(|(k, _)| k == &rect.key) else {
                warn!(key = %rect.key, "no blob for packed rect; leaving it blank");
                continue;
            };
            let src = image::load_from_memory(blob)?.to_rgba8();
            blit(&src, &mut canvas, rect.x, rect.y, rect.w, rect.h);
        }
        canvases.push((page.name.clone(), canvas));
    }
    Ok((canvases, pages_to_manifest(&result.pages)))
}

/// Straight copy of `src` into `canvas` at `(dx, dy)`, clipped to both the
/// source extent and the canvas.
fn blit(src: &RgbaImage, canvas: &mut RgbaImage, dx: u32, dy: u32, w: u32, h: u32) {
    let (sw, sh) = src.dimensions();
    let (cw, ch) = canvas.dimensions();
    for yy in 0..h.min(sh) {
        for xx in 0..w.min(sw) {
            if dx + xx < cw && dy + yy < ch {
                canvas.put_pixel(dx + xx, dy + yy, *src.get_pixel(xx, yy));
            }
        }
    }
}

/// The archive's root folder name for optimized output.
pub const OPTIMIZED_ROOT: &str = "images_optimized";

/// Relative archive path for one task's output file. Output is always PNG,
/// whatever the input extension was.
pub fn optimized_path(task: &OptimizationTask) -> String {
    let key = normalize_key(&task.source_path);
    let stem = crate::index::strip_extension(&key).trim_start_matches('/');
    format!("{OPTIMIZED_ROOT}/{stem}.png")
}
