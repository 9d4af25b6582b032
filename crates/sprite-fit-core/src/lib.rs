//! Core library for right-sizing the art of 2D skeletal-animation projects.
//!
//! - Skeleton analyzer: walks the bone forest, propagates scale through
//!   animation timelines and computes per-attachment maximum render extents.
//! - Atlas codec: parses/serializes textual atlas manifests, unpacks regions
//!   (rotation restore included) and packs optimized images back into pages
//!   (MaxRects, Best Short-Side Fit).
//! - Resampler: alpha-aware Lanczos-3 downscaling with pyramid reduction.
//! - Aggregator: merges per-skeleton analyses into one global table of maxima.
//!
//! Quick example:
//! ```ignore
//! use sprite_fit_core::prelude::*;
//! # fn main() -> sprite_fit_core::Result<()> {
//! let mut project = Project::new();
//! project.ingest_image("images/hero.png", std::fs::read("hero.png")?)?;
//! project.ingest_skeleton("hero", &std::fs::read("hero.json")?)?;
//! project.finish_ingest();
//! let report = project.analyze();
//! let tasks = project.plan(&report, 10);
//! println!("{} tasks, {} unused assets", tasks.len(), report.unused.len());
//! # Ok(()) }
//! ```

pub mod aggregate;
pub mod analyzer;
pub mod atlas;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod packer;
pub mod pipeline;
pub mod plan;
pub mod report;
pub mod resample;
pub mod skeleton;
pub mod unpack;

pub use error::{Result, SpriteFitError};

/// Convenience prelude for the primary APIs.
pub mod prelude {
    pub use crate::analyzer::{analyze_skeleton, Overrides};
    pub use crate::atlas::{parse_atlas, sanitize_page_name, write_atlas};
    pub use crate::config::SessionConfig;
    pub use crate::error::{Result, SpriteFitError};
    pub use crate::index::ImageIndex;
    pub use crate::model::{AtlasMetadata, AtlasPage, AtlasRegion, PackResult, PackedRect, Rect};
    pub use crate::packer::pack_tasks;
    pub use crate::pipeline::{compose_pages, CancelToken, Project, SessionState};
    pub use crate::plan::{plan, OptimizationTask};
    pub use crate::report::{AnalysisReport, AssetStat, AssetUsage, SETUP_POSE};
    pub use crate::resample::resample;
    pub use crate::unpack::{extract_region, unpack_atlas};
}
