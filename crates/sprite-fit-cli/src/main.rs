use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use indicatif::{ProgressBar, ProgressStyle};
use sprite_fit_core::atlas::pages_to_manifest;
use sprite_fit_core::config::SessionConfig;
use sprite_fit_core::pipeline::{compose_pages, optimized_path, CancelToken, Project};
use sprite_fit_core::prelude::*;
use sprite_fit_core::unpack::encode_png;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "sprite-fit",
    about = "Analyze skeletal-animation projects and right-size their textures",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true, help_heading = "Logging")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(short, long, default_value_t = false, global = true, help_heading = "Logging")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a project and report per-image maximum render sizes
    Analyze(AnalyzeArgs),
    /// Analyze, resample and emit the optimized image set
    Optimize(OptimizeArgs),
    /// Cut an atlas back into standalone sprite PNGs
    Unpack(UnpackArgs),
    /// Pack a directory of images into atlas pages
    Pack(PackArgs),
}

#[derive(Parser, Debug, Clone)]
struct AnalyzeArgs {
    /// Input files or directories (skeleton .json, .atlas manifests, images)
    #[arg(required = true, help_heading = "Input/Output")]
    inputs: Vec<PathBuf>,
    /// Write the full report as JSON here
    #[arg(short, long, help_heading = "Input/Output")]
    report: Option<PathBuf>,
    /// Session config with overrides and the safety buffer
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
    /// Include patterns (glob); only matching files are ingested
    #[arg(long, help_heading = "Input/Output")]
    include: Vec<String>,
    /// Exclude patterns (glob)
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
struct OptimizeArgs {
    #[command(flatten)]
    analyze: AnalyzeArgs,
    /// Output directory
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// Safety buffer percent added to every target (overrides config)
    #[arg(short, long, help_heading = "Optimization")]
    buffer: Option<u32>,
    /// Also write a zip archive of the optimized set
    #[arg(long, help_heading = "Input/Output")]
    archive: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
struct UnpackArgs {
    /// Atlas manifest path (page images are looked up next to it)
    atlas: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
}

#[derive(Parser, Debug, Clone)]
struct PackArgs {
    /// Input directory of images
    input: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// Atlas base name (files will be name_N.png / name.atlas)
    #[arg(short, long, default_value = "atlas", help_heading = "Input/Output")]
    name: String,
    /// Page size (square), pixels
    #[arg(long, default_value_t = 2048, help_heading = "Layout")]
    page_size: u32,
    /// Padding between packed rects, pixels
    #[arg(long, default_value_t = 2, help_heading = "Layout")]
    padding: u32,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Analyze(args) => run_analyze(args),
        Commands::Optimize(args) => run_optimize(args, !cli.quiet),
        Commands::Unpack(args) => run_unpack(args),
        Commands::Pack(args) => run_pack(args),
    }
}

fn init_tracing(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

const IMAGE_EXTS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];
const ATLAS_EXTS: [&str; 2] = ["atlas", "atlas.txt"];

fn build_globset(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        b.add(Glob::new(p).with_context(|| format!("bad glob pattern '{p}'"))?);
    }
    Ok(Some(b.build()?))
}

/// Collect input files as (path on disk, ingestion key). Keys are relative
/// to the input root so report keys and archive paths stay portable.
fn gather_paths(args: &AnalyzeArgs) -> anyhow::Result<Vec<(PathBuf, String)>> {
    let include = build_globset(&args.include)?;
    let exclude = build_globset(&args.exclude)?;
    let mut out = Vec::new();
    for input in &args.inputs {
        if input.is_file() {
            let key = input
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| input.to_string_lossy().to_string());
            out.push((input.clone(), key));
            continue;
        }
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(inc) = &include {
                if !inc.is_match(path) {
                    continue;
                }
            }
            if let Some(exc) = &exclude {
                if exc.is_match(path) {
                    continue;
                }
            }
            let key = path
                .strip_prefix(input)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            out.push((path.to_path_buf(), key));
        }
    }
    Ok(out)
}

fn classify(path: &Path) -> Option<&'static str> {
    let name = path.file_name()?.to_str()?.to_lowercase();
    if ATLAS_EXTS.iter().any(|e| name.ends_with(&format!(".{e}"))) {
        return Some("atlas");
    }
    let ext = path.extension()?.to_str()?.to_lowercase();
    if IMAGE_EXTS.contains(&ext.as_str()) {
        return Some("image");
    }
    if ext == "json" {
        return Some("skeleton");
    }
    None
}

fn load_config(path: &Option<PathBuf>) -> anyhow::Result<SessionConfig> {
    match path {
        Some(p) => {
            let bytes = fs::read(p).with_context(|| format!("read config {}", p.display()))?;
            Ok(SessionConfig::from_json(&bytes)?)
        }
        None => Ok(SessionConfig::default()),
    }
}

/// Ingest images first, atlases second (they unpack against the indexed page
/// images), skeletons last (their canonical dimensions apply to everything
/// already present).
fn build_project(args: &AnalyzeArgs, cfg: &SessionConfig) -> anyhow::Result<Project> {
    let paths = gather_paths(args)?;
    let mut project = Project::new();
    project.overrides = cfg.to_overrides();

    for (path, key) in paths.iter().filter(|(p, _)| classify(p) == Some("image")) {
        let blob = fs::read(path)?;
        if let Err(e) = project.ingest_image(key, blob) {
            warn!(path = %path.display(), error = %e, "skipping undecodable image");
        }
    }
    for (path, key) in paths.iter().filter(|(p, _)| classify(p) == Some("atlas")) {
        let text = fs::read_to_string(path)?;
        if let Err(e) = project.ingest_atlas(key, &text) {
            warn!(path = %path.display(), error = %e, "skipping malformed atlas");
        }
    }
    for (path, _) in paths.iter().filter(|(p, _)| classify(p) == Some("skeleton")) {
        let bytes = fs::read(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        if let Err(e) = project.ingest_skeleton(&name, &bytes) {
            warn!(path = %path.display(), error = %e, "skipping malformed skeleton");
        }
    }
    project.finish_ingest();
    info!(
        skeletons = project.skeletons.len(),
        images = project.index.len(),
        "project ingested"
    );
    Ok(project)
}

fn write_report(report: &AnalysisReport, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(report)?;
    fs::write(path, json).with_context(|| format!("write report {}", path.display()))?;
    Ok(())
}

fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args.config)?;
    let project = build_project(args, &cfg)?;
    let report = project.analyze();

    for stat in &report.stats {
        info!(
            key = %stat.key,
            max = format!("{}x{}", stat.max_render.0, stat.max_render.1),
            physical = format!("{}x{}", stat.physical.0, stat.physical.1),
            animation = %stat.source_animation,
            skeleton = %stat.source_skeleton,
            frame = stat.frame,
            "asset maximum"
        );
    }
    if !report.missing_images.is_empty() {
        warn!(count = report.missing_images.len(), keys = ?report.missing_images, "missing images");
    }
    if !report.unused.is_empty() {
        info!(count = report.unused.len(), "unused assets");
    }
    if report.canonical_data_missing {
        warn!("some region/mesh attachments declare no width/height; physical sizes were used");
    }
    if let Some(path) = &args.report {
        write_report(&report, path)?;
        info!(path = %path.display(), "report written");
    }
    Ok(())
}

fn run_optimize(args: &OptimizeArgs, show_progress: bool) -> anyhow::Result<()> {
    let cfg = load_config(&args.analyze.config)?;
    let buffer = args.buffer.unwrap_or(cfg.safety_buffer);
    let project = build_project(&args.analyze, &cfg)?;
    let report = project.analyze();
    let tasks = project.plan(&report, buffer);
    if tasks.is_empty() {
        warn!("nothing to optimize");
        return Ok(());
    }

    let resizes = tasks.iter().filter(|t| t.is_resize).count();
    info!(
        tasks = tasks.len(),
        resizes,
        copies = tasks.len() - resizes,
        buffer,
        "optimization planned"
    );

    let pb = if show_progress {
        let pb = ProgressBar::new(tasks.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Some(pb)
    } else {
        None
    };

    let mut outputs: Vec<(String, Vec<u8>)> = Vec::with_capacity(tasks.len());
    for task in &tasks {
        if let Some(pb) = &pb {
            pb.set_message(task.key.clone());
        }
        let blob = project.resample_task(task)?;
        outputs.push((optimized_path(task), blob));
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    for (rel, blob) in &outputs {
        let dest = args.out_dir.join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, blob).with_context(|| format!("write {}", dest.display()))?;
    }
    info!(dir = %args.out_dir.display(), files = outputs.len(), "optimized set written");

    if let Some(archive) = &args.archive {
        write_archive(archive, &outputs)?;
        info!(archive = %archive.display(), "archive written");
    }
    if let Some(path) = &args.analyze.report {
        write_report(&report, path)?;
    }
    Ok(())
}

fn write_archive(path: &Path, outputs: &[(String, Vec<u8>)]) -> anyhow::Result<()> {
    let file = fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (rel, blob) in outputs {
        zip.start_file(rel.clone(), opts)?;
        zip.write_all(blob)?;
    }
    zip.finish()?;
    Ok(())
}

fn run_unpack(args: &UnpackArgs) -> anyhow::Result<()> {
    let text = fs::read_to_string(&args.atlas)
        .with_context(|| format!("read atlas {}", args.atlas.display()))?;
    let meta = parse_atlas(&text)?;

    let mut index = ImageIndex::new();
    let base = args.atlas.parent().unwrap_or(Path::new("."));
    for page in meta.page_names() {
        let candidate = base.join(&page);
        match fs::read(&candidate) {
            Ok(blob) => index.add_image(&page, blob)?,
            Err(e) => warn!(page = %candidate.display(), error = %e, "page image unreadable"),
        }
    }

    let sprites = unpack_atlas(&meta, &index)?;
    if sprites.is_empty() {
        warn!("no sprites unpacked");
        return Ok(());
    }
    fs::create_dir_all(&args.out_dir)?;
    for sprite in &sprites {
        let dest = args.out_dir.join(&sprite.file_name);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, sprite.encode_png()?)?;
    }
    info!(sprites = sprites.len(), dir = %args.out_dir.display(), "atlas unpacked");
    Ok(())
}

fn run_pack(args: &PackArgs) -> anyhow::Result<()> {
    let mut items: Vec<(String, u32, u32)> = Vec::new();
    let mut blobs: Vec<(String, Vec<u8>)> = Vec::new();
    for entry in WalkDir::new(&args.input).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || classify(entry.path()) != Some("image") {
            continue;
        }
        let blob = fs::read(entry.path())?;
        let img = image::load_from_memory(&blob)
            .with_context(|| format!("decode {}", entry.path().display()))?;
        let key = entry
            .path()
            .strip_prefix(&args.input)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        items.push((key.clone(), img.width(), img.height()));
        blobs.push((key, blob));
    }
    if items.is_empty() {
        anyhow::bail!("no images under {}", args.input.display());
    }

    let cancel = CancelToken::new();
    let mut result = pack_tasks(&items, args.page_size, args.padding, &cancel)?;
    for oversize in &result.oversized {
        warn!(
            key = %oversize.key,
            w = oversize.width,
            h = oversize.height,
            page_size = args.page_size,
            "task exceeds page size; skipped"
        );
    }
    for (i, page) in result.pages.iter_mut().enumerate() {
        page.name = format!("{}_{i}.png", args.name);
    }

    let (canvases, _) = compose_pages(&result, &blobs, &cancel)?;
    fs::create_dir_all(&args.out_dir)?;
    for (name, canvas) in &canvases {
        fs::write(args.out_dir.join(name), encode_png(canvas)?)?;
    }
    let manifest = pages_to_manifest(&result.pages);
    fs::write(args.out_dir.join(format!("{}.atlas", args.name)), manifest)?;
    for page in &result.pages {
        info!(
            page = %page.name,
            rects = page.rects.len(),
            efficiency = format!("{:.1}%", page.efficiency * 100.0),
            "page written"
        );
    }
    Ok(())
}
