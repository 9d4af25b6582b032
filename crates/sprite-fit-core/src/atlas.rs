//! Textual atlas manifest codec.
//!
//! The manifest is line-oriented: blank lines delimit page blocks, the first
//! non-empty line of a block is the page filename, and region names are
//! interleaved with `key: value` property lines. Only `rotate`, `xy`, `size`,
//! `orig`, `offset` and `index` are meaningful; page-level properties
//! (`format`, `filter`, `repeat`, ...) are skipped.

use crate::error::{Result, SpriteFitError};
use crate::model::{AtlasMetadata, AtlasRegion, AtlasPage};

const IMAGE_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".webp"];

/// Heal a page filename: collapse stacked image extensions (`foo.png.png`)
/// and guarantee exactly one, defaulting to `.png`.
pub fn sanitize_page_name(raw: &str) -> String {
    let mut stem = raw.trim();
    let mut detected: Option<&str> = None;
    loop {
        let lower = stem.to_lowercase();
        let hit = IMAGE_EXTENSIONS
            .iter()
            .find(|ext| lower.ends_with(*ext))
            .copied();
        match hit {
            Some(ext) => {
                stem = &stem[..stem.len() - ext.len()];
                detected = Some(ext);
            }
            None => break,
        }
    }
    format!("{stem}{}", detected.unwrap_or(".png"))
}

struct PendingRegion {
    name: String,
    x: u32,
    y: u32,
    stored_w: u32,
    stored_h: u32,
    orig: Option<(u32, u32)>,
    offset: (i32, i32),
    rotated: bool,
    index: i32,
}

impl PendingRegion {
    fn new(name: String) -> Self {
        Self {
            name,
            x: 0,
            y: 0,
            stored_w: 0,
            stored_h: 0,
            orig: None,
            offset: (0, 0),
            rotated: false,
            index: -1,
        }
    }

    fn finish(self, page_name: &str) -> AtlasRegion {
        // Emit logical orientation: a rotated region's sprite extent is the
        // swap of its stored rectangle.
        let (width, height) = if self.rotated {
            (self.stored_h, self.stored_w)
        } else {
            (self.stored_w, self.stored_h)
        };
        let (original_width, original_height) = self.orig.unwrap_or((width, height));
        AtlasRegion {
            page_name: page_name.to_string(),
            name: self.name,
            x: self.x,
            y: self.y,
            width,
            height,
            original_width,
            original_height,
            offset_x: self.offset.0,
            offset_y: self.offset.1,
            rotated: self.rotated,
            index: self.index,
        }
    }
}

fn parse_pair(value: &str, line: usize) -> Result<(i64, i64)> {
    let mut it = value.split(',').map(|p| p.trim());
    let a = it
        .next()
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(SpriteFitError::MalformedAtlas {
            line,
            reason: format!("expected two comma-separated integers, got '{value}'"),
        })?;
    let b = it
        .next()
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(SpriteFitError::MalformedAtlas {
            line,
            reason: format!("expected two comma-separated integers, got '{value}'"),
        })?;
    Ok((a, b))
}

fn parse_upair(value: &str, line: usize) -> Result<(u32, u32)> {
    let (a, b) = parse_pair(value, line)?;
    if a < 0 || b < 0 {
        return Err(SpriteFitError::MalformedAtlas {
            line,
            reason: format!("expected non-negative pair, got '{value}'"),
        });
    }
    Ok((a as u32, b as u32))
}

/// Parse an atlas manifest. Accepts LF or CRLF input.
pub fn parse_atlas(text: &str) -> Result<AtlasMetadata> {
    let mut regions: Vec<AtlasRegion> = Vec::new();
    let mut page: Option<String> = None;
    let mut pending: Option<PendingRegion> = None;

    for (i, raw_line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            if let (Some(p), Some(r)) = (&page, pending.take()) {
                regions.push(r.finish(p));
            }
            page = None;
            continue;
        }

        let Some(current_page) = &page else {
            page = Some(sanitize_page_name(line));
            continue;
        };

        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            let Some(region) = pending.as_mut() else {
                // Page-level property; nothing here affects regions.
                continue;
            };
            match key {
                "rotate" => region.rotated = value == "true" || value == "90",
                "xy" => {
                    let (x, y) = parse_upair(value, line_no)?;
                    region.x = x;
                    region.y = y;
                }
                "size" => {
                    let (w, h) = parse_upair(value, line_no)?;
                    region.stored_w = w;
                    region.stored_h = h;
                }
                "orig" => {
                    region.orig = Some(parse_upair(value, line_no)?);
                }
                "offset" => {
                    let (ox, oy) = parse_pair(value, line_no)?;
                    region.offset = (ox as i32, oy as i32);
                }
                "index" => {
                    region.index =
                        value
                            .parse::<i32>()
                            .map_err(|_| SpriteFitError::MalformedAtlas {
                                line: line_no,
                                reason: format!("bad index '{value}'"),
                            })?;
                }
                _ => {} // unrecognized region property
            }
        } else {
            if let Some(r) = pending.take() {
                regions.push(r.finish(current_page));
            }
            pending = Some(PendingRegion::new(line.to_string()));
        }
    }
    if let (Some(p), Some(r)) = (&page, pending.take()) {
        regions.push(r.finish(p));
    }

    Ok(AtlasMetadata { regions })
}

/// Serialize metadata back into manifest text, grouping regions by page.
///
/// `parse_atlas(write_atlas(m))` reproduces `m` up to field ordering.
pub fn write_atlas(meta: &AtlasMetadata, page_sizes: &[(String, u32, u32)]) -> String {
    let mut out = String::new();
    for page in meta.page_names() {
        out.push('\n');
        out.push_str(&page);
        out.push('\n');
        if let Some((_, w, h)) = page_sizes.iter().find(|(n, _, _)| n == &page) {
            out.push_str(&format!("size: {w},{h}\n"));
        }
        out.push_str("format: RGBA8888\n");
        out.push_str("filter: Linear,Linear\n");
        out.push_str("repeat: none\n");
        for r in meta.regions.iter().filter(|r| r.page_name == page) {
            out.push_str(&r.name);
            out.push('\n');
            out.push_str(&format!("  rotate: {}\n", r.rotated));
            out.push_str(&format!("  xy: {}, {}\n", r.x, r.y));
            out.push_str(&format!(
                "  size: {}, {}\n",
                r.stored_width(),
                r.stored_height()
            ));
            out.push_str(&format!(
                "  orig: {}, {}\n",
                r.original_width, r.original_height
            ));
            out.push_str(&format!("  offset: {}, {}\n", r.offset_x, r.offset_y));
            out.push_str(&format!("  index: {}\n", r.index));
        }
    }
    out
}

/// Manifest text for packed pages, one region per placed rect.
pub fn pages_to_manifest(pages: &[AtlasPage]) -> String {
    let regions: Vec<AtlasRegion> = pages
        .iter()
        .flat_map(|page| {
            page.rects.iter().map(|r| AtlasRegion {
                page_name: page.name.clone(),
                name: r.key.clone(),
                x: r.x,
                y: r.y,
                width: r.w,
                height: r.h,
                original_width: r.w,
                original_height: r.h,
                offset_x: 0,
                offset_y: 0,
                rotated: false,
                index: -1,
            })
        })
        .collect();
    let sizes: Vec<(String, u32, u32)> = pages
        .iter()
        .map(|p| (p.name.clone(), p.width, p.height))
        .collect();
    write_atlas(&AtlasMetadata { regions }, &sizes)
}
