//! Atlas unpacking: cut regions back out of their pages as standalone PNGs.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};
use tracing::warn;

use crate::error::{Result, SpriteFitError};
use crate::index::ImageIndex;
use crate::model::{AtlasMetadata, AtlasRegion};

/// One extracted sprite, pixels exact, alpha preserved.
#[derive(Debug, Clone)]
pub struct UnpackedSprite {
    pub name: String,
    /// Output filename: the region name with `.png` appended if absent.
    pub file_name: String,
    pub rgba: RgbaImage,
}

impl UnpackedSprite {
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.rgba)
    }
}

pub fn encode_png(rgba: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| SpriteFitError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Copy a region out of its page into a canvas of the logical sprite size.
///
/// Rotated regions are stored 90 degrees counter-clockwise, so the restore
/// maps canvas top to source left and canvas left to source bottom:
/// `canvas(x, y) = page(rx + y, ry + storedH - 1 - x)`.
pub fn extract_region(page: &RgbaImage, region: &AtlasRegion) -> RgbaImage {
    let (pw, ph) = page.dimensions();
    let sh = region.stored_height();
    let mut canvas = RgbaImage::new(region.width.max(1), region.height.max(1));
    for yy in 0..region.height {
        for xx in 0..region.width {
            let (ix, iy) = if region.rotated {
                (region.x + yy, region.y + (sh - 1).saturating_sub(xx))
            } else {
                (region.x + xx, region.y + yy)
            };
            if ix < pw && iy < ph {
                canvas.put_pixel(xx, yy, *page.get_pixel(ix, iy));
            }
        }
    }
    canvas
}

/// Unpack every region of a parsed manifest whose page image is present in
/// the index. A missing page skips its regions with a warning; it never
/// fails the run.
pub fn unpack_atlas(meta: &AtlasMetadata, index: &ImageIndex) -> Result<Vec<UnpackedSprite>> {
    let mut out = Vec::new();
    for page_name in meta.page_names() {
        let Some(asset) = index.find(&page_name) else {
            warn!(page = %page_name, "atlas page image not found; skipping its regions");
            continue;
        };
        // Decode fresh and straight: no premultiply, no color conversion.
        let page = image::load_from_memory(&asset.blob)?.to_rgba8();
        for region in meta.regions.iter().filter(|r| r.page_name == page_name) {
            let rgba = extract_region(&page, region);
            let file_name = if region.name.to_lowercase().ends_with(".png") {
                region.name.clone()
            } else {
                format!("{}.png", region.name)
            };
            out.push(UnpackedSprite {
                name: region.name.clone(),
                file_name,
                rgba,
            });
        }
    }
    Ok(out)
}
