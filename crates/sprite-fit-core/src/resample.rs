//! Image downscaling: float pipeline, alpha-mode detection, iterative 2x2
//! pyramid reduction, separable Lanczos-3, alpha post-processing, triangular
//! dither, PNG export.

use std::f32::consts::PI;
use std::io::Cursor;

use image::{ImageFormat, RgbaImage};
use rand::Rng;
use tracing::debug;

use crate::error::{Result, SpriteFitError};

/// How the source encodes alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaMode {
    /// RGB is premultiplied; RGB gets clamped to alpha after resampling.
    Premultiplied,
    /// RGB is independent of alpha; additive/glow pixels are left alone.
    Straight,
}

/// RGBA float buffer, channel values on the 0..255 scale.
struct FloatImage {
    w: u32,
    h: u32,
    data: Vec<f32>,
}

impl FloatImage {
    fn from_rgba(img: &RgbaImage) -> Self {
        let (w, h) = img.dimensions();
        let data = img.as_raw().iter().map(|&b| b as f32).collect();
        Self { w, h, data }
    }
}

/// Decide the working alpha mode. A premultiplied hint is only trusted until
/// the pixels contradict it: any channel exceeding alpha by more than 2.0
/// (compression noise tolerance) proves straight alpha. Every 4th pixel is
/// enough evidence.
fn detect_alpha_mode(img: &FloatImage, hint_premultiplied: bool) -> AlphaMode {
    if !hint_premultiplied {
        return AlphaMode::Straight;
    }
    let pixels = (img.w as usize) * (img.h as usize);
    let mut i = 0;
    while i < pixels {
        let p = i * 4;
        let a = img.data[p + 3];
        if img.data[p] > a + 2.0 || img.data[p + 1] > a + 2.0 || img.data[p + 2] > a + 2.0 {
            return AlphaMode::Straight;
        }
        i += 4;
    }
    AlphaMode::Premultiplied
}

/// Halve both dimensions by averaging 2x2 blocks, channels independent.
/// Odd edges clamp to the last row/column.
fn halve(src: &FloatImage) -> FloatImage {
    let nw = (src.w / 2).max(1);
    let nh = (src.h / 2).max(1);
    let mut data = vec![0.0f32; (nw as usize) * (nh as usize) * 4];
    for y in 0..nh {
        for x in 0..nw {
            let x0 = x * 2;
            let y0 = y * 2;
            let x1 = (x0 + 1).min(src.w - 1);
            let y1 = (y0 + 1).min(src.h - 1);
            let o = ((y * nw + x) as usize) * 4;
            for c in 0..4 {
                let s = src.data[((y0 * src.w + x0) as usize) * 4 + c]
                    + src.data[((y0 * src.w + x1) as usize) * 4 + c]
                    + src.data[((y1 * src.w + x0) as usize) * 4 + c]
                    + src.data[((y1 * src.w + x1) as usize) * 4 + c];
                data[o + c] = s * 0.25;
            }
        }
    }
    FloatImage { w: nw, h: nh, data }
}

fn sinc(x: f32) -> f32 {
    if x.abs() < 1e-8 {
        1.0
    } else {
        x.sin() / x
    }
}

/// Lanczos kernel, radius 3.
fn lanczos3(x: f32) -> f32 {
    let ax = x.abs();
    if ax < 1e-8 {
        1.0
    } else if ax >= 3.0 {
        0.0
    } else {
        sinc(PI * x) * sinc(PI * x / 3.0)
    }
}

/// One separable pass. `horizontal` resizes width, otherwise height.
fn lanczos_pass(src: &FloatImage, target: u32, horizontal: bool) -> FloatImage {
    let (src_len, lines) = if horizontal {
        (src.w, src.h)
    } else {
        (src.h, src.w)
    };
    let ratio = src_len as f32 / target as f32;
    let (nw, nh) = if horizontal {
        (target, src.h)
    } else {
        (src.w, target)
    };
    let mut data = vec![0.0f32; (nw as usize) * (nh as usize) * 4];

    // Tap weights depend only on the output coordinate; compute per output
    // column (or row) once and sweep the perpendicular axis.
    let mut taps: Vec<(i64, f32)> = Vec::with_capacity(8);
    for out_c in 0..target {
        let center = (out_c as f32 + 0.5) * ratio - 0.5;
        let first = center.floor() as i64 - 2;
        taps.clear();
        let mut sum = 0.0f32;
        for t in 0..6 {
            let idx = first + t;
            let weight = lanczos3(idx as f32 - center);
            sum += weight;
            taps.push((idx.clamp(0, src_len as i64 - 1), weight));
        }
        let norm = if sum.abs() > 1e-8 { 1.0 / sum } else { 1.0 };

        for line in 0..lines {
            let mut acc = [0.0f32; 4];
            for &(idx, weight) in &taps {
                let (sx, sy) = if horizontal {
                    (idx as u32, line)
                } else {
                    (line, idx as u32)
                };
                let p = ((sy * src.w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += src.data[p + c] * weight;
                }
            }
            let (ox, oy) = if horizontal { (out_c, line) } else { (line, out_c) };
            let o = ((oy * nw + ox) as usize) * 4;
            for c in 0..4 {
                data[o + c] = acc[c] * norm;
            }
        }
    }
    FloatImage { w: nw, h: nh, data }
}

/// Triangular-distribution noise in [-1, 1]: sum of two uniforms minus 1.
fn triangular_noise(rng: &mut impl Rng) -> f32 {
    rng.gen::<f32>() + rng.gen::<f32>() - 1.0
}

/// Downscale `blob` to exactly `target` and encode as PNG.
///
/// `hint_premultiplied` seeds the alpha-mode detection; see [`AlphaMode`].
/// The source is decoded without premultiplication or color conversion.
pub fn resample(blob: &[u8], target: (u32, u32), hint_premultiplied: bool) -> Result<Vec<u8>> {
    let (tw, th) = (target.0.max(1), target.1.max(1));
    let decoded = image::load_from_memory(blob)?.to_rgba8();
    let mut img = FloatImage::from_rgba(&decoded);
    let mode = detect_alpha_mode(&img, hint_premultiplied);
    debug!(
        src_w = img.w,
        src_h = img.h,
        tw,
        th,
        ?mode,
        "resampling image"
    );

    // Pyramid: halving is cheap and keeps the Lanczos support meaningful
    // for large reduction ratios.
    while img.w > tw * 2 && img.h > th * 2 {
        img = halve(&img);
    }

    if img.w != tw {
        img = lanczos_pass(&img, tw, true);
    }
    if img.h != th {
        img = lanczos_pass(&img, th, false);
    }

    if mode == AlphaMode::Premultiplied {
        // Ringing past the alpha mask shows up as halos; premultiplied data
        // can never have RGB above alpha.
        for p in img.data.chunks_exact_mut(4) {
            let a = p[3];
            for c in p.iter_mut().take(3) {
                if *c > a {
                    *c = a;
                }
            }
        }
    }

    let mut rng = rand::thread_rng();
    let mut out = RgbaImage::new(tw, th);
    for (i, px) in out.pixels_mut().enumerate() {
        let p = i * 4;
        for c in 0..4 {
            let v = img.data[p + c] + triangular_noise(&mut rng);
            px.0[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }

    let mut buf = Vec::new();
    out.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| SpriteFitError::Encode(e.to_string()))?;
    Ok(buf)
}
