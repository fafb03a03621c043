use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use std::path::Path;
use thiserror::Error;
use tillcut_core::PreprocessConfig;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
}

/// Decode an image file of any format the `image` crate understands.
pub fn load_image(path: &Path) -> Result<DynamicImage, PreprocessError> {
    Ok(image::open(path)?)
}

/// Grayscale + local equalization + contrast stretch + edge boost.
///
/// Always returns a buffer with the same dimensions as the input.
pub fn preprocess(img: &DynamicImage, config: &PreprocessConfig) -> GrayImage {
    let gray = img.to_luma8();
    let equalized = equalize_local(&gray, config.clahe_tiles, config.clahe_clip_limit);
    let stretched = stretch_contrast(equalized, config.min_stretch_range);
    sharpen(&stretched, config.sharpen_center)
}

/// Contrast-limited adaptive histogram equalization over a `tiles` × `tiles` grid.
///
/// Each tile gets its own clipped-histogram lookup table; pixels blend the
/// tables of the four nearest tile centers bilinearly so tile seams do not show.
/// Every tile has the same size: when the grid overhangs the page, the
/// overhang is filled by mirroring the last rows and columns.
pub fn equalize_local(gray: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tiles_x = tiles.clamp(1, width);
    let tiles_y = tiles.clamp(1, height);
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);
    let tile_area = tile_w * tile_h;

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0u32; 256];
            for y in ty * tile_h..(ty + 1) * tile_h {
                let sy = mirror(y, height);
                for x in tx * tile_w..(tx + 1) * tile_w {
                    hist[gray.get_pixel(mirror(x, width), sy)[0] as usize] += 1;
                }
            }
            luts.push(clipped_lut(&mut hist, tile_area, clip_limit));
        }
    }

    let lut = |tx: i64, ty: i64| -> &[u8; 256] {
        let tx = tx.clamp(0, tiles_x as i64 - 1) as u32;
        let ty = ty.clamp(0, tiles_y as i64 - 1) as u32;
        &luts[(ty * tiles_x + tx) as usize]
    };

    ImageBuffer::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;
        // Position in tile-center coordinates.
        let gx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let gy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let (tx, ty) = (gx.floor(), gy.floor());
        let (fx, fy) = (gx - tx, gy - ty);
        let (tx, ty) = (tx as i64, ty as i64);

        let top = lut(tx, ty)[v] as f32 * (1.0 - fx) + lut(tx + 1, ty)[v] as f32 * fx;
        let bottom = lut(tx, ty + 1)[v] as f32 * (1.0 - fx) + lut(tx + 1, ty + 1)[v] as f32 * fx;
        Luma([(top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8])
    })
}

/// Reflect an index past the end back into `0..len`, without repeating the edge.
fn mirror(i: u32, len: u32) -> u32 {
    if i < len {
        i
    } else if len < 2 {
        0
    } else {
        (2 * (len - 1)).saturating_sub(i)
    }
}

/// Clip the histogram at `clip_limit` × mean bin height, spread the excess
/// evenly, and turn the result into a cumulative lookup table.
fn clipped_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let bonus = excess / 256;
    let residual = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += bonus + u32::from(i < residual);
    }

    let mut lut = [0u8; 256];
    let mut cumulative = 0u64;
    let area = area.max(1) as u64;
    for (i, bin) in hist.iter().enumerate() {
        cumulative += *bin as u64;
        lut[i] = (cumulative * 255 / area).min(255) as u8;
    }
    lut
}

/// Linear min–max stretch to the full 0–255 range.
///
/// Images whose range is below `min_range` levels are returned untouched, so
/// rounding ripple on a blank page is not blown up into fake edges.
pub fn stretch_contrast(gray: GrayImage, min_range: u8) -> GrayImage {
    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));

    if max_px <= min_px || max_px - min_px < min_range {
        return gray;
    }

    let range = (max_px - min_px) as u32;
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0];
        Luma([((p - min_px) as u32 * 255 / range) as u8])
    })
}

/// 3×3 sharpening: `center` × pixel minus its eight neighbors, clamped to 0–255.
/// Edge pixels reuse the nearest in-bounds neighbor.
pub fn sharpen(gray: &GrayImage, center: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let at = |x: i64, y: i64| -> f32 {
        let x = x.clamp(0, width as i64 - 1) as u32;
        let y = y.clamp(0, height as i64 - 1) as u32;
        gray.get_pixel(x, y)[0] as f32
    };

    ImageBuffer::from_fn(width, height, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let mut acc = center * at(x, y);
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx != 0 || dy != 0 {
                    acc -= at(x + dx, y + dy);
                }
            }
        }
        Luma([acc.round().clamp(0.0, 255.0) as u8])
    })
}
