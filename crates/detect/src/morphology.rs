//! Binary mask operations used by region extraction.
//!
//! Masks hold 0 for background and 255 for foreground. Rectangular
//! structuring elements are applied separably with running counts, so the
//! cost does not depend on the kernel size.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;

const FOREGROUND: u8 = 255;

/// Gaussian-weighted local threshold with inverted polarity: pixels at least
/// `offset` darker than their neighborhood become foreground.
pub fn adaptive_threshold_inv(gray: &GrayImage, block_size: u32, offset: i32) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    let local_mean = gaussian_blur_f32(gray, block_sigma(block_size));
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0] as i32;
        let mean = local_mean.get_pixel(x, y)[0] as i32;
        Luma([if p - mean <= -offset { FOREGROUND } else { 0 }])
    })
}

/// Standard deviation matching a Gaussian kernel of side `block_size`.
fn block_sigma(block_size: u32) -> f32 {
    (0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8).max(0.5)
}

pub fn dilate_rect(mask: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    let horizontal = sweep_rows(mask, kernel_w, |count, _| count > 0);
    sweep_columns(&horizontal, kernel_h, |count, _| count > 0)
}

pub fn erode_rect(mask: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    // Only in-bounds pixels take part, so borders do not erode the mask.
    let horizontal = sweep_rows(mask, kernel_w, |count, window| count == window);
    sweep_columns(&horizontal, kernel_h, |count, window| count == window)
}

/// Dilation followed by erosion: bridges gaps smaller than the kernel.
pub fn close_rect(mask: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    erode_rect(&dilate_rect(mask, kernel_w, kernel_h), kernel_w, kernel_h)
}

/// Erosion followed by dilation: removes specks smaller than the kernel.
pub fn open_rect(mask: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    dilate_rect(&erode_rect(mask, kernel_w, kernel_h), kernel_w, kernel_h)
}

/// Window bounds `[lo, hi)` around `i` for a kernel of `size`, anchored at its center.
fn window(i: usize, size: usize, len: usize) -> (usize, usize) {
    let before = size / 2;
    let after = size - 1 - before;
    (i.saturating_sub(before), (i + after + 1).min(len))
}

fn sweep_rows<F>(mask: &GrayImage, size: u32, keep: F) -> GrayImage
where
    F: Fn(usize, usize) -> bool,
{
    let (width, height) = mask.dimensions();
    let w = width as usize;
    let mut out = GrayImage::new(width, height);
    if w == 0 {
        return out;
    }
    let mut prefix = vec![0usize; w + 1];
    for (src, dst) in mask.as_raw().chunks_exact(w).zip(out.chunks_exact_mut(w)) {
        for (i, &p) in src.iter().enumerate() {
            prefix[i + 1] = prefix[i] + usize::from(p != 0);
        }
        for (i, px) in dst.iter_mut().enumerate() {
            let (lo, hi) = window(i, size as usize, w);
            if keep(prefix[hi] - prefix[lo], hi - lo) {
                *px = FOREGROUND;
            }
        }
    }
    out
}

fn sweep_columns<F>(mask: &GrayImage, size: u32, keep: F) -> GrayImage
where
    F: Fn(usize, usize) -> bool,
{
    let (width, height) = mask.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut out = GrayImage::new(width, height);
    let src = mask.as_raw();
    let mut prefix = vec![0usize; h + 1];
    for x in 0..w {
        for y in 0..h {
            prefix[y + 1] = prefix[y] + usize::from(src[y * w + x] != 0);
        }
        for y in 0..h {
            let (lo, hi) = window(y, size as usize, h);
            if keep(prefix[hi] - prefix[lo], hi - lo) {
                out.put_pixel(x as u32, y as u32, Luma([FOREGROUND]));
            }
        }
    }
    out
}
