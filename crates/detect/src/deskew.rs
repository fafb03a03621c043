use image::{GrayImage, ImageBuffer, Luma};
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions};
use tillcut_core::DeskewConfig;
use tracing::{debug, info};

/// What the line statistics say about page tilt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkewEstimate {
    /// No usable lines; nothing to act on.
    NoLines,
    /// Median deviation in degrees, within tolerance.
    Straight(f32),
    /// Median deviation in degrees, large enough to correct.
    Skewed(f32),
}

/// Estimate skew from Hough lines over a Canny edge map.
pub fn estimate_skew(gray: &GrayImage, config: &DeskewConfig) -> SkewEstimate {
    let edges = canny(gray, config.canny_low, config.canny_high);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold: config.hough_vote_threshold,
            suppression_radius: config.hough_suppression_radius,
        },
    );
    debug!(lines = lines.len(), "Hough lines detected for deskew");
    skew_from_angles(lines.iter().map(|l| l.angle_in_degrees), config)
}

/// Median deviation from horizontal of lines given by their normal angle in degrees.
///
/// A normal angle of 90° is a horizontal line; positive deviations are lines
/// descending to the right.
pub fn skew_from_angles<I>(normal_angles: I, config: &DeskewConfig) -> SkewEstimate
where
    I: IntoIterator<Item = u32>,
{
    let mut deviations: Vec<f32> = normal_angles
        .into_iter()
        .map(|angle| angle as f32 - 90.0)
        .filter(|d| d.abs() < config.max_deviation_deg)
        .collect();

    let Some(angle) = median(&mut deviations) else {
        return SkewEstimate::NoLines;
    };
    if angle.abs() > config.min_correction_deg {
        SkewEstimate::Skewed(angle)
    } else {
        SkewEstimate::Straight(angle)
    }
}

fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Rotate the page upright when its skew exceeds the tolerance; otherwise
/// hand the buffer back untouched.
pub fn deskew(gray: GrayImage, config: &DeskewConfig) -> GrayImage {
    match estimate_skew(&gray, config) {
        SkewEstimate::NoLines => {
            debug!("No usable lines for deskew, keeping page as is");
            gray
        }
        SkewEstimate::Straight(angle) => {
            debug!(angle, "Skew within tolerance, skipping deskew");
            gray
        }
        SkewEstimate::Skewed(angle) => {
            info!(angle, "Deskewing page");
            rotate_expanded(&gray, -angle)
        }
    }
}

/// Rotate clockwise by `degrees` about the image center with bicubic sampling.
///
/// The canvas grows to hold the whole rotated page and never shrinks below
/// the input size; pixels that map outside the source repeat the nearest edge.
pub fn rotate_expanded(gray: &GrayImage, degrees: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let theta = degrees.to_radians();
    let (sin, cos) = theta.sin_cos();

    let new_w = ((width as f32 * cos.abs() + height as f32 * sin.abs()).ceil() as u32).max(width);
    let new_h = ((width as f32 * sin.abs() + height as f32 * cos.abs()).ceil() as u32).max(height);

    let (cx, cy) = ((width as f32 - 1.0) / 2.0, (height as f32 - 1.0) / 2.0);
    let (ncx, ncy) = ((new_w as f32 - 1.0) / 2.0, (new_h as f32 - 1.0) / 2.0);

    ImageBuffer::from_fn(new_w, new_h, |x, y| {
        let dx = x as f32 - ncx;
        let dy = y as f32 - ncy;
        // Inverse of a clockwise rotation in y-down pixel space.
        let sx = dx * cos + dy * sin + cx;
        let sy = -dx * sin + dy * cos + cy;
        Luma([sample_bicubic(gray, sx, sy)])
    })
}

/// Catmull-Rom style cubic weights (a = -0.75) for fractional offset `t`.
fn cubic_weights(t: f32) -> [f32; 4] {
    const A: f32 = -0.75;
    let w0 = ((A * (t + 1.0) - 5.0 * A) * (t + 1.0) + 8.0 * A) * (t + 1.0) - 4.0 * A;
    let w1 = ((A + 2.0) * t - (A + 3.0)) * t * t + 1.0;
    let w2 = ((A + 2.0) * (1.0 - t) - (A + 3.0)) * (1.0 - t) * (1.0 - t) + 1.0;
    [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

fn sample_bicubic(gray: &GrayImage, x: f32, y: f32) -> u8 {
    let (width, height) = (gray.width() as i64, gray.height() as i64);
    let (x0, y0) = (x.floor(), y.floor());
    let wx = cubic_weights(x - x0);
    let wy = cubic_weights(y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let mut acc = 0.0f32;
    for (j, wy) in wy.iter().enumerate() {
        let sy = (y0 - 1 + j as i64).clamp(0, height - 1) as u32;
        let mut row = 0.0f32;
        for (i, wx) in wx.iter().enumerate() {
            let sx = (x0 - 1 + i as i64).clamp(0, width - 1) as u32;
            row += wx * gray.get_pixel(sx, sy)[0] as f32;
        }
        acc += wy * row;
    }
    acc.round().clamp(0.0, 255.0) as u8
}
