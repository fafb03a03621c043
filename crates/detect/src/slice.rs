//! Splitting of tall regions that hold several stacked receipts.
//!
//! Works on the row projection of the region: rows over text are bright or
//! busy, the blank paper or table between two receipts is a low valley.

use image::GrayImage;
use tillcut_core::{Slice, SliceConfig};
use tracing::{debug, info};

use crate::projection::{mean, row_sums};

/// Result of projection analysis on one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceOutcome {
    /// Two or more stacked receipts, top to bottom.
    Split(Vec<Slice>),
    /// No usable split; the region is one receipt.
    Whole,
}

impl SliceOutcome {
    /// Slices to persist for a region of `height` rows; never empty.
    pub fn into_slices(self, height: u32) -> Vec<Slice> {
        match self {
            SliceOutcome::Split(slices) => slices,
            SliceOutcome::Whole => vec![Slice::new(0, height)],
        }
    }
}

/// Whether a region of `region_height` rows is tall enough to hold stacked receipts.
pub fn needs_slicing(region_height: u32, page_height: u32, config: &SliceConfig) -> bool {
    region_height as f64 > page_height as f64 * config.trigger_height_ratio
}

/// Split a region at the valleys of its row projection.
pub fn slice_region(region: &GrayImage, config: &SliceConfig) -> SliceOutcome {
    let height = region.height();
    if height == 0 {
        return SliceOutcome::Whole;
    }
    let profile = normalized_profile(region);
    let threshold = mean(&profile) * config.valley_threshold_ratio as f64;

    let mut splits = gap_midpoints(&profile, threshold);
    if splits.is_empty() {
        splits = local_minima(&profile, threshold);
        suppress_close(&mut splits, (height as f64 * config.min_split_distance_ratio) as usize);
        debug!(candidates = splits.len(), "Falling back to local minima");
    }

    let margin = height as f64 * config.edge_margin_ratio;
    splits.retain(|&s| s as f64 > margin && (s as f64) < height as f64 - margin);
    splits.sort_unstable();

    let slices = cut(height, &splits, height as f64 * config.min_slice_ratio);
    if slices.len() < 2 {
        debug!(height, "No usable split points, keeping region whole");
        return SliceOutcome::Whole;
    }
    info!(slices = slices.len(), height, "Split region into stacked receipts");
    SliceOutcome::Split(slices)
}

/// Row projection scaled so the strongest row is 1.0.
fn normalized_profile(region: &GrayImage) -> Vec<f64> {
    let sums = row_sums(region);
    let max = sums.iter().copied().fold(0.0f64, f64::max);
    if max > 0.0 {
        sums.iter().map(|&s| s / max).collect()
    } else {
        sums
    }
}

/// Midpoints of the gaps between consecutive runs that rise above `threshold`.
fn gap_midpoints(profile: &[f64], threshold: f64) -> Vec<usize> {
    let mut splits = Vec::new();
    let mut seen_text = false;
    let mut gap_start: Option<usize> = None;

    for (i, &value) in profile.iter().enumerate() {
        let is_text = value > threshold;
        match (is_text, gap_start) {
            (true, Some(start)) => {
                splits.push((start + i) / 2);
                gap_start = None;
            }
            (true, None) => seen_text = true,
            (false, None) if seen_text => gap_start = Some(i),
            _ => {}
        }
    }
    splits
}

/// Rows below `threshold` that are strictly lower than both neighbors.
fn local_minima(profile: &[f64], threshold: f64) -> Vec<usize> {
    profile
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] < threshold && w[1] < w[0] && w[1] < w[2])
        .map(|(i, _)| i + 1)
        .collect()
}

/// Drop split points closer than `min_distance` to the previously kept one.
fn suppress_close(splits: &mut Vec<usize>, min_distance: usize) {
    let mut last: Option<usize> = None;
    splits.retain(|&s| match last {
        Some(prev) if s - prev < min_distance => false,
        _ => {
            last = Some(s);
            true
        }
    });
}

/// Cut `[0, height)` at sorted split points. A cut that would leave a piece
/// no taller than `min_height` is skipped, and a short tail is dropped.
fn cut(height: u32, splits: &[usize], min_height: f64) -> Vec<Slice> {
    let mut slices = Vec::new();
    let mut start = 0u32;
    for &split in splits {
        let split = split as u32;
        if (split - start) as f64 > min_height {
            slices.push(Slice::new(start, split));
            start = split;
        }
    }
    if (height - start) as f64 > min_height {
        slices.push(Slice::new(start, height));
    }
    slices
}
