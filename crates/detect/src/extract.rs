use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::edges::canny;
use tillcut_core::{BoundingBox, CandidateRegion, ExtractConfig, RejectionReason, RejectionStage};
use tracing::{debug, info, warn};

use crate::acceptance::{assess, is_accepted};
use crate::morphology::{adaptive_threshold_inv, close_rect, open_rect};

/// Candidate regions found on a page plus every contour that was turned down.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Accepted regions, top to bottom.
    pub regions: Vec<CandidateRegion>,
    pub rejections: Vec<RejectionReason>,
    /// External contours examined.
    pub contours_examined: usize,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Find receipt-shaped blobs on an oriented grayscale page.
///
/// Ink is binarized against its neighborhood, then a tall closing merges the
/// text lines of one receipt into a single blob before the outer contours of
/// the blob edges are scored.
pub fn extract_regions(gray: &GrayImage, config: &ExtractConfig) -> Extraction {
    let (width, height) = gray.dimensions();
    let binary = adaptive_threshold_inv(gray, config.threshold_block_size, config.threshold_offset);
    let [close_w, close_h] = config.close_kernel;
    let [open_w, open_h] = config.open_kernel;
    let merged = open_rect(&close_rect(&binary, close_w, close_h), open_w, open_h);
    let edges = canny(&merged, config.canny_low, config.canny_high);

    let contours: Vec<Contour<u32>> = find_contours::<u32>(&edges)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .collect();

    if contours.is_empty() {
        warn!("No contours found after edge detection");
        return Extraction::default();
    }
    info!(
        contours = contours.len(),
        width, height, "Evaluating contours for receipt regions"
    );

    let mut extraction = Extraction {
        contours_examined: contours.len(),
        ..Extraction::default()
    };

    for (idx, contour) in contours.iter().enumerate() {
        let points: Vec<(u32, u32)> = contour.points.iter().map(|p| (p.x, p.y)).collect();
        let Some(bbox) = BoundingBox::enclosing(points.iter().copied()) else {
            continue;
        };
        let assessment = assess(bbox, polygon_area(&points), width, height, config);

        if is_accepted(&assessment, config) {
            info!(
                contour = idx + 1,
                score = %assessment.score,
                bbox = %bbox,
                area_pct = assessment.area_ratio * 100.0,
                aspect = assessment.aspect_ratio,
                "Contour accepted"
            );
            extraction.regions.push(CandidateRegion {
                index: idx,
                bbox,
                contour: points,
                score: assessment.score,
                area_ratio: assessment.area_ratio,
            });
        } else {
            let reason = RejectionReason {
                contour_index: idx,
                stage: RejectionStage::Extraction,
                bbox,
                area_ratio: assessment.area_ratio,
                aspect_ratio: assessment.aspect_ratio,
                score: assessment.score,
                message: assessment.describe_failures(),
                failures: assessment.failures,
            };
            warn!(%reason, "Contour rejected");
            extraction.rejections.push(reason);
        }
    }

    sort_top_to_bottom(&mut extraction.regions);
    info!(
        accepted = extraction.regions.len(),
        rejected = extraction.rejections.len(),
        "Contour filtering finished"
    );
    extraction
}

/// Order by the top edge of the bounding box and renumber accordingly.
pub fn sort_top_to_bottom(regions: &mut [CandidateRegion]) {
    regions.sort_by_key(|r| r.bbox.y);
    for (index, region) in regions.iter_mut().enumerate() {
        region.index = index;
    }
    debug!(regions = regions.len(), "Regions ordered top to bottom");
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[(u32, u32)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(&(x0, y0), &(x1, y1))| x0 as f64 * y1 as f64 - x1 as f64 * y0 as f64)
        .sum();
    twice.abs() / 2.0
}
