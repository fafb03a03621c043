//! Scoring and acceptance of contours as receipt candidates.
//!
//! Deliberately permissive: faint receipts often fail one or more geometric
//! checks, so any single passed criterion, a modest area, or a reasonable
//! pixel size is enough. Only near-full-page contours are always refused.

use tillcut_core::{AcceptanceScore, BoundingBox, Criterion, CriterionFailure, ExtractConfig};

/// Measured geometry of one contour against the page it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub bbox: BoundingBox,
    pub area_ratio: f64,
    pub aspect_ratio: f64,
    pub score: AcceptanceScore,
    pub failures: Vec<CriterionFailure>,
}

impl Assessment {
    pub fn is_full_page(&self) -> bool {
        self.failures.iter().any(|f| f.criterion == Criterion::FullPage)
    }

    /// Comma-separated description of every failed criterion.
    pub fn describe_failures(&self) -> String {
        self.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Score a contour's bounding box and area against the four criteria.
pub fn assess(
    bbox: BoundingBox,
    contour_area: f64,
    page_width: u32,
    page_height: u32,
    config: &ExtractConfig,
) -> Assessment {
    let page_area = page_width as f64 * page_height as f64;
    let area_ratio = if page_area > 0.0 { contour_area / page_area } else { 0.0 };
    let aspect_ratio = bbox.aspect_ratio();

    let checks = [
        (Criterion::Height, bbox.height as f64, page_height as f64 * config.min_height_ratio),
        (Criterion::Width, bbox.width as f64, page_width as f64 * config.min_width_ratio),
        (Criterion::Aspect, aspect_ratio, config.min_aspect_ratio),
        (Criterion::Area, area_ratio, config.min_area_ratio),
    ];

    let mut score = AcceptanceScore::zero();
    let mut failures = Vec::new();
    for (criterion, measured, required) in checks {
        if measured > required {
            score = score.bump();
        } else {
            failures.push(CriterionFailure { criterion, measured, required });
        }
    }

    if area_ratio > config.max_area_ratio {
        failures.push(CriterionFailure {
            criterion: Criterion::FullPage,
            measured: area_ratio,
            required: config.max_area_ratio,
        });
        score = AcceptanceScore::zero();
    }

    Assessment { bbox, area_ratio, aspect_ratio, score, failures }
}

/// The acceptance policy: refuse near-full-page contours, otherwise accept on
/// any passed criterion, a non-trivial area, or both sides above the pixel floor.
pub fn is_accepted(assessment: &Assessment, config: &ExtractConfig) -> bool {
    if assessment.area_ratio > config.max_area_ratio {
        return false;
    }
    let reasonably_sized =
        assessment.bbox.width > config.min_side_px && assessment.bbox.height > config.min_side_px;
    assessment.score.value() >= 1
        || assessment.area_ratio > config.fallback_area_ratio
        || reasonably_sized
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_W: u32 = 1000;
    const PAGE_H: u32 = 2000;

    fn config() -> ExtractConfig {
        ExtractConfig::default()
    }

    fn page_area() -> f64 {
        PAGE_W as f64 * PAGE_H as f64
    }

    #[test]
    fn just_above_every_threshold_scores_four() {
        // Height > 20px, width > 30px, aspect > 0.3, area > 0.1% (2000px²).
        let bbox = BoundingBox::new(10, 10, 31, 66);
        let area = page_area() * 0.00101;
        let assessment = assess(bbox, area, PAGE_W, PAGE_H, &config());
        assert_eq!(assessment.score.value(), 4);
        assert!(assessment.failures.is_empty());
        assert!(is_accepted(&assessment, &config()));
    }

    #[test]
    fn near_full_page_is_always_rejected() {
        let bbox = BoundingBox::new(0, 0, PAGE_W, PAGE_H);
        let assessment = assess(bbox, page_area() * 0.96, PAGE_W, PAGE_H, &config());
        assert_eq!(assessment.score.value(), 0);
        assert!(assessment.is_full_page());
        assert!(!is_accepted(&assessment, &config()));
    }

    #[test]
    fn full_page_rejection_ignores_an_otherwise_perfect_score() {
        let assessment = Assessment {
            bbox: BoundingBox::new(0, 0, 900, 1900),
            area_ratio: 0.96,
            aspect_ratio: 2.1,
            score: AcceptanceScore::new(4),
            failures: vec![],
        };
        assert!(!is_accepted(&assessment, &config()));
    }

    #[test]
    fn single_criterion_is_enough() {
        // Wide, flat, tiny sliver: only the width check passes.
        let bbox = BoundingBox::new(0, 0, 400, 2);
        let assessment = assess(bbox, 10.0, PAGE_W, PAGE_H, &config());
        assert_eq!(assessment.score.value(), 1);
        assert_eq!(assessment.failures.len(), 3);
        assert!(is_accepted(&assessment, &config()));
    }

    #[test]
    fn tiny_speck_is_rejected_with_reasons() {
        let bbox = BoundingBox::new(5, 5, 4, 1);
        let assessment = assess(bbox, 2.0, PAGE_W, PAGE_H, &config());
        assert_eq!(assessment.score.value(), 0);
        assert!(!is_accepted(&assessment, &config()));
        let described = assessment.describe_failures();
        assert!(described.contains("height too small"));
        assert!(described.contains("width too small"));
        assert!(described.contains("aspect ratio too low"));
        assert!(described.contains("area too small"));
    }

    #[test]
    fn pixel_floor_accepts_a_zero_score_contour() {
        let assessment = Assessment {
            bbox: BoundingBox::new(0, 0, 51, 51),
            area_ratio: 0.0,
            aspect_ratio: 1.0,
            score: AcceptanceScore::zero(),
            failures: vec![],
        };
        assert!(is_accepted(&assessment, &config()));
    }

    #[test]
    fn modest_area_accepts_a_zero_score_contour() {
        let assessment = Assessment {
            bbox: BoundingBox::new(0, 0, 10, 10),
            area_ratio: 0.0006,
            aspect_ratio: 1.0,
            score: AcceptanceScore::zero(),
            failures: vec![],
        };
        assert!(is_accepted(&assessment, &config()));
    }

    #[test]
    fn degenerate_page_does_not_divide_by_zero() {
        let assessment = assess(BoundingBox::new(0, 0, 1, 1), 1.0, 0, 0, &config());
        assert_eq!(assessment.area_ratio, 0.0);
    }
}
