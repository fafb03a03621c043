use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::region::{RejectionReason, RejectionStage};

/// One persisted receipt crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeEntry {
    pub path: PathBuf,
    /// Index of the candidate region the crop came from (top-to-bottom order).
    pub region_index: usize,
    /// Set when the region was split into stacked receipts.
    pub slice_index: Option<usize>,
}

/// Result of running detection on one page image.
///
/// `entries` is never empty: when nothing could be segmented it holds the
/// unmodified source path as its only element and `fallback` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionOutcome {
    pub source: PathBuf,
    pub entries: Vec<OutcomeEntry>,
    pub rejections: Vec<RejectionReason>,
    pub fallback: bool,
}

impl DetectionOutcome {
    /// Successful segmentation. Returns the fallback outcome if `entries` is empty.
    pub fn segmented(
        source: impl Into<PathBuf>,
        entries: Vec<OutcomeEntry>,
        rejections: Vec<RejectionReason>,
    ) -> Self {
        let source = source.into();
        if entries.is_empty() {
            return Self::fallback(source, rejections);
        }
        Self { source, entries, rejections, fallback: false }
    }

    /// The page could not be segmented; hand back the original image.
    pub fn fallback(source: impl Into<PathBuf>, rejections: Vec<RejectionReason>) -> Self {
        let source = source.into();
        Self {
            entries: vec![OutcomeEntry {
                path: source.clone(),
                region_index: 0,
                slice_index: None,
            }],
            source,
            rejections,
            fallback: true,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.entries.iter().map(|e| e.path.as_path()).collect()
    }

    pub fn rejection_summary(&self) -> RejectionSummary {
        RejectionSummary::from_reasons(&self.rejections)
    }
}

/// Rejection counts keyed by stage and by failed criterion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionSummary {
    pub by_stage: BTreeMap<String, usize>,
    pub by_criterion: BTreeMap<String, usize>,
}

impl RejectionSummary {
    pub fn from_reasons(reasons: &[RejectionReason]) -> Self {
        let mut summary = Self::default();
        for reason in reasons {
            *summary.by_stage.entry(reason.stage.to_string()).or_default() += 1;
            if reason.stage == RejectionStage::Extraction {
                for failure in &reason.failures {
                    *summary
                        .by_criterion
                        .entry(failure.criterion.to_string())
                        .or_default() += 1;
                }
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.by_stage.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::region::{AcceptanceScore, Criterion, CriterionFailure};

    fn reason(stage: RejectionStage, criteria: &[Criterion]) -> RejectionReason {
        RejectionReason {
            contour_index: 0,
            stage,
            bbox: BoundingBox::new(0, 0, 5, 5),
            area_ratio: 0.0001,
            aspect_ratio: 1.0,
            score: AcceptanceScore::zero(),
            failures: criteria
                .iter()
                .map(|&criterion| CriterionFailure { criterion, measured: 0.0, required: 1.0 })
                .collect(),
            message: "test".into(),
        }
    }

    #[test]
    fn fallback_holds_exactly_the_source() {
        let outcome = DetectionOutcome::fallback("/pages/p1.png", vec![]);
        assert!(outcome.is_fallback());
        assert_eq!(outcome.paths(), vec![Path::new("/pages/p1.png")]);
    }

    #[test]
    fn segmented_without_entries_degrades_to_fallback() {
        let outcome = DetectionOutcome::segmented("/pages/p1.png", vec![], vec![]);
        assert!(outcome.is_fallback());
        assert_eq!(outcome.entries.len(), 1);
    }

    #[test]
    fn summary_counts_stages_and_criteria() {
        let reasons = vec![
            reason(RejectionStage::Extraction, &[Criterion::Height, Criterion::Area]),
            reason(RejectionStage::Extraction, &[Criterion::Area]),
            reason(RejectionStage::Crop, &[]),
        ];
        let summary = RejectionSummary::from_reasons(&reasons);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.by_stage["extraction"], 2);
        assert_eq!(summary.by_criterion["area"], 2);
        assert_eq!(summary.by_criterion["height"], 1);
    }

    #[test]
    fn fallback_summary_reflects_its_rejections() {
        let outcome = DetectionOutcome::fallback(
            "/pages/p2.png",
            vec![
                reason(RejectionStage::Extraction, &[Criterion::FullPage]),
                reason(RejectionStage::Persist, &[]),
            ],
        );
        let summary = outcome.rejection_summary();
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.by_stage["persist"], 1);
        assert_eq!(summary.by_criterion["full_page"], 1);
    }

    #[test]
    fn outcome_serializes_to_json() {
        let outcome = DetectionOutcome::segmented(
            "/pages/p1.png",
            vec![OutcomeEntry {
                path: "/crops/p1_region_0_ab12cd34.png".into(),
                region_index: 0,
                slice_index: Some(1),
            }],
            vec![reason(RejectionStage::Crop, &[])],
        );
        let json = serde_json::to_string(&outcome).unwrap();
        let back: DetectionOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }
}
