use image::{DynamicImage, GenericImageView};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tillcut_core::{ConfigError, DetectionOutcome, DetectorConfig, RejectionReason, RejectionSummary};
use tracing::{debug, info, warn};

use crate::assemble::{assemble, AssembleError, Assembly};
use crate::deskew::deskew;
use crate::extract::extract_regions;
use crate::orientation::correct_orientation;
use crate::preprocess::{self, PreprocessError};

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Invalid detector configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("Image too small to segment ({width}x{height})")]
    TooSmall { width: u32, height: u32 },
    #[error("No receipt crops produced ({} rejected)", .rejections.len())]
    NoCrops { rejections: Vec<RejectionReason> },
    #[error("Crop assembly failed: {0}")]
    Assemble(#[from] AssembleError),
}

impl DetectError {
    /// Rejections gathered before the failure, if any.
    pub fn into_rejections(self) -> Vec<RejectionReason> {
        match self {
            DetectError::NoCrops { rejections } => rejections,
            _ => Vec::new(),
        }
    }
}

/// Orchestrates: preprocess → deskew → orient → extract regions → crop and slice.
///
/// Holds only configuration, so one detector can be shared across threads and
/// reused for every page.
#[derive(Debug, Clone, Default)]
pub struct ReceiptDetector {
    config: DetectorConfig,
}

impl ReceiptDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Segment a page image on disk. Never fails: any error yields the
    /// fallback outcome holding `path` itself.
    pub fn detect(&self, path: &Path) -> DetectionOutcome {
        match self.try_detect(path) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Detection fell back to the whole page");
                DetectionOutcome::fallback(path, e.into_rejections())
            }
        }
    }

    /// Run `detect` over every page in order.
    pub fn detect_pages(&self, pages: &[PathBuf]) -> Vec<DetectionOutcome> {
        pages.iter().map(|page| self.detect(page)).collect()
    }

    /// Decode `path` and segment it, reporting why nothing was produced.
    pub fn try_detect(&self, path: &Path) -> Result<DetectionOutcome, DetectError> {
        let image = preprocess::load_image(path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("page");
        let assembly = self.try_detect_image(&image, stem)?;
        Ok(DetectionOutcome::segmented(path, assembly.entries, assembly.rejections))
    }

    /// Segment an already decoded page. Crop files are named after `stem`.
    pub fn try_detect_image(
        &self,
        image: &DynamicImage,
        stem: &str,
    ) -> Result<Assembly, DetectError> {
        self.config.validate()?;
        let (width, height) = image.dimensions();
        let min_side = self.config.preprocess.min_page_side;
        if width < min_side || height < min_side {
            return Err(DetectError::TooSmall { width, height });
        }
        info!(stem, width, height, "Detecting receipts");

        // 1. Normalize contrast and sharpen.
        let gray = preprocess::preprocess(image, &self.config.preprocess);

        // 2. Straighten small tilts.
        let deskewed = deskew(gray, &self.config.deskew);

        // 3. Quarter turns to portrait.
        let oriented = correct_orientation(deskewed, &self.config.orientation);
        debug!(
            width = oriented.width(),
            height = oriented.height(),
            "Page oriented"
        );

        // 4. Candidate regions.
        let extraction = extract_regions(&oriented, &self.config.extract);
        if extraction.is_empty() {
            return Err(DetectError::NoCrops { rejections: extraction.rejections });
        }

        // 5. Crop, slice and persist.
        let assembly = assemble(&oriented, &extraction.regions, stem, &self.config)?;
        let mut rejections = extraction.rejections;
        rejections.extend(assembly.rejections);

        let summary = RejectionSummary::from_reasons(&rejections);
        info!(
            contours = extraction.contours_examined,
            crops = assembly.entries.len(),
            rejected = summary.total(),
            by_stage = ?summary.by_stage,
            by_criterion = ?summary.by_criterion,
            "Detection summary"
        );

        if assembly.entries.is_empty() {
            return Err(DetectError::NoCrops { rejections });
        }
        Ok(Assembly { entries: assembly.entries, rejections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma};
    use tillcut_core::BoundingBox;

    fn detector_in(dir: &Path) -> ReceiptDetector {
        ReceiptDetector::new(DetectorConfig::default().with_crops_dir(dir.join("crops")))
    }

    /// Dark table with light receipts carrying rows of dark print.
    fn table_with_receipts(width: u32, height: u32, receipts: &[BoundingBox]) -> GrayImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let on_paper = receipts
                .iter()
                .any(|r| x >= r.x && x < r.right() && y >= r.y && y < r.bottom());
            let value = if !on_paper {
                25
            } else if y % 12 < 4 && x % 9 < 6 {
                30
            } else {
                225
            };
            Luma([value])
        })
    }

    #[test]
    fn detector_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ReceiptDetector>();
    }

    #[test]
    fn missing_file_falls_back_to_input_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.png");
        let detector = detector_in(dir.path());

        assert!(matches!(
            detector.try_detect(&missing),
            Err(DetectError::Preprocess(_))
        ));
        let outcome = detector.detect(&missing);
        assert!(outcome.is_fallback());
        assert_eq!(outcome.paths(), vec![missing.as_path()]);
    }

    #[test]
    fn blank_page_falls_back_to_input_path() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("blank.png");
        GrayImage::from_pixel(300, 400, Luma([230])).save(&page).unwrap();

        let outcome = detector_in(dir.path()).detect(&page);

        assert!(outcome.is_fallback());
        assert_eq!(outcome.paths(), vec![page.as_path()]);
        assert!(page.exists());
    }

    #[test]
    fn blank_pages_off_the_tile_grid_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let detector = detector_in(dir.path());
        for (w, h, value) in [(301, 397, 230), (250, 333, 200), (413, 585, 245)] {
            let page = dir.path().join(format!("blank_{w}x{h}.png"));
            GrayImage::from_pixel(w, h, Luma([value])).save(&page).unwrap();

            let outcome = detector.detect(&page);

            assert!(outcome.is_fallback(), "{w}x{h}: {:?}", outcome.entries);
            assert_eq!(outcome.paths(), vec![page.as_path()]);
        }
        // Nothing reached the crop stage.
        assert!(!dir.path().join("crops").exists());
    }

    #[test]
    fn invalid_config_falls_back_instead_of_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page.png");
        GrayImage::from_pixel(120, 160, Luma([180])).save(&page).unwrap();
        let mut config = DetectorConfig::default().with_crops_dir(dir.path().join("crops"));
        config.deskew.canny_low = 300.0;
        let detector = ReceiptDetector::new(config);

        assert!(matches!(detector.try_detect(&page), Err(DetectError::Config(_))));
        let outcome = detector.detect(&page);
        assert!(outcome.is_fallback());
        assert_eq!(outcome.paths(), vec![page.as_path()]);
    }

    #[test]
    fn minimum_page_side_comes_from_config() {
        let mut config = DetectorConfig::default();
        config.preprocess.min_page_side = 50;
        let detector = ReceiptDetector::new(config);
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 80, Luma([200])));
        assert!(matches!(
            detector.try_detect_image(&image, "small"),
            Err(DetectError::TooSmall { width: 40, height: 80 })
        ));
    }

    #[test]
    fn tiny_image_is_refused() {
        let detector = ReceiptDetector::default();
        let image = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        let err = detector.try_detect_image(&image, "tiny").unwrap_err();
        assert!(matches!(err, DetectError::TooSmall { width: 4, height: 4 }));
    }

    #[test]
    fn stacked_receipts_are_cropped_to_existing_files() {
        // 2000×3000 page with two 800×1200 receipts and a 100px gap, at one fifth scale.
        let dir = tempfile::tempdir().unwrap();
        let receipts = [
            BoundingBox::new(120, 40, 160, 240),
            BoundingBox::new(120, 300, 160, 240),
        ];
        let page = dir.path().join("stacked.png");
        table_with_receipts(400, 600, &receipts).save(&page).unwrap();

        let outcome = detector_in(dir.path()).detect(&page);

        assert!(!outcome.is_fallback(), "rejections: {:?}", outcome.rejections);
        assert!(outcome.entries.len() >= 2, "entries: {:?}", outcome.entries);
        for entry in &outcome.entries {
            assert!(entry.path.exists());
            assert!(entry.path.starts_with(dir.path().join("crops")));
            let name = entry.path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("stacked_region_"));
            let crop = image::open(&entry.path).unwrap();
            assert!(crop.width() > 0 && crop.height() > 0);
        }
    }

    #[test]
    fn pages_are_processed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let blank = dir.path().join("a.png");
        GrayImage::from_pixel(100, 150, Luma([200])).save(&blank).unwrap();
        let missing = dir.path().join("b.png");

        let outcomes = detector_in(dir.path()).detect_pages(&[blank.clone(), missing.clone()]);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].source, blank);
        assert_eq!(outcomes[1].paths(), vec![missing.as_path()]);
    }

    #[test]
    fn no_crops_error_carries_rejections() {
        let err = DetectError::NoCrops { rejections: vec![] };
        assert_eq!(err.to_string(), "No receipt crops produced (0 rejected)");
        assert!(err.into_rejections().is_empty());
    }
}
