//! Tunable thresholds for every stage of receipt detection.
//!
//! Defaults are tuned for faint, low-contrast till receipts. Every section and
//! field is optional in TOML; missing values keep their default:
//!
//! ```toml
//! [extract]
//! min_area_ratio = 0.002
//!
//! [assemble]
//! crops_dir = "/var/tmp/tillcut/crops"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub preprocess: PreprocessConfig,
    pub deskew: DeskewConfig,
    pub orientation: OrientationConfig,
    pub extract: ExtractConfig,
    pub slice: SliceConfig,
    pub assemble: AssembleConfig,
}

/// Contrast normalization and edge boost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Histogram clip limit, as a multiple of the mean bin height per tile.
    pub clahe_clip_limit: f32,
    /// Tiles per axis for local equalization.
    pub clahe_tiles: u32,
    /// Center weight of the sharpening kernel; the eight neighbors are -1.
    pub sharpen_center: f32,
    /// Equalized pages spanning fewer gray levels than this are not stretched.
    pub min_stretch_range: u8,
    /// Pages narrower or shorter than this are not segmented.
    pub min_page_side: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 3.0,
            clahe_tiles: 8,
            sharpen_center: 9.0,
            min_stretch_range: 4,
            min_page_side: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskewConfig {
    pub canny_low: f32,
    pub canny_high: f32,
    pub hough_vote_threshold: u32,
    pub hough_suppression_radius: u32,
    /// Lines deviating more than this from the page axis are not skew evidence.
    pub max_deviation_deg: f32,
    /// Median skew at or below this magnitude is left uncorrected.
    pub min_correction_deg: f32,
}

impl Default for DeskewConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 200.0,
            hough_vote_threshold: 200,
            hough_suppression_radius: 8,
            max_deviation_deg: 45.0,
            min_correction_deg: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    /// Rotate when height < `landscape_ratio` × width.
    pub landscape_ratio: f64,
    /// Rotate when column-projection variance exceeds this multiple of row variance.
    pub variance_ratio: f64,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            landscape_ratio: 0.8,
            variance_ratio: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Side of the local neighborhood used for adaptive thresholding (odd).
    pub threshold_block_size: u32,
    /// Subtracted from the local mean before comparing.
    pub threshold_offset: i32,
    /// Closing structuring element, `[width, height]`.
    pub close_kernel: [u32; 2],
    /// Opening structuring element, `[width, height]`.
    pub open_kernel: [u32; 2],
    pub canny_low: f32,
    pub canny_high: f32,
    pub min_height_ratio: f64,
    pub min_width_ratio: f64,
    pub min_aspect_ratio: f64,
    pub min_area_ratio: f64,
    /// Contours above this share of the page are background.
    pub max_area_ratio: f64,
    /// Area share that accepts a contour regardless of its score.
    pub fallback_area_ratio: f64,
    /// Contours wider and taller than this many pixels are accepted regardless of score.
    pub min_side_px: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            threshold_block_size: 35,
            threshold_offset: 10,
            close_kernel: [25, 45],
            open_kernel: [5, 5],
            canny_low: 40.0,
            canny_high: 160.0,
            min_height_ratio: 0.01,
            min_width_ratio: 0.03,
            min_aspect_ratio: 0.3,
            min_area_ratio: 0.001,
            max_area_ratio: 0.95,
            fallback_area_ratio: 0.0005,
            min_side_px: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceConfig {
    /// Regions taller than this share of the page are checked for stacked receipts.
    pub trigger_height_ratio: f64,
    /// Valley threshold as a fraction of the mean normalized projection.
    pub valley_threshold_ratio: f32,
    /// Minimum distance between local-minimum split points, as a share of region height.
    pub min_split_distance_ratio: f64,
    /// Split points closer than this share of region height to an edge are dropped.
    pub edge_margin_ratio: f64,
    /// Slices shorter than this share of region height are dropped.
    pub min_slice_ratio: f64,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            trigger_height_ratio: 0.70,
            valley_threshold_ratio: 0.20,
            min_split_distance_ratio: 0.10,
            edge_margin_ratio: 0.05,
            min_slice_ratio: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssembleConfig {
    /// Directory receiving the cropped receipts; created on demand.
    pub crops_dir: PathBuf,
    /// Regions below this share of the page are not worth cropping.
    pub min_crop_area_ratio: f64,
    /// Length of the random token appended to crop file names.
    pub token_len: usize,
}

impl Default for AssembleConfig {
    fn default() -> Self {
        Self {
            crops_dir: std::env::temp_dir().join("tillcut").join("crops"),
            min_crop_area_ratio: 0.002,
            token_len: 8,
        }
    }
}

impl DetectorConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn with_crops_dir(mut self, crops_dir: impl Into<PathBuf>) -> Self {
        self.assemble.crops_dir = crops_dir.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pre = &self.preprocess;
        if pre.clahe_tiles == 0 {
            return Err(invalid("preprocess.clahe_tiles", "must be at least 1"));
        }
        if pre.clahe_clip_limit <= 0.0 {
            return Err(invalid("preprocess.clahe_clip_limit", "must be positive"));
        }

        let deskew = &self.deskew;
        if deskew.canny_low > deskew.canny_high {
            return Err(invalid("deskew.canny_low", "must not exceed deskew.canny_high"));
        }
        if !(0.0..=90.0).contains(&deskew.max_deviation_deg) {
            return Err(invalid("deskew.max_deviation_deg", "must be within 0..=90"));
        }

        let ext = &self.extract;
        if ext.threshold_block_size < 3 || ext.threshold_block_size % 2 == 0 {
            return Err(invalid("extract.threshold_block_size", "must be odd and at least 3"));
        }
        if ext.close_kernel.contains(&0) {
            return Err(invalid("extract.close_kernel", "dimensions must be non-zero"));
        }
        if ext.open_kernel.contains(&0) {
            return Err(invalid("extract.open_kernel", "dimensions must be non-zero"));
        }
        if ext.canny_low > ext.canny_high {
            return Err(invalid("extract.canny_low", "must not exceed extract.canny_high"));
        }
        check_ratio("extract.min_height_ratio", ext.min_height_ratio)?;
        check_ratio("extract.min_width_ratio", ext.min_width_ratio)?;
        check_ratio("extract.min_area_ratio", ext.min_area_ratio)?;
        check_ratio("extract.max_area_ratio", ext.max_area_ratio)?;
        check_ratio("extract.fallback_area_ratio", ext.fallback_area_ratio)?;

        let slice = &self.slice;
        check_ratio("slice.trigger_height_ratio", slice.trigger_height_ratio)?;
        check_ratio("slice.valley_threshold_ratio", slice.valley_threshold_ratio as f64)?;
        check_ratio("slice.min_split_distance_ratio", slice.min_split_distance_ratio)?;
        check_ratio("slice.edge_margin_ratio", slice.edge_margin_ratio)?;
        check_ratio("slice.min_slice_ratio", slice.min_slice_ratio)?;

        check_ratio("assemble.min_crop_area_ratio", self.assemble.min_crop_area_ratio)?;
        if self.assemble.token_len == 0 || self.assemble.token_len > 32 {
            return Err(invalid("assemble.token_len", "must be within 1..=32"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.to_string() }
}

fn check_ratio(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is outside 0..=1"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        DetectorConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = DetectorConfig::from_toml(
            r#"
            [extract]
            min_area_ratio = 0.002

            [slice]
            trigger_height_ratio = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(config.extract.min_area_ratio, 0.002);
        assert_eq!(config.extract.max_area_ratio, 0.95);
        assert_eq!(config.slice.trigger_height_ratio, 0.8);
        assert_eq!(config.deskew, DeskewConfig::default());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(DetectorConfig::from_toml("").unwrap(), DetectorConfig::default());
    }

    #[test]
    fn even_block_size_is_rejected() {
        let err = DetectorConfig::from_toml("[extract]\nthreshold_block_size = 34\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "extract.threshold_block_size", .. }
        ));
    }

    #[test]
    fn ratio_out_of_range_is_rejected() {
        let err = DetectorConfig::from_toml("[slice]\nmin_slice_ratio = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("slice.min_slice_ratio"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = DetectorConfig::from_toml("[extract\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tillcut.toml");
        std::fs::write(&path, "[assemble]\ncrops_dir = \"/tmp/crops-test\"\n").unwrap();
        let config = DetectorConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.assemble.crops_dir, PathBuf::from("/tmp/crops-test"));
    }

    #[test]
    fn with_crops_dir_overrides() {
        let config = DetectorConfig::default().with_crops_dir("/data/crops");
        assert_eq!(config.assemble.crops_dir, PathBuf::from("/data/crops"));
    }
}
