use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::BoundingBox;

/// Number of independent geometric criteria a contour satisfies (0–4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AcceptanceScore(u8);

impl AcceptanceScore {
    pub const MAX: u8 = 4;

    pub fn new(points: u8) -> Self {
        Self(points.min(Self::MAX))
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Add one point, saturating at [`AcceptanceScore::MAX`].
    pub fn bump(self) -> Self {
        Self::new(self.0 + 1)
    }
}

impl fmt::Display for AcceptanceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, Self::MAX)
    }
}

/// A geometric test applied to a contour during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Height,
    Width,
    Aspect,
    Area,
    /// Contour spans (nearly) the whole page and is treated as background.
    FullPage,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Height => write!(f, "height"),
            Criterion::Width => write!(f, "width"),
            Criterion::Aspect => write!(f, "aspect"),
            Criterion::Area => write!(f, "area"),
            Criterion::FullPage => write!(f, "full_page"),
        }
    }
}

/// One failed criterion together with the value that was measured and the bound it missed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriterionFailure {
    pub criterion: Criterion,
    pub measured: f64,
    pub required: f64,
}

impl fmt::Display for CriterionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.criterion {
            Criterion::FullPage => write!(
                f,
                "area too large ({:.2}% > {:.0}%)",
                self.measured * 100.0,
                self.required * 100.0
            ),
            Criterion::Area => write!(
                f,
                "area too small ({:.2}% <= {:.2}%)",
                self.measured * 100.0,
                self.required * 100.0
            ),
            Criterion::Aspect => write!(
                f,
                "aspect ratio too low ({:.2} <= {:.2})",
                self.measured, self.required
            ),
            Criterion::Height | Criterion::Width => write!(
                f,
                "{} too small ({:.0}px <= {:.0}px)",
                self.criterion, self.measured, self.required
            ),
        }
    }
}

/// Pipeline stage at which a contour or region was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionStage {
    /// Contour failed the acceptance policy.
    Extraction,
    /// Region passed extraction but its crop was unusable.
    Crop,
    /// Projection analysis produced no usable slices.
    Slicing,
    /// Writing the crop to disk failed.
    Persist,
}

impl fmt::Display for RejectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionStage::Extraction => write!(f, "extraction"),
            RejectionStage::Crop => write!(f, "crop"),
            RejectionStage::Slicing => write!(f, "slicing"),
            RejectionStage::Persist => write!(f, "persist"),
        }
    }
}

/// Structured record of why a contour or region did not produce a crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionReason {
    /// Zero-based index of the contour (extraction) or region (later stages).
    pub contour_index: usize,
    pub stage: RejectionStage,
    pub bbox: BoundingBox,
    pub area_ratio: f64,
    pub aspect_ratio: f64,
    pub score: AcceptanceScore,
    pub failures: Vec<CriterionFailure>,
    pub message: String,
}

impl RejectionReason {
    /// Rejection raised after extraction, where no criterion breakdown applies.
    pub fn downstream(
        region: &CandidateRegion,
        stage: RejectionStage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            contour_index: region.index,
            stage,
            bbox: region.bbox,
            area_ratio: region.area_ratio,
            aspect_ratio: region.bbox.aspect_ratio(),
            score: region.score,
            failures: Vec::new(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "contour {} [{}] (score={}): {} (bbox={}, area={:.2}%, aspect={:.2})",
            self.contour_index + 1,
            self.stage,
            self.score,
            self.message,
            self.bbox,
            self.area_ratio * 100.0,
            self.aspect_ratio
        )
    }
}

/// A contour that passed the acceptance policy.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRegion {
    /// Position in top-to-bottom order after sorting.
    pub index: usize,
    pub bbox: BoundingBox,
    /// Outline points of the source contour in page coordinates.
    pub contour: Vec<(u32, u32)>,
    pub score: AcceptanceScore,
    /// Contour area divided by page area.
    pub area_ratio: f64,
}

/// Horizontal band `[y_start, y_end)` of a region, in region-relative rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub y_start: u32,
    pub y_end: u32,
}

impl Slice {
    pub fn new(y_start: u32, y_end: u32) -> Self {
        Self { y_start, y_end }
    }

    pub fn height(&self) -> u32 {
        self.y_end.saturating_sub(self.y_start)
    }

    /// Page-space rectangle of this slice inside `region`.
    pub fn within(&self, region: &BoundingBox) -> BoundingBox {
        BoundingBox::new(region.x, region.y + self.y_start, region.width, self.height())
    }
}
