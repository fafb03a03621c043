pub mod config;
pub mod geometry;
pub mod outcome;
pub mod region;

pub use config::{
    AssembleConfig, ConfigError, DeskewConfig, DetectorConfig, ExtractConfig, OrientationConfig,
    PreprocessConfig, SliceConfig,
};
pub use geometry::BoundingBox;
pub use outcome::{DetectionOutcome, OutcomeEntry, RejectionSummary};
pub use region::{
    AcceptanceScore, CandidateRegion, Criterion, CriterionFailure, RejectionReason,
    RejectionStage, Slice,
};
