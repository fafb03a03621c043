pub mod acceptance;
pub mod assemble;
pub mod deskew;
pub mod extract;
pub mod morphology;
pub mod orientation;
pub mod pipeline;
pub mod preprocess;
pub mod projection;
pub mod slice;

pub use acceptance::{assess, is_accepted, Assessment};
pub use assemble::{assemble, crop_name, AssembleError, Assembly, CropWriter};
pub use deskew::{deskew, estimate_skew, rotate_expanded, SkewEstimate};
pub use extract::{extract_regions, Extraction};
pub use orientation::correct_orientation;
pub use pipeline::{DetectError, ReceiptDetector};
pub use preprocess::{load_image, preprocess, PreprocessError};
pub use slice::{needs_slicing, slice_region, SliceOutcome};
