//! Cropping accepted regions out of the oriented page and writing them to disk.

use image::imageops::crop_imm;
use image::{GrayImage, ImageFormat};
use std::path::PathBuf;
use thiserror::Error;
use tillcut_core::{
    AssembleConfig, BoundingBox, CandidateRegion, DetectorConfig, OutcomeEntry, RejectionReason,
    RejectionStage,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::slice::{needs_slicing, slice_region, SliceOutcome};

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode crop: {0}")]
    Encode(#[from] image::ImageError),
}

/// Crops written for one page plus the regions that produced none.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub entries: Vec<OutcomeEntry>,
    pub rejections: Vec<RejectionReason>,
}

/// Writes crops as PNG files under one directory with collision-free names.
#[derive(Debug, Clone)]
pub struct CropWriter {
    crops_dir: PathBuf,
    token_len: usize,
}

impl CropWriter {
    pub fn new(config: &AssembleConfig) -> Self {
        Self {
            crops_dir: config.crops_dir.clone(),
            token_len: config.token_len,
        }
    }

    /// Create the crops directory if it is missing.
    pub fn prepare(&self) -> Result<(), AssembleError> {
        std::fs::create_dir_all(&self.crops_dir)?;
        Ok(())
    }

    pub fn write(
        &self,
        crop: &GrayImage,
        stem: &str,
        region: usize,
        slice: Option<usize>,
    ) -> Result<PathBuf, AssembleError> {
        let name = crop_name(stem, region, slice, &random_token(self.token_len));
        let path = self.crops_dir.join(name);
        crop.save_with_format(&path, ImageFormat::Png)?;
        Ok(path)
    }
}

/// `<stem>_region_<i>[_slice_<j>]_<token>.png`
pub fn crop_name(stem: &str, region: usize, slice: Option<usize>, token: &str) -> String {
    match slice {
        Some(j) => format!("{stem}_region_{region}_slice_{j}_{token}.png"),
        None => format!("{stem}_region_{region}_{token}.png"),
    }
}

/// Leading hex digits of a fresh v4 UUID.
pub fn random_token(len: usize) -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(len.clamp(1, token.len()));
    token
}

/// Crop every region from `oriented`, splitting tall ones into stacked
/// receipts, and persist the results in region then slice order.
///
/// Problems with a single region are recorded as rejections and the next
/// region is tried. Only a crops directory that cannot be created fails the
/// whole page.
pub fn assemble(
    oriented: &GrayImage,
    regions: &[CandidateRegion],
    stem: &str,
    config: &DetectorConfig,
) -> Result<Assembly, AssembleError> {
    let writer = CropWriter::new(&config.assemble);
    writer.prepare()?;

    let (page_w, page_h) = oriented.dimensions();
    let mut assembly = Assembly::default();

    for region in regions {
        if let Some(reason) = crop_guard(region, config) {
            warn!(%reason, "Region rejected before cropping");
            assembly.rejections.push(reason);
            continue;
        }
        let Some(bbox) = region.bbox.clamp_to(page_w, page_h) else {
            let reason =
                RejectionReason::downstream(region, RejectionStage::Crop, "extracted region is empty");
            warn!(%reason, "Region rejected before cropping");
            assembly.rejections.push(reason);
            continue;
        };
        let crop = cut(oriented, &bbox);

        if !needs_slicing(bbox.height, page_h, &config.slice) {
            persist(&writer, &mut assembly, region, &crop, stem, None);
            continue;
        }

        info!(
            region = region.index,
            height = bbox.height,
            page_pct = bbox.height as f64 / page_h as f64 * 100.0,
            "Large region, attempting to slice"
        );
        match slice_region(&crop, &config.slice) {
            SliceOutcome::Split(slices) => {
                for (j, slice) in slices.iter().enumerate() {
                    let band = BoundingBox::new(0, slice.y_start, crop.width(), slice.height());
                    if band.clamp_to(crop.width(), crop.height()).is_none() {
                        let reason = RejectionReason::downstream(
                            region,
                            RejectionStage::Slicing,
                            format!("slice {j} is empty"),
                        );
                        warn!(%reason, "Slice rejected");
                        assembly.rejections.push(reason);
                        continue;
                    }
                    persist(&writer, &mut assembly, region, &cut(&crop, &band), stem, Some(j));
                }
            }
            SliceOutcome::Whole => {
                warn!(
                    region = region.index,
                    "Slicing found no usable split, keeping region whole"
                );
                persist(&writer, &mut assembly, region, &crop, stem, None);
            }
        }
    }

    Ok(assembly)
}

/// Contour area limits applied again at crop time.
fn crop_guard(region: &CandidateRegion, config: &DetectorConfig) -> Option<RejectionReason> {
    let min = config.assemble.min_crop_area_ratio;
    let max = config.extract.max_area_ratio;
    let message = if region.area_ratio < min {
        format!(
            "area ratio too small ({:.2}% < {}%)",
            region.area_ratio * 100.0,
            min * 100.0
        )
    } else if region.area_ratio > max {
        format!(
            "area ratio too large ({:.2}% > {}%)",
            region.area_ratio * 100.0,
            max * 100.0
        )
    } else {
        return None;
    };
    Some(RejectionReason::downstream(region, RejectionStage::Crop, message))
}

fn cut(image: &GrayImage, bbox: &BoundingBox) -> GrayImage {
    crop_imm(image, bbox.x, bbox.y, bbox.width, bbox.height).to_image()
}

fn persist(
    writer: &CropWriter,
    assembly: &mut Assembly,
    region: &CandidateRegion,
    crop: &GrayImage,
    stem: &str,
    slice: Option<usize>,
) {
    match writer.write(crop, stem, region.index, slice) {
        Ok(path) => {
            info!(
                region = region.index,
                slice = ?slice,
                width = crop.width(),
                height = crop.height(),
                path = %path.display(),
                "Saved receipt crop"
            );
            assembly.entries.push(OutcomeEntry {
                path,
                region_index: region.index,
                slice_index: slice,
            });
        }
        Err(e) => {
            let reason =
                RejectionReason::downstream(region, RejectionStage::Persist, format!("processing error: {e}"));
            warn!(%reason, "Failed to persist crop");
            assembly.rejections.push(reason);
        }
    }
}
