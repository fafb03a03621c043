use image::imageops::rotate90;
use image::GrayImage;
use tillcut_core::OrientationConfig;
use tracing::debug;

use crate::projection::{column_sums, row_sums, variance};

/// Turn the page portrait using quarter turns only.
///
/// Upside-down pages are not detected; only 0° or 90° clockwise steps are applied.
pub fn correct_orientation(image: GrayImage, config: &OrientationConfig) -> GrayImage {
    let mut image = image;

    if (image.height() as f64) < image.width() as f64 * config.landscape_ratio {
        debug!(
            width = image.width(),
            height = image.height(),
            "Page looks landscape, rotating 90° clockwise"
        );
        image = rotate90(&image);
    }

    // Text lines make the projection across the baseline swing harder.
    let row_variance = variance(&row_sums(&image));
    let column_variance = variance(&column_sums(&image));
    debug!(row_variance, column_variance, "Projection variances");
    if column_variance > row_variance * config.variance_ratio && image.height() < image.width() {
        debug!("Projection variance suggests sideways text, rotating 90° clockwise");
        image = rotate90(&image);
    }

    if image.height() <= image.width() {
        debug!("Forcing portrait orientation");
        image = rotate90(&image);
    }

    image
}
