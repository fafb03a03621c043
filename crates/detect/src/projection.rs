//! 1-D intensity projections of a grayscale buffer.

use image::GrayImage;

/// Sum of pixel intensities for every row, top to bottom.
pub fn row_sums(image: &GrayImage) -> Vec<f64> {
    let width = image.width() as usize;
    if width == 0 {
        return vec![0.0; image.height() as usize];
    }
    image
        .as_raw()
        .chunks_exact(width)
        .map(|row| row.iter().map(|&p| p as f64).sum())
        .collect()
}

/// Sum of pixel intensities for every column, left to right.
pub fn column_sums(image: &GrayImage) -> Vec<f64> {
    let width = image.width() as usize;
    let mut sums = vec![0.0; width];
    if width == 0 {
        return sums;
    }
    for row in image.as_raw().chunks_exact(width) {
        for (sum, &p) in sums.iter_mut().zip(row) {
            *sum += p as f64;
        }
    }
    sums
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    #[test]
    fn sums_follow_rows_and_columns() {
        // 3 wide, 2 tall: value = x + 10*y
        let img: GrayImage = ImageBuffer::from_fn(3, 2, |x, y| Luma([(x + 10 * y) as u8]));
        assert_eq!(row_sums(&img), vec![3.0, 33.0]);
        assert_eq!(column_sums(&img), vec![10.0, 12.0, 14.0]);
    }

    #[test]
    fn variance_of_constant_is_zero() {
        assert_eq!(variance(&[4.0, 4.0, 4.0]), 0.0);
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(variance(&[1.0, 3.0]), 1.0);
    }
}
