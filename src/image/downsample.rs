//! Box-filter downsampling for `f32` images.
//!
//! Each halving averages 2x2 blocks; odd trailing rows and columns are
//! dropped. The symmetry search runs on the downsampled accumulator.

use crate::image::Image;
use crate::util::{BraggError, BraggResult};

/// Halves an image with a 2x2 box filter.
pub fn halve(src: &Image<f32>) -> BraggResult<Image<f32>> {
    let dst_width = src.width() / 2;
    let dst_height = src.height() / 2;
    if dst_width == 0 || dst_height == 0 {
        return Err(BraggError::InvalidDimensions {
            width: dst_width,
            height: dst_height,
        });
    }

    let data = src.data();
    let w = src.width();
    Image::from_fn(dst_width, dst_height, |x, y| {
        let i0 = (2 * y) * w + 2 * x;
        let i1 = i0 + w;
        0.25 * (data[i0] + data[i0 + 1] + data[i1] + data[i1 + 1])
    })
}

/// Largest power-of-two factor that keeps both sides at least `target_size`.
///
/// A `target_size` of zero disables downsampling.
pub fn downsample_factor(width: usize, height: usize, target_size: usize) -> usize {
    if target_size == 0 {
        return 1;
    }
    let mut factor = 1usize;
    while width / (factor * 2) >= target_size && height / (factor * 2) >= target_size {
        factor *= 2;
    }
    factor
}

/// Downsamples by repeated halving until the factor from [`downsample_factor`] is reached.
///
/// Returns the downsampled image and the factor applied.
pub fn downsample_to(src: &Image<f32>, target_size: usize) -> BraggResult<(Image<f32>, usize)> {
    let factor = downsample_factor(src.width(), src.height(), target_size);
    let mut current = src.clone();
    let mut applied = 1usize;
    while applied < factor {
        current = halve(&current)?;
        applied *= 2;
    }
    Ok((current, factor))
}

#[cfg(test)]
mod tests {
    use super::{downsample_factor, downsample_to, halve};
    use crate::image::Image;

    #[test]
    fn halve_averages_blocks() {
        let img = Image::new((0..16).map(|v| v as f32).collect(), 4, 4).unwrap();
        let half = halve(&img).unwrap();
        assert_eq!(half.dims(), (2, 2));
        assert_eq!(half.data(), &[2.5, 4.5, 10.5, 12.5]);
    }

    #[test]
    fn factor_respects_target() {
        assert_eq!(downsample_factor(512, 256, 64), 4);
        assert_eq!(downsample_factor(100, 100, 0), 1);
        assert_eq!(downsample_factor(100, 100, 100), 1);
    }

    #[test]
    fn downsample_reports_factor() {
        let img = Image::filled(64, 64, 1.0f32).unwrap();
        let (small, factor) = downsample_to(&img, 16).unwrap();
        assert_eq!(factor, 4);
        assert_eq!(small.dims(), (16, 16));
    }
}
