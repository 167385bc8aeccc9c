//! Separable Hann window.

use crate::image::Image;
use crate::util::BraggResult;
use std::f32::consts::PI;

fn hann_1d(len: usize) -> Vec<f32> {
    if len == 1 {
        return vec![1.0];
    }
    let denom = (len - 1) as f32;
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / denom).cos()))
        .collect()
}

/// Precomputes a 2D Hann window as the outer product of two 1D windows.
pub fn hann_window(width: usize, height: usize) -> BraggResult<Image<f32>> {
    let wx = hann_1d(width.max(1));
    let wy = hann_1d(height.max(1));
    Image::from_fn(width, height, |x, y| wx[x] * wy[y])
}

/// Multiplies an image by a window of the same size.
pub fn apply_window(image: &Image<f32>, window: &Image<f32>) -> BraggResult<Image<f32>> {
    image.multiply(window)
}

#[cfg(test)]
mod tests {
    use super::{apply_window, hann_window};
    use crate::image::Image;

    #[test]
    fn hann_window_peaks_in_centre_and_vanishes_at_edges() {
        let win = hann_window(9, 9).unwrap();
        assert!((win.get(4, 4).unwrap() - 1.0).abs() < 1e-6);
        assert!(win.get(0, 4).unwrap().abs() < 1e-6);
        assert!(win.get(4, 8).unwrap().abs() < 1e-6);
    }

    #[test]
    fn window_size_must_match() {
        let win = hann_window(4, 4).unwrap();
        let img = Image::filled(5, 4, 1.0f32).unwrap();
        assert!(apply_window(&img, &win).is_err());
    }
}
