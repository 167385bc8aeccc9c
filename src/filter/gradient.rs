//! Scharr gradient amplitude.
//!
//! Horizontal and vertical Scharr derivatives (`[3, 10, 3]` smoothing,
//! `[-1, 0, 1]` differencing, unnormalised) are summed in quadrature.
//! Borders use reflect-101, so the output has the input's size and every
//! pixel is defined.

use crate::image::Image;
use crate::util::math::reflect101;
use crate::util::BraggResult;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

const SMOOTH: [f32; 3] = [3.0, 10.0, 3.0];

/// Computes `sqrt(gx^2 + gy^2)` with Scharr kernels.
///
/// Rows are filled in parallel when `parallel` is set and the `rayon`
/// feature is enabled.
pub fn gradient_amplitude(image: &Image<f32>, parallel: bool) -> BraggResult<Image<f32>> {
    let (width, height) = image.dims();
    let src = image.data();
    let mut out = vec![0.0f32; width * height];

    let fill_row = |y: usize, row: &mut [f32]| {
        let rows = [
            reflect101(y as isize - 1, height),
            y,
            reflect101(y as isize + 1, height),
        ];
        for (x, dst) in row.iter_mut().enumerate() {
            let cols = [
                reflect101(x as isize - 1, width),
                x,
                reflect101(x as isize + 1, width),
            ];
            let mut gx = 0.0f32;
            let mut gy = 0.0f32;
            for k in 0..3 {
                let r = rows[k] * width;
                gx += SMOOTH[k] * (src[r + cols[2]] - src[r + cols[0]]);
                gy += SMOOTH[k] * (src[rows[2] * width + cols[k]] - src[rows[0] * width + cols[k]]);
            }
            *dst = (gx * gx + gy * gy).sqrt();
        }
    };

    #[cfg(feature = "rayon")]
    if parallel {
        out.par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| fill_row(y, row));
        return Image::new(out, width, height);
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;
    out.chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| fill_row(y, row));

    Image::new(out, width, height)
}

#[cfg(test)]
mod tests {
    use super::gradient_amplitude;
    use crate::image::Image;

    #[test]
    fn flat_image_has_zero_gradient() {
        let img = Image::filled(7, 5, 3.0f32).unwrap();
        let grad = gradient_amplitude(&img, false).unwrap();
        assert_eq!(grad.dims(), (7, 5));
        assert!(grad.data().iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn vertical_step_responds_on_edge_columns() {
        let img = Image::from_fn(8, 6, |x, _| if x >= 4 { 1.0f32 } else { 0.0 }).unwrap();
        let grad = gradient_amplitude(&img, false).unwrap();
        // Full Scharr weight (3 + 10 + 3) on both columns adjacent to the step.
        assert!((grad.get(3, 2).copied().unwrap() - 16.0).abs() < 1e-5);
        assert!((grad.get(4, 2).copied().unwrap() - 16.0).abs() < 1e-5);
        assert!(grad.get(1, 2).copied().unwrap().abs() < 1e-6);
        assert!(grad.get(6, 2).copied().unwrap().abs() < 1e-6);
    }

    #[test]
    fn ramp_gradient_is_direction_independent() {
        let horiz = Image::from_fn(9, 9, |x, _| x as f32).unwrap();
        let vert = Image::from_fn(9, 9, |_, y| y as f32).unwrap();
        let gh = gradient_amplitude(&horiz, false).unwrap();
        let gv = gradient_amplitude(&vert, false).unwrap();
        assert!((gh.get(4, 4).unwrap() - gv.get(4, 4).unwrap()).abs() < 1e-5);
        assert!((gh.get(4, 4).unwrap() - 32.0).abs() < 1e-5);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn parallel_rows_match_sequential() {
        let img = Image::from_fn(13, 11, |x, y| ((x * 7 + y * 3) % 5) as f32).unwrap();
        let serial = gradient_amplitude(&img, false).unwrap();
        let parallel = gradient_amplitude(&img, true).unwrap();
        assert_eq!(serial, parallel);
    }
}
