//! Local-maximum scanning over response maps.

use crate::candidate::peak::Peak;
use crate::image::Image;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Collects 8-connected local maxima strictly above `threshold`.
///
/// A plateau yields the first pixel of the plateau in raster order: a pixel
/// must be strictly greater than its already-visited neighbours and at least
/// equal to the rest.
pub fn local_maxima(response: &Image<f32>, threshold: f32, parallel: bool) -> Vec<Peak> {
    let (w, h) = response.dims();
    let data = response.data();
    let scan_row = |y: usize| -> Vec<Peak> {
        let mut out = Vec::new();
        for x in 0..w {
            let v = data[y * w + x];
            if !(v > threshold) {
                continue;
            }
            let mut is_max = true;
            'nbr: for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    if nx == x && ny == y {
                        continue;
                    }
                    let n = data[ny * w + nx];
                    let earlier = ny < y || (ny == y && nx < x);
                    if n > v || (earlier && n >= v) {
                        is_max = false;
                        break 'nbr;
                    }
                }
            }
            if is_max {
                out.push(Peak { x, y, score: v });
            }
        }
        out
    };

    #[cfg(feature = "rayon")]
    if parallel {
        return (0..h).into_par_iter().flat_map_iter(scan_row).collect();
    }
    let _ = parallel;
    (0..h).flat_map(scan_row).collect()
}

#[cfg(test)]
mod tests {
    use super::local_maxima;
    use crate::image::Image;

    #[test]
    fn finds_isolated_maxima_and_one_per_plateau() {
        let mut img = Image::filled(8, 6, 0.0f32).unwrap();
        *img.get_mut(2, 2).unwrap() = 3.0;
        *img.get_mut(5, 3).unwrap() = 2.0;
        *img.get_mut(6, 3).unwrap() = 2.0;
        *img.get_mut(0, 5).unwrap() = 0.5;
        let peaks = local_maxima(&img, 1.0, false);
        let coords: Vec<(usize, usize)> = peaks.iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(coords, vec![(2, 2), (5, 3)]);
    }
}
