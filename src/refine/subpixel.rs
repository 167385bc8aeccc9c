//! Separable parabolic peak refinement.

use crate::image::Image;

/// Estimates the sub-sample vertex offset of a parabola through three samples.
///
/// Samples are taken at `x = -1, 0, +1`. Returns `None` when the parabola is
/// not concave or the vertex falls outside `[-1, 1]`.
pub fn parabolic_offset(fm: f32, f0: f32, fp: f32) -> Option<f32> {
    if !fm.is_finite() || !f0.is_finite() || !fp.is_finite() {
        return None;
    }
    let denom = fm - 2.0 * f0 + fp;
    if denom >= -1e-12 {
        return None;
    }
    let dx = 0.5 * (fm - fp) / denom;
    (dx.is_finite() && dx.abs() <= 1.0).then_some(dx)
}

/// Refines an integer peak on a periodic surface (e.g. a correlation map).
///
/// Neighbours wrap around the borders. Returns `(x, y)` in surface
/// coordinates, possibly slightly outside `[0, width)`.
pub fn refine_peak_wrapped(surface: &Image<f32>, x: usize, y: usize) -> (f64, f64) {
    let (w, h) = surface.dims();
    let at = |xx: usize, yy: usize| surface.data()[yy * w + xx];
    let xm = (x + w - 1) % w;
    let xp = (x + 1) % w;
    let ym = (y + h - 1) % h;
    let yp = (y + 1) % h;
    let c = at(x, y);
    let dx = if w >= 3 {
        parabolic_offset(at(xm, y), c, at(xp, y)).unwrap_or(0.0)
    } else {
        0.0
    };
    let dy = if h >= 3 {
        parabolic_offset(at(x, ym), c, at(x, yp)).unwrap_or(0.0)
    } else {
        0.0
    };
    (x as f64 + dx as f64, y as f64 + dy as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parabolic_offset_recovers_vertex() {
        let f = |x: f32| 1.0 - (x - 0.25).powi(2);
        let dx = parabolic_offset(f(-1.0), f(0.0), f(1.0)).unwrap();
        assert!((dx - 0.25).abs() < 1e-5);
        assert!(parabolic_offset(1.0, 0.5, 1.0).is_none());
    }

    #[test]
    fn wrapped_refinement_uses_opposite_border() {
        let surface = Image::from_fn(8, 8, |x, y| {
            let dx = if x > 4 { x as f32 - 8.0 } else { x as f32 } + 0.3;
            let dy = if y > 4 { y as f32 - 8.0 } else { y as f32 };
            1.0 - dx * dx - dy * dy
        })
        .unwrap();
        let (x, y) = refine_peak_wrapped(&surface, 0, 0);
        assert!((x + 0.3).abs() < 1e-4);
        assert!(y.abs() < 1e-6);
    }
}
