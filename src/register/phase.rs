//! Pairwise phase correlation of primed images.

use crate::image::Image;
use crate::refine::refine_peak_wrapped;
use crate::register::prime::PrimedImage;
use crate::spectral::{FrequencyFilter, SpectralContext};
use crate::util::math::centered_index;
use crate::util::BraggResult;

/// Relative shift of `index_b` with respect to `index_a`.
///
/// Image b's content equals image a's content displaced by `(dx, dy)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RelativePosition {
    pub dx: f64,
    pub dy: f64,
    /// Correlation peak value; 1.0 for a perfect circular shift.
    pub confidence: f32,
    pub index_a: usize,
    pub index_b: usize,
}

/// Integer location and value of a correlation peak.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfacePeak {
    pub x: usize,
    pub y: usize,
    pub value: f32,
}

/// Locates the global maximum of a periodic correlation surface.
///
/// Every location within `tolerance` of the maximum is a tie; the tie closest
/// to zero displacement wins, then raster order. Returns `None` for a surface
/// without finite values.
pub fn locate_peak(surface: &Image<f32>, tolerance: f32) -> Option<SurfacePeak> {
    let (w, h) = surface.dims();
    let max = surface
        .data()
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return None;
    }
    let floor = max - tolerance.max(0.0);
    let mut best: Option<(isize, SurfacePeak)> = None;
    for y in 0..h {
        let cy = centered_index(y, h);
        for x in 0..w {
            let value = surface.data()[y * w + x];
            if !(value >= floor) {
                continue;
            }
            let cx = centered_index(x, w);
            let d2 = cx * cx + cy * cy;
            if best.map_or(true, |(bd, _)| d2 < bd) {
                best = Some((d2, SurfacePeak { x, y, value }));
            }
        }
    }
    best.map(|(_, peak)| peak)
}

/// Correlation surface of two primed spectra.
///
/// The normalised cross-power spectrum is smoothed by `lowpass` and the
/// inverse transform divided by the filter's mean gain.
pub fn correlation_surface(
    ctx: &SpectralContext,
    a: &PrimedImage,
    b: &PrimedImage,
    lowpass: &FrequencyFilter,
) -> BraggResult<Image<f32>> {
    let mut cross = a.spectrum.cross_power(&b.spectrum, 1e-6)?;
    cross.multiply_assign(lowpass.spectrum())?;
    let mut surface = ctx.inverse_real(&cross)?;
    let gain = lowpass.mean_gain();
    if gain > 0.0 {
        surface.data_mut().iter_mut().for_each(|v| *v /= gain);
    }
    Ok(surface)
}

/// Phase-correlates two primed images.
///
/// Returns `None` when the surface has no finite peak.
pub fn phase_correlate(
    ctx: &SpectralContext,
    a: &PrimedImage,
    b: &PrimedImage,
    lowpass: &FrequencyFilter,
    tolerance: f32,
    subpixel: bool,
) -> BraggResult<Option<RelativePosition>> {
    let surface = correlation_surface(ctx, a, b, lowpass)?;
    let Some(peak) = locate_peak(&surface, tolerance) else {
        return Ok(None);
    };
    let (w, h) = surface.dims();
    let cx = centered_index(peak.x, w) as f64;
    let cy = centered_index(peak.y, h) as f64;
    let (dx, dy) = if subpixel {
        let (rx, ry) = refine_peak_wrapped(&surface, peak.x, peak.y);
        (cx + (rx - peak.x as f64), cy + (ry - peak.y as f64))
    } else {
        (cx, cy)
    };
    Ok(Some(RelativePosition {
        dx,
        dy,
        confidence: peak.value,
        index_a: a.index,
        index_b: b.index,
    }))
}

/// Ordered pairs `(i, j)`, `i < j`, whose index distance is within `window`.
pub fn pair_window(count: usize, window: Option<usize>) -> Vec<(usize, usize)> {
    let span = window.unwrap_or(count).max(1);
    let mut pairs = Vec::new();
    for i in 0..count {
        for j in (i + 1)..count.min(i + span + 1) {
            pairs.push((i, j));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::{locate_peak, pair_window};
    use crate::image::Image;

    #[test]
    fn tie_break_prefers_smallest_displacement() {
        let mut surface = Image::filled(16, 16, 0.0f32).unwrap();
        *surface.get_mut(5, 5).unwrap() = 1.0;
        *surface.get_mut(14, 0).unwrap() = 1.0;
        *surface.get_mut(9, 9).unwrap() = 0.99995;
        let peak = locate_peak(&surface, 1e-4).unwrap();
        assert_eq!((peak.x, peak.y), (14, 0));
    }

    #[test]
    fn pair_window_limits_index_distance() {
        assert_eq!(pair_window(4, Some(1)), vec![(0, 1), (1, 2), (2, 3)]);
        assert_eq!(pair_window(3, None), vec![(0, 1), (0, 2), (1, 2)]);
        assert!(pair_window(1, None).is_empty());
    }
}
