//! Spot radius estimation from the ring/disc response.
//!
//! Besides the plain radius scan this module bounds the radius from the
//! stack's autocorrelation and refines the annulus thickness around a
//! known radius.

use crate::filter::gradient_amplitude;
use crate::image::Image;
use crate::refine::parabolic_offset;
use crate::register::ring_disc_response;
use crate::spectral::{FilterBank, FilterConfig, FrequencyFilter, SpectralContext};
use crate::trace::{trace_event, trace_span};
use crate::util::math::centered_index;
use crate::util::{weighted_pearson_corr, BraggError, BraggResult};

/// Peaks lower than this fraction of the zero-lag contrast are not repeats.
const MIN_REPEAT_CONTRAST: f64 = 0.05;

/// Scans integer radii in `[min_radius, max_radius]` and returns the radius
/// whose ring/disc response peaks highest, refined by a parabolic fit over
/// neighbouring radii.
pub fn estimate_spot_radius(
    ctx: &SpectralContext,
    image: &Image<f32>,
    min_radius: usize,
    max_radius: usize,
    thickness: f64,
) -> BraggResult<f64> {
    if min_radius == 0 || max_radius < min_radius {
        return Err(BraggError::InvalidInput {
            reason: "radius search needs 1 <= min <= max",
        });
    }
    let mut scores = Vec::with_capacity(max_radius - min_radius + 1);
    for r in min_radius..=max_radius {
        let cfg = FilterConfig {
            radius: r as f64,
            thickness,
            blur_sigma: 0.0,
            annulus_power: 1,
            correlation_sigma: 0.0,
        };
        let bank = FilterBank::new(ctx, &cfg)?;
        let response = ring_disc_response(ctx, &bank, image, None, false)?;
        scores.push(response.argmax().2);
    }
    let best = best_index(&scores);
    Ok((min_radius + best) as f64 + peak_offset(&scores, best))
}

fn best_index(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn peak_offset(scores: &[f32], best: usize) -> f64 {
    if best > 0 && best + 1 < scores.len() {
        parabolic_offset(scores[best - 1], scores[best], scores[best + 1]).unwrap_or(0.0) as f64
    } else {
        0.0
    }
}

/// Settings for [`radius_upper_bound`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadiusBoundConfig {
    /// Smallest spot radius considered; lags below twice this are skipped.
    pub min_radius: usize,
    /// Images folded into the profile at most.
    pub max_images: usize,
    /// Stop adding images once the weighted correlation between successive
    /// profiles reaches this value.
    pub convergence: f64,
    /// Gaussian smoothing of the autocorrelation, in pixels.
    pub blur_sigma: f64,
}

impl Default for RadiusBoundConfig {
    fn default() -> Self {
        Self {
            min_radius: 1,
            max_images: 10,
            convergence: 0.999,
            blur_sigma: 1.0,
        }
    }
}

/// Mean of `image` over integer-distance rings around the wrapped origin,
/// together with the pixel count of each ring.
fn radial_profile(image: &Image<f32>, max_lag: usize) -> (Vec<f64>, Vec<f64>) {
    let (w, h) = image.dims();
    let mut sums = vec![0.0; max_lag + 1];
    let mut counts = vec![0.0; max_lag + 1];
    for y in 0..h {
        let dy = centered_index(y, h) as f64;
        for x in 0..w {
            let dx = centered_index(x, w) as f64;
            let bin = dx.hypot(dy).round() as usize;
            if bin <= max_lag {
                sums[bin] += image.data()[y * w + x] as f64;
                counts[bin] += 1.0;
            }
        }
    }
    for (s, &c) in sums.iter_mut().zip(&counts) {
        if c > 0.0 {
            *s /= c;
        }
    }
    (sums, counts)
}

/// Lag of the first repeat in a radial autocorrelation profile.
///
/// Walks down the central lobe from `start`, then takes the highest bin
/// beyond the trough and refines it by the centroid of its neighbourhood,
/// weighted by height above the trough.
fn first_repeat(profile: &[f64], start: usize) -> Option<f64> {
    if start + 1 >= profile.len() {
        return None;
    }
    let mut trough = start;
    while trough + 1 < profile.len() && profile[trough + 1] < profile[trough] {
        trough += 1;
    }
    let floor = profile[trough];
    let (peak, &value) = profile
        .iter()
        .enumerate()
        .skip(trough + 1)
        .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))?;
    if !(value - floor > MIN_REPEAT_CONTRAST * (profile[0] - floor)) {
        return None;
    }
    let lo = peak.saturating_sub(1).max(trough);
    let hi = (peak + 1).min(profile.len() - 1);
    let (mut num, mut den) = (0.0, 0.0);
    for (i, &v) in profile.iter().enumerate().take(hi + 1).skip(lo) {
        let weight = (v - floor).max(0.0);
        num += weight * i as f64;
        den += weight;
    }
    Some(if den > 0.0 { num / den } else { peak as f64 })
}

/// Upper bound on the spot radius from the spacing of repeated spots.
///
/// The radially averaged autocorrelation of each mean-subtracted image is
/// accumulated until adding another image no longer changes the profile
/// (weighted Pearson correlation at least `cfg.convergence`, weights being
/// ring populations) or `cfg.max_images` images were used. The first repeat
/// lag is the nearest-neighbour spot spacing; disks cannot overlap, so half
/// of it bounds the radius.
pub fn radius_upper_bound(
    ctx: &SpectralContext,
    images: &[Image<f32>],
    cfg: &RadiusBoundConfig,
) -> BraggResult<f64> {
    let _span = trace_span!("radius_upper_bound", images = images.len()).entered();
    if images.is_empty() {
        return Err(BraggError::InvalidInput {
            reason: "empty image stack",
        });
    }
    let (w, h) = ctx.dims();
    let max_lag = w.min(h) / 2;
    let start = (2 * cfg.min_radius).max(1);
    if start >= max_lag {
        return Err(BraggError::InvalidInput {
            reason: "minimum radius leaves no lag to search",
        });
    }
    let lowpass = FrequencyFilter::gaussian(w, h, cfg.blur_sigma)?;

    let mut total: Vec<f64> = Vec::new();
    let mut weights: Vec<f64> = Vec::new();
    let mut used = 0usize;
    for image in images.iter().take(cfg.max_images.max(1)) {
        let mean = image.mean();
        let centred = Image::new(image.data().iter().map(|v| v - mean).collect(), w, h)?;
        let mut power = ctx.forward(&centred)?.power();
        power.multiply_assign(lowpass.spectrum())?;
        let (profile, counts) = radial_profile(&ctx.inverse_real(&power)?, max_lag);
        let scale = if profile[0] > 0.0 { 1.0 / profile[0] } else { 0.0 };
        used += 1;
        if total.is_empty() {
            total = profile.iter().map(|v| v * scale).collect();
            weights = counts;
            continue;
        }
        let previous = total.clone();
        for (t, p) in total.iter_mut().zip(&profile) {
            *t += p * scale;
        }
        let settled = weighted_pearson_corr(&previous[start..], &total[start..], &weights[start..])
            .is_some_and(|r| r >= cfg.convergence);
        if settled {
            break;
        }
    }
    let spacing = first_repeat(&total, start).ok_or(BraggError::InvalidInput {
        reason: "autocorrelation shows no repeated spot",
    })?;
    trace_event!("radius_bound", images = used, spacing = spacing);
    Ok(spacing / 2.0)
}

/// Search window for [`refine_annulus_params`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnnulusSearch {
    /// Integer radii within this distance of the estimate are scored.
    pub range: usize,
    /// Thicknesses `1..=max_thickness` are scored.
    pub max_thickness: usize,
}

impl Default for AnnulusSearch {
    fn default() -> Self {
        Self {
            range: 2,
            max_thickness: 6,
        }
    }
}

/// Annulus geometry matched to the disk edges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnulusParams {
    pub radius: f64,
    pub thickness: f64,
}

/// Pixels of the discrete annulus `[radius - t/2, radius + t/2]`.
fn annulus_pixel_count(radius: f64, thickness: f64) -> usize {
    let inner = (radius - thickness / 2.0).max(0.0);
    let outer = radius + thickness / 2.0;
    let reach = outer.ceil() as i64;
    let mut count = 0;
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let d = (dx as f64).hypot(dy as f64);
            if d >= inner && d <= outer {
                count += 1;
            }
        }
    }
    count
}

/// Refines radius and thickness of the annulus around a radius estimate.
///
/// Every integer radius within `search.range` of `radius` is paired with
/// every thickness up to `search.max_thickness`. The annulus is correlated
/// with the gradient amplitude, and the peak is scaled by the square root
/// of the annulus area so wider rings only win when they collect more edge.
/// The radius is refined by a parabolic fit across radii at the winning
/// thickness.
pub fn refine_annulus_params(
    ctx: &SpectralContext,
    image: &Image<f32>,
    radius: f64,
    search: &AnnulusSearch,
) -> BraggResult<AnnulusParams> {
    let _span = trace_span!("refine_annulus_params", radius = radius).entered();
    if !(radius >= 1.0) || search.max_thickness == 0 {
        return Err(BraggError::InvalidInput {
            reason: "annulus search needs radius >= 1 and a positive thickness",
        });
    }
    let center = radius.round() as usize;
    let min_r = center.saturating_sub(search.range).max(1);
    let max_r = center + search.range;
    let gradient = ctx.forward(&gradient_amplitude(image, false)?)?;

    // scores[t - 1][r - min_r]
    let mut scores = vec![vec![0.0f32; max_r - min_r + 1]; search.max_thickness];
    for (ti, row) in scores.iter_mut().enumerate() {
        let thickness = (ti + 1) as f64;
        for (ri, score) in row.iter_mut().enumerate() {
            let r = (min_r + ri) as f64;
            let filter = FrequencyFilter::annulus(ctx, r, thickness)?;
            let response = ctx.inverse_real(&gradient.multiply(filter.spectrum())?)?;
            let area = annulus_pixel_count(r, thickness) as f32;
            *score = response.argmax().2 * area.sqrt();
        }
    }

    let mut best = (0usize, 0usize, f32::NEG_INFINITY);
    for (ti, row) in scores.iter().enumerate() {
        for (ri, &s) in row.iter().enumerate() {
            if s > best.2 {
                best = (ti, ri, s);
            }
        }
    }
    let (ti, ri, _) = best;
    let params = AnnulusParams {
        radius: (min_r + ri) as f64 + peak_offset(&scores[ti], ri),
        thickness: (ti + 1) as f64,
    };
    trace_event!("annulus_params", radius = params.radius, thickness = params.thickness);
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::{annulus_pixel_count, first_repeat};

    #[test]
    fn annulus_area_grows_with_thickness() {
        let thin = annulus_pixel_count(6.0, 1.0);
        let wide = annulus_pixel_count(6.0, 3.0);
        assert!(thin > 0);
        assert!(wide > 2 * thin);
        let expected = 2.0 * std::f64::consts::PI * 6.0 * 3.0;
        assert!((wide as f64 - expected).abs() < 0.2 * expected);
    }

    #[test]
    fn first_repeat_skips_the_central_lobe() {
        let profile = [1.0, 0.8, 0.5, 0.2, 0.0, 0.1, 0.3, 0.6, 0.3, 0.1];
        let lag = first_repeat(&profile, 1).unwrap();
        assert!((lag - 7.0).abs() < 1e-9);
        let skewed = [1.0, 0.5, 0.0, 0.2, 0.6, 0.4, 0.1];
        let lag = first_repeat(&skewed, 1).unwrap();
        assert!(lag > 4.0 && lag < 4.5);
    }

    #[test]
    fn flat_tail_has_no_repeat() {
        let profile = [1.0, 0.6, 0.1, -0.05, -0.05, -0.049, -0.05];
        assert!(first_repeat(&profile, 1).is_none());
        assert!(first_repeat(&profile[..2], 1).is_none());
    }
}
