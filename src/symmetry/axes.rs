//! Mirror-axis search and refinement.

use crate::image::downsample::downsample_to;
use crate::image::Image;
use crate::symmetry::SymmetryConfig;
use crate::trace::{trace_event, trace_span};
use crate::util::math::axis_angle_diff;
use crate::util::{pearson_corr, BraggResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Line `point + s * (cos angle, sin angle)` with its mirror score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MirrorLine {
    /// Foot of the perpendicular from the image center.
    pub point: [f64; 2],
    /// Direction in `[0, pi)`.
    pub angle: f64,
    /// Pearson correlation between the image and its reflection.
    pub score: f64,
}

impl MirrorLine {
    fn direction(&self) -> [f64; 2] {
        [self.angle.cos(), self.angle.sin()]
    }

    /// Mirror image of `p` across the line.
    pub fn reflect(&self, p: [f64; 2]) -> [f64; 2] {
        let u = self.direction();
        let d = [p[0] - self.point[0], p[1] - self.point[1]];
        let along = d[0] * u[0] + d[1] * u[1];
        [
            self.point[0] + 2.0 * along * u[0] - d[0],
            self.point[1] + 2.0 * along * u[1] - d[1],
        ]
    }

    /// Intersection with another line, `None` when nearly parallel.
    pub fn intersect(&self, other: &MirrorLine) -> Option<[f64; 2]> {
        let u = self.direction();
        let v = other.direction();
        let det = u[0] * v[1] - u[1] * v[0];
        if det.abs() < 1e-6 {
            return None;
        }
        let d = [other.point[0] - self.point[0], other.point[1] - self.point[1]];
        let s = (d[0] * v[1] - d[1] * v[0]) / det;
        Some([self.point[0] + s * u[0], self.point[1] + s * u[1]])
    }
}

fn line_through_offset(center: [f64; 2], angle: f64, offset: f64) -> MirrorLine {
    let n = [-angle.sin(), angle.cos()];
    MirrorLine {
        point: [center[0] + offset * n[0], center[1] + offset * n[1]],
        angle: angle.rem_euclid(PI),
        score: f64::NEG_INFINITY,
    }
}

fn image_center(image: &Image<f32>) -> [f64; 2] {
    [
        (image.width() as f64 - 1.0) / 2.0,
        (image.height() as f64 - 1.0) / 2.0,
    ]
}

/// Pearson correlation between an image and its reflection across `line`.
///
/// Only pixels whose reflection lands inside the image are compared. Returns
/// `None` when fewer than `min_overlap` of the pixels overlap or either
/// sample is flat.
pub fn mirror_score(image: &Image<f32>, line: &MirrorLine, min_overlap: f64) -> Option<f64> {
    let (w, h) = image.dims();
    let mut a = Vec::with_capacity(w * h);
    let mut b = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let r = line.reflect([x as f64, y as f64]);
            if let Some(v) = image.sample_bilinear(r[0], r[1]) {
                a.push(image.data()[y * w + x] as f64);
                b.push(v as f64);
            }
        }
    }
    if (a.len() as f64) < min_overlap * (w * h) as f64 {
        return None;
    }
    pearson_corr(&a, &b)
}

fn best_line(
    image: &Image<f32>,
    center: [f64; 2],
    angles: &[f64],
    offsets: &[f64],
    min_overlap: f64,
) -> Option<MirrorLine> {
    let mut best: Option<MirrorLine> = None;
    for &angle in angles {
        for &offset in offsets {
            let mut line = line_through_offset(center, angle, offset);
            if let Some(score) = mirror_score(image, &line, min_overlap) {
                line.score = score;
                if best.map_or(true, |b| score > b.score) {
                    best = Some(line);
                }
            }
        }
    }
    best
}

fn symmetric_steps(span: f64, steps: usize) -> Vec<f64> {
    let steps = steps as i64;
    if steps == 0 || span <= 0.0 {
        return vec![0.0];
    }
    (-steps..=steps)
        .map(|k| span * k as f64 / steps as f64)
        .collect()
}

/// Best-scoring mirror axis for each sampled angle, on a downsampled copy.
///
/// Returned lines are in full-resolution coordinates, ordered by angle.
pub fn symmetry_axes(image: &Image<f32>, cfg: &SymmetryConfig) -> BraggResult<Vec<MirrorLine>> {
    let _span = trace_span!("symmetry_axes", angles = cfg.angle_steps).entered();
    let (small, factor) = downsample_to(image, cfg.target_size)?;
    let center = image_center(&small);
    let max_offset = cfg.max_offset_fraction * small.width().min(small.height()) as f64;
    let step = cfg.offset_step.max(1e-3);
    let count = (max_offset / step).floor() as i64;
    let offsets: Vec<f64> = (-count..=count).map(|k| k as f64 * step).collect();
    let steps = cfg.angle_steps.max(1);
    let angles: Vec<f64> = (0..steps).map(|k| k as f64 * PI / steps as f64).collect();

    let score_angle = |&angle: &f64| best_line(&small, center, &[angle], &offsets, cfg.min_overlap);
    #[cfg(feature = "rayon")]
    let lines: Vec<Option<MirrorLine>> = if cfg.parallel {
        angles.par_iter().map(score_angle).collect()
    } else {
        angles.iter().map(score_angle).collect()
    };
    #[cfg(not(feature = "rayon"))]
    let lines: Vec<Option<MirrorLine>> = angles.iter().map(score_angle).collect();

    let f = factor as f64;
    let shift = (f - 1.0) / 2.0;
    let out: Vec<MirrorLine> = lines
        .into_iter()
        .flatten()
        .map(|l| MirrorLine {
            point: [l.point[0] * f + shift, l.point[1] * f + shift],
            ..l
        })
        .collect();
    trace_event!("axes_scored", count = out.len());
    Ok(out)
}

/// Highest-scoring axes at least `min_separation` apart in angle.
pub fn top_symmetry_axes(axes: &[MirrorLine], count: usize, min_separation: f64) -> Vec<MirrorLine> {
    let mut sorted = axes.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.angle.total_cmp(&b.angle)));
    let mut kept: Vec<MirrorLine> = Vec::with_capacity(count);
    for line in sorted {
        if kept.len() >= count {
            break;
        }
        if kept
            .iter()
            .all(|k| axis_angle_diff(k.angle, line.angle) >= min_separation)
        {
            kept.push(line);
        }
    }
    kept
}

/// Axes at the maxima of the strongest angular repeat of the score profile.
///
/// `axes` are the per-angle lines from [`symmetry_axes`] sampled at
/// `angle_steps` angles over `[0, pi)`; missing angles take the mean score.
/// A pattern with `k` mirror lines repeats `k` times over that range, so the
/// fold in `folds` with the most power in the profile's Fourier spectrum is
/// chosen. The phase of that component predicts `k` maxima, each snapped to
/// the best-scoring line within a quarter period. Returns lines ordered by
/// angle; empty when no fold fits below the Nyquist limit.
pub fn periodic_symmetry_axes(
    axes: &[MirrorLine],
    angle_steps: usize,
    folds: &[usize],
) -> Vec<MirrorLine> {
    let n = angle_steps;
    if n < 2 || axes.is_empty() {
        return Vec::new();
    }
    let mut slots: Vec<Option<MirrorLine>> = vec![None; n];
    for line in axes {
        let bin = (line.angle * n as f64 / PI).round() as usize % n;
        if slots[bin].map_or(true, |l| line.score > l.score) {
            slots[bin] = Some(*line);
        }
    }
    let mean = axes.iter().map(|l| l.score).sum::<f64>() / axes.len() as f64;
    let mut spectrum: Vec<Complex<f64>> = slots
        .iter()
        .map(|s| Complex::new(s.map_or(mean, |l| l.score) - mean, 0.0))
        .collect();
    FftPlanner::new().plan_fft_forward(n).process(&mut spectrum);

    let Some(&fold) = folds
        .iter()
        .filter(|&&k| k >= 1 && 2 * k <= n)
        .max_by(|&&a, &&b| {
            spectrum[a]
                .norm_sqr()
                .total_cmp(&spectrum[b].norm_sqr())
                .then(b.cmp(&a))
        })
    else {
        return Vec::new();
    };

    let period = n as f64 / fold as f64;
    let first = (-spectrum[fold].arg() / (2.0 * PI) * period).rem_euclid(period);
    let reach = ((period / 4.0).floor() as i64).max(1);
    let mut picked: Vec<usize> = Vec::with_capacity(fold);
    for j in 0..fold {
        let predicted = (first + j as f64 * period).round() as i64;
        let best = (predicted - reach..=predicted + reach)
            .map(|b| b.rem_euclid(n as i64) as usize)
            .filter(|&b| slots[b].is_some())
            .max_by(|&a, &b| {
                let sa = slots[a].map_or(f64::NEG_INFINITY, |l| l.score);
                let sb = slots[b].map_or(f64::NEG_INFINITY, |l| l.score);
                sa.total_cmp(&sb)
            });
        if let Some(bin) = best {
            if !picked.contains(&bin) {
                picked.push(bin);
            }
        }
    }
    picked.sort_unstable();
    trace_event!("periodic_axes", fold = fold, picked = picked.len());
    picked.into_iter().filter_map(|b| slots[b]).collect()
}

/// Grid refinement of each line's angle and offset at full resolution.
///
/// Lines whose neighbourhood cannot be scored are returned unchanged.
pub fn refine_mirror_lines(
    image: &Image<f32>,
    lines: &[MirrorLine],
    cfg: &SymmetryConfig,
) -> Vec<MirrorLine> {
    let _span = trace_span!("refine_mirror_lines", lines = lines.len()).entered();
    let center = image_center(image);
    let angle_deltas = symmetric_steps(cfg.refine_angle_span, cfg.refine_steps);
    let offset_deltas = symmetric_steps(cfg.refine_offset_span, cfg.refine_steps);
    let refine = |line: &MirrorLine| -> MirrorLine {
        let angles: Vec<f64> = angle_deltas.iter().map(|d| line.angle + d).collect();
        let mut best: Option<MirrorLine> = None;
        for &angle in &angles {
            // Keep the candidate line passing near the original foot point.
            let na = [-angle.sin(), angle.cos()];
            let anchor = (line.point[0] - center[0]) * na[0] + (line.point[1] - center[1]) * na[1];
            let offsets: Vec<f64> = offset_deltas.iter().map(|d| anchor + d).collect();
            if let Some(candidate) = best_line(image, center, &[angle], &offsets, cfg.min_overlap) {
                if best.map_or(true, |b| candidate.score > b.score) {
                    best = Some(candidate);
                }
            }
        }
        best.unwrap_or(*line)
    };
    #[cfg(feature = "rayon")]
    if cfg.parallel {
        return lines.par_iter().map(refine).collect();
    }
    lines.iter().map(refine).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflection_is_an_involution() {
        let line = MirrorLine {
            point: [3.0, 4.0],
            angle: 0.7,
            score: 0.0,
        };
        let p = [10.0, -2.0];
        let back = line.reflect(line.reflect(p));
        assert!((back[0] - p[0]).abs() < 1e-12 && (back[1] - p[1]).abs() < 1e-12);
    }

    #[test]
    fn perpendicular_lines_intersect_at_their_feet() {
        let a = MirrorLine {
            point: [5.0, 2.0],
            angle: 0.0,
            score: 0.0,
        };
        let b = MirrorLine {
            point: [1.0, 9.0],
            angle: PI / 2.0,
            score: 0.0,
        };
        let p = a.intersect(&b).unwrap();
        assert!((p[0] - 1.0).abs() < 1e-12 && (p[1] - 2.0).abs() < 1e-12);
    }

    fn profile(steps: usize, score: impl Fn(usize) -> f64) -> Vec<MirrorLine> {
        (0..steps)
            .map(|k| MirrorLine {
                point: [0.0, 0.0],
                angle: k as f64 * PI / steps as f64,
                score: score(k),
            })
            .collect()
    }

    #[test]
    fn periodic_axes_follow_the_strongest_fold() {
        let steps = 36;
        let axes = profile(steps, |k| {
            let phase = 2.0 * PI * 4.0 * k as f64 / steps as f64 - 0.6;
            phase.cos() + 0.05 * ((k * 7) % 5) as f64
        });
        let picked = periodic_symmetry_axes(&axes, steps, &[2, 3, 4, 6]);
        assert_eq!(picked.len(), 4);
        for (i, line) in picked.iter().enumerate() {
            let expected = 0.6 / (2.0 * PI * 4.0) * PI + i as f64 * PI / 4.0;
            let bin = PI / steps as f64;
            assert!((line.angle - expected).abs() <= 1.5 * bin, "{line:?} vs {expected}");
        }
    }

    #[test]
    fn periodic_axes_tolerate_missing_angles() {
        let steps = 60;
        let mut axes = profile(steps, |k| (2.0 * PI * 3.0 * k as f64 / steps as f64).cos());
        axes.retain(|l| (l.angle * steps as f64 / PI).round() as usize % 7 != 3);
        let picked = periodic_symmetry_axes(&axes, steps, &[2, 3, 4, 6]);
        let bins: Vec<usize> = picked
            .iter()
            .map(|l| (l.angle * steps as f64 / PI).round() as usize)
            .collect();
        assert_eq!(bins, vec![0, 20, 40]);
    }

    #[test]
    fn periodic_axes_need_a_usable_fold() {
        let axes = profile(8, |k| k as f64);
        assert!(periodic_symmetry_axes(&axes, 8, &[5, 6]).is_empty());
        assert!(periodic_symmetry_axes(&[], 8, &[2]).is_empty());
    }

    #[test]
    fn top_axes_respect_separation() {
        let mk = |angle: f64, score: f64| MirrorLine {
            point: [0.0, 0.0],
            angle,
            score,
        };
        let axes = vec![mk(0.0, 0.9), mk(0.05, 0.95), mk(1.0, 0.5), mk(3.12, 0.8)];
        let top = top_symmetry_axes(&axes, 3, 0.2);
        let angles: Vec<f64> = top.iter().map(|l| l.angle).collect();
        assert_eq!(angles, vec![0.05, 1.0]);
    }
}
