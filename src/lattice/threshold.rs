//! Rank-based threshold policy.

use crate::util::{BraggError, BraggResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Result of [`threshold_proportion`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdCut {
    /// Lower edge of the bin where the cumulative count crossed the target.
    pub value: f32,
    /// Values in the retained bins.
    pub retained: usize,
    /// Values that entered the histogram.
    pub population: usize,
}

impl ThresholdCut {
    /// Retained fraction of the population.
    pub fn fraction(&self) -> f64 {
        if self.population == 0 {
            0.0
        } else {
            self.retained as f64 / self.population as f64
        }
    }
}

fn histogram(values: &[f32], min: f32, width: f32, bins: usize, ignore_zeros: bool) -> Vec<usize> {
    let mut hist = vec![0usize; bins];
    for &v in values {
        if !v.is_finite() || (ignore_zeros && v == 0.0) {
            continue;
        }
        let idx = (((v - min) / width) as usize).min(bins - 1);
        hist[idx] += 1;
    }
    hist
}

/// Finds the cut that retains roughly `proportion` of the values.
///
/// A histogram of `bins` equal bins spans `[min, max]`. Bins are accumulated
/// from the top until the count exceeds `proportion * N`; the lower edge of
/// that bin is the cut. When no bin pushes the count past the target (only
/// possible for `proportion == 1`) every value is kept. Non-finite values are ignored, and so are exact zeros
/// when `ignore_zeros` is set.
pub fn threshold_proportion(
    values: &[f32],
    proportion: f64,
    bins: usize,
    ignore_zeros: bool,
    parallel: bool,
) -> BraggResult<ThresholdCut> {
    if !(proportion > 0.0 && proportion <= 1.0) {
        return Err(BraggError::InvalidInput {
            reason: "threshold proportion must be in (0, 1]",
        });
    }
    if bins == 0 {
        return Err(BraggError::InvalidInput {
            reason: "threshold needs at least one bin",
        });
    }
    let (min, max, population) = values
        .iter()
        .filter(|v| v.is_finite() && !(ignore_zeros && **v == 0.0))
        .fold((f32::INFINITY, f32::NEG_INFINITY, 0usize), |(lo, hi, n), &v| {
            (lo.min(v), hi.max(v), n + 1)
        });
    if population == 0 {
        return Err(BraggError::InsufficientPoints { needed: 1, got: 0 });
    }
    if max <= min {
        return Ok(ThresholdCut {
            value: min,
            retained: population,
            population,
        });
    }
    let width = (max - min) / bins as f32;

    #[cfg(feature = "rayon")]
    let hist = if parallel {
        values
            .par_chunks(4096)
            .map(|chunk| histogram(chunk, min, width, bins, ignore_zeros))
            .reduce(
                || vec![0usize; bins],
                |mut a, b| {
                    a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                    a
                },
            )
    } else {
        histogram(values, min, width, bins, ignore_zeros)
    };
    #[cfg(not(feature = "rayon"))]
    let hist = {
        let _ = parallel;
        histogram(values, min, width, bins, ignore_zeros)
    };

    let target = proportion * population as f64;
    let mut cumulative = 0usize;
    for (i, &count) in hist.iter().enumerate().rev() {
        cumulative += count;
        if cumulative as f64 > target {
            return Ok(ThresholdCut {
                value: min + i as f32 * width,
                retained: cumulative,
                population,
            });
        }
    }
    Ok(ThresholdCut {
        value: min,
        retained: population,
        population,
    })
}

#[cfg(test)]
mod tests {
    use super::threshold_proportion;

    #[test]
    fn constant_values_keep_everything() {
        let cut = threshold_proportion(&[2.0; 10], 0.1, 16, false, false).unwrap();
        assert_eq!(cut.value, 2.0);
        assert_eq!(cut.retained, 10);
    }

    #[test]
    fn zeros_can_be_ignored() {
        let mut values = vec![0.0f32; 90];
        values.extend((1..=10).map(|v| v as f32));
        let cut = threshold_proportion(&values, 0.5, 10, true, false).unwrap();
        assert_eq!(cut.population, 10);
        assert!(cut.retained >= 5 && cut.retained <= 6);
    }

    #[test]
    fn cut_strictly_exceeds_the_target() {
        let values: Vec<f32> = (1..=10).map(|v| v as f32).collect();
        let cut = threshold_proportion(&values, 0.3, 10, false, false).unwrap();
        assert_eq!(cut.retained, 4);
        assert!(cut.value > 6.0 && cut.value < 7.0, "{cut:?}");
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(threshold_proportion(&[1.0], 0.0, 10, false, false).is_err());
        assert!(threshold_proportion(&[1.0], 0.5, 0, false, false).is_err());
        assert!(threshold_proportion(&[0.0], 0.5, 4, true, false).is_err());
    }
}
