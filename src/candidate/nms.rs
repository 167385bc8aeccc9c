//! Greedy non-maximum suppression.

use crate::candidate::peak::{sort_peaks_desc, Peak};

/// Applies greedy non-maximum suppression using Euclidean distance.
///
/// Peaks are sorted by descending score and kept if they are farther than
/// `radius` from every previously kept peak.
pub fn nms_euclidean(peaks: &mut [Peak], radius: f64) -> Vec<Peak> {
    sort_peaks_desc(peaks);
    if radius <= 0.0 {
        return peaks.to_owned();
    }

    let r2 = radius * radius;
    let mut kept: Vec<Peak> = Vec::new();
    'outer: for peak in peaks.iter().copied() {
        for kept_peak in kept.iter() {
            if kept_peak.dist2_to(peak.x as f64, peak.y as f64) <= r2 {
                continue 'outer;
            }
        }
        kept.push(peak);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::nms_euclidean;
    use crate::candidate::peak::Peak;

    #[test]
    fn suppresses_within_radius_only() {
        let mut peaks = vec![
            Peak { x: 10, y: 10, score: 1.0 },
            Peak { x: 13, y: 14, score: 0.9 },
            Peak { x: 14, y: 14, score: 0.8 },
            Peak { x: 30, y: 10, score: 0.7 },
        ];
        let kept = nms_euclidean(&mut peaks, 5.0);
        let coords: Vec<(usize, usize)> = kept.iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(coords, vec![(10, 10), (14, 14), (30, 10)]);
    }
}
