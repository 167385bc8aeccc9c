//! Integer peak records with deterministic ordering.

use std::cmp::Ordering;

/// Peak candidate on a response map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    /// X coordinate (column) of the peak.
    pub x: usize,
    /// Y coordinate (row) of the peak.
    pub y: usize,
    /// Response value at the peak.
    pub score: f32,
}

impl Peak {
    /// Squared Euclidean distance to a point.
    pub fn dist2_to(&self, x: f64, y: f64) -> f64 {
        let dx = self.x as f64 - x;
        let dy = self.y as f64 - y;
        dx * dx + dy * dy
    }
}

fn peak_cmp_desc(a: &Peak, b: &Peak) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.y.cmp(&b.y))
        .then_with(|| a.x.cmp(&b.x))
}

/// Sorts peaks by descending score with raster-order tie-breaking.
pub(crate) fn sort_peaks_desc(peaks: &mut [Peak]) {
    peaks.sort_by(peak_cmp_desc);
}

#[cfg(test)]
mod tests {
    use super::{sort_peaks_desc, Peak};

    #[test]
    fn ties_break_in_raster_order() {
        let mut peaks = vec![
            Peak { x: 3, y: 1, score: 1.0 },
            Peak { x: 0, y: 0, score: 0.5 },
            Peak { x: 1, y: 1, score: 1.0 },
            Peak { x: 9, y: 0, score: 1.0 },
        ];
        sort_peaks_desc(&mut peaks);
        let order: Vec<(usize, usize)> = peaks.iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(order, vec![(9, 0), (1, 1), (3, 1), (0, 0)]);
    }
}
