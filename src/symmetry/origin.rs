//! Origin estimates from sets of mirror lines.

use crate::symmetry::axes::MirrorLine;

/// Mean of all pairwise intersections of non-parallel lines.
pub fn average_intersection(lines: &[MirrorLine]) -> Option<[f64; 2]> {
    let mut sum = [0.0, 0.0];
    let mut count = 0usize;
    for (i, a) in lines.iter().enumerate() {
        for b in &lines[i + 1..] {
            if let Some(p) = a.intersect(b) {
                sum[0] += p[0];
                sum[1] += p[1];
                count += 1;
            }
        }
    }
    (count > 0).then(|| [sum[0] / count as f64, sum[1] / count as f64])
}

/// Mean of the line-implied centers (each line's foot point).
pub fn average_origin(lines: &[MirrorLine]) -> Option<[f64; 2]> {
    if lines.is_empty() {
        return None;
    }
    let n = lines.len() as f64;
    let sum = lines
        .iter()
        .fold([0.0, 0.0], |acc, l| [acc[0] + l.point[0], acc[1] + l.point[1]]);
    Some([sum[0] / n, sum[1] / n])
}

#[cfg(test)]
mod tests {
    use super::{average_intersection, average_origin};
    use crate::symmetry::MirrorLine;
    use std::f64::consts::PI;

    #[test]
    fn estimators_differ_for_offset_feet() {
        let lines = [
            MirrorLine { point: [10.0, 20.0], angle: 0.0, score: 1.0 },
            MirrorLine { point: [30.0, 5.0], angle: PI / 2.0, score: 1.0 },
        ];
        let x = average_intersection(&lines).unwrap();
        assert!((x[0] - 30.0).abs() < 1e-9 && (x[1] - 20.0).abs() < 1e-9);
        let o = average_origin(&lines).unwrap();
        assert_eq!(o, [20.0, 12.5]);
        assert!(average_intersection(&lines[..1]).is_none());
    }
}
