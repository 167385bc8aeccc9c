//! Weighted k-means with deterministic seeding.

use crate::util::{BraggError, BraggResult};

/// Cluster centers and per-row labels.
#[derive(Clone, Debug, PartialEq)]
pub struct KMeansResult {
    /// Row-major `k x dims` centers.
    pub centers: Vec<f64>,
    /// Cluster index of every input row.
    pub labels: Vec<usize>,
    pub dims: usize,
}

impl KMeansResult {
    /// Number of clusters.
    pub fn k(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.centers.len() / self.dims
        }
    }

    /// Center of cluster `i`.
    pub fn center(&self, i: usize) -> &[f64] {
        &self.centers[i * self.dims..(i + 1) * self.dims]
    }

    /// Cluster indices ordered by ascending first coordinate.
    pub fn order_by_first(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.k()).collect();
        order.sort_by(|&a, &b| self.center(a)[0].total_cmp(&self.center(b)[0]));
        order
    }
}

fn dist2(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Weighted Lloyd k-means.
///
/// Seeds are the weighted quantiles `(c + 0.5) / k` along the dimension of
/// largest weighted variance, so results are deterministic. Non-finite or
/// negative weights count as zero; if no weight is positive all rows weigh one.
/// Empty clusters keep their previous center.
pub fn weighted_kmeans(
    data: &[f64],
    dims: usize,
    weights: &[f64],
    k: usize,
    max_iterations: usize,
) -> BraggResult<KMeansResult> {
    if dims == 0 || k == 0 || data.len() % dims != 0 {
        return Err(BraggError::InvalidInput {
            reason: "k-means needs positive k and whole rows",
        });
    }
    let rows = data.len() / dims;
    if weights.len() != rows {
        return Err(BraggError::InvalidInput {
            reason: "k-means weights do not match rows",
        });
    }
    if rows < k {
        return Err(BraggError::InsufficientPoints {
            needed: k,
            got: rows,
        });
    }
    let row = |i: usize| &data[i * dims..(i + 1) * dims];
    let mut w: Vec<f64> = weights
        .iter()
        .map(|&v| if v.is_finite() && v > 0.0 { v } else { 0.0 })
        .collect();
    let mut total: f64 = w.iter().sum();
    if total <= 0.0 {
        w.iter_mut().for_each(|v| *v = 1.0);
        total = rows as f64;
    }

    // Seed dimension: largest weighted variance.
    let mut best_dim = 0usize;
    let mut best_var = f64::NEG_INFINITY;
    for d in 0..dims {
        let mean = (0..rows).map(|i| row(i)[d] * w[i]).sum::<f64>() / total;
        let var = (0..rows)
            .map(|i| w[i] * (row(i)[d] - mean).powi(2))
            .sum::<f64>();
        if var > best_var {
            best_var = var;
            best_dim = d;
        }
    }
    let mut order: Vec<usize> = (0..rows).collect();
    order.sort_by(|&a, &b| row(a)[best_dim].total_cmp(&row(b)[best_dim]).then(a.cmp(&b)));

    let mut centers = Vec::with_capacity(k * dims);
    let mut cumulative = 0.0;
    let mut cursor = 0usize;
    for c in 0..k {
        let target = (c as f64 + 0.5) / k as f64 * total;
        while cursor + 1 < rows && cumulative + w[order[cursor]] < target {
            cumulative += w[order[cursor]];
            cursor += 1;
        }
        centers.extend_from_slice(row(order[cursor]));
    }

    let mut labels = vec![usize::MAX; rows];
    for _ in 0..max_iterations.max(1) {
        let mut changed = false;
        for (i, label) in labels.iter_mut().enumerate() {
            let p = row(i);
            let mut best = 0usize;
            let mut best_d = f64::INFINITY;
            for c in 0..k {
                let d = dist2(p, &centers[c * dims..(c + 1) * dims]);
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            if *label != best {
                *label = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![0.0f64; k * dims];
        let mut mass = vec![0.0f64; k];
        for (i, &label) in labels.iter().enumerate() {
            mass[label] += w[i];
            for (s, v) in sums[label * dims..(label + 1) * dims].iter_mut().zip(row(i)) {
                *s += w[i] * v;
            }
        }
        for c in 0..k {
            if mass[c] > 0.0 {
                for d in 0..dims {
                    centers[c * dims + d] = sums[c * dims + d] / mass[c];
                }
            }
        }
    }

    Ok(KMeansResult {
        centers,
        labels,
        dims,
    })
}

#[cfg(test)]
mod tests {
    use super::weighted_kmeans;

    #[test]
    fn separates_two_groups() {
        let data = [0.1, 0.0, 0.2, 10.0, 10.2, 9.9];
        let res = weighted_kmeans(&data, 1, &[1.0; 6], 2, 50).unwrap();
        let order = res.order_by_first();
        assert!((res.center(order[0])[0] - 0.1).abs() < 1e-9);
        assert!((res.center(order[1])[0] - 10.033333333333333).abs() < 1e-9);
        assert_eq!(res.labels[0], res.labels[2]);
        assert_ne!(res.labels[0], res.labels[3]);
    }

    #[test]
    fn weights_pull_centers() {
        let data = [0.0, 1.0, 10.0];
        let res = weighted_kmeans(&data, 1, &[1.0, 3.0, 1.0], 2, 50).unwrap();
        let order = res.order_by_first();
        assert!((res.center(order[0])[0] - 0.75).abs() < 1e-9);
    }

    #[test]
    fn too_few_rows_is_an_error() {
        assert!(weighted_kmeans(&[1.0, 2.0], 1, &[1.0, 1.0], 3, 10).is_err());
    }
}
