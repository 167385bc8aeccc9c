//! Least-squares lattice fit and outlier handling.

use crate::image::Image;
use crate::lattice::vectors::LatticeVectors;
use crate::lattice::Spot;
use nalgebra::{DMatrix, DVector};

/// What to do with spots that deviate from the fitted lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutlierPolicy {
    /// Move the spot to the nearest lattice point.
    Snap,
    /// Drop the spot.
    Reject,
}

/// Lattice `origin + sum_k i_k * basis_k` fitted to spot positions.
#[derive(Clone, Debug, PartialEq)]
pub struct FittedLattice {
    pub origin: [f64; 2],
    pub basis: Vec<[f64; 2]>,
    /// Root-mean-square residual of the inliers used in the fit.
    pub rms: f64,
}

impl FittedLattice {
    /// Position of the lattice point with integer coefficients `index`.
    pub fn predict(&self, index: &[i64]) -> [f64; 2] {
        let mut p = self.origin;
        for (k, v) in index.iter().zip(&self.basis) {
            p[0] += *k as f64 * v[0];
            p[1] += *k as f64 * v[1];
        }
        p
    }

    /// Nearest lattice coefficients of a point.
    pub fn index_of(&self, point: [f64; 2]) -> Vec<i64> {
        lattice_index(self.origin, &self.basis, point)
    }

    /// Distance from a point to its nearest lattice point.
    pub fn residual(&self, point: [f64; 2]) -> f64 {
        let p = self.predict(&self.index_of(point));
        (p[0] - point[0]).hypot(p[1] - point[1])
    }
}

fn lattice_index(origin: [f64; 2], basis: &[[f64; 2]], point: [f64; 2]) -> Vec<i64> {
    let d = [point[0] - origin[0], point[1] - origin[1]];
    match basis {
        [v] => {
            let len2 = v[0] * v[0] + v[1] * v[1];
            vec![((d[0] * v[0] + d[1] * v[1]) / len2).round() as i64]
        }
        [v1, v2, ..] => {
            let det = v1[0] * v2[1] - v1[1] * v2[0];
            let i = (d[0] * v2[1] - d[1] * v2[0]) / det;
            let j = (v1[0] * d[1] - v1[1] * d[0]) / det;
            vec![i.round() as i64, j.round() as i64]
        }
        [] => Vec::new(),
    }
}

fn spot_point(s: &Spot) -> [f64; 2] {
    [s.x as f64, s.y as f64]
}

/// Solves origin and basis by linear least squares over the given indices.
fn solve(points: &[[f64; 2]], indices: &[Vec<i64>], m: usize) -> Option<([f64; 2], Vec<[f64; 2]>)> {
    let rows = points.len();
    if rows < m + 1 {
        return None;
    }
    let design = DMatrix::from_fn(rows, m + 1, |r, c| if c == 0 { 1.0 } else { indices[r][c - 1] as f64 });
    let normal = design.transpose() * &design;
    let chol = normal.cholesky()?;
    let xs = DVector::from_iterator(rows, points.iter().map(|p| p[0]));
    let ys = DVector::from_iterator(rows, points.iter().map(|p| p[1]));
    let sx = chol.solve(&(design.transpose() * xs));
    let sy = chol.solve(&(design.transpose() * ys));
    let basis = (0..m).map(|k| [sx[k + 1], sy[k + 1]]).collect();
    Some(([sx[0], sy[0]], basis))
}

/// Fits a lattice to spots starting from approximate vectors.
///
/// The first spot is the provisional origin. Inliers (within `tolerance` of
/// the provisional lattice) determine the fit; when their indices do not span
/// the basis, the provisional vectors are kept and only the origin is fitted.
pub fn fit_lattice(spots: &[Spot], vectors: &LatticeVectors, tolerance: f64) -> Option<FittedLattice> {
    let seed = spots.first()?;
    if vectors.basis.is_empty() {
        return None;
    }
    let provisional = FittedLattice {
        origin: spot_point(seed),
        basis: vectors.basis.clone(),
        rms: 0.0,
    };
    let mut points = Vec::new();
    let mut indices = Vec::new();
    for s in spots {
        let p = spot_point(s);
        if provisional.residual(p) <= tolerance {
            indices.push(provisional.index_of(p));
            points.push(p);
        }
    }
    let m = vectors.basis.len();
    let (origin, basis) = solve(&points, &indices, m).unwrap_or_else(|| {
        let n = points.len().max(1) as f64;
        let mut origin = [0.0, 0.0];
        for (p, idx) in points.iter().zip(&indices) {
            let mut q = *p;
            for (k, v) in idx.iter().zip(&vectors.basis) {
                q[0] -= *k as f64 * v[0];
                q[1] -= *k as f64 * v[1];
            }
            origin[0] += q[0] / n;
            origin[1] += q[1] / n;
        }
        (origin, vectors.basis.clone())
    });
    let mut fitted = FittedLattice {
        origin,
        basis,
        rms: 0.0,
    };
    let sq: f64 = points.iter().map(|p| fitted.residual(*p).powi(2)).sum();
    fitted.rms = (sq / points.len().max(1) as f64).sqrt();
    Some(fitted)
}

/// Enforces lattice consistency on a spot list.
///
/// Spots within `tolerance` of the fitted lattice are kept. Outliers are
/// snapped to the rounded lattice position or rejected, per `policy`. A
/// snapped spot is dropped if it would leave the image, land farther than
/// `tolerance` from the lattice, or come within `radius` of a kept spot.
pub fn cleanup_spots(
    spots: &[Spot],
    lattice: &FittedLattice,
    response: &Image<f32>,
    tolerance: f64,
    radius: f64,
    policy: OutlierPolicy,
) -> Vec<Spot> {
    let (w, h) = response.dims();
    let mut kept: Vec<Spot> = Vec::with_capacity(spots.len());
    let mut outliers = Vec::new();
    for s in spots {
        if lattice.residual(spot_point(s)) <= tolerance {
            kept.push(*s);
        } else {
            outliers.push(*s);
        }
    }
    if policy == OutlierPolicy::Reject {
        return kept;
    }
    for s in outliers {
        let target = lattice.predict(&lattice.index_of(spot_point(&s)));
        let (rx, ry) = (target[0].round(), target[1].round());
        if rx < 0.0 || ry < 0.0 || rx >= w as f64 || ry >= h as f64 {
            continue;
        }
        if (rx - target[0]).hypot(ry - target[1]) > tolerance {
            continue;
        }
        let r2 = radius * radius;
        let crowded = kept.iter().any(|k| {
            let dx = k.x as f64 - rx;
            let dy = k.y as f64 - ry;
            dx * dx + dy * dy <= r2
        });
        if crowded {
            continue;
        }
        let (x, y) = (rx as usize, ry as usize);
        kept.push(Spot {
            x,
            y,
            score: response.data()[y * w + x],
        });
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot(x: usize, y: usize) -> Spot {
        Spot { x, y, score: 1.0 }
    }

    #[test]
    fn fit_recovers_exact_lattice() {
        let spots: Vec<Spot> = [(0i64, 0i64), (1, 0), (0, 1), (1, 1), (2, 1)]
            .iter()
            .map(|&(i, j)| spot((10 + 15 * i - 3 * j) as usize, (12 + 2 * i + 14 * j) as usize))
            .collect();
        let approx = LatticeVectors {
            basis: vec![[14.0, 2.5], [-3.5, 13.5]],
        };
        let fitted = fit_lattice(&spots, &approx, 3.0).unwrap();
        assert!((fitted.origin[0] - 10.0).abs() < 1e-9);
        assert!((fitted.basis[0][0] - 15.0).abs() < 1e-9);
        assert!((fitted.basis[1][1] - 14.0).abs() < 1e-9);
        assert!(fitted.rms < 1e-9);
    }

    #[test]
    fn outliers_are_snapped_or_rejected() {
        let lattice = FittedLattice {
            origin: [5.0, 5.0],
            basis: vec![[10.0, 0.0], [0.0, 10.0]],
            rms: 0.0,
        };
        let response = Image::filled(40, 40, 1.0f32).unwrap();
        let spots = vec![spot(5, 5), spot(15, 5), spot(29, 18)];
        let rejected = cleanup_spots(&spots, &lattice, &response, 1.5, 4.0, OutlierPolicy::Reject);
        assert_eq!(rejected.len(), 2);
        let snapped = cleanup_spots(&spots, &lattice, &response, 1.5, 4.0, OutlierPolicy::Snap);
        assert_eq!(snapped.len(), 3);
        assert_eq!((snapped[2].x, snapped[2].y), (25, 15));
    }
}
