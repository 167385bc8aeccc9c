//! Weighted hyper-renormalisation conic fit (Kanatani).
//!
//! The conic is parameterised as `theta . xi = 0` with
//! `xi = (x^2, 2xy, y^2, 2 f0 x, 2 f0 y, f0^2)`. Each iteration solves the
//! generalised eigenproblem `N theta = mu M theta` for the eigenvalue of
//! largest magnitude, where `N` carries the second-order bias correction,
//! then updates the per-point weights `1 / (theta . V0[xi] theta)`.

use crate::ellipse::Conic;
use crate::util::{BraggError, BraggResult};
use nalgebra::{Matrix6, SymmetricEigen, Vector6};

const MIN_POINTS: usize = 5;

fn carrier(x: f64, y: f64, f0: f64) -> Vector6<f64> {
    Vector6::new(x * x, 2.0 * x * y, y * y, 2.0 * f0 * x, 2.0 * f0 * y, f0 * f0)
}

/// Normalised first-order covariance of the carrier (without `sigma^2`).
fn carrier_covariance(x: f64, y: f64, f0: f64) -> Matrix6<f64> {
    let tx = Vector6::new(2.0 * x, 2.0 * y, 0.0, 2.0 * f0, 0.0, 0.0);
    let ty = Vector6::new(0.0, 2.0 * x, 2.0 * y, 0.0, 2.0 * f0, 0.0);
    tx * tx.transpose() + ty * ty.transpose()
}

fn sym(m: Matrix6<f64>) -> Matrix6<f64> {
    (m + m.transpose()) * 0.5
}

/// Pseudo-inverse of a symmetric PSD matrix truncated to its top five eigenpairs.
fn pseudo_inverse_rank5(m: &Matrix6<f64>) -> Matrix6<f64> {
    let eig = SymmetricEigen::new(*m);
    let mut order: Vec<usize> = (0..6).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
    let floor = eig.eigenvalues[order[0]].abs() * 1e-15;
    let mut out = Matrix6::zeros();
    for &i in order.iter().take(5) {
        let lambda = eig.eigenvalues[i];
        if lambda > floor {
            let u = eig.eigenvectors.column(i);
            out += u * u.transpose() / lambda;
        }
    }
    out
}

/// Solves `N theta = mu M theta` and returns the eigenvector of largest `|mu|`.
///
/// The returned vector is not normalised.
fn dominant_generalized(m: &Matrix6<f64>, n: &Matrix6<f64>) -> BraggResult<Vector6<f64>> {
    let eps = (m.trace().abs() * 1e-12).max(1e-300);
    let regularized = m + Matrix6::identity() * eps;
    let chol = regularized
        .cholesky()
        .ok_or_else(|| BraggError::SolverFailure {
            reason: "moment matrix is not positive definite".to_string(),
        })?;
    let l_inv = chol
        .l()
        .try_inverse()
        .ok_or_else(|| BraggError::SolverFailure {
            reason: "moment matrix factor is singular".to_string(),
        })?;
    let reduced = sym(l_inv * n * l_inv.transpose());
    let eig = SymmetricEigen::new(reduced);
    let best = (0..6)
        .max_by(|&a, &b| eig.eigenvalues[a].abs().total_cmp(&eig.eigenvalues[b].abs()))
        .unwrap_or(0);
    let y: Vector6<f64> = eig.eigenvectors.column(best).into_owned();
    let theta = l_inv.transpose() * y;
    if theta.iter().any(|v| !v.is_finite()) || theta.norm() == 0.0 {
        return Err(BraggError::SolverFailure {
            reason: "conic eigenvector is not finite".to_string(),
        });
    }
    Ok(theta)
}

/// Weighted hyper-renormalisation fit.
///
/// `weights` scale each point's contribution and are normalised to mean one
/// over points with a positive weight. `size_scale` is the `f0` constant that
/// balances the carrier components. Points are centred on their weighted
/// centroid internally; the returned conic is in the input frame and has unit
/// coefficient norm.
pub fn fit_conic_hyper(
    points: &[[f64; 2]],
    weights: &[f64],
    size_scale: f64,
    max_iterations: usize,
    convergence_threshold: f64,
) -> BraggResult<Conic> {
    if weights.len() != points.len() {
        return Err(BraggError::InvalidInput {
            reason: "conic fit weights do not match points",
        });
    }
    if !(size_scale > 0.0) || !size_scale.is_finite() {
        return Err(BraggError::InvalidInput {
            reason: "conic fit size scale must be positive",
        });
    }
    let usable: Vec<([f64; 2], f64)> = points
        .iter()
        .zip(weights)
        .filter(|(p, w)| w.is_finite() && **w > 0.0 && p[0].is_finite() && p[1].is_finite())
        .map(|(p, w)| (*p, *w))
        .collect();
    if usable.len() < MIN_POINTS {
        return Err(BraggError::InsufficientPoints {
            needed: MIN_POINTS,
            got: usable.len(),
        });
    }

    let count = usable.len() as f64;
    let total: f64 = usable.iter().map(|(_, w)| w).sum();
    let cx = usable.iter().map(|(p, w)| p[0] * w).sum::<f64>() / total;
    let cy = usable.iter().map(|(p, w)| p[1] * w).sum::<f64>() / total;
    let f0 = size_scale;

    let user: Vec<f64> = usable.iter().map(|(_, w)| w * count / total).collect();
    let xi: Vec<Vector6<f64>> = usable
        .iter()
        .map(|(p, _)| carrier(p[0] - cx, p[1] - cy, f0))
        .collect();
    let v0: Vec<Matrix6<f64>> = usable
        .iter()
        .map(|(p, _)| carrier_covariance(p[0] - cx, p[1] - cy, f0))
        .collect();
    let e = Vector6::new(1.0, 0.0, 1.0, 0.0, 0.0, 0.0);

    let mut renorm = vec![1.0f64; usable.len()];
    let mut previous: Option<Vector6<f64>> = None;
    let mut theta = Vector6::zeros();

    for _ in 0..max_iterations.max(1) {
        let mut m = Matrix6::zeros();
        for ((x, &u), &r) in xi.iter().zip(&user).zip(&renorm) {
            m += x * x.transpose() * (u * r);
        }
        m /= count;

        let m5 = pseudo_inverse_rank5(&m);
        let mut first = Matrix6::zeros();
        let mut second = Matrix6::zeros();
        for (((x, v), &u), &r) in xi.iter().zip(&v0).zip(&user).zip(&renorm) {
            let w = u * r;
            first += (v + sym(x * e.transpose()) * 2.0) * w;
            let mx = m5 * x;
            second += (v * x.dot(&mx) + sym(v * mx * x.transpose()) * 2.0) * (w * w);
        }
        let n = first / count - second / (count * count);

        let raw = dominant_generalized(&m, &n)?;
        let mut unit = raw.normalize();

        let converged = match previous {
            Some(prev) => {
                if unit.dot(&theta) < 0.0 {
                    unit = -unit;
                }
                let cos = unit.dot(&theta).clamp(-1.0, 1.0);
                let ratio = raw.norm() / prev.norm();
                cos.acos() * ratio < convergence_threshold
            }
            None => false,
        };
        theta = unit;
        previous = Some(raw);

        for (r, v) in renorm.iter_mut().zip(&v0) {
            let q = theta.dot(&(v * theta));
            *r = 1.0 / q.max(1e-12);
        }
        if converged {
            break;
        }
    }

    let conic = Conic::new(
        theta[0],
        2.0 * theta[1],
        theta[2],
        2.0 * f0 * theta[3],
        2.0 * f0 * theta[4],
        f0 * f0 * theta[5],
    );
    Ok(conic.translated(cx, cy).normalized())
}

#[cfg(test)]
mod tests {
    use super::fit_conic_hyper;
    use crate::ellipse::{ellipse_points_from_conic, Ellipse};

    #[test]
    fn exact_circle_is_recovered() {
        let truth = Ellipse::from_geometry([20.0, 30.0], 6.0, 6.0, 0.0);
        let pts: Vec<[f64; 2]> = (0..24)
            .map(|i| truth.point_at(i as f64 * std::f64::consts::TAU / 24.0))
            .collect();
        let w = vec![1.0; pts.len()];
        let conic = fit_conic_hyper(&pts, &w, 6.0, 20, 1e-8).unwrap();
        let el = ellipse_points_from_conic(&conic);
        assert!(el.is_ellipse);
        assert!((el.center[0] - 20.0).abs() < 1e-6);
        assert!((el.center[1] - 30.0).abs() < 1e-6);
        assert!((el.a - 6.0).abs() < 1e-6);
        assert!((el.b - 6.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_too_few_or_mismatched_inputs() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        assert!(fit_conic_hyper(&pts, &[1.0; 4], 1.0, 5, 1e-6).is_err());
        assert!(fit_conic_hyper(&pts, &[1.0; 3], 1.0, 5, 1e-6).is_err());
    }
}
