//! Numeric capabilities consumed by the ellipse estimator.
//!
//! [`NumericSolver`] is the narrow synchronous interface the estimator calls
//! for conic fitting, weighted clustering, and point-to-ellipse distances.
//! [`HyperRenormSolver`] is the in-process implementation.

mod conic;
mod distance;
mod kmeans;

pub use conic::fit_conic_hyper;
pub use distance::{distance_to_ellipse, point_ellipse_distance};
pub use kmeans::{weighted_kmeans, KMeansResult};

use crate::ellipse::{Conic, Ellipse};
use crate::util::BraggResult;

/// Conic fitting, weighted k-means, and point-to-ellipse distance.
pub trait NumericSolver: Sync {
    /// Weighted hyper-renormalised conic fit.
    ///
    /// Stops when the angle between successive estimates, scaled by the ratio
    /// of their magnitudes, drops below `convergence_threshold`, or after
    /// `max_iterations`, returning the last estimate.
    fn fit_conic(
        &self,
        points: &[[f64; 2]],
        weights: &[f64],
        size_scale: f64,
        max_iterations: usize,
        convergence_threshold: f64,
    ) -> BraggResult<Conic>;

    /// Weighted k-means over row-major `data` with `dims` columns.
    fn weighted_kmeans(
        &self,
        data: &[f64],
        dims: usize,
        weights: &[f64],
        k: usize,
    ) -> BraggResult<KMeansResult>;

    /// Unsigned Euclidean distance from each point to the ellipse boundary.
    fn distance_to_ellipse(
        &self,
        points: &[[f64; 2]],
        ellipse: &Ellipse,
        accuracy: f64,
    ) -> BraggResult<Vec<f64>>;
}

/// In-process solver: Kanatani hyper-renormalisation, Lloyd k-means with
/// deterministic quantile seeding, and Eberly's bisection distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HyperRenormSolver {
    /// Iteration cap for k-means.
    pub kmeans_iterations: usize,
    /// Bisection cap for the distance root finder.
    pub distance_iterations: usize,
}

impl Default for HyperRenormSolver {
    fn default() -> Self {
        Self {
            kmeans_iterations: 100,
            distance_iterations: 200,
        }
    }
}

impl NumericSolver for HyperRenormSolver {
    fn fit_conic(
        &self,
        points: &[[f64; 2]],
        weights: &[f64],
        size_scale: f64,
        max_iterations: usize,
        convergence_threshold: f64,
    ) -> BraggResult<Conic> {
        fit_conic_hyper(
            points,
            weights,
            size_scale,
            max_iterations,
            convergence_threshold,
        )
    }

    fn weighted_kmeans(
        &self,
        data: &[f64],
        dims: usize,
        weights: &[f64],
        k: usize,
    ) -> BraggResult<KMeansResult> {
        weighted_kmeans(data, dims, weights, k, self.kmeans_iterations)
    }

    fn distance_to_ellipse(
        &self,
        points: &[[f64; 2]],
        ellipse: &Ellipse,
        accuracy: f64,
    ) -> BraggResult<Vec<f64>> {
        distance_to_ellipse(points, ellipse, accuracy, self.distance_iterations)
    }
}
