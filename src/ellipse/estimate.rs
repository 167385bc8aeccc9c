//! Staged ellipse estimation for one (image, spot) pair.
//!
//! Stages are separate types so a pair moves strictly forward:
//! [`RegionExtracted`] -> [`CoarseMasked`] -> [`RoughFit`] ->
//! [`DistanceWeighted`] -> [`Refined`] -> [`Ellipse`].

use crate::ellipse::conic::{ellipse_points_from_conic, Conic, Ellipse};
use crate::filter::{annular_mask, extract_masked_region, MaskedRegion};
use crate::image::{Image, Mask};
use crate::register::AlignedAccumulator;
use crate::solver::{KMeansResult, NumericSolver};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{BraggError, BraggResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Which annulus pixels survive the refinement step.
///
/// Distances are signed (negative inside the rough ellipse) and clustered
/// with weighted k-means; clusters are ranked by ascending center.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceBand {
    /// Pixels whose distance lies between the lowest and highest centers.
    Span,
    /// Pixels of the `upto` clusters whose centers lie nearest the rough ellipse.
    Nearest { upto: usize },
    /// Pixels of the lowest and highest clusters.
    Extremes,
}

impl DistanceBand {
    /// Per-pixel keep flags from signed distances and the clustering.
    fn select(&self, distances: &[f64], km: &KMeansResult, order: &[usize]) -> Vec<bool> {
        let low = km.center(order[0])[0];
        let high = km.center(order[order.len() - 1])[0];
        match *self {
            DistanceBand::Span => distances.iter().map(|&d| d >= low && d <= high).collect(),
            DistanceBand::Nearest { upto } => {
                let mut by_abs = order.to_vec();
                by_abs.sort_by(|&a, &b| km.center(a)[0].abs().total_cmp(&km.center(b)[0].abs()));
                let mut kept = vec![false; km.k()];
                for &c in by_abs.iter().take(upto) {
                    kept[c] = true;
                }
                km.labels.iter().map(|&l| kept[l]).collect()
            }
            DistanceBand::Extremes => {
                let (first, last) = (order[0], order[order.len() - 1]);
                km.labels.iter().map(|&l| l == first || l == last).collect()
            }
        }
    }
}

/// Configuration for ellipse estimation.
#[derive(Clone, Debug, PartialEq)]
pub struct EllipseConfig {
    /// Inner radius of the extraction annulus; `None` means half the spot radius.
    pub inner_radius: Option<f64>,
    /// Outer radius of the extraction annulus; `None` means 1.5 spot radii.
    pub outer_radius: Option<f64>,
    /// Minimum pixels for a fit.
    pub min_points: usize,
    pub max_iterations: usize,
    pub convergence_threshold: f64,
    /// Bisection accuracy of point-to-ellipse distances.
    pub distance_accuracy: f64,
    /// Clusters for the distance refinement.
    pub distance_clusters: usize,
    pub band: DistanceBand,
    /// Estimate (image, spot) pairs with rayon when available.
    pub parallel: bool,
}

impl Default for EllipseConfig {
    fn default() -> Self {
        Self {
            inner_radius: None,
            outer_radius: None,
            min_points: 6,
            max_iterations: 20,
            convergence_threshold: 1e-6,
            distance_accuracy: 1e-6,
            distance_clusters: 3,
            band: DistanceBand::Span,
            parallel: false,
        }
    }
}

impl EllipseConfig {
    /// Extraction radii for a given spot radius.
    pub fn radii(&self, spot_radius: f64) -> (f64, f64) {
        (
            self.inner_radius.unwrap_or(0.5 * spot_radius),
            self.outer_radius.unwrap_or(1.5 * spot_radius),
        )
    }
}

/// Gradient values under the annulus around a spot.
#[derive(Clone, Debug)]
pub struct RegionExtracted {
    pub region: MaskedRegion,
}

/// High-gradient pixels isolated by two-cluster k-means.
#[derive(Clone, Debug)]
pub struct CoarseMasked {
    /// Every pixel under the annulus.
    pub annulus: MaskedRegion,
    pub region: MaskedRegion,
}

/// First weighted conic fit over the coarse mask.
#[derive(Clone, Debug)]
pub struct RoughFit {
    pub annulus: MaskedRegion,
    pub region: MaskedRegion,
    pub conic: Conic,
    pub ellipse: Ellipse,
}

/// Annulus pixels kept after distance clustering against the rough ellipse.
#[derive(Clone, Debug)]
pub struct DistanceWeighted {
    pub region: MaskedRegion,
    /// Cluster centers of the signed distances, ascending.
    pub band_centers: Vec<f64>,
}

/// Final conic of the (image, spot) pair.
#[derive(Clone, Copy, Debug)]
pub struct Refined {
    pub conic: Conic,
}

impl Refined {
    /// Decomposes the final conic.
    pub fn decompose(&self) -> Ellipse {
        ellipse_points_from_conic(&self.conic)
    }
}

/// Ellipse fits for every spot of one image.
#[derive(Clone, Debug)]
pub struct ImageEllipses {
    pub image: usize,
    /// Per-spot outcomes, or the reason the whole image was skipped.
    pub spots: BraggResult<Vec<BraggResult<Ellipse>>>,
}

/// Runs the estimation stages with a numeric solver.
pub struct EllipseEstimator<'s, S: NumericSolver> {
    solver: &'s S,
    cfg: EllipseConfig,
    mask: Mask,
    half: i64,
    inner: f64,
    outer: f64,
}

impl<'s, S: NumericSolver> EllipseEstimator<'s, S> {
    /// Prepares the extraction annulus for spots of radius `spot_radius`.
    pub fn new(solver: &'s S, cfg: EllipseConfig, spot_radius: f64) -> BraggResult<Self> {
        let (inner, outer) = cfg.radii(spot_radius);
        if !(outer > inner) || inner < 0.0 {
            return Err(BraggError::InvalidInput {
                reason: "ellipse annulus needs 0 <= inner < outer",
            });
        }
        let half = outer.ceil() as i64;
        let mask = annular_mask(2 * half as usize + 1, inner, outer)?;
        Ok(Self {
            solver,
            cfg,
            mask,
            half,
            inner,
            outer,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EllipseConfig {
        &self.cfg
    }

    fn require_points(&self, got: usize) -> BraggResult<()> {
        let needed = self.cfg.min_points.max(5);
        if got < needed {
            return Err(BraggError::InsufficientPoints { needed, got });
        }
        Ok(())
    }

    fn fit(&self, region: &MaskedRegion) -> BraggResult<Conic> {
        let weights: Vec<f64> = region.values.iter().map(|&v| v as f64).collect();
        self.solver.fit_conic(
            &region.points,
            &weights,
            0.5 * (self.inner + self.outer),
            self.cfg.max_iterations,
            self.cfg.convergence_threshold,
        )
    }

    /// Extracts gradient values under the annulus centred near `center`.
    pub fn extract(&self, gradient: &Image<f32>, center: [f64; 2]) -> BraggResult<RegionExtracted> {
        let cx = center[0].round() as i64;
        let cy = center[1].round() as i64;
        let region = extract_masked_region(gradient, &self.mask, (cx - self.half, cy - self.half))?;
        Ok(RegionExtracted { region })
    }

    /// Keeps the high-gradient cluster of an unweighted two-means split.
    pub fn coarse_mask(&self, stage: RegionExtracted) -> BraggResult<CoarseMasked> {
        let annulus = stage.region;
        self.require_points(annulus.len())?;
        let data: Vec<f64> = annulus.values.iter().map(|&v| v as f64).collect();
        let ones = vec![1.0; data.len()];
        let km = self.solver.weighted_kmeans(&data, 1, &ones, 2)?;
        let high = km.order_by_first()[1];
        let keep: Vec<bool> = km.labels.iter().map(|&l| l == high).collect();
        let region = annulus.retain_flags(&keep);
        self.require_points(region.len())?;
        Ok(CoarseMasked { annulus, region })
    }

    /// Gradient-weighted conic fit over the coarse mask.
    pub fn rough_fit(&self, stage: CoarseMasked) -> BraggResult<RoughFit> {
        let conic = self.fit(&stage.region)?;
        Ok(RoughFit {
            annulus: stage.annulus,
            region: stage.region,
            conic,
            ellipse: ellipse_points_from_conic(&conic),
        })
    }

    /// Clusters signed distances of every annulus pixel to the rough ellipse
    /// and keeps the configured band.
    pub fn distance_weight(&self, stage: RoughFit) -> BraggResult<DistanceWeighted> {
        let annulus = stage.annulus;
        let ellipse = stage.ellipse;
        let unsigned =
            self.solver
                .distance_to_ellipse(&annulus.points, &ellipse, self.cfg.distance_accuracy)?;
        let distances: Vec<f64> = annulus
            .points
            .iter()
            .zip(unsigned)
            .map(|(p, d)| if ellipse.contains(*p) { -d } else { d })
            .collect();
        let weights: Vec<f64> = annulus.values.iter().map(|&v| v as f64).collect();
        let k = self.cfg.distance_clusters.max(1);
        let km = self.solver.weighted_kmeans(&distances, 1, &weights, k)?;
        let order = km.order_by_first();
        let band_centers: Vec<f64> = order.iter().map(|&c| km.center(c)[0]).collect();
        let keep = self.cfg.band.select(&distances, &km, &order);
        let region = annulus.retain_flags(&keep);
        self.require_points(region.len())?;
        trace_event!("distance_band", annulus = annulus.len(), kept = region.len());
        Ok(DistanceWeighted {
            region,
            band_centers,
        })
    }

    /// Final weighted conic fit over the retained pixels.
    pub fn refine(&self, stage: DistanceWeighted) -> BraggResult<Refined> {
        Ok(Refined {
            conic: self.fit(&stage.region)?,
        })
    }

    /// Runs every stage for one spot.
    ///
    /// A rough fit that is not an ellipse ends the pair with
    /// `is_ellipse == false`.
    pub fn estimate(&self, gradient: &Image<f32>, center: [f64; 2]) -> BraggResult<Ellipse> {
        let region = self.extract(gradient, center)?;
        let coarse = self.coarse_mask(region)?;
        let rough = self.rough_fit(coarse)?;
        if !rough.ellipse.is_ellipse {
            return Ok(rough.ellipse);
        }
        let weighted = self.distance_weight(rough)?;
        Ok(self.refine(weighted)?.decompose())
    }

    /// Fits every spot on the accumulator's gradient image.
    pub fn estimate_accumulator(
        &self,
        gradient: &Image<f32>,
        centers: &[[f64; 2]],
    ) -> Vec<BraggResult<Ellipse>> {
        let _span = trace_span!("estimate_ellipses", scope = "accumulator", spots = centers.len())
            .entered();
        let run = |c: &[f64; 2]| self.estimate(gradient, *c);
        #[cfg(feature = "rayon")]
        let out: Vec<_> = if self.cfg.parallel {
            centers.par_iter().map(run).collect()
        } else {
            centers.iter().map(run).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let out: Vec<_> = centers.iter().map(run).collect();
        report(&out);
        out
    }

    /// Fits every spot in every image.
    ///
    /// `centers` are in the accumulator frame and are mapped into each image
    /// with its registered offset. Images that were not accumulated are
    /// reported with `DisconnectedStack`.
    pub fn estimate_stack(
        &self,
        gradients: &[Image<f32>],
        accumulator: &AlignedAccumulator,
        centers: &[[f64; 2]],
    ) -> Vec<ImageEllipses> {
        let _span = trace_span!(
            "estimate_ellipses",
            scope = "stack",
            images = gradients.len(),
            spots = centers.len()
        )
        .entered();
        let run_image = |(index, gradient): (usize, &Image<f32>)| -> ImageEllipses {
            let spots = centers
                .iter()
                .map(|c| accumulator.to_image_coords(index, c[0], c[1]))
                .collect::<BraggResult<Vec<_>>>()
                .map(|local| {
                    let fits: Vec<BraggResult<Ellipse>> = local
                        .iter()
                        .map(|&(x, y)| self.estimate(gradient, [x, y]))
                        .collect();
                    report(&fits);
                    fits
                });
            if let Err(err) = &spots {
                trace_warn!("image_skipped", image = index, error = err.to_string().as_str());
            }
            ImageEllipses { image: index, spots }
        };
        #[cfg(feature = "rayon")]
        if self.cfg.parallel {
            return gradients.par_iter().enumerate().map(run_image).collect();
        }
        gradients.iter().enumerate().map(run_image).collect()
    }
}

fn report(results: &[BraggResult<Ellipse>]) {
    let fitted = results
        .iter()
        .filter(|r| matches!(r, Ok(e) if e.is_ellipse))
        .count();
    let degenerate = results
        .iter()
        .filter(|r| matches!(r, Ok(e) if !e.is_ellipse))
        .count();
    let failed = results.len() - fitted - degenerate;
    trace_event!("ellipses", fitted = fitted, degenerate = degenerate, failed = failed);
}
