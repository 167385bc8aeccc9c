//! Spot lattice detection on the aligned accumulator.
//!
//! Candidates come from the ring/disc response of the accumulator, cut by a
//! rank-based threshold and pruned by non-maximum suppression. Lattice
//! vectors inferred from the candidates drive extrapolation to missed spots,
//! and a least-squares lattice fit removes or snaps outliers.

mod cleanup;
mod extrapolate;
mod radius;
mod threshold;
mod vectors;

pub use cleanup::{cleanup_spots, fit_lattice, FittedLattice, OutlierPolicy};
pub use extrapolate::extrapolate_spots;
pub use radius::{
    estimate_spot_radius, radius_upper_bound, refine_annulus_params, AnnulusParams,
    AnnulusSearch, RadiusBoundConfig,
};
pub use threshold::{threshold_proportion, ThresholdCut};
pub use vectors::{infer_lattice_vectors, LatticeVectors};

use crate::candidate::{local_maxima, nms_euclidean};
use crate::image::Image;
use crate::register::ring_disc_response;
use crate::spectral::{FilterBank, FilterConfig, SpectralContext};
use crate::trace::{trace_event, trace_span};
use crate::util::BraggResult;

/// Spot position in the accumulator frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spot {
    pub x: usize,
    pub y: usize,
    /// Combined ring/disc response at the spot.
    pub score: f32,
}

impl Spot {
    /// Position as floating-point coordinates.
    pub fn center(&self) -> [f64; 2] {
        [self.x as f64, self.y as f64]
    }
}

/// Lattice inference, extrapolation and cleanup settings.
#[derive(Clone, Debug, PartialEq)]
pub struct LatticeConfig {
    /// Run extrapolation and cleanup at all.
    pub enabled: bool,
    /// Displacements within this distance share a cluster.
    pub cluster_tolerance: f64,
    /// Displacement clusters with fewer members do not yield lattice vectors.
    pub min_population: usize,
    /// Half-width of the window searched around a predicted position.
    pub snap_radius: usize,
    /// Upper bound on extrapolation passes; each pass advances the frontier
    /// by at most two lattice steps.
    pub max_iterations: usize,
    /// Refit the vectors after each pass that added spots.
    pub reinfer: bool,
    /// Allowed deviation from the fitted lattice.
    pub tolerance: f64,
    pub policy: OutlierPolicy,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cluster_tolerance: 3.0,
            min_population: 2,
            snap_radius: 2,
            max_iterations: 512,
            reinfer: true,
            tolerance: 2.0,
            policy: OutlierPolicy::Snap,
        }
    }
}

/// Spot detection settings.
#[derive(Clone, Debug, PartialEq)]
pub struct SpotConfig {
    /// Spot radius; also the non-maximum suppression distance.
    pub radius: f64,
    /// Annulus thickness for the ring response.
    pub thickness: f64,
    /// Gaussian blur of the annulus and circle kernels.
    pub blur_sigma: f64,
    /// Fraction of response pixels kept by the threshold.
    pub proportion: f64,
    pub bins: usize,
    pub ignore_zeros: bool,
    pub lattice: LatticeConfig,
    /// Row-parallel scanning when rayon is available.
    pub parallel: bool,
}

impl Default for SpotConfig {
    fn default() -> Self {
        Self {
            radius: 6.0,
            thickness: 2.0,
            blur_sigma: 1.0,
            proportion: 0.01,
            bins: 1000,
            ignore_zeros: true,
            lattice: LatticeConfig::default(),
            parallel: false,
        }
    }
}

/// Everything the detector produced for one accumulator.
#[derive(Clone, Debug)]
pub struct SpotDetection {
    pub response: Image<f32>,
    pub cut: ThresholdCut,
    /// Candidates before lattice processing.
    pub candidates: Vec<Spot>,
    /// Final spots.
    pub spots: Vec<Spot>,
    pub vectors: Option<LatticeVectors>,
    pub lattice: Option<FittedLattice>,
}

/// Spot detector bound to the accumulator size.
pub struct SpotDetector<'a> {
    ctx: &'a SpectralContext,
    bank: FilterBank,
    cfg: SpotConfig,
}

impl<'a> SpotDetector<'a> {
    /// Builds single-power annulus and circle filters for the context size.
    pub fn new(ctx: &'a SpectralContext, cfg: SpotConfig) -> BraggResult<Self> {
        let filter = FilterConfig {
            radius: cfg.radius,
            thickness: cfg.thickness,
            blur_sigma: cfg.blur_sigma,
            annulus_power: 1,
            correlation_sigma: 0.0,
        };
        Ok(Self {
            bank: FilterBank::new(ctx, &filter)?,
            ctx,
            cfg,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SpotConfig {
        &self.cfg
    }

    /// Combined ring/disc response of an accumulator image.
    pub fn response(&self, image: &Image<f32>) -> BraggResult<Image<f32>> {
        ring_disc_response(self.ctx, &self.bank, image, None, self.cfg.parallel)
    }

    /// Thresholded, suppressed local maxima of a response map.
    pub fn candidates(&self, response: &Image<f32>) -> BraggResult<(Vec<Spot>, ThresholdCut)> {
        let cut = threshold_proportion(
            response.data(),
            self.cfg.proportion,
            self.cfg.bins,
            self.cfg.ignore_zeros,
            self.cfg.parallel,
        )?;
        let mut peaks = local_maxima(response, cut.value, self.cfg.parallel);
        let kept = nms_euclidean(&mut peaks, self.cfg.radius);
        let spots = kept
            .into_iter()
            .map(|p| Spot {
                x: p.x,
                y: p.y,
                score: p.score,
            })
            .collect();
        Ok((spots, cut))
    }

    /// Full detection: candidates, lattice extrapolation and cleanup.
    pub fn detect(&self, image: &Image<f32>) -> BraggResult<SpotDetection> {
        let _span = trace_span!("detect_spots", width = image.width(), height = image.height())
            .entered();
        let response = self.response(image)?;
        let (candidates, cut) = self.candidates(&response)?;
        trace_event!("candidates", count = candidates.len(), cut = cut.value);

        let lcfg = &self.cfg.lattice;
        let mut spots = candidates.clone();
        let mut vectors = None;
        let mut lattice = None;
        if lcfg.enabled {
            let inferred = infer_lattice_vectors(
                &spots,
                lcfg.cluster_tolerance,
                self.cfg.radius,
                lcfg.min_population,
            );
            if let Some(v) = inferred {
                let _span = trace_span!("extrapolate_lattice", seeds = spots.len()).entered();
                let (grown, v) =
                    extrapolate_spots(&response, &spots, &v, cut.value, self.cfg.radius, lcfg);
                spots = grown;
                if let Some(fitted) = fit_lattice(&spots, &v, lcfg.tolerance) {
                    spots = cleanup_spots(
                        &spots,
                        &fitted,
                        &response,
                        lcfg.tolerance,
                        self.cfg.radius,
                        lcfg.policy,
                    );
                    lattice = Some(fitted);
                }
                vectors = Some(v);
            }
        }
        trace_event!("spots", count = spots.len());
        Ok(SpotDetection {
            response,
            cut,
            candidates,
            spots,
            vectors,
            lattice,
        })
    }
}
