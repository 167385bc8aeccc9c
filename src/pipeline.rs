//! End-to-end driver: registration, accumulation, detection, ellipse fits.
//!
//! Units fail independently: a disconnected image or a spot whose fit fails
//! is recorded in the output and the run continues. Only stack-level
//! problems (empty or mismatched stack, no usable spot response) abort.

use crate::ellipse::{Ellipse, EllipseConfig, EllipseEstimator, ImageEllipses};
use crate::filter::gradient_amplitude;
use crate::image::Image;
use crate::lattice::{
    estimate_spot_radius, radius_upper_bound, refine_annulus_params, AnnulusSearch,
    RadiusBoundConfig, SpotConfig, SpotDetection, SpotDetector,
};
use crate::register::{align_and_average, AlignedAccumulator, Registrar, Registration, RegistrationConfig};
use crate::solver::{HyperRenormSolver, NumericSolver};
use crate::spectral::SpectralContext;
use crate::spotmap::{spot_maps, SpotMap};
use crate::symmetry::{
    average_intersection, average_origin, periodic_symmetry_axes, refine_mirror_lines,
    symmetry_axes, top_symmetry_axes, MirrorLine, SymmetryConfig,
};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{BraggError, BraggResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Integer radius range searched when the spot radius is not known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RadiusSearch {
    pub min: usize,
    pub max: usize,
}

/// Configuration for a full pipeline run.
///
/// `spot_radius` (or the radius found by `radius_search`) overrides the
/// radius fields of the registration and detection configs.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub spot_radius: f64,
    /// Estimate the radius on the first image instead of using `spot_radius`.
    pub radius_search: Option<RadiusSearch>,
    /// Cap the upper end of `radius_search` at the autocorrelation bound of
    /// the stack. A stack without repeated spots keeps the configured range.
    pub radius_bound: Option<RadiusBoundConfig>,
    /// Refine the radius and the annulus thickness on the first image; the
    /// thickness then replaces the registration and detection thickness.
    pub annulus: Option<AnnulusSearch>,
    pub registration: RegistrationConfig,
    pub spots: SpotConfig,
    pub ellipse: EllipseConfig,
    /// Run the symmetry/origin estimator on the accumulator.
    pub symmetry: Option<SymmetryConfig>,
    /// Build per-spot maps with this neighbourhood radius.
    pub spot_map_radius: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            spot_radius: 6.0,
            radius_search: None,
            radius_bound: None,
            annulus: None,
            registration: RegistrationConfig::default(),
            spots: SpotConfig::default(),
            ellipse: EllipseConfig::default(),
            symmetry: None,
            spot_map_radius: None,
        }
    }
}

impl PipelineConfig {
    /// Enables the `parallel` switch of every stage.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.registration.parallel = parallel;
        self.spots.parallel = parallel;
        self.ellipse.parallel = parallel;
        if let Some(sym) = self.symmetry.as_mut() {
            sym.parallel = parallel;
        }
        self
    }
}

/// Mirror axes and the two origin estimates.
#[derive(Clone, Debug, PartialEq)]
pub struct SymmetryReport {
    pub axes: Vec<MirrorLine>,
    pub intersection: Option<[f64; 2]>,
    pub origin: Option<[f64; 2]>,
}

/// Everything a pipeline run produced.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub spot_radius: f64,
    /// Thickness chosen by annulus refinement, when it ran.
    pub annulus_thickness: Option<f64>,
    pub registration: Registration,
    pub accumulator: AlignedAccumulator,
    pub detection: SpotDetection,
    /// Per-spot fits on the accumulator, in spot order.
    pub accumulator_ellipses: Vec<BraggResult<Ellipse>>,
    /// Per-image, per-spot fits.
    pub image_ellipses: Vec<ImageEllipses>,
    pub symmetry: Option<SymmetryReport>,
    pub spot_maps: Vec<SpotMap>,
}

/// Pipeline driver generic over the numeric solver.
pub struct Pipeline<S: NumericSolver = HyperRenormSolver> {
    cfg: PipelineConfig,
    solver: S,
}

impl Pipeline<HyperRenormSolver> {
    /// Creates a pipeline with the in-process solver.
    pub fn new(cfg: PipelineConfig) -> Self {
        Self::with_solver(cfg, HyperRenormSolver::default())
    }
}

impl<S: NumericSolver> Pipeline<S> {
    /// Creates a pipeline with a custom solver.
    pub fn with_solver(cfg: PipelineConfig, solver: S) -> Self {
        Self { cfg, solver }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Runs every stage over an image stack.
    pub fn run(&self, images: &[Image<f32>]) -> BraggResult<PipelineOutput> {
        let _span = trace_span!("pipeline", images = images.len()).entered();
        let first = images.first().ok_or(BraggError::InvalidInput {
            reason: "empty image stack",
        })?;
        for img in images {
            first.ensure_same_dims(img)?;
        }
        let ctx = SpectralContext::new(first.width(), first.height())?;

        let spot_radius = match self.cfg.radius_search {
            Some(search) => {
                let max = match &self.cfg.radius_bound {
                    Some(bound_cfg) => match radius_upper_bound(&ctx, images, bound_cfg) {
                        Ok(bound) => (bound.floor() as usize).min(search.max).max(search.min),
                        Err(err) => {
                            trace_warn!("radius_bound_skipped", error = err.to_string().as_str());
                            search.max
                        }
                    },
                    None => search.max,
                };
                estimate_spot_radius(&ctx, first, search.min, max, self.cfg.spots.thickness)?
            }
            None => self.cfg.spot_radius,
        };
        let (spot_radius, annulus_thickness) = match &self.cfg.annulus {
            Some(search) => {
                let params = refine_annulus_params(&ctx, first, spot_radius, search)?;
                (params.radius, Some(params.thickness))
            }
            None => (spot_radius, None),
        };
        trace_event!("spot_radius", radius = spot_radius);

        let mut reg_cfg = self.cfg.registration.clone();
        reg_cfg.filter.radius = spot_radius;
        let mut spot_cfg = SpotConfig {
            radius: spot_radius,
            ..self.cfg.spots.clone()
        };
        if let Some(thickness) = annulus_thickness {
            reg_cfg.filter.thickness = thickness;
            spot_cfg.thickness = thickness;
        }
        let registration = Registrar::new(&ctx, reg_cfg)?.register(images)?;
        let accumulator = align_and_average(images, &registration.positions)?;
        let acc_image = accumulator.filled();

        let acc_ctx = SpectralContext::new(acc_image.width(), acc_image.height())?;
        let detector = SpotDetector::new(&acc_ctx, spot_cfg)?;
        let detection = detector.detect(&acc_image)?;

        let estimator = EllipseEstimator::new(&self.solver, self.cfg.ellipse.clone(), spot_radius)?;
        let centers: Vec<[f64; 2]> = detection.spots.iter().map(|s| s.center()).collect();
        let acc_gradient = gradient_amplitude(&acc_image, self.cfg.ellipse.parallel)?;
        let accumulator_ellipses = estimator.estimate_accumulator(&acc_gradient, &centers);
        let seeds: Vec<[f64; 2]> = centers
            .iter()
            .zip(&accumulator_ellipses)
            .map(|(c, fit)| match fit {
                Ok(e) if e.is_ellipse => e.center,
                _ => *c,
            })
            .collect();
        let gradients = self.gradients(images)?;
        let image_ellipses = estimator.estimate_stack(&gradients, &accumulator, &seeds);

        let symmetry = match &self.cfg.symmetry {
            Some(scfg) => {
                let axes = symmetry_axes(&acc_image, scfg)?;
                let top = if scfg.periodic_folds.is_empty() {
                    top_symmetry_axes(&axes, scfg.top, scfg.min_separation)
                } else {
                    periodic_symmetry_axes(&axes, scfg.angle_steps, &scfg.periodic_folds)
                };
                let axes = refine_mirror_lines(&acc_image, &top, scfg);
                Some(SymmetryReport {
                    intersection: average_intersection(&axes),
                    origin: average_origin(&axes),
                    axes,
                })
            }
            None => None,
        };

        let spot_maps = match self.cfg.spot_map_radius {
            Some(r) => spot_maps(images, &accumulator, &detection.spots, r)?,
            None => Vec::new(),
        };

        Ok(PipelineOutput {
            spot_radius,
            annulus_thickness,
            registration,
            accumulator,
            detection,
            accumulator_ellipses,
            image_ellipses,
            symmetry,
            spot_maps,
        })
    }

    fn gradients(&self, images: &[Image<f32>]) -> BraggResult<Vec<Image<f32>>> {
        #[cfg(feature = "rayon")]
        if self.cfg.ellipse.parallel {
            return images
                .par_iter()
                .map(|img| gradient_amplitude(img, false))
                .collect();
        }
        images.iter().map(|img| gradient_amplitude(img, false)).collect()
    }
}
