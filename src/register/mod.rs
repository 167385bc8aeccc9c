//! Frequency-domain registration of an image stack.
//!
//! Each image is primed once, then image pairs are phase-correlated
//! independently. The resulting sparse table of relative positions is
//! reconciled into per-image offsets in a single-threaded solve, and the
//! stack is averaged into an [`AlignedAccumulator`].

mod accumulate;
mod phase;
mod prime;
mod refine;

pub use accumulate::AlignedAccumulator;
pub use phase::{
    correlation_surface, locate_peak, pair_window, phase_correlate, RelativePosition, SurfacePeak,
};
pub use prime::{prime_image, ring_disc_response, PrimedImage};
pub use refine::{refine_positions, Offset, PositionTable};

use crate::filter::hann_window;
use crate::image::Image;
use crate::spectral::{FilterBank, FilterConfig, SpectralContext};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{BraggError, BraggResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Configuration for stack registration.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistrationConfig {
    /// Annulus/circle geometry used for priming.
    pub filter: FilterConfig,
    /// Apply a Hann window before filtering.
    pub window: bool,
    /// Absolute score tolerance for correlation-peak ties.
    pub peak_tolerance: f32,
    /// Pairs scoring below this are left out of the refinement.
    pub min_confidence: f32,
    /// Correlate only pairs whose index distance is at most this.
    pub pair_window: Option<usize>,
    /// Parabolic sub-pixel refinement of correlation peaks.
    pub subpixel: bool,
    /// Reference image for the position table.
    pub reference: usize,
    /// Use rayon for priming and pairwise correlation when available.
    pub parallel: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig {
                correlation_sigma: 2.0,
                ..FilterConfig::default()
            },
            window: true,
            peak_tolerance: 1e-4,
            min_confidence: 0.05,
            pair_window: None,
            subpixel: true,
            reference: 0,
            parallel: false,
        }
    }
}

/// Output of stack registration.
#[derive(Clone, Debug)]
pub struct Registration {
    /// Accepted pairwise records.
    pub pairs: Vec<RelativePosition>,
    /// Pairs that failed or scored below the confidence floor.
    pub rejected: Vec<(usize, usize)>,
    /// Reconciled per-image offsets.
    pub positions: PositionTable,
}

/// Registration engine bound to one image size.
pub struct Registrar<'a> {
    ctx: &'a SpectralContext,
    bank: FilterBank,
    window: Option<Image<f32>>,
    cfg: RegistrationConfig,
}

impl<'a> Registrar<'a> {
    /// Builds the filters for the context's image size.
    pub fn new(ctx: &'a SpectralContext, cfg: RegistrationConfig) -> BraggResult<Self> {
        let bank = FilterBank::new(ctx, &cfg.filter)?;
        let (w, h) = ctx.dims();
        let window = if cfg.window {
            Some(hann_window(w, h)?)
        } else {
            None
        };
        Ok(Self {
            ctx,
            bank,
            window,
            cfg,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RegistrationConfig {
        &self.cfg
    }

    /// Returns the filters used for priming.
    pub fn filters(&self) -> &FilterBank {
        &self.bank
    }

    /// Primes every image of the stack.
    pub fn prime_images(&self, images: &[Image<f32>]) -> BraggResult<Vec<PrimedImage>> {
        let _span = trace_span!("prime_images", count = images.len()).entered();
        let prime =
            |(i, img): (usize, &Image<f32>)| prime_image(self.ctx, &self.bank, img, self.window.as_ref(), i);

        #[cfg(feature = "rayon")]
        if self.cfg.parallel {
            return images.par_iter().enumerate().map(prime).collect();
        }
        images.iter().enumerate().map(prime).collect()
    }

    /// Phase-correlates the configured image pairs.
    ///
    /// Each pair is an independent unit: failures and weak peaks are
    /// collected in the second vector and never abort the batch.
    pub fn correlate_pairs(
        &self,
        primed: &[PrimedImage],
    ) -> (Vec<RelativePosition>, Vec<(usize, usize)>) {
        let pairs = pair_window(primed.len(), self.cfg.pair_window);
        let _span = trace_span!("pairwise_correlation", pairs = pairs.len()).entered();
        let correlate = |&(i, j): &(usize, usize)| -> Result<RelativePosition, (usize, usize)> {
            let result = phase_correlate(
                self.ctx,
                &primed[i],
                &primed[j],
                &self.bank.lowpass,
                self.cfg.peak_tolerance,
                self.cfg.subpixel,
            );
            match result {
                Ok(Some(rp)) if rp.confidence >= self.cfg.min_confidence => Ok(rp),
                Ok(Some(rp)) => {
                    trace_warn!("weak_pair", a = i, b = j, confidence = rp.confidence);
                    Err((i, j))
                }
                Ok(None) => Err((i, j)),
                Err(err) => {
                    trace_warn!("pair_failed", a = i, b = j, error = err.to_string().as_str());
                    Err((i, j))
                }
            }
        };

        #[cfg(feature = "rayon")]
        let results: Vec<_> = if self.cfg.parallel {
            pairs.par_iter().map(correlate).collect()
        } else {
            pairs.iter().map(correlate).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let results: Vec<_> = pairs.iter().map(correlate).collect();

        let mut accepted = Vec::with_capacity(results.len());
        let mut rejected = Vec::new();
        for r in results {
            match r {
                Ok(rp) => accepted.push(rp),
                Err(pair) => rejected.push(pair),
            }
        }
        trace_event!("pairs_scored", accepted = accepted.len(), rejected = rejected.len());
        (accepted, rejected)
    }

    /// Primes, correlates and reconciles the whole stack.
    pub fn register(&self, images: &[Image<f32>]) -> BraggResult<Registration> {
        if images.is_empty() {
            return Err(BraggError::InvalidInput {
                reason: "empty image stack",
            });
        }
        let primed = self.prime_images(images)?;
        let (pairs, rejected) = self.correlate_pairs(&primed);
        let positions = {
            let _span = trace_span!("refine_positions", pairs = pairs.len()).entered();
            refine_positions(images.len(), self.cfg.reference, &pairs)?
        };
        trace_event!("positions_refined", residual = positions.residual());
        Ok(Registration {
            pairs,
            rejected,
            positions,
        })
    }
}

/// Averages the stack at the registered offsets.
pub fn align_and_average(
    images: &[Image<f32>],
    positions: &PositionTable,
) -> BraggResult<AlignedAccumulator> {
    let _span = trace_span!("align_and_average", count = images.len()).entered();
    AlignedAccumulator::accumulate(images, positions)
}
