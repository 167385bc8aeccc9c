//! Frequency-domain filters built once per run.
//!
//! Spatial kernels are laid out centred on the origin with wrap-around, so
//! multiplying a spectrum by a filter yields a correlation that is not
//! shifted. Kernels are normalised to unit sum before transforming.

use super::context::{Complex, SpectralContext, Spectrum};
use crate::image::Image;
use crate::util::math::centered_index;
use crate::util::{BraggError, BraggResult};
use std::f64::consts::PI;

/// A frequency-domain representation of a convolution kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencyFilter {
    spectrum: Spectrum,
}

impl FrequencyFilter {
    /// Transforms a kernel that is already laid out with wrap-around.
    pub fn from_wrapped_kernel(ctx: &SpectralContext, kernel: &Image<f32>) -> BraggResult<Self> {
        Ok(Self {
            spectrum: ctx.forward(kernel)?,
        })
    }

    /// Builds a filter from a radial predicate on the distance to the origin.
    fn from_radial(ctx: &SpectralContext, keep: impl Fn(f64) -> bool) -> BraggResult<Self> {
        let (w, h) = ctx.dims();
        let mut kernel = Image::from_fn(w, h, |x, y| {
            let dx = centered_index(x, w) as f64;
            let dy = centered_index(y, h) as f64;
            if keep(dx.hypot(dy)) {
                1.0f32
            } else {
                0.0
            }
        })?;
        let sum: f32 = kernel.data().iter().sum();
        if sum <= 0.0 {
            return Err(BraggError::InvalidInput {
                reason: "filter kernel has no support",
            });
        }
        kernel.data_mut().iter_mut().for_each(|v| *v /= sum);
        Self::from_wrapped_kernel(ctx, &kernel)
    }

    /// Ring of mean radius `radius` and width `thickness`.
    pub fn annulus(ctx: &SpectralContext, radius: f64, thickness: f64) -> BraggResult<Self> {
        if !(radius > 0.0) || !(thickness > 0.0) {
            return Err(BraggError::InvalidInput {
                reason: "annulus radius and thickness must be positive",
            });
        }
        let inner = (radius - thickness / 2.0).max(0.0);
        let outer = radius + thickness / 2.0;
        Self::from_radial(ctx, |d| d >= inner && d <= outer)
    }

    /// Filled disc of radius `radius`.
    pub fn circle(ctx: &SpectralContext, radius: f64) -> BraggResult<Self> {
        if !(radius >= 0.0) {
            return Err(BraggError::InvalidInput {
                reason: "circle radius must be non-negative",
            });
        }
        Self::from_radial(ctx, |d| d <= radius)
    }

    /// Analytic Gaussian low-pass with spatial standard deviation `sigma`.
    ///
    /// `sigma == 0` yields the identity filter.
    pub fn gaussian(width: usize, height: usize, sigma: f64) -> BraggResult<Self> {
        if !(sigma >= 0.0) {
            return Err(BraggError::InvalidInput {
                reason: "gaussian sigma must be non-negative",
            });
        }
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            let fy = centered_index(y, height) as f64 / height as f64;
            for x in 0..width {
                let fx = centered_index(x, width) as f64 / width as f64;
                let g = (-2.0 * PI * PI * sigma * sigma * (fx * fx + fy * fy)).exp();
                data.push(Complex::new(g as f32, 0.0));
            }
        }
        Ok(Self {
            spectrum: Spectrum::from_data(data, width, height)?,
        })
    }

    /// Filter that leaves spectra unchanged.
    pub fn identity(width: usize, height: usize) -> BraggResult<Self> {
        Ok(Self {
            spectrum: Spectrum::filled(width, height, Complex::new(1.0, 0.0))?,
        })
    }

    /// `n`-fold self-convolution of the kernel (Fourier-domain power).
    pub fn recursive(&self, n: u32) -> Self {
        Self {
            spectrum: self.spectrum.powi(n),
        }
    }

    /// Cascade of two filters.
    pub fn combine(&self, other: &FrequencyFilter) -> BraggResult<Self> {
        Ok(Self {
            spectrum: self.spectrum.multiply(&other.spectrum)?,
        })
    }

    /// Returns the filter coefficients.
    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    /// Mean gain over all frequencies (the spatial kernel's value at the origin).
    pub fn mean_gain(&self) -> f32 {
        self.spectrum.mean_re()
    }
}

/// Geometry of the annulus/circle filters and their smoothing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterConfig {
    /// Mean radius of the annulus and radius of the circle, in pixels.
    pub radius: f64,
    /// Radial width of the annulus.
    pub thickness: f64,
    /// Gaussian blur applied to both kernels.
    pub blur_sigma: f64,
    /// Number of self-convolutions of the annulus.
    pub annulus_power: u32,
    /// Gaussian smoothing of normalised cross-power spectra.
    pub correlation_sigma: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            radius: 6.0,
            thickness: 2.0,
            blur_sigma: 1.0,
            annulus_power: 2,
            correlation_sigma: 1.0,
        }
    }
}

/// Annulus, circle and low-pass filters shared read-only by all stages.
#[derive(Clone, Debug)]
pub struct FilterBank {
    pub annulus: FrequencyFilter,
    pub circle: FrequencyFilter,
    pub lowpass: FrequencyFilter,
}

impl FilterBank {
    /// Builds the filters for the context's image size.
    pub fn new(ctx: &SpectralContext, cfg: &FilterConfig) -> BraggResult<Self> {
        let (w, h) = ctx.dims();
        let blur = FrequencyFilter::gaussian(w, h, cfg.blur_sigma)?;
        let annulus = FrequencyFilter::annulus(ctx, cfg.radius, cfg.thickness)?
            .combine(&blur)?
            .recursive(cfg.annulus_power.max(1));
        let circle = FrequencyFilter::circle(ctx, cfg.radius)?.combine(&blur)?;
        let lowpass = FrequencyFilter::gaussian(w, h, cfg.correlation_sigma)?;
        Ok(Self {
            annulus,
            circle,
            lowpass,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalised_kernels_have_unit_dc_gain() {
        let ctx = SpectralContext::new(32, 32).unwrap();
        let ring = FrequencyFilter::annulus(&ctx, 5.0, 2.0).unwrap();
        let disc = FrequencyFilter::circle(&ctx, 4.0).unwrap();
        assert!((ring.spectrum().data()[0].re - 1.0).abs() < 1e-5);
        assert!((disc.spectrum().data()[0].re - 1.0).abs() < 1e-5);
    }

    #[test]
    fn symmetric_kernels_have_real_spectra() {
        let ctx = SpectralContext::new(16, 16).unwrap();
        let ring = FrequencyFilter::annulus(&ctx, 4.0, 2.0).unwrap();
        assert!(ring.spectrum().data().iter().all(|c| c.im.abs() < 1e-5));
    }

    #[test]
    fn recursive_power_matches_repeated_combine() {
        let ctx = SpectralContext::new(16, 8).unwrap();
        let disc = FrequencyFilter::circle(&ctx, 2.0).unwrap();
        let cubed = disc.recursive(3);
        let manual = disc.combine(&disc).unwrap().combine(&disc).unwrap();
        for (a, b) in cubed.spectrum().data().iter().zip(manual.spectrum().data()) {
            assert!((a - b).norm() < 1e-5);
        }
    }

    #[test]
    fn zero_sigma_gaussian_is_identity() {
        let g = FrequencyFilter::gaussian(8, 8, 0.0).unwrap();
        assert_eq!(g, FrequencyFilter::identity(8, 8).unwrap());
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let ctx = SpectralContext::new(8, 8).unwrap();
        assert!(FrequencyFilter::annulus(&ctx, 0.0, 1.0).is_err());
        assert!(FrequencyFilter::circle(&ctx, -1.0).is_err());
        assert!(FrequencyFilter::gaussian(8, 8, f64::NAN).is_err());
    }
}
