//! Priming of raw images for phase correlation.
//!
//! `primed = FFT( ifft(FFT(win * grad(img)) * annulus) * ifft(FFT(win * img) * circle) )`
//!
//! The annulus response emphasises ring-shaped disk edges; multiplying by the
//! circle response suppresses the halo the annulus produces around each disk.

use crate::filter::{apply_window, gradient_amplitude};
use crate::image::Image;
use crate::spectral::{FilterBank, SpectralContext, Spectrum};
use crate::util::BraggResult;

/// Frequency-domain representation of one primed image.
#[derive(Clone, Debug)]
pub struct PrimedImage {
    /// Stack index of the source image.
    pub index: usize,
    /// Forward transform of the primed spatial response.
    pub spectrum: Spectrum,
}

/// Spatial response used for priming and for spot detection.
///
/// Both factors are clamped at zero before multiplying.
pub fn ring_disc_response(
    ctx: &SpectralContext,
    bank: &FilterBank,
    image: &Image<f32>,
    window: Option<&Image<f32>>,
    parallel: bool,
) -> BraggResult<Image<f32>> {
    let gradient = gradient_amplitude(image, parallel)?;
    let (gradient, image) = match window {
        Some(win) => (apply_window(&gradient, win)?, apply_window(image, win)?),
        None => (gradient, image.clone()),
    };
    let mut ring = ctx.filter_image(&gradient, bank.annulus.spectrum())?;
    let disc = ctx.filter_image(&image, bank.circle.spectrum())?;
    for (r, d) in ring.data_mut().iter_mut().zip(disc.data()) {
        *r = r.max(0.0) * d.max(0.0);
    }
    Ok(ring)
}

/// Primes one image: ring/disc response followed by a forward transform.
pub fn prime_image(
    ctx: &SpectralContext,
    bank: &FilterBank,
    image: &Image<f32>,
    window: Option<&Image<f32>>,
    index: usize,
) -> BraggResult<PrimedImage> {
    let response = ring_disc_response(ctx, bank, image, window, false)?;
    Ok(PrimedImage {
        index,
        spectrum: ctx.forward(&response)?,
    })
}
