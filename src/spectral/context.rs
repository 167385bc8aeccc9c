//! Cached 2D FFT plans and complex spectra.
//!
//! Transforms use row-column decomposition: 1D FFTs over rows, transpose,
//! 1D FFTs over the former columns, transpose back. The inverse transform is
//! normalised by `1 / (width * height)`.

use crate::image::Image;
use crate::util::{BraggError, BraggResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
pub use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Explicit frequency-domain backend for one image size.
///
/// Create it once per image size and share it by reference; the plans are
/// `Send + Sync`.
pub struct SpectralContext {
    width: usize,
    height: usize,
    row_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    col_forward: Arc<dyn Fft<f32>>,
    col_inverse: Arc<dyn Fft<f32>>,
}

impl SpectralContext {
    /// Plans forward and inverse transforms for `width x height` grids.
    pub fn new(width: usize, height: usize) -> BraggResult<Self> {
        if width == 0 || height == 0 {
            return Err(BraggError::InvalidDimensions { width, height });
        }
        let mut planner = FftPlanner::new();
        Ok(Self {
            width,
            height,
            row_forward: planner.plan_fft_forward(width),
            row_inverse: planner.plan_fft_inverse(width),
            col_forward: planner.plan_fft_forward(height),
            col_inverse: planner.plan_fft_inverse(height),
        })
    }

    /// Returns `(width, height)` of the grids this context transforms.
    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn check_dims(&self, width: usize, height: usize) -> BraggResult<()> {
        if (width, height) != (self.width, self.height) {
            return Err(BraggError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                width,
                height,
            });
        }
        Ok(())
    }

    /// Forward transform of a real image.
    pub fn forward(&self, image: &Image<f32>) -> BraggResult<Spectrum> {
        self.check_dims(image.width(), image.height())?;
        let mut data: Vec<Complex<f32>> =
            image.data().iter().map(|&v| Complex::new(v, 0.0)).collect();
        self.process_2d(&mut data, false);
        Ok(Spectrum {
            data,
            width: self.width,
            height: self.height,
        })
    }

    /// Inverse transform, keeping the real part.
    pub fn inverse_real(&self, spectrum: &Spectrum) -> BraggResult<Image<f32>> {
        self.check_dims(spectrum.width, spectrum.height)?;
        let mut work = spectrum.data.clone();
        self.process_2d(&mut work, true);
        let norm = 1.0 / (self.width * self.height) as f32;
        Image::new(
            work.iter().map(|c| c.re * norm).collect(),
            self.width,
            self.height,
        )
    }

    /// Circular cross-correlation of an image with a symmetric filter.
    pub fn filter_image(&self, image: &Image<f32>, filter: &Spectrum) -> BraggResult<Image<f32>> {
        let mut spectrum = self.forward(image)?;
        spectrum.multiply_assign(filter)?;
        self.inverse_real(&spectrum)
    }

    fn process_2d(&self, data: &mut Vec<Complex<f32>>, inverse: bool) {
        let (row_fft, col_fft) = if inverse {
            (&self.row_inverse, &self.col_inverse)
        } else {
            (&self.row_forward, &self.col_forward)
        };
        let (w, h) = (self.width, self.height);

        run_rows(data, w, row_fft.as_ref());
        let mut transposed = transpose(data, w, h);
        run_rows(&mut transposed, h, col_fft.as_ref());
        *data = transpose(&transposed, h, w);
    }
}

fn run_rows(data: &mut [Complex<f32>], len: usize, fft: &dyn Fft<f32>) {
    #[cfg(feature = "rayon")]
    data.par_chunks_exact_mut(len).for_each(|row| fft.process(row));
    #[cfg(not(feature = "rayon"))]
    data.chunks_exact_mut(len).for_each(|row| fft.process(row));
}

/// Transposes a row-major `width x height` grid into `height x width`.
fn transpose(src: &[Complex<f32>], width: usize, height: usize) -> Vec<Complex<f32>> {
    let mut dst = vec![Complex::new(0.0, 0.0); src.len()];
    for y in 0..height {
        for x in 0..width {
            dst[x * height + y] = src[y * width + x];
        }
    }
    dst
}

/// Owned complex 2D array in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrum {
    data: Vec<Complex<f32>>,
    width: usize,
    height: usize,
}

impl Spectrum {
    /// Wraps a buffer of exactly `width * height` coefficients.
    pub fn from_data(data: Vec<Complex<f32>>, width: usize, height: usize) -> BraggResult<Self> {
        if width == 0 || height == 0 || data.len() != width * height {
            return Err(BraggError::InvalidDimensions { width, height });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Spectrum with every coefficient equal to `value`.
    pub fn filled(width: usize, height: usize, value: Complex<f32>) -> BraggResult<Self> {
        Self::from_data(vec![value; width * height], width, height)
    }

    /// Returns the spectrum width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the spectrum height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the coefficients in row-major order.
    pub fn data(&self) -> &[Complex<f32>] {
        &self.data
    }

    fn check_same(&self, other: &Spectrum) -> BraggResult<()> {
        if (self.width, self.height) != (other.width, other.height) {
            return Err(BraggError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                width: other.width,
                height: other.height,
            });
        }
        Ok(())
    }

    /// Element-wise product.
    pub fn multiply(&self, other: &Spectrum) -> BraggResult<Spectrum> {
        let mut out = self.clone();
        out.multiply_assign(other)?;
        Ok(out)
    }

    /// In-place element-wise product.
    pub fn multiply_assign(&mut self, other: &Spectrum) -> BraggResult<()> {
        self.check_same(other)?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a *= *b;
        }
        Ok(())
    }

    /// Element-wise integer power.
    pub fn powi(&self, n: u32) -> Spectrum {
        let data = self
            .data
            .iter()
            .map(|&c| {
                let mut acc = Complex::new(1.0f32, 0.0);
                for _ in 0..n {
                    acc *= c;
                }
                acc
            })
            .collect();
        Spectrum {
            data,
            width: self.width,
            height: self.height,
        }
    }

    /// Power spectrum `|c|^2` as real coefficients.
    pub fn power(&self) -> Spectrum {
        Spectrum {
            data: self
                .data
                .iter()
                .map(|c| Complex::new(c.norm_sqr(), 0.0))
                .collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// Normalised cross-power spectrum `conj(self) * other / |conj(self) * other|`.
    ///
    /// Coefficients whose product magnitude is at most `eps` times the
    /// largest magnitude are zeroed.
    pub fn cross_power(&self, other: &Spectrum, eps: f32) -> BraggResult<Spectrum> {
        self.check_same(other)?;
        let products: Vec<Complex<f32>> = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| a.conj() * b)
            .collect();
        let max_norm = products.iter().map(|c| c.norm()).fold(0.0f32, f32::max);
        let floor = (max_norm * eps).max(f32::MIN_POSITIVE);
        let data = products
            .into_iter()
            .map(|c| {
                let norm = c.norm();
                if norm > floor {
                    c / norm
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();
        Ok(Spectrum {
            data,
            width: self.width,
            height: self.height,
        })
    }

    /// Mean of the real parts.
    pub fn mean_re(&self) -> f32 {
        let sum: f64 = self.data.iter().map(|c| c.re as f64).sum();
        (sum / self.data.len() as f64) as f32
    }
}
