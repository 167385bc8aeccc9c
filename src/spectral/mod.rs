//! Frequency-domain execution context, spectra, and reusable filters.
//!
//! A [`SpectralContext`] owns the cached FFT plans for one image size and is
//! passed by reference to every stage that transforms images. Filters are
//! built once per run and shared read-only afterwards.

mod context;
mod filters;

pub use context::{Complex, SpectralContext, Spectrum};
pub use filters::{FilterBank, FilterConfig, FrequencyFilter};
