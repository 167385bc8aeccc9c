//! Pixel-domain primitives: gradient amplitude, masks, and windowing.

mod gradient;
mod mask;
mod window;

pub use gradient::gradient_amplitude;
pub use mask::{
    annular_mask, blacken_circle, circular_mask, extract_masked_region, MaskedRegion,
};
pub use window::{apply_window, hann_window};
