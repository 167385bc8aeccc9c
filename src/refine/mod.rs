//! Sub-pixel refinement of correlation and response peaks.

mod subpixel;

pub use subpixel::{parabolic_offset, refine_peak_wrapped};
