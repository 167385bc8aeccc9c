//! Braggdisk locates and characterises diffraction spots ("Bragg disks")
//! across a stack of misaligned electron-diffraction images.
//!
//! The pipeline registers the stack by phase correlation of annulus/circle
//! primed images, averages it into an aligned accumulator, detects the spot
//! lattice on that accumulator, and fits an ellipse to every spot of every
//! image from gradient-amplitude data. Parallelism is available through the
//! `rayon` feature, structured spans through `tracing`, and image decoding
//! through `image-io`.
//!
//! ```no_run
//! use braggdisk::{Image, Pipeline, PipelineConfig};
//!
//! # fn stack() -> Vec<Image<f32>> { Vec::new() }
//! let images = stack();
//! let output = Pipeline::new(PipelineConfig::default()).run(&images)?;
//! for spot in &output.detection.spots {
//!     println!("spot at ({}, {})", spot.x, spot.y);
//! }
//! # Ok::<(), braggdisk::BraggError>(())
//! ```

mod candidate;
pub mod ellipse;
pub mod filter;
pub mod image;
pub mod lattice;
pub mod lowlevel;
pub mod pipeline;
mod refine;
pub mod register;
pub mod solver;
pub mod spectral;
pub mod spotmap;
pub mod symmetry;
mod trace;
pub mod util;

pub use ellipse::{ellipse_points_from_conic, Conic, DistanceBand, Ellipse, EllipseConfig};
pub use filter::{annular_mask, apply_window, extract_masked_region, gradient_amplitude, hann_window};
#[cfg(feature = "image-io")]
pub use image::io;
pub use image::{Image, ImageView, Mask};
pub use lattice::{
    threshold_proportion, AnnulusParams, AnnulusSearch, FittedLattice, LatticeConfig,
    LatticeVectors, OutlierPolicy, RadiusBoundConfig, Spot, SpotConfig, SpotDetector,
    ThresholdCut,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput, RadiusSearch};
pub use register::{
    AlignedAccumulator, Offset, PositionTable, Registrar, RelativePosition, RegistrationConfig,
};
pub use solver::{HyperRenormSolver, NumericSolver};
pub use spectral::{FilterConfig, SpectralContext};
pub use symmetry::{MirrorLine, SymmetryConfig};
pub use util::{BraggError, BraggResult};
