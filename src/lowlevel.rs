//! Low-level building blocks for custom pipelines.
//!
//! These expose the individual stages behind [`crate::Pipeline`]: priming
//! and correlation surfaces, peak refinement, the numeric solver functions,
//! and the lattice helpers. Most users should prefer the top-level types.

pub use crate::ellipse::{CoarseMasked, DistanceWeighted, Refined, RegionExtracted, RoughFit};
pub use crate::filter::{blacken_circle, circular_mask, MaskedRegion};
pub use crate::image::downsample::{downsample_factor, downsample_to, halve};
pub use crate::lattice::{
    cleanup_spots, estimate_spot_radius, extrapolate_spots, fit_lattice, infer_lattice_vectors,
    radius_upper_bound, refine_annulus_params,
};
pub use crate::refine::{parabolic_offset, refine_peak_wrapped};
pub use crate::register::{
    align_and_average, correlation_surface, locate_peak, pair_window, phase_correlate,
    prime_image, refine_positions, ring_disc_response, PrimedImage, SurfacePeak,
};
pub use crate::solver::{
    distance_to_ellipse, fit_conic_hyper, point_ellipse_distance, weighted_kmeans, KMeansResult,
};
pub use crate::spectral::{Complex, FilterBank, FrequencyFilter, Spectrum};
pub use crate::spotmap::{spot_maps, SpotMap};
pub use crate::symmetry::{
    average_intersection, average_origin, mirror_score, periodic_symmetry_axes,
    refine_mirror_lines, symmetry_axes, top_symmetry_axes,
};
pub use crate::util::{pearson_corr, weighted_pearson_corr};
