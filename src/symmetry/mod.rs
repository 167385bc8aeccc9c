//! Mirror-symmetry search and origin estimation on the accumulator.
//!
//! Candidate mirror axes are scored on a downsampled copy, scored by the
//! Pearson correlation between the image and its reflection, and refined at
//! full resolution. Two origin estimators are exposed separately.

mod axes;
mod origin;

pub use axes::{
    mirror_score, periodic_symmetry_axes, refine_mirror_lines, symmetry_axes, top_symmetry_axes,
    MirrorLine,
};
pub use origin::{average_intersection, average_origin};

/// Settings for the symmetry search.
#[derive(Clone, Debug, PartialEq)]
pub struct SymmetryConfig {
    /// Downsample until the smaller side is near this size.
    pub target_size: usize,
    /// Axis angles tried over `[0, pi)`.
    pub angle_steps: usize,
    /// Largest axis offset from the image center, as a fraction of the smaller side.
    pub max_offset_fraction: f64,
    /// Offset step on the downsampled image, in pixels.
    pub offset_step: f64,
    /// Axes kept by [`top_symmetry_axes`].
    pub top: usize,
    /// Minimum angular separation between kept axes, in radians.
    pub min_separation: f64,
    /// Candidate mirror counts for [`periodic_symmetry_axes`]; when empty the
    /// axes come from [`top_symmetry_axes`] instead.
    pub periodic_folds: Vec<usize>,
    /// Half-span of the full-resolution angle search, in radians.
    pub refine_angle_span: f64,
    /// Half-span of the full-resolution offset search, in pixels.
    pub refine_offset_span: f64,
    /// Samples per side in each refinement grid.
    pub refine_steps: usize,
    /// Reflections overlapping less than this fraction of the image are not scored.
    pub min_overlap: f64,
    pub parallel: bool,
}

impl Default for SymmetryConfig {
    fn default() -> Self {
        Self {
            target_size: 64,
            angle_steps: 180,
            max_offset_fraction: 0.25,
            offset_step: 1.0,
            top: 4,
            min_separation: 10f64.to_radians(),
            periodic_folds: Vec::new(),
            refine_angle_span: 1f64.to_radians(),
            refine_offset_span: 2.0,
            refine_steps: 4,
            min_overlap: 0.25,
            parallel: false,
        }
    }
}
