//! Per-spot ellipse estimation and conic geometry.

mod conic;
mod estimate;

pub use conic::{ellipse_points_from_conic, Conic, Ellipse};
pub use estimate::{
    CoarseMasked, DistanceBand, DistanceWeighted, EllipseConfig, EllipseEstimator,
    ImageEllipses, Refined, RegionExtracted, RoughFit,
};
