//! Shared utility helpers.

pub mod error;
pub(crate) mod math;

pub use error::{BraggError, BraggResult};
pub use math::{pearson_corr, weighted_pearson_corr};
