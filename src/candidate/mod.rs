//! Candidate peak collection and pruning.
//!
//! Includes local-maximum scanning and greedy Euclidean non-maximum
//! suppression with deterministic ordering.

pub(crate) mod maxima;
pub(crate) mod nms;
pub(crate) mod peak;

pub(crate) use maxima::local_maxima;
pub(crate) use nms::nms_euclidean;
