//! Global reconciliation of pairwise shifts into per-image offsets.
//!
//! Offsets solve the confidence-weighted least-squares problem
//! `min sum w_ab * |p_b - p_a - d_ab|^2` with the reference image pinned at
//! zero. Only images connected to the reference through the pair graph are
//! solved; the rest are reported as disconnected.

use crate::register::phase::RelativePosition;
use crate::util::{BraggError, BraggResult};
use nalgebra::DMatrix;

/// Offset of one image relative to the reference image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
}

impl Offset {
    /// Offset rounded to the nearest integer pixel.
    pub fn rounded(&self) -> (i64, i64) {
        (self.dx.round() as i64, self.dy.round() as i64)
    }
}

/// Per-image offsets relative to the reference image.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionTable {
    offsets: Vec<Option<Offset>>,
    reference: usize,
    residual: f64,
}

impl PositionTable {
    /// Number of images in the stack.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns true for an empty stack.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Index of the reference image.
    pub fn reference(&self) -> usize {
        self.reference
    }

    /// Offset of image `index`, or `DisconnectedStack` if it could not be aligned.
    pub fn get(&self, index: usize) -> BraggResult<Offset> {
        match self.offsets.get(index) {
            Some(Some(offset)) => Ok(*offset),
            Some(None) => Err(BraggError::DisconnectedStack { image: index }),
            None => Err(BraggError::IndexOutOfBounds {
                index,
                len: self.offsets.len(),
                context: "position table",
            }),
        }
    }

    /// Raw per-image offsets; `None` marks a disconnected image.
    pub fn offsets(&self) -> &[Option<Offset>] {
        &self.offsets
    }

    /// Fails with the first disconnected image, if any.
    pub fn require_connected(&self) -> BraggResult<()> {
        match self.offsets.iter().position(Option::is_none) {
            Some(image) => Err(BraggError::DisconnectedStack { image }),
            None => Ok(()),
        }
    }

    /// Weighted sum of squared pair inconsistencies after refinement.
    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Indices of images with an offset.
    pub fn connected(&self) -> impl Iterator<Item = (usize, Offset)> + '_ {
        self.offsets
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.map(|o| (i, o)))
    }
}

/// Marks images reachable from `reference` through the pair graph.
fn reachable(count: usize, reference: usize, pairs: &[RelativePosition]) -> Vec<bool> {
    let mut adjacency = vec![Vec::new(); count];
    for p in pairs {
        adjacency[p.index_a].push(p.index_b);
        adjacency[p.index_b].push(p.index_a);
    }
    let mut seen = vec![false; count];
    let mut stack = vec![reference];
    seen[reference] = true;
    while let Some(node) = stack.pop() {
        for &next in &adjacency[node] {
            if !seen[next] {
                seen[next] = true;
                stack.push(next);
            }
        }
    }
    seen
}

/// Solves for per-image offsets from pairwise relative positions.
///
/// Pairs with non-positive or non-finite confidence are ignored. Images not
/// connected to `reference` get no offset; use [`PositionTable::require_connected`]
/// to turn that into an error.
pub fn refine_positions(
    count: usize,
    reference: usize,
    pairs: &[RelativePosition],
) -> BraggResult<PositionTable> {
    if reference >= count {
        return Err(BraggError::IndexOutOfBounds {
            index: reference,
            len: count,
            context: "reference image",
        });
    }
    let mut usable = Vec::with_capacity(pairs.len());
    for p in pairs {
        if p.index_a >= count || p.index_b >= count {
            return Err(BraggError::IndexOutOfBounds {
                index: p.index_a.max(p.index_b),
                len: count,
                context: "relative position",
            });
        }
        if p.index_a != p.index_b && p.confidence.is_finite() && p.confidence > 0.0 {
            usable.push(*p);
        }
    }

    let seen = reachable(count, reference, &usable);
    // Unknowns: connected images other than the reference.
    let mut slot = vec![None; count];
    let mut unknowns = 0usize;
    for (i, &s) in seen.iter().enumerate() {
        if s && i != reference {
            slot[i] = Some(unknowns);
            unknowns += 1;
        }
    }

    let mut solution = DMatrix::<f64>::zeros(unknowns, 2);
    if unknowns > 0 {
        let mut laplacian = DMatrix::<f64>::zeros(unknowns, unknowns);
        let mut rhs = DMatrix::<f64>::zeros(unknowns, 2);
        for p in usable.iter().filter(|p| seen[p.index_a]) {
            let w = p.confidence as f64;
            let d = [p.dx, p.dy];
            let (sa, sb) = (slot[p.index_a], slot[p.index_b]);
            if let Some(a) = sa {
                laplacian[(a, a)] += w;
                for k in 0..2 {
                    rhs[(a, k)] -= w * d[k];
                }
            }
            if let Some(b) = sb {
                laplacian[(b, b)] += w;
                for k in 0..2 {
                    rhs[(b, k)] += w * d[k];
                }
            }
            if let (Some(a), Some(b)) = (sa, sb) {
                laplacian[(a, b)] -= w;
                laplacian[(b, a)] -= w;
            }
        }
        let chol = laplacian
            .cholesky()
            .ok_or_else(|| BraggError::SolverFailure {
                reason: "position graph Laplacian is not positive definite".to_string(),
            })?;
        solution = chol.solve(&rhs);
    }

    let offsets: Vec<Option<Offset>> = (0..count)
        .map(|i| {
            if i == reference {
                Some(Offset { dx: 0.0, dy: 0.0 })
            } else {
                slot[i].map(|s| Offset {
                    dx: solution[(s, 0)],
                    dy: solution[(s, 1)],
                })
            }
        })
        .collect();

    let residual = usable
        .iter()
        .filter_map(|p| {
            let a = offsets[p.index_a]?;
            let b = offsets[p.index_b]?;
            let rx = b.dx - a.dx - p.dx;
            let ry = b.dy - a.dy - p.dy;
            Some(p.confidence as f64 * (rx * rx + ry * ry))
        })
        .sum();

    Ok(PositionTable {
        offsets,
        reference,
        residual,
    })
}
