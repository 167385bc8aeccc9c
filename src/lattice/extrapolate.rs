//! Lattice extrapolation to recover spots missed by the candidate search.
//!
//! The search grows outward from the seeds. Each pass only expands the spots
//! added by the previous one, stepping by small integer combinations of the
//! lattice vectors, so every spot is expanded once and the work scales with
//! the number of lattice sites inside the image.

use std::collections::HashMap;

use crate::filter::blacken_circle;
use crate::image::Image;
use crate::lattice::cleanup::fit_lattice;
use crate::lattice::vectors::LatticeVectors;
use crate::lattice::{LatticeConfig, Spot};
use crate::trace::trace_event;

/// Largest absolute coefficient of a single step; two lets the search
/// bridge one missing site.
const STEP_REACH: i64 = 2;

/// Spatial hash of accepted spot positions for radius queries.
struct Occupancy {
    cell: f64,
    cells: HashMap<(i64, i64), Vec<[f64; 2]>>,
}

impl Occupancy {
    fn new(radius: f64) -> Self {
        Self {
            cell: radius.max(1.0),
            cells: HashMap::new(),
        }
    }

    fn key(&self, x: f64, y: f64) -> (i64, i64) {
        ((x / self.cell).floor() as i64, (y / self.cell).floor() as i64)
    }

    fn insert(&mut self, x: f64, y: f64) {
        let key = self.key(x, y);
        self.cells.entry(key).or_default().push([x, y]);
    }

    /// Returns true if a stored position lies within `radius` of `(x, y)`.
    fn near(&self, x: f64, y: f64, radius: f64) -> bool {
        let (kx, ky) = self.key(x, y);
        let reach = (radius / self.cell).ceil() as i64;
        let r2 = radius * radius;
        for cy in ky - reach..=ky + reach {
            for cx in kx - reach..=kx + reach {
                let Some(points) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                if points.iter().any(|p| {
                    let dx = p[0] - x;
                    let dy = p[1] - y;
                    dx * dx + dy * dy <= r2
                }) {
                    return true;
                }
            }
        }
        false
    }
}

/// Brightest pixel within `snap` of `(x, y)`, clipped to the image.
fn snap_to_max(response: &Image<f32>, x: usize, y: usize, snap: usize) -> (usize, usize, f32) {
    let (w, h) = response.dims();
    let mut best = (x, y, response.data()[y * w + x]);
    for yy in y.saturating_sub(snap)..=(y + snap).min(h - 1) {
        for xx in x.saturating_sub(snap)..=(x + snap).min(w - 1) {
            let v = response.data()[yy * w + xx];
            if v > best.2 {
                best = (xx, yy, v);
            }
        }
    }
    best
}

/// Displacements of every non-zero coefficient vector within [`STEP_REACH`].
fn steps(vectors: &LatticeVectors) -> Vec<[f64; 2]> {
    let mut out = Vec::new();
    match vectors.basis.as_slice() {
        [] => {}
        [v] => {
            for i in -STEP_REACH..=STEP_REACH {
                if i != 0 {
                    out.push([i as f64 * v[0], i as f64 * v[1]]);
                }
            }
        }
        [v1, v2, ..] => {
            for j in -STEP_REACH..=STEP_REACH {
                for i in -STEP_REACH..=STEP_REACH {
                    if i != 0 || j != 0 {
                        out.push([
                            i as f64 * v1[0] + j as f64 * v2[0],
                            i as f64 * v1[1] + j as f64 * v2[1],
                        ]);
                    }
                }
            }
        }
    }
    out.sort_by(|a, b| a[0].hypot(a[1]).total_cmp(&b[0].hypot(b[1])));
    out
}

/// Adds spots at lattice positions reachable from the known spots.
///
/// A predicted position is accepted when the response maximum within
/// `cfg.snap_radius` exceeds `threshold` and no spot lies within `radius` of
/// it. Known spots are blanked in a working copy of the response so a snap
/// cannot climb onto them. Passes continue until the frontier is empty or
/// `cfg.max_iterations` is reached; with `cfg.reinfer` the vectors are refitted
/// by least squares over the grown lattice between passes.
/// Returns the grown spot list and the vectors in use at the end.
pub fn extrapolate_spots(
    response: &Image<f32>,
    seeds: &[Spot],
    vectors: &LatticeVectors,
    threshold: f32,
    radius: f64,
    cfg: &LatticeConfig,
) -> (Vec<Spot>, LatticeVectors) {
    let (w, h) = response.dims();
    let mut spots = seeds.to_vec();
    let mut vectors = vectors.clone();
    if vectors.basis.is_empty() || w == 0 || h == 0 {
        return (spots, vectors);
    }
    let mut work = response.clone();
    let mut occupied = Occupancy::new(radius);
    for s in &spots {
        blacken_circle(&mut work, s.x as f64, s.y as f64, radius);
        occupied.insert(s.x as f64, s.y as f64);
    }

    let mut frontier: Vec<usize> = (0..spots.len()).collect();
    let mut offsets = steps(&vectors);
    for _ in 0..cfg.max_iterations {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for &from in &frontier {
            let origin = spots[from].center();
            for step in &offsets {
                let (px, py) = (origin[0] + step[0], origin[1] + step[1]);
                let (rx, ry) = (px.round(), py.round());
                if rx < 0.0 || ry < 0.0 || rx >= w as f64 || ry >= h as f64 {
                    continue;
                }
                if occupied.near(px, py, radius) {
                    continue;
                }
                let (sx, sy, score) = snap_to_max(&work, rx as usize, ry as usize, cfg.snap_radius);
                if !(score > threshold) || occupied.near(sx as f64, sy as f64, radius) {
                    continue;
                }
                blacken_circle(&mut work, sx as f64, sy as f64, radius);
                occupied.insert(sx as f64, sy as f64);
                next.push(spots.len());
                spots.push(Spot { x: sx, y: sy, score });
            }
        }
        trace_event!("extrapolation_pass", added = next.len(), spots = spots.len());
        if cfg.reinfer && !next.is_empty() {
            if let Some(fitted) = fit_lattice(&spots, &vectors, cfg.tolerance) {
                if fitted.basis.len() == vectors.basis.len() {
                    vectors = LatticeVectors {
                        basis: fitted.basis,
                    };
                    offsets = steps(&vectors);
                }
            }
        }
        frontier = next;
    }
    (spots, vectors)
}

#[cfg(test)]
mod tests {
    use super::{steps, Occupancy};
    use crate::lattice::LatticeVectors;

    #[test]
    fn occupancy_answers_radius_queries_across_cells() {
        let mut grid = Occupancy::new(4.0);
        grid.insert(7.9, 7.9);
        assert!(grid.near(8.1, 8.1, 4.0));
        assert!(grid.near(11.0, 7.9, 4.0));
        assert!(!grid.near(12.0, 12.0, 4.0));
        assert!(!grid.near(-10.0, 0.0, 4.0));
    }

    #[test]
    fn steps_cover_the_reach_in_both_directions() {
        let one = steps(&LatticeVectors {
            basis: vec![[3.0, 0.0]],
        });
        assert_eq!(one.len(), 4);
        assert_eq!(one[0][0].abs(), 3.0);
        let two = steps(&LatticeVectors {
            basis: vec![[3.0, 0.0], [0.0, 5.0]],
        });
        assert_eq!(two.len(), 24);
        assert!(two.contains(&[-6.0, 10.0]));
    }
}
