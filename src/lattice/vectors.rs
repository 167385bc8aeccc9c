//! Lattice-vector inference from spot displacements.

use crate::lattice::Spot;

/// One or two generating vectors of the spot lattice.
#[derive(Clone, Debug, PartialEq)]
pub struct LatticeVectors {
    pub basis: Vec<[f64; 2]>,
}

impl LatticeVectors {
    /// Shortest basis vector length.
    pub fn min_length(&self) -> f64 {
        self.basis
            .iter()
            .map(|v| v[0].hypot(v[1]))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Sign convention that makes `d` and `-d` identical.
fn canonical(d: [f64; 2]) -> [f64; 2] {
    if d[1] < 0.0 || (d[1] == 0.0 && d[0] < 0.0) {
        [-d[0], -d[1]]
    } else {
        d
    }
}

#[derive(Clone, Copy, Debug)]
struct Cluster {
    sum: [f64; 2],
    count: usize,
}

impl Cluster {
    fn mean(&self) -> [f64; 2] {
        [self.sum[0] / self.count as f64, self.sum[1] / self.count as f64]
    }
}

/// Clusters pairwise displacements and picks the shortest independent means.
///
/// Displacements shorter than `min_length` are ignored; a displacement joins
/// the first cluster whose mean is within `tolerance`. Clusters holding fewer
/// than `min_population` displacements are discarded, so a stray spot cannot
/// contribute a vector. The first basis vector is the shortest remaining
/// cluster mean; the second is the shortest mean that is not parallel to it
/// (more than 10 degrees apart). Returns `None` when no cluster survives.
pub fn infer_lattice_vectors(
    spots: &[Spot],
    tolerance: f64,
    min_length: f64,
    min_population: usize,
) -> Option<LatticeVectors> {
    let mut displacements: Vec<[f64; 2]> = Vec::new();
    for (i, a) in spots.iter().enumerate() {
        for b in &spots[i + 1..] {
            let d = canonical([b.x as f64 - a.x as f64, b.y as f64 - a.y as f64]);
            if d[0].hypot(d[1]) >= min_length {
                displacements.push(d);
            }
        }
    }
    displacements.sort_by(|a, b| {
        a[0].hypot(a[1])
            .total_cmp(&b[0].hypot(b[1]))
            .then(a[1].total_cmp(&b[1]))
            .then(a[0].total_cmp(&b[0]))
    });

    let mut clusters: Vec<Cluster> = Vec::new();
    for d in displacements {
        let hit = clusters.iter_mut().find(|c| {
            let m = c.mean();
            (m[0] - d[0]).hypot(m[1] - d[1]) <= tolerance
        });
        match hit {
            Some(c) => {
                c.sum[0] += d[0];
                c.sum[1] += d[1];
                c.count += 1;
            }
            None => clusters.push(Cluster { sum: d, count: 1 }),
        }
    }

    let mut means: Vec<[f64; 2]> = clusters
        .iter()
        .filter(|c| c.count >= min_population.max(1))
        .map(Cluster::mean)
        .collect();
    means.sort_by(|a, b| a[0].hypot(a[1]).total_cmp(&b[0].hypot(b[1])));
    let first = *means.first()?;
    let len1 = first[0].hypot(first[1]);
    let min_sin = 10f64.to_radians().sin();
    let second = means.iter().copied().find(|v| {
        let cross = first[0] * v[1] - first[1] * v[0];
        cross.abs() / (len1 * v[0].hypot(v[1])) > min_sin
    });

    let mut basis = vec![first];
    basis.extend(second);
    Some(LatticeVectors { basis })
}
