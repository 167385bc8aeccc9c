//! Point-to-ellipse distance by robust bisection (Eberly).

use crate::ellipse::Ellipse;
use crate::util::{BraggError, BraggResult};

fn robust_length(a: f64, b: f64) -> f64 {
    a.hypot(b)
}

/// Root of `(r0 z0 / (s + r0))^2 + (z1 / (s + 1))^2 - 1` by bisection.
fn get_root(r0: f64, z0: f64, z1: f64, g: f64, accuracy: f64, max_iterations: usize) -> f64 {
    let n0 = r0 * z0;
    let mut s0 = z1 - 1.0;
    let mut s1 = if g < 0.0 {
        0.0
    } else {
        robust_length(n0, z1) - 1.0
    };
    let mut s = 0.0;
    for _ in 0..max_iterations {
        s = 0.5 * (s0 + s1);
        if s == s0 || s == s1 || (s1 - s0) < accuracy {
            break;
        }
        let ratio0 = n0 / (s + r0);
        let ratio1 = z1 / (s + 1.0);
        let g = ratio0 * ratio0 + ratio1 * ratio1 - 1.0;
        if g > 0.0 {
            s0 = s;
        } else if g < 0.0 {
            s1 = s;
        } else {
            break;
        }
    }
    s
}

/// Distance from `(y0, y1)` in the first quadrant to the axis-aligned ellipse
/// with semi-axes `e0 >= e1 > 0`.
pub fn point_ellipse_distance(
    e0: f64,
    e1: f64,
    y0: f64,
    y1: f64,
    accuracy: f64,
    max_iterations: usize,
) -> f64 {
    if y1 > 0.0 {
        if y0 > 0.0 {
            let z0 = y0 / e0;
            let z1 = y1 / e1;
            let g = z0 * z0 + z1 * z1 - 1.0;
            if g != 0.0 {
                let r0 = (e0 / e1) * (e0 / e1);
                let sbar = get_root(r0, z0, z1, g, accuracy, max_iterations);
                let x0 = r0 * y0 / (sbar + r0);
                let x1 = y1 / (sbar + 1.0);
                (x0 - y0).hypot(x1 - y1)
            } else {
                0.0
            }
        } else {
            (y1 - e1).abs()
        }
    } else {
        let numer0 = e0 * y0;
        let denom0 = e0 * e0 - e1 * e1;
        if numer0 < denom0 {
            let xde0 = numer0 / denom0;
            let x0 = e0 * xde0;
            let x1 = e1 * (1.0 - xde0 * xde0).max(0.0).sqrt();
            (x0 - y0).hypot(x1)
        } else {
            (y0 - e0).abs()
        }
    }
}

/// Distances from image points to a rotated ellipse.
///
/// `accuracy` bounds the width of the final bisection interval.
pub fn distance_to_ellipse(
    points: &[[f64; 2]],
    ellipse: &Ellipse,
    accuracy: f64,
    max_iterations: usize,
) -> BraggResult<Vec<f64>> {
    if !ellipse.is_ellipse || !(ellipse.b > 0.0) || !ellipse.a.is_finite() {
        return Err(BraggError::InvalidInput {
            reason: "distance requires a valid ellipse",
        });
    }
    if !(accuracy > 0.0) {
        return Err(BraggError::InvalidInput {
            reason: "distance accuracy must be positive",
        });
    }
    let (s, c) = ellipse.angle.sin_cos();
    Ok(points
        .iter()
        .map(|p| {
            let dx = p[0] - ellipse.center[0];
            let dy = p[1] - ellipse.center[1];
            let u = (dx * c + dy * s).abs();
            let v = (-dx * s + dy * c).abs();
            point_ellipse_distance(ellipse.a, ellipse.b, u, v, accuracy, max_iterations)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{distance_to_ellipse, point_ellipse_distance};
    use crate::ellipse::Ellipse;

    #[test]
    fn circle_distance_is_radial() {
        let d = point_ellipse_distance(5.0, 5.0, 3.0, 4.0 * 2.0, 1e-12, 200);
        let r = 3.0f64.hypot(8.0);
        assert!((d - (r - 5.0)).abs() < 1e-6);
    }

    #[test]
    fn axis_points_and_center() {
        assert!((point_ellipse_distance(4.0, 2.0, 7.0, 0.0, 1e-12, 200) - 3.0).abs() < 1e-12);
        assert!((point_ellipse_distance(4.0, 2.0, 0.0, 0.5, 1e-12, 200) - 1.5).abs() < 1e-12);
        assert!((point_ellipse_distance(4.0, 2.0, 0.0, 0.0, 1e-12, 200) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn boundary_points_are_at_zero_distance() {
        let el = Ellipse::from_geometry([3.0, -2.0], 6.0, 2.5, 0.7);
        let pts: Vec<[f64; 2]> = (0..16).map(|i| el.point_at(i as f64 * 0.39)).collect();
        for d in distance_to_ellipse(&pts, &el, 1e-12, 200).unwrap() {
            assert!(d < 1e-6, "{d}");
        }
    }
}
