//! Conic coefficients and their decomposition into ellipse geometry.

use std::f64::consts::{FRAC_PI_2, PI};

/// General conic `A x^2 + B xy + C y^2 + D x + E y + F = 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Conic(pub [f64; 6]);

impl Conic {
    /// Builds a conic from its six coefficients.
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self([a, b, c, d, e, f])
    }

    /// Returns the coefficients `[A, B, C, D, E, F]`.
    pub fn coeffs(&self) -> [f64; 6] {
        self.0
    }

    /// Ellipse discriminant `B^2 - 4AC`; negative for ellipses.
    pub fn discriminant(&self) -> f64 {
        let [a, b, c, ..] = self.0;
        b * b - 4.0 * a * c
    }

    /// Algebraic value at `(x, y)`.
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let [a, b, c, d, e, f] = self.0;
        a * x * x + b * x * y + c * y * y + d * x + e * y + f
    }

    /// Same curve expressed in a frame where the old origin sits at `(tx, ty)`.
    pub fn translated(&self, tx: f64, ty: f64) -> Conic {
        let [a, b, c, d, e, f] = self.0;
        Conic([
            a,
            b,
            c,
            d - 2.0 * a * tx - b * ty,
            e - b * tx - 2.0 * c * ty,
            f + a * tx * tx + b * tx * ty + c * ty * ty - d * tx - e * ty,
        ])
    }

    /// Coefficients scaled to unit Euclidean norm.
    pub fn normalized(&self) -> Conic {
        let norm = self.0.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            Conic(self.0.map(|v| v / norm))
        } else {
            *self
        }
    }
}

/// Ellipse geometry derived from a conic.
///
/// When `is_ellipse` is false the conic was not an ellipse and the remaining
/// fields are NaN.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipse {
    pub is_ellipse: bool,
    pub center: [f64; 2],
    /// Semi-major axis.
    pub a: f64,
    /// Semi-minor axis.
    pub b: f64,
    /// Direction of the major axis in `[0, pi)`.
    pub angle: f64,
    /// `[top, right, bottom, left]` in the ellipse's own frame.
    pub extrema: [[f64; 2]; 4],
}

impl Ellipse {
    /// Builds a valid ellipse from its geometry; axes are reordered so `a >= b`.
    pub fn from_geometry(center: [f64; 2], a: f64, b: f64, angle: f64) -> Self {
        let (a, b, angle) = if a >= b {
            (a, b, angle)
        } else {
            (b, a, angle + FRAC_PI_2)
        };
        let angle = angle.rem_euclid(PI);
        let angle = if angle >= PI { 0.0 } else { angle };
        let (s, c) = angle.sin_cos();
        let u = [c, s];
        let n = [-s, c];
        let extrema = [
            [center[0] - b * n[0], center[1] - b * n[1]],
            [center[0] + a * u[0], center[1] + a * u[1]],
            [center[0] + b * n[0], center[1] + b * n[1]],
            [center[0] - a * u[0], center[1] - a * u[1]],
        ];
        Self {
            is_ellipse: true,
            center,
            a,
            b,
            angle,
            extrema,
        }
    }

    /// Marker for a conic that is not an ellipse.
    pub fn not_an_ellipse() -> Self {
        Self {
            is_ellipse: false,
            center: [f64::NAN; 2],
            a: f64::NAN,
            b: f64::NAN,
            angle: f64::NAN,
            extrema: [[f64::NAN; 2]; 4],
        }
    }

    /// Implicit form scaled so that the value is zero on the curve and `-1` at the center.
    pub fn to_conic(&self) -> Conic {
        let (s, c) = self.angle.sin_cos();
        let ia = 1.0 / (self.a * self.a);
        let ib = 1.0 / (self.b * self.b);
        let qa = c * c * ia + s * s * ib;
        let qb = 2.0 * c * s * (ia - ib);
        let qc = s * s * ia + c * c * ib;
        Conic::new(qa, qb, qc, 0.0, 0.0, -1.0).translated(self.center[0], self.center[1])
    }

    /// Point at parameter `t` along the boundary.
    pub fn point_at(&self, t: f64) -> [f64; 2] {
        let (s, c) = self.angle.sin_cos();
        let (x, y) = (self.a * t.cos(), self.b * t.sin());
        [
            self.center[0] + x * c - y * s,
            self.center[1] + x * s + y * c,
        ]
    }

    /// Returns true if `p` lies strictly inside the boundary.
    pub fn contains(&self, p: [f64; 2]) -> bool {
        if !self.is_ellipse {
            return false;
        }
        let (s, c) = self.angle.sin_cos();
        let dx = p[0] - self.center[0];
        let dy = p[1] - self.center[1];
        let u = (dx * c + dy * s) / self.a;
        let v = (-dx * s + dy * c) / self.b;
        u * u + v * v < 1.0
    }
}

/// Decomposes a conic into center, semi-axes, rotation and extremal points.
///
/// A non-negative discriminant, or a rotated quadratic form without real
/// points, yields `is_ellipse == false`. This is an expected outcome and not
/// an error.
pub fn ellipse_points_from_conic(conic: &Conic) -> Ellipse {
    let [a, b, c, d, e, f] = conic.0;
    if conic.0.iter().any(|v| !v.is_finite()) || !(conic.discriminant() < 0.0) {
        return Ellipse::not_an_ellipse();
    }

    let mut two_theta = if b == 0.0 { 0.0 } else { (b / (a - c)).atan() };
    if two_theta < 0.0 {
        two_theta += PI;
    }
    let theta = two_theta / 2.0;
    let (s, co) = theta.sin_cos();

    let ar = a * co * co + b * co * s + c * s * s;
    let cr = a * s * s - b * co * s + c * co * co;
    let dr = d * co + e * s;
    let er = -d * s + e * co;

    let x0 = -dr / (2.0 * ar);
    let y0 = -er / (2.0 * cr);
    let numer = cr * dr * dr + ar * er * er - 4.0 * f * ar * cr;
    let k = numer / (4.0 * ar * cr);
    let (kx, ky) = (k / ar, k / cr);
    if !(kx > 0.0 && ky > 0.0) || !x0.is_finite() || !y0.is_finite() {
        return Ellipse::not_an_ellipse();
    }

    let center = [x0 * co - y0 * s, x0 * s + y0 * co];
    Ellipse::from_geometry(center, kx.sqrt(), ky.sqrt(), theta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{a} vs {b}");
    }

    #[test]
    fn axis_aligned_ellipse_decomposes() {
        // (x - 3)^2 / 16 + (y + 1)^2 / 4 = 1
        let conic = Conic::new(1.0 / 16.0, 0.0, 0.25, -6.0 / 16.0, 0.5, 9.0 / 16.0 + 0.25 - 1.0);
        let el = ellipse_points_from_conic(&conic);
        assert!(el.is_ellipse);
        assert_close(el.center[0], 3.0, 1e-9);
        assert_close(el.center[1], -1.0, 1e-9);
        assert_close(el.a, 4.0, 1e-9);
        assert_close(el.b, 2.0, 1e-9);
        assert_close(el.angle, 0.0, 1e-9);
        assert_close(el.extrema[1][0], 7.0, 1e-9);
        assert_close(el.extrema[0][1], -3.0, 1e-9);
    }

    #[test]
    fn rotated_ellipse_round_trips_through_conic() {
        for &angle in &[0.3, 1.2, 2.0, 2.9] {
            let truth = Ellipse::from_geometry([10.0, -4.0], 7.0, 3.0, angle);
            let el = ellipse_points_from_conic(&truth.to_conic().normalized());
            assert!(el.is_ellipse);
            assert_close(el.center[0], 10.0, 1e-8);
            assert_close(el.center[1], -4.0, 1e-8);
            assert_close(el.a, 7.0, 1e-8);
            assert_close(el.b, 3.0, 1e-8);
            assert_close(el.angle, angle, 1e-8);
        }
    }

    #[test]
    fn contains_follows_the_rotated_boundary() {
        let el = Ellipse::from_geometry([4.0, 4.0], 6.0, 2.0, FRAC_PI_2);
        assert!(el.contains([4.0, 9.0]));
        assert!(!el.contains([9.0, 4.0]));
        assert!(!Ellipse::not_an_ellipse().contains([4.0, 4.0]));
    }

    #[test]
    fn circle_with_equal_diagonal_terms() {
        let truth = Ellipse::from_geometry([1.0, 2.0], 5.0, 5.0, 0.0);
        let el = ellipse_points_from_conic(&truth.to_conic());
        assert!(el.is_ellipse);
        assert_close(el.a, 5.0, 1e-9);
        assert_close(el.b, 5.0, 1e-9);
    }

    #[test]
    fn hyperbola_and_imaginary_ellipse_are_flagged() {
        let hyperbola = Conic::new(1.0, 0.0, -1.0, 0.0, 0.0, -1.0);
        assert!(!ellipse_points_from_conic(&hyperbola).is_ellipse);
        let parabola = Conic::new(1.0, 0.0, 0.0, 0.0, -1.0, 0.0);
        assert!(!ellipse_points_from_conic(&parabola).is_ellipse);
        let imaginary = Conic::new(1.0, 0.0, 1.0, 0.0, 0.0, 1.0);
        assert!(!ellipse_points_from_conic(&imaginary).is_ellipse);
    }

    #[test]
    fn translation_moves_the_center() {
        let base = Ellipse::from_geometry([0.0, 0.0], 4.0, 2.0, 0.5).to_conic();
        let moved = ellipse_points_from_conic(&base.translated(5.0, -3.0));
        assert_close(moved.center[0], 5.0, 1e-9);
        assert_close(moved.center[1], -3.0, 1e-9);
    }
}
