//! Quadric error metric.

use std::ops::{Add, AddAssign};

use nalgebra::{Point3, Vector3};

/// A quadric error matrix (4x4 symmetric matrix).
///
/// Represents the sum of squared distances to a set of planes.
/// Stored as 10 unique elements since the matrix is symmetric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric {
    /// Upper triangular elements: [a, b, c, d, e, f, g, h, i, j]
    /// Matrix form:
    /// | a b c d |
    /// | b e f g |
    /// | c f h i |
    /// | d g i j |
    data: [f64; 10],
}

impl Quadric {
    /// Create a zero quadric.
    pub fn zero() -> Self {
        Self { data: [0.0; 10] }
    }

    /// Create a quadric from a plane equation ax + by + cz + d = 0.
    /// The plane should be normalized (a² + b² + c² = 1).
    #[rustfmt::skip]
    pub fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self {
            data: [
                a * a, a * b, a * c, a * d,
                       b * b, b * c, b * d,
                              c * c, c * d,
                                     d * d,
            ],
        }
    }

    /// Create the quadric of the plane through `point` with unit `normal`.
    pub fn from_point_normal(normal: &Vector3<f64>, point: &Point3<f64>) -> Self {
        let d = -normal.dot(&point.coords);
        Self::from_plane(normal.x, normal.y, normal.z, d)
    }

    /// Evaluate the quadric error for a point.
    /// Returns v^T * Q * v where v = [x, y, z, 1].
    pub fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let [a, b, c, d, e, f, g, h, i, j] = self.data;
        let (x, y, z) = (p.x, p.y, p.z);

        a * x * x + 2.0 * b * x * y + 2.0 * c * x * z + 2.0 * d * x
            + e * y * y + 2.0 * f * y * z + 2.0 * g * y
            + h * z * z + 2.0 * i * z
            + j
    }
}

impl Default for Quadric {
    fn default() -> Self {
        Self::zero()
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, other: Quadric) {
        for (lhs, rhs) in self.data.iter_mut().zip(other.data) {
            *lhs += rhs;
        }
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(mut self, other: Quadric) -> Quadric {
        self += other;
        self
    }
}
