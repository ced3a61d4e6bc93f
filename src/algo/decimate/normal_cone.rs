//! Bounding cones of face normals.

use std::f64::consts::PI;

use nalgebra::Vector3;

/// A cone of directions given by a unit axis and a half-angle (radians).
///
/// Merging only ever widens the cone, so it keeps bounding every normal
/// that was merged into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalCone {
    center: Vector3<f64>,
    angle: f64,
}

impl NormalCone {
    /// Create a cone from an axis and a half-angle.
    pub fn new(center: Vector3<f64>, angle: f64) -> Self {
        Self { center, angle }
    }

    /// Create a degenerate cone containing exactly one direction.
    pub fn from_normal(normal: Vector3<f64>) -> Self {
        Self::new(normal, 0.0)
    }

    /// The cone axis.
    pub fn center(&self) -> &Vector3<f64> {
        &self.center
    }

    /// The half-angle in radians.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Widen the cone to contain `normal`.
    pub fn merge_normal(&mut self, normal: &Vector3<f64>) {
        self.merge(&Self::from_normal(*normal));
    }

    /// Widen the cone to contain `other`.
    pub fn merge(&mut self, other: &NormalCone) {
        let dp = self.center.dot(&other.center);

        if dp > 0.99999 {
            // Axes coincide
            self.angle = self.angle.max(other.angle);
        } else if dp < -0.99999 {
            // Axes opposite, the cone covers the whole sphere
            self.angle = 2.0 * PI;
        } else {
            // Angular interval of both cones in the plane of the two axes,
            // measured from this cone's axis.
            let center_angle = dp.acos();
            let min_angle = (-self.angle).min(center_angle - other.angle);
            let max_angle = self.angle.max(center_angle + other.angle);
            self.angle = 0.5 * (max_angle - min_angle);

            // Rotate the axis towards the other one
            let axis_angle = 0.5 * (min_angle + max_angle);
            self.center = (self.center * (center_angle - axis_angle).sin()
                + other.center * axis_angle.sin())
                / center_angle.sin();
        }
    }
}

impl Default for NormalCone {
    fn default() -> Self {
        Self::new(Vector3::z(), 0.0)
    }
}
