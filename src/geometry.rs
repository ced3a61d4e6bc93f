//! Point/triangle geometry used by the simplification error bounds.

use nalgebra::Point3;

/// Find the closest point on a triangle to a query point.
///
/// Classifies the query against the Voronoi regions of the triangle's
/// vertices, edges and interior. Degenerate triangles fall back to the
/// closest point on their three edges.
///
/// # Example
///
/// ```
/// use whittle::geometry::closest_point_on_triangle;
/// use nalgebra::Point3;
///
/// let a = Point3::new(0.0, 0.0, 0.0);
/// let b = Point3::new(1.0, 0.0, 0.0);
/// let c = Point3::new(0.0, 1.0, 0.0);
///
/// let q = closest_point_on_triangle(Point3::new(0.25, 0.25, 2.0), a, b, c);
/// assert!((q - Point3::new(0.25, 0.25, 0.0)).norm() < 1e-12);
/// ```
#[must_use]
pub fn closest_point_on_triangle(
    point: Point3<f64>,
    v0: Point3<f64>,
    v1: Point3<f64>,
    v2: Point3<f64>,
) -> Point3<f64> {
    let ab = v1 - v0;
    let ac = v2 - v0;
    let ap = point - v0;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);

    // Vertex region outside A
    if d1 <= 0.0 && d2 <= 0.0 {
        return v0;
    }

    let bp = point - v1;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);

    // Vertex region outside B
    if d3 >= 0.0 && d4 <= d3 {
        return v1;
    }

    // Edge region of AB
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return v0 + ab * v;
    }

    let cp = point - v2;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);

    // Vertex region outside C
    if d6 >= 0.0 && d5 <= d6 {
        return v2;
    }

    // Edge region of AC
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return v0 + ac * w;
    }

    // Edge region of BC
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return v1 + (v2 - v1) * w;
    }

    let sum = va + vb + vc;
    if sum.abs() <= f64::EPSILON * ab.norm_squared() * ac.norm_squared() || !sum.is_finite() {
        return closest_point_on_edges(point, v0, v1, v2);
    }

    // Face region
    let denom = 1.0 / sum;
    let v = vb * denom;
    let w = vc * denom;

    v0 + ab * v + ac * w
}

/// Distance from a point to a triangle, together with the closest point.
#[must_use]
pub fn dist_point_triangle(
    point: Point3<f64>,
    v0: Point3<f64>,
    v1: Point3<f64>,
    v2: Point3<f64>,
) -> (f64, Point3<f64>) {
    let closest = closest_point_on_triangle(point, v0, v1, v2);
    ((point - closest).norm(), closest)
}

/// Find the closest point on segment `ab` to a query point.
#[must_use]
pub fn closest_point_on_segment(point: Point3<f64>, a: Point3<f64>, b: Point3<f64>) -> Point3<f64> {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq <= f64::MIN_POSITIVE {
        return a;
    }
    let t = ((point - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

fn closest_point_on_edges(
    point: Point3<f64>,
    v0: Point3<f64>,
    v1: Point3<f64>,
    v2: Point3<f64>,
) -> Point3<f64> {
    [(v0, v1), (v1, v2), (v2, v0)]
        .into_iter()
        .map(|(a, b)| closest_point_on_segment(point, a, b))
        .min_by(|p, q| {
            (point - p)
                .norm_squared()
                .total_cmp(&(point - q).norm_squared())
        })
        .unwrap_or(v0)
}

/// Shape quality of a triangle: longest squared edge over twice the area.
///
/// An equilateral triangle scores `2 / sqrt(3)` (about 1.155); slivers and
/// needles score higher. Degenerate triangles score `f64::INFINITY`.
#[must_use]
pub fn triangle_aspect_ratio(p0: Point3<f64>, p1: Point3<f64>, p2: Point3<f64>) -> f64 {
    let d0 = p0 - p1;
    let d1 = p1 - p2;
    let d2 = p2 - p0;

    let longest = d0
        .norm_squared()
        .max(d1.norm_squared())
        .max(d2.norm_squared());

    let twice_area = d0.cross(&d1).norm();
    if twice_area <= f64::MIN_POSITIVE {
        return f64::INFINITY;
    }

    longest / twice_area
}
