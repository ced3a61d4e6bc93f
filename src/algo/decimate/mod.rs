//! Surface simplification by greedy halfedge collapses.
//!
//! Every vertex is scheduled with its cheapest legal outgoing collapse. The
//! cheapest vertex is collapsed into its target, the one-ring around the
//! survivor is re-scored, and the loop repeats until the requested vertex
//! count is reached or no legal collapse is left.
//!
//! Collapse cost is the quadric error metric (Garland & Heckbert, 1997).
//! On top of the topological link condition, candidates can be restricted by:
//!
//! - **Aspect ratio**: no triangle may end up worse than the bound, unless it
//!   already was.
//! - **Edge length**: no edge at the survivor may grow beyond the bound.
//! - **Valence**: the survivor may not exceed the bound.
//! - **Normal deviation**: per-face normal cones bound how far the normals of
//!   the surface a face stands for may deviate from it.
//! - **Hausdorff error**: removed vertices are kept as samples on the nearest
//!   face and must stay within the bound.
//!
//! Vertex selections (`"v:selected"`) and feature markers (`"v:feature"`,
//! `"e:feature"`) on the mesh are respected when present.
//!
//! # Example
//!
//! ```no_run
//! use whittle::prelude::*;
//! use whittle::algo::decimate::{simplify, SimplifyOptions};
//!
//! let mut mesh: HalfEdgeMesh = whittle::io::load("input.obj").unwrap();
//!
//! // Keep 10% of the vertices with at most 10 degrees of normal deviation
//! let target = SimplifyOptions::target_from_ratio(mesh.num_vertices(), 0.1).unwrap();
//! let options = SimplifyOptions::default()
//!     .with_aspect_ratio(10.0)
//!     .with_normal_deviation(10.0);
//! let stats = simplify(&mut mesh, target, &options).unwrap();
//! println!("{stats}");
//!
//! whittle::io::save(&mesh, "output.obj").unwrap();
//! ```
//!
//! # References
//!
//! - Garland, M. & Heckbert, P. (1997). "Surface Simplification Using Quadric
//!   Error Metrics." SIGGRAPH '97.
//! - Kobbelt, L., Campagna, S. & Seidel, H.-P. (1998). "A General Framework
//!   for Mesh Decimation." Graphics Interface '98.

mod collapse;
mod decimater;
mod heap;
mod normal_cone;
mod quadric;

use std::fmt;

pub use collapse::CollapseData;
pub use decimater::Decimater;
pub use normal_cone::NormalCone;
pub use quadric::Quadric;

use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeMesh, MeshIndex};

/// Name of the vertex `bool` property restricting collapses to selected vertices.
pub const SELECTED: &str = "v:selected";

/// Name of the vertex `bool` property marking feature vertices.
pub const VERTEX_FEATURE: &str = "v:feature";

/// Name of the edge `bool` property marking feature edges.
pub const EDGE_FEATURE: &str = "e:feature";

/// Bounds for surface simplification.
///
/// A zero value disables the corresponding test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimplifyOptions {
    /// Maximum triangle aspect ratio (longest squared edge over twice the area).
    pub aspect_ratio: f64,

    /// Maximum edge length at the surviving vertex.
    pub edge_length: f64,

    /// Maximum vertex valence.
    pub max_valence: usize,

    /// Maximum normal deviation in degrees.
    pub normal_deviation: f64,

    /// Maximum distance of removed vertices to the simplified surface.
    pub hausdorff_error: f64,
}

impl SimplifyOptions {
    /// Set the aspect ratio bound.
    pub fn with_aspect_ratio(mut self, aspect_ratio: f64) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    /// Set the edge length bound.
    pub fn with_edge_length(mut self, edge_length: f64) -> Self {
        self.edge_length = edge_length;
        self
    }

    /// Set the valence bound.
    pub fn with_max_valence(mut self, max_valence: usize) -> Self {
        self.max_valence = max_valence;
        self
    }

    /// Set the normal deviation bound in degrees.
    pub fn with_normal_deviation(mut self, degrees: f64) -> Self {
        self.normal_deviation = degrees;
        self
    }

    /// Set the Hausdorff error bound.
    pub fn with_hausdorff_error(mut self, hausdorff_error: f64) -> Self {
        self.hausdorff_error = hausdorff_error;
        self
    }

    /// Check that every bound is finite and not negative.
    pub fn validate(&self) -> Result<()> {
        let bounds = [
            ("aspect_ratio", self.aspect_ratio),
            ("edge_length", self.edge_length),
            ("normal_deviation", self.normal_deviation),
            ("hausdorff_error", self.hausdorff_error),
        ];

        for (name, value) in bounds {
            if !value.is_finite() || value < 0.0 {
                return Err(MeshError::invalid_param(
                    name,
                    value,
                    "must be finite and non-negative",
                ));
            }
        }

        Ok(())
    }

    /// Vertex count to keep when reducing `num_vertices` by `ratio`.
    pub fn target_from_ratio(num_vertices: usize, ratio: f64) -> Result<usize> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(MeshError::invalid_param("ratio", ratio, "must be in [0, 1]"));
        }
        Ok(((num_vertices as f64) * ratio).round() as usize)
    }
}

/// Outcome of a [`Decimater::simplify`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimplifyStats {
    /// Live vertices before simplification.
    pub initial_vertices: usize,
    /// Live vertices afterwards.
    pub final_vertices: usize,
    /// Collapses performed.
    pub collapses: usize,
    /// Popped vertices whose scheduled collapse was no longer possible.
    pub stale_candidates: usize,
    /// Whether the loop ran out of candidates before reaching the target.
    pub queue_exhausted: bool,
}

impl fmt::Display for SimplifyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} vertices, {} collapses, {} stale",
            self.initial_vertices, self.final_vertices, self.collapses, self.stale_candidates
        )?;
        if self.queue_exhausted {
            write!(f, " (no legal collapse left)")?;
        }
        Ok(())
    }
}

/// Simplify `mesh` to `target_vertices` vertices under `options`.
///
/// Shorthand for creating a [`Decimater`], initializing it and running it once.
pub fn simplify<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    target_vertices: usize,
    options: &SimplifyOptions,
) -> Result<SimplifyStats> {
    let mut decimater = Decimater::new(mesh)?;
    decimater.initialize(options)?;
    decimater.simplify(target_vertices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_disables_everything() {
        let options = SimplifyOptions::default();
        assert_eq!(options.aspect_ratio, 0.0);
        assert_eq!(options.max_valence, 0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let options = SimplifyOptions::default()
            .with_aspect_ratio(10.0)
            .with_edge_length(0.5)
            .with_max_valence(8)
            .with_normal_deviation(15.0)
            .with_hausdorff_error(0.01);

        assert_eq!(options.aspect_ratio, 10.0);
        assert_eq!(options.edge_length, 0.5);
        assert_eq!(options.max_valence, 8);
        assert_eq!(options.normal_deviation, 15.0);
        assert_eq!(options.hausdorff_error, 0.01);
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let negative = SimplifyOptions::default().with_hausdorff_error(-0.1);
        assert!(matches!(
            negative.validate(),
            Err(MeshError::InvalidParameter { name: "hausdorff_error", .. })
        ));

        let nan = SimplifyOptions::default().with_normal_deviation(f64::NAN);
        assert!(nan.validate().is_err());

        let inf = SimplifyOptions::default().with_aspect_ratio(f64::INFINITY);
        assert!(inf.validate().is_err());
    }

    #[test]
    fn test_target_from_ratio() {
        assert_eq!(SimplifyOptions::target_from_ratio(1000, 0.25).unwrap(), 250);
        assert_eq!(SimplifyOptions::target_from_ratio(10, 0.0).unwrap(), 0);
        assert_eq!(SimplifyOptions::target_from_ratio(10, 1.0).unwrap(), 10);
        assert!(SimplifyOptions::target_from_ratio(10, 1.5).is_err());
        assert!(SimplifyOptions::target_from_ratio(10, -0.1).is_err());
    }

    #[test]
    fn test_stats_display() {
        let stats = SimplifyStats {
            initial_vertices: 100,
            final_vertices: 40,
            collapses: 60,
            stale_candidates: 3,
            queue_exhausted: true,
        };
        assert_eq!(
            stats.to_string(),
            "100 -> 40 vertices, 60 collapses, 3 stale (no legal collapse left)"
        );
    }
}
