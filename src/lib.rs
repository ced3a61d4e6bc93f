//! # Whittle
//!
//! Greedy surface simplification of triangle meshes by halfedge collapses.
//!
//! Whittle removes vertices one collapse at a time, always picking the
//! collapse with the smallest quadric error, while keeping the result within
//! optional bounds on triangle shape, edge length, vertex valence, normal
//! deviation and Hausdorff distance to the input.
//!
//! ## Features
//!
//! - **Half-edge data structure**: O(1) adjacency queries with type-safe
//!   indices, named per-element properties and garbage collection
//! - **Flexible indexing**: Support for 16-bit, 32-bit, and 64-bit indices
//! - **Decimation**: quadric error metric, normal cones, Hausdorff samples,
//!   vertex selections and feature edges
//! - **File formats**: OBJ, OFF, STL, PLY
//!
//! ## Quick Start
//!
//! ```no_run
//! use whittle::prelude::*;
//!
//! let mut mesh: HalfEdgeMesh = whittle::io::load("model.obj").unwrap();
//!
//! let options = SimplifyOptions::default()
//!     .with_aspect_ratio(10.0)
//!     .with_normal_deviation(20.0);
//! let target = mesh.num_vertices() / 4;
//! let stats = simplify(&mut mesh, target, &options).unwrap();
//! println!("{stats}");
//!
//! whittle::io::save(&mesh, "simplified.off").unwrap();
//! ```
//!
//! ## Building Meshes Programmatically
//!
//! ```
//! use whittle::prelude::*;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//!
//! let faces = vec![
//!     [0, 2, 1],  // bottom
//!     [0, 1, 3],  // front
//!     [1, 2, 3],  // right
//!     [2, 0, 3],  // left
//! ];
//!
//! let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//! assert_eq!(mesh.num_vertices(), 4);
//! assert_eq!(mesh.num_faces(), 4);
//! ```
//!
//! ## Marking Features
//!
//! Collapses respect boolean marker properties found on the mesh:
//!
//! ```
//! use whittle::prelude::*;
//! use whittle::algo::decimate::SELECTED;
//! use nalgebra::Point3;
//!
//! # let vertices = vec![
//! #     Point3::new(0.0, 0.0, 0.0),
//! #     Point3::new(1.0, 0.0, 0.0),
//! #     Point3::new(0.5, 1.0, 0.0),
//! # ];
//! # let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
//! // Only vertex 0 may be removed
//! let selected = mesh.add_vertex_property(SELECTED, false).unwrap();
//! mesh.vertex_prop_mut(selected)[0] = true;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod geometry;
pub mod io;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use whittle::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::decimate::{simplify, Decimater, SimplifyOptions, SimplifyStats};
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{
        build_from_polygons, build_from_triangles, to_face_vertex, EdgeId, EdgeProperty, Face,
        FaceId, FaceProperty, HalfEdge, HalfEdgeId, HalfEdgeMesh, MeshIndex, Vertex, VertexId,
        VertexProperty,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::Point3;

    #[test]
    fn test_tetrahedron() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];

        let faces = vec![
            [0, 2, 1], // bottom
            [0, 1, 3], // front
            [1, 2, 3], // right
            [2, 0, 3], // left
        ];

        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 4);
        assert_eq!(mesh.num_halfedges(), 12);
        assert!(mesh.is_valid());
        for v in mesh.vertex_ids() {
            assert!(!mesh.is_boundary_vertex(v), "vertex {:?} should not be on boundary", v);
        }
    }

    #[test]
    fn test_simplify_without_target_change() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();

        let stats = simplify(&mut mesh, 3, &SimplifyOptions::default()).unwrap();
        assert_eq!(stats.collapses, 0);
        assert_eq!(mesh.num_faces(), 1);
    }
}
