//! Core mesh data structures.
//!
//! This module provides the half-edge mesh representation and related types
//! for representing and editing polygon meshes.
//!
//! # Overview
//!
//! The primary type is [`HalfEdgeMesh`], which represents a mesh using a
//! half-edge (doubly-connected edge list) data structure. This representation
//! provides O(1) adjacency queries and supports the edge collapses used by
//! simplification.
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`HalfEdgeId`] - Identifies a half-edge
//! - [`FaceId`] - Identifies a face
//! - [`EdgeId`] - Identifies a full edge
//!
//! These indices are generic over the underlying integer type ([`MeshIndex`] trait),
//! allowing you to choose `u16`, `u32`, or `u64` based on mesh size.
//!
//! # Properties
//!
//! Per-element data is attached by name through typed handles, see
//! [`VertexProperty`], [`EdgeProperty`] and [`FaceProperty`].
//!
//! # Construction
//!
//! Meshes are typically constructed from file I/O or from face-vertex lists:
//!
//! ```
//! use whittle::mesh::{HalfEdgeMesh, build_from_triangles};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//! ```

mod builder;
mod halfedge;
mod index;
mod property;

pub use builder::{build_from_polygons, build_from_triangles, to_face_vertex, to_face_vertex_polygons};
pub use halfedge::{Face, FaceHalfEdgeIter, HalfEdge, HalfEdgeMesh, Vertex, VertexHalfEdgeIter};
pub use index::{EdgeId, FaceId, HalfEdgeId, MeshIndex, VertexId};
pub use property::{
    EdgeKind, EdgeProperty, FaceKind, FaceProperty, Property, VertexKind, VertexProperty,
};
