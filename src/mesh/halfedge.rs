//! Half-edge mesh data structure.
//!
//! This module provides a half-edge (doubly-connected edge list) representation
//! for polygon meshes. This structure enables O(1) adjacency queries and local
//! topological edits such as edge collapses.
//!
//! # Structure
//!
//! - Each edge is split into two **half-edges** pointing in opposite directions,
//!   stored next to each other so that half-edges `2e` and `2e + 1` form edge `e`
//! - Each half-edge knows its **twin** (opposite half-edge), **next** (next half-edge
//!   around the face), **origin vertex**, and **incident face**
//! - Each vertex stores one outgoing half-edge
//! - Each face stores one half-edge on its boundary
//!
//! # Boundary Handling
//!
//! Boundary half-edges (on mesh boundaries) have an invalid face ID. Their twins
//! are the interior half-edges. Boundary loops can be traversed using the `next`
//! pointer on boundary half-edges. The outgoing half-edge of a boundary vertex
//! is always a boundary half-edge, which makes boundary tests O(1).
//!
//! # Deletion
//!
//! Edits such as [`HalfEdgeMesh::collapse`] only flag elements as deleted.
//! Deleted elements are skipped by all iterators and excluded from the element
//! counts until [`HalfEdgeMesh::garbage_collection`] compacts the storage.

use nalgebra::{Point3, Vector3};

use super::index::{EdgeId, FaceId, HalfEdgeId, MeshIndex, VertexId};
use super::property::{EdgeKind, FaceKind, Property, PropertyRegistry, VertexKind};
use crate::error::Result;

/// A vertex in the half-edge mesh.
#[derive(Debug, Clone)]
pub struct Vertex<I: MeshIndex = u32> {
    /// The 3D position of this vertex.
    pub position: Point3<f64>,

    /// One outgoing half-edge from this vertex.
    /// For boundary vertices, this is guaranteed to be a boundary half-edge.
    pub halfedge: HalfEdgeId<I>,
}

impl<I: MeshIndex> Vertex<I> {
    /// Create a new vertex at the given position.
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            halfedge: HalfEdgeId::invalid(),
        }
    }
}

/// A half-edge in the mesh.
#[derive(Debug, Clone, Copy)]
pub struct HalfEdge<I: MeshIndex = u32> {
    /// The vertex this half-edge originates from.
    pub origin: VertexId<I>,

    /// The opposite half-edge (pointing in the reverse direction).
    pub twin: HalfEdgeId<I>,

    /// The next half-edge around the face (counter-clockwise).
    pub next: HalfEdgeId<I>,

    /// The previous half-edge around the face (clockwise).
    pub prev: HalfEdgeId<I>,

    /// The face this half-edge belongs to.
    /// Invalid for boundary half-edges.
    pub face: FaceId<I>,
}

impl<I: MeshIndex> HalfEdge<I> {
    /// Create a new uninitialized half-edge.
    pub fn new() -> Self {
        Self {
            origin: VertexId::invalid(),
            twin: HalfEdgeId::invalid(),
            next: HalfEdgeId::invalid(),
            prev: HalfEdgeId::invalid(),
            face: FaceId::invalid(),
        }
    }

    /// Check if this half-edge is on the boundary.
    #[inline]
    pub fn is_boundary(&self) -> bool {
        !self.face.is_valid()
    }
}

impl<I: MeshIndex> Default for HalfEdge<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// A face in the half-edge mesh.
#[derive(Debug, Clone, Copy)]
pub struct Face<I: MeshIndex = u32> {
    /// One half-edge on the boundary of this face.
    pub halfedge: HalfEdgeId<I>,
}

impl<I: MeshIndex> Face<I> {
    /// Create a new face with the given half-edge.
    pub fn new(halfedge: HalfEdgeId<I>) -> Self {
        Self { halfedge }
    }
}

impl<I: MeshIndex> Default for Face<I> {
    fn default() -> Self {
        Self {
            halfedge: HalfEdgeId::invalid(),
        }
    }
}

/// A half-edge mesh data structure for polygon meshes.
///
/// This structure stores vertices, half-edges, and faces with full connectivity
/// information, enabling O(1) adjacency queries. Named per-element properties
/// can be attached and are kept in sync with the element arrays.
#[derive(Debug, Clone)]
pub struct HalfEdgeMesh<I: MeshIndex = u32> {
    /// All vertices in the mesh, including deleted ones.
    pub(crate) vertices: Vec<Vertex<I>>,

    /// All half-edges in the mesh, stored in twin pairs.
    pub(crate) halfedges: Vec<HalfEdge<I>>,

    /// All faces in the mesh, including deleted ones.
    pub(crate) faces: Vec<Face<I>>,

    vertex_deleted: Vec<bool>,
    edge_deleted: Vec<bool>,
    face_deleted: Vec<bool>,

    deleted_vertices: usize,
    deleted_edges: usize,
    deleted_faces: usize,

    vertex_props: PropertyRegistry,
    edge_props: PropertyRegistry,
    face_props: PropertyRegistry,
}

impl<I: MeshIndex> Default for HalfEdgeMesh<I> {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! property_accessors {
    (
        $kind:ty, $registry:ident, $label:literal,
        $add:ident, $get_or_add:ident, $get:ident, $remove:ident, $prop:ident, $prop_mut:ident
    ) => {
        #[doc = concat!("Attach a new ", $label, " property named `name`, filled with `default`.")]
        ///
        /// Fails with [`MeshError::DuplicateProperty`](crate::error::MeshError::DuplicateProperty)
        /// if the name is taken.
        pub fn $add<T: Clone + 'static>(
            &mut self,
            name: &str,
            default: T,
        ) -> Result<Property<$kind, T>> {
            self.$registry.add(name, default)
        }

        #[doc = concat!("Return the ", $label, " property named `name`, attaching it if missing.")]
        pub fn $get_or_add<T: Clone + 'static>(
            &mut self,
            name: &str,
            default: T,
        ) -> Result<Property<$kind, T>> {
            self.$registry.get_or_add(name, default)
        }

        #[doc = concat!("Look up an existing ", $label, " property by name.")]
        ///
        /// Returns `Ok(None)` if no property has this name, and
        /// [`MeshError::PropertyTypeMismatch`](crate::error::MeshError::PropertyTypeMismatch)
        /// if it stores another value type.
        pub fn $get<T: 'static>(&self, name: &str) -> Result<Option<Property<$kind, T>>> {
            self.$registry.find(name)
        }

        #[doc = concat!("Detach a ", $label, " property. Removing twice is a no-op.")]
        pub fn $remove<T>(&mut self, property: Property<$kind, T>) {
            self.$registry.remove(property);
        }

        #[doc = concat!("Values of a ", $label, " property, indexed by element index.")]
        ///
        /// # Panics
        /// Panics if the property has been removed.
        pub fn $prop<T: 'static>(&self, property: Property<$kind, T>) -> &[T] {
            self.$registry.values(property)
        }

        #[doc = concat!("Mutable values of a ", $label, " property.")]
        ///
        /// # Panics
        /// Panics if the property has been removed.
        pub fn $prop_mut<T: 'static>(&mut self, property: Property<$kind, T>) -> &mut [T] {
            self.$registry.values_mut(property)
        }
    };
}

impl<I: MeshIndex> HalfEdgeMesh<I> {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(num_vertices: usize, num_faces: usize) -> Self {
        // Closed triangle mesh: E = 3F/2, so HE = 3F. Leave room for boundary.
        let num_halfedges = num_faces * 3 + num_faces / 2;

        Self {
            vertices: Vec::with_capacity(num_vertices),
            halfedges: Vec::with_capacity(num_halfedges),
            faces: Vec::with_capacity(num_faces),
            vertex_deleted: Vec::with_capacity(num_vertices),
            edge_deleted: Vec::with_capacity(num_halfedges / 2),
            face_deleted: Vec::with_capacity(num_faces),
            deleted_vertices: 0,
            deleted_edges: 0,
            deleted_faces: 0,
            vertex_props: PropertyRegistry::default(),
            edge_props: PropertyRegistry::default(),
            face_props: PropertyRegistry::default(),
        }
    }

    // ==================== Accessors ====================

    /// Get the number of live vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() - self.deleted_vertices
    }

    /// Get the number of live half-edges.
    #[inline]
    pub fn num_halfedges(&self) -> usize {
        2 * self.num_edges()
    }

    /// Get the number of live edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edge_deleted.len() - self.deleted_edges
    }

    /// Get the number of live faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len() - self.deleted_faces
    }

    /// Number of vertex slots, deleted ones included.
    ///
    /// Vertex property tables have this length.
    #[inline]
    pub fn vertex_slots(&self) -> usize {
        self.vertices.len()
    }

    /// Number of edge slots, deleted ones included.
    #[inline]
    pub fn edge_slots(&self) -> usize {
        self.edge_deleted.len()
    }

    /// Number of face slots, deleted ones included.
    #[inline]
    pub fn face_slots(&self) -> usize {
        self.faces.len()
    }

    /// Whether any element is flagged as deleted.
    #[inline]
    pub fn has_garbage(&self) -> bool {
        self.deleted_vertices + self.deleted_edges + self.deleted_faces > 0
    }

    /// Whether a vertex has been deleted.
    #[inline]
    pub fn is_deleted_vertex(&self, v: VertexId<I>) -> bool {
        self.vertex_deleted[v.index()]
    }

    /// Whether an edge has been deleted.
    #[inline]
    pub fn is_deleted_edge(&self, e: EdgeId<I>) -> bool {
        self.edge_deleted[e.index()]
    }

    /// Whether a face has been deleted.
    #[inline]
    pub fn is_deleted_face(&self, f: FaceId<I>) -> bool {
        self.face_deleted[f.index()]
    }

    /// Get a vertex by ID.
    #[inline]
    pub fn vertex(&self, id: VertexId<I>) -> &Vertex<I> {
        &self.vertices[id.index()]
    }

    /// Get a mutable vertex by ID.
    #[inline]
    pub fn vertex_mut(&mut self, id: VertexId<I>) -> &mut Vertex<I> {
        &mut self.vertices[id.index()]
    }

    /// Get a half-edge by ID.
    #[inline]
    pub fn halfedge(&self, id: HalfEdgeId<I>) -> &HalfEdge<I> {
        &self.halfedges[id.index()]
    }

    /// Get a mutable half-edge by ID.
    #[inline]
    pub fn halfedge_mut(&mut self, id: HalfEdgeId<I>) -> &mut HalfEdge<I> {
        &mut self.halfedges[id.index()]
    }

    /// Get a face by ID.
    #[inline]
    pub fn face(&self, id: FaceId<I>) -> &Face<I> {
        &self.faces[id.index()]
    }

    /// Get a mutable face by ID.
    #[inline]
    pub fn face_mut(&mut self, id: FaceId<I>) -> &mut Face<I> {
        &mut self.faces[id.index()]
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId<I>) -> &Point3<f64> {
        &self.vertex(v).position
    }

    /// Set the position of a vertex.
    #[inline]
    pub fn set_position(&mut self, v: VertexId<I>, pos: Point3<f64>) {
        self.vertex_mut(v).position = pos;
    }

    // ==================== Topology Queries ====================

    /// Get the twin (opposite) half-edge.
    #[inline]
    pub fn twin(&self, he: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.halfedge(he).twin
    }

    /// Get the next half-edge around the face.
    #[inline]
    pub fn next(&self, he: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.halfedge(he).next
    }

    /// Get the previous half-edge around the face.
    #[inline]
    pub fn prev(&self, he: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.halfedge(he).prev
    }

    /// Get the origin vertex of a half-edge.
    #[inline]
    pub fn origin(&self, he: HalfEdgeId<I>) -> VertexId<I> {
        self.halfedge(he).origin
    }

    /// Get the destination vertex of a half-edge.
    #[inline]
    pub fn dest(&self, he: HalfEdgeId<I>) -> VertexId<I> {
        self.origin(self.twin(he))
    }

    /// Get the face of a half-edge.
    #[inline]
    pub fn face_of(&self, he: HalfEdgeId<I>) -> FaceId<I> {
        self.halfedge(he).face
    }

    /// Get the edge a half-edge belongs to.
    #[inline]
    pub fn edge_of(&self, he: HalfEdgeId<I>) -> EdgeId<I> {
        he.edge()
    }

    /// Get one of the two half-edges of an edge (`side` is 0 or 1).
    #[inline]
    pub fn halfedge_of_edge(&self, e: EdgeId<I>, side: usize) -> HalfEdgeId<I> {
        e.halfedge(side)
    }

    /// Rotate an outgoing half-edge clockwise around its origin.
    #[inline]
    pub fn cw_rotated(&self, he: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.next(self.twin(he))
    }

    /// Rotate an outgoing half-edge counter-clockwise around its origin.
    #[inline]
    pub fn ccw_rotated(&self, he: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.twin(self.prev(he))
    }

    /// Check if a half-edge is on the boundary.
    #[inline]
    pub fn is_boundary_halfedge(&self, he: HalfEdgeId<I>) -> bool {
        self.halfedge(he).is_boundary()
    }

    /// Check if a vertex is on the boundary. Isolated vertices count as boundary.
    #[inline]
    pub fn is_boundary_vertex(&self, v: VertexId<I>) -> bool {
        let he = self.vertex(v).halfedge;
        !he.is_valid() || self.is_boundary_halfedge(he)
    }

    /// Check if an edge (represented by one of its half-edges) is on the boundary.
    #[inline]
    pub fn is_boundary_edge(&self, he: HalfEdgeId<I>) -> bool {
        self.is_boundary_halfedge(he) || self.is_boundary_halfedge(self.twin(he))
    }

    /// Check if a vertex has no incident edges.
    #[inline]
    pub fn is_isolated(&self, v: VertexId<I>) -> bool {
        !self.vertex(v).halfedge.is_valid()
    }

    /// Find the half-edge going from `from` to `to`, if the two are connected.
    pub fn find_halfedge(&self, from: VertexId<I>, to: VertexId<I>) -> Option<HalfEdgeId<I>> {
        self.vertex_halfedges(from).find(|&he| self.dest(he) == to)
    }

    // ==================== Iteration ====================

    /// Iterate over all live vertex IDs.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        (0..self.vertices.len())
            .filter(move |&i| !self.vertex_deleted[i])
            .map(VertexId::new)
    }

    /// Iterate over all live vertices with their IDs.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId<I>, &Vertex<I>)> + '_ {
        self.vertex_ids().map(move |v| (v, self.vertex(v)))
    }

    /// Iterate over all live half-edge IDs.
    pub fn halfedge_ids(&self) -> impl Iterator<Item = HalfEdgeId<I>> + '_ {
        (0..self.halfedges.len())
            .filter(move |&i| !self.edge_deleted[i >> 1])
            .map(HalfEdgeId::new)
    }

    /// Iterate over all live half-edges with their IDs.
    pub fn halfedges(&self) -> impl Iterator<Item = (HalfEdgeId<I>, &HalfEdge<I>)> + '_ {
        self.halfedge_ids().map(move |he| (he, self.halfedge(he)))
    }

    /// Iterate over all live edge IDs.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId<I>> + '_ {
        (0..self.edge_deleted.len())
            .filter(move |&i| !self.edge_deleted[i])
            .map(EdgeId::new)
    }

    /// Iterate over all live face IDs.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId<I>> + '_ {
        (0..self.faces.len())
            .filter(move |&i| !self.face_deleted[i])
            .map(FaceId::new)
    }

    /// Iterate over all live faces with their IDs.
    pub fn faces(&self) -> impl Iterator<Item = (FaceId<I>, &Face<I>)> + '_ {
        self.face_ids().map(move |f| (f, self.face(f)))
    }

    /// Iterate over half-edges around a vertex (outgoing half-edges).
    pub fn vertex_halfedges(&self, v: VertexId<I>) -> VertexHalfEdgeIter<'_, I> {
        VertexHalfEdgeIter::new(self, v)
    }

    /// Iterate over vertices adjacent to a vertex.
    pub fn vertex_neighbors(&self, v: VertexId<I>) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.vertex_halfedges(v).map(|he| self.dest(he))
    }

    /// Iterate over faces adjacent to a vertex.
    pub fn vertex_faces(&self, v: VertexId<I>) -> impl Iterator<Item = FaceId<I>> + '_ {
        self.vertex_halfedges(v)
            .map(|he| self.face_of(he))
            .filter(|f| f.is_valid())
    }

    /// Iterate over half-edges around a face.
    pub fn face_halfedges(&self, f: FaceId<I>) -> FaceHalfEdgeIter<'_, I> {
        FaceHalfEdgeIter::new(self, f)
    }

    /// Iterate over vertices of a face.
    pub fn face_vertices(&self, f: FaceId<I>) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.face_halfedges(f).map(|he| self.origin(he))
    }

    /// Get the three vertices of a triangular face.
    pub fn face_triangle(&self, f: FaceId<I>) -> [VertexId<I>; 3] {
        let he0 = self.face(f).halfedge;
        let he1 = self.next(he0);
        let he2 = self.next(he1);
        [self.origin(he0), self.origin(he1), self.origin(he2)]
    }

    /// Get the positions of the three vertices of a triangular face.
    pub fn face_positions(&self, f: FaceId<I>) -> [Point3<f64>; 3] {
        let [v0, v1, v2] = self.face_triangle(f);
        [*self.position(v0), *self.position(v1), *self.position(v2)]
    }

    /// Number of sides of a face.
    pub fn face_vertex_count(&self, f: FaceId<I>) -> usize {
        self.face_halfedges(f).count()
    }

    /// Check whether every live face is a triangle.
    pub fn is_triangle_mesh(&self) -> bool {
        self.first_non_triangle().is_none()
    }

    /// The first live face that is not a triangle, with its number of sides.
    pub fn first_non_triangle(&self) -> Option<(FaceId<I>, usize)> {
        self.face_ids()
            .map(|f| (f, self.face_vertex_count(f)))
            .find(|&(_, n)| n != 3)
    }

    // ==================== Geometry ====================

    /// Area-weighted normal of a face (twice the area times the unit normal).
    fn face_area_vector(&self, f: FaceId<I>) -> Vector3<f64> {
        let mut corners = self.face_vertices(f).map(|v| *self.position(v));
        let Some(p0) = corners.next() else {
            return Vector3::zeros();
        };
        let rest: Vec<Point3<f64>> = corners.collect();
        rest.windows(2)
            .map(|w| (w[0] - p0).cross(&(w[1] - p0)))
            .sum()
    }

    /// Compute the unit normal of a face.
    ///
    /// Returns the zero vector for degenerate faces.
    pub fn face_normal(&self, f: FaceId<I>) -> Vector3<f64> {
        let n = self.face_area_vector(f);
        let len = n.norm();
        if len > f64::MIN_POSITIVE {
            n / len
        } else {
            Vector3::zeros()
        }
    }

    /// Compute the area of a face.
    pub fn face_area(&self, f: FaceId<I>) -> f64 {
        0.5 * self.face_area_vector(f).norm()
    }

    /// Compute the length of an edge.
    pub fn edge_length(&self, he: HalfEdgeId<I>) -> f64 {
        self.edge_vector(he).norm()
    }

    /// Compute the edge vector (from origin to destination).
    pub fn edge_vector(&self, he: HalfEdgeId<I>) -> Vector3<f64> {
        self.position(self.dest(he)) - self.position(self.origin(he))
    }

    /// Compute the valence (degree) of a vertex.
    pub fn valence(&self, v: VertexId<I>) -> usize {
        self.vertex_halfedges(v).count()
    }

    /// Compute the bounding box of the live vertices.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut positions = self.vertices().map(|(_, v)| v.position);
        let first = positions.next()?;

        Some(positions.fold((first, first), |(mut min, mut max), p| {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
            (min, max)
        }))
    }

    /// Compute the total surface area of the mesh.
    pub fn surface_area(&self) -> f64 {
        self.face_ids().map(|f| self.face_area(f)).sum()
    }

    /// Mean length over all live edges, zero for an empty mesh.
    pub fn average_edge_length(&self) -> f64 {
        let n = self.num_edges();
        if n == 0 {
            return 0.0;
        }
        let total: f64 = self
            .edge_ids()
            .map(|e| self.edge_length(e.halfedge(0)))
            .sum();
        total / n as f64
    }

    // ==================== Construction ====================

    /// Add a new vertex and return its ID.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> VertexId<I> {
        let id = VertexId::new(self.vertices.len());
        self.vertices.push(Vertex::new(position));
        self.vertex_deleted.push(false);
        self.vertex_props.push();
        id
    }

    /// Allocate an edge between two vertices.
    ///
    /// Returns the half-edge `from -> to`; its twin is the paired half-edge.
    /// Neither half-edge is linked into a face or loop yet.
    pub(crate) fn new_edge(&mut self, from: VertexId<I>, to: VertexId<I>) -> HalfEdgeId<I> {
        let he = HalfEdgeId::new(self.halfedges.len());
        let twin = he.pair();

        self.halfedges.push(HalfEdge {
            origin: from,
            twin,
            ..HalfEdge::new()
        });
        self.halfedges.push(HalfEdge {
            origin: to,
            twin: he,
            ..HalfEdge::new()
        });
        self.edge_deleted.push(false);
        self.edge_props.push();
        he
    }

    /// Allocate a face bounded by the loop through `he`.
    pub(crate) fn new_face(&mut self, he: HalfEdgeId<I>) -> FaceId<I> {
        let id = FaceId::new(self.faces.len());
        self.faces.push(Face::new(he));
        self.face_deleted.push(false);
        self.face_props.push();
        id
    }

    /// Link `a -> b` in both directions.
    #[inline]
    pub(crate) fn set_next(&mut self, a: HalfEdgeId<I>, b: HalfEdgeId<I>) {
        self.halfedge_mut(a).next = b;
        self.halfedge_mut(b).prev = a;
    }

    // ==================== Edge Collapse ====================

    /// Check whether collapsing `he` keeps the mesh a 2-manifold.
    ///
    /// Collapsing moves `origin(he)` into `dest(he)`. The test is the link
    /// condition: the two wing edges of an incident triangle must not both be
    /// boundary, the wing vertices must differ, an interior edge must not join
    /// two boundary vertices, and the one-rings of the endpoints may only
    /// share the wing vertices.
    pub fn is_collapse_ok(&self, he: HalfEdgeId<I>) -> bool {
        if self.is_deleted_edge(he.edge()) {
            return false;
        }

        let v0v1 = he;
        let v1v0 = self.twin(v0v1);
        let v0 = self.origin(v0v1);
        let v1 = self.dest(v0v1);

        let mut vl = VertexId::invalid();
        let mut vr = VertexId::invalid();

        if !self.is_boundary_halfedge(v0v1) {
            let h1 = self.next(v0v1);
            let h2 = self.next(h1);
            vl = self.dest(h1);
            if self.is_boundary_halfedge(self.twin(h1)) && self.is_boundary_halfedge(self.twin(h2))
            {
                return false;
            }
        }

        if !self.is_boundary_halfedge(v1v0) {
            let h1 = self.next(v1v0);
            let h2 = self.next(h1);
            vr = self.dest(h1);
            if self.is_boundary_halfedge(self.twin(h1)) && self.is_boundary_halfedge(self.twin(h2))
            {
                return false;
            }
        }

        if vl == vr {
            return false;
        }

        if self.is_boundary_vertex(v0)
            && self.is_boundary_vertex(v1)
            && !self.is_boundary_edge(v0v1)
        {
            return false;
        }

        self.vertex_neighbors(v0)
            .filter(|&vv| vv != v1 && vv != vl && vv != vr)
            .all(|vv| self.find_halfedge(vv, v1).is_none())
    }

    /// Collapse `he`, removing `origin(he)` and keeping `dest(he)`.
    ///
    /// The edge and its incident faces are deleted and the resulting 2-gons
    /// are merged away. Check [`is_collapse_ok`](Self::is_collapse_ok) first.
    pub fn collapse(&mut self, he: HalfEdgeId<I>) {
        let h0 = he;
        let h1 = self.prev(h0);
        let o0 = self.twin(h0);
        let o1 = self.next(o0);

        self.remove_edge_helper(h0);

        if self.next(self.next(h1)) == h1 {
            self.remove_loop_helper(h1);
        }
        if self.next(self.next(o1)) == o1 {
            self.remove_loop_helper(o1);
        }
    }

    fn remove_edge_helper(&mut self, h: HalfEdgeId<I>) {
        let hn = self.next(h);
        let hp = self.prev(h);

        let o = self.twin(h);
        let on = self.next(o);
        let op = self.prev(o);

        let fh = self.face_of(h);
        let fo = self.face_of(o);

        let vh = self.dest(h);
        let vo = self.origin(h);

        let outgoing: Vec<HalfEdgeId<I>> = self.vertex_halfedges(vo).collect();
        for out in outgoing {
            self.halfedge_mut(out).origin = vh;
        }

        self.set_next(hp, hn);
        self.set_next(op, on);

        if fh.is_valid() {
            self.face_mut(fh).halfedge = hn;
        }
        if fo.is_valid() {
            self.face_mut(fo).halfedge = on;
        }

        if self.vertex(vh).halfedge == o {
            self.vertex_mut(vh).halfedge = hn;
        }
        self.adjust_outgoing_halfedge(vh);
        self.vertex_mut(vo).halfedge = HalfEdgeId::invalid();

        self.delete_vertex(vo);
        self.delete_edge(h.edge());
    }

    /// Merge the 2-gon starting at `h` into the face across its second edge.
    fn remove_loop_helper(&mut self, h: HalfEdgeId<I>) {
        let h0 = h;
        let h1 = self.next(h0);

        let o0 = self.twin(h0);
        let o1 = self.twin(h1);

        let v0 = self.dest(h0);
        let v1 = self.dest(h1);

        let fh = self.face_of(h0);
        let fo = self.face_of(o0);

        debug_assert_eq!(self.next(h1), h0);
        debug_assert_ne!(h1, o0);

        let o0_next = self.next(o0);
        let o0_prev = self.prev(o0);
        self.set_next(h1, o0_next);
        self.set_next(o0_prev, h1);

        self.halfedge_mut(h1).face = fo;

        self.vertex_mut(v0).halfedge = h1;
        self.adjust_outgoing_halfedge(v0);
        self.vertex_mut(v1).halfedge = o1;
        self.adjust_outgoing_halfedge(v1);

        if fo.is_valid() && self.face(fo).halfedge == o0 {
            self.face_mut(fo).halfedge = h1;
        }

        if fh.is_valid() {
            self.delete_face(fh);
        }
        self.delete_edge(h0.edge());
    }

    /// Point a boundary vertex at one of its boundary half-edges.
    fn adjust_outgoing_halfedge(&mut self, v: VertexId<I>) {
        if let Some(he) = self
            .vertex_halfedges(v)
            .find(|&he| self.is_boundary_halfedge(he))
        {
            self.vertex_mut(v).halfedge = he;
        }
    }

    fn delete_vertex(&mut self, v: VertexId<I>) {
        if !self.vertex_deleted[v.index()] {
            self.vertex_deleted[v.index()] = true;
            self.deleted_vertices += 1;
        }
    }

    fn delete_edge(&mut self, e: EdgeId<I>) {
        if !self.edge_deleted[e.index()] {
            self.edge_deleted[e.index()] = true;
            self.deleted_edges += 1;
        }
    }

    fn delete_face(&mut self, f: FaceId<I>) {
        if !self.face_deleted[f.index()] {
            self.face_deleted[f.index()] = true;
            self.deleted_faces += 1;
        }
    }

    // ==================== Garbage Collection ====================

    /// Remove deleted elements and renumber the survivors.
    ///
    /// Survivors keep their relative order. All attached properties are
    /// permuted along with the elements; element IDs obtained before the call
    /// are invalidated, property handles are not.
    pub fn garbage_collection(&mut self) {
        if !self.has_garbage() {
            return;
        }

        let vkeep = surviving(&self.vertex_deleted);
        let ekeep = surviving(&self.edge_deleted);
        let fkeep = surviving(&self.face_deleted);

        let vmap = inverse(&vkeep, self.vertices.len());
        let emap = inverse(&ekeep, self.edge_deleted.len());
        let fmap = inverse(&fkeep, self.faces.len());

        let remap_v = |v: VertexId<I>| {
            if v.is_valid() {
                VertexId::new(vmap[v.index()])
            } else {
                v
            }
        };
        let remap_h = |h: HalfEdgeId<I>| {
            if h.is_valid() {
                HalfEdgeId::new(2 * emap[h.index() >> 1] + (h.index() & 1))
            } else {
                h
            }
        };
        let remap_f = |f: FaceId<I>| {
            if f.is_valid() {
                FaceId::new(fmap[f.index()])
            } else {
                f
            }
        };

        let vertices: Vec<Vertex<I>> = vkeep
            .iter()
            .map(|&i| Vertex {
                position: self.vertices[i].position,
                halfedge: remap_h(self.vertices[i].halfedge),
            })
            .collect();

        let halfedges: Vec<HalfEdge<I>> = ekeep
            .iter()
            .flat_map(|&e| [2 * e, 2 * e + 1])
            .map(|i| {
                let he = &self.halfedges[i];
                HalfEdge {
                    origin: remap_v(he.origin),
                    twin: remap_h(he.twin),
                    next: remap_h(he.next),
                    prev: remap_h(he.prev),
                    face: remap_f(he.face),
                }
            })
            .collect();

        let faces: Vec<Face<I>> = fkeep
            .iter()
            .map(|&i| Face::new(remap_h(self.faces[i].halfedge)))
            .collect();

        self.vertices = vertices;
        self.halfedges = halfedges;
        self.faces = faces;

        self.vertex_props.compact(&vkeep);
        self.edge_props.compact(&ekeep);
        self.face_props.compact(&fkeep);

        self.vertex_deleted = vec![false; vkeep.len()];
        self.edge_deleted = vec![false; ekeep.len()];
        self.face_deleted = vec![false; fkeep.len()];
        self.deleted_vertices = 0;
        self.deleted_edges = 0;
        self.deleted_faces = 0;
    }

    // ==================== Properties ====================

    property_accessors!(
        VertexKind,
        vertex_props,
        "vertex",
        add_vertex_property,
        vertex_property,
        get_vertex_property,
        remove_vertex_property,
        vertex_prop,
        vertex_prop_mut
    );

    property_accessors!(
        EdgeKind,
        edge_props,
        "edge",
        add_edge_property,
        edge_property,
        get_edge_property,
        remove_edge_property,
        edge_prop,
        edge_prop_mut
    );

    property_accessors!(
        FaceKind,
        face_props,
        "face",
        add_face_property,
        face_property,
        get_face_property,
        remove_face_property,
        face_prop,
        face_prop_mut
    );

    /// Names of all attached vertex properties.
    pub fn vertex_property_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.vertex_props.names()
    }

    /// Whether a vertex property handle still refers to an attached table.
    pub fn has_vertex_property<T>(&self, property: Property<VertexKind, T>) -> bool {
        self.vertex_props.contains(property)
    }

    /// Whether a face property handle still refers to an attached table.
    pub fn has_face_property<T>(&self, property: Property<FaceKind, T>) -> bool {
        self.face_props.contains(property)
    }

    // ==================== Validation ====================

    /// Check if the mesh is valid (all connectivity of live elements is consistent).
    pub fn is_valid(&self) -> bool {
        for (vid, v) in self.vertices() {
            if v.halfedge.is_valid() {
                if self.is_deleted_edge(v.halfedge.edge()) || self.origin(v.halfedge) != vid {
                    return false;
                }
                let boundary_here = self.vertex_halfedges(vid).any(|he| self.is_boundary_halfedge(he));
                if boundary_here != self.is_boundary_halfedge(v.halfedge) {
                    return false;
                }
            }
        }

        for (heid, he) in self.halfedges() {
            if he.twin != heid.pair() || self.twin(he.twin) != heid {
                return false;
            }
            if !he.next.is_valid() || !he.prev.is_valid() {
                return false;
            }
            if self.is_deleted_edge(he.next.edge()) || self.is_deleted_edge(he.prev.edge()) {
                return false;
            }
            if self.prev(he.next) != heid || self.next(he.prev) != heid {
                return false;
            }
            if self.origin(he.next) != self.dest(heid) {
                return false;
            }
            if self.face_of(he.next) != he.face {
                return false;
            }
            if self.is_deleted_vertex(he.origin) {
                return false;
            }
            if he.face.is_valid() && self.is_deleted_face(he.face) {
                return false;
            }
        }

        for (fid, f) in self.faces() {
            if !f.halfedge.is_valid() || self.face_of(f.halfedge) != fid {
                return false;
            }
            if self.face_vertex_count(fid) < 3 {
                return false;
            }
        }

        true
    }
}

/// Indices of the entries not flagged as deleted.
fn surviving(deleted: &[bool]) -> Vec<usize> {
    deleted
        .iter()
        .enumerate()
        .filter(|(_, &d)| !d)
        .map(|(i, _)| i)
        .collect()
}

/// Map old index to new index; deleted entries map to `usize::MAX`.
fn inverse(keep: &[usize], len: usize) -> Vec<usize> {
    let mut map = vec![usize::MAX; len];
    for (new, &old) in keep.iter().enumerate() {
        map[old] = new;
    }
    map
}

/// Iterator over half-edges around a vertex.
pub struct VertexHalfEdgeIter<'a, I: MeshIndex = u32> {
    mesh: &'a HalfEdgeMesh<I>,
    start: HalfEdgeId<I>,
    current: HalfEdgeId<I>,
    done: bool,
}

impl<'a, I: MeshIndex> VertexHalfEdgeIter<'a, I> {
    fn new(mesh: &'a HalfEdgeMesh<I>, v: VertexId<I>) -> Self {
        let start = mesh.vertex(v).halfedge;
        Self {
            mesh,
            start,
            current: start,
            done: !start.is_valid(),
        }
    }
}

impl<'a, I: MeshIndex> Iterator for VertexHalfEdgeIter<'a, I> {
    type Item = HalfEdgeId<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current;

        // If he goes v -> w, then twin(he) goes w -> v and
        // next(twin(he)) is the next outgoing half-edge from v.
        self.current = self.mesh.cw_rotated(self.current);

        if self.current == self.start {
            self.done = true;
        }

        Some(result)
    }
}

/// Iterator over half-edges around a face.
pub struct FaceHalfEdgeIter<'a, I: MeshIndex = u32> {
    mesh: &'a HalfEdgeMesh<I>,
    start: HalfEdgeId<I>,
    current: HalfEdgeId<I>,
    done: bool,
}

impl<'a, I: MeshIndex> FaceHalfEdgeIter<'a, I> {
    fn new(mesh: &'a HalfEdgeMesh<I>, f: FaceId<I>) -> Self {
        let start = mesh.face(f).halfedge;
        Self {
            mesh,
            start,
            current: start,
            done: !start.is_valid(),
        }
    }
}

impl<'a, I: MeshIndex> Iterator for FaceHalfEdgeIter<'a, I> {
    type Item = HalfEdgeId<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current;
        self.current = self.mesh.next(self.current);

        if self.current == self.start {
            self.done = true;
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{build_from_polygons, build_from_triangles};

    fn octahedron() -> HalfEdgeMesh {
        let vertices = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, -1.0),
        ];
        let faces = vec![
            [0, 2, 4],
            [2, 1, 4],
            [1, 3, 4],
            [3, 0, 4],
            [2, 0, 5],
            [1, 2, 5],
            [3, 1, 5],
            [0, 3, 5],
        ];
        build_from_triangles(&vertices, &faces).unwrap()
    }

    /// Two unit squares side by side, each split along a diagonal.
    fn strip() -> HalfEdgeMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 4], [0, 4, 3], [1, 2, 5], [1, 5, 4]];
        build_from_triangles(&vertices, &faces).unwrap()
    }

    fn vid(i: usize) -> VertexId {
        VertexId::new(i)
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = HalfEdgeMesh::<u32>::new();
        assert_eq!(mesh.num_vertices(), 0);
        assert_eq!(mesh.num_halfedges(), 0);
        assert_eq!(mesh.num_faces(), 0);
        assert!(!mesh.has_garbage());
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_add_vertex() {
        let mut mesh = HalfEdgeMesh::<u32>::new();
        let v0 = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let v1 = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));

        assert_eq!(mesh.num_vertices(), 2);
        assert_eq!(v0.index(), 0);
        assert_eq!(v1.index(), 1);
        assert!(mesh.is_isolated(v0));
        assert!(mesh.is_boundary_vertex(v0));
    }

    #[test]
    fn test_rotation_and_find() {
        let mesh = octahedron();
        let top = vid(4);
        assert_eq!(mesh.valence(top), 4);

        let he = mesh.find_halfedge(top, vid(0)).unwrap();
        assert_eq!(mesh.origin(he), top);
        assert_eq!(mesh.dest(he), vid(0));
        assert_eq!(mesh.ccw_rotated(mesh.cw_rotated(he)), he);
        assert!(mesh.find_halfedge(top, vid(5)).is_none());
        assert_eq!(mesh.edge_of(he), he.edge());
        assert_eq!(mesh.halfedge_of_edge(he.edge(), he.index() & 1), he);
    }

    #[test]
    fn test_face_normal_degenerate() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
        assert_eq!(mesh.face_normal(FaceId::new(0)), Vector3::zeros());
        assert_eq!(mesh.face_area(FaceId::new(0)), 0.0);
    }

    #[test]
    fn test_triangle_mesh_detection() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let quad: HalfEdgeMesh = build_from_polygons(&vertices, &[vec![0, 1, 2, 3]]).unwrap();
        assert!(!quad.is_triangle_mesh());
        assert_eq!(quad.first_non_triangle(), Some((FaceId::new(0), 4)));
        assert!((quad.face_area(FaceId::new(0)) - 1.0).abs() < 1e-12);
        assert!(octahedron().is_triangle_mesh());
    }

    #[test]
    fn test_collapse_interior_edge() {
        let mut mesh = octahedron();
        let he = mesh.find_halfedge(vid(4), vid(0)).unwrap();
        assert!(mesh.is_collapse_ok(he));

        mesh.collapse(he);

        assert_eq!(mesh.num_vertices(), 5);
        assert_eq!(mesh.num_edges(), 9);
        assert_eq!(mesh.num_faces(), 6);
        assert!(mesh.is_deleted_vertex(vid(4)));
        assert!(mesh.is_deleted_edge(he.edge()));
        assert!(mesh.is_valid());

        // The kept vertex now reaches every former neighbour of the removed one.
        assert_eq!(mesh.valence(vid(0)), 4);
        for v in [1, 2, 3] {
            assert!(mesh.find_halfedge(vid(0), vid(v)).is_some());
        }
    }

    #[test]
    fn test_collapse_boundary_edge() {
        let mut mesh = strip();
        let he = mesh.find_halfedge(vid(1), vid(2)).unwrap();
        assert!(mesh.is_boundary_edge(he));
        assert!(mesh.is_collapse_ok(he));

        mesh.collapse(he);
        assert_eq!(mesh.num_vertices(), 5);
        assert_eq!(mesh.num_faces(), 3);
        assert!(mesh.is_valid());
        assert!(mesh.is_boundary_vertex(vid(2)));
    }

    #[test]
    fn test_collapse_rejected_between_boundary_vertices() {
        let mesh = strip();
        // Interior diagonal joining two boundary vertices.
        let he = mesh.find_halfedge(vid(0), vid(4)).unwrap();
        assert!(!mesh.is_boundary_edge(he));
        assert!(!mesh.is_collapse_ok(he));
    }

    #[test]
    fn test_garbage_collection_compacts_properties() {
        let mut mesh = octahedron();
        let tag = mesh.add_vertex_property("v:tag", 0usize).unwrap();
        for (i, t) in mesh.vertex_prop_mut(tag).iter_mut().enumerate() {
            *t = i;
        }

        let he = mesh.find_halfedge(vid(4), vid(0)).unwrap();
        mesh.collapse(he);
        assert!(mesh.has_garbage());
        assert_eq!(mesh.vertex_slots(), 6);

        mesh.garbage_collection();
        assert!(!mesh.has_garbage());
        assert_eq!(mesh.vertex_slots(), 5);
        assert_eq!(mesh.edge_slots(), 9);
        assert_eq!(mesh.face_slots(), 6);
        assert!(mesh.is_valid());
        assert_eq!(mesh.vertex_prop(tag), &[0, 1, 2, 3, 5]);
        assert_eq!(*mesh.position(vid(4)), Point3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_collapse_to_minimal_closed_mesh() {
        let mut mesh = octahedron();
        while mesh.num_vertices() > 4 {
            let he = mesh
                .halfedge_ids()
                .find(|&he| mesh.is_collapse_ok(he))
                .unwrap();
            mesh.collapse(he);
            assert!(mesh.is_valid());
        }
        mesh.garbage_collection();
        assert_eq!(mesh.num_faces(), 4);
        assert_eq!(mesh.num_edges(), 6);
        assert!(mesh.vertex_ids().all(|v| !mesh.is_boundary_vertex(v)));
    }

    #[test]
    fn test_property_accessors() {
        let mut mesh = octahedron();
        let feature = mesh.edge_property("e:feature", false).unwrap();
        assert_eq!(mesh.edge_prop(feature).len(), 12);

        let same = mesh.get_edge_property::<bool>("e:feature").unwrap();
        assert_eq!(same, Some(feature));
        assert!(mesh.get_edge_property::<f64>("e:feature").is_err());

        mesh.remove_edge_property(feature);
        assert_eq!(mesh.get_edge_property::<bool>("e:feature").unwrap(), None);

        let cones = mesh.add_face_property("f:area", 0.0f64).unwrap();
        assert!(mesh.has_face_property(cones));
        assert!(mesh.add_face_property("f:area", 1.0f64).is_err());
    }
}
