//! Local topology around a candidate halfedge collapse.

use crate::mesh::{FaceId, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Snapshot of the neighbourhood of the half-edge `v0 -> v1`.
///
/// ```text
///            vl
///           /  \
///    vlv0  / fl \  v1vl
///         /      \
///       v0 ------> v1
///         \      /
///    v0vr  \ fr /  vrv1
///           \  /
///            vr
/// ```
///
/// Collapsing removes `v0` and keeps `v1`. The wing vertex and its two
/// half-edges are only set when the corresponding face exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapseData<I: MeshIndex = u32> {
    /// The half-edge to collapse.
    pub v0v1: HalfEdgeId<I>,
    /// Its twin.
    pub v1v0: HalfEdgeId<I>,
    /// The removed vertex.
    pub v0: VertexId<I>,
    /// The surviving vertex.
    pub v1: VertexId<I>,
    /// Face left of `v0v1`, invalid on a boundary.
    pub fl: FaceId<I>,
    /// Face right of `v0v1`, invalid on a boundary.
    pub fr: FaceId<I>,
    /// Apex of `fl`.
    pub vl: VertexId<I>,
    /// Apex of `fr`.
    pub vr: VertexId<I>,
    /// `v1 -> vl` inside `fl`.
    pub v1vl: HalfEdgeId<I>,
    /// `vl -> v0` inside `fl`.
    pub vlv0: HalfEdgeId<I>,
    /// `v0 -> vr` inside `fr`.
    pub v0vr: HalfEdgeId<I>,
    /// `vr -> v1` inside `fr`.
    pub vrv1: HalfEdgeId<I>,
}

impl<I: MeshIndex> CollapseData<I> {
    /// Gather the neighbourhood of `h` in a triangle mesh.
    pub fn new(mesh: &HalfEdgeMesh<I>, h: HalfEdgeId<I>) -> Self {
        let v0v1 = h;
        let v1v0 = mesh.twin(v0v1);

        let mut cd = Self {
            v0v1,
            v1v0,
            v0: mesh.origin(v0v1),
            v1: mesh.dest(v0v1),
            fl: mesh.face_of(v0v1),
            fr: mesh.face_of(v1v0),
            vl: VertexId::invalid(),
            vr: VertexId::invalid(),
            v1vl: HalfEdgeId::invalid(),
            vlv0: HalfEdgeId::invalid(),
            v0vr: HalfEdgeId::invalid(),
            vrv1: HalfEdgeId::invalid(),
        };

        if cd.fl.is_valid() {
            cd.v1vl = mesh.next(v0v1);
            cd.vlv0 = mesh.next(cd.v1vl);
            cd.vl = mesh.dest(cd.v1vl);
        }

        if cd.fr.is_valid() {
            cd.v0vr = mesh.next(v1v0);
            cd.vrv1 = mesh.prev(v1v0);
            cd.vr = mesh.origin(cd.vrv1);
        }

        cd
    }
}
