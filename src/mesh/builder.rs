//! Mesh construction utilities.
//!
//! This module provides functions for building half-edge meshes from
//! face-vertex lists as commonly found in mesh file formats, and for
//! converting them back.

use std::collections::HashMap;

use nalgebra::Point3;

use super::halfedge::HalfEdgeMesh;
use super::index::{HalfEdgeId, MeshIndex, VertexId};
use crate::error::{MeshError, Result};

/// Build a half-edge mesh from vertices and triangle faces.
///
/// # Arguments
/// * `vertices` - List of vertex positions
/// * `faces` - List of triangle faces, each as [v0, v1, v2] indices
///
/// # Returns
/// A half-edge mesh, or an error if the input is invalid.
///
/// # Example
/// ```
/// use whittle::mesh::{build_from_triangles, HalfEdgeMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_faces(), 1);
/// ```
pub fn build_from_triangles<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<HalfEdgeMesh<I>> {
    build_from_polygons(vertices, faces)
}

/// Build a half-edge mesh from vertices and polygonal faces.
///
/// Faces are given as counter-clockwise vertex index loops of any length
/// of at least three. Every edge may be shared by at most two faces, which
/// must traverse it in opposite directions, and the faces around each
/// vertex must form a single fan.
pub fn build_from_polygons<I: MeshIndex, F: AsRef<[usize]>>(
    vertices: &[Point3<f64>],
    faces: &[F],
) -> Result<HalfEdgeMesh<I>> {
    if faces.is_empty() {
        return Err(MeshError::EmptyMesh);
    }

    for (fi, face) in faces.iter().enumerate() {
        let face = face.as_ref();
        if face.len() < 3 {
            return Err(MeshError::DegenerateFace { face: fi });
        }
        for (i, &vi) in face.iter().enumerate() {
            if vi >= vertices.len() {
                return Err(MeshError::InvalidVertexIndex { face: fi, vertex: vi });
            }
            if face[i + 1..].contains(&vi) {
                return Err(MeshError::DegenerateFace { face: fi });
            }
        }
    }

    let mut mesh = HalfEdgeMesh::with_capacity(vertices.len(), faces.len());

    let vertex_ids: Vec<VertexId<I>> = vertices
        .iter()
        .map(|&pos| mesh.add_vertex(pos))
        .collect();

    // Directed edge (v0, v1) to the half-edge running v0 -> v1
    let mut edge_map: HashMap<(usize, usize), HalfEdgeId<I>> = HashMap::new();

    for face in faces {
        let face = face.as_ref();
        let n = face.len();
        let mut loop_hes = Vec::with_capacity(n);

        for i in 0..n {
            let (a, b) = (face[i], face[(i + 1) % n]);
            let he = match edge_map.get(&(a, b)) {
                Some(&he) => {
                    // Already claimed by a face: a third face or a flipped neighbour.
                    if !mesh.is_boundary_halfedge(he) {
                        return Err(MeshError::NonManifoldEdge { v0: a, v1: b });
                    }
                    he
                }
                None => {
                    let he = mesh.new_edge(vertex_ids[a], vertex_ids[b]);
                    edge_map.insert((a, b), he);
                    edge_map.insert((b, a), he.pair());
                    he
                }
            };
            loop_hes.push(he);
        }

        let face_id = mesh.new_face(loop_hes[0]);
        for i in 0..n {
            let he = loop_hes[i];
            mesh.set_next(he, loop_hes[(i + 1) % n]);
            mesh.halfedge_mut(he).face = face_id;
            let origin = mesh.origin(he);
            mesh.vertex_mut(origin).halfedge = he;
        }
    }

    link_boundary_loops(&mut mesh)?;
    fix_boundary_vertex_halfedges(&mut mesh);
    check_vertex_fans(&mesh)?;

    Ok(mesh)
}

/// Link boundary half-edges into proper loops.
fn link_boundary_loops<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) -> Result<()> {
    let boundary_hes: Vec<HalfEdgeId<I>> = mesh
        .halfedge_ids()
        .filter(|&he| mesh.is_boundary_halfedge(he))
        .collect();

    // Group by origin vertex for quick lookup
    let mut outgoing: HashMap<usize, HalfEdgeId<I>> = HashMap::new();
    for &he in &boundary_hes {
        let origin = mesh.origin(he).index();
        if outgoing.insert(origin, he).is_some() {
            return Err(MeshError::NonManifold {
                details: format!("vertex {} lies on more than one boundary fan", origin),
            });
        }
    }

    for &he in &boundary_hes {
        // The next boundary half-edge starts where this one ends
        let dest = mesh.dest(he).index();
        if let Some(&next_he) = outgoing.get(&dest) {
            mesh.set_next(he, next_he);
        }
    }

    Ok(())
}

/// Ensure boundary vertices point to a boundary half-edge.
fn fix_boundary_vertex_halfedges<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) {
    for he in mesh.halfedge_ids().collect::<Vec<_>>() {
        if mesh.is_boundary_halfedge(he) {
            let origin = mesh.origin(he);
            mesh.vertex_mut(origin).halfedge = he;
        }
    }
}

/// Reject vertices whose faces form several disconnected fans.
fn check_vertex_fans<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Result<()> {
    let mut incident = vec![0usize; mesh.vertex_slots()];
    for (_, he) in mesh.halfedges() {
        incident[he.origin.index()] += 1;
    }

    for v in mesh.vertex_ids() {
        if mesh.vertex_halfedges(v).count() != incident[v.index()] {
            return Err(MeshError::NonManifold {
                details: format!("vertex {} is shared by disconnected fans", v.index()),
            });
        }
    }
    Ok(())
}

/// Map live vertices to consecutive output indices.
fn output_indices<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> (Vec<Point3<f64>>, Vec<usize>) {
    let mut map = vec![usize::MAX; mesh.vertex_slots()];
    let mut vertices = Vec::with_capacity(mesh.num_vertices());
    for (i, v) in mesh.vertex_ids().enumerate() {
        map[v.index()] = i;
        vertices.push(*mesh.position(v));
    }
    (vertices, map)
}

/// Convert a half-edge mesh back to a triangle face-vertex representation.
///
/// Polygonal faces are fan-triangulated. Deleted elements are skipped and the
/// live vertices are numbered consecutively.
///
/// Returns (vertices, faces) tuple.
pub fn to_face_vertex<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let (vertices, polygons) = to_face_vertex_polygons(mesh);

    let faces = polygons
        .iter()
        .flat_map(|poly| (1..poly.len() - 1).map(move |i| [poly[0], poly[i], poly[i + 1]]))
        .collect();

    (vertices, faces)
}

/// Convert a half-edge mesh back to a polygonal face-vertex representation.
pub fn to_face_vertex_polygons<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
) -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
    let (vertices, map) = output_indices(mesh);

    let faces = mesh
        .face_ids()
        .map(|f| mesh.face_vertices(f).map(|v| map[v.index()]).collect())
        .collect();

    (vertices, faces)
}
