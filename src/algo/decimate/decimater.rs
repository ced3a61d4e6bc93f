//! The greedy halfedge-collapse driver.

use std::ops::Deref;

use nalgebra::{Point3, Vector3};
use tracing::{debug, info, trace, warn};

use crate::algo::Progress;
use crate::error::{MeshError, Result};
use crate::geometry::{dist_point_triangle, triangle_aspect_ratio};
use crate::mesh::{
    EdgeProperty, FaceId, FaceProperty, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId,
    VertexProperty,
};

use super::collapse::CollapseData;
use super::heap::VertexHeap;
use super::normal_cone::NormalCone;
use super::quadric::Quadric;
use super::{SimplifyOptions, SimplifyStats, EDGE_FEATURE, SELECTED, VERTEX_FEATURE};

const QUADRICS: &str = "v:quadric";
const NORMAL_CONES: &str = "f:normal_cone";
const FACE_POINTS: &str = "f:points";

/// Moves a vertex for the lifetime of the guard and puts it back on drop.
struct TentativeMove<'m, I: MeshIndex> {
    mesh: &'m mut HalfEdgeMesh<I>,
    vertex: VertexId<I>,
    original: Point3<f64>,
}

impl<'m, I: MeshIndex> TentativeMove<'m, I> {
    fn new(mesh: &'m mut HalfEdgeMesh<I>, vertex: VertexId<I>, target: Point3<f64>) -> Self {
        let original = *mesh.position(vertex);
        mesh.set_position(vertex, target);
        Self {
            mesh,
            vertex,
            original,
        }
    }
}

impl<I: MeshIndex> Deref for TentativeMove<'_, I> {
    type Target = HalfEdgeMesh<I>;

    fn deref(&self) -> &HalfEdgeMesh<I> {
        self.mesh
    }
}

impl<I: MeshIndex> Drop for TentativeMove<'_, I> {
    fn drop(&mut self) {
        self.mesh.set_position(self.vertex, self.original);
    }
}

/// Per-vertex scheduling state of one `simplify` call.
struct Schedule<I: MeshIndex> {
    heap: VertexHeap<I>,
    targets: Vec<HalfEdgeId<I>>,
}

impl<I: MeshIndex> Schedule<I> {
    fn new(num_vertices: usize) -> Self {
        Self {
            heap: VertexHeap::with_capacity(num_vertices),
            targets: vec![HalfEdgeId::invalid(); num_vertices],
        }
    }
}

/// Greedy surface simplification by halfedge collapses.
///
/// The decimater borrows one triangle mesh for its whole lifetime and keeps
/// its error state (vertex quadrics, face normal cones, face sample points)
/// as properties on that mesh. All of them are detached again on drop.
///
/// Vertices are only ever removed; surviving vertices keep their position.
/// Each vertex is scheduled with its cheapest legal outgoing collapse, scored
/// by the summed quadric error of both endpoints at the surviving position.
///
/// Vertex selection (`"v:selected"`) and feature markers (`"v:feature"`
/// together with `"e:feature"`) are picked up from the mesh on
/// [`initialize`](Self::initialize).
///
/// # Example
///
/// ```
/// use whittle::prelude::*;
/// use whittle::algo::decimate::{Decimater, SimplifyOptions};
/// use nalgebra::Point3;
///
/// let mut vertices = Vec::new();
/// let mut faces = Vec::new();
/// for j in 0..5 {
///     for i in 0..5 {
///         vertices.push(Point3::new(i as f64, j as f64, 0.0));
///     }
/// }
/// for j in 0..4 {
///     for i in 0..4 {
///         let v = j * 5 + i;
///         faces.push([v, v + 1, v + 6]);
///         faces.push([v, v + 6, v + 5]);
///     }
/// }
/// let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
///
/// let mut decimater = Decimater::new(&mut mesh).unwrap();
/// decimater
///     .initialize(&SimplifyOptions::default().with_normal_deviation(5.0))
///     .unwrap();
/// let stats = decimater.simplify(12).unwrap();
/// assert!(stats.collapses > 0);
/// ```
pub struct Decimater<'a, I: MeshIndex = u32> {
    mesh: &'a mut HalfEdgeMesh<I>,
    options: SimplifyOptions,
    initialized: bool,

    /// Normal deviation bound in radians, zero when disabled.
    normal_deviation: f64,

    quadrics: VertexProperty<Quadric>,
    normal_cones: Option<FaceProperty<NormalCone>>,
    face_points: Option<FaceProperty<Vec<Point3<f64>>>>,

    selection: Option<VertexProperty<bool>>,
    features: Option<(VertexProperty<bool>, EdgeProperty<bool>)>,
}

impl<'a, I: MeshIndex> Decimater<'a, I> {
    /// Bind a decimater to `mesh` and attach its vertex quadrics.
    ///
    /// Fails if the mesh already carries a `"v:quadric"` property.
    pub fn new(mesh: &'a mut HalfEdgeMesh<I>) -> Result<Self> {
        let quadrics = mesh.add_vertex_property(QUADRICS, Quadric::zero())?;
        Ok(Self {
            mesh,
            options: SimplifyOptions::default(),
            initialized: false,
            normal_deviation: 0.0,
            quadrics,
            normal_cones: None,
            face_points: None,
            selection: None,
            features: None,
        })
    }

    /// The mesh being simplified.
    pub fn mesh(&self) -> &HalfEdgeMesh<I> {
        self.mesh
    }

    /// The options of the last successful [`initialize`](Self::initialize).
    pub fn options(&self) -> &SimplifyOptions {
        &self.options
    }

    /// Set up the error state and detect selection and feature markers.
    ///
    /// May be called again to change the bounds; quadrics, cones and sample
    /// points are then rebuilt from the current mesh.
    pub fn initialize(&mut self, options: &SimplifyOptions) -> Result<()> {
        options.validate()?;
        self.require_triangles()?;

        self.options = options.clone();
        self.normal_deviation = options.normal_deviation.to_radians();

        if self.normal_deviation > 0.0 {
            self.normal_cones = Some(
                self.mesh
                    .face_property(NORMAL_CONES, NormalCone::default())?,
            );
        } else if let Some(cones) = self.normal_cones.take() {
            self.mesh.remove_face_property(cones);
        }

        if options.hausdorff_error > 0.0 {
            self.face_points = Some(self.mesh.face_property(FACE_POINTS, Vec::new())?);
        } else if let Some(points) = self.face_points.take() {
            self.mesh.remove_face_property(points);
        }

        self.selection = self.detect_selection()?;
        self.features = self.detect_features()?;

        let mut normals = vec![Vector3::zeros(); self.mesh.face_slots()];
        for f in self.mesh.face_ids() {
            normals[f.index()] = self.mesh.face_normal(f);
        }

        let vertices: Vec<VertexId<I>> = self.mesh.vertex_ids().collect();
        for v in vertices {
            let p = *self.mesh.position(v);
            let q = self
                .mesh
                .vertex_faces(v)
                .fold(Quadric::zero(), |q, f| {
                    q + Quadric::from_point_normal(&normals[f.index()], &p)
                });
            self.mesh.vertex_prop_mut(self.quadrics)[v.index()] = q;
        }

        if let Some(cones) = self.normal_cones {
            let faces: Vec<FaceId<I>> = self.mesh.face_ids().collect();
            let values = self.mesh.face_prop_mut(cones);
            for f in faces {
                values[f.index()] = NormalCone::from_normal(normals[f.index()]);
            }
        }

        if let Some(points) = self.face_points {
            for samples in self.mesh.face_prop_mut(points) {
                *samples = Vec::new();
            }
        }

        debug!(
            aspect_ratio = options.aspect_ratio,
            edge_length = options.edge_length,
            max_valence = options.max_valence,
            normal_deviation = options.normal_deviation,
            hausdorff_error = options.hausdorff_error,
            selection = self.selection.is_some(),
            features = self.features.is_some(),
            "Decimater initialized"
        );

        self.initialized = true;
        Ok(())
    }

    /// Simplify the mesh down to `target_vertices` vertices.
    ///
    /// Stops early when no legal collapse remains. The mesh is compacted
    /// afterwards. Initializes with default options if needed.
    pub fn simplify(&mut self, target_vertices: usize) -> Result<SimplifyStats> {
        self.simplify_with_progress(target_vertices, &Progress::none())
    }

    /// Like [`simplify`](Self::simplify), reporting collapses to `progress`.
    pub fn simplify_with_progress(
        &mut self,
        target_vertices: usize,
        progress: &Progress,
    ) -> Result<SimplifyStats> {
        self.require_triangles()?;
        if !self.initialized {
            self.initialize(&SimplifyOptions::default())?;
        }

        let initial = self.mesh.num_vertices();
        let mut stats = SimplifyStats {
            initial_vertices: initial,
            final_vertices: initial,
            ..SimplifyStats::default()
        };

        info!(
            original = initial,
            target = target_vertices,
            "Starting simplification"
        );

        if target_vertices >= initial {
            self.mesh.garbage_collection();
            info!("Already at or below target");
            return Ok(stats);
        }

        let to_remove = initial - target_vertices;
        let batch = (to_remove / 100).max(1);

        let mut schedule = Schedule::new(self.mesh.vertex_slots());
        let vertices: Vec<VertexId<I>> = self.mesh.vertex_ids().collect();
        for v in vertices {
            schedule.heap.reset_position(v);
            self.enqueue_vertex(&mut schedule, v);
        }

        let mut nv = initial;
        while nv > target_vertices {
            let Some(v) = schedule.heap.pop_front() else {
                stats.queue_exhausted = true;
                break;
            };

            let h = schedule.targets[v.index()];
            if !h.is_valid() || !self.mesh.is_collapse_ok(h) {
                trace!(vertex = v.index(), "Skipping stale candidate");
                stats.stale_candidates += 1;
                continue;
            }

            let cd = CollapseData::new(self.mesh, h);
            let one_ring: Vec<VertexId<I>> = self.mesh.vertex_neighbors(cd.v0).collect();

            self.mesh.collapse(h);
            nv -= 1;
            stats.collapses += 1;

            self.postprocess_collapse(&cd);

            for vv in one_ring {
                self.enqueue_vertex(&mut schedule, vv);
            }

            if stats.collapses % batch == 0 {
                progress.report(stats.collapses, to_remove, "Collapsing edges");
            }
        }

        progress.report(to_remove, to_remove, "Collapsing edges");

        drop(schedule);
        self.mesh.garbage_collection();

        stats.final_vertices = self.mesh.num_vertices();
        info!(
            final_vertices = stats.final_vertices,
            collapses = stats.collapses,
            stale = stats.stale_candidates,
            exhausted = stats.queue_exhausted,
            "Simplification complete"
        );
        Ok(stats)
    }

    /// Current quadric error of a vertex at its own position.
    pub fn vertex_error(&self, v: VertexId<I>) -> f64 {
        self.mesh.vertex_prop(self.quadrics)[v.index()].evaluate(self.mesh.position(v))
    }

    /// Score of a collapse: the summed endpoint quadrics at the surviving position.
    pub fn priority(&self, cd: &CollapseData<I>) -> f64 {
        let quadrics = self.mesh.vertex_prop(self.quadrics);
        let q = quadrics[cd.v0.index()] + quadrics[cd.v1.index()];
        q.evaluate(self.mesh.position(cd.v1))
    }

    /// Check every configured constraint for collapsing `cd.v0v1`.
    ///
    /// Tests run in a fixed order and stop at the first violation. The mesh
    /// is left exactly as it was.
    pub fn is_collapse_legal(&mut self, cd: &CollapseData<I>) -> bool {
        let mesh = &mut *self.mesh;

        if let Some(selected) = self.selection {
            if !mesh.vertex_prop(selected)[cd.v0.index()] {
                return false;
            }
        }

        if let Some((vfeature, efeature)) = self.features {
            let efeature = mesh.edge_prop(efeature);
            if mesh.vertex_prop(vfeature)[cd.v0.index()] && !efeature[cd.v0v1.edge().index()] {
                return false;
            }
            if cd.vl.is_valid() && efeature[cd.vlv0.edge().index()] {
                return false;
            }
            if cd.vr.is_valid() && efeature[cd.v0vr.edge().index()] {
                return false;
            }
        }

        // Keep the boundary in place
        if mesh.is_boundary_vertex(cd.v0) && !mesh.is_boundary_vertex(cd.v1) {
            return false;
        }

        // At least two faces at v0
        if mesh.cw_rotated(mesh.cw_rotated(cd.v0v1)) == cd.v0v1 {
            return false;
        }

        if !mesh.is_collapse_ok(cd.v0v1) {
            return false;
        }

        let max_valence = self.options.max_valence;
        if max_valence > 0 {
            let val0 = mesh.valence(cd.v0);
            let val1 = mesh.valence(cd.v1);
            let mut val = val0 + val1 - 1;
            if cd.fl.is_valid() {
                val -= 1;
            }
            if cd.fr.is_valid() {
                val -= 1;
            }
            if val > max_valence && val >= val0.max(val1) {
                return false;
            }
        }

        let p1 = *mesh.position(cd.v1);

        let edge_length = self.options.edge_length;
        if edge_length > 0.0
            && mesh
                .vertex_neighbors(cd.v0)
                .filter(|&v| v != cd.v1 && v != cd.vl && v != cd.vr)
                .any(|v| (mesh.position(v) - p1).norm() > edge_length)
        {
            return false;
        }

        // Faces that survive the collapse and get reshaped by it
        let faces: Vec<FaceId<I>> = mesh
            .vertex_faces(cd.v0)
            .filter(|&f| f != cd.fl && f != cd.fr)
            .collect();

        if let Some(cones) = self.normal_cones {
            let fll = if cd.vl.is_valid() {
                mesh.face_of(mesh.twin(mesh.prev(cd.v0v1)))
            } else {
                FaceId::invalid()
            };
            let frr = if cd.vr.is_valid() {
                mesh.face_of(mesh.twin(mesh.next(cd.v1v0)))
            } else {
                FaceId::invalid()
            };

            let moved = TentativeMove::new(&mut *mesh, cd.v0, p1);
            let values = moved.face_prop(cones);
            for &f in &faces {
                let mut cone = values[f.index()];
                cone.merge_normal(&moved.face_normal(f));
                if f == fll {
                    cone.merge(&values[cd.fl.index()]);
                }
                if f == frr {
                    cone.merge(&values[cd.fr.index()]);
                }
                if cone.angle() > 0.5 * self.normal_deviation {
                    return false;
                }
            }
        } else {
            let before: Vec<Vector3<f64>> = faces.iter().map(|&f| mesh.face_normal(f)).collect();
            let moved = TentativeMove::new(&mut *mesh, cd.v0, p1);
            if faces
                .iter()
                .zip(&before)
                .any(|(&f, n0)| n0.dot(&moved.face_normal(f)) < 0.0)
            {
                return false;
            }
        }

        let aspect_ratio = self.options.aspect_ratio;
        if aspect_ratio > 0.0 {
            let worst = |m: &HalfEdgeMesh<I>| {
                faces
                    .iter()
                    .map(|&f| face_aspect_ratio(m, f))
                    .fold(0.0, f64::max)
            };
            let ar0 = worst(&*mesh);
            let ar1 = worst(&*TentativeMove::new(&mut *mesh, cd.v0, p1));
            if ar1 > aspect_ratio && ar1 > ar0 {
                return false;
            }
        }

        if let Some(face_points) = self.face_points {
            let bound = self.options.hausdorff_error;
            let samples = mesh.face_prop(face_points);
            let mut points: Vec<Point3<f64>> = mesh
                .vertex_faces(cd.v0)
                .flat_map(|f| samples[f.index()].iter().copied())
                .collect();
            points.push(*mesh.position(cd.v0));

            let moved = TentativeMove::new(&mut *mesh, cd.v0, p1);
            let all_close = points.iter().all(|p| {
                faces
                    .iter()
                    .any(|&f| face_distance(&*moved, f, p) < bound)
            });
            if !all_close {
                return false;
            }
        }

        true
    }

    fn require_triangles(&self) -> Result<()> {
        match self.mesh.first_non_triangle() {
            Some((f, sides)) => {
                warn!(face = f.index(), sides, "Not a triangle mesh");
                Err(MeshError::NotTriangleMesh {
                    face: f.index(),
                    sides,
                })
            }
            None => Ok(()),
        }
    }

    fn detect_selection(&self) -> Result<Option<VertexProperty<bool>>> {
        let Some(selected) = self.mesh.get_vertex_property::<bool>(SELECTED)? else {
            return Ok(None);
        };
        let values = self.mesh.vertex_prop(selected);
        let any = self.mesh.vertex_ids().any(|v| values[v.index()]);
        Ok(any.then_some(selected))
    }

    fn detect_features(&self) -> Result<Option<(VertexProperty<bool>, EdgeProperty<bool>)>> {
        let vfeature = self.mesh.get_vertex_property::<bool>(VERTEX_FEATURE)?;
        let efeature = self.mesh.get_edge_property::<bool>(EDGE_FEATURE)?;
        let (Some(vfeature), Some(efeature)) = (vfeature, efeature) else {
            return Ok(None);
        };
        let values = self.mesh.vertex_prop(vfeature);
        let any = self.mesh.vertex_ids().any(|v| values[v.index()]);
        Ok(any.then_some((vfeature, efeature)))
    }

    /// Find the cheapest legal collapse out of `v` and (re)schedule `v`.
    fn enqueue_vertex(&mut self, schedule: &mut Schedule<I>, v: VertexId<I>) {
        let mut best: Option<(f64, HalfEdgeId<I>)> = None;

        let outgoing: Vec<HalfEdgeId<I>> = self.mesh.vertex_halfedges(v).collect();
        for h in outgoing {
            let cd = CollapseData::new(self.mesh, h);
            if !self.is_collapse_legal(&cd) {
                continue;
            }
            let prio = self.priority(&cd);
            if prio.is_nan() {
                continue;
            }
            if best.map_or(true, |(min, _)| prio < min) {
                best = Some((prio, h));
            }
        }

        match best {
            Some((prio, h)) => {
                schedule.targets[v.index()] = h;
                schedule.heap.set(v, prio);
            }
            None => {
                schedule.targets[v.index()] = HalfEdgeId::invalid();
                schedule.heap.invalidate(v);
            }
        }
    }

    /// Update the error state around `cd.v1` after `cd.v0v1` was collapsed.
    fn postprocess_collapse(&mut self, cd: &CollapseData<I>) {
        let quadrics = self.mesh.vertex_prop_mut(self.quadrics);
        let q0 = quadrics[cd.v0.index()];
        quadrics[cd.v1.index()] += q0;

        let faces: Vec<FaceId<I>> = self.mesh.vertex_faces(cd.v1).collect();

        if let Some(cones) = self.normal_cones {
            for &f in &faces {
                let n = self.mesh.face_normal(f);
                self.mesh.face_prop_mut(cones)[f.index()].merge_normal(&n);
            }

            // The faces that took over the wings inherit their cones
            let mut inherit = |heir: HalfEdgeId<I>, retired: FaceId<I>| {
                let f = self.mesh.face_of(heir);
                if f.is_valid() {
                    let values = self.mesh.face_prop_mut(cones);
                    let old = values[retired.index()];
                    values[f.index()].merge(&old);
                }
            };
            if cd.vl.is_valid() {
                inherit(cd.v1vl, cd.fl);
            }
            if cd.vr.is_valid() {
                inherit(cd.vrv1, cd.fr);
            }
        }

        if let Some(face_points) = self.face_points {
            let removed = *self.mesh.position(cd.v0);

            let samples = self.mesh.face_prop_mut(face_points);
            let mut points = Vec::new();
            for &f in &faces {
                points.append(&mut samples[f.index()]);
            }
            for retired in [cd.fl, cd.fr] {
                if retired.is_valid() {
                    points.append(&mut samples[retired.index()]);
                    samples[retired.index()].shrink_to_fit();
                }
            }
            points.push(removed);

            // First face with the smallest distance wins
            let assignments: Vec<(FaceId<I>, Point3<f64>)> = points
                .into_iter()
                .filter_map(|p| {
                    let mut best: Option<(f64, FaceId<I>)> = None;
                    for &f in &faces {
                        let d = face_distance(self.mesh(), f, &p);
                        if best.map_or(true, |(dd, _)| d < dd) {
                            best = Some((d, f));
                        }
                    }
                    best.map(|(_, f)| (f, p))
                })
                .collect();

            let samples = self.mesh.face_prop_mut(face_points);
            for (f, p) in assignments {
                samples[f.index()].push(p);
            }
        }
    }
}

impl<I: MeshIndex> Drop for Decimater<'_, I> {
    fn drop(&mut self) {
        self.mesh.remove_vertex_property(self.quadrics);
        if let Some(cones) = self.normal_cones.take() {
            self.mesh.remove_face_property(cones);
        }
        if let Some(points) = self.face_points.take() {
            self.mesh.remove_face_property(points);
        }
    }
}

fn face_aspect_ratio<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, f: FaceId<I>) -> f64 {
    let [p0, p1, p2] = mesh.face_positions(f);
    triangle_aspect_ratio(p0, p1, p2)
}

fn face_distance<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, f: FaceId<I>, p: &Point3<f64>) -> f64 {
    let [p0, p1, p2] = mesh.face_positions(f);
    dist_point_triangle(*p, p0, p1, p2).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{build_from_polygons, build_from_triangles};

    fn icosahedron() -> HalfEdgeMesh {
        let t = (1.0 + 5.0_f64.sqrt()) / 2.0;
        let vertices = vec![
            Point3::new(-1.0, t, 0.0),
            Point3::new(1.0, t, 0.0),
            Point3::new(-1.0, -t, 0.0),
            Point3::new(1.0, -t, 0.0),
            Point3::new(0.0, -1.0, t),
            Point3::new(0.0, 1.0, t),
            Point3::new(0.0, -1.0, -t),
            Point3::new(0.0, 1.0, -t),
            Point3::new(t, 0.0, -1.0),
            Point3::new(t, 0.0, 1.0),
            Point3::new(-t, 0.0, -1.0),
            Point3::new(-t, 0.0, 1.0),
        ];
        let faces = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];
        build_from_triangles(&vertices, &faces).unwrap()
    }

    /// An `n` x `n` grid of unit cells, two triangles per cell, lifted by `height`.
    fn grid(n: usize, height: impl Fn(f64, f64) -> f64) -> HalfEdgeMesh {
        let mut vertices = Vec::new();
        let mut faces = Vec::new();

        for j in 0..=n {
            for i in 0..=n {
                let (x, y) = (i as f64, j as f64);
                vertices.push(Point3::new(x, y, height(x, y)));
            }
        }

        for j in 0..n {
            for i in 0..n {
                let v00 = j * (n + 1) + i;
                let v10 = v00 + 1;
                let v01 = v00 + n + 1;
                let v11 = v01 + 1;

                faces.push([v00, v10, v11]);
                faces.push([v00, v11, v01]);
            }
        }

        build_from_triangles(&vertices, &faces).unwrap()
    }

    fn flat(_: f64, _: f64) -> f64 {
        0.0
    }

    fn positions(mesh: &HalfEdgeMesh) -> Vec<Point3<f64>> {
        mesh.vertex_ids().map(|v| *mesh.position(v)).collect()
    }

    fn distance_to_mesh(mesh: &HalfEdgeMesh, p: &Point3<f64>) -> f64 {
        mesh.face_ids()
            .map(|f| face_distance(mesh, f, p))
            .fold(f64::INFINITY, f64::min)
    }

    fn halfedge(mesh: &HalfEdgeMesh, from: usize, to: usize) -> HalfEdgeId {
        mesh.find_halfedge(VertexId::new(from), VertexId::new(to))
            .unwrap()
    }

    #[test]
    fn test_icosahedron_to_six() {
        let mut mesh = icosahedron();
        let stats = simplify_default(&mut mesh, 6);

        assert_eq!(mesh.num_vertices(), 6);
        assert_eq!(stats.collapses, 6);
        assert!(!stats.queue_exhausted);
        assert!(mesh.is_valid());
        assert!(!mesh.has_garbage());
        assert!(mesh.is_triangle_mesh());
        // Closed: V - E + F = 2 and no boundary
        assert_eq!(mesh.num_faces(), 8);
        assert_eq!(mesh.num_edges(), 12);
        assert!(mesh.vertex_ids().all(|v| !mesh.is_boundary_vertex(v)));
    }

    fn simplify_default(mesh: &mut HalfEdgeMesh, target: usize) -> SimplifyStats {
        let mut decimater = Decimater::new(mesh).unwrap();
        decimater.simplify(target).unwrap()
    }

    #[test]
    fn test_target_not_below_count_is_noop() {
        let mut mesh = icosahedron();
        let before = positions(&mesh);

        let stats = simplify_default(&mut mesh, 12);
        assert_eq!(stats.collapses, 0);
        assert_eq!(positions(&mesh), before);
        assert_eq!(mesh.num_faces(), 20);

        let stats = simplify_default(&mut mesh, 100);
        assert_eq!(stats.collapses, 0);
        assert_eq!(stats.final_vertices, 12);
    }

    #[test]
    fn test_reuse_reduces_monotonically() {
        let mut mesh = icosahedron();
        let mut decimater = Decimater::new(&mut mesh).unwrap();
        decimater.initialize(&SimplifyOptions::default()).unwrap();

        let first = decimater.simplify(10).unwrap();
        assert_eq!(first.final_vertices, 10);
        let second = decimater.simplify(8).unwrap();
        assert_eq!(second.initial_vertices, 10);
        assert_eq!(second.final_vertices, 8);
        assert!(decimater.mesh().is_valid());
    }

    #[test]
    fn test_properties_detached_on_drop() {
        let mut mesh = icosahedron();
        {
            let mut decimater = Decimater::new(&mut mesh).unwrap();
            let options = SimplifyOptions::default()
                .with_normal_deviation(30.0)
                .with_hausdorff_error(0.5);
            decimater.initialize(&options).unwrap();
            decimater.simplify(9).unwrap();
        }
        assert_eq!(mesh.vertex_property_names().count(), 0);
        assert_eq!(mesh.get_face_property::<NormalCone>(NORMAL_CONES).unwrap(), None);
        assert!(mesh
            .get_face_property::<Vec<Point3<f64>>>(FACE_POINTS)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_rejects_polygon_mesh() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(2.0, 0.5, 0.0),
        ];
        let faces = vec![vec![0, 1, 2, 3], vec![1, 4, 2]];
        let mut mesh: HalfEdgeMesh = build_from_polygons(&vertices, &faces).unwrap();

        let result = Decimater::new(&mut mesh).unwrap().simplify(3);
        assert!(matches!(
            result,
            Err(MeshError::NotTriangleMesh { face: 0, sides: 4 })
        ));
        assert_eq!(mesh.num_vertices(), 5);
        assert_eq!(mesh.num_faces(), 2);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_invalid_options() {
        let mut mesh = icosahedron();
        let mut decimater = Decimater::new(&mut mesh).unwrap();
        let options = SimplifyOptions::default().with_edge_length(-1.0);
        assert!(matches!(
            decimater.initialize(&options),
            Err(MeshError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_edge_length_bound_exhausts_queue() {
        let mut mesh = grid(6, flat);
        let initial = mesh.num_vertices();

        let mut decimater = Decimater::new(&mut mesh).unwrap();
        decimater
            .initialize(&SimplifyOptions::default().with_edge_length(0.5))
            .unwrap();
        let stats = decimater.simplify(1).unwrap();
        drop(decimater);

        assert!(stats.queue_exhausted);
        assert_eq!(stats.collapses, 0);
        assert_eq!(mesh.num_vertices(), initial);
    }

    #[test]
    fn test_flat_grid_with_normal_deviation() {
        let mut mesh = grid(6, flat);
        let initial = mesh.num_vertices();

        let mut decimater = Decimater::new(&mut mesh).unwrap();
        decimater
            .initialize(&SimplifyOptions::default().with_normal_deviation(5.0))
            .unwrap();
        let stats = decimater.simplify(initial / 2).unwrap();
        drop(decimater);

        assert!(stats.collapses > 0);
        assert!(mesh.is_valid());
        // Still flat and facing up
        for f in mesh.face_ids() {
            assert!((mesh.face_normal(f) - Vector3::z()).norm() < 1e-9);
        }
    }

    #[test]
    fn test_tiny_normal_deviation_blocks_curved_surface() {
        let mut mesh = icosahedron();
        let mut decimater = Decimater::new(&mut mesh).unwrap();
        decimater
            .initialize(&SimplifyOptions::default().with_normal_deviation(1.0))
            .unwrap();
        let stats = decimater.simplify(6).unwrap();

        assert_eq!(stats.collapses, 0);
        assert!(stats.queue_exhausted);
    }

    #[test]
    fn test_boundary_stays_on_outline() {
        let mut mesh = grid(5, flat);

        let stats = simplify_default(&mut mesh, 4);
        assert!(stats.collapses > 0);
        assert!(mesh.is_valid());

        // Boundary vertices only collapse along the boundary and never move
        for v in mesh.vertex_ids().filter(|&v| mesh.is_boundary_vertex(v)) {
            let p = mesh.position(v);
            assert!(p.x == 0.0 || p.x == 5.0 || p.y == 0.0 || p.y == 5.0);
        }
    }

    #[test]
    fn test_hausdorff_bound() {
        let bump = |x: f64, y: f64| 0.3 * (x * 0.9).sin() * (y * 0.7).cos();
        let mut mesh = grid(8, bump);
        let original = positions(&mesh);
        let epsilon = 0.05;

        let mut decimater = Decimater::new(&mut mesh).unwrap();
        decimater
            .initialize(&SimplifyOptions::default().with_hausdorff_error(epsilon))
            .unwrap();
        let stats = decimater.simplify(1).unwrap();
        assert!(stats.collapses > 0);
        drop(decimater);

        for p in &original {
            assert!(distance_to_mesh(&mesh, p) < epsilon + 1e-9);
        }
    }

    #[test]
    fn test_selection_limits_removed_vertices() {
        let mut mesh = grid(6, flat);
        let selected = mesh.add_vertex_property(SELECTED, false).unwrap();
        let unselected: Vec<Point3<f64>> = {
            let mut keep = Vec::new();
            let ids: Vec<VertexId> = mesh.vertex_ids().collect();
            for v in ids {
                let p = *mesh.position(v);
                if p.x < 3.0 {
                    mesh.vertex_prop_mut(selected)[v.index()] = true;
                } else {
                    keep.push(p);
                }
            }
            keep
        };

        let stats = simplify_default(&mut mesh, 1);
        assert!(stats.collapses > 0);

        let remaining = positions(&mesh);
        for p in &unselected {
            assert!(remaining.contains(p));
        }
    }

    #[test]
    fn test_feature_constraints() {
        let mut mesh = grid(4, flat);
        let vfeature = mesh.add_vertex_property(VERTEX_FEATURE, false).unwrap();
        let efeature = mesh.add_edge_property(EDGE_FEATURE, false).unwrap();

        // Feature line along y = 2 (vertices 10..=14) with a spur from 12 to 18
        let mut edges: Vec<(usize, usize)> = (10..14).map(|i| (i, i + 1)).collect();
        edges.push((12, 18));
        for &(a, b) in &edges {
            mesh.vertex_prop_mut(vfeature)[a] = true;
            mesh.vertex_prop_mut(vfeature)[b] = true;
            let e = halfedge(&mesh, a, b).edge();
            mesh.edge_prop_mut(efeature)[e.index()] = true;
        }

        let mut decimater = Decimater::new(&mut mesh).unwrap();
        decimater.initialize(&SimplifyOptions::default()).unwrap();

        fn check(decimater: &mut Decimater, from: usize, to: usize) -> bool {
            let h = halfedge(decimater.mesh(), from, to);
            let cd = CollapseData::new(decimater.mesh(), h);
            decimater.is_collapse_legal(&cd)
        }

        // Feature vertex through a non-feature edge
        assert!(!check(&mut decimater, 12, 17));
        // Along the feature line
        assert!(check(&mut decimater, 12, 11));
        assert!(check(&mut decimater, 13, 12));
        // Along the line, but the wing edge 18 -> 12 is a feature too
        assert!(!check(&mut decimater, 12, 13));
        // Non-feature vertex next to the line
        assert!(check(&mut decimater, 7, 13));

        decimater.simplify(1).unwrap();
        drop(decimater);

        let remaining = positions(&mesh);
        assert!(remaining.contains(&Point3::new(0.0, 2.0, 0.0)));
        assert!(remaining.contains(&Point3::new(4.0, 2.0, 0.0)));
    }

    #[test]
    fn test_valence_and_aspect_ratio_bounds() {
        let mut mesh = grid(4, flat);
        let mut decimater = Decimater::new(&mut mesh).unwrap();

        // Interior vertices 6 and 7 both have valence 6; the estimate is
        // 6 + 6 - 1 minus one per wing face
        let h = halfedge(decimater.mesh(), 6, 7);

        decimater
            .initialize(&SimplifyOptions::default().with_max_valence(8))
            .unwrap();
        let cd = CollapseData::new(decimater.mesh(), h);
        assert!(!decimater.is_collapse_legal(&cd));

        decimater
            .initialize(&SimplifyOptions::default().with_max_valence(9))
            .unwrap();
        assert!(decimater.is_collapse_legal(&cd));

        decimater
            .initialize(&SimplifyOptions::default().with_aspect_ratio(1.5))
            .unwrap();
        assert!(!decimater.is_collapse_legal(&cd));
        assert_eq!(*decimater.mesh().position(VertexId::new(6)), Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_edge_length_ignores_both_wings() {
        // Closed fan around vertex 0; the right wing 5 is far from 1
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(-1.0, 0.5, 0.0),
            Point3::new(-1.0, -0.5, 0.0),
            Point3::new(0.5, -5.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [0, 2, 3], [0, 3, 4], [0, 4, 5], [0, 5, 1]];
        let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
        let mut decimater = Decimater::new(&mut mesh).unwrap();

        let h = halfedge(decimater.mesh(), 0, 1);
        let cd = CollapseData::new(decimater.mesh(), h);
        assert_eq!(cd.vl, VertexId::new(2));
        assert_eq!(cd.vr, VertexId::new(5));

        // Vertices 3 and 4 end up about 2.06 away from vertex 1
        decimater
            .initialize(&SimplifyOptions::default().with_edge_length(3.0))
            .unwrap();
        assert!(decimater.is_collapse_legal(&cd));

        decimater
            .initialize(&SimplifyOptions::default().with_edge_length(2.0))
            .unwrap();
        assert!(!decimater.is_collapse_legal(&cd));
    }

    #[test]
    fn test_collapse_widens_cones_and_wings_inherit() {
        let mut mesh = icosahedron();
        let mut decimater = Decimater::new(&mut mesh).unwrap();
        decimater
            .initialize(&SimplifyOptions::default().with_normal_deviation(170.0))
            .unwrap();
        let cones = decimater.normal_cones.unwrap();

        let h = halfedge(decimater.mesh(), 0, 5);
        let cd = CollapseData::new(decimater.mesh(), h);
        assert!(decimater.mesh().is_collapse_ok(h));

        let wide = 0.7;
        for f in [cd.fl, cd.fr] {
            let n = decimater.mesh().face_normal(f);
            decimater.mesh.face_prop_mut(cones)[f.index()] = NormalCone::new(n, wide);
        }
        let before = decimater.mesh().face_prop(cones).to_vec();

        decimater.mesh.collapse(h);
        decimater.postprocess_collapse(&cd);

        let mesh = decimater.mesh();
        let values = mesh.face_prop(cones);
        for (heir, retired) in [(cd.v1vl, cd.fl), (cd.vrv1, cd.fr)] {
            let f = mesh.face_of(heir);
            assert!(f.is_valid());
            assert!(!mesh.is_deleted_face(f));
            // The heir cone contains the whole retired cone
            let cone = &values[f.index()];
            let offset = cone.center().angle(before[retired.index()].center());
            assert!(offset + wide <= cone.angle() + 1e-9);
        }

        for f in mesh.vertex_faces(cd.v1) {
            let cone = &values[f.index()];
            assert!(cone.angle() >= before[f.index()].angle() - 1e-12);
            assert!(cone.center().angle(&mesh.face_normal(f)) <= cone.angle() + 1e-2);
        }
    }

    #[test]
    fn test_error_state_invariants_hold_while_simplifying() {
        let bump = |x: f64, y: f64| 0.4 * (x * 0.8).sin() * (y * 0.6).cos();
        let mut mesh = grid(8, bump);
        let bound = 0.2;

        let mut decimater = Decimater::new(&mut mesh).unwrap();
        decimater
            .initialize(
                &SimplifyOptions::default()
                    .with_normal_deviation(60.0)
                    .with_hausdorff_error(bound),
            )
            .unwrap();
        let cones = decimater.normal_cones.unwrap();
        let face_points = decimater.face_points.unwrap();

        fn errors(d: &Decimater) -> Vec<(Point3<f64>, f64)> {
            d.mesh()
                .vertex_ids()
                .map(|v| (*d.mesh().position(v), d.vertex_error(v)))
                .collect()
        }

        let mut previous = errors(&decimater);
        let mut collapses = 0;
        for target in [60, 40, 20] {
            let stats = decimater.simplify(target).unwrap();
            collapses += stats.collapses;

            let mesh = decimater.mesh();
            assert!(mesh.is_valid());

            // Surviving vertices never move, so positions identify them
            let current = errors(&decimater);
            for (p, error) in &current {
                let (_, old) = previous.iter().find(|(q, _)| q == p).unwrap();
                assert!(*error >= old - 1e-12 * (1.0 + old));
            }
            previous = current;

            let cone_values = mesh.face_prop(cones);
            let samples = mesh.face_prop(face_points);
            let mut num_samples = 0;
            for f in mesh.face_ids() {
                let cone = &cone_values[f.index()];
                assert!(cone.center().angle(&mesh.face_normal(f)) <= cone.angle() + 1e-2);
                assert!(cone.angle() <= 0.5 * 60.0_f64.to_radians() + 1e-9);

                for p in &samples[f.index()] {
                    assert!(face_distance(mesh, f, p) < bound);
                }
                num_samples += samples[f.index()].len();
            }
            assert_eq!(num_samples, collapses);
        }
        assert!(collapses > 0);
    }

    #[test]
    fn test_greedy_order_beats_worst_first() {
        fn total_error(decimater: &Decimater) -> f64 {
            decimater
                .mesh()
                .vertex_ids()
                .map(|v| decimater.vertex_error(v))
                .sum()
        }

        let mut greedy_mesh = icosahedron();
        let mut greedy = Decimater::new(&mut greedy_mesh).unwrap();
        greedy.initialize(&SimplifyOptions::default()).unwrap();
        assert_eq!(greedy.simplify(8).unwrap().collapses, 4);
        let greedy_error = total_error(&greedy);

        // Same number of collapses, always taking the most expensive legal one
        let mut mesh = icosahedron();
        let mut worst = Decimater::new(&mut mesh).unwrap();
        worst.initialize(&SimplifyOptions::default()).unwrap();
        for _ in 0..4 {
            let mut best: Option<(f64, CollapseData)> = None;
            let halfedges: Vec<HalfEdgeId> = worst.mesh().halfedge_ids().collect();
            for h in halfedges {
                let cd = CollapseData::new(worst.mesh(), h);
                if !worst.is_collapse_legal(&cd) {
                    continue;
                }
                let prio = worst.priority(&cd);
                if best.map_or(true, |(max, _)| prio > max) {
                    best = Some((prio, cd));
                }
            }
            let (_, cd) = best.unwrap();
            worst.mesh.collapse(cd.v0v1);
            worst.postprocess_collapse(&cd);
        }
        assert_eq!(worst.mesh().num_vertices(), 8);

        assert!(greedy_error < total_error(&worst));
    }

    #[test]
    fn test_priority_is_zero_on_plane() {
        let mut mesh = grid(3, flat);
        let mut decimater = Decimater::new(&mut mesh).unwrap();
        decimater.initialize(&SimplifyOptions::default()).unwrap();

        let h = halfedge(decimater.mesh(), 5, 6);
        let cd = CollapseData::new(decimater.mesh(), h);
        assert!(decimater.priority(&cd).abs() < 1e-12);
        assert!(decimater.vertex_error(VertexId::new(5)).abs() < 1e-12);
    }

    #[test]
    fn test_tentative_move_restores() {
        let mut mesh = grid(2, flat);
        let v = VertexId::new(4);
        {
            let moved = TentativeMove::new(&mut mesh, v, Point3::new(9.0, 9.0, 9.0));
            assert_eq!(*moved.position(v), Point3::new(9.0, 9.0, 9.0));
        }
        assert_eq!(*mesh.position(v), Point3::new(1.0, 1.0, 0.0));
    }
}
