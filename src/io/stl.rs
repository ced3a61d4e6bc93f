//! STL (stereolithography) format support.
//!
//! STL stores a triangle soup. Loading welds identical positions (done by
//! `stl_io`) and drops triangles that collapse under welding. Saving always
//! writes binary STL; polygonal faces are fan-triangulated.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};

use crate::error::{MeshError, Result};
use crate::mesh::{build_from_triangles, to_face_vertex, HalfEdgeMesh, MeshIndex};

/// Load a mesh from an STL file.
///
/// Automatically detects binary vs ASCII format.
///
/// # Example
///
/// ```no_run
/// use whittle::io::stl;
/// use whittle::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = stl::load("model.stl").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let mut file = File::open(path)?;

    let (vertices, faces) =
        read_triangles(&mut file).map_err(|e| MeshError::load(path, e.to_string()))?;
    if faces.is_empty() {
        return Err(MeshError::load(path, "STL file contains no valid triangles"));
    }

    build_from_triangles(&vertices, &faces)
}

/// Save a mesh to a binary STL file.
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);

    write_triangles(mesh, &mut writer).map_err(|e| MeshError::SaveError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    writer.flush()?;

    Ok(())
}

type Triangles = (Vec<Point3<f64>>, Vec<[usize; 3]>);

fn read_triangles<R: Read + Seek>(reader: &mut R) -> std::io::Result<Triangles> {
    let stl = stl_io::read_stl(reader)?;

    let vertices = stl
        .vertices
        .iter()
        .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect();

    let faces = stl
        .faces
        .iter()
        .map(|tri| tri.vertices)
        .filter(|[i0, i1, i2]| i0 != i1 && i1 != i2 && i0 != i2)
        .collect();

    Ok((vertices, faces))
}

fn write_triangles<W: Write, I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    writer: &mut W,
) -> std::io::Result<()> {
    let (vertices, faces) = to_face_vertex(mesh);

    let vertex = |p: &Point3<f64>| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]);

    let triangles: Vec<stl_io::Triangle> = faces
        .iter()
        .map(|&[i0, i1, i2]| {
            let (p0, p1, p2) = (&vertices[i0], &vertices[i1], &vertices[i2]);
            let n = (p1 - p0)
                .cross(&(p2 - p0))
                .try_normalize(0.0)
                .unwrap_or_else(Vector3::zeros);

            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [vertex(p0), vertex(p1), vertex(p2)],
            }
        })
        .collect();

    stl_io::write_stl(writer, triangles.iter())
}
