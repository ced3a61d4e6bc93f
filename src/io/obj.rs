//! Wavefront OBJ format support.
//!
//! Only geometry is read: `v` positions and `f` faces. Texture coordinates,
//! normals, groups and materials are skipped. Faces keep their polygon size.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;

use crate::error::{MeshError, Result};
use crate::mesh::{build_from_polygons, to_face_vertex_polygons, HalfEdgeMesh, MeshIndex};

/// Load a mesh from an OBJ file.
///
/// # Example
///
/// ```no_run
/// use whittle::io::obj;
/// use whittle::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = obj::load("model.obj").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let (vertices, faces) = parse(reader).map_err(|message| MeshError::load(path, message))?;
    if faces.is_empty() {
        return Err(MeshError::load(path, "OBJ file contains no faces"));
    }

    build_from_polygons(&vertices, &faces)
}

/// Save a mesh to an OBJ file.
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write(mesh, &mut writer)?;
    writer.flush()?;
    Ok(())
}

type Polygons = (Vec<Point3<f64>>, Vec<Vec<usize>>);

fn parse<R: BufRead>(reader: R) -> std::result::Result<Polygons, String> {
    let mut vertices = Vec::new();
    let mut faces = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| e.to_string())?;
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            Some("v") => {
                let mut coords = [0.0; 3];
                for c in &mut coords {
                    *c = tokens
                        .next()
                        .and_then(|t| t.parse::<f64>().ok())
                        .ok_or_else(|| format!("line {}: malformed vertex", line_no + 1))?;
                }
                vertices.push(Point3::new(coords[0], coords[1], coords[2]));
            }
            Some("f") => {
                let face = tokens
                    .map(|t| resolve_index(t, vertices.len()))
                    .collect::<Option<Vec<usize>>>()
                    .ok_or_else(|| format!("line {}: malformed face", line_no + 1))?;
                faces.push(face);
            }
            _ => {}
        }
    }

    Ok((vertices, faces))
}

/// Resolve a face corner like `7`, `7/1`, `7//3` or `-1` to a 0-based index.
fn resolve_index(token: &str, num_vertices: usize) -> Option<usize> {
    let index: i64 = token.split('/').next()?.parse().ok()?;
    match index {
        i if i > 0 => Some(i as usize - 1),
        i if i < 0 => num_vertices.checked_sub(i.unsigned_abs() as usize),
        _ => None,
    }
}

fn write<W: Write, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, writer: &mut W) -> Result<()> {
    let (vertices, faces) = to_face_vertex_polygons(mesh);

    writeln!(writer, "# whittle")?;
    for v in &vertices {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for face in &faces {
        write!(writer, "f")?;
        for &i in face {
            write!(writer, " {}", i + 1)?;
        }
        writeln!(writer)?;
    }

    Ok(())
}
