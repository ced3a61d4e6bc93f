//! PLY (Stanford polygon) format support.
//!
//! Reading accepts ASCII and binary PLY through `ply-rs`; only vertex
//! positions and the face index lists are used. Writing produces ASCII PLY.
//! Faces keep their polygon size.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};

use crate::error::{MeshError, Result};
use crate::mesh::{build_from_polygons, to_face_vertex_polygons, HalfEdgeMesh, MeshIndex};

/// Load a mesh from a PLY file.
///
/// # Example
///
/// ```no_run
/// use whittle::io::ply;
/// use whittle::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = ply::load("model.ply").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);

    let (vertices, faces) = parse(&mut reader).map_err(|message| MeshError::load(path, message))?;
    if faces.is_empty() {
        return Err(MeshError::load(path, "PLY file contains no faces"));
    }

    build_from_polygons(&vertices, &faces)
}

/// Save a mesh to a PLY file (ASCII format).
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write(mesh, &mut writer)?;
    writer.flush()?;
    Ok(())
}

type Polygons = (Vec<Point3<f64>>, Vec<Vec<usize>>);

fn parse<R: BufRead>(reader: &mut R) -> std::result::Result<Polygons, String> {
    let parser = Parser::<DefaultElement>::new();
    let ply = parser.read_ply(reader).map_err(|e| e.to_string())?;

    let vertex_element = ply
        .payload
        .get("vertex")
        .ok_or("PLY file has no vertex element")?;

    let mut vertices = Vec::with_capacity(vertex_element.len());
    for vertex in vertex_element {
        let coord = |name: &str| {
            float_property(vertex, name).ok_or_else(|| format!("vertex missing {name} coordinate"))
        };
        vertices.push(Point3::new(coord("x")?, coord("y")?, coord("z")?));
    }

    let Some(face_element) = ply.payload.get("face") else {
        return Ok((vertices, Vec::new()));
    };

    let faces = face_element
        .iter()
        .map(|face| {
            list_property(face, "vertex_indices")
                .or_else(|| list_property(face, "vertex_index"))
                .ok_or_else(|| "face missing vertex_indices property".to_string())
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((vertices, faces))
}

fn float_property(element: &DefaultElement, name: &str) -> Option<f64> {
    match element.get(name)? {
        Property::Float(v) => Some(*v as f64),
        Property::Double(v) => Some(*v),
        Property::Int(v) => Some(*v as f64),
        Property::UInt(v) => Some(*v as f64),
        Property::Short(v) => Some(*v as f64),
        Property::UShort(v) => Some(*v as f64),
        Property::Char(v) => Some(*v as f64),
        Property::UChar(v) => Some(*v as f64),
        _ => None,
    }
}

fn list_property(element: &DefaultElement, name: &str) -> Option<Vec<usize>> {
    match element.get(name)? {
        Property::ListInt(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUInt(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListShort(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUShort(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListChar(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUChar(v) => Some(v.iter().map(|&x| x as usize).collect()),
        _ => None,
    }
}

fn write<W: Write, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, writer: &mut W) -> Result<()> {
    let (vertices, faces) = to_face_vertex_polygons(mesh);

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "comment whittle")?;
    writeln!(writer, "element vertex {}", vertices.len())?;
    writeln!(writer, "property double x")?;
    writeln!(writer, "property double y")?;
    writeln!(writer, "property double z")?;
    writeln!(writer, "element face {}", faces.len())?;
    writeln!(writer, "property list uchar int vertex_indices")?;
    writeln!(writer, "end_header")?;

    for v in &vertices {
        writeln!(writer, "{} {} {}", v.x, v.y, v.z)?;
    }

    for face in &faces {
        write!(writer, "{}", face.len())?;
        for &i in face {
            write!(writer, " {i}")?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_parse() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.25),
            Point3::new(2.0, 0.5, 0.0),
        ];
        let faces = vec![vec![0, 1, 2, 3], vec![1, 4, 2]];
        let mesh: HalfEdgeMesh = build_from_polygons(&vertices, &faces).unwrap();

        let mut out = Vec::new();
        write(&mesh, &mut out).unwrap();

        let (read_vertices, read_faces) = parse(&mut out.as_slice()).unwrap();
        assert_eq!(read_vertices, vertices);
        assert_eq!(read_faces.len(), 2);
        assert_eq!(read_faces[0].len(), 4);
        assert_eq!(read_faces[1].len(), 3);
    }

    #[test]
    fn test_missing_coordinate() {
        let text = "\
ply
format ascii 1.0
element vertex 1
property float x
property float y
end_header
0 0
";
        let err = parse(&mut text.as_bytes()).unwrap_err();
        assert!(err.contains("z coordinate"));
    }
}
