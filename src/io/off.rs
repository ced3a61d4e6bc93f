//! Object File Format (OFF) support.
//!
//! Plain ASCII OFF: an `OFF` header, the element counts, one position per
//! vertex line and one `n i0 .. in-1` polygon per face line. Extra values
//! after a vertex or face (colors, normals) are ignored. `#` starts a comment.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;

use crate::error::{MeshError, Result};
use crate::mesh::{build_from_polygons, to_face_vertex_polygons, HalfEdgeMesh, MeshIndex};

/// Load a mesh from an OFF file.
///
/// # Example
///
/// ```no_run
/// use whittle::io::off;
/// use whittle::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = off::load("model.off").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let (vertices, faces) = parse(reader).map_err(|message| MeshError::load(path, message))?;
    if faces.is_empty() {
        return Err(MeshError::load(path, "OFF file contains no faces"));
    }

    build_from_polygons(&vertices, &faces)
}

/// Save a mesh to an OFF file.
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write(mesh, &mut writer)?;
    writer.flush()?;
    Ok(())
}

type Polygons = (Vec<Point3<f64>>, Vec<Vec<usize>>);

fn parse<R: BufRead>(reader: R) -> std::result::Result<Polygons, String> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| e.to_string())?;
        let content = line.split('#').next().unwrap_or("").trim().to_string();
        if !content.is_empty() {
            lines.push(content);
        }
    }
    let mut lines = lines.into_iter();

    let header = lines.next().ok_or("empty file")?;
    let keyword = header.split_whitespace().next().unwrap_or("");
    if !keyword.ends_with("OFF") {
        return Err(format!("expected OFF header, found `{keyword}`"));
    }
    if keyword != "OFF" {
        return Err(format!("unsupported OFF variant `{keyword}`"));
    }

    // Counts may follow the keyword on the header line
    let inline_counts: Vec<&str> = header.split_whitespace().skip(1).collect();
    let counts_line = if inline_counts.is_empty() {
        lines.next().ok_or("missing element counts")?
    } else {
        inline_counts.join(" ")
    };
    let counts = parse_numbers::<usize>(&counts_line).ok_or("malformed element counts")?;
    let (num_vertices, num_faces) = match counts[..] {
        [nv, nf, ..] => (nv, nf),
        _ => return Err("malformed element counts".to_string()),
    };

    let mut vertices = Vec::with_capacity(num_vertices);
    for i in 0..num_vertices {
        let line = lines.next().ok_or("unexpected end of vertices")?;
        let coords = parse_numbers::<f64>(&line)
            .filter(|c| c.len() >= 3)
            .ok_or_else(|| format!("malformed vertex {i}"))?;
        vertices.push(Point3::new(coords[0], coords[1], coords[2]));
    }

    let mut faces = Vec::with_capacity(num_faces);
    for i in 0..num_faces {
        let line = lines.next().ok_or("unexpected end of faces")?;
        let mut tokens = line.split_whitespace();
        let n: usize = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| format!("malformed face {i}"))?;
        let face = tokens
            .take(n)
            .map(|t| t.parse::<usize>().ok())
            .collect::<Option<Vec<usize>>>()
            .filter(|f| f.len() == n)
            .ok_or_else(|| format!("malformed face {i}"))?;
        faces.push(face);
    }

    Ok((vertices, faces))
}

fn parse_numbers<T: std::str::FromStr>(line: &str) -> Option<Vec<T>> {
    line.split_whitespace().map(|t| t.parse().ok()).collect()
}

fn write<W: Write, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, writer: &mut W) -> Result<()> {
    let (vertices, faces) = to_face_vertex_polygons(mesh);

    writeln!(writer, "OFF")?;
    writeln!(writer, "{} {} 0", vertices.len(), faces.len())?;
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
