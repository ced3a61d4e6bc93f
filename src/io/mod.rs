//! Mesh file I/O.
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | Wavefront OBJ | `.obj` | ✓ | ✓ | Polygons kept |
//! | OFF | `.off` | ✓ | ✓ | Polygons kept |
//! | STL | `.stl` | ✓ | ✓ | Binary and ASCII load, binary save |
//! | PLY | `.ply` | ✓ | ✓ | Polygons kept, ASCII save |
//!
//! # Usage
//!
//! ```no_run
//! use whittle::io::{load, save};
//! use whittle::mesh::HalfEdgeMesh;
//!
//! // Load with automatic format detection
//! let mesh: HalfEdgeMesh = load("model.obj").unwrap();
//!
//! // Save with automatic format detection
//! save(&mesh, "output.off").unwrap();
//! ```

pub mod obj;
pub mod off;
pub mod ply;
pub mod stl;

use std::path::Path;

use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeMesh, MeshIndex};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Wavefront OBJ format.
    Obj,
    /// Object File Format.
    Off,
    /// STL (stereolithography) format.
    Stl,
    /// PLY (Stanford polygon) format.
    Ply,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "obj" => Some(Format::Obj),
            "off" => Some(Format::Off),
            "stl" => Some(Format::Stl),
            "ply" => Some(Format::Ply),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }
}

fn detect(path: &Path) -> Result<Format> {
    Format::from_path(path).ok_or_else(|| MeshError::UnsupportedFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    })
}

/// Load a mesh from a file with automatic format detection.
///
/// The format is determined by the file extension.
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Obj => obj::load(path),
        Format::Off => off::load(path),
        Format::Stl => stl::load(path),
        Format::Ply => ply::load(path),
    }
}

/// Save a mesh to a file with automatic format detection.
///
/// The format is determined by the file extension.
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Obj => obj::save(mesh, path),
        Format::Off => off::save(mesh, path),
        Format::Stl => stl::save(mesh, path),
        Format::Ply => ply::save(mesh, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::from_path("a/b/model.OBJ"), Some(Format::Obj));
        assert_eq!(Format::from_path("mesh.off"), Some(Format::Off));
        assert_eq!(Format::from_path("part.stl"), Some(Format::Stl));
        assert_eq!(Format::from_path("scan.ply"), Some(Format::Ply));
        assert_eq!(Format::from_path("scene.glb"), None);
        assert_eq!(Format::from_path("noext"), None);
    }

    #[test]
    fn test_unsupported_extension() {
        let result: Result<HalfEdgeMesh> = load("scene.gltf");
        assert!(matches!(
            result,
            Err(MeshError::UnsupportedFormat { extension }) if extension == "gltf"
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        use nalgebra::Point3;

        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mesh: HalfEdgeMesh =
            crate::mesh::build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();

        let dir = std::env::temp_dir().join(format!("whittle-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        for name in ["tri.obj", "tri.off", "tri.stl", "tri.ply"] {
            let path = dir.join(name);
            save(&mesh, &path).unwrap();
            let loaded: HalfEdgeMesh = load(&path).unwrap();
            assert_eq!(loaded.num_vertices(), 3, "{name}");
            assert_eq!(loaded.num_faces(), 1, "{name}");
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
