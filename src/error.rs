//! Error types for whittle.
//!
//! This module defines all error types used throughout the library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur during mesh operations.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has fewer than three corners or repeats a vertex.
    #[error("face {face} is degenerate (fewer than three distinct vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// The mesh has non-manifold topology.
    #[error("mesh has non-manifold topology: {details}")]
    NonManifold {
        /// Description of the non-manifold condition.
        details: String,
    },

    /// An edge has more than two incident faces, or two faces traverse it
    /// in the same direction.
    #[error("edge ({v0}, {v1}) has more than two incident faces")]
    NonManifoldEdge {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// The operation requires a pure triangle mesh.
    #[error("not a triangle mesh: face {face} has {sides} sides")]
    NotTriangleMesh {
        /// The first offending face.
        face: usize,
        /// Number of sides of that face.
        sides: usize,
    },

    /// A property with this name is already attached.
    #[error("property '{name}' already exists")]
    DuplicateProperty {
        /// The property name.
        name: String,
    },

    /// A property exists under this name but stores another type.
    #[error("property '{name}' exists with a different value type")]
    PropertyTypeMismatch {
        /// The property name.
        name: String,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading mesh from file.
    #[error("failed to load mesh from {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving mesh to file.
    #[error("failed to save mesh to {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a load error for `path`.
    pub fn load<P: Into<PathBuf>, M: Into<String>>(path: P, message: M) -> Self {
        MeshError::LoadError {
            path: path.into(),
            message: message.into(),
        }
    }
}
