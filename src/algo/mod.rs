//! Mesh processing algorithms.
//!
//! - **Decimation**: greedy halfedge-collapse simplification under quadric,
//!   shape, normal and Hausdorff error bounds

pub mod decimate;
mod progress;

pub use progress::Progress;
