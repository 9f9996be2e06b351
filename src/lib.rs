//! Structured hexahedral shell meshes around finite samples.
//!
//! A [`mesher::Mesher`] takes a sample mesh, encloses its bounding box in
//! concentric cuboid layers of coarsening structured grids, and stitches
//! every layer onto its neighbour so the combined mesh has no hanging nodes.
//! Each layer becomes a named cell domain next to the sample's own domains.

pub mod cli;
pub mod config;
pub mod datatypes;
pub mod dolfin;
pub mod domains;
pub mod error;
pub mod geometry;
pub mod gmsh;
pub mod io;
pub mod mesh;
pub mod mesher;

pub use error::{Result, ShellmeshError};
