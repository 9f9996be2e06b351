use std::path::PathBuf;

use thiserror::Error;

use crate::datatypes::Dim;

/// Errors raised while building, merging, or annotating meshes.
#[derive(Debug, Error)]
pub enum ShellmeshError {
    #[error("geometry is empty: no vertices to bound")]
    EmptyGeometry,

    #[error("invalid scale factor {factor}: must be finite and greater than {minimum}")]
    InvalidScale { factor: f64, minimum: f64 },

    #[error("expected {expected} shell resolution vector(s), found {found}")]
    ResolutionCountMismatch { expected: usize, found: usize },

    #[error("unknown {dim} domain with id {id}")]
    UnknownDomain { dim: Dim, id: u32 },

    #[error("{dim} domain {id} is already registered as '{existing}', refusing to rename it to '{requested}'")]
    DuplicateDomain {
        dim: Dim,
        id: u32,
        existing: String,
        requested: String,
    },

    #[error("{dim} domain {id} is defined as both '{left}' and '{right}'")]
    DomainIdCollision {
        dim: Dim,
        id: u32,
        left: String,
        right: String,
    },

    #[error("no unused {dim} domain id left")]
    DomainIdsExhausted { dim: Dim },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("invalid element: {0}")]
    InvalidElement(String),

    #[error("vertex index {index} out of range for {len} vertices")]
    VertexOutOfRange { index: usize, len: usize },

    #[error("inconsistent mesh: {0}")]
    InconsistentMesh(String),

    #[error("file format error: {0}")]
    FileFormat(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to write XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellmeshError {
    pub fn invalid_parameter(details: impl Into<String>) -> Self {
        Self::InvalidParameter(details.into())
    }

    pub fn file_format(details: impl Into<String>) -> Self {
        Self::FileFormat(details.into())
    }

    pub fn config(details: impl Into<String>) -> Self {
        Self::Config(details.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ShellmeshError>;
