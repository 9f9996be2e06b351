use std::fmt::Display;

use nalgebra::Point3;

use crate::error::{Result, ShellmeshError};

pub type Vertex = Point3<f64>;

/// Topological dimension of a tagged entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dim {
    Facet,
    Cell,
}

impl Dim {
    pub fn as_u8(self) -> u8 {
        match self {
            Dim::Facet => 2,
            Dim::Cell => 3,
        }
    }

    pub fn from_u8(dim: u8) -> Result<Dim> {
        match dim {
            2 => Ok(Dim::Facet),
            3 => Ok(Dim::Cell),
            other => Err(ShellmeshError::invalid_parameter(format!(
                "domain dimension must be 2 or 3, got {other}"
            ))),
        }
    }
}

impl Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dim::Facet => "facet",
            Dim::Cell => "cell",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainKey {
    pub dim: Dim,
    pub id: u32,
}

impl DomainKey {
    pub fn new(dim: Dim, id: u32) -> DomainKey {
        DomainKey { dim, id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Triangle,
    Quadrilateral,
    Tetrahedron,
    /// Gmsh node order: z-min face counter-clockwise, then the z-max face.
    Hexahedron,
    Prism,
    Pyramid,
}

impl ElementKind {
    pub fn dim(self) -> Dim {
        match self {
            ElementKind::Triangle | ElementKind::Quadrilateral => Dim::Facet,
            _ => Dim::Cell,
        }
    }

    pub fn node_count(self) -> usize {
        match self {
            ElementKind::Triangle => 3,
            ElementKind::Quadrilateral => 4,
            ElementKind::Tetrahedron => 4,
            ElementKind::Hexahedron => 8,
            ElementKind::Prism => 6,
            ElementKind::Pyramid => 5,
        }
    }
}

/// A cell or facet referencing vertices by index
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    pub nodes: Vec<usize>,
}

impl Element {
    pub fn new(kind: ElementKind, nodes: Vec<usize>) -> Element {
        Element { kind, nodes }
    }

    pub fn hexahedron(nodes: [usize; 8]) -> Element {
        Element::new(ElementKind::Hexahedron, nodes.to_vec())
    }

    pub fn quadrilateral(nodes: [usize; 4]) -> Element {
        Element::new(ElementKind::Quadrilateral, nodes.to_vec())
    }

    pub fn dim(&self) -> Dim {
        self.kind.dim()
    }

    /// Arithmetic mean of the element's vertices
    pub fn centroid(&self, vertices: &[Vertex]) -> Vertex {
        let sum = self
            .nodes
            .iter()
            .fold(nalgebra::Vector3::zeros(), |acc, &n| acc + vertices[n].coords);
        Point3::from(sum / self.nodes.len() as f64)
    }
}

/// Number of structured cells along X, Y and Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Resolution {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Result<Resolution> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(ShellmeshError::invalid_parameter(format!(
                "resolution {nx}x{ny}x{nz} must be positive on every axis"
            )));
        }
        Ok(Resolution { nx, ny, nz })
    }

    pub fn axis(&self, axis: usize) -> usize {
        match axis {
            0 => self.nx,
            1 => self.ny,
            _ => self.nz,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.nx, self.ny, self.nz)
    }
}

/// Per-layer shell resolutions, either broadcast or listed explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolutions {
    Uniform(Resolution),
    PerLayer(Vec<Resolution>),
}

impl Resolutions {
    /// Expands into exactly one resolution per layer.
    pub fn expand(&self, layer_count: usize) -> Result<Vec<Resolution>> {
        match self {
            Resolutions::Uniform(resolution) => Ok(vec![*resolution; layer_count]),
            Resolutions::PerLayer(list) => {
                if list.len() != layer_count {
                    return Err(ShellmeshError::ResolutionCountMismatch {
                        expected: layer_count,
                        found: list.len(),
                    });
                }
                Ok(list.clone())
            }
        }
    }
}
