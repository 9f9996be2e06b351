use std::ops::Range;

use tracing::debug;

use crate::datatypes::{Dim, Element, Vertex};
use crate::domains::DomainRegistry;
use crate::error::{Result, ShellmeshError};
use crate::geometry::{bounding_box, dedupe_vertices, Aabb};

/// Vertices, cells, facets, and the domains tagging them.
#[derive(Debug, Clone, Default)]
pub struct MeshContainer {
    vertices: Vec<Vertex>,
    cells: Vec<Element>,
    facets: Vec<Element>,
    domains: DomainRegistry,
}

/// Outcome of [`MeshContainer::merge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Vertices of the merged container that matched an existing vertex
    pub stitched_vertices: usize,
    pub added_vertices: usize,
    pub added_cells: usize,
    pub added_facets: usize,
}

impl MeshContainer {
    pub fn new() -> MeshContainer {
        MeshContainer::default()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn cells(&self) -> &[Element] {
        &self.cells
    }

    pub fn facets(&self) -> &[Element] {
        &self.facets
    }

    pub fn domains(&self) -> &DomainRegistry {
        &self.domains
    }

    pub fn domains_mut(&mut self) -> &mut DomainRegistry {
        &mut self.domains
    }

    pub fn elements(&self, dim: Dim) -> &[Element] {
        match dim {
            Dim::Cell => &self.cells,
            Dim::Facet => &self.facets,
        }
    }

    pub fn bounding_box(&self) -> Result<Aabb> {
        bounding_box(&self.vertices)
    }

    /// Appends vertices and returns the index of the first one.
    pub fn append_vertices(&mut self, vertices: &[Vertex]) -> usize {
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(vertices);
        offset
    }

    fn translate(&self, elements: &[Element], offset: usize, dim: Dim) -> Result<Vec<Element>> {
        let len = self.vertices.len();
        elements
            .iter()
            .map(|element| {
                if element.dim() != dim {
                    return Err(ShellmeshError::InvalidElement(format!(
                        "{:?} is not a {dim} element",
                        element.kind
                    )));
                }
                if element.nodes.len() != element.kind.node_count() {
                    return Err(ShellmeshError::InvalidElement(format!(
                        "{:?} needs {} nodes, got {}",
                        element.kind,
                        element.kind.node_count(),
                        element.nodes.len()
                    )));
                }
                let nodes = element
                    .nodes
                    .iter()
                    .map(|&n| {
                        let index = n + offset;
                        if index >= len {
                            Err(ShellmeshError::VertexOutOfRange { index, len })
                        } else {
                            Ok(index)
                        }
                    })
                    .collect::<Result<Vec<usize>>>()?;
                Ok(Element::new(element.kind, nodes))
            })
            .collect()
    }

    /// Appends cells whose node indices are local to a block starting at
    /// `offset`. Returns the range of the new cell indices.
    ///
    /// # Errors
    /// `InvalidElement` for non-cell kinds or wrong node counts,
    /// `VertexOutOfRange` for dangling nodes. No cell is added on error.
    pub fn append_cells(&mut self, cells: &[Element], offset: usize) -> Result<Range<usize>> {
        let translated = self.translate(cells, offset, Dim::Cell)?;
        let start = self.cells.len();
        self.cells.extend(translated);
        Ok(start..self.cells.len())
    }

    /// Facet counterpart of [`MeshContainer::append_cells`].
    pub fn append_facets(&mut self, facets: &[Element], offset: usize) -> Result<Range<usize>> {
        let translated = self.translate(facets, offset, Dim::Facet)?;
        let start = self.facets.len();
        self.facets.extend(translated);
        Ok(start..self.facets.len())
    }

    /// Splices `other` into this container.
    ///
    /// Vertices of `other` lying within `tolerance` of an existing vertex are
    /// identified with it; every cell and facet of `other` is remapped onto
    /// the merged vertex list and its domains are carried over.
    ///
    /// # Errors
    /// `DomainIdCollision` if both containers name a domain key differently,
    /// `InvalidParameter` for a bad tolerance. The container is unchanged on error.
    pub fn merge(&mut self, other: MeshContainer, tolerance: f64) -> Result<MergeStats> {
        self.domains.check_collisions(&other.domains)?;
        let (merged, remap) = dedupe_vertices(&self.vertices, &other.vertices, tolerance)?;

        let added_vertices = merged.len() - self.vertices.len();
        let stitched_vertices = other.vertices.len() - added_vertices;

        let remap_element = |element: Element| Element {
            kind: element.kind,
            nodes: element.nodes.iter().map(|&n| remap[n]).collect(),
        };

        let cell_offset = self.cells.len();
        let facet_offset = self.facets.len();
        let added_cells = other.cells.len();
        let added_facets = other.facets.len();

        self.vertices = merged;
        self.cells.extend(other.cells.into_iter().map(remap_element));
        self.facets.extend(other.facets.into_iter().map(remap_element));
        self.domains
            .absorb(other.domains, cell_offset, facet_offset)?;

        debug!(
            "merged {added_cells} cells and {added_facets} facets, stitched {stitched_vertices} vertices"
        );

        Ok(MergeStats {
            stitched_vertices,
            added_vertices,
            added_cells,
            added_facets,
        })
    }

    /// Checks that every element node and every domain member is in range.
    pub fn validate(&self) -> Result<()> {
        let len = self.vertices.len();
        for (dim, elements) in [(Dim::Cell, &self.cells), (Dim::Facet, &self.facets)] {
            for (i, element) in elements.iter().enumerate() {
                if let Some(&bad) = element.nodes.iter().find(|&&n| n >= len) {
                    return Err(ShellmeshError::InconsistentMesh(format!(
                        "{dim} {i} references vertex {bad} of {len}"
                    )));
                }
            }
            if let Some(max) = self.domains.max_member(dim) {
                if max >= elements.len() {
                    return Err(ShellmeshError::InconsistentMesh(format!(
                        "{dim} domain member {max} exceeds {} {dim}s",
                        elements.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns a copy with every coordinate multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Result<MeshContainer> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ShellmeshError::InvalidScale {
                factor,
                minimum: 0.0,
            });
        }
        let mut scaled = self.clone();
        for vertex in &mut scaled.vertices {
            vertex.coords *= factor;
        }
        Ok(scaled)
    }
}
