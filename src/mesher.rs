//! Sample construction and shell generation.
//!
//! A shell is a sequence of concentric cuboid layers around the sample.
//! Layer `i` is a structured hexahedral grid spanning its outer box, with the
//! cells inside the previous boundary (the core) cut out. The grid lines
//! crossing the core are copied from the previous layer, so the inner face
//! of every layer reuses the exact coordinates of the face it is stitched to.

use std::collections::HashSet;
use std::ops::Range;

use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::datatypes::{Dim, DomainKey, Element, Resolution, Resolutions, Vertex};
use crate::error::{Result, ShellmeshError};
use crate::geometry::{scale_box, Aabb};
use crate::mesh::MeshContainer;

pub const DEFAULT_TOLERANCE: f64 = 1e-8;
pub const DEFAULT_GROWTH_RATIO: f64 = 2.0;

/// How the outer boundary of each layer grows with its index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrowthLaw {
    /// Layer `i` spans the inner boundary scaled by `ratio^i`.
    Geometric { ratio: f64 },
    /// Layer `i` spans the inner boundary scaled by `1 + step * i`.
    Linear { step: f64 },
}

impl Default for GrowthLaw {
    fn default() -> Self {
        GrowthLaw::Geometric {
            ratio: DEFAULT_GROWTH_RATIO,
        }
    }
}

impl GrowthLaw {
    /// Scale factor of the outer boundary of layer `layer` (1-based)
    pub fn factor(&self, layer: usize) -> f64 {
        match *self {
            GrowthLaw::Geometric { ratio } => ratio.powi(layer as i32),
            GrowthLaw::Linear { step } => 1.0 + step * layer as f64,
        }
    }

    /// Factors for layers `1..=layer_count`, each finite, above one and
    /// above its predecessor.
    pub fn factors(&self, layer_count: usize) -> Result<Vec<f64>> {
        let mut previous = 1.0;
        let mut factors = Vec::with_capacity(layer_count);
        for layer in 1..=layer_count {
            let factor = self.factor(layer);
            if !factor.is_finite() || factor <= previous {
                return Err(ShellmeshError::InvalidScale {
                    factor,
                    minimum: previous,
                });
            }
            factors.push(factor);
            previous = factor;
        }
        Ok(factors)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShellOptions {
    pub growth: GrowthLaw,
    /// Distance below which two vertices are identified while stitching
    pub tolerance: f64,
    /// Cover the outermost boundary with a quadrilateral facet domain
    pub mark_outer_boundary: bool,
}

impl Default for ShellOptions {
    fn default() -> Self {
        ShellOptions {
            growth: GrowthLaw::default(),
            tolerance: DEFAULT_TOLERANCE,
            mark_outer_boundary: false,
        }
    }
}

/// Scale factor and requested resolution of one layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerSpec {
    pub scale: f64,
    pub resolution: Resolution,
}

/// Validates the shell request and pairs each layer with its growth factor.
///
/// # Errors
/// `InvalidParameter` for a zero layer count, `ResolutionCountMismatch` when
/// per-layer resolutions do not cover every layer, `InvalidScale` when the
/// growth law does not strictly increase above one.
pub fn layer_specs(
    layer_count: usize,
    resolutions: &Resolutions,
    growth: &GrowthLaw,
) -> Result<Vec<LayerSpec>> {
    if layer_count == 0 {
        return Err(ShellmeshError::invalid_parameter(
            "a shell needs at least one layer",
        ));
    }
    let resolutions = resolutions.expand(layer_count)?;
    let factors = growth.factors(layer_count)?;
    Ok(factors
        .into_iter()
        .zip(resolutions)
        .map(|(scale, resolution)| LayerSpec { scale, resolution })
        .collect())
}

/// Grid node coordinates along X, Y and Z
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredGrid {
    pub axes: [Vec<f64>; 3],
}

impl StructuredGrid {
    pub fn bounds(&self) -> Aabb {
        let first = |axis: usize| self.axes[axis][0];
        let last = |axis: usize| self.axes[axis][self.axes[axis].len() - 1];
        Aabb::new(
            Vertex::new(first(0), first(1), first(2)),
            Vertex::new(last(0), last(1), last(2)),
        )
    }

    /// Number of cells along each axis
    pub fn shape(&self) -> [usize; 3] {
        [
            self.axes[0].len() - 1,
            self.axes[1].len() - 1,
            self.axes[2].len() - 1,
        ]
    }

    fn node(&self, i: usize, j: usize, k: usize) -> Vertex {
        Vertex::new(self.axes[0][i], self.axes[1][j], self.axes[2][k])
    }
}

/// Evenly spaced nodes from `lo` to `hi` with exact end points.
fn linspace(lo: f64, hi: f64, cells: usize) -> Vec<f64> {
    let mut nodes: Vec<f64> = (0..=cells)
        .map(|j| lo + (hi - lo) * j as f64 / cells as f64)
        .collect();
    nodes[cells] = hi;
    nodes
}

/// Subdivision of the first inner boundary along one axis, sized to the
/// nominal cell length of a `requested`-cell grid over `outer`.
fn initial_core_axis(inner: (f64, f64), outer: (f64, f64), requested: usize) -> Vec<f64> {
    let cell_length = (outer.1 - outer.0) / requested as f64;
    let max_core = requested.saturating_sub(2).max(1);
    let cells = ((inner.1 - inner.0) / cell_length).round() as usize;
    linspace(inner.0, inner.1, cells.clamp(1, max_core))
}

/// Grid lines through the sample vertices lying on `bounds`, for stitching
/// a layer directly onto the sample.
///
/// Fails unless those vertices are exactly the nodes of a tensor lattice on
/// every face of `bounds`, since any missing lattice node would leave a
/// hanging node on the seam.
fn surface_lattice(vertices: &[Vertex], bounds: &Aabb, tolerance: f64) -> Result<[Vec<f64>; 3]> {
    let near = |value: f64, target: f64| (value - target).abs() <= tolerance;
    let surface: Vec<&Vertex> = vertices
        .iter()
        .filter(|v| (0..3).any(|a| near(v[a], bounds.min[a]) || near(v[a], bounds.max[a])))
        .collect();

    let mut axes: [Vec<f64>; 3] = Default::default();
    for (a, axis) in axes.iter_mut().enumerate() {
        let mut lines: Vec<f64> = surface.iter().map(|v| v[a]).collect();
        lines.sort_by(f64::total_cmp);
        lines.dedup_by(|later, kept| near(*later, *kept));
        if lines.len() < 2 {
            return Err(ShellmeshError::DegenerateGeometry(format!(
                "sample surface has no extent along {}",
                ["x", "y", "z"][a]
            )));
        }
        let last = lines.len() - 1;
        lines[0] = bounds.min[a];
        lines[last] = bounds.max[a];
        *axis = lines;
    }

    let line_of = |a: usize, value: f64| {
        let i = axes[a].partition_point(|&line| line < value - tolerance);
        i.min(axes[a].len() - 1)
    };
    let nodes: HashSet<[usize; 3]> = surface
        .iter()
        .map(|v| [line_of(0, v.x), line_of(1, v.y), line_of(2, v.z)])
        .collect();

    let [nx, ny, nz] = [axes[0].len() - 1, axes[1].len() - 1, axes[2].len() - 1];
    let expected = (nx + 1) * (ny + 1) * (nz + 1)
        - nx.saturating_sub(1) * ny.saturating_sub(1) * nz.saturating_sub(1);
    if nodes.len() != expected {
        return Err(ShellmeshError::invalid_parameter(format!(
            "sample surface nodes do not form a {nx}x{ny}x{nz} lattice ({} of {expected} nodes); use a positive margin",
            nodes.len()
        )));
    }
    Ok(axes)
}

/// Grid nodes of one layer along one axis: the gap below the core, the core
/// nodes unchanged, then the gap above it. Returns the nodes and the range of
/// core cells.
fn layer_axis(
    core: &[f64],
    outer: (f64, f64),
    requested: usize,
    layer: usize,
    axis: usize,
) -> (Vec<f64>, Range<usize>) {
    let core_cells = core.len() - 1;
    let minimum = core_cells + 2;
    let cells = if requested < minimum {
        warn!(
            "shell layer {layer}: resolution {requested} along {} cannot surround {core_cells} core cells, using {minimum}",
            ["x", "y", "z"][axis]
        );
        minimum
    } else {
        requested
    };

    let gap_cells = cells - core_cells;
    let below = core[0] - outer.0;
    let above = outer.1 - core[core_cells];
    let share = below / (below + above);
    let cells_below = ((gap_cells as f64 * share).round() as usize).clamp(1, gap_cells - 1);
    let cells_above = gap_cells - cells_below;

    let mut nodes = Vec::with_capacity(cells + 1);
    nodes.extend((0..cells_below).map(|j| outer.0 + below * j as f64 / cells_below as f64));
    nodes.extend_from_slice(core);
    nodes.extend(
        (1..=cells_above).map(|j| core[core_cells] + above * j as f64 / cells_above as f64),
    );
    nodes[cells] = outer.1;

    (nodes, cells_below..cells_below + core_cells)
}

/// Collects grid nodes lazily so only vertices used by an element exist.
struct BlockBuilder<'a> {
    grid: &'a StructuredGrid,
    stride: [usize; 2],
    lookup: Vec<Option<usize>>,
    vertices: Vec<Vertex>,
}

impl<'a> BlockBuilder<'a> {
    fn new(grid: &'a StructuredGrid) -> BlockBuilder<'a> {
        let [nx, ny, nz] = grid.shape();
        BlockBuilder {
            grid,
            stride: [nx + 1, (nx + 1) * (ny + 1)],
            lookup: vec![None; (nx + 1) * (ny + 1) * (nz + 1)],
            vertices: Vec::new(),
        }
    }

    fn node(&mut self, i: usize, j: usize, k: usize) -> usize {
        let key = i + self.stride[0] * j + self.stride[1] * k;
        if let Some(index) = self.lookup[key] {
            return index;
        }
        let index = self.vertices.len();
        self.vertices.push(self.grid.node(i, j, k));
        self.lookup[key] = Some(index);
        index
    }

    fn hexahedron(&mut self, i: usize, j: usize, k: usize) -> Element {
        Element::hexahedron([
            self.node(i, j, k),
            self.node(i + 1, j, k),
            self.node(i + 1, j + 1, k),
            self.node(i, j + 1, k),
            self.node(i, j, k + 1),
            self.node(i + 1, j, k + 1),
            self.node(i + 1, j + 1, k + 1),
            self.node(i, j + 1, k + 1),
        ])
    }

    /// Hexahedra of every grid cell outside `core`
    fn cells(&mut self, core: &[Range<usize>; 3]) -> Vec<Element> {
        let [nx, ny, nz] = self.grid.shape();
        let mut cells = Vec::new();
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    if core[0].contains(&i) && core[1].contains(&j) && core[2].contains(&k) {
                        continue;
                    }
                    cells.push(self.hexahedron(i, j, k));
                }
            }
        }
        cells
    }

    /// Outward-oriented quadrilaterals covering the grid's bounding surface
    fn boundary_facets(&mut self) -> Vec<Element> {
        let [nx, ny, nz] = self.grid.shape();
        let mut facets = Vec::new();
        for k in 0..nz {
            for j in 0..ny {
                facets.push(Element::quadrilateral([
                    self.node(0, j, k),
                    self.node(0, j, k + 1),
                    self.node(0, j + 1, k + 1),
                    self.node(0, j + 1, k),
                ]));
                facets.push(Element::quadrilateral([
                    self.node(nx, j, k),
                    self.node(nx, j + 1, k),
                    self.node(nx, j + 1, k + 1),
                    self.node(nx, j, k + 1),
                ]));
            }
        }
        for k in 0..nz {
            for i in 0..nx {
                facets.push(Element::quadrilateral([
                    self.node(i, 0, k),
                    self.node(i + 1, 0, k),
                    self.node(i + 1, 0, k + 1),
                    self.node(i, 0, k + 1),
                ]));
                facets.push(Element::quadrilateral([
                    self.node(i, ny, k),
                    self.node(i, ny, k + 1),
                    self.node(i + 1, ny, k + 1),
                    self.node(i + 1, ny, k),
                ]));
            }
        }
        for j in 0..ny {
            for i in 0..nx {
                facets.push(Element::quadrilateral([
                    self.node(i, j, 0),
                    self.node(i, j + 1, 0),
                    self.node(i + 1, j + 1, 0),
                    self.node(i + 1, j, 0),
                ]));
                facets.push(Element::quadrilateral([
                    self.node(i, j, nz),
                    self.node(i + 1, j, nz),
                    self.node(i + 1, j + 1, nz),
                    self.node(i, j + 1, nz),
                ]));
            }
        }
        facets
    }

    /// Packs the collected vertices and `elements` into a container with one
    /// domain holding every element.
    fn finish(self, elements: Vec<Element>, domain: DomainKey, name: &str) -> Result<MeshContainer> {
        let mut block = MeshContainer::new();
        let offset = block.append_vertices(&self.vertices);
        let range = match domain.dim {
            Dim::Cell => block.append_cells(&elements, offset)?,
            Dim::Facet => block.append_facets(&elements, offset)?,
        };
        let domains = block.domains_mut();
        domains.register_domain(domain.dim, domain.id, name)?;
        for entity in range {
            domains.assign_entity(domain.dim, domain.id, entity)?;
        }
        Ok(block)
    }
}

/// One generated shell layer
#[derive(Debug, Clone, PartialEq)]
pub struct ShellLayer {
    /// 1-based, counted outward from the sample
    pub index: usize,
    pub domain: DomainKey,
    pub outer: Aabb,
    pub scale: f64,
    /// Resolution actually used, after raising it to surround the core
    pub resolution: Resolution,
    pub cells: usize,
    pub stitched_vertices: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShellSummary {
    pub inner_boundary: Aabb,
    pub layers: Vec<ShellLayer>,
    pub boundary_domain: Option<DomainKey>,
}

/// Receives progress callbacks while a shell is generated.
pub trait LayerObserver {
    fn observe_init(&mut self, _layer_count: usize) {}
    fn observe_layer(&mut self, _layer: &ShellLayer) {}
    fn observe_final(&mut self, _summary: &ShellSummary) {}
}

/// Observer that ignores every callback
pub struct NoopObserver;

impl LayerObserver for NoopObserver {}

/// Builds samples and surrounds them with shell layers.
#[derive(Debug, Clone, Default)]
pub struct Mesher {
    mesh: MeshContainer,
    options: ShellOptions,
    // structured grid whose nodes cover the current outer surface, if known
    boundary_grid: Option<StructuredGrid>,
    inner_boundary: Option<Aabb>,
    layers: Vec<ShellLayer>,
}

impl Mesher {
    pub fn new() -> Mesher {
        Mesher::default()
    }

    /// Wraps an existing mesh (typically read from a file) as the sample.
    pub fn from_mesh(mesh: MeshContainer) -> Mesher {
        Mesher {
            mesh,
            ..Mesher::default()
        }
    }

    pub fn with_options(mut self, options: ShellOptions) -> Mesher {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ShellOptions {
        &self.options
    }

    /// Current combined mesh
    pub fn mesh(&self) -> &MeshContainer {
        &self.mesh
    }

    pub fn into_mesh(self) -> MeshContainer {
        self.mesh
    }

    /// Copy of the mesh with coordinates multiplied by `scale`
    pub fn scaled_mesh(&self, scale: f64) -> Result<MeshContainer> {
        self.mesh.scaled(scale)
    }

    /// Layers produced by the most recent shell
    pub fn layers(&self) -> &[ShellLayer] {
        &self.layers
    }

    /// Size of the inner shell boundary (the sample's bounding box before
    /// any shell exists), multiplied by `scale`.
    pub fn sample_size(&self, scale: f64) -> Result<Vector3<f64>> {
        let aabb = match self.inner_boundary {
            Some(aabb) => aabb,
            None => self.mesh.bounding_box()?,
        };
        Ok(aabb.size() * scale)
    }

    /// Creates a structured hexahedral cuboid of the given size centred at the
    /// origin and registers it as the cell domain `sample`.
    pub fn create_cuboid(&mut self, size: [f64; 3], n: Resolution) -> Result<DomainKey> {
        if size.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ShellmeshError::invalid_parameter(format!(
                "cuboid size {size:?} must be positive on every axis"
            )));
        }
        let grid = StructuredGrid {
            axes: [
                linspace(-size[0] / 2.0, size[0] / 2.0, n.nx),
                linspace(-size[1] / 2.0, size[1] / 2.0, n.ny),
                linspace(-size[2] / 2.0, size[2] / 2.0, n.nz),
            ],
        };

        let domain = DomainKey::new(Dim::Cell, self.mesh.domains().next_unused_id(Dim::Cell)?);
        let mut builder = BlockBuilder::new(&grid);
        let cells = builder.cells(&[0..0, 0..0, 0..0]);
        let block = builder.finish(cells, domain, "sample")?;

        self.mesh.merge(block, self.options.tolerance)?;
        info!("created {n} cuboid sample of size {size:?}");
        self.boundary_grid = Some(grid);
        Ok(domain)
    }

    /// Registers a cell domain holding every cell whose centroid satisfies
    /// `predicate`. Returns the number of marked cells.
    pub fn mark_cells<F>(&mut self, id: u32, name: &str, predicate: F) -> Result<usize>
    where
        F: Fn(&Vertex) -> bool,
    {
        self.mark(Dim::Cell, id, name, predicate)
    }

    /// Facet counterpart of [`Mesher::mark_cells`].
    pub fn mark_facets<F>(&mut self, id: u32, name: &str, predicate: F) -> Result<usize>
    where
        F: Fn(&Vertex) -> bool,
    {
        self.mark(Dim::Facet, id, name, predicate)
    }

    fn mark<F>(&mut self, dim: Dim, id: u32, name: &str, predicate: F) -> Result<usize>
    where
        F: Fn(&Vertex) -> bool,
    {
        let vertices = self.mesh.vertices();
        let selected: Vec<usize> = self
            .mesh
            .elements(dim)
            .iter()
            .enumerate()
            .filter(|(_, element)| predicate(&element.centroid(vertices)))
            .map(|(i, _)| i)
            .collect();

        let domains = self.mesh.domains_mut();
        domains.register_domain(dim, id, name)?;
        for &entity in &selected {
            domains.assign_entity(dim, id, entity)?;
        }
        debug!("marked {} {dim}s as '{name}'", selected.len());
        Ok(selected.len())
    }

    /// Surrounds the current mesh with `layer_count` shell layers.
    ///
    /// See [`Mesher::create_shell_observed`].
    pub fn create_shell(
        &mut self,
        layer_count: usize,
        resolutions: &Resolutions,
        margin: f64,
    ) -> Result<ShellSummary> {
        self.create_shell_observed(layer_count, resolutions, margin, &mut NoopObserver)
    }

    /// Surrounds the current mesh with `layer_count` shell layers, reporting
    /// each finished layer to `observer`.
    ///
    /// The inner shell boundary is the sample's bounding box grown by
    /// `margin`. Each layer becomes a new cell domain named
    /// `shell_layer_<i>` with a fresh id. On error the mesh is left exactly
    /// as it was.
    ///
    /// # Errors
    /// `InvalidParameter`, `ResolutionCountMismatch`, `InvalidScale`,
    /// `EmptyGeometry`, `DegenerateGeometry` or `DomainIdsExhausted`. A zero
    /// margin around a sample without a known grid needs the sample's surface
    /// nodes to form a tensor lattice, otherwise `InvalidParameter`.
    pub fn create_shell_observed(
        &mut self,
        layer_count: usize,
        resolutions: &Resolutions,
        margin: f64,
        observer: &mut dyn LayerObserver,
    ) -> Result<ShellSummary> {
        if !margin.is_finite() || margin < 0.0 {
            return Err(ShellmeshError::invalid_parameter(format!(
                "shell margin must be a non-negative number, got {margin}"
            )));
        }
        let specs = layer_specs(layer_count, resolutions, &self.options.growth)?;
        let tolerance = self.options.tolerance;

        let sample = self.mesh.bounding_box()?;
        let inner = sample.inflated(margin);
        let extent = inner.size();
        if let Some(axis) = (0..3).find(|&axis| extent[axis] <= tolerance) {
            return Err(ShellmeshError::DegenerateGeometry(format!(
                "inner shell boundary has no extent along {}; use a positive margin",
                ["x", "y", "z"][axis]
            )));
        }

        info!(
            "creating {layer_count}-layer shell around [{:.4}, {:.4}, {:.4}] .. [{:.4}, {:.4}, {:.4}]",
            inner.min.x, inner.min.y, inner.min.z, inner.max.x, inner.max.y, inner.max.z
        );
        observer.observe_init(layer_count);

        let mut scratch = self.mesh.clone();
        let mut core = match &self.boundary_grid {
            Some(grid) if grid.bounds().approx_eq(&inner, tolerance) => {
                debug!("inner shell boundary follows the structured sample grid");
                grid.axes.clone()
            }
            _ if margin <= tolerance => {
                debug!("inner shell boundary follows the sample's surface nodes");
                surface_lattice(self.mesh.vertices(), &sample, tolerance)?
            }
            _ => {
                let outer = scale_box(&inner, specs[0].scale, None)?;
                let axis = |a: usize| {
                    initial_core_axis(
                        (inner.min[a], inner.max[a]),
                        (outer.min[a], outer.max[a]),
                        specs[0].resolution.axis(a),
                    )
                };
                [axis(0), axis(1), axis(2)]
            }
        };

        let mut layers = Vec::with_capacity(layer_count);
        for (i, spec) in specs.iter().enumerate() {
            let index = i + 1;
            let outer = scale_box(&inner, spec.scale, None)?;

            let (x, cx) = layer_axis(&core[0], (outer.min.x, outer.max.x), spec.resolution.nx, index, 0);
            let (y, cy) = layer_axis(&core[1], (outer.min.y, outer.max.y), spec.resolution.ny, index, 1);
            let (z, cz) = layer_axis(&core[2], (outer.min.z, outer.max.z), spec.resolution.nz, index, 2);
            let grid = StructuredGrid { axes: [x, y, z] };
            let [nx, ny, nz] = grid.shape();

            let domain = DomainKey::new(Dim::Cell, scratch.domains().next_unused_id(Dim::Cell)?);
            let mut builder = BlockBuilder::new(&grid);
            let cells = builder.cells(&[cx, cy, cz]);
            let block = builder.finish(cells, domain, &format!("shell_layer_{index}"))?;
            let cell_count = block.cells().len();

            let stats = scratch.merge(block, tolerance)?;
            let layer = ShellLayer {
                index,
                domain,
                outer,
                scale: spec.scale,
                resolution: Resolution { nx, ny, nz },
                cells: cell_count,
                stitched_vertices: stats.stitched_vertices,
            };
            info!(
                "shell layer {index}: {} grid, {cell_count} cells, domain {}, {} seam vertices",
                layer.resolution, domain.id, stats.stitched_vertices
            );
            observer.observe_layer(&layer);
            layers.push(layer);
            core = grid.axes;
        }

        let outermost = StructuredGrid { axes: core };
        let boundary_domain = if self.options.mark_outer_boundary {
            let domain = DomainKey::new(Dim::Facet, scratch.domains().next_unused_id(Dim::Facet)?);
            let mut builder = BlockBuilder::new(&outermost);
            let facets = builder.boundary_facets();
            let block = builder.finish(facets, domain, "shell_boundary")?;
            let stats = scratch.merge(block, tolerance)?;
            debug!(
                "outer boundary: {} facets, {} new vertices",
                stats.added_facets, stats.added_vertices
            );
            Some(domain)
        } else {
            None
        };

        let summary = ShellSummary {
            inner_boundary: inner,
            layers: layers.clone(),
            boundary_domain,
        };
        observer.observe_final(&summary);

        self.mesh = scratch;
        self.boundary_grid = Some(outermost);
        self.inner_boundary = Some(inner);
        self.layers = layers;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::ElementKind;
    use approx::assert_relative_eq;

    fn res(nx: usize, ny: usize, nz: usize) -> Resolution {
        Resolution::new(nx, ny, nz).unwrap()
    }

    /// 2x2x2 hexahedral cube on [0, 1]^3 in cell domain 1, without a known grid
    fn unit_cube_sample() -> Mesher {
        Mesher::from_mesh(unit_cube_container())
    }

    fn unit_cube_container() -> MeshContainer {
        let mut cuboid = Mesher::new();
        cuboid.create_cuboid([1.0, 1.0, 1.0], res(2, 2, 2)).unwrap();
        let cuboid = cuboid.into_mesh();

        let shifted: Vec<Vertex> = cuboid
            .vertices()
            .iter()
            .map(|v| v + Vector3::repeat(0.5))
            .collect();
        let mut sample = MeshContainer::new();
        let offset = sample.append_vertices(&shifted);
        let cells = sample.append_cells(cuboid.cells(), offset).unwrap();
        let domains = sample.domains_mut();
        domains.register_domain(Dim::Cell, 1, "sample").unwrap();
        for cell in cells {
            domains.assign_entity(Dim::Cell, 1, cell).unwrap();
        }
        sample
    }

    #[test]
    fn geometric_growth_is_strictly_increasing() {
        let factors = GrowthLaw::default().factors(3).unwrap();
        assert_eq!(factors, vec![2.0, 4.0, 8.0]);
        let factors = GrowthLaw::Linear { step: 0.5 }.factors(2).unwrap();
        assert_eq!(factors, vec![1.5, 2.0]);
    }

    #[test]
    fn non_growing_laws_are_rejected() {
        for law in [
            GrowthLaw::Geometric { ratio: 1.0 },
            GrowthLaw::Geometric { ratio: 0.5 },
            GrowthLaw::Linear { step: 0.0 },
            GrowthLaw::Linear { step: -1.0 },
        ] {
            assert!(matches!(
                law.factors(2),
                Err(ShellmeshError::InvalidScale { .. })
            ));
        }
    }

    #[test]
    fn layer_axis_keeps_core_nodes() {
        let core = vec![-1.0, 0.5, 2.0];
        let (nodes, range) = layer_axis(&core, (-2.5, 3.5), 6, 1, 0);
        assert_eq!(nodes.len(), 7);
        assert_eq!(range, 2..4);
        assert_eq!(&nodes[2..5], &core[..]);
        assert_eq!(nodes[0], -2.5);
        assert_eq!(nodes[6], 3.5);
        assert!(nodes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn layer_axis_raises_too_coarse_resolution() {
        let core = vec![0.0, 1.0, 2.0, 3.0];
        let (nodes, range) = layer_axis(&core, (-1.0, 4.0), 2, 2, 1);
        assert_eq!(nodes.len() - 1, 5);
        assert_eq!(range, 1..4);
    }

    #[test]
    fn initial_core_follows_nominal_cell_size() {
        let core = initial_core_axis((-1.0, 2.0), (-2.5, 3.5), 4);
        assert_eq!(core, vec![-1.0, 0.5, 2.0]);
        // a single core cell when the grid is too coarse
        assert_eq!(initial_core_axis((0.0, 1.0), (-1.0, 2.0), 2), vec![0.0, 1.0]);
    }

    #[test]
    fn cuboid_is_centred_and_registered() {
        let mut mesher = Mesher::new();
        let domain = mesher.create_cuboid([2.0, 4.0, 1.0], res(2, 4, 1)).unwrap();
        let mesh = mesher.mesh();
        assert_eq!(mesh.cells().len(), 8);
        assert_eq!(mesh.vertices().len(), 3 * 5 * 2);
        assert_eq!(mesh.domains().domain_name(Dim::Cell, domain.id).unwrap(), "sample");
        let aabb = mesh.bounding_box().unwrap();
        assert_eq!(aabb.min, Vertex::new(-1.0, -2.0, -0.5));
        assert_eq!(aabb.max, Vertex::new(1.0, 2.0, 0.5));
        assert!(mesher.create_cuboid([1.0, 0.0, 1.0], res(1, 1, 1)).is_err());
    }

    #[test]
    fn unit_cube_example() {
        let mut mesher = unit_cube_sample();
        let domains_before = mesher.mesh().domains().domain_count();
        let cells_before = mesher.mesh().cells().len();

        let resolutions = Resolutions::PerLayer(vec![res(4, 4, 4), res(8, 8, 8)]);
        let summary = mesher.create_shell(2, &resolutions, 1.0).unwrap();

        assert_eq!(summary.inner_boundary.min, Vertex::new(-1.0, -1.0, -1.0));
        assert_eq!(summary.inner_boundary.max, Vertex::new(2.0, 2.0, 2.0));
        assert_eq!(summary.layers.len(), 2);
        assert!(summary.layers[1].outer.strictly_contains(&summary.layers[0].outer));
        assert!(summary.layers[0].outer.strictly_contains(&summary.inner_boundary));
        assert_eq!(
            mesher.mesh().domains().domain_count(),
            domains_before + 2
        );

        // 4^3 grid minus a 2^3 core, then 8^3 minus the 4^3 grid of layer 1
        assert_eq!(summary.layers[0].cells, 64 - 8);
        assert_eq!(summary.layers[1].cells, 512 - 64);
        assert_eq!(mesher.mesh().cells().len(), cells_before + 56 + 448);

        let aabb = mesher.mesh().bounding_box().unwrap();
        assert!(aabb.approx_eq(&summary.layers[1].outer, 1e-12));
        assert_relative_eq!(aabb.min.x, -5.5);
        assert_relative_eq!(aabb.max.x, 6.5);
        mesher.mesh().validate().unwrap();
    }

    #[test]
    fn layer_seams_share_every_vertex() {
        let mut mesher = unit_cube_sample();
        let resolutions = Resolutions::PerLayer(vec![res(4, 4, 4), res(8, 8, 8)]);
        let summary = mesher.create_shell(2, &resolutions, 1.0).unwrap();

        // inner face of layer 2 is the 5x5 node lattice on each face of layer 1
        let seam_nodes = 5 * 5 * 5 - 3 * 3 * 3;
        assert_eq!(summary.layers[0].stitched_vertices, 0);
        assert_eq!(summary.layers[1].stitched_vertices, seam_nodes);
    }

    #[test]
    fn zero_margin_shell_stitches_onto_cuboid() {
        let mut mesher = Mesher::new();
        mesher.create_cuboid([2.0, 2.0, 2.0], res(2, 2, 2)).unwrap();
        let summary = mesher
            .create_shell(1, &Resolutions::Uniform(res(4, 4, 4)), 0.0)
            .unwrap();
        // every surface node of the 2x2x2 sample is reused
        assert_eq!(summary.layers[0].stitched_vertices, 27 - 1);
        assert_eq!(mesher.mesh().vertices().len(), 125);
        assert_eq!(mesher.mesh().cells().len(), 64);
    }

    #[test]
    fn zero_margin_shell_stitches_onto_surface_lattice() {
        let mut mesher = unit_cube_sample();
        let summary = mesher
            .create_shell(1, &Resolutions::Uniform(res(4, 4, 4)), 0.0)
            .unwrap();
        assert_eq!(summary.layers[0].stitched_vertices, 27 - 1);
        assert_eq!(mesher.mesh().vertices().len(), 125);
        assert_eq!(mesher.mesh().cells().len(), 8 + 56);
    }

    #[test]
    fn zero_margin_needs_a_lattice_surface() {
        let mut mesh = MeshContainer::new();
        let offset = mesh.append_vertices(&[
            Vertex::new(0.0, 0.0, 0.0),
            Vertex::new(1.0, 0.0, 0.0),
            Vertex::new(0.0, 1.0, 0.0),
            Vertex::new(0.0, 0.0, 1.0),
        ]);
        mesh.append_cells(&[Element::new(ElementKind::Tetrahedron, vec![0, 1, 2, 3])], offset)
            .unwrap();
        let mut mesher = Mesher::from_mesh(mesh);

        let err = mesher
            .create_shell(1, &Resolutions::Uniform(res(4, 4, 4)), 0.0)
            .unwrap_err();
        assert!(matches!(err, ShellmeshError::InvalidParameter(_)));
        assert_eq!(mesher.mesh().cells().len(), 1);
        assert_eq!(mesher.mesh().vertices().len(), 4);

        mesher
            .create_shell(1, &Resolutions::Uniform(res(4, 4, 4)), 0.5)
            .unwrap();
    }

    #[test]
    fn surface_lattice_collects_grid_lines() {
        let mesher = unit_cube_sample();
        let bounds = mesher.mesh().bounding_box().unwrap();
        let axes = surface_lattice(mesher.mesh().vertices(), &bounds, 1e-9).unwrap();
        for axis in &axes {
            assert_eq!(axis, &vec![0.0, 0.5, 1.0]);
        }

        // a missing face centre leaves a hole in the lattice
        let vertices: Vec<Vertex> = mesher
            .mesh()
            .vertices()
            .iter()
            .filter(|v| **v != Vertex::new(0.5, 0.5, 0.0))
            .copied()
            .collect();
        assert!(surface_lattice(&vertices, &bounds, 1e-9).is_err());
    }

    #[test]
    fn unregistered_tags_keep_their_cells() {
        let mut sample = unit_cube_container();
        sample.domains_mut().tag_entity(Dim::Cell, 2, 2);
        sample.domains_mut().tag_entity(Dim::Cell, 2, 3);
        let mut mesher = Mesher::from_mesh(sample);

        let summary = mesher
            .create_shell(1, &Resolutions::Uniform(res(4, 4, 4)), 1.0)
            .unwrap();
        let layer = summary.layers[0].domain;
        assert_eq!(layer.id, 3);

        let domains = mesher.mesh().domains();
        assert_eq!(domains.domain_name(Dim::Cell, 3).unwrap(), "shell_layer_1");
        assert_eq!(domains.domain_of(Dim::Cell, 2), Some(2));
        assert_eq!(domains.domain_of(Dim::Cell, 3), Some(2));
        let members = domains.domain_members(Dim::Cell, 3).unwrap();
        assert!(!members.contains(&2) && !members.contains(&3));
        assert_eq!(domains.pending_ids(Dim::Cell), vec![2]);
    }

    #[test]
    fn exhausted_domain_ids_fail_without_changes() {
        let mut sample = unit_cube_container();
        sample
            .domains_mut()
            .register_domain(Dim::Cell, u32::MAX, "last")
            .unwrap();
        let mut mesher = Mesher::from_mesh(sample);
        let err = mesher
            .create_shell(1, &Resolutions::Uniform(res(4, 4, 4)), 1.0)
            .unwrap_err();
        assert!(matches!(err, ShellmeshError::DomainIdsExhausted { dim: Dim::Cell }));
        assert_eq!(mesher.mesh().cells().len(), 8);
    }

    #[test]
    fn uniform_resolution_is_raised_for_outer_layers() {
        let mut mesher = unit_cube_sample();
        let summary = mesher
            .create_shell(3, &Resolutions::Uniform(res(4, 4, 4)), 0.5)
            .unwrap();
        let sizes: Vec<usize> = summary.layers.iter().map(|l| l.resolution.nx).collect();
        assert_eq!(sizes, vec![4, 6, 8]);
    }

    #[test]
    fn resolution_mismatch_leaves_mesh_untouched() {
        let mut mesher = unit_cube_sample();
        let before = (
            mesher.mesh().vertices().len(),
            mesher.mesh().cells().len(),
            mesher.mesh().facets().len(),
            mesher.mesh().domains().domain_count(),
        );
        let err = mesher
            .create_shell(3, &Resolutions::PerLayer(vec![res(4, 4, 4)]), 1.0)
            .unwrap_err();
        assert!(matches!(
            err,
            ShellmeshError::ResolutionCountMismatch {
                expected: 3,
                found: 1
            }
        ));
        let after = (
            mesher.mesh().vertices().len(),
            mesher.mesh().cells().len(),
            mesher.mesh().facets().len(),
            mesher.mesh().domains().domain_count(),
        );
        assert_eq!(before, after);
        assert!(mesher.layers().is_empty());
    }

    #[test]
    fn empty_sample_fails() {
        let mut mesher = Mesher::new();
        let err = mesher
            .create_shell(1, &Resolutions::Uniform(res(4, 4, 4)), 1.0)
            .unwrap_err();
        assert!(matches!(err, ShellmeshError::EmptyGeometry));
    }

    #[test]
    fn flat_sample_without_margin_is_degenerate() {
        let mut mesh = MeshContainer::new();
        mesh.append_vertices(&[Vertex::new(0.0, 0.0, 0.0), Vertex::new(1.0, 1.0, 0.0)]);
        let mut mesher = Mesher::from_mesh(mesh);
        let err = mesher
            .create_shell(1, &Resolutions::Uniform(res(4, 4, 4)), 0.0)
            .unwrap_err();
        assert!(matches!(err, ShellmeshError::DegenerateGeometry(_)));
        assert!(mesher
            .create_shell(1, &Resolutions::Uniform(res(4, 4, 4)), -1.0)
            .is_err());
    }

    #[test]
    fn outer_boundary_is_marked_without_new_vertices() {
        let mut mesher = unit_cube_sample().with_options(ShellOptions {
            mark_outer_boundary: true,
            ..ShellOptions::default()
        });
        let summary = mesher
            .create_shell(1, &Resolutions::Uniform(res(4, 4, 4)), 1.0)
            .unwrap();
        // the centre node of the excised core is never used
        let vertices_after_layers = 27 + 5 * 5 * 5 - 1;
        let mesh = mesher.mesh();
        assert_eq!(mesh.vertices().len(), vertices_after_layers);
        assert_eq!(mesh.facets().len(), 6 * 16);

        let boundary = summary.boundary_domain.unwrap();
        assert_eq!(boundary.dim, Dim::Facet);
        assert_eq!(
            mesh.domains().domain_name(Dim::Facet, boundary.id).unwrap(),
            "shell_boundary"
        );
        let aabb = summary.layers[0].outer;
        for facet in mesh.facets() {
            let c = facet.centroid(mesh.vertices());
            let on_face = (0..3).any(|a| {
                (c[a] - aabb.min[a]).abs() < 1e-12 || (c[a] - aabb.max[a]).abs() < 1e-12
            });
            assert!(on_face);
        }
    }

    #[test]
    fn mark_cells_by_centroid() {
        let mut mesher = Mesher::new();
        mesher.create_cuboid([2.0, 2.0, 2.0], res(2, 2, 2)).unwrap();
        let marked = mesher.mark_cells(10, "upper", |c| c.z > 0.0).unwrap();
        assert_eq!(marked, 4);
        let domains = mesher.mesh().domains();
        assert_eq!(domains.domain_members(Dim::Cell, 10).unwrap().len(), 4);
        // marked cells left the sample domain
        assert_eq!(domains.domain_members(Dim::Cell, 1).unwrap().len(), 4);
        assert!(mesher.mark_cells(10, "other", |_| true).is_err());
    }

    #[test]
    fn mark_facets_splits_boundary() {
        let mut mesher = Mesher::new().with_options(ShellOptions {
            mark_outer_boundary: true,
            ..ShellOptions::default()
        });
        mesher.create_cuboid([1.0, 1.0, 1.0], res(1, 1, 1)).unwrap();
        let summary = mesher
            .create_shell(1, &Resolutions::Uniform(res(3, 3, 3)), 0.0)
            .unwrap();
        assert_eq!(mesher.layers().len(), 1);

        let x_max = summary.layers[0].outer.max.x;
        let marked = mesher
            .mark_facets(50, "x_max", |c| (c.x - x_max).abs() < 1e-12)
            .unwrap();
        assert_eq!(marked, 9);
        let domains = mesher.mesh().domains();
        let boundary = summary.boundary_domain.unwrap();
        assert_eq!(
            domains.domain_members(Dim::Facet, boundary.id).unwrap().len(),
            6 * 9 - 9
        );
    }

    #[test]
    fn sample_size_reports_inner_boundary() {
        let mut mesher = Mesher::new();
        mesher.create_cuboid([2.0, 4.0, 6.0], res(1, 1, 1)).unwrap();
        assert_eq!(mesher.sample_size(1.0).unwrap(), Vector3::new(2.0, 4.0, 6.0));
        mesher
            .create_shell(1, &Resolutions::Uniform(res(3, 3, 3)), 0.5)
            .unwrap();
        assert_eq!(mesher.sample_size(2.0).unwrap(), Vector3::new(6.0, 10.0, 14.0));
    }

    #[test]
    fn shell_ids_are_fresh() {
        let mut mesher = unit_cube_sample();
        mesher.mark_cells(40, "magnet", |_| true).unwrap();
        let before: Vec<u32> = mesher.mesh().domains().domain_ids();
        let summary = mesher
            .create_shell(2, &Resolutions::Uniform(res(4, 4, 4)), 1.0)
            .unwrap();
        for layer in &summary.layers {
            assert!(!before.contains(&layer.domain.id));
        }
        assert_eq!(summary.layers[0].domain.id, 41);
        assert_eq!(summary.layers[1].domain.id, 42);
    }
}
