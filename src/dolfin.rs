//! DOLFIN XML reader and writer.
//!
//! DOLFIN stores one cell type per mesh and identifies facets by
//! `(cell_index, local_entity)`, so facet domains are resolved against the
//! local faces of the cells. Domain names, which DOLFIN has no place for,
//! live in a `shellmesh:domain_names` element inside `<mesh>`.

use std::collections::HashMap;
use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use tracing::debug;

use crate::datatypes::{Dim, Element, ElementKind, Vertex};
use crate::error::{Result, ShellmeshError};
use crate::mesh::MeshContainer;

const NAMESPACE: &str = "urn:shellmesh";

/// Gmsh hexahedron order to DOLFIN's tensor-product order; an involution.
const HEX_PERMUTATION: [usize; 8] = [0, 1, 3, 2, 4, 5, 7, 6];

/// Local facets of a DOLFIN tetrahedron: facet `i` is opposite vertex `i`.
const TET_FACETS: [&[usize]; 4] = [&[1, 2, 3], &[0, 2, 3], &[0, 1, 3], &[0, 1, 2]];

/// Local facets of a DOLFIN hexahedron, in tensor-product vertex order.
const HEX_FACETS: [&[usize]; 6] = [
    &[0, 1, 2, 3],
    &[4, 5, 6, 7],
    &[0, 1, 4, 5],
    &[2, 3, 6, 7],
    &[0, 2, 4, 6],
    &[1, 3, 5, 7],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellType {
    Tetrahedron,
    Hexahedron,
}

impl CellType {
    fn from_cells(cells: &[Element]) -> Result<CellType> {
        let first = cells.first().ok_or_else(|| {
            ShellmeshError::file_format("DOLFIN XML needs at least one cell")
        })?;
        let cell_type = match first.kind {
            ElementKind::Tetrahedron => CellType::Tetrahedron,
            ElementKind::Hexahedron => CellType::Hexahedron,
            other => {
                return Err(ShellmeshError::file_format(format!(
                    "DOLFIN XML cannot store {other:?} cells"
                )))
            }
        };
        if cells.iter().any(|c| c.kind != first.kind) {
            return Err(ShellmeshError::file_format(
                "DOLFIN XML cannot store meshes with mixed cell kinds",
            ));
        }
        Ok(cell_type)
    }

    fn from_name(name: &str) -> Result<CellType> {
        match name {
            "tetrahedron" => Ok(CellType::Tetrahedron),
            "hexahedron" => Ok(CellType::Hexahedron),
            other => Err(ShellmeshError::file_format(format!(
                "unsupported DOLFIN cell type '{other}'"
            ))),
        }
    }

    fn name(self) -> &'static str {
        match self {
            CellType::Tetrahedron => "tetrahedron",
            CellType::Hexahedron => "hexahedron",
        }
    }

    fn kind(self) -> ElementKind {
        match self {
            CellType::Tetrahedron => ElementKind::Tetrahedron,
            CellType::Hexahedron => ElementKind::Hexahedron,
        }
    }

    fn local_facets(self) -> &'static [&'static [usize]] {
        match self {
            CellType::Tetrahedron => &TET_FACETS,
            CellType::Hexahedron => &HEX_FACETS,
        }
    }

    /// Converts between internal and DOLFIN vertex order (both directions)
    fn reorder(self, nodes: &[usize]) -> Vec<usize> {
        match self {
            CellType::Tetrahedron => nodes.to_vec(),
            CellType::Hexahedron => HEX_PERMUTATION.iter().map(|&i| nodes[i]).collect(),
        }
    }

    /// Facet element for local facet `local` of a cell in DOLFIN order
    fn facet(self, dolfin_nodes: &[usize], local: usize) -> Element {
        let face = self.local_facets()[local];
        match self {
            CellType::Tetrahedron => {
                Element::new(ElementKind::Triangle, face.iter().map(|&i| dolfin_nodes[i]).collect())
            }
            // tensor order to cyclic order
            CellType::Hexahedron => Element::quadrilateral([
                dolfin_nodes[face[0]],
                dolfin_nodes[face[1]],
                dolfin_nodes[face[3]],
                dolfin_nodes[face[2]],
            ]),
        }
    }
}

fn face_key(nodes: &[usize]) -> Vec<usize> {
    let mut key = nodes.to_vec();
    key.sort_unstable();
    key
}

/// Maps each cell face (as a sorted node set) to its first `(cell, local)`.
fn face_index(cells: &[Element], cell_type: CellType) -> HashMap<Vec<usize>, (usize, usize)> {
    let mut faces = HashMap::new();
    for (c, cell) in cells.iter().enumerate() {
        let dolfin_nodes = cell_type.reorder(&cell.nodes);
        for (local, face) in cell_type.local_facets().iter().enumerate() {
            let nodes: Vec<usize> = face.iter().map(|&i| dolfin_nodes[i]).collect();
            faces.entry(face_key(&nodes)).or_insert((c, local));
        }
    }
    faces
}

fn start(name: &str, attributes: &[(&str, String)]) -> BytesStart<'static> {
    let mut element = BytesStart::new(name.to_owned());
    for (key, value) in attributes {
        element.push_attribute((*key, value.as_str()));
    }
    element
}

fn open<W: Write>(writer: &mut Writer<W>, name: &str, attributes: &[(&str, String)]) -> Result<()> {
    writer.write_event(Event::Start(start(name, attributes)))?;
    Ok(())
}

fn empty<W: Write>(writer: &mut Writer<W>, name: &str, attributes: &[(&str, String)]) -> Result<()> {
    writer.write_event(Event::Empty(start(name, attributes)))?;
    Ok(())
}

fn close<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name.to_owned())))?;
    Ok(())
}

/// Writes the mesh as DOLFIN XML.
///
/// # Errors
/// `FileFormat` for meshes without cells, with mixed or unsupported cell
/// kinds, or with a tagged facet that is not a face of any cell.
pub fn write_xml<W: Write>(mesh: &MeshContainer, out: &mut W) -> Result<()> {
    let cell_type = CellType::from_cells(mesh.cells())?;
    let domains = mesh.domains();

    let cell_values: Vec<(usize, usize, u32)> = (0..mesh.cells().len())
        .filter_map(|c| domains.domain_of(Dim::Cell, c).map(|id| (c, 0, id)))
        .collect();

    let faces = face_index(mesh.cells(), cell_type);
    let mut facet_values = Vec::new();
    for (f, facet) in mesh.facets().iter().enumerate() {
        let Some(id) = domains.domain_of(Dim::Facet, f) else {
            continue;
        };
        let &(cell, local) = faces.get(&face_key(&facet.nodes)).ok_or_else(|| {
            ShellmeshError::file_format(format!("facet {f} is not a face of any cell"))
        })?;
        facet_values.push((cell, local, id));
    }

    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    open(
        &mut writer,
        "dolfin",
        &[
            ("xmlns:dolfin", "http://fenicsproject.org".to_owned()),
            ("xmlns:shellmesh", NAMESPACE.to_owned()),
        ],
    )?;
    open(
        &mut writer,
        "mesh",
        &[("celltype", cell_type.name().to_owned()), ("dim", "3".to_owned())],
    )?;

    open(&mut writer, "vertices", &[("size", mesh.vertices().len().to_string())])?;
    for (i, v) in mesh.vertices().iter().enumerate() {
        empty(
            &mut writer,
            "vertex",
            &[
                ("index", i.to_string()),
                ("x", v.x.to_string()),
                ("y", v.y.to_string()),
                ("z", v.z.to_string()),
            ],
        )?;
    }
    close(&mut writer, "vertices")?;

    const VERTEX_ATTRIBUTES: [&str; 8] = ["v0", "v1", "v2", "v3", "v4", "v5", "v6", "v7"];
    open(&mut writer, "cells", &[("size", mesh.cells().len().to_string())])?;
    for (i, cell) in mesh.cells().iter().enumerate() {
        let mut attributes = vec![("index", i.to_string())];
        for (name, node) in VERTEX_ATTRIBUTES.into_iter().zip(cell_type.reorder(&cell.nodes)) {
            attributes.push((name, node.to_string()));
        }
        empty(&mut writer, cell_type.name(), &attributes)?;
    }
    close(&mut writer, "cells")?;

    open(&mut writer, "domains", &[])?;
    for (dim, values) in [(Dim::Cell, &cell_values), (Dim::Facet, &facet_values)] {
        if values.is_empty() {
            continue;
        }
        open(
            &mut writer,
            "mesh_value_collection",
            &[
                ("name", format!("{dim}_domains")),
                ("type", "uint".to_owned()),
                ("dim", dim.as_u8().to_string()),
                ("size", values.len().to_string()),
            ],
        )?;
        for &(cell, local, id) in values.iter() {
            empty(
                &mut writer,
                "value",
                &[
                    ("cell_index", cell.to_string()),
                    ("local_entity", local.to_string()),
                    ("value", id.to_string()),
                ],
            )?;
        }
        close(&mut writer, "mesh_value_collection")?;
    }
    close(&mut writer, "domains")?;

    open(&mut writer, "shellmesh:domain_names", &[])?;
    for domain in domains.domains() {
        empty(
            &mut writer,
            "shellmesh:domain",
            &[
                ("dim", domain.key.dim.as_u8().to_string()),
                ("id", domain.key.id.to_string()),
                ("name", domain.name.clone()),
            ],
        )?;
    }
    close(&mut writer, "shellmesh:domain_names")?;

    close(&mut writer, "mesh")?;
    close(&mut writer, "dolfin")?;
    writer.into_inner().write_all(b"\n")?;

    debug!(
        "wrote {} cell and {} facet domain values",
        cell_values.len(),
        facet_values.len()
    );
    Ok(())
}

fn attribute<T: std::str::FromStr>(node: roxmltree::Node, name: &str) -> Result<T> {
    let value = node.attribute(name).ok_or_else(|| {
        ShellmeshError::file_format(format!(
            "<{}> is missing attribute '{name}'",
            node.tag_name().name()
        ))
    })?;
    value.parse().map_err(|_| {
        ShellmeshError::file_format(format!(
            "<{}> has invalid {name} '{value}'",
            node.tag_name().name()
        ))
    })
}

fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

fn elements<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// Parses a DOLFIN XML mesh with tetrahedral or hexahedral cells.
///
/// Facets are created for every facet domain value. Tags without a stored
/// name stay pending.
pub fn parse_xml(contents: &str) -> Result<MeshContainer> {
    let document = roxmltree::Document::parse(contents)
        .map_err(|err| ShellmeshError::file_format(format!("invalid XML: {err}")))?;
    let root = document.root_element();
    if root.tag_name().name() != "dolfin" {
        return Err(ShellmeshError::file_format("root element is not <dolfin>"));
    }
    let mesh_node = child(root, "mesh")
        .ok_or_else(|| ShellmeshError::file_format("missing <mesh> element"))?;
    let cell_type = CellType::from_name(mesh_node.attribute("celltype").unwrap_or_default())?;

    let vertex_parent = child(mesh_node, "vertices")
        .ok_or_else(|| ShellmeshError::file_format("missing <vertices> element"))?;
    let mut indexed_vertices = Vec::new();
    for node in elements(vertex_parent, "vertex") {
        let index: usize = attribute(node, "index")?;
        let z = match node.attribute("z") {
            Some(_) => attribute(node, "z")?,
            None => 0.0,
        };
        indexed_vertices.push((index, Vertex::new(attribute(node, "x")?, attribute(node, "y")?, z)));
    }
    indexed_vertices.sort_by_key(|(index, _)| *index);
    if indexed_vertices.iter().enumerate().any(|(i, (index, _))| i != *index) {
        return Err(ShellmeshError::file_format(
            "vertex indices are not a contiguous range from 0",
        ));
    }
    let vertices: Vec<Vertex> = indexed_vertices.into_iter().map(|(_, v)| v).collect();

    let cell_parent = child(mesh_node, "cells")
        .ok_or_else(|| ShellmeshError::file_format("missing <cells> element"))?;
    let node_count = cell_type.kind().node_count();
    let mut indexed_cells = Vec::new();
    let mut dolfin_cells = Vec::new();
    for node in cell_parent.children().filter(|c| c.is_element()) {
        if node.tag_name().name() != cell_type.name() {
            return Err(ShellmeshError::file_format(format!(
                "mixed cell kinds: <{}> in a {} mesh",
                node.tag_name().name(),
                cell_type.name()
            )));
        }
        let index: usize = attribute(node, "index")?;
        let nodes = (0..node_count)
            .map(|v| attribute::<usize>(node, &format!("v{v}")))
            .collect::<Result<Vec<usize>>>()?;
        indexed_cells.push((index, nodes));
    }
    indexed_cells.sort_by_key(|(index, _)| *index);
    let mut cells = Vec::with_capacity(indexed_cells.len());
    for (i, (index, nodes)) in indexed_cells.into_iter().enumerate() {
        if i != index {
            return Err(ShellmeshError::file_format(
                "cell indices are not a contiguous range from 0",
            ));
        }
        cells.push(Element::new(cell_type.kind(), cell_type.reorder(&nodes)));
        dolfin_cells.push(nodes);
    }

    let mut names = Vec::new();
    if let Some(list) = child(mesh_node, "domain_names") {
        for node in elements(list, "domain") {
            let dim = Dim::from_u8(attribute(node, "dim")?)?;
            let id: u32 = attribute(node, "id")?;
            let name = node.attribute("name").unwrap_or_default().to_owned();
            names.push((dim, id, name));
        }
    }

    let mut cell_tags = Vec::new();
    let mut facets: Vec<Element> = Vec::new();
    let mut facet_lookup: HashMap<Vec<usize>, usize> = HashMap::new();
    let mut facet_tags = Vec::new();
    if let Some(domains_node) = child(mesh_node, "domains") {
        for collection in elements(domains_node, "mesh_value_collection") {
            let dim: u8 = attribute(collection, "dim")?;
            for value in elements(collection, "value") {
                let cell: usize = attribute(value, "cell_index")?;
                let local: usize = attribute(value, "local_entity")?;
                let id: u32 = attribute(value, "value")?;
                let dolfin_nodes = dolfin_cells.get(cell).ok_or_else(|| {
                    ShellmeshError::file_format(format!("domain value refers to missing cell {cell}"))
                })?;
                match dim {
                    3 => cell_tags.push((cell, id)),
                    2 => {
                        if local >= cell_type.local_facets().len() {
                            return Err(ShellmeshError::file_format(format!(
                                "cell {cell} has no local facet {local}"
                            )));
                        }
                        let facet = cell_type.facet(dolfin_nodes, local);
                        let key = face_key(&facet.nodes);
                        let entity = *facet_lookup.entry(key).or_insert_with(|| {
                            facets.push(facet);
                            facets.len() - 1
                        });
                        facet_tags.push((entity, id));
                    }
                    other => debug!("ignoring {other}-dimensional domain values"),
                }
            }
        }
    }

    let mut mesh = MeshContainer::new();
    let offset = mesh.append_vertices(&vertices);
    mesh.append_cells(&cells, offset)?;
    mesh.append_facets(&facets, offset)?;
    let domains = mesh.domains_mut();
    for (dim, id, name) in &names {
        domains.register_domain(*dim, *id, name)?;
    }
    for (cell, id) in cell_tags {
        domains.tag_entity(Dim::Cell, id, cell);
    }
    for (facet, id) in facet_tags {
        domains.tag_entity(Dim::Facet, id, facet);
    }
    Ok(mesh)
}
