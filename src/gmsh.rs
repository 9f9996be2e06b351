//! Gmsh MSH 2.2 ASCII reader and writer.

use std::collections::HashMap;
use std::io::Write;
use std::str::FromStr;

use tracing::debug;

use crate::datatypes::{Dim, Element, ElementKind, Vertex};
use crate::error::{Result, ShellmeshError};
use crate::mesh::MeshContainer;

enum MeshParseState {
    MeshFormat,
    PhysicalNames,
    Nodes,
    Elements,
    Skipped,
    Limbo,
}

/// Element type codes; `Ok(None)` for types carrying no cell or facet.
fn element_kind(code: u32) -> Result<Option<ElementKind>> {
    match code {
        1 | 15 => Ok(None),
        2 => Ok(Some(ElementKind::Triangle)),
        3 => Ok(Some(ElementKind::Quadrilateral)),
        4 => Ok(Some(ElementKind::Tetrahedron)),
        5 => Ok(Some(ElementKind::Hexahedron)),
        6 => Ok(Some(ElementKind::Prism)),
        7 => Ok(Some(ElementKind::Pyramid)),
        other => Err(ShellmeshError::file_format(format!(
            "unsupported gmsh element type {other}"
        ))),
    }
}

fn element_code(kind: ElementKind) -> u32 {
    match kind {
        ElementKind::Triangle => 2,
        ElementKind::Quadrilateral => 3,
        ElementKind::Tetrahedron => 4,
        ElementKind::Hexahedron => 5,
        ElementKind::Prism => 6,
        ElementKind::Pyramid => 7,
    }
}

fn field<T: FromStr>(token: Option<&str>, what: &str, line_no: usize) -> Result<T> {
    let token = token.ok_or_else(|| {
        ShellmeshError::file_format(format!("line {line_no}: missing {what}"))
    })?;
    token.parse().map_err(|_| {
        ShellmeshError::file_format(format!("line {line_no}: invalid {what} '{token}'"))
    })
}

struct ParsedElement {
    element: Element,
    physical: u32,
}

/// Parses the contents of an MSH 2.x ASCII file.
///
/// Named physical groups become registered domains; unnamed non-zero
/// physical tags are kept as pending raw tags.
pub fn parse_msh(contents: &str) -> Result<MeshContainer> {
    let mut parser_state = MeshParseState::Limbo;
    let mut parsed_section_metadata = false;
    let mut seen_format = false;

    let mut names: Vec<(Dim, u32, String)> = Vec::new();
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut node_indexes: HashMap<usize, usize> = HashMap::new();
    let mut elements: Vec<(usize, Vec<usize>, ElementKind, u32)> = Vec::new();

    for (i, line) in contents.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("$End") {
            parser_state = MeshParseState::Limbo;
            continue;
        }

        match parser_state {
            MeshParseState::Limbo => {
                parsed_section_metadata = false;
                parser_state = match line {
                    "$MeshFormat" => MeshParseState::MeshFormat,
                    "$PhysicalNames" => MeshParseState::PhysicalNames,
                    "$Nodes" => MeshParseState::Nodes,
                    "$Elements" => MeshParseState::Elements,
                    section if section.starts_with('$') => MeshParseState::Skipped,
                    other => {
                        return Err(ShellmeshError::file_format(format!(
                            "line {line_no}: unexpected content '{other}' outside a section"
                        )))
                    }
                };
            }
            MeshParseState::MeshFormat => {
                let mut tokens = line.split_whitespace();
                let version: String = field(tokens.next(), "format version", line_no)?;
                let file_type: u32 = field(tokens.next(), "file type", line_no)?;
                if !version.starts_with("2.") {
                    return Err(ShellmeshError::file_format(format!(
                        "unsupported MSH version {version}, expected 2.x"
                    )));
                }
                if file_type != 0 {
                    return Err(ShellmeshError::file_format(
                        "binary MSH files are not supported",
                    ));
                }
                seen_format = true;
            }
            MeshParseState::PhysicalNames => {
                if !parsed_section_metadata {
                    parsed_section_metadata = true;
                    continue;
                }
                let mut tokens = line.splitn(3, char::is_whitespace);
                let dim: u8 = field(tokens.next(), "physical dimension", line_no)?;
                let tag: u32 = field(tokens.next(), "physical tag", line_no)?;
                let name = tokens.next().unwrap_or("").trim().trim_matches('"');
                // points and lines have no place in the container
                if let Ok(dim) = Dim::from_u8(dim) {
                    names.push((dim, tag, name.to_owned()));
                }
            }
            MeshParseState::Nodes => {
                if !parsed_section_metadata {
                    parsed_section_metadata = true;
                    continue;
                }
                let mut tokens = line.split_whitespace();
                let tag: usize = field(tokens.next(), "node tag", line_no)?;
                let x: f64 = field(tokens.next(), "x coordinate", line_no)?;
                let y: f64 = field(tokens.next(), "y coordinate", line_no)?;
                let z: f64 = field(tokens.next(), "z coordinate", line_no)?;
                if node_indexes.insert(tag, vertices.len()).is_some() {
                    return Err(ShellmeshError::file_format(format!(
                        "line {line_no}: duplicate node tag {tag}"
                    )));
                }
                vertices.push(Vertex::new(x, y, z));
            }
            MeshParseState::Elements => {
                if !parsed_section_metadata {
                    parsed_section_metadata = true;
                    continue;
                }
                let mut tokens = line.split_whitespace();
                let _id: usize = field(tokens.next(), "element id", line_no)?;
                let code: u32 = field(tokens.next(), "element type", line_no)?;
                let tag_count: usize = field(tokens.next(), "tag count", line_no)?;
                let mut physical = 0;
                for t in 0..tag_count {
                    let tag: u32 = field(tokens.next(), "element tag", line_no)?;
                    if t == 0 {
                        physical = tag;
                    }
                }
                let Some(kind) = element_kind(code)? else {
                    continue;
                };
                let nodes = tokens
                    .map(|t| field::<usize>(Some(t), "node tag", line_no))
                    .collect::<Result<Vec<usize>>>()?;
                if nodes.len() != kind.node_count() {
                    return Err(ShellmeshError::file_format(format!(
                        "line {line_no}: {kind:?} needs {} nodes, got {}",
                        kind.node_count(),
                        nodes.len()
                    )));
                }
                elements.push((line_no, nodes, kind, physical));
            }
            MeshParseState::Skipped => continue,
        }
    }

    if !seen_format {
        return Err(ShellmeshError::file_format("missing $MeshFormat section"));
    }

    let mut parsed = Vec::with_capacity(elements.len());
    for (line_no, tags, kind, physical) in elements {
        let nodes = tags
            .iter()
            .map(|tag| {
                node_indexes.get(tag).copied().ok_or_else(|| {
                    ShellmeshError::file_format(format!(
                        "line {line_no}: element references unknown node {tag}"
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        parsed.push(ParsedElement {
            element: Element::new(kind, nodes),
            physical,
        });
    }

    let (cells, facets): (Vec<ParsedElement>, Vec<ParsedElement>) =
        parsed.into_iter().partition(|p| p.element.dim() == Dim::Cell);

    let mut mesh = MeshContainer::new();
    let offset = mesh.append_vertices(&vertices);
    let cell_elements: Vec<Element> = cells.iter().map(|p| p.element.clone()).collect();
    let facet_elements: Vec<Element> = facets.iter().map(|p| p.element.clone()).collect();
    let cell_range = mesh.append_cells(&cell_elements, offset)?;
    let facet_range = mesh.append_facets(&facet_elements, offset)?;

    let domains = mesh.domains_mut();
    for (dim, tag, name) in &names {
        domains.register_domain(*dim, *tag, name)?;
    }
    for (entity, p) in cell_range.zip(&cells) {
        if p.physical != 0 {
            domains.tag_entity(Dim::Cell, p.physical, entity);
        }
    }
    for (entity, p) in facet_range.zip(&facets) {
        if p.physical != 0 {
            domains.tag_entity(Dim::Facet, p.physical, entity);
        }
    }

    debug!(
        "parsed MSH with {} named groups and {} pending tags",
        names.len(),
        mesh.domains().pending_count()
    );
    Ok(mesh)
}

/// Writes the mesh as MSH 2.2 ASCII.
///
/// Each element carries its domain id as both physical and elementary tag,
/// 0 when untagged. Registered domains are listed in `$PhysicalNames`.
pub fn write_msh<W: Write>(mesh: &MeshContainer, out: &mut W) -> Result<()> {
    writeln!(out, "$MeshFormat")?;
    writeln!(out, "2.2 0 8")?;
    writeln!(out, "$EndMeshFormat")?;

    let domains = mesh.domains();
    if domains.domain_count() > 0 {
        writeln!(out, "$PhysicalNames")?;
        writeln!(out, "{}", domains.domain_count())?;
        for domain in domains.domains() {
            writeln!(
                out,
                "{} {} \"{}\"",
                domain.key.dim.as_u8(),
                domain.key.id,
                domain.name
            )?;
        }
        writeln!(out, "$EndPhysicalNames")?;
    }

    writeln!(out, "$Nodes")?;
    writeln!(out, "{}", mesh.vertices().len())?;
    for (i, v) in mesh.vertices().iter().enumerate() {
        writeln!(out, "{} {} {} {}", i + 1, v.x, v.y, v.z)?;
    }
    writeln!(out, "$EndNodes")?;

    writeln!(out, "$Elements")?;
    writeln!(out, "{}", mesh.cells().len() + mesh.facets().len())?;
    let mut id = 0;
    for dim in [Dim::Facet, Dim::Cell] {
        for (entity, element) in mesh.elements(dim).iter().enumerate() {
            id += 1;
            let physical = domains.domain_of(dim, entity).unwrap_or(0);
            write!(
                out,
                "{id} {} 2 {physical} {physical}",
                element_code(element.kind)
            )?;
            for node in &element.nodes {
                write!(out, " {}", node + 1)?;
            }
            writeln!(out)?;
        }
    }
    writeln!(out, "$EndElements")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_TETS: &str = "\
$MeshFormat
2.2 0 8
$EndMeshFormat
$PhysicalNames
3
1 9 \"edge\"
2 5 \"bottom face\"
3 1 \"magnet\"
$EndPhysicalNames
$Nodes
5
10 0 0 0
20 1 0 0
30 0 1 0
40 0 0 1
50 0 0 -1
$EndNodes
$Elements
5
1 15 2 0 1 10
2 1 2 9 1 10 20
3 2 2 5 1 10 20 30
4 4 2 1 1 10 20 30 40
5 4 2 7 2 10 30 20 50
$EndElements
";

    #[test]
    fn reads_named_and_raw_tags() {
        let mesh = parse_msh(TWO_TETS).unwrap();
        assert_eq!(mesh.vertices().len(), 5);
        assert_eq!(mesh.cells().len(), 2);
        assert_eq!(mesh.facets().len(), 1);
        assert_eq!(mesh.cells()[1].nodes, vec![0, 2, 1, 4]);

        let domains = mesh.domains();
        assert_eq!(domains.domain_name(Dim::Facet, 5).unwrap(), "bottom face");
        assert_eq!(domains.domain_name(Dim::Cell, 1).unwrap(), "magnet");
        assert_eq!(domains.domain_count(), 2);
        assert_eq!(domains.pending_ids(Dim::Cell), vec![7]);
        assert_eq!(domains.domain_of(Dim::Cell, 1), Some(7));
        mesh.validate().unwrap();
    }

    #[test]
    fn rejects_other_versions() {
        let msh4 = TWO_TETS.replace("2.2 0 8", "4.1 0 8");
        assert!(matches!(
            parse_msh(&msh4),
            Err(ShellmeshError::FileFormat(_))
        ));
        let binary = TWO_TETS.replace("2.2 0 8", "2.2 1 8");
        assert!(parse_msh(&binary).is_err());
    }

    #[test]
    fn rejects_dangling_and_malformed_elements() {
        let dangling = TWO_TETS.replace("4 4 2 1 1 10 20 30 40", "4 4 2 1 1 10 20 30 99");
        assert!(matches!(
            parse_msh(&dangling),
            Err(ShellmeshError::FileFormat(msg)) if msg.contains("unknown node 99")
        ));
        let short = TWO_TETS.replace("4 4 2 1 1 10 20 30 40", "4 4 2 1 1 10 20 30");
        assert!(parse_msh(&short).is_err());
        assert!(parse_msh("$Nodes\n1\n1 0 0 0\n$EndNodes\n").is_err());
    }

    #[test]
    fn written_file_reads_back() {
        let mut mesh = parse_msh(TWO_TETS).unwrap();
        mesh.domains_mut().prepare_domains();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tets.msh");
        let mut file = std::fs::File::create(&path).unwrap();
        write_msh(&mesh, &mut file).unwrap();
        drop(file);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("3 7 \"cell_domain_7\""));
        let back = parse_msh(&contents).unwrap();
        assert_eq!(back.vertices(), mesh.vertices());
        assert_eq!(back.cells(), mesh.cells());
        assert_eq!(back.facets(), mesh.facets());
        assert_eq!(back.domains().domain_count(), 3);
        assert_eq!(back.domains().pending_count(), 0);
        assert_eq!(back.domains().domain_of(Dim::Cell, 0), Some(1));
    }
}
