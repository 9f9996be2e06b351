//! Mesh file dispatch by extension.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::error::{Result, ShellmeshError};
use crate::mesh::MeshContainer;
use crate::{dolfin, gmsh};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    /// Gmsh MSH 2.2 ASCII (`.msh`)
    Gmsh,
    /// DOLFIN XML (`.xml`)
    Dolfin,
}

impl MeshFormat {
    pub fn from_path(path: &Path) -> Result<MeshFormat> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("msh") => Ok(MeshFormat::Gmsh),
            Some("xml") => Ok(MeshFormat::Dolfin),
            _ => Err(ShellmeshError::file_format(format!(
                "unsupported mesh file '{}': expected a .msh or .xml extension",
                path.display()
            ))),
        }
    }
}

/// Reads a whole text file, reporting a missing file as `FileNotFound`.
pub(crate) fn read_source(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(ShellmeshError::FileNotFound(path.to_path_buf()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Loads a mesh, choosing the reader from the file extension.
pub fn read_mesh(path: &Path) -> Result<MeshContainer> {
    let format = MeshFormat::from_path(path)?;
    let contents = read_source(path)?;
    let mesh = match format {
        MeshFormat::Gmsh => gmsh::parse_msh(&contents)?,
        MeshFormat::Dolfin => dolfin::parse_xml(&contents)?,
    };
    info!(
        "read {} vertices, {} cells, {} facets from {}",
        mesh.vertices().len(),
        mesh.cells().len(),
        mesh.facets().len(),
        path.display()
    );
    Ok(mesh)
}

/// Writes a mesh, choosing the writer from the file extension.
///
/// The mesh is serialized in memory first, so no file is created when the
/// mesh cannot be represented in the target format.
pub fn write_mesh(mesh: &MeshContainer, path: &Path) -> Result<()> {
    let format = MeshFormat::from_path(path)?;
    let mut buffer = Vec::new();
    match format {
        MeshFormat::Gmsh => gmsh::write_msh(mesh, &mut buffer)?,
        MeshFormat::Dolfin => dolfin::write_xml(mesh, &mut buffer)?,
    }
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&buffer)?;
    out.flush()?;
    info!("wrote mesh to {}", path.display());
    Ok(())
}
