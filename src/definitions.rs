//! Ontology definition files
//!
//! Definitions can be declared in TOML or JSON instead of Rust. A file holds
//! either one definition or a list under `ontology`:
//!
//! ```toml
//! tag = "lidar_scan"
//! serialization_format = "ragged"
//!
//! [[fields]]
//! name = "ranges"
//! type = { list = "float32" }
//!
//! [[fields]]
//! name = "frame_id"
//! type = "string"
//! nullable = true
//! ```
//!
//! Directories are walked recursively in file-name order; files with other
//! extensions are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{OntologyError, Result};
use crate::registry::OntologyRegistry;
use crate::schema::OntologyDefinition;

/// Supported definition file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Toml,
    Json,
}

impl DefinitionFormat {
    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Some(DefinitionFormat::Toml),
            Some("json") => Some(DefinitionFormat::Json),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    Many { ontology: Vec<OntologyDefinition> },
    One(OntologyDefinition),
}

impl DefinitionFile {
    fn into_vec(self) -> Vec<OntologyDefinition> {
        match self {
            DefinitionFile::Many { ontology } => ontology,
            DefinitionFile::One(definition) => vec![definition],
        }
    }
}

/// Parse the definitions held in one document
pub fn parse_definitions(content: &str, format: DefinitionFormat) -> Result<Vec<OntologyDefinition>> {
    let file: DefinitionFile = match format {
        DefinitionFormat::Toml => toml::from_str(content)?,
        DefinitionFormat::Json => serde_json::from_str(content)?,
    };
    Ok(file.into_vec())
}

/// Load the definitions of a single file
pub fn load_file(path: &Path) -> Result<Vec<OntologyDefinition>> {
    let format = DefinitionFormat::from_path(path).ok_or_else(|| {
        OntologyError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("unsupported definition file: {}", path.display()),
        ))
    })?;
    let content = fs::read_to_string(path)?;
    let definitions = parse_definitions(&content, format)?;
    debug!(path = %path.display(), count = definitions.len(), "loaded definitions");
    Ok(definitions)
}

/// Load a file, or every `.toml`/`.json` file below a directory
pub fn load_path(path: &Path) -> Result<Vec<OntologyDefinition>> {
    if path.is_file() {
        return load_file(path);
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && DefinitionFormat::from_path(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }

    let mut definitions = Vec::new();
    for file in &files {
        definitions.extend(load_file(file)?);
    }
    Ok(definitions)
}

/// Load every path and register the definitions found, in order.
///
/// Stops at the first failure; definitions registered before it stay
/// registered. Returns the number of registered definitions.
pub fn register_paths<P: AsRef<Path>>(registry: &OntologyRegistry, paths: &[P]) -> Result<usize> {
    let mut count = 0;
    for path in paths {
        for definition in load_path(path.as_ref())? {
            registry.register_definition(definition)?;
            count += 1;
        }
    }
    info!(count, "registered ontology definitions");
    Ok(count)
}
