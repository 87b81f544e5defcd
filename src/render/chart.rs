//! Chart loading
//!
//! A chart is a directory with template sources under `templates/`,
//! bundled schema/definition files under `crds/`, and optional values
//! profiles (`profile-<name>.yaml`) at the chart root.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// File name suffix for chart notes files, excluded from rendered manifests
pub const NOTES_FILE_SUFFIX: &str = ".txt";

/// One file bundled in a chart
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartFile {
    /// Path relative to its section root, `/`-separated
    pub name: String,
    /// Raw file contents
    pub content: String,
}

/// An in-memory chart
#[derive(Clone, Debug, Default)]
pub struct Chart {
    /// Chart (component) name
    pub name: String,
    /// Template sources
    pub templates: Vec<ChartFile>,
    /// Bundled CRD definition files
    pub crds: Vec<ChartFile>,
}

impl Chart {
    /// Load a chart from `dir`
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::render(format!("chart '{}' does not exist", name)));
        }
        Ok(Self {
            name: name.to_string(),
            templates: read_files_recursive(&dir.join("templates"))?,
            crds: read_files_recursive(&dir.join("crds"))?,
        })
    }
}

/// Read a named values profile bundled at the chart root
pub fn load_values(chart_dir: &Path, profile: &str) -> Result<String> {
    let path = chart_dir.join(format!("profile-{}.yaml", profile));
    Ok(fs::read_to_string(path)?)
}

/// Collect all regular files under `root`, names relative to `root` with
/// `/` separators. A missing section directory is an empty section.
fn read_files_recursive(root: &Path) -> Result<Vec<ChartFile>> {
    let mut files = Vec::new();
    if root.is_dir() {
        collect(root, root, &mut files)?;
    }
    Ok(files)
}

fn collect(root: &Path, dir: &Path, files: &mut Vec<ChartFile>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect(root, &path, files)?;
        } else {
            let name = path
                .strip_prefix(root)
                .map_err(|e| Error::render(format!("chart path outside root: {}", e)))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(ChartFile {
                name,
                content: fs::read_to_string(&path)?,
            });
        }
    }
    Ok(())
}
