//! Chart template rendering
//!
//! Turns a named chart plus a values document into one deterministic
//! multi-document manifest string: rendered template outputs, trimmed and
//! separated by `"\n---\n"`, ordered lexically by in-chart path with
//! notes files excluded, followed by any chart-bundled CRD files ordered
//! lexically by name. Rendering the same chart/values pair twice yields
//! byte-identical output.
//!
//! Per-file expansion is behind [`TemplateEngine`]; the shipped
//! [`StaticEngine`] passes plain-manifest charts through verbatim.

mod chart;

pub use chart::{load_values, Chart, ChartFile, NOTES_FILE_SUFFIX};

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_yaml::Value;

use crate::error::{Error, Result};

/// Separator between documents in a multi-document manifest
pub const YAML_SEPARATOR: &str = "\n---\n";

/// Release coordinates handed to the template engine
#[derive(Clone, Debug)]
pub struct ReleaseOptions {
    /// Release (component) name
    pub name: String,
    /// Target namespace
    pub namespace: String,
}

/// Per-file template expansion
pub trait TemplateEngine {
    fn expand(&self, file: &ChartFile, values: &Value, release: &ReleaseOptions) -> Result<String>;
}

/// Engine for charts of plain manifests: sources are emitted verbatim
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticEngine;

impl TemplateEngine for StaticEngine {
    fn expand(&self, file: &ChartFile, _values: &Value, _release: &ReleaseOptions) -> Result<String> {
        Ok(file.content.clone())
    }
}

/// A template renderer for one chart
pub trait TemplateRenderer {
    /// Load the chart's files; must be called before rendering
    fn prepare(&mut self) -> Result<()>;

    /// Render the chart with the given values YAML document
    fn render(&self, values: &str) -> Result<String>;
}

/// Renders a chart loaded from a directory with a pluggable engine
pub struct ChartRenderer<E = StaticEngine> {
    dir: PathBuf,
    component_name: String,
    namespace: String,
    engine: E,
    chart: Option<Chart>,
}

impl<E: TemplateEngine> ChartRenderer<E> {
    pub fn new(
        dir: impl Into<PathBuf>,
        component_name: &str,
        namespace: &str,
        engine: E,
    ) -> Self {
        Self {
            dir: dir.into(),
            component_name: component_name.to_string(),
            namespace: namespace.to_string(),
            engine,
            chart: None,
        }
    }
}

impl<E: TemplateEngine> TemplateRenderer for ChartRenderer<E> {
    fn prepare(&mut self) -> Result<()> {
        self.chart = Some(Chart::load(&self.dir, &self.component_name)?);
        Ok(())
    }

    fn render(&self, values: &str) -> Result<String> {
        let Some(chart) = &self.chart else {
            return Err(Error::render(format!(
                "renderer for '{}' not prepared",
                self.component_name
            )));
        };
        let values = parse_values(values)?;
        let release = ReleaseOptions {
            name: self.component_name.clone(),
            namespace: self.namespace.clone(),
        };
        render_chart(chart, &values, &release, &self.engine)
    }
}

/// Parse a values document; empty input is an empty mapping
fn parse_values(values: &str) -> Result<Value> {
    if values.trim().is_empty() {
        return Ok(Value::Mapping(Default::default()));
    }
    serde_yaml::from_str(values).map_err(|e| Error::render(format!("failed to parse values: {}", e)))
}

/// Assemble the manifest for a chart.
///
/// Template outputs are keyed by in-chart path in a sorted map, so the
/// result is stable regardless of the order files were loaded in.
pub fn render_chart<E: TemplateEngine>(
    chart: &Chart,
    values: &Value,
    release: &ReleaseOptions,
    engine: &E,
) -> Result<String> {
    let mut rendered = BTreeMap::new();
    for file in &chart.templates {
        if file.name.ends_with(NOTES_FILE_SUFFIX) {
            continue;
        }
        rendered.insert(file.name.clone(), engine.expand(file, values, release)?);
    }

    let mut manifest = String::new();
    for content in rendered.values() {
        push_document(&mut manifest, content);
    }

    let mut crds: Vec<&ChartFile> = chart.crds.iter().collect();
    crds.sort_by(|a, b| a.name.cmp(&b.name));
    for crd in crds {
        push_document(&mut manifest, &crd.content);
    }

    Ok(manifest)
}

/// Trim, then terminate with the document separator
fn push_document(manifest: &mut String, content: &str) {
    let mut document = content.trim().to_string();
    document.push('\n');
    if !document.ends_with(YAML_SEPARATOR) {
        document.push_str(YAML_SEPARATOR);
    }
    manifest.push_str(&document);
}
