//! Integration tests for chart rendering
//!
//! These tests verify the deterministic manifest assembly contract:
//! lexical template ordering, notes-file exclusion, trim/separator
//! discipline, CRD file placement, and byte-identical repeat rendering.

use std::fs;

use serde_yaml::Value;

use composition_operator::render::{
    load_values, render_chart, Chart, ChartFile, ChartRenderer, ReleaseOptions, StaticEngine,
    TemplateEngine, TemplateRenderer, YAML_SEPARATOR,
};
use composition_operator::Result;

// ============================================================================
// Test Helpers
// ============================================================================

fn file(name: &str, content: &str) -> ChartFile {
    ChartFile {
        name: name.to_string(),
        content: content.to_string(),
    }
}

fn release() -> ReleaseOptions {
    ReleaseOptions {
        name: "web".to_string(),
        namespace: "ns".to_string(),
    }
}

fn empty_values() -> Value {
    Value::Mapping(Default::default())
}

/// Engine that stamps release coordinates and one values key into every
/// document, to prove the engine sees both.
struct LabelEngine;

impl TemplateEngine for LabelEngine {
    fn expand(&self, file: &ChartFile, values: &Value, release: &ReleaseOptions) -> Result<String> {
        let tier = values
            .get("tier")
            .and_then(|tier| tier.as_str())
            .unwrap_or("default");
        Ok(format!(
            "# {}\nrelease: {}\nnamespace: {}\ntier: {}",
            file.name, release.name, release.namespace, tier
        ))
    }
}

// ============================================================================
// Assembly
// ============================================================================

#[test]
fn templates_are_ordered_lexically_not_by_load_order() {
    let chart = Chart {
        name: "web".to_string(),
        templates: vec![file("b.yaml", "kind: B"), file("a.yaml", "kind: A")],
        crds: vec![],
    };

    let manifest = render_chart(&chart, &empty_values(), &release(), &StaticEngine).unwrap();
    assert_eq!(manifest, "kind: A\n\n---\nkind: B\n\n---\n");
}

#[test]
fn notes_files_never_appear_in_the_manifest() {
    let chart = Chart {
        name: "web".to_string(),
        templates: vec![
            file("NOTES.txt", "thanks for installing"),
            file("deploy.yaml", "kind: Deployment"),
        ],
        crds: vec![],
    };

    let manifest = render_chart(&chart, &empty_values(), &release(), &StaticEngine).unwrap();
    assert!(!manifest.contains("thanks for installing"));
    assert!(manifest.contains("kind: Deployment"));
}

#[test]
fn documents_are_trimmed_and_separator_terminated() {
    let chart = Chart {
        name: "web".to_string(),
        templates: vec![file("a.yaml", "\n\n  kind: A  \n\n")],
        crds: vec![],
    };

    let manifest = render_chart(&chart, &empty_values(), &release(), &StaticEngine).unwrap();
    assert_eq!(manifest, "kind: A\n\n---\n");
    assert!(manifest.ends_with(YAML_SEPARATOR));
}

#[test]
fn crd_files_follow_templates_sorted_by_name() {
    let chart = Chart {
        name: "web".to_string(),
        templates: vec![file("z.yaml", "kind: Z")],
        crds: vec![file("b-crd.yaml", "kind: CrdB"), file("a-crd.yaml", "kind: CrdA")],
    };

    let manifest = render_chart(&chart, &empty_values(), &release(), &StaticEngine).unwrap();
    let z = manifest.find("kind: Z").unwrap();
    let a = manifest.find("kind: CrdA").unwrap();
    let b = manifest.find("kind: CrdB").unwrap();
    assert!(z < a && a < b);
}

#[test]
fn rendering_twice_is_byte_identical() {
    let chart = Chart {
        name: "web".to_string(),
        templates: vec![
            file("svc.yaml", "kind: Service"),
            file("deploy.yaml", "kind: Deployment"),
            file("cm.yaml", "kind: ConfigMap"),
        ],
        crds: vec![file("crd.yaml", "kind: CustomResourceDefinition")],
    };

    let first = render_chart(&chart, &empty_values(), &release(), &StaticEngine).unwrap();
    let second = render_chart(&chart, &empty_values(), &release(), &StaticEngine).unwrap();
    assert_eq!(first, second);

    // a chart loaded in a different file order renders identically
    let mut reversed = chart.clone();
    reversed.templates.reverse();
    let third = render_chart(&reversed, &empty_values(), &release(), &StaticEngine).unwrap();
    assert_eq!(first, third);
}

#[test]
fn the_engine_receives_values_and_release_coordinates() {
    let chart = Chart {
        name: "web".to_string(),
        templates: vec![file("a.yaml", "")],
        crds: vec![],
    };
    let values: Value = serde_yaml::from_str("tier: gold").unwrap();

    let manifest = render_chart(&chart, &values, &release(), &LabelEngine).unwrap();
    assert!(manifest.contains("release: web"));
    assert!(manifest.contains("namespace: ns"));
    assert!(manifest.contains("tier: gold"));
}

// ============================================================================
// ChartRenderer over an on-disk chart
// ============================================================================

#[test]
fn renderer_loads_and_renders_a_chart_directory() {
    let dir = tempfile::tempdir().unwrap();
    let chart_dir = dir.path().join("web");
    fs::create_dir_all(chart_dir.join("templates/nested")).unwrap();
    fs::create_dir_all(chart_dir.join("crds")).unwrap();
    fs::write(chart_dir.join("templates/deploy.yaml"), "kind: Deployment").unwrap();
    fs::write(chart_dir.join("templates/nested/svc.yaml"), "kind: Service").unwrap();
    fs::write(chart_dir.join("templates/NOTES.txt"), "notes").unwrap();
    fs::write(chart_dir.join("crds/widgets.yaml"), "kind: CustomResourceDefinition").unwrap();

    let mut renderer = ChartRenderer::new(&chart_dir, "web", "ns", StaticEngine);
    renderer.prepare().unwrap();

    let manifest = renderer.render("").unwrap();
    assert!(manifest.contains("kind: Deployment"));
    assert!(manifest.contains("kind: Service"));
    assert!(manifest.contains("kind: CustomResourceDefinition"));
    assert!(!manifest.contains("notes"));

    // deterministic across repeat renders of the same chart/values pair
    assert_eq!(manifest, renderer.render("").unwrap());
}

#[test]
fn rendering_before_prepare_is_an_error() {
    let renderer = ChartRenderer::new("/nonexistent", "web", "ns", StaticEngine);
    assert!(renderer.render("").is_err());
}

#[test]
fn loading_a_missing_chart_is_an_error() {
    let mut renderer = ChartRenderer::new("/nonexistent/web", "web", "ns", StaticEngine);
    assert!(renderer.prepare().is_err());
}

#[test]
fn invalid_values_documents_are_rejected() {
    let chart_dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(chart_dir.path().join("templates")).unwrap();
    fs::write(chart_dir.path().join("templates/a.yaml"), "kind: A").unwrap();

    let mut renderer = ChartRenderer::new(chart_dir.path(), "web", "ns", StaticEngine);
    renderer.prepare().unwrap();
    assert!(renderer.render("[ unclosed").is_err());
}

#[test]
fn values_profiles_load_by_name_from_the_chart_root() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("profile-evaluation.yaml"), "tier: evaluation\n").unwrap();

    let values = load_values(dir.path(), "evaluation").unwrap();
    assert_eq!(values, "tier: evaluation\n");

    assert!(load_values(dir.path(), "production").is_err());
}
