//! Custom Resource Definitions for the Composition Operator

mod component;
mod composition;

pub use component::*;
pub use composition::*;

use kube::CustomResourceExt;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Vec<String> {
    vec![
        serde_yaml::to_string(&Composition::crd()).unwrap(),
        serde_yaml::to_string(&Component::crd()).unwrap(),
    ]
}
