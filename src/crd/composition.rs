//! Composition Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Composition resource specification
///
/// A Composition declares the set of components that should exist. The
/// operator materializes one Component child per entry and aggregates
/// their provisioning state back into the Composition status.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "composition.dev",
    version = "v1alpha1",
    kind = "Composition",
    plural = "compositions",
    singular = "composition",
    shortname = "comp",
    namespaced,
    status = "CompositionStatus",
    printcolumn = r#"{"name": "Status", "type": "string", "jsonPath": ".status.status"}"#,
    printcolumn = r#"{"name": "Waiting", "type": "string", "jsonPath": ".status.waitingFor"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CompositionSpec {
    /// Components that should exist for this composition, in order
    #[serde(default)]
    pub components: Vec<ComponentRef>,
}

/// A single desired component within a composition
///
/// `name` must be unique within the composition; the derived child is
/// named `<composition>-<name>`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRef {
    /// Logical component name
    pub name: String,
}

/// Composition status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompositionStatus {
    /// Aggregate status (reconciling, success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Component names not yet successful; recomputed in full on every pass
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waiting_for: Vec<String>,
}

/// Aggregate status value when every component reports success
pub const STATUS_SUCCESS: &str = "success";

/// Aggregate status value while at least one component is outstanding
pub const STATUS_RECONCILING: &str = "reconciling";
