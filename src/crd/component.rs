//! Component Custom Resource Definition

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Component resource specification
///
/// One Component instance represents a single desired component of its
/// owning Composition. Components are created and deleted exclusively by
/// the composition reconciler; their status is advanced exclusively by the
/// component reconciler.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "composition.dev",
    version = "v1alpha1",
    kind = "Component",
    plural = "components",
    singular = "component",
    shortname = "cmp",
    namespaced,
    status = "ComponentStatus",
    printcolumn = r#"{"name": "Component", "type": "string", "jsonPath": ".spec.componentName"}"#,
    printcolumn = r#"{"name": "Status", "type": "string", "jsonPath": ".status.status"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Logical component this instance provisions; immutable after creation
    pub component_name: String,
}

/// Component status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Current provisioning phase (pending, started, failing, retrying, success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// When the phase last changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// Provisioning phases a Component moves through
pub mod phase {
    pub const PENDING: &str = "pending";
    pub const STARTED: &str = "started";
    pub const FAILING: &str = "failing";
    pub const RETRYING: &str = "retrying";
    pub const SUCCESS: &str = "success";
}

/// Derived child name for a component of a composition
///
/// The derived name doubles as the uniqueness key within the namespace.
pub fn child_name(composition: &str, component: &str) -> String {
    format!("{}-{}", composition, component)
}
