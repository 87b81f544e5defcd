//! Composition reconciler
//!
//! Computes the desired child set from the composition spec, creates and
//! deletes Components accordingly, and aggregates their statuses into the
//! composition status. The diff is computed up front as a [`ReconcilePlan`]
//! so the mutation order is fixed: the creation pass runs fully before the
//! deletion pass, and a component that is being renamed never transiently
//! disappears.

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{DeleteParams, PostParams},
    runtime::controller::Action,
    Api, Resource, ResourceExt,
};
use tracing::{debug, error, info, warn};

use crate::controllers::Context;
use crate::crd::{
    child_name, phase, Component, ComponentRef, ComponentSpec, Composition, CompositionStatus,
    STATUS_RECONCILING, STATUS_SUCCESS,
};
use crate::error::{self, Error, Result};
use crate::metrics;

/// Work a single pass must perform, computed before any mutation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Component names with no corresponding child yet
    pub to_create: Vec<String>,
    /// All component names not yet successful, in spec order
    pub waiting_for: Vec<String>,
    /// Child object names whose component left the spec
    pub orphans: Vec<String>,
}

/// Diff the desired component set against the live children.
///
/// `waiting_for` is recomputed in full: newly created children and
/// pre-existing, still-in-progress children both contribute.
pub fn plan(desired: &[ComponentRef], children: &[Component]) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for component in desired {
        match children
            .iter()
            .find(|child| child.spec.component_name == component.name)
        {
            Some(child) => {
                let status = child
                    .status
                    .as_ref()
                    .and_then(|status| status.status.as_deref());
                if status != Some(phase::SUCCESS) {
                    plan.waiting_for.push(component.name.clone());
                }
            }
            None => {
                plan.waiting_for.push(component.name.clone());
                plan.to_create.push(component.name.clone());
            }
        }
    }

    for child in children {
        if !desired
            .iter()
            .any(|component| component.name == child.spec.component_name)
        {
            plan.orphans.push(child.name_any());
        }
    }

    plan
}

/// Aggregate status label for the composition
pub fn aggregate_status(waiting_for: &[String]) -> &'static str {
    if waiting_for.is_empty() {
        STATUS_SUCCESS
    } else {
        STATUS_RECONCILING
    }
}

/// Construct the child object for one desired component.
///
/// Fails only when the owner relation cannot be established; that is a
/// spec-level problem the caller must not retry.
pub fn build_component(composition: &Composition, component_name: &str) -> Result<Component> {
    let namespace = composition
        .namespace()
        .ok_or_else(|| Error::construction("composition has no namespace"))?;
    let owner = composition
        .controller_owner_ref(&())
        .ok_or_else(|| Error::construction("composition carries no name or uid for an owner reference"))?;

    Ok(Component {
        metadata: ObjectMeta {
            name: Some(child_name(&composition.name_any(), component_name)),
            namespace: Some(namespace),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: ComponentSpec {
            component_name: component_name.to_string(),
        },
        status: None,
    })
}

/// Fetch the composition's current children.
///
/// The owner index only discovers candidates; each is confirmed against
/// the store, so a stale index entry costs a lookup, never a wrong child.
async fn fetch_children(ctx: &Context, namespace: &str, owner: &str) -> Result<Vec<Component>> {
    let api: Api<Component> = Api::namespaced(ctx.client.clone(), namespace);
    let mut children = Vec::new();
    for name in ctx.owner_index.children_of(namespace, owner) {
        if let Some(component) = api.get_opt(&name).await? {
            children.push(component);
        }
    }
    Ok(children)
}

/// One reconciliation pass for a live composition
pub async fn apply(composition: Arc<Composition>, ctx: Arc<Context>) -> Result<Action> {
    let name = composition.name_any();
    let namespace = composition.namespace().unwrap_or_else(|| "default".to_string());
    let compositions: Api<Composition> = Api::namespaced(ctx.client.clone(), &namespace);
    let components: Api<Component> = Api::namespaced(ctx.client.clone(), &namespace);

    // Work on fresh state rather than the watch cache snapshot
    let Some(live) = compositions.get_opt(&name).await? else {
        // Deleted between the event and this pass; delete whatever the
        // index still knows about and let the cleanup pass finish up.
        debug!(name = %name, namespace = %namespace, "Composition already deleted");
        delete_remaining_children(&ctx, &namespace, &name).await;
        return Ok(Action::await_change());
    };

    let children = fetch_children(&ctx, &namespace, &name).await?;
    let plan = plan(&live.spec.components, &children);

    for component_name in &plan.to_create {
        let child = match build_component(&live, component_name) {
            Ok(child) => child,
            Err(e) => {
                // Requeueing cannot fix a spec-level problem; wait for a
                // spec change instead.
                error!(
                    name = %name,
                    namespace = %namespace,
                    component = %component_name,
                    error = %e,
                    "Unable to construct component"
                );
                return Ok(Action::await_change());
            }
        };

        info!(
            name = %name,
            namespace = %namespace,
            component = %component_name,
            "Creating component"
        );
        match components.create(&PostParams::default(), &child).await {
            Ok(_) => {
                metrics::COMPONENTS_CREATED
                    .with_label_values(&[&namespace])
                    .inc();
            }
            Err(e) if error::is_already_exists(&e) => {
                // Race with a previous, still-in-flight pass
                debug!(component = %component_name, "Component already exists");
            }
            Err(e) => {
                warn!(
                    name = %name,
                    component = %component_name,
                    error = %e,
                    "Transient component creation failure"
                );
                return Ok(Action::requeue(ctx.config.create_retry_delay));
            }
        }
    }

    let previous = live.status.as_ref().and_then(|status| status.status.clone());
    let next = aggregate_status(&plan.waiting_for);

    // Re-persist while reconciling even when the label is unchanged: the
    // waitingFor membership can change from pass to pass.
    if previous.as_deref() != Some(next) || next == STATUS_RECONCILING {
        let mut updated = live.clone();
        updated.status = Some(CompositionStatus {
            status: Some(next.to_string()),
            waiting_for: plan.waiting_for.clone(),
        });
        match compositions
            .replace_status(&name, &PostParams::default(), serde_json::to_vec(&updated)?)
            .await
        {
            Ok(_) => {
                debug!(
                    name = %name,
                    status = next,
                    waiting = plan.waiting_for.len(),
                    "Composition status updated"
                );
            }
            Err(e) if error::is_conflict(&e) => {
                // Lost a concurrent-write race; the next event retries
                // with fresh data.
                debug!(name = %name, "Composition status update conflicted, discarding");
            }
            Err(e) => return Err(e.into()),
        }
    }

    for orphan in &plan.orphans {
        info!(
            name = %name,
            namespace = %namespace,
            component = %orphan,
            "Deleting orphan component"
        );
        match components.delete(orphan, &DeleteParams::default()).await {
            Ok(_) => {
                metrics::COMPONENTS_DELETED
                    .with_label_values(&[&namespace, "orphan"])
                    .inc();
            }
            Err(e) if error::is_not_found(&e) => {}
            Err(e) => {
                // An un-deleted orphan is unsafe to ignore silently
                return Err(Error::OrphanDelete {
                    component: orphan.clone(),
                    source: e,
                });
            }
        }
    }

    Ok(Action::await_change())
}

/// Delete every remaining child of a composition that is being removed.
///
/// No status update is performed. Children also carry owner references,
/// so native garbage collection backs this up.
pub async fn cleanup(composition: Arc<Composition>, ctx: Arc<Context>) -> Result<Action> {
    let name = composition.name_any();
    let namespace = composition.namespace().unwrap_or_else(|| "default".to_string());

    delete_remaining_children(&ctx, &namespace, &name).await;

    metrics::CLEANUPS.with_label_values(&["Composition"]).inc();
    Ok(Action::await_change())
}

/// Best-effort deletion of all children the index knows for a
/// composition that no longer exists; individual failures are logged and
/// do not fail the pass.
async fn delete_remaining_children(ctx: &Context, namespace: &str, owner: &str) {
    let components: Api<Component> = Api::namespaced(ctx.client.clone(), namespace);

    for child in ctx.owner_index.children_of(namespace, owner) {
        info!(
            name = %owner,
            namespace = %namespace,
            component = %child,
            "Deleting component of removed composition"
        );
        match components.delete(&child, &DeleteParams::default()).await {
            Ok(_) => {
                metrics::COMPONENTS_DELETED
                    .with_label_values(&[namespace, "cascade"])
                    .inc();
            }
            Err(e) if error::is_not_found(&e) => {}
            Err(e) => {
                warn!(
                    component = %child,
                    error = %e,
                    "Unable to delete component during composition cleanup"
                );
            }
        }
    }
}
