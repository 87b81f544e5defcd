//! Component reconciler
//!
//! Advances one Component through the fixed provisioning pipeline
//! pending -> started -> failing -> retrying -> success, scheduling its
//! own re-invocation after each transition. The progression is
//! deliberately time-driven and unconditional; it does not consult any
//! real provisioning outcome (see DESIGN.md).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::{api::PostParams, runtime::controller::Action, Api, ResourceExt};
use tracing::{debug, info};

use crate::controllers::Context;
use crate::crd::{phase, Component, ComponentStatus};
use crate::error::Result;
use crate::metrics;

/// One step of the provisioning pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Phase the component moves to
    pub next: &'static str,
    /// Delay before the next step; `None` once the pipeline is complete
    pub requeue: Option<Duration>,
}

/// Next step for a component currently in `current`.
///
/// Any value not matching a known phase is treated as uninitialized.
/// `success` is terminal: no further transition and no requeue.
pub fn next_transition(current: Option<&str>) -> Transition {
    match current {
        Some(phase::PENDING) => Transition {
            next: phase::STARTED,
            requeue: Some(Duration::from_secs(10)),
        },
        Some(phase::STARTED) => Transition {
            next: phase::FAILING,
            requeue: Some(Duration::from_secs(30)),
        },
        Some(phase::FAILING) => Transition {
            next: phase::RETRYING,
            requeue: Some(Duration::from_secs(10)),
        },
        Some(phase::RETRYING) => Transition {
            next: phase::SUCCESS,
            requeue: Some(Duration::from_secs(1)),
        },
        Some(phase::SUCCESS) => Transition {
            next: phase::SUCCESS,
            requeue: None,
        },
        _ => Transition {
            next: phase::PENDING,
            requeue: Some(Duration::from_secs(5)),
        },
    }
}

/// Run one pass of the component state machine
pub async fn reconcile(component: Arc<Component>, ctx: Arc<Context>) -> Result<Action> {
    let name = component.name_any();
    let namespace = component.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Component> = Api::namespaced(ctx.client.clone(), &namespace);

    // Work on fresh state; a missing component was deleted between the
    // triggering event and this pass.
    let Some(mut live) = api.get_opt(&name).await? else {
        debug!(name = %name, namespace = %namespace, "Component already deleted");
        return Ok(Action::await_change());
    };

    let current = live
        .status
        .as_ref()
        .and_then(|status| status.status.clone());
    let transition = next_transition(current.as_deref());

    if current.as_deref() != Some(transition.next) {
        live.status = Some(ComponentStatus {
            status: Some(transition.next.to_string()),
            last_transition_time: Some(Utc::now()),
        });
        api.replace_status(&name, &PostParams::default(), serde_json::to_vec(&live)?)
            .await?;

        info!(
            name = %name,
            namespace = %namespace,
            phase = transition.next,
            "Component phase advanced"
        );
        metrics::PHASE_TRANSITIONS
            .with_label_values(&[transition.next])
            .inc();
    }

    match transition.requeue {
        Some(delay) => Ok(Action::requeue(delay)),
        None => Ok(Action::await_change()),
    }
}
