//! Component controller
//!
//! Watches Component resources and triggers the component reconciler.

use std::sync::Arc;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{self, Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        predicates, reflector,
        watcher::Config as WatcherConfig,
        watcher, WatchStreamExt,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::controllers::Context;
use crate::crd::Component;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::component as component_reconciler;

/// Finalizer name for Component resources
const FINALIZER_NAME: &str = "composition.dev/component-finalizer";

/// Run the Component controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<Component> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("Component CRD not installed: {}", e);
        return;
    }

    info!("Starting Component controller");

    // The component reconciler rewrites its own status on every step; the
    // generation predicate keeps those writes from re-triggering it ahead
    // of the scheduled requeue delays.
    let (reader, writer) = reflector::store::<Component>();
    let stream = watcher(api, WatcherConfig::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(predicates::generation);

    Controller::for_stream(stream, reader)
        .with_config(
            controller::Config::default().concurrency(context.config.max_concurrent_reconciles),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled Component"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["Component"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Component>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["Component"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["Component"])
        .inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let key = format!("component/{}/{}", namespace, obj.name_any());
    let api: Api<Component> = Api::namespaced(ctx.client.clone(), &namespace);

    let result = finalizer(&api, FINALIZER_NAME, obj, |event| async {
        match event {
            FinalizerEvent::Apply(component) => {
                component_reconciler::reconcile(component, ctx.clone()).await
            }
            FinalizerEvent::Cleanup(component) => cleanup(component).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)));

    if result.is_ok() {
        ctx.backoff.reset(&key);
    }
    result
}

/// Cleanup when a component is being deleted.
///
/// Components hold no external resources; the owner index prunes itself
/// from the delete event.
async fn cleanup(component: Arc<Component>) -> Result<Action> {
    info!(name = %component.name_any(), "Component removed");
    metrics::CLEANUPS.with_label_values(&["Component"]).inc();
    Ok(Action::await_change())
}

/// Error policy for the controller: delay the key by the combined
/// exponential/throughput backoff and try again.
fn error_policy(obj: Arc<Component>, error: &Error, ctx: Arc<Context>) -> Action {
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();
    let key = format!("component/{}/{}", namespace, name);
    let delay = ctx.backoff.next_delay(&key);

    warn!(
        name = %name,
        namespace = %namespace,
        error = %error,
        delay_ms = delay.as_millis() as u64,
        "Reconciliation failed, scheduling retry"
    );

    Action::requeue(delay)
}
