//! Composition controller
//!
//! Watches Composition resources and their owned Components and triggers
//! the composition reconciler.

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
use crate::crd::{Component, Composition};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::composition as composition_reconciler;

/// Finalizer name for Composition resources
const FINALIZER_NAME: &str = "composition.dev/composition-finalizer";

/// Run the Composition controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<Composition> = Api::all(client.clone());
    let components: Api<Component> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("Composition CRD not installed: {}", e);
        return;
    }

    info!("Starting Composition controller");

    // Status-only writes must not retrigger the composition's own
    // reconciler, so the trigger stream passes generation changes only.
    // Child events always trigger the owner.
    let (reader, writer) = reflector::store::<Composition>();
    let compositions = watcher(api, WatcherConfig::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(predicates::generation);

    Controller::for_stream(compositions, reader)
        .owns(components, WatcherConfig::default())
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
                        "Reconciled Composition"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["Composition"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Composition>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["Composition"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["Composition"])
        .inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let key = format!("composition/{}/{}", namespace, obj.name_any());
    let api: Api<Composition> = Api::namespaced(ctx.client.clone(), &namespace);

    // The finalizer guarantees the cleanup pass observes the deletion
    // before the object disappears from the store.
    let result = finalizer(&api, FINALIZER_NAME, obj, |event| async {
        match event {
            FinalizerEvent::Apply(composition) => {
                composition_reconciler::apply(composition, ctx.clone()).await
            }
            FinalizerEvent::Cleanup(composition) => {
                composition_reconciler::cleanup(composition, ctx.clone()).await
            }
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)));

    if result.is_ok() {
        ctx.backoff.reset(&key);
    }
    result
}

/// Error policy for the controller: delay the key by the combined
/// exponential/throughput backoff and try again. Keys are never dropped.
fn error_policy(obj: Arc<Composition>, error: &Error, ctx: Arc<Context>) -> Action {
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();
    let key = format!("composition/{}/{}", namespace, name);
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
