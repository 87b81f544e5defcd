//! Kubernetes controllers for the Composition Operator CRDs
//!
//! This module wires each CRD to its reconciler: watch streams, trigger
//! filtering, worker concurrency, and retry scheduling.

mod component_controller;
mod composition_controller;

pub use component_controller::run as run_component_controller;
pub use composition_controller::run as run_composition_controller;

use std::sync::Arc;

use kube::Client;

use crate::backoff::BackoffPolicy;
use crate::config::OperatorConfig;
use crate::owner_index::OwnerIndex;

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Immutable operator configuration
    pub config: OperatorConfig,
    /// Reverse child-to-composition index
    pub owner_index: Arc<OwnerIndex>,
    /// Retry/backoff policy shared by both reconcilers
    pub backoff: Arc<BackoffPolicy>,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, config: OperatorConfig, owner_index: Arc<OwnerIndex>) -> Self {
        let backoff = Arc::new(BackoffPolicy::new(&config.backoff));
        Self {
            client,
            config,
            owner_index,
            backoff,
        }
    }
}
