//! Operator configuration
//!
//! All knobs the reconcilers and the owner index depend on are carried
//! here explicitly and passed down at construction time. Nothing in the
//! operator reads process-wide mutable state.

use std::time::Duration;

use kube::Resource;

use crate::crd::Composition;

/// Immutable operator configuration shared by both controllers
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// API group a child's controller owner reference must carry to be
    /// accepted by the owner index
    pub owner_api_group: String,

    /// Kind a child's controller owner reference must carry
    pub owner_kind: String,

    /// Maximum concurrent in-flight reconciliations per controller
    pub max_concurrent_reconciles: u16,

    /// Fixed requeue delay after a transient child-creation failure
    pub create_retry_delay: Duration,

    /// Retry/backoff policy parameters
    pub backoff: BackoffConfig,
}

/// Parameters for the combined exponential + token-bucket backoff policy
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// First-failure delay
    pub base_delay: Duration,

    /// Ceiling on the exponential term
    pub max_delay: Duration,

    /// Sustained system-wide processing rate (keys per second)
    pub rate: f64,

    /// Number of immediately-ready keys permitted in a burst
    pub burst: u32,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            owner_api_group: Composition::group(&()).to_string(),
            owner_kind: Composition::kind(&()).to_string(),
            max_concurrent_reconciles: 10,
            create_retry_delay: Duration::from_secs(5),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1000),
            rate: 30.0,
            burst: 200,
        }
    }
}
