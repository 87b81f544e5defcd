//! Error types for the Composition Operator

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A child object could not be constructed from the parent spec.
    /// Not retryable: requires a spec correction, not a requeue.
    #[error("Component construction error: {0}")]
    Construction(String),

    /// An orphaned child could not be deleted. Hard failure for the pass.
    #[error("Unable to delete orphan component '{component}': {source}")]
    OrphanDelete {
        component: String,
        #[source]
        source: kube::Error,
    },

    /// Chart rendering error
    #[error("Render error: {0}")]
    Render(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Finalizer error
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    /// Create a construction error
    pub fn construction(msg: impl Into<String>) -> Self {
        Error::Construction(msg.into())
    }

    /// Create a render error
    pub fn render(msg: impl Into<String>) -> Self {
        Error::Render(msg.into())
    }
}

fn api_reason(err: &kube::Error) -> Option<&str> {
    match err {
        kube::Error::Api(resp) => Some(resp.reason.as_str()),
        _ => None,
    }
}

/// The resource addressed by the request does not exist
pub fn is_not_found(err: &kube::Error) -> bool {
    api_reason(err) == Some("NotFound")
}

/// A create raced with an earlier pass that already created the object
pub fn is_already_exists(err: &kube::Error) -> bool {
    api_reason(err) == Some("AlreadyExists")
}

/// A version-checked update lost a concurrent-write race
pub fn is_conflict(err: &kube::Error) -> bool {
    api_reason(err) == Some("Conflict")
}
