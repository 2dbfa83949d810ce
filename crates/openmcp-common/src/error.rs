//! Error types for the OpenMCP test harness
//!
//! Errors carry enough context (resource, cluster, awaited condition) to tell
//! from a single line which step of a bootstrap failed and why.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for harness operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The addressed object does not exist
    #[error("{resource} {name} not found")]
    NotFound {
        /// Resource plural (e.g. "serviceproviders")
        resource: String,
        /// Object name, namespace-qualified when namespaced
        name: String,
    },

    /// A manifest could not be decoded into Kubernetes objects
    #[error("manifest error: {message}")]
    Manifest {
        /// Description of what is wrong with the manifest
        message: String,
    },

    /// Template parsing or rendering failed
    #[error("template error: {message}")]
    Template {
        /// Description of the rendering failure
        message: String,
    },

    /// Filesystem error while reading templates or manifests
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A poll budget was exhausted before the condition held
    #[error("timed out after {timeout:?} waiting for {description}")]
    Timeout {
        /// What was being waited for
        description: String,
        /// The budget that was exhausted
        timeout: Duration,
    },

    /// Cluster provisioning or lookup failed
    #[error("cluster error [{cluster}]: {message}")]
    Cluster {
        /// Cluster name or lookup prefix
        cluster: String,
        /// Description of what failed
        message: String,
    },

    /// An external command (kind, docker) failed
    #[error("command failed: {message}")]
    Command {
        /// Description including the command's stderr
        message: String,
    },

    /// Invalid harness configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of the invalid setting
        message: String,
    },

    /// One or more pipeline stages failed
    #[error("pipeline failed: {}", .failures.join("; "))]
    Pipeline {
        /// One entry per failed stage, formatted as `phase/stage: cause`
        failures: Vec<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Operation where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a not-found error for a resource
    pub fn not_found(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Create a manifest decoding error
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest {
            message: msg.into(),
        }
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template {
            message: msg.into(),
        }
    }

    /// Create a timeout error for the awaited condition
    pub fn timeout(description: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            description: description.into(),
            timeout,
        }
    }

    /// Create a cluster error with the cluster name or prefix
    pub fn cluster(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Cluster {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a command failure
    pub fn command_failed(msg: impl Into<String>) -> Self {
        Self::Command {
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error without specific context
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with the operation that produced it
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// True when the error confirms the object is absent.
    ///
    /// Covers both the harness's own `NotFound` and a 404 from the API server.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube {
                source: kube::Error::Api(resp),
            } => resp.code == 404,
            _ => false,
        }
    }

    /// True when the API server rejected a create because the object exists
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::Kube { source: kube::Error::Api(resp) } if resp.code == 409
        )
    }

    /// True when a poll budget was exhausted
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("simulated {}", reason),
        reason: reason.to_string(),
        code,
    })
}
