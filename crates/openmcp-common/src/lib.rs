//! Common building blocks for the OpenMCP e2e harness: manifest rendering,
//! kind-agnostic resource access, condition predicates and polling.

#![deny(missing_docs)]

pub mod conditions;
pub mod document;
pub mod error;
pub mod gateway;
pub mod kube_utils;
pub mod poll;
pub mod resource;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// The "Ready" condition type reported by OpenMCP resources
pub const CONDITION_READY: &str = "Ready";
/// The "Available" condition type reported by Deployments
pub const CONDITION_AVAILABLE: &str = "Available";
/// The "True" status value for conditions
pub const STATUS_TRUE: &str = "True";
/// Phase value reported by a ready ManagedControlPlane
pub const PHASE_READY: &str = "Ready";

/// Name prefix of the cluster the operator creates for onboarding
pub const ONBOARDING_PREFIX: &str = "onboarding";

/// Namespace used when a manifest does not specify one
pub const DEFAULT_NAMESPACE: &str = "default";
