//! Kind-agnostic predicates over remote object state
//!
//! A [`WaitCondition`] describes what state an object should reach. A
//! [`ConditionCheck`] binds it to one [`ResourceRef`] and can be evaluated
//! any number of times; each evaluation re-fetches the object and never
//! sleeps. Driving a check to completion is the job of [`crate::poll`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::resource::{ResourceGateway, ResourceRef};
use crate::{Result, CONDITION_READY, PHASE_READY, STATUS_TRUE};

/// Desired state of an object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WaitCondition {
    /// Last `status.conditions` entry of `type_` has status `status`
    ConditionMatch {
        /// Condition type, e.g. "Ready"
        #[serde(rename = "type")]
        type_: String,
        /// Expected status string
        status: String,
    },
    /// `status[key]` equals `value`
    FieldMatch {
        /// Top-level key under `status`
        key: String,
        /// Expected value, compared as a string
        value: String,
    },
    /// The object no longer exists
    Deleted,
}

impl WaitCondition {
    /// Condition of `type_` with status `status`
    pub fn condition(type_: impl Into<String>, status: impl Into<String>) -> Self {
        Self::ConditionMatch {
            type_: type_.into(),
            status: status.into(),
        }
    }

    /// `status[key] == value`
    pub fn field(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::FieldMatch {
            key: key.into(),
            value: value.into(),
        }
    }

    /// `Ready=True`
    pub fn ready() -> Self {
        Self::condition(CONDITION_READY, STATUS_TRUE)
    }

    /// `status.phase == "Ready"`
    pub fn phase_ready() -> Self {
        Self::field("phase", PHASE_READY)
    }

    /// Bind this condition to an object
    pub fn on(self, resource: ResourceRef) -> ConditionCheck {
        ConditionCheck {
            resource,
            condition: self,
        }
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConditionMatch { type_, status } => write!(f, "condition {}={}", type_, status),
            Self::FieldMatch { key, value } => write!(f, "status.{}={}", key, value),
            Self::Deleted => write!(f, "deletion"),
        }
    }
}

/// A [`WaitCondition`] bound to one object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionCheck {
    /// Object under observation
    pub resource: ResourceRef,
    /// State it should reach
    pub condition: WaitCondition,
}

impl ConditionCheck {
    /// Fetch the object once and decide whether the condition holds.
    ///
    /// Absence means "not yet" for readiness conditions and "done" for
    /// [`WaitCondition::Deleted`]. Any other fetch failure is returned.
    pub async fn evaluate(&self, gateway: &dyn ResourceGateway) -> Result<bool> {
        let doc = match gateway.get(&self.resource).await {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() => {
                let gone = matches!(self.condition, WaitCondition::Deleted);
                info!(
                    resource = %self.resource,
                    desired = %self.condition,
                    matched = gone,
                    "object not found"
                );
                return Ok(gone);
            }
            Err(e) => return Err(e),
        };

        match &self.condition {
            WaitCondition::ConditionMatch { type_, status } => {
                let observed = doc.condition(type_);
                let matched = observed.as_ref().is_some_and(|c| &c.status == status);
                info!(
                    kind = %doc.kind(),
                    name = %self.resource.name,
                    desired = %format!("{}={}", type_, status),
                    observed = observed.as_ref().map(|c| c.status.as_str()).unwrap_or("<none>"),
                    matched,
                    message = observed.as_ref().map(|c| c.message.as_str()).unwrap_or_default(),
                    "condition check"
                );
                Ok(matched)
            }
            WaitCondition::FieldMatch { key, value } => {
                let observed = doc.status_field(key);
                let matched = observed.as_deref() == Some(value.as_str());
                info!(
                    kind = %doc.kind(),
                    name = %self.resource.name,
                    desired = %format!("{}={}", key, value),
                    observed = observed.as_deref().unwrap_or("<none>"),
                    matched,
                    "status field check"
                );
                Ok(matched)
            }
            WaitCondition::Deleted => {
                info!(kind = %doc.kind(), name = %self.resource.name, "object still present");
                Ok(false)
            }
        }
    }
}

impl fmt::Display for ConditionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.condition, self.resource)
    }
}
