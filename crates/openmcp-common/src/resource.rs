//! Kind-agnostic resource coordinates and the gateway used to reach them
//!
//! Everything the harness touches is addressed by a [`ResourceRef`]: a
//! group/version/resource triple plus name and optional namespace. No typed
//! schema is required to create, read or delete an object.

use std::fmt;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::document::Document;
use crate::Result;

/// Three-part coordinate of a resource type
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupVersionResource {
    /// API group, empty for the core group
    pub group: String,
    /// API version within the group
    pub version: String,
    /// Lowercase plural resource name
    pub resource: String,
}

impl GroupVersionResource {
    /// Build a GVR from its parts
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// `openmcp.cloud/v1alpha1/clusterproviders`
    pub fn cluster_providers() -> Self {
        Self::new("openmcp.cloud", "v1alpha1", "clusterproviders")
    }

    /// `openmcp.cloud/v1alpha1/serviceproviders`
    pub fn service_providers() -> Self {
        Self::new("openmcp.cloud", "v1alpha1", "serviceproviders")
    }

    /// `clusters.openmcp.cloud/v1alpha1/clusters`
    pub fn clusters() -> Self {
        Self::new("clusters.openmcp.cloud", "v1alpha1", "clusters")
    }

    /// `core.openmcp.cloud/v2alpha1/managedcontrolplanev2s`
    pub fn managed_control_planes() -> Self {
        Self::new("core.openmcp.cloud", "v2alpha1", "managedcontrolplanev2s")
    }

    /// `apps/v1/deployments`
    pub fn deployments() -> Self {
        Self::new("apps", "v1", "deployments")
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

/// Identifies exactly one object within a cluster
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// Namespace, empty for cluster-scoped objects
    pub namespace: String,
    /// Object name
    pub name: String,
    /// Resource type
    pub gvr: GroupVersionResource,
}

impl ResourceRef {
    /// Reference a namespaced object
    pub fn namespaced(
        gvr: GroupVersionResource,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            gvr,
        }
    }

    /// Reference a cluster-scoped object
    pub fn cluster_scoped(gvr: GroupVersionResource, name: impl Into<String>) -> Self {
        Self::namespaced(gvr, "", name)
    }

    /// True when the object lives outside any namespace
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }

    /// `namespace/name`, or just `name` when cluster-scoped
    pub fn qualified_name(&self) -> String {
        if self.is_cluster_scoped() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.gvr.resource, self.qualified_name())
    }
}

/// Options for [`ResourceGateway::apply`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Replaces the namespace of every namespaced object when set
    pub namespace: Option<String>,
}

impl ApplyOptions {
    /// Force all namespaced objects into `namespace`
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }
}

/// Apply, fetch and delete objects on one cluster without typed schemas.
///
/// Apply and delete are idempotent: an existing object on create and a
/// missing object on delete are both success.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    /// Create every object in `manifest`, ignoring ones that already exist.
    ///
    /// Returns one ref per object in manifest order.
    async fn apply(&self, manifest: &str, options: &ApplyOptions) -> Result<Vec<ResourceRef>>;

    /// Fetch one object; fails with a not-found error when it is absent
    async fn get(&self, resource: &ResourceRef) -> Result<Document>;

    /// Delete one object; succeeds when it is already absent
    async fn delete(&self, resource: &ResourceRef) -> Result<()>;
}
