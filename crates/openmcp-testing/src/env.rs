//! Test environment passed to every stage
//!
//! Holds the configuration, the cluster provider and the platform cluster
//! once it exists. The onboarding cluster is never stored: it is looked up
//! by name prefix each time a stage needs it.

use std::sync::{Arc, OnceLock};

use tracing::debug;

use openmcp_common::{Error, Result, DEFAULT_NAMESPACE, ONBOARDING_PREFIX};

use crate::cluster::{find_cluster_by_prefix, ClusterHandle, ClusterProvider};
use crate::config::HarnessConfig;

/// Shared state of one harness run
pub struct TestEnv {
    config: HarnessConfig,
    provider: Arc<dyn ClusterProvider>,
    platform_name: String,
    platform: OnceLock<ClusterHandle>,
}

impl TestEnv {
    /// Environment whose platform cluster will be called `platform_name`
    pub fn new(
        config: HarnessConfig,
        provider: Arc<dyn ClusterProvider>,
        platform_name: impl Into<String>,
    ) -> Self {
        Self {
            config,
            provider,
            platform_name: platform_name.into(),
            platform: OnceLock::new(),
        }
    }

    /// Harness configuration
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Cluster provider
    pub fn provider(&self) -> &dyn ClusterProvider {
        self.provider.as_ref()
    }

    /// Name of the platform cluster
    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    /// Record the platform cluster; fails if one was already recorded
    pub fn set_platform(&self, handle: ClusterHandle) -> Result<()> {
        self.platform.set(handle).map_err(|h| {
            Error::cluster(h.name(), "platform cluster already registered")
        })
    }

    /// The platform cluster, once created
    pub fn platform(&self) -> Result<&ClusterHandle> {
        self.platform
            .get()
            .ok_or_else(|| Error::cluster(&self.platform_name, "platform cluster not created"))
    }

    /// Connect to the cluster whose name starts with `prefix`
    pub async fn cluster_by_prefix(&self, prefix: &str, namespace: &str) -> Result<ClusterHandle> {
        let name = find_cluster_by_prefix(self.provider(), prefix).await?;
        let kubeconfig = self.provider.kubeconfig(&name).await?;
        debug!(cluster = %name, "connecting by prefix");
        ClusterHandle::connect(name, kubeconfig, namespace).await
    }

    /// Connect to the onboarding cluster created by the operator
    pub async fn onboarding(&self) -> Result<ClusterHandle> {
        self.cluster_by_prefix(ONBOARDING_PREFIX, DEFAULT_NAMESPACE).await
    }
}
