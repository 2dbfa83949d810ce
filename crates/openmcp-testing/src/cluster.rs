//! Cluster provisioning and lookup
//!
//! Clusters are created and destroyed through a [`ClusterProvider`]; the
//! `kind` CLI is the only implementation. A [`ClusterHandle`] binds a cluster
//! name to a connected client and a default namespace.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use rand::Rng;
use tokio::process::Command;
use tracing::{debug, info};

use openmcp_common::gateway::KubeGateway;
use openmcp_common::kube_utils;
use openmcp_common::{Error, Result};

/// Create, destroy and enumerate clusters
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Create a cluster, replacing any existing one of the same name.
    ///
    /// Returns the path of a kubeconfig for the new cluster.
    async fn create_cluster(&self, name: &str) -> Result<PathBuf>;

    /// Destroy a cluster
    async fn destroy_cluster(&self, name: &str) -> Result<()>;

    /// Names of all clusters the provider knows about
    async fn list_clusters(&self) -> Result<Vec<String>>;

    /// Write a kubeconfig for an existing cluster and return its path
    async fn kubeconfig(&self, name: &str) -> Result<PathBuf>;
}

/// [`ClusterProvider`] backed by the `kind` CLI
#[derive(Clone, Debug)]
pub struct KindProvider {
    config: Option<PathBuf>,
    kubeconfig_dir: PathBuf,
}

impl KindProvider {
    /// Provider writing kubeconfigs into `kubeconfig_dir`, creating clusters
    /// from the kind config file at `config` when given
    pub fn new(config: Option<PathBuf>, kubeconfig_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            kubeconfig_dir: kubeconfig_dir.into(),
        }
    }

    fn kubeconfig_path(&self, name: &str) -> PathBuf {
        self.kubeconfig_dir.join(format!("{}.kubeconfig", name))
    }
}

async fn kind(args: &[&str]) -> Result<Vec<u8>> {
    debug!(?args, "running kind");
    let output = Command::new("kind").args(args).output().await?;
    if !output.status.success() {
        return Err(Error::command_failed(format!(
            "kind {} failed: {}",
            args.first().copied().unwrap_or_default(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

#[async_trait]
impl ClusterProvider for KindProvider {
    async fn create_cluster(&self, name: &str) -> Result<PathBuf> {
        info!(cluster = %name, "creating kind cluster");

        // Replace leftovers from an earlier run; failure means there was none
        let _ = kind(&["delete", "cluster", "--name", name]).await;

        let kubeconfig = self.kubeconfig_path(name);
        let kubeconfig_str = path_str(&kubeconfig)?;
        let mut args = vec!["create", "cluster", "--name", name, "--kubeconfig", kubeconfig_str];
        if let Some(config) = &self.config {
            args.extend(["--config", path_str(config)?]);
        }
        kind(&args)
            .await
            .map_err(|e| Error::cluster(name, e.to_string()))?;
        Ok(kubeconfig)
    }

    async fn destroy_cluster(&self, name: &str) -> Result<()> {
        info!(cluster = %name, "deleting kind cluster");
        kind(&["delete", "cluster", "--name", name])
            .await
            .map_err(|e| Error::cluster(name, e.to_string()))?;
        Ok(())
    }

    async fn list_clusters(&self) -> Result<Vec<String>> {
        let stdout = kind(&["get", "clusters"]).await?;
        Ok(parse_cluster_list(&String::from_utf8_lossy(&stdout)))
    }

    async fn kubeconfig(&self, name: &str) -> Result<PathBuf> {
        let stdout = kind(&["get", "kubeconfig", "--name", name])
            .await
            .map_err(|e| Error::cluster(name, e.to_string()))?;
        let path = self.kubeconfig_path(name);
        tokio::fs::write(&path, stdout).await?;
        Ok(path)
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        Error::config(format!("path {} contains invalid UTF-8", path.display()))
    })
}

/// `kind get clusters` prints one name per line, or a notice on stderr when empty
fn parse_cluster_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Name of the first cluster starting with `prefix`
pub async fn find_cluster_by_prefix(provider: &dyn ClusterProvider, prefix: &str) -> Result<String> {
    provider
        .list_clusters()
        .await?
        .into_iter()
        .find(|name| name.starts_with(prefix))
        .ok_or_else(|| Error::cluster(prefix, format!("no cluster found with prefix {}", prefix)))
}

/// `prefix-<random hex>` truncated to `len` characters.
///
/// Returns `prefix` unchanged when it is already `len` characters or longer.
pub fn random_name(prefix: &str, len: usize) -> String {
    if prefix.len() >= len {
        return prefix.to_string();
    }
    let mut rng = rand::thread_rng();
    let suffix: String = (0..len)
        .map(|_| format!("{:x}", rng.gen_range(0..16u8)))
        .collect();
    let mut name = format!("{}-{}", prefix, suffix);
    name.truncate(len);
    name
}

/// `docker pull` an image
pub async fn pull_image(image: &str) -> Result<()> {
    info!(%image, "pulling image");
    let output = Command::new("docker").args(["pull", image]).output().await?;
    if !output.status.success() {
        return Err(Error::command_failed(format!(
            "docker pull {} failed: {}",
            image,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// A provisioned cluster with a connected client
#[derive(Clone)]
pub struct ClusterHandle {
    name: String,
    kubeconfig: PathBuf,
    namespace: String,
    client: kube::Client,
}

impl ClusterHandle {
    /// Connect to `name` through `kubeconfig`, defaulting to `namespace`
    pub async fn connect(
        name: impl Into<String>,
        kubeconfig: impl Into<PathBuf>,
        namespace: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let kubeconfig = kubeconfig.into();
        let client = kube_utils::create_client(Some(&kubeconfig))
            .await
            .map_err(|e| Error::cluster(&name, e.to_string()))?;
        Ok(Self {
            name,
            kubeconfig,
            namespace: namespace.into(),
            client,
        })
    }

    /// Cluster name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kubeconfig path
    pub fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }

    /// Default namespace for namespaced objects
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Connected client
    pub fn client(&self) -> &kube::Client {
        &self.client
    }

    /// Resource gateway bound to this cluster and its default namespace
    pub fn gateway(&self) -> KubeGateway {
        KubeGateway::new(self.client.clone(), self.namespace.clone())
    }
}

impl std::fmt::Debug for ClusterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterHandle")
            .field("name", &self.name)
            .field("kubeconfig", &self.kubeconfig)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
