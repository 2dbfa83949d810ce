//! Kubernetes client helpers shared by the harness

use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, Node};
use kube::api::{Api, ListParams, ObjectMeta, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info};

use crate::poll::{poll_until, PollConfig};
use crate::{Error, Result, CONDITION_READY, STATUS_TRUE};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path.
///
/// Without a path the ambient configuration is inferred.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Create `name` if it does not exist yet
pub async fn ensure_namespace(client: &Client, name: &str) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            info!(namespace = %name, "created namespace");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 409 => {
            debug!(namespace = %name, "namespace already exists");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// True when `node` reports `Ready=True`
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .rev()
                .find(|c| c.type_ == CONDITION_READY)
                .is_some_and(|c| c.status == STATUS_TRUE)
        })
}

/// Wait until the cluster has at least one node and every node is ready
pub async fn wait_for_nodes_ready(client: &Client, config: PollConfig) -> Result<()> {
    let nodes: Api<Node> = Api::all(client.clone());
    let nodes = &nodes;
    poll_until("all nodes to be ready", config, move || async move {
        let list = nodes.list(&ListParams::default()).await?;
        Ok(!list.items.is_empty() && list.items.iter().all(is_node_ready))
    })
    .await
}
