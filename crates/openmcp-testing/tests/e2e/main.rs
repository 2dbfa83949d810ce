//! End-to-end tests against real kind clusters
//!
//! Needs `kind` and `docker` on the PATH and the images configured through
//! the environment:
//!
//! ```bash
//! OPENMCP_OPERATOR_IMAGE=ghcr.io/openmcp-project/images/openmcp-operator:v0.1.0 \
//! OPENMCP_CP_KIND_IMAGE=ghcr.io/openmcp-project/images/cluster-provider-kind:v0.0.1 \
//! OPENMCP_SP_NAME=crossplane \
//! OPENMCP_SP_IMAGE=ghcr.io/openmcp-project/images/service-provider-crossplane:v0.0.4 \
//! cargo test -p openmcp-testing --features kind-e2e --test e2e -- --nocapture
//! ```

#![cfg(feature = "kind-e2e")]

mod context;

use std::sync::Arc;

use openmcp_common::poll::PollConfig;
use openmcp_testing::cluster::{random_name, ClusterHandle, ClusterProvider, KindProvider};
use openmcp_testing::env::TestEnv;
use openmcp_testing::report::PipelineState;
use openmcp_testing::setup::bootstrap;

use context::{config_from_env, init_tracing};

#[tokio::test]
async fn test_service_provider_e2e() {
    init_tracing();
    let config = config_from_env();
    openmcp_testing::run(config).await.unwrap();
}

#[tokio::test]
async fn test_bootstrap_only_tears_down_platform() {
    init_tracing();
    let config = config_from_env();
    config.validate().unwrap();
    tokio::fs::create_dir_all(&config.kubeconfig_dir).await.unwrap();

    let provider = Arc::new(KindProvider::new(
        config.kind_config.clone(),
        config.kubeconfig_dir.clone(),
    ));
    let name = random_name("platform-cluster", 24);
    let env = TestEnv::new(config.clone(), provider.clone(), name.clone());

    let report = bootstrap(&config).execute(&env).await;
    report.log_summary();
    assert_eq!(report.state, PipelineState::Done, "{:?}", report.failures());

    let remaining = provider.list_clusters().await.unwrap();
    assert!(!remaining.contains(&name), "platform cluster {} still exists", name);
}

#[tokio::test]
async fn test_platform_cluster_nodes_ready() {
    init_tracing();
    let config = config_from_env();
    tokio::fs::create_dir_all(&config.kubeconfig_dir).await.unwrap();

    let provider = KindProvider::new(config.kind_config.clone(), config.kubeconfig_dir.clone());
    let name = random_name("platform-cluster", 24);
    let kubeconfig = provider.create_cluster(&name).await.unwrap();

    let result = async {
        let handle = ClusterHandle::connect(&name, kubeconfig, "default").await?;
        openmcp_common::kube_utils::wait_for_nodes_ready(
            handle.client(),
            PollConfig::new(std::time::Duration::from_secs(120), std::time::Duration::from_secs(2)),
        )
        .await
    }
    .await;

    provider.destroy_cluster(&name).await.unwrap();
    result.unwrap();
}
