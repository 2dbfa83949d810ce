//! OpenMCP bootstrap pipeline
//!
//! Brings up a platform cluster with the operator and providers installed,
//! waits for the operator to create the onboarding cluster, and tears it all
//! down again.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::info;

use openmcp_common::conditions::WaitCondition;
use openmcp_common::gateway::KubeGateway;
use openmcp_common::kube_utils::{ensure_namespace, wait_for_nodes_ready};
use openmcp_common::poll::{wait_for_condition, PollConfig};
use openmcp_common::resource::{GroupVersionResource, ResourceGateway, ResourceRef};
use openmcp_common::template::load_manifest_file;
use openmcp_common::{Result, ONBOARDING_PREFIX};

use crate::cluster::{pull_image, ClusterHandle};
use crate::config::HarnessConfig;
use crate::env::TestEnv;
use crate::installers::{Installer, Recipe};
use crate::pipeline::{FnStage, Pipeline};

/// Prefix of the platform cluster name
pub const PLATFORM_CLUSTER_PREFIX: &str = "platform-cluster";
/// Length of the platform cluster name including the random suffix
pub const PLATFORM_CLUSTER_NAME_LEN: usize = 24;

const NODES_READY: PollConfig = PollConfig {
    timeout: Duration::from_secs(120),
    interval: Duration::from_secs(2),
};

/// Stage over [`TestEnv`] from a closure
pub(crate) fn stage<F>(name: &str, f: F) -> FnStage<TestEnv, F>
where
    F: for<'a> Fn(&'a TestEnv) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    FnStage::new(name, f)
}

/// Gateway to the platform cluster
pub(crate) fn platform_gateway(env: &TestEnv) -> Result<KubeGateway> {
    Ok(env.platform()?.gateway())
}

/// The onboarding Cluster object on the platform cluster
pub fn onboarding_cluster_ref(namespace: &str) -> ResourceRef {
    ResourceRef::namespaced(GroupVersionResource::clusters(), namespace, ONBOARDING_PREFIX)
}

/// Full bootstrap: setup stages, the matching teardown, and platform cluster
/// destruction as the final step
pub fn bootstrap(config: &HarnessConfig) -> Pipeline<TestEnv> {
    let mut pipeline = Pipeline::new("openmcp bootstrap")
        .setup(stage("pull-images", |env| pull_images(env).boxed()))
        .setup(stage("create-platform-cluster", |env| {
            create_platform_cluster(env).boxed()
        }))
        .setup(stage("create-namespace", |env| create_namespace(env).boxed()))
        .setup(stage("install-openmcp-operator", |env| {
            install_operator(env).boxed()
        }))
        .setup(stage("install-cluster-provider", |env| {
            install_cluster_provider(env).boxed()
        }))
        .setup(stage("verify-onboarding-cluster", |env| {
            verify_onboarding_cluster(env).boxed()
        }));

    if config.service_provider().is_some() {
        pipeline = pipeline.setup_with_teardown(
            stage("install-service-provider", |env| {
                install_service_provider(env).boxed()
            }),
            stage("delete-service-provider", |env| {
                delete_service_provider(env).boxed()
            }),
        );
    }

    pipeline
        .finish(stage("cleanup-onboarding-cluster", |env| {
            cleanup_onboarding_cluster(env).boxed()
        }))
        .finish(stage("destroy-platform-cluster", |env| {
            destroy_platform_cluster(env).boxed()
        }))
        .keep_resources(config.keep_clusters)
}

async fn pull_images(env: &TestEnv) -> Result<()> {
    if env.config().skip_pull {
        info!("image pull skipped");
        return Ok(());
    }
    for image in env.config().images() {
        pull_image(image).await?;
    }
    Ok(())
}

async fn create_platform_cluster(env: &TestEnv) -> Result<()> {
    let name = env.platform_name();
    let kubeconfig = env.provider().create_cluster(name).await?;
    let handle = ClusterHandle::connect(name, kubeconfig, &env.config().namespace).await?;
    wait_for_nodes_ready(handle.client(), NODES_READY).await?;
    info!(cluster = %name, kubeconfig = %handle.kubeconfig().display(), "platform cluster ready");
    env.set_platform(handle)
}

async fn destroy_platform_cluster(env: &TestEnv) -> Result<()> {
    env.provider().destroy_cluster(env.platform_name()).await
}

async fn create_namespace(env: &TestEnv) -> Result<()> {
    ensure_namespace(env.platform()?.client(), &env.config().namespace).await
}

fn installer(env: &TestEnv, recipe: Recipe) -> Installer {
    Installer::new(recipe, env.config().ready_poll(), env.config().delete_poll())
}

async fn install_operator(env: &TestEnv) -> Result<()> {
    let config = env.config();
    let gateway = platform_gateway(env)?;
    let installer = installer(env, Recipe::operator(&config.namespace));
    match &config.operator_manifests {
        Some(path) => {
            let manifest = load_manifest_file(path)?;
            installer.install_manifest(&gateway, &manifest).await?;
        }
        None => {
            installer.install(&gateway, &config.operator()).await?;
        }
    }
    Ok(())
}

async fn install_cluster_provider(env: &TestEnv) -> Result<()> {
    let config = env.config();
    let gateway = platform_gateway(env)?;
    let installer = installer(env, Recipe::cluster_provider());
    match &config.cluster_provider_manifests {
        Some(path) => {
            let manifest = load_manifest_file(path)?;
            installer.install_manifest(&gateway, &manifest).await?;
        }
        None => {
            installer.install(&gateway, &config.cluster_provider()).await?;
        }
    }
    Ok(())
}

/// Wait for the operator to report the onboarding Cluster ready
pub async fn verify_onboarding(
    gateway: &dyn ResourceGateway,
    namespace: &str,
    poll: PollConfig,
) -> Result<()> {
    let cluster = onboarding_cluster_ref(namespace);
    wait_for_condition(gateway, &cluster, WaitCondition::ready(), poll).await?;
    info!(cluster = %cluster, "onboarding cluster ready");
    Ok(())
}

/// Delete the onboarding Cluster object and wait for it to disappear
pub async fn delete_onboarding(
    gateway: &dyn ResourceGateway,
    namespace: &str,
    poll: PollConfig,
) -> Result<()> {
    let cluster = onboarding_cluster_ref(namespace);
    info!(cluster = %cluster, "deleting onboarding cluster");
    gateway.delete(&cluster).await?;
    wait_for_condition(gateway, &cluster, WaitCondition::Deleted, poll).await
}

async fn verify_onboarding_cluster(env: &TestEnv) -> Result<()> {
    let gateway = platform_gateway(env)?;
    verify_onboarding(&gateway, &env.config().namespace, env.config().ready_poll()).await
}

async fn cleanup_onboarding_cluster(env: &TestEnv) -> Result<()> {
    let gateway = platform_gateway(env)?;
    delete_onboarding(&gateway, &env.config().namespace, env.config().delete_poll()).await
}

async fn install_service_provider(env: &TestEnv) -> Result<()> {
    let Some(options) = env.config().service_provider() else {
        return Ok(());
    };
    let gateway = platform_gateway(env)?;
    installer(env, Recipe::service_provider())
        .install(&gateway, &options)
        .await?;
    Ok(())
}

async fn delete_service_provider(env: &TestEnv) -> Result<()> {
    let Some(options) = env.config().service_provider() else {
        return Ok(());
    };
    let gateway = platform_gateway(env)?;
    installer(env, Recipe::service_provider())
        .uninstall(&gateway, &options.name)
        .await
}
