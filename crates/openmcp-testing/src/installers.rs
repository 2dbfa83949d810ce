//! Install and uninstall recipes for OpenMCP components
//!
//! Every component follows the same recipe: render a manifest, apply it,
//! wait for readiness; and symmetrically delete, then wait for absence. A
//! [`Recipe`] captures what differs per component (template, resource type,
//! readiness condition, namespace) and [`Installer`] runs it.

use serde::Serialize;
use tracing::info;

use openmcp_common::conditions::WaitCondition;
use openmcp_common::poll::{wait_for_condition, PollConfig};
use openmcp_common::resource::{ApplyOptions, GroupVersionResource, ResourceGateway, ResourceRef};
use openmcp_common::template::{ManifestRenderer, TemplateSource};
use openmcp_common::{Error, Result, DEFAULT_NAMESPACE};

/// ClusterProvider template; mounts the host docker socket for the kind provider
pub const CLUSTER_PROVIDER_TEMPLATE: &str = r#"apiVersion: openmcp.cloud/v1alpha1
kind: ClusterProvider
metadata:
  name: {{.Name}}
spec:
  image: {{.Image}}
  extraVolumeMounts:
    - mountPath: /var/run/docker.sock
      name: docker
  extraVolumes:
    - name: docker
      hostPath:
        path: /var/run/host-docker.sock
        type: Socket
"#;

/// ServiceProvider template
pub const SERVICE_PROVIDER_TEMPLATE: &str = r#"apiVersion: openmcp.cloud/v1alpha1
kind: ServiceProvider
metadata:
  name: {{.Name}}
spec:
  image: {{.Image}}
"#;

/// ManagedControlPlaneV2 template
pub const MCP_TEMPLATE: &str = r#"apiVersion: core.openmcp.cloud/v2alpha1
kind: ManagedControlPlaneV2
metadata:
  name: {{.Name}}
spec:
  iam: {}
"#;

/// Operator template: service account, cluster-admin binding and deployment
pub const OPERATOR_TEMPLATE: &str = r#"apiVersion: v1
kind: ServiceAccount
metadata:
  name: {{.Name}}
  namespace: {{.Namespace}}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: {{.Name}}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: cluster-admin
subjects:
  - kind: ServiceAccount
    name: {{.Name}}
    namespace: {{.Namespace}}
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{.Name}}
  namespace: {{.Namespace}}
  labels:
    app.kubernetes.io/name: {{.Name}}
    openmcp.cloud/environment: {{.Environment}}
    openmcp.cloud/platform: {{.PlatformName}}
spec:
  replicas: 1
  selector:
    matchLabels:
      app.kubernetes.io/name: {{.Name}}
  template:
    metadata:
      labels:
        app.kubernetes.io/name: {{.Name}}
    spec:
      serviceAccountName: {{.Name}}
      containers:
        - name: operator
          image: {{.Image}}
          env:
            - name: OPENMCP_ENVIRONMENT
              value: "{{.Environment}}"
            - name: OPENMCP_PLATFORM_NAME
              value: "{{.PlatformName}}"
"#;

/// Options for a ClusterProvider
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterProviderOptions {
    /// Provider name, e.g. "kind"
    pub name: String,
    /// Provider image
    pub image: String,
}

/// Options for a ServiceProvider
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceProviderOptions {
    /// Provider name, e.g. "crossplane"
    pub name: String,
    /// Provider image
    pub image: String,
}

/// Options for a ManagedControlPlane
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct McpOptions {
    /// MCP name
    pub name: String,
}

/// Options for the OpenMCP operator
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperatorOptions {
    /// Deployment name
    pub name: String,
    /// Namespace to run in
    pub namespace: String,
    /// Operator image
    pub image: String,
    /// Environment label
    pub environment: String,
    /// Platform name label
    pub platform_name: String,
}

/// What differs between components
#[derive(Clone, Debug)]
pub struct Recipe {
    /// Human readable component kind, for logs
    pub component: &'static str,
    /// Manifest template
    pub template: TemplateSource,
    /// Resource type whose object gates readiness
    pub gvr: GroupVersionResource,
    /// Condition that means "installed"
    pub readiness: WaitCondition,
    /// Namespace of the gating object; `None` when cluster-scoped
    pub namespace: Option<String>,
}

impl Recipe {
    /// ClusterProvider on the platform cluster, ready on `Ready=True`
    pub fn cluster_provider() -> Self {
        Self {
            component: "cluster provider",
            template: TemplateSource::inline(CLUSTER_PROVIDER_TEMPLATE),
            gvr: GroupVersionResource::cluster_providers(),
            readiness: WaitCondition::ready(),
            namespace: None,
        }
    }

    /// ServiceProvider on the platform cluster, ready on `Ready=True`
    pub fn service_provider() -> Self {
        Self {
            component: "service provider",
            template: TemplateSource::inline(SERVICE_PROVIDER_TEMPLATE),
            gvr: GroupVersionResource::service_providers(),
            readiness: WaitCondition::ready(),
            namespace: None,
        }
    }

    /// ManagedControlPlane on the onboarding cluster, ready on `status.phase == "Ready"`
    pub fn managed_control_plane() -> Self {
        Self {
            component: "managed control plane",
            template: TemplateSource::inline(MCP_TEMPLATE),
            gvr: GroupVersionResource::managed_control_planes(),
            readiness: WaitCondition::phase_ready(),
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
        }
    }

    /// Operator deployment in `namespace`, ready on `Available=True`
    pub fn operator(namespace: impl Into<String>) -> Self {
        Self {
            component: "openmcp operator",
            template: TemplateSource::inline(OPERATOR_TEMPLATE),
            gvr: GroupVersionResource::deployments(),
            readiness: WaitCondition::condition(
                openmcp_common::CONDITION_AVAILABLE,
                openmcp_common::STATUS_TRUE,
            ),
            namespace: Some(namespace.into()),
        }
    }

    /// Use `template` instead of the built-in one
    pub fn with_template(self, template: TemplateSource) -> Self {
        Self { template, ..self }
    }

    /// Reference to the gating object called `name`
    pub fn reference(&self, name: &str) -> ResourceRef {
        match &self.namespace {
            Some(ns) => ResourceRef::namespaced(self.gvr.clone(), ns, name),
            None => ResourceRef::cluster_scoped(self.gvr.clone(), name),
        }
    }

    fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            namespace: self.namespace.clone(),
        }
    }
}

/// Runs a [`Recipe`] with bounded waits
#[derive(Clone, Debug)]
pub struct Installer {
    recipe: Recipe,
    ready: PollConfig,
    delete: PollConfig,
}

impl Installer {
    /// Installer waiting up to `ready` for readiness and `delete` for removal
    pub fn new(recipe: Recipe, ready: PollConfig, delete: PollConfig) -> Self {
        Self {
            recipe,
            ready,
            delete,
        }
    }

    /// The recipe being run
    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Render the template with `params`, apply it and wait for readiness.
    ///
    /// Returns the gating object.
    pub async fn install<P: Serialize>(
        &self,
        gateway: &dyn ResourceGateway,
        params: &P,
    ) -> Result<ResourceRef> {
        let manifest = ManifestRenderer::new().render(&self.recipe.template, params)?;
        self.install_manifest(gateway, &manifest).await
    }

    /// Apply an already rendered manifest and wait for readiness
    pub async fn install_manifest(
        &self,
        gateway: &dyn ResourceGateway,
        manifest: &str,
    ) -> Result<ResourceRef> {
        let refs = gateway.apply(manifest, &self.recipe.apply_options()).await?;
        let target = refs
            .into_iter()
            .find(|r| r.gvr == self.recipe.gvr)
            .ok_or_else(|| {
                Error::manifest(format!(
                    "{} manifest contains no {} object",
                    self.recipe.component, self.recipe.gvr
                ))
            })?;
        info!(component = %self.recipe.component, resource = %target, "applied, waiting for readiness");

        wait_for_condition(gateway, &target, self.recipe.readiness.clone(), self.ready).await?;
        info!(component = %self.recipe.component, name = %target.name, "ready");
        Ok(target)
    }

    /// Delete the gating object `name` and wait until it is gone
    pub async fn uninstall(&self, gateway: &dyn ResourceGateway, name: &str) -> Result<()> {
        let target = self.recipe.reference(name);
        info!(component = %self.recipe.component, resource = %target, "deleting");
        gateway.delete(&target).await?;
        wait_for_condition(gateway, &target, WaitCondition::Deleted, self.delete).await?;
        info!(component = %self.recipe.component, name = %name, "deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::eq;
    use openmcp_common::document::Document;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    mock! {
        pub Gateway {}

        #[async_trait]
        impl ResourceGateway for Gateway {
            async fn apply(&self, manifest: &str, options: &ApplyOptions) -> Result<Vec<ResourceRef>>;
            async fn get(&self, resource: &ResourceRef) -> Result<Document>;
            async fn delete(&self, resource: &ResourceRef) -> Result<()>;
        }
    }

    fn fast() -> PollConfig {
        PollConfig::new(Duration::from_millis(500), Duration::from_millis(10))
    }

    fn crossplane() -> ServiceProviderOptions {
        ServiceProviderOptions {
            name: "crossplane".to_string(),
            image: "ghcr.io/openmcp-project/images/service-provider-crossplane:v0.0.4".to_string(),
        }
    }

    fn ready(ready: bool) -> Document {
        let status = if ready { "True" } else { "False" };
        Document::new(json!({
            "kind": "ServiceProvider",
            "metadata": {"name": "crossplane"},
            "status": {"conditions": [{"type": "Ready", "status": status}]}
        }))
    }

    #[tokio::test]
    async fn test_service_provider_lifecycle() {
        let sp = ResourceRef::cluster_scoped(GroupVersionResource::service_providers(), "crossplane");
        let gets = Arc::new(AtomicU32::new(0));
        let deleted = Arc::new(AtomicU32::new(0));

        let mut gateway = MockGateway::new();
        let applied = sp.clone();
        gateway
            .expect_apply()
            .withf(|manifest, options| {
                manifest.contains("kind: ServiceProvider")
                    && manifest.contains("name: crossplane")
                    && manifest.contains("service-provider-crossplane:v0.0.4")
                    && options.namespace.is_none()
            })
            .times(1)
            .returning(move |_, _| Ok(vec![applied.clone()]));

        let (g, d) = (gets.clone(), deleted.clone());
        gateway.expect_get().with(eq(sp.clone())).returning(move |r| {
            if d.load(Ordering::SeqCst) > 0 {
                return Err(Error::not_found(r.gvr.resource.clone(), r.name.clone()));
            }
            Ok(ready(g.fetch_add(1, Ordering::SeqCst) >= 2))
        });

        let d = deleted.clone();
        gateway
            .expect_delete()
            .with(eq(sp.clone()))
            .times(1)
            .returning(move |_| {
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let installer = Installer::new(Recipe::service_provider(), fast(), fast());
        let target = installer.install(&gateway, &crossplane()).await.unwrap();
        assert_eq!(target, sp);
        assert_eq!(gets.load(Ordering::SeqCst), 3);

        installer.uninstall(&gateway, "crossplane").await.unwrap();
    }

    #[tokio::test]
    async fn test_install_times_out_when_never_ready() {
        let sp = ResourceRef::cluster_scoped(GroupVersionResource::service_providers(), "crossplane");
        let mut gateway = MockGateway::new();
        gateway
            .expect_apply()
            .returning(move |_, _| Ok(vec![sp.clone()]));
        gateway.expect_get().returning(|_| Ok(ready(false)));

        let installer = Installer::new(
            Recipe::service_provider(),
            PollConfig::new(Duration::from_millis(50), Duration::from_millis(10)),
            fast(),
        );
        let err = installer.install(&gateway, &crossplane()).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_operator_waits_on_deployment() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_apply()
            .withf(|manifest, options| {
                manifest.contains("openmcp.cloud/environment: e2e")
                    && manifest.contains("openmcp.cloud/platform: platform-1")
                    && options.namespace.as_deref() == Some("openmcp-system")
            })
            .returning(|_, _| {
                Ok(vec![
                    ResourceRef::namespaced(
                        GroupVersionResource::new("", "v1", "serviceaccounts"),
                        "openmcp-system",
                        "openmcp-operator",
                    ),
                    ResourceRef::cluster_scoped(
                        GroupVersionResource::new(
                            "rbac.authorization.k8s.io",
                            "v1",
                            "clusterrolebindings",
                        ),
                        "openmcp-operator",
                    ),
                    ResourceRef::namespaced(
                        GroupVersionResource::deployments(),
                        "openmcp-system",
                        "openmcp-operator",
                    ),
                ])
            });
        gateway
            .expect_get()
            .withf(|r| r.gvr == GroupVersionResource::deployments())
            .returning(|_| {
                Ok(Document::new(json!({
                    "kind": "Deployment",
                    "status": {"conditions": [{"type": "Available", "status": "True"}]}
                })))
            });

        let installer = Installer::new(Recipe::operator("openmcp-system"), fast(), fast());
        let options = OperatorOptions {
            name: "openmcp-operator".to_string(),
            namespace: "openmcp-system".to_string(),
            image: "ghcr.io/openmcp-project/images/openmcp-operator:v0.1.0".to_string(),
            environment: "e2e".to_string(),
            platform_name: "platform-1".to_string(),
        };
        let target = installer.install(&gateway, &options).await.unwrap();
        assert_eq!(target.qualified_name(), "openmcp-system/openmcp-operator");
    }

    #[tokio::test]
    async fn test_manifest_without_gating_object() {
        let mut gateway = MockGateway::new();
        gateway.expect_apply().returning(|_, _| Ok(vec![]));

        let installer = Installer::new(Recipe::cluster_provider(), fast(), fast());
        let err = installer
            .install_manifest(&gateway, "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
    }

    #[tokio::test]
    async fn test_render_error_skips_apply() {
        let gateway = MockGateway::new();
        let installer = Installer::new(Recipe::operator("openmcp-system"), fast(), fast());
        let err = installer.install(&gateway, &crossplane()).await.unwrap_err();
        assert!(matches!(err, Error::Template { .. }));
    }

    #[test]
    fn test_mcp_reference_is_namespaced() {
        let mcp = Recipe::managed_control_plane().reference("test-mcp");
        assert_eq!(mcp.to_string(), "managedcontrolplanev2s default/test-mcp");
        let cp = Recipe::cluster_provider().reference("kind");
        assert!(cp.is_cluster_scoped());
    }

    #[test]
    fn test_templates_render() {
        let renderer = ManifestRenderer::new();
        let cp = renderer
            .render_str(
                CLUSTER_PROVIDER_TEMPLATE,
                &ClusterProviderOptions {
                    name: "kind".to_string(),
                    image: "ghcr.io/openmcp-project/images/cluster-provider-kind:v0.0.1".to_string(),
                },
            )
            .unwrap();
        assert!(cp.contains("name: kind\n"));
        assert!(cp.contains("path: /var/run/host-docker.sock"));

        let mcp = renderer
            .render_str(MCP_TEMPLATE, &McpOptions { name: "test-mcp".to_string() })
            .unwrap();
        assert!(mcp.contains("kind: ManagedControlPlaneV2"));
        assert!(mcp.contains("iam: {}"));
    }
}
