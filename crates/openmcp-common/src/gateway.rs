//! kube-rs implementation of [`ResourceGateway`]
//!
//! Manifests are decoded into untyped objects, resolved against API discovery
//! to learn each kind's plural and scope, and created one by one. There is no
//! atomicity across objects: a failure part-way leaves earlier objects behind.

use std::path::Path;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiResource, Discovery, Scope};
use kube::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::document::Document;
use crate::resource::{ApplyOptions, GroupVersionResource, ResourceGateway, ResourceRef};
use crate::{Error, Result};

/// One object decoded from a manifest
#[derive(Clone, Debug, PartialEq)]
pub struct ManifestObject {
    /// Full object as JSON
    pub value: Value,
    /// API group, empty for the core group
    pub group: String,
    /// API version within the group
    pub version: String,
    /// Object kind
    pub kind: String,
    /// `metadata.name`
    pub name: String,
    /// `metadata.namespace`, if the manifest sets one
    pub namespace: Option<String>,
}

impl ManifestObject {
    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: self.kind.clone(),
        }
    }
}

/// Split `apiVersion` into (group, version)
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Decode a multi-document YAML or JSON manifest.
///
/// Empty documents are skipped. Every object must carry `apiVersion`, `kind`
/// and `metadata.name`.
pub fn decode_manifest(manifest: &str) -> Result<Vec<ManifestObject>> {
    let mut objects = Vec::new();
    for (index, doc) in serde_yaml::Deserializer::from_str(manifest).enumerate() {
        let value = Value::deserialize(doc)
            .map_err(|e| Error::manifest(format!("document {}: invalid YAML: {}", index, e)))?;
        if value.is_null() {
            continue;
        }

        let field = |path: &str| value.pointer(path).and_then(Value::as_str).map(str::to_string);
        let api_version = field("/apiVersion")
            .ok_or_else(|| Error::manifest(format!("document {}: missing apiVersion", index)))?;
        let kind = field("/kind")
            .ok_or_else(|| Error::manifest(format!("document {}: missing kind", index)))?;
        let name = field("/metadata/name").ok_or_else(|| {
            Error::manifest(format!("document {} ({}): missing metadata.name", index, kind))
        })?;
        let namespace = field("/metadata/namespace");
        let (group, version) = parse_api_version(&api_version);

        objects.push(ManifestObject {
            value,
            group,
            version,
            kind,
            name,
            namespace,
        });
    }
    Ok(objects)
}

/// Namespace an object ends up in, `None` for cluster-scoped kinds
fn target_namespace(
    object: &ManifestObject,
    scope: &Scope,
    options: &ApplyOptions,
    default_namespace: &str,
) -> Option<String> {
    match scope {
        Scope::Cluster => None,
        Scope::Namespaced => Some(
            options
                .namespace
                .clone()
                .or_else(|| object.namespace.clone())
                .unwrap_or_else(|| default_namespace.to_string()),
        ),
    }
}

/// ApiResource for a GVR; the kind is not needed to address objects by plural
fn api_resource(gvr: &GroupVersionResource) -> ApiResource {
    ApiResource {
        group: gvr.group.clone(),
        version: gvr.version.clone(),
        api_version: gvr.api_version(),
        kind: String::new(),
        plural: gvr.resource.clone(),
    }
}

/// Gateway bound to one cluster's API server
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    default_namespace: String,
}

impl KubeGateway {
    /// Wrap a client; namespaced objects without a namespace go to `default_namespace`
    pub fn new(client: Client, default_namespace: impl Into<String>) -> Self {
        Self {
            client,
            default_namespace: default_namespace.into(),
        }
    }

    /// The underlying kube client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api_for(&self, resource: &ResourceRef) -> Api<DynamicObject> {
        let ar = api_resource(&resource.gvr);
        if resource.is_cluster_scoped() {
            Api::all_with(self.client.clone(), &ar)
        } else {
            Api::namespaced_with(self.client.clone(), &resource.namespace, &ar)
        }
    }

    async fn discover(&self, objects: &[ManifestObject]) -> Result<Discovery> {
        let mut groups: Vec<&str> = objects.iter().map(|o| o.group.as_str()).collect();
        groups.sort_unstable();
        groups.dedup();
        Discovery::new(self.client.clone())
            .filter(&groups)
            .run()
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl ResourceGateway for KubeGateway {
    async fn apply(&self, manifest: &str, options: &ApplyOptions) -> Result<Vec<ResourceRef>> {
        let objects = decode_manifest(manifest)?;
        if objects.is_empty() {
            return Ok(Vec::new());
        }
        let discovery = self.discover(&objects).await?;

        let mut refs = Vec::with_capacity(objects.len());
        for object in objects {
            let Some((ar, caps)) = discovery.resolve_gvk(&object.gvk()) else {
                return Err(Error::manifest(format!(
                    "unknown resource type {}/{} for {}",
                    object.group, object.version, object.kind
                )));
            };
            let namespace =
                target_namespace(&object, &caps.scope, options, &self.default_namespace);

            let mut dynamic: DynamicObject = serde_json::from_value(object.value.clone())
                .map_err(|e| {
                    Error::manifest(format!("{} {}: {}", object.kind, object.name, e))
                })?;
            dynamic.metadata.namespace = namespace.clone();

            let api: Api<DynamicObject> = match &namespace {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
                None => Api::all_with(self.client.clone(), &ar),
            };

            info!(kind = %object.kind, name = %object.name, namespace = ?namespace, "creating object");
            if let Err(e) = api.create(&PostParams::default(), &dynamic).await {
                let e = Error::from(e);
                if !e.is_already_exists() {
                    return Err(e);
                }
                debug!(kind = %object.kind, name = %object.name, "object already exists");
            }

            refs.push(ResourceRef {
                namespace: namespace.unwrap_or_default(),
                name: object.name,
                gvr: GroupVersionResource::new(ar.group, ar.version, ar.plural),
            });
        }
        Ok(refs)
    }

    async fn get(&self, resource: &ResourceRef) -> Result<Document> {
        match self.api_for(resource).get(&resource.name).await {
            Ok(obj) => {
                let value = serde_json::to_value(&obj).map_err(|e| {
                    Error::internal_with_context("get", format!("{}: {}", resource, e))
                })?;
                Ok(Document::new(value))
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Err(Error::not_found(
                resource.gvr.resource.clone(),
                resource.qualified_name(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<()> {
        match self
            .api_for(resource)
            .delete(&resource.name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!(resource = %resource, "deleted object");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(resource = %resource, "object already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Apply a manifest file as-is
pub async fn apply_file(
    gateway: &dyn ResourceGateway,
    path: &Path,
    options: &ApplyOptions,
) -> Result<Vec<ResourceRef>> {
    let manifest = tokio::fs::read_to_string(path).await?;
    gateway.apply(&manifest, options).await
}

/// Apply every manifest file in `dir`, in file name order.
///
/// Hidden files and subdirectories are skipped. Returns the refs of all
/// applied objects.
pub async fn apply_dir(
    gateway: &dyn ResourceGateway,
    dir: &Path,
    options: &ApplyOptions,
) -> Result<Vec<ResourceRef>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if entry.file_type().await?.is_file() && !hidden {
            paths.push(path);
        }
    }
    paths.sort();

    let mut refs = Vec::new();
    for path in paths {
        debug!(path = %path.display(), "applying manifest file");
        refs.extend(apply_file(gateway, &path, options).await?);
    }
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::MockResourceGateway;
    use http::{Request, Response};
    use kube::client::Body;
    use serde_json::json;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    const MULTI: &str = r#"
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: openmcp-operator
  namespace: somewhere
---
apiVersion: openmcp.cloud/v1alpha1
kind: ServiceProvider
metadata:
  name: crossplane
spec:
  image: ghcr.io/openmcp-project/images/service-provider-crossplane:v0.0.4
"#;

    #[test]
    fn test_parse_api_version() {
        assert_eq!(
            parse_api_version("openmcp.cloud/v1alpha1"),
            ("openmcp.cloud".to_string(), "v1alpha1".to_string())
        );
        assert_eq!(parse_api_version("v1"), (String::new(), "v1".to_string()));
    }

    #[test]
    fn test_decode_multi_document_in_order() {
        let objects = decode_manifest(MULTI).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].kind, "ServiceAccount");
        assert_eq!(objects[0].group, "");
        assert_eq!(objects[0].namespace.as_deref(), Some("somewhere"));
        assert_eq!(objects[1].kind, "ServiceProvider");
        assert_eq!(objects[1].group, "openmcp.cloud");
        assert_eq!(objects[1].name, "crossplane");
        assert_eq!(objects[1].namespace, None);
    }

    #[test]
    fn test_decode_empty_manifest() {
        assert!(decode_manifest("").unwrap().is_empty());
        assert!(decode_manifest("---\n---\n").unwrap().is_empty());
    }

    #[test]
    fn test_decode_json_manifest() {
        let objects = decode_manifest(
            r#"{"apiVersion":"v1","kind":"Namespace","metadata":{"name":"openmcp-system"}}"#,
        )
        .unwrap();
        assert_eq!(objects[0].name, "openmcp-system");
    }

    #[test]
    fn test_decode_rejects_incomplete_objects() {
        let err = decode_manifest("kind: Namespace\nmetadata:\n  name: x\n").unwrap_err();
        assert!(err.to_string().contains("missing apiVersion"));

        let err = decode_manifest("apiVersion: v1\nkind: Namespace\n").unwrap_err();
        assert!(err.to_string().contains("missing metadata.name"));

        assert!(matches!(
            decode_manifest("a: [unclosed").unwrap_err(),
            Error::Manifest { .. }
        ));
    }

    #[test]
    fn test_namespace_override_only_for_namespaced() {
        let objects = decode_manifest(MULTI).unwrap();
        let none = ApplyOptions::default();
        let forced = ApplyOptions::in_namespace("openmcp-system");

        assert_eq!(
            target_namespace(&objects[0], &Scope::Namespaced, &none, "default").as_deref(),
            Some("somewhere")
        );
        assert_eq!(
            target_namespace(&objects[0], &Scope::Namespaced, &forced, "default").as_deref(),
            Some("openmcp-system")
        );
        assert_eq!(
            target_namespace(&objects[1], &Scope::Namespaced, &none, "default").as_deref(),
            Some("default")
        );
        assert_eq!(target_namespace(&objects[1], &Scope::Cluster, &forced, "default"), None);
    }

    #[test]
    fn test_api_resource_addresses_by_plural() {
        let ar = api_resource(&GroupVersionResource::managed_control_planes());
        assert_eq!(ar.api_version, "core.openmcp.cloud/v2alpha1");
        assert_eq!(ar.plural, "managedcontrolplanev2s");
    }

    const SP_PATH: &str = "/apis/openmcp.cloud/v1alpha1/serviceproviders";
    const CROSSPLANE_PATH: &str = "/apis/openmcp.cloud/v1alpha1/serviceproviders/crossplane";

    fn crossplane_object() -> Value {
        json!({
            "apiVersion": "openmcp.cloud/v1alpha1",
            "kind": "ServiceProvider",
            "metadata": {"name": "crossplane"},
            "spec": {"image": "ghcr.io/openmcp-project/images/service-provider-crossplane:v0.0.4"}
        })
    }

    fn api_status(code: u16, reason: &str) -> Value {
        json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": format!("serviceproviders.openmcp.cloud \"crossplane\" {}", reason),
            "reason": reason,
            "code": code
        })
    }

    fn respond(code: u16, body: Value) -> Response<Body> {
        Response::builder()
            .status(code)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    /// Gateway backed by an in-memory API server serving one cluster-scoped
    /// ServiceProvider type and holding at most the `crossplane` object
    fn in_memory_gateway() -> KubeGateway {
        let exists = Arc::new(Mutex::new(false));
        let service = tower::service_fn(move |req: Request<Body>| {
            let exists = exists.clone();
            async move {
                let mut exists = exists.lock().unwrap();
                let response = match (req.method().as_str(), req.uri().path()) {
                    ("GET", "/apis") => respond(
                        200,
                        json!({
                            "kind": "APIGroupList",
                            "apiVersion": "v1",
                            "groups": [{
                                "name": "openmcp.cloud",
                                "versions": [{"groupVersion": "openmcp.cloud/v1alpha1", "version": "v1alpha1"}],
                                "preferredVersion": {"groupVersion": "openmcp.cloud/v1alpha1", "version": "v1alpha1"}
                            }]
                        }),
                    ),
                    ("GET", "/apis/openmcp.cloud/v1alpha1") => respond(
                        200,
                        json!({
                            "kind": "APIResourceList",
                            "apiVersion": "v1",
                            "groupVersion": "openmcp.cloud/v1alpha1",
                            "resources": [{
                                "name": "serviceproviders",
                                "singularName": "serviceprovider",
                                "namespaced": false,
                                "kind": "ServiceProvider",
                                "verbs": ["create", "delete", "get", "list"]
                            }]
                        }),
                    ),
                    ("POST", SP_PATH) if *exists => respond(409, api_status(409, "AlreadyExists")),
                    ("POST", SP_PATH) => {
                        *exists = true;
                        respond(201, crossplane_object())
                    }
                    ("GET", CROSSPLANE_PATH) if *exists => respond(200, crossplane_object()),
                    ("DELETE", CROSSPLANE_PATH) if *exists => {
                        *exists = false;
                        respond(200, crossplane_object())
                    }
                    _ => respond(404, api_status(404, "NotFound")),
                };
                Ok::<_, Infallible>(response)
            }
        });
        KubeGateway::new(Client::new(service, "default"), "default")
    }

    fn crossplane_ref() -> ResourceRef {
        ResourceRef::cluster_scoped(GroupVersionResource::service_providers(), "crossplane")
    }

    #[tokio::test]
    async fn test_apply_twice_returns_same_refs() {
        let gateway = in_memory_gateway();
        let manifest = serde_yaml::to_string(&crossplane_object()).unwrap();

        let first = gateway
            .apply(&manifest, &ApplyOptions::default())
            .await
            .unwrap();
        let second = gateway
            .apply(&manifest, &ApplyOptions::in_namespace("ignored"))
            .await
            .unwrap();

        assert_eq!(first, vec![crossplane_ref()]);
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_delete_twice_succeeds() {
        let gateway = in_memory_gateway();
        let manifest = serde_yaml::to_string(&crossplane_object()).unwrap();
        gateway
            .apply(&manifest, &ApplyOptions::default())
            .await
            .unwrap();

        let doc = gateway.get(&crossplane_ref()).await.unwrap();
        assert_eq!(doc.name(), "crossplane");

        gateway.delete(&crossplane_ref()).await.unwrap();
        gateway.delete(&crossplane_ref()).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let gateway = in_memory_gateway();
        let err = gateway.get(&crossplane_ref()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(err.to_string(), "serviceproviders crossplane not found");
    }

    #[tokio::test]
    async fn test_apply_unknown_kind_is_manifest_error() {
        let gateway = in_memory_gateway();
        let manifest = "apiVersion: openmcp.cloud/v1alpha1\nkind: ClusterProvider\nmetadata:\n  name: kind\n";
        let err = gateway
            .apply(manifest, &ApplyOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown resource type"));
    }

    #[tokio::test]
    async fn test_apply_dir_sorted_and_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "b").unwrap();
        std::fs::write(dir.path().join("a.yaml"), "a").unwrap();
        std::fs::write(dir.path().join(".hidden.yaml"), "hidden").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_mock = seen.clone();
        let mut gateway = MockResourceGateway::new();
        gateway.expect_apply().times(2).returning(move |manifest, _| {
            seen_in_mock.lock().unwrap().push(manifest.to_string());
            Ok(vec![ResourceRef::cluster_scoped(
                GroupVersionResource::service_providers(),
                manifest,
            )])
        });

        let refs = apply_dir(&gateway, dir.path(), &ApplyOptions::default())
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1].name, "b");
    }
}
