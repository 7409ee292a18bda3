// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Applying synthesized resources to the clusters an app selects.

pub mod plural;

use crate::constants::{conditions, reasons, FIELD_MANAGER};
use crate::error::{Error, Result};
use crate::kubernetes::{create_cluster_client, selector};
use crate::types::conditions::{mark_failed, mark_true};
use crate::types::{Cdk8sAppProxy, Cdk8sAppProxyStatus, Cluster};
use async_trait::async_trait;
use kube::{
    api::{ApiResource, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams},
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub use plural::{pluralize, KindPlurals};

/// Builds API clients for workload clusters.
#[async_trait]
pub trait ClusterClients: Send + Sync {
    async fn client_for(&self, cluster: &Cluster) -> Result<Client>;
}

/// Clients from the Cluster API `<cluster>-kubeconfig` secret. A fresh client
/// is built for every call.
#[derive(Clone)]
pub struct KubeconfigClients {
    manager: Client,
}

impl KubeconfigClients {
    pub fn new(manager: Client) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ClusterClients for KubeconfigClients {
    async fn client_for(&self, cluster: &Cluster) -> Result<Client> {
        create_cluster_client(&self.manager, cluster).await
    }
}

/// Deployment of resources to target clusters.
#[async_trait]
pub trait Applier: Send + Sync {
    /// Server-side apply every resource to every selected cluster. Updates the
    /// DeploymentProgressing condition and observed generation per cluster.
    async fn apply(
        &self,
        app: &Cdk8sAppProxy,
        status: &mut Cdk8sAppProxyStatus,
        resources: &[DynamicObject],
    ) -> Result<()>;

    /// True when any resource is absent from any selected cluster.
    async fn check(&self, app: &Cdk8sAppProxy, resources: &[DynamicObject]) -> Result<bool>;
}

#[derive(Clone)]
pub struct Resourcer {
    client: Client,
    clients: Arc<dyn ClusterClients>,
    plurals: KindPlurals,
}

impl Resourcer {
    pub fn new(client: Client, clients: Arc<dyn ClusterClients>, plurals: KindPlurals) -> Self {
        Self {
            client,
            clients,
            plurals,
        }
    }

    /// Clusters in the app's namespace matching its selector.
    #[instrument(skip(self, app), fields(app = %app.name_any()))]
    pub async fn matching_clusters(&self, app: &Cdk8sAppProxy) -> Result<Vec<Cluster>> {
        let namespace = app.namespace().unwrap_or_else(|| "default".to_string());
        let query = selector::to_query(&app.spec.cluster_selector)?;

        let clusters: Api<Cluster> = Api::namespaced(self.client.clone(), &namespace);
        let mut params = ListParams::default();
        if !query.is_empty() {
            params = params.labels(&query);
        }
        let list = clusters.list(&params).await.map_err(Error::ListClusters)?;

        debug!("Selector '{}' matched {} clusters in {}", query, list.items.len(), namespace);
        Ok(list.items)
    }

    fn api_for(&self, client: Client, object: &DynamicObject) -> Result<Api<DynamicObject>> {
        let types = object.types.as_ref().ok_or_else(|| Error::ApplyFailed {
            cluster: String::new(),
            resource: object.name_any(),
            cause: "object has no apiVersion or kind".to_string(),
        })?;
        let (group, version) = match types.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", types.api_version.as_str()),
        };
        let gvk = GroupVersionKind::gvk(group, version, &types.kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, &self.plurals.plural(&types.kind));

        Ok(match object.namespace().filter(|ns| !ns.is_empty()) {
            Some(ns) => Api::namespaced_with(client, &ns, &resource),
            None => Api::all_with(client, &resource),
        })
    }

    async fn apply_to_cluster(&self, cluster: &Cluster, resources: &[DynamicObject]) -> Result<()> {
        let cluster_name = cluster.name_any();
        let client = self.clients.client_for(cluster).await?;
        let params = PatchParams::apply(FIELD_MANAGER).force();

        for object in resources {
            let name = object.name_any();
            let failed = |cause: String| Error::ApplyFailed {
                cluster: cluster_name.clone(),
                resource: describe(object),
                cause,
            };
            if name.is_empty() {
                return Err(failed("object has no name".to_string()));
            }
            let api = self.api_for(client.clone(), object)?;
            api.patch(&name, &params, &Patch::Apply(object))
                .await
                .map_err(|e| failed(e.to_string()))?;
            debug!("Applied {} to cluster {}", describe(object), cluster_name);
        }
        Ok(())
    }
}

#[async_trait]
impl Applier for Resourcer {
    #[instrument(skip_all, fields(app = %app.name_any(), resources = resources.len()))]
    async fn apply(
        &self,
        app: &Cdk8sAppProxy,
        status: &mut Cdk8sAppProxyStatus,
        resources: &[DynamicObject],
    ) -> Result<()> {
        let clusters = self.matching_clusters(app).await?;
        if clusters.is_empty() {
            info!("No clusters match the selector of {}, nothing to apply", app.name_any());
            return Ok(());
        }

        let mut first_error = None;
        for cluster in &clusters {
            match self.apply_to_cluster(cluster, resources).await {
                Ok(()) => {
                    info!(
                        "Applied {} resources to cluster {}",
                        resources.len(),
                        cluster.name_any()
                    );
                    status.observed_generation = app.metadata.generation;
                    mark_true(
                        &mut status.conditions,
                        conditions::DEPLOYMENT_PROGRESSING,
                        reasons::RESOURCES_APPLIED,
                        &format!("Resources applied to cluster {}", cluster.name_any()),
                    );
                }
                Err(e) => {
                    warn!("Failed to apply to cluster {}: {}", cluster.name_any(), e);
                    mark_failed(
                        &mut status.conditions,
                        conditions::DEPLOYMENT_PROGRESSING,
                        e.reason(),
                        &e.to_string(),
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    #[instrument(skip_all, fields(app = %app.name_any(), resources = resources.len()))]
    async fn check(&self, app: &Cdk8sAppProxy, resources: &[DynamicObject]) -> Result<bool> {
        let clusters = self.matching_clusters(app).await?;
        let mut missing = false;

        for cluster in &clusters {
            let client = self.clients.client_for(cluster).await?;
            for object in resources {
                let api = self.api_for(client.clone(), object)?;
                if api.get_opt(&object.name_any()).await?.is_none() {
                    info!("{} is missing on cluster {}", describe(object), cluster.name_any());
                    missing = true;
                }
            }
        }
        Ok(missing)
    }
}

fn describe(object: &DynamicObject) -> String {
    let kind = object.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("Unknown");
    match object.namespace() {
        Some(ns) => format!("{} {}/{}", kind, ns, object.name_any()),
        None => format!("{} {}", kind, object.name_any()),
    }
}


#[cfg(test)]
mod tests {
    use super::fake::StaticClients;
    use super::*;
    use crate::constants::severity;
    use crate::synth::manifests::decode_documents;
    use crate::test_utils::{list_json, MockService};
    use crate::types::app::{make_app, make_repo};
    use crate::types::conditions::find;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use std::collections::{BTreeMap, HashMap};
    use std::path::Path;

    const CLUSTERS_PATH: &str = "/apis/cluster.x-k8s.io/v1beta1/namespaces/default/clusters";
    const CONFIGMAP_PATH: &str = "/api/v1/namespaces/default/configmaps/demo";

    fn cluster_json(name: &str) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "cluster.x-k8s.io/v1beta1",
            "kind": "Cluster",
            "metadata": {"name": name, "namespace": "default", "labels": {"env": "dev"}},
            "spec": {}
        })
    }

    fn configmap_json() -> String {
        serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "demo", "namespace": "default"},
            "data": {"key": "value"}
        })
        .to_string()
    }

    fn resources() -> Vec<DynamicObject> {
        let yaml = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: demo\n  namespace: default\ndata:\n  key: value\n---\napiVersion: rbac.authorization.k8s.io/v1\nkind: ClusterRole\nmetadata:\n  name: reader\nrules: []\n";
        decode_documents(Path::new("dist/app.k8s.yaml"), yaml.as_bytes()).unwrap()
    }

    fn app_selecting_dev() -> Cdk8sAppProxy {
        let mut app = make_app("app", "default", Some(make_repo("https://github.com/o/r.git")));
        app.spec.cluster_selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("env".to_string(), "dev".to_string())])),
            ..Default::default()
        };
        app.metadata.generation = Some(4);
        app
    }

    fn resourcer(management: MockService, workloads: Vec<(&str, MockService)>) -> Resourcer {
        let clients = StaticClients {
            clients: workloads
                .into_iter()
                .map(|(name, mock)| (name.to_string(), mock.into_client()))
                .collect::<HashMap<_, _>>(),
        };
        Resourcer::new(management.into_client(), Arc::new(clients), KindPlurals::default())
    }

    fn management_with(clusters: Vec<serde_json::Value>) -> MockService {
        MockService::new().on_get(
            CLUSTERS_PATH,
            200,
            &list_json("cluster.x-k8s.io/v1beta1", "Cluster", clusters),
        )
    }

    #[tokio::test]
    async fn test_matching_clusters_sends_label_selector() {
        let management = management_with(vec![cluster_json("c1")]);
        let resourcer = resourcer(management.clone(), vec![]);

        let clusters = resourcer.matching_clusters(&app_selecting_dev()).await.unwrap();
        assert_eq!(clusters.len(), 1);
        let requests = management.requests_with("GET", CLUSTERS_PATH);
        assert!(requests[0].query.contains("labelSelector=env%3Ddev"));
    }

    #[tokio::test]
    async fn test_apply_uses_server_side_apply() {
        let workload = MockService::new()
            .on_patch(CONFIGMAP_PATH, 200, &configmap_json())
            .on_patch(
                "/apis/rbac.authorization.k8s.io/v1/clusterroles/reader",
                200,
                r#"{"apiVersion":"rbac.authorization.k8s.io/v1","kind":"ClusterRole","metadata":{"name":"reader"}}"#,
            );
        let resourcer = resourcer(
            management_with(vec![cluster_json("c1")]),
            vec![("c1", workload.clone())],
        );

        let app = app_selecting_dev();
        let mut status = Cdk8sAppProxyStatus::default();
        resourcer.apply(&app, &mut status, &resources()).await.unwrap();

        let patches = workload.requests_with("PATCH", "/");
        assert_eq!(patches.len(), 2);
        assert!(patches[0].query.contains("fieldManager=cdk8sappproxy-controller"));
        assert!(patches[0].query.contains("force=true"));
        assert_eq!(patches[0].json()["data"]["key"], "value");
        assert_eq!(status.observed_generation, Some(4));
        assert!(find(&status.conditions, conditions::DEPLOYMENT_PROGRESSING)
            .unwrap()
            .is_true());
    }

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let workload = MockService::new()
            .on_patch(CONFIGMAP_PATH, 200, &configmap_json())
            .on_patch("/apis/rbac.authorization.k8s.io/v1/clusterroles/reader", 200, "{}");
        let resourcer = resourcer(
            management_with(vec![cluster_json("c1")]),
            vec![("c1", workload.clone())],
        );
        let app = app_selecting_dev();
        let mut status = Cdk8sAppProxyStatus::default();

        resourcer.apply(&app, &mut status, &resources()).await.unwrap();
        let first = status.clone();
        resourcer.apply(&app, &mut status, &resources()).await.unwrap();

        let patches = workload.requests_with("PATCH", "/");
        assert_eq!(patches.len(), 4);
        assert_eq!(patches[0].body, patches[2].body);
        assert_eq!(status.observed_generation, first.observed_generation);
        assert!(find(&status.conditions, conditions::DEPLOYMENT_PROGRESSING)
            .unwrap()
            .is_true());
    }

    #[tokio::test]
    async fn test_apply_continues_after_failing_cluster() {
        let healthy = MockService::new()
            .on_patch(CONFIGMAP_PATH, 200, &configmap_json())
            .on_patch("/apis/rbac.authorization.k8s.io/v1/clusterroles/reader", 200, "{}");
        // c1 has no kubeconfig
        let resourcer = resourcer(
            management_with(vec![cluster_json("c1"), cluster_json("c2")]),
            vec![("c2", healthy.clone())],
        );

        let mut status = Cdk8sAppProxyStatus::default();
        let err = resourcer
            .apply(&app_selecting_dev(), &mut status, &resources())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::KubeconfigError(_)));
        assert_eq!(healthy.requests_with("PATCH", "/").len(), 2);
        // the last cluster succeeded, so the condition reflects that
        assert!(find(&status.conditions, conditions::DEPLOYMENT_PROGRESSING)
            .unwrap()
            .is_true());
    }

    #[tokio::test]
    async fn test_apply_failure_aborts_cluster() {
        let broken = MockService::new().on_patch(
            CONFIGMAP_PATH,
            422,
            r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"invalid","reason":"Invalid","code":422}"#,
        );
        let resourcer = resourcer(
            management_with(vec![cluster_json("c1")]),
            vec![("c1", broken.clone())],
        );

        let mut status = Cdk8sAppProxyStatus::default();
        let err = resourcer
            .apply(&app_selecting_dev(), &mut status, &resources())
            .await
            .unwrap_err();

        assert_eq!(err.reason(), reasons::RESOURCE_APPLY_FAILED);
        assert_eq!(broken.requests_with("PATCH", "/").len(), 1);
        let condition = find(&status.conditions, conditions::DEPLOYMENT_PROGRESSING).unwrap();
        assert!(!condition.is_true());
        assert_eq!(condition.severity.as_deref(), Some(severity::ERROR));
        assert_eq!(status.observed_generation, None);
    }

    #[tokio::test]
    async fn test_zero_clusters_is_noop() {
        let resourcer = resourcer(management_with(vec![]), vec![]);
        let app = app_selecting_dev();
        let mut status = Cdk8sAppProxyStatus::default();

        resourcer.apply(&app, &mut status, &resources()).await.unwrap();
        assert!(status.conditions.is_empty());
        assert!(!resourcer.check(&app, &resources()).await.unwrap());
    }

    #[tokio::test]
    async fn test_check_detects_missing() {
        let workload = MockService::new().on_get(CONFIGMAP_PATH, 200, &configmap_json());
        let resourcer = resourcer(
            management_with(vec![cluster_json("c1")]),
            vec![("c1", workload)],
        );

        // ClusterRole is not served, so the mock answers 404
        assert!(resourcer.check(&app_selecting_dev(), &resources()).await.unwrap());
    }

    #[tokio::test]
    async fn test_check_all_present() {
        let workload = MockService::new()
            .on_get(CONFIGMAP_PATH, 200, &configmap_json())
            .on_get(
                "/apis/rbac.authorization.k8s.io/v1/clusterroles/reader",
                200,
                r#"{"apiVersion":"rbac.authorization.k8s.io/v1","kind":"ClusterRole","metadata":{"name":"reader"}}"#,
            );
        let resourcer = resourcer(
            management_with(vec![cluster_json("c1")]),
            vec![("c1", workload)],
        );

        assert!(!resourcer.check(&app_selecting_dev(), &resources()).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_selector() {
        let resourcer = resourcer(management_with(vec![]), vec![]);
        let mut app = app_selecting_dev();
        app.spec.cluster_selector.match_expressions = Some(vec![
            k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement {
                key: "env".to_string(),
                operator: "Sometimes".to_string(),
                values: None,
            },
        ]);

        let err = resourcer.matching_clusters(&app).await.unwrap_err();
        assert_eq!(err.reason(), reasons::CLUSTER_SELECTOR_PARSE_FAILED);
    }

    #[test]
    fn test_describe() {
        let objects = resources();
        assert_eq!(describe(&objects[0]), "ConfigMap default/demo");
        assert_eq!(describe(&objects[1]), "ClusterRole reader");
    }
}
