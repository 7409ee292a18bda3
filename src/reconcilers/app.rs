// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cdk8sAppProxy reconciler - keeps target clusters in sync with a cdk8s app in git.

use crate::config::Config;
use crate::constants::{conditions, FINALIZER};
use crate::error::{Error, Result};
use crate::git::GitCli;
use crate::kubernetes::{fetch_credential, selector};
use crate::reconcilers::backoff::{object_key, Backoff};
use crate::reconcilers::pipeline::{record_failure, Pipeline};
use crate::resourcer::{KindPlurals, KubeconfigClients, Resourcer};
use crate::synth::{HostToolchain, Synthesizer};
use crate::types::app::apply_defaults;
use crate::types::{Cdk8sAppProxy, Cdk8sAppProxyStatus, Cluster};
use futures::StreamExt;
use kube::{
    api::{Patch, PatchParams},
    runtime::{
        controller::Action,
        finalizer::{finalizer, Event},
        reflector::ObjectRef,
        watcher, Controller,
    },
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct AppReconciler {
    client: Client,
    pipeline: Pipeline,
    backoff: Backoff,
}

impl AppReconciler {
    pub fn new(client: Client, config: &Config) -> Self {
        let clients = Arc::new(KubeconfigClients::new(client.clone()));
        let resourcer = Resourcer::new(
            client.clone(),
            clients,
            KindPlurals::new(config.plural_overrides.clone()),
        );
        let toolchain = Arc::new(HostToolchain::new(&config.cdk8s_bin, &config.npm_bin));
        let pipeline = Pipeline::new(
            Arc::new(GitCli::new(&config.git_bin)),
            Synthesizer::new(toolchain),
            Arc::new(resourcer),
            &config.scratch_root,
        );
        Self::with_pipeline(client, pipeline)
    }

    pub fn with_pipeline(client: Client, pipeline: Pipeline) -> Self {
        Self {
            client,
            pipeline,
            backoff: Backoff::new(),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let apps: Api<Cdk8sAppProxy> = Api::all(self.client.clone());
        let clusters: Api<Cluster> = Api::all(self.client.clone());
        let context = Arc::new(self);

        let controller = Controller::new(apps, watcher::Config::default());
        let store = controller.store();

        info!("Starting Cdk8sAppProxy controller");
        controller
            .watches(clusters, watcher::Config::default(), move |cluster| {
                apps_for_cluster(&store.state(), &cluster)
            })
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled Cdk8sAppProxy: {:?}", o),
                    Err(e) => warn!("Cdk8sAppProxy reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    async fn apply(&self, app: Arc<Cdk8sAppProxy>) -> Result<Action> {
        let mut app = (*app).clone();
        apply_defaults(&mut app);
        let key = object_key(app.namespace().as_deref(), &app.name_any());

        let mut status = app.status.clone().unwrap_or_default();
        let result = self.sync(&app, &mut status).await;
        self.patch_status(&app, &status).await?;

        let interval = result?;
        self.backoff.reset(&key);
        debug!("Requeueing {} in {:?}", key, interval);
        Ok(Action::requeue(interval))
    }

    /// Runs the pipeline and returns the poll interval.
    async fn sync(
        &self,
        app: &Cdk8sAppProxy,
        status: &mut Cdk8sAppProxyStatus,
    ) -> Result<Duration> {
        let prepared = async {
            let repo = app.git_repository()?;
            let interval = repo.poll_interval()?;
            let namespace = app.namespace().unwrap_or_else(|| "default".to_string());
            let credential = fetch_credential(&self.client, &namespace, repo).await?;
            Ok::<_, Error>((interval, credential))
        }
        .await;

        let (interval, credential) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                record_failure(status, conditions::GIT_REPOSITORY_READY, &e);
                return Err(e);
            }
        };

        let outcome = self.pipeline.run(app, credential.as_deref(), status).await?;
        info!("Cdk8sAppProxy {} reconciled: {:?}", app.name_any(), outcome);
        Ok(interval)
    }

    async fn cleanup(&self, app: Arc<Cdk8sAppProxy>) -> Result<Action> {
        info!("Cdk8sAppProxy {} deleted, removing checkouts", app.name_any());
        self.pipeline.cleanup(&app).await?;
        self.backoff
            .reset(&object_key(app.namespace().as_deref(), &app.name_any()));
        Ok(Action::await_change())
    }

    async fn patch_status(&self, app: &Cdk8sAppProxy, status: &Cdk8sAppProxyStatus) -> Result<()> {
        let namespace = app.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<Cdk8sAppProxy> = Api::namespaced(self.client.clone(), &namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(&app.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Apps in the cluster's namespace whose selector matches the cluster's labels.
pub fn apps_for_cluster(
    apps: &[Arc<Cdk8sAppProxy>],
    cluster: &Cluster,
) -> Vec<ObjectRef<Cdk8sAppProxy>> {
    let namespace = cluster.namespace();
    apps.iter()
        .filter(|app| app.namespace() == namespace)
        .filter(|app| match selector::matches(&app.spec.cluster_selector, cluster.labels()) {
            Ok(matched) => matched,
            Err(e) => {
                debug!("Skipping {} with invalid selector: {}", app.name_any(), e);
                false
            }
        })
        .map(|app| ObjectRef::from_obj(app.as_ref()))
        .collect()
}

async fn reconcile(app: Arc<Cdk8sAppProxy>, ctx: Arc<AppReconciler>) -> Result<Action> {
    let namespace = app.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Cdk8sAppProxy> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER, app, |event| async {
        match event {
            Event::Apply(app) => ctx.apply(app).await,
            Event::Cleanup(app) => ctx.cleanup(app).await,
        }
    })
    .await
    .map_err(Error::from_finalizer)
}

fn error_policy(app: Arc<Cdk8sAppProxy>, error: &Error, ctx: Arc<AppReconciler>) -> Action {
    let key = object_key(app.namespace().as_deref(), &app.name_any());
    let delay = ctx.backoff.next_delay(&key);
    warn!("Reconciling {} failed ({}), retrying in {:?}: {}", key, error.reason(), delay, error);
    Action::requeue(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::auth::fake::FakeGit;
    use crate::resourcer::fake::FakeApplier;
    use crate::synth::fake::{FakeToolchain, CONFIGMAP};
    use crate::test_utils::{secret_json, MockService};
    use crate::types::app::{make_app, make_repo};
    use crate::types::cluster::make_cluster;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use std::collections::BTreeMap;

    const STATUS_PATH: &str =
        "/apis/addons.cluster.x-k8s.io/v1alpha1/namespaces/default/cdk8sappproxies/web/status";

    fn selecting(name: &str, namespace: &str, labels: &[(&str, &str)]) -> Arc<Cdk8sAppProxy> {
        let mut app = make_app(name, namespace, Some(make_repo("https://github.com/o/r.git")));
        app.spec.cluster_selector = LabelSelector {
            match_labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        };
        Arc::new(app)
    }

    fn reconciler(mock: &MockService, git: FakeGit) -> (AppReconciler, tempfile::TempDir) {
        let scratch = tempfile::tempdir().unwrap();
        let git = FakeGit {
            files: vec![("main.py".to_string(), String::new())],
            ..git
        };
        let toolchain = FakeToolchain {
            files: vec![("demo.k8s.yaml".to_string(), CONFIGMAP.to_string())],
            ..Default::default()
        };
        let pipeline = Pipeline::new(
            Arc::new(git),
            Synthesizer::new(Arc::new(toolchain)),
            Arc::new(FakeApplier::default()),
            scratch.path(),
        );
        (
            AppReconciler::with_pipeline(mock.clone().into_client(), pipeline),
            scratch,
        )
    }

    fn status_mock() -> MockService {
        let body = serde_json::to_string(&make_app("web", "default", None)).unwrap();
        MockService::new().on_patch(STATUS_PATH, 200, &body)
    }

    #[test]
    fn test_apps_for_cluster_matches_labels_in_namespace() {
        let apps = vec![
            selecting("dev-app", "default", &[("env", "dev")]),
            selecting("prod-app", "default", &[("env", "prod")]),
            selecting("other-ns", "team-a", &[("env", "dev")]),
        ];
        let cluster = make_cluster("c1", "default", &[("env", "dev")], None);

        let refs = apps_for_cluster(&apps, &cluster);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "dev-app");
        assert_eq!(refs[0].namespace.as_deref(), Some("default"));
    }

    #[test]
    fn test_empty_selector_matches_every_cluster() {
        let apps = vec![selecting("all", "default", &[])];
        let cluster = make_cluster("c1", "default", &[], None);
        assert_eq!(apps_for_cluster(&apps, &cluster).len(), 1);
    }

    #[tokio::test]
    async fn test_apply_persists_synced_status() {
        let mock = status_mock();
        let (ctx, _scratch) = reconciler(&mock, FakeGit::with_branch("main", "abc123"));

        let app = make_app("web", "default", Some(make_repo("https://github.com/o/r.git")));
        let action = ctx.apply(Arc::new(app)).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(300)));
        let patches = mock.requests_with("PATCH", STATUS_PATH);
        assert_eq!(patches.len(), 1);
        let status = &patches[0].json()["status"];
        assert_eq!(status["sync"]["state"], "Synced");
        assert_eq!(status["sync"]["revision"], "abc123");
    }

    #[tokio::test]
    async fn test_missing_secret_persists_failure() {
        let mock = status_mock();
        let (ctx, _scratch) = reconciler(&mock, FakeGit::with_branch("main", "abc123"));
        let mut repo = make_repo("https://github.com/o/r.git");
        repo.secret_ref = Some("git-credentials".to_string());
        repo.secret_key = Some("token".to_string());

        let err = ctx
            .apply(Arc::new(make_app("web", "default", Some(repo))))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SecretError(_)));
        let status = &mock.requests_with("PATCH", STATUS_PATH)[0].json()["status"];
        assert_eq!(status["sync"]["state"], "Failed");
        assert_eq!(status["sync"]["reason"], "SecretFetchFailed");
    }

    #[tokio::test]
    async fn test_private_repo_uses_secret_token() {
        let mock = status_mock().on_get(
            "/api/v1/namespaces/default/secrets/git-credentials",
            200,
            &secret_json("default", "git-credentials", &[("token", "ghp_abc")]),
        );
        let git = FakeGit {
            private: true,
            accept: Some(crate::git::GitAuth::Basic {
                username: "oauth2".to_string(),
                password: "ghp_abc".to_string(),
            }),
            ..FakeGit::with_branch("main", "abc123")
        };
        let (ctx, _scratch) = reconciler(&mock, git);
        let mut repo = make_repo("https://github.com/o/r.git");
        repo.secret_ref = Some("git-credentials".to_string());
        repo.secret_key = Some("token".to_string());
        repo.reference_poll_interval = Some("90s".to_string());

        let action = ctx
            .apply(Arc::new(make_app("web", "default", Some(repo))))
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(90)));
    }

    #[tokio::test]
    async fn test_invalid_interval_is_reported() {
        let mock = status_mock();
        let (ctx, _scratch) = reconciler(&mock, FakeGit::with_branch("main", "abc123"));
        let mut repo = make_repo("https://github.com/o/r.git");
        repo.reference_poll_interval = Some("often".to_string());

        let err = ctx
            .apply(Arc::new(make_app("web", "default", Some(repo))))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "InvalidSpec");
    }

    #[tokio::test]
    async fn test_error_policy_backs_off() {
        let mock = status_mock();
        let (ctx, _scratch) = reconciler(&mock, FakeGit::default());
        let ctx = Arc::new(ctx);
        let app = Arc::new(make_app("web", "default", None));
        let err = Error::InvalidResource("web".to_string());

        assert_eq!(
            error_policy(app.clone(), &err, ctx.clone()),
            Action::requeue(Duration::from_secs(5))
        );
        assert_eq!(
            error_policy(app, &err, ctx),
            Action::requeue(Duration::from_secs(10))
        );
    }
}
