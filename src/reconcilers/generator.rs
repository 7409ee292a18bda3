// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cdk8sAppProxyGenerator reconciler - one Cdk8sAppProxy per open pull request.

use crate::config::Config;
use crate::constants::{conditions, labels, reasons, CONFLICT_RETRIES};
use crate::error::{Error, Result};
use crate::git::provider::{ProviderClient, PullRequest, PullRequestLister};
use crate::git::{resolve_access, GitBackend, GitCli};
use crate::kubernetes::{fetch_credential, retry_on_conflict};
use crate::reconcilers::backoff::{object_key, Backoff};
use crate::types::conditions::{mark_failed, mark_true, Condition};
use crate::types::generator::PullRequestFilter;
use crate::types::{Cdk8sAppProxy, Cdk8sAppProxyGenerator};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
    runtime::{controller::Action, watcher, Controller},
    Api, Client, Resource, ResourceExt,
};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub struct GeneratorReconciler {
    client: Client,
    git: Arc<dyn GitBackend>,
    provider: Arc<dyn PullRequestLister>,
    backoff: Backoff,
}

impl GeneratorReconciler {
    pub fn new(client: Client, config: &Config) -> anyhow::Result<Self> {
        Ok(Self::with_backends(
            client,
            Arc::new(GitCli::new(&config.git_bin)),
            Arc::new(ProviderClient::new()?),
        ))
    }

    pub fn with_backends(
        client: Client,
        git: Arc<dyn GitBackend>,
        provider: Arc<dyn PullRequestLister>,
    ) -> Self {
        Self {
            client,
            git,
            provider,
            backoff: Backoff::new(),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let generators: Api<Cdk8sAppProxyGenerator> = Api::all(self.client.clone());
        let children: Api<Cdk8sAppProxy> = Api::all(self.client.clone());
        let context = Arc::new(self);

        info!("Starting Cdk8sAppProxyGenerator controller");
        Controller::new(generators, watcher::Config::default())
            .owns(children, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled Cdk8sAppProxyGenerator: {:?}", o),
                    Err(e) => warn!("Cdk8sAppProxyGenerator reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    #[instrument(skip_all, fields(generator = %generator.name_any()))]
    async fn reconcile_generator(&self, generator: &Cdk8sAppProxyGenerator) -> Result<Action> {
        let interval = generator.spec.poll_interval()?;
        if let Some(wait) = remaining_wait(generator.last_polled(), interval, Utc::now()) {
            debug!("Not due for polling, requeueing in {:?}", wait);
            return Ok(Action::requeue(wait));
        }

        let mut current = generator
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default();

        match self.sync(generator).await {
            Ok(matched) => {
                mark_true(
                    &mut current,
                    conditions::PULL_REQUESTS_SYNCED,
                    reasons::PULL_REQUESTS_SYNCED,
                    &format!("{} open pull requests matched", matched),
                );
                self.update_status(generator, &current, Some(Utc::now())).await?;
                Ok(Action::requeue(interval))
            }
            Err(e) => {
                mark_failed(
                    &mut current,
                    conditions::PULL_REQUESTS_SYNCED,
                    e.reason(),
                    &e.to_string(),
                );
                if let Err(status_err) = self.update_status(generator, &current, None).await {
                    warn!("Failed to record generator failure: {}", status_err);
                }
                Err(e)
            }
        }
    }

    /// One poll of the provider. Returns the number of matching pull requests.
    async fn sync(&self, generator: &Cdk8sAppProxyGenerator) -> Result<usize> {
        let namespace = generator.namespace().unwrap_or_else(|| "default".to_string());
        let source = &generator.spec.source;

        let credential = fetch_credential(&self.client, &namespace, source).await?;
        resolve_access(self.git.as_ref(), &source.url, credential.as_deref()).await?;

        let pulls = self
            .provider
            .list_pull_requests(&source.url, credential.as_deref())
            .await?;
        let filters = compile_filters(&generator.spec.filters)?;
        let matching: Vec<&PullRequest> = pulls
            .iter()
            .filter(|pr| matches_filters(&filters, &pr.base_branch))
            .collect();
        info!(
            "{} of {} open pull requests match the filters of {}",
            matching.len(),
            pulls.len(),
            generator.name_any()
        );

        let api: Api<Cdk8sAppProxy> = Api::namespaced(self.client.clone(), &namespace);
        for pr in &matching {
            let child = match render_child(generator, pr) {
                Ok(child) => child,
                Err(e) => {
                    warn!("Failed to render child for pull request #{}: {}", pr.number, e);
                    continue;
                }
            };
            if let Err(e) = upsert_child(&api, child).await {
                warn!("Failed to create or update child for pull request #{}: {}", pr.number, e);
            }
        }

        let open: BTreeSet<String> = matching.iter().map(|pr| pr.number.to_string()).collect();
        delete_orphans(&api, generator, &open).await?;
        Ok(matching.len())
    }

    async fn update_status(
        &self,
        generator: &Cdk8sAppProxyGenerator,
        conditions: &[Condition],
        polled: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let namespace = generator.namespace().unwrap_or_else(|| "default".to_string());
        let name = generator.name_any();
        let api: Api<Cdk8sAppProxyGenerator> = Api::namespaced(self.client.clone(), &namespace);

        let (api, name) = (&api, name.as_str());
        retry_on_conflict(CONFLICT_RETRIES, || async move {
            let latest = api.get_status(name).await?;
            let mut status = serde_json::json!({ "conditions": conditions });
            if let Some(polled) = polled {
                status["lastPolledTime"] = serde_json::Value::String(polled.to_rfc3339());
            }
            // the resourceVersion makes the merge patch fail with 409 on a stale read
            let patch = serde_json::json!({
                "metadata": { "resourceVersion": latest.resource_version() },
                "status": status,
            });
            api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            Ok(())
        })
        .await
    }
}

async fn reconcile(
    generator: Arc<Cdk8sAppProxyGenerator>,
    ctx: Arc<GeneratorReconciler>,
) -> Result<Action> {
    let action = ctx.reconcile_generator(&generator).await?;
    ctx.backoff
        .reset(&object_key(generator.namespace().as_deref(), &generator.name_any()));
    Ok(action)
}

fn error_policy(
    generator: Arc<Cdk8sAppProxyGenerator>,
    error: &Error,
    ctx: Arc<GeneratorReconciler>,
) -> Action {
    let key = object_key(generator.namespace().as_deref(), &generator.name_any());
    let delay = ctx.backoff.next_delay(&key);
    warn!("Reconciling generator {} failed, retrying in {:?}: {}", key, delay, error);
    Action::requeue(delay)
}

/// Time left until the next poll is due, if any.
pub fn remaining_wait(
    last_polled: Option<DateTime<Utc>>,
    interval: Duration,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let last = last_polled?;
    let interval = chrono::Duration::from_std(interval).ok()?;
    (last + interval - now).to_std().ok().filter(|d| !d.is_zero())
}

/// An empty filter matches everything.
pub fn compile_filters(filters: &[PullRequestFilter]) -> Result<Vec<Option<Regex>>> {
    filters
        .iter()
        .map(|f| match f.branch_match.as_deref().filter(|p| !p.is_empty()) {
            Some(pattern) => Regex::new(pattern).map(Some).map_err(|e| Error::InvalidFilter {
                pattern: pattern.to_string(),
                cause: e.to_string(),
            }),
            None => Ok(None),
        })
        .collect()
}

/// No filters, or any filter matching the target branch.
pub fn matches_filters(filters: &[Option<Regex>], base_branch: &str) -> bool {
    filters.is_empty()
        || filters.iter().any(|f| match f {
            Some(re) => re.is_match(base_branch),
            None => true,
        })
}

pub fn child_name(generator: &str, number: u64) -> String {
    format!("{}-pr-{}", generator, number)
}

/// The Cdk8sAppProxy deploying one pull request's branch.
pub fn render_child(generator: &Cdk8sAppProxyGenerator, pr: &PullRequest) -> Result<Cdk8sAppProxy> {
    let owner = generator.controller_owner_ref(&()).ok_or_else(|| {
        Error::InvalidResource(format!("{} has no uid yet", generator.name_any()))
    })?;
    let template = &generator.spec.template;
    let source = &generator.spec.source;

    let mut spec = template.spec.clone();
    let mut repo = spec.git_repository.take().unwrap_or_default();
    repo.url = source.url.clone();
    repo.reference = Some(pr.branch.clone());
    repo.secret_ref = source.secret_ref.clone();
    repo.secret_key = source.secret_key.clone();
    if let Some(path) = generator.spec.app_path() {
        repo.path = Some(path.to_string());
    }
    spec.git_repository = Some(repo);

    let mut child_labels: BTreeMap<String, String> = template.metadata.labels.clone();
    child_labels.insert(labels::GENERATOR_NAME.to_string(), generator.name_any());
    child_labels.insert(labels::PR_NUMBER.to_string(), pr.number.to_string());

    let mut child = Cdk8sAppProxy::new(&child_name(&generator.name_any(), pr.number), spec);
    child.metadata.namespace = generator.namespace();
    child.metadata.labels = Some(child_labels);
    if !template.metadata.annotations.is_empty() {
        child.metadata.annotations = Some(template.metadata.annotations.clone());
    }
    child.metadata.owner_references = Some(vec![owner]);
    Ok(child)
}

async fn upsert_child(api: &Api<Cdk8sAppProxy>, child: Cdk8sAppProxy) -> Result<()> {
    let name = child.name_any();
    let (name, child) = (name.as_str(), &child);
    retry_on_conflict(CONFLICT_RETRIES, || async move {
        match api.get_opt(name).await? {
            None => {
                api.create(&PostParams::default(), child).await?;
                info!("Created Cdk8sAppProxy {}", name);
            }
            Some(mut existing) => {
                existing.spec = child.spec.clone();
                existing.metadata.labels = child.metadata.labels.clone();
                existing.metadata.annotations = child.metadata.annotations.clone();
                api.replace(name, &PostParams::default(), &existing).await?;
                debug!("Updated Cdk8sAppProxy {}", name);
            }
        }
        Ok(())
    })
    .await
}

/// Delete children of `generator` whose pull request is gone or filtered out.
async fn delete_orphans(
    api: &Api<Cdk8sAppProxy>,
    generator: &Cdk8sAppProxyGenerator,
    open: &BTreeSet<String>,
) -> Result<()> {
    let selector = format!("{}={}", labels::GENERATOR_NAME, generator.name_any());
    let children = api.list(&ListParams::default().labels(&selector)).await?;
    let uid = generator.meta().uid.as_deref();

    for child in children.items {
        let owned = child
            .owner_references()
            .iter()
            .any(|o| Some(o.uid.as_str()) == uid);
        let number = child.labels().get(labels::PR_NUMBER);
        if !owned || number.is_some_and(|n| open.contains(n)) {
            continue;
        }
        info!("Deleting Cdk8sAppProxy {} for closed pull request", child.name_any());
        api.delete(&child.name_any(), &DeleteParams::default()).await?;
    }
    Ok(())
}
