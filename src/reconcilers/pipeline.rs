// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! One pass of the fetch, synthesize and deploy cycle for a Cdk8sAppProxy.

use crate::constants::{conditions, reasons};
use crate::error::{Error, Result};
use crate::git::{self, resolve_access, Access, GitBackend};
use crate::resourcer::Applier;
use crate::synth::Synthesizer;
use crate::types::app::SyncStatus;
use crate::types::conditions::{mark_failed, mark_true};
use crate::types::{Cdk8sAppProxy, Cdk8sAppProxyStatus, GitRepositorySpec};
use kube::api::DynamicObject;
use kube::ResourceExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a successful pass did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// No checkout existed, so the app was cloned and deployed
    Bootstrapped,
    /// Resources were missing from a cluster and were applied again
    Reapplied,
    /// The tracked reference moved and the new revision was deployed
    Updated,
    Unchanged,
}

#[derive(Clone)]
pub struct Pipeline {
    git: Arc<dyn GitBackend>,
    synthesizer: Synthesizer,
    applier: Arc<dyn Applier>,
    scratch_root: PathBuf,
}

impl Pipeline {
    pub fn new(
        git: Arc<dyn GitBackend>,
        synthesizer: Synthesizer,
        applier: Arc<dyn Applier>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            git,
            synthesizer,
            applier,
            scratch_root: scratch_root.into(),
        }
    }

    /// Parent of every checkout belonging to `app`.
    pub fn app_root(&self, app: &Cdk8sAppProxy) -> PathBuf {
        self.scratch_root
            .join("cdk8s")
            .join(app.namespace().unwrap_or_else(|| "default".to_string()))
            .join(app.name_any())
    }

    /// Checkout directory for the app's current reference.
    pub fn scratch_dir(&self, app: &Cdk8sAppProxy, reference: &str) -> PathBuf {
        self.app_root(app).join(sanitize(reference))
    }

    /// Remove every checkout of `app`.
    pub async fn cleanup(&self, app: &Cdk8sAppProxy) -> Result<()> {
        remove_dir(&self.app_root(app)).await
    }

    /// Run one pass. Conditions and sync state are recorded on `status`
    /// whatever the result.
    #[instrument(skip_all, fields(app = %app.name_any()))]
    pub async fn run(
        &self,
        app: &Cdk8sAppProxy,
        credential: Option<&[u8]>,
        status: &mut Cdk8sAppProxyStatus,
    ) -> Result<Outcome> {
        let repo = stage(status, conditions::GIT_REPOSITORY_READY, app.git_repository())?;
        let access = stage(
            status,
            conditions::GIT_REPOSITORY_READY,
            resolve_access(self.git.as_ref(), &repo.url, credential).await,
        )?;

        let dir = self.scratch_dir(app, repo.reference());
        let bootstrapped = !dir.exists();
        if bootstrapped {
            // checkouts of a previous reference are stale
            stage(status, conditions::GIT_REPOSITORY_READY, remove_dir(&self.app_root(app)).await)?;
            self.deploy_fresh(app, repo, &access, &dir, status).await?;
        }

        let reapplied = self.converge(app, repo, &dir, status).await?;
        let outcome = if bootstrapped {
            Outcome::Bootstrapped
        } else if reapplied {
            Outcome::Reapplied
        } else {
            let changed = stage(
                status,
                conditions::GIT_REPOSITORY_READY,
                git::poll(
                    self.git.as_ref(),
                    &repo.url,
                    access.auth.as_ref(),
                    repo.reference(),
                    &dir,
                )
                .await,
            )?;
            if changed {
                info!("Reference '{}' of {} moved, redeploying", repo.reference(), repo.url);
                stage(status, conditions::GIT_REPOSITORY_READY, remove_dir(&dir).await)?;
                self.deploy_fresh(app, repo, &access, &dir, status).await?;
                self.converge(app, repo, &dir, status).await?;
                Outcome::Updated
            } else {
                debug!("Reference '{}' unchanged and all resources present", repo.reference());
                Outcome::Unchanged
            }
        };

        let revision = stage(status, conditions::GIT_REPOSITORY_READY, self.git.head(&dir).await)?;
        mark_true(
            &mut status.conditions,
            conditions::READY,
            reasons::READY,
            &format!("Revision {} deployed", revision),
        );
        status.sync = SyncStatus::synced(revision);
        Ok(outcome)
    }

    async fn deploy_fresh(
        &self,
        app: &Cdk8sAppProxy,
        repo: &GitRepositorySpec,
        access: &Access,
        dir: &Path,
        status: &mut Cdk8sAppProxyStatus,
    ) -> Result<()> {
        let cloned = git::clone(
            self.git.as_ref(),
            &repo.url,
            access.auth.as_ref(),
            repo.reference(),
            dir,
        )
        .await;
        if cloned.is_err() {
            // a half written checkout would be mistaken for a good one
            if let Err(e) = remove_dir(dir).await {
                warn!("Failed to remove partial checkout {}: {}", dir.display(), e);
            }
        }
        stage(status, conditions::GIT_REPOSITORY_READY, cloned)?;
        mark_true(
            &mut status.conditions,
            conditions::GIT_REPOSITORY_READY,
            reasons::GIT_CLONE_SUCCESS,
            &format!("Cloned {} at '{}'", repo.url, repo.reference()),
        );

        let resources = self.synthesize(repo, dir, status).await?;
        self.apply(app, &resources, status).await
    }

    /// Synthesize the checkout and check every resource is on every selected
    /// cluster, applying again when any is missing. Returns whether it applied.
    async fn converge(
        &self,
        app: &Cdk8sAppProxy,
        repo: &GitRepositorySpec,
        dir: &Path,
        status: &mut Cdk8sAppProxyStatus,
    ) -> Result<bool> {
        let resources = self.synthesize(repo, dir, status).await?;
        let missing = stage(
            status,
            conditions::DEPLOYMENT_PROGRESSING,
            self.applier.check(app, &resources).await,
        )?;
        if missing {
            info!("Resources missing on target clusters, applying again");
            self.apply(app, &resources, status).await?;
        }
        Ok(missing)
    }

    async fn synthesize(
        &self,
        repo: &GitRepositorySpec,
        dir: &Path,
        status: &mut Cdk8sAppProxyStatus,
    ) -> Result<Vec<DynamicObject>> {
        let resources = stage(
            status,
            conditions::SYNTHESIS_READY,
            self.synthesizer.synthesize(dir, repo.path()).await,
        )?;
        mark_true(
            &mut status.conditions,
            conditions::SYNTHESIS_READY,
            reasons::SYNTHESIZED,
            &format!("Synthesized {} resources", resources.len()),
        );
        Ok(resources)
    }

    async fn apply(
        &self,
        app: &Cdk8sAppProxy,
        resources: &[DynamicObject],
        status: &mut Cdk8sAppProxyStatus,
    ) -> Result<()> {
        let result = self.applier.apply(app, status, resources).await;
        stage(status, conditions::DEPLOYMENT_PROGRESSING, result)
    }
}

/// Record a failed stage: the stage condition and Ready go False and the
/// sync state becomes Failed with the error's reason.
pub fn record_failure(status: &mut Cdk8sAppProxyStatus, condition: &str, error: &Error) {
    let message = error.to_string();
    mark_failed(&mut status.conditions, condition, error.reason(), &message);
    mark_failed(&mut status.conditions, conditions::READY, error.reason(), &message);
    status.sync = SyncStatus::failed(error.reason());
}

fn stage<T>(status: &mut Cdk8sAppProxyStatus, condition: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        record_failure(status, condition, e);
    }
    result
}

async fn remove_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// References become single path components.
fn sanitize(reference: &str) -> String {
    reference
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
