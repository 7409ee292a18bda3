// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The Cdk8sAppProxy custom resource and its admission rules.

use crate::constants::defaults;
use crate::duration::parse_interval;
use crate::error::{Error, Result};
use crate::types::conditions::Condition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(
    group = "addons.cluster.x-k8s.io",
    version = "v1alpha1",
    kind = "Cdk8sAppProxy",
    shortname = "cap",
    namespaced,
    status = "Cdk8sAppProxyStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Revision","type":"string","jsonPath":".status.sync.revision"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct Cdk8sAppProxySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_repository: Option<GitRepositorySpec>,
    /// Selects the Cluster API clusters (in this namespace) to deploy to
    #[serde(default)]
    pub cluster_selector: LabelSelector,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositorySpec {
    pub url: String,
    /// Branch or tag to track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Directory of the cdk8s app inside the repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Name of a secret in the same namespace holding the access credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_poll_interval: Option<String>,
}

impl GitRepositorySpec {
    pub fn reference(&self) -> &str {
        self.reference
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(defaults::REFERENCE)
    }

    pub fn path(&self) -> &str {
        self.path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(defaults::PATH)
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        parse_interval(
            self.reference_poll_interval
                .as_deref()
                .filter(|i| !i.is_empty())
                .unwrap_or(defaults::POLL_INTERVAL),
        )
    }

    /// The (secret name, key) pair when a credential is referenced.
    pub fn credential_ref(&self) -> Option<(&str, &str)> {
        let name = self.secret_ref.as_deref().filter(|s| !s.is_empty())?;
        Some((name, self.secret_key.as_deref().unwrap_or_default()))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cdk8sAppProxyStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub sync: SyncStatus,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum SyncState {
    #[default]
    Uninitialized,
    Synced,
    Failed,
}

/// Outcome of the last reconcile. `revision` is set when synced, `reason` when failed.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SyncStatus {
    pub fn synced(revision: impl Into<String>) -> Self {
        SyncStatus {
            state: SyncState::Synced,
            revision: Some(revision.into()),
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        SyncStatus {
            state: SyncState::Failed,
            revision: None,
            reason: Some(reason.into()),
        }
    }
}

impl Cdk8sAppProxy {
    /// The git repository, or an error when it is missing or has no URL.
    pub fn git_repository(&self) -> Result<&GitRepositorySpec> {
        match self.spec.git_repository.as_ref() {
            Some(repo) if !repo.url.trim().is_empty() => Ok(repo),
            Some(_) => Err(Error::InvalidResource(format!(
                "{}: gitRepository.url must not be empty",
                self.name_any()
            ))),
            None => Err(Error::InvalidResource(format!(
                "{}: gitRepository must be set",
                self.name_any()
            ))),
        }
    }
}

/// Defaulting admission rule.
pub fn apply_defaults(app: &mut Cdk8sAppProxy) {
    if let Some(repo) = app.spec.git_repository.as_mut() {
        if repo.reference.as_deref().unwrap_or_default().is_empty() {
            repo.reference = Some(defaults::REFERENCE.to_string());
        }
        if repo.path.as_deref().unwrap_or_default().is_empty() {
            repo.path = Some(defaults::PATH.to_string());
        }
        if repo.reference_poll_interval.as_deref().unwrap_or_default().is_empty() {
            repo.reference_poll_interval = Some(defaults::POLL_INTERVAL.to_string());
        }
    }
}

/// Validating admission rule for create.
pub fn validate_create(app: &Cdk8sAppProxy) -> Result<()> {
    let repo = app.git_repository()?;
    if let Some(interval) = repo.reference_poll_interval.as_deref().filter(|i| !i.is_empty()) {
        parse_interval(interval)?;
    }
    Ok(())
}

/// Validating admission rule for update. The repository URL is immutable.
pub fn validate_update(old: &Cdk8sAppProxy, new: &Cdk8sAppProxy) -> Result<()> {
    validate_create(new)?;
    let old_url = old.spec.git_repository.as_ref().map(|r| r.url.as_str());
    let new_url = new.spec.git_repository.as_ref().map(|r| r.url.as_str());
    if old_url.is_some() && old_url != new_url {
        return Err(Error::InvalidResource(format!(
            "{}: gitRepository.url is immutable",
            new.name_any()
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn make_app(
    name: &str,
    namespace: &str,
    repo: Option<GitRepositorySpec>,
) -> Cdk8sAppProxy {
    let mut app = Cdk8sAppProxy::new(
        name,
        Cdk8sAppProxySpec {
            git_repository: repo,
            cluster_selector: LabelSelector::default(),
        },
    );
    app.metadata.namespace = Some(namespace.to_string());
    app.metadata.generation = Some(1);
    app
}

#[cfg(test)]
pub(crate) fn make_repo(url: &str) -> GitRepositorySpec {
    GitRepositorySpec {
        url: url.to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::reasons;

    #[test]
    fn test_defaults_applied() {
        let mut app = make_app("app", "default", Some(make_repo("https://github.com/o/r.git")));
        apply_defaults(&mut app);

        let repo = app.spec.git_repository.unwrap();
        assert_eq!(repo.reference.as_deref(), Some("main"));
        assert_eq!(repo.path.as_deref(), Some("."));
        assert_eq!(repo.reference_poll_interval.as_deref(), Some("5m"));
    }

    #[test]
    fn test_defaults_keep_explicit_values() {
        let mut repo = make_repo("https://github.com/o/r.git");
        repo.reference = Some("release".to_string());
        repo.path = Some("apps/web".to_string());
        let mut app = make_app("app", "default", Some(repo));
        apply_defaults(&mut app);

        let repo = app.spec.git_repository.unwrap();
        assert_eq!(repo.reference(), "release");
        assert_eq!(repo.path(), "apps/web");
    }

    #[test]
    fn test_accessors_fall_back_to_defaults() {
        let repo = make_repo("https://github.com/o/r.git");
        assert_eq!(repo.reference(), "main");
        assert_eq!(repo.path(), ".");
        assert_eq!(repo.poll_interval().unwrap(), Duration::from_secs(300));
        assert!(repo.credential_ref().is_none());
    }

    #[test]
    fn test_validate_create_rejects_missing_repository() {
        let app = make_app("app", "default", None);
        assert!(matches!(validate_create(&app), Err(Error::InvalidResource(_))));

        let app = make_app("app", "default", Some(make_repo("")));
        assert!(matches!(validate_create(&app), Err(Error::InvalidResource(_))));
    }

    #[test]
    fn test_validate_create_rejects_bad_interval() {
        let mut repo = make_repo("https://github.com/o/r.git");
        repo.reference_poll_interval = Some("soon".to_string());
        let app = make_app("app", "default", Some(repo));
        assert!(matches!(validate_create(&app), Err(Error::InvalidDuration(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut repo = make_repo("https://github.com/o/r.git");
        repo.reference_poll_interval = Some("0s".to_string());
        assert!(matches!(repo.poll_interval(), Err(Error::ZeroInterval(_))));

        let app = make_app("app", "default", Some(repo));
        let err = validate_create(&app).unwrap_err();
        assert_eq!(err.reason(), reasons::INVALID_SPEC);
    }

    #[test]
    fn test_validate_update_rejects_url_change() {
        let old = make_app("app", "default", Some(make_repo("https://github.com/o/r.git")));
        let new = make_app("app", "default", Some(make_repo("https://github.com/o/other.git")));
        assert!(validate_update(&old, &new).is_err());
    }

    #[test]
    fn test_validate_update_allows_reference_change() {
        let old = make_app("app", "default", Some(make_repo("https://github.com/o/r.git")));
        let mut repo = make_repo("https://github.com/o/r.git");
        repo.reference = Some("develop".to_string());
        let new = make_app("app", "default", Some(repo));
        assert!(validate_update(&old, &new).is_ok());
    }

    #[test]
    fn test_sync_status_serialization() {
        let status = Cdk8sAppProxyStatus {
            sync: SyncStatus::synced("abc123"),
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["sync"]["state"], "Synced");
        assert_eq!(value["sync"]["revision"], "abc123");
        assert!(value.get("conditions").is_none());
    }
}
