// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The Cdk8sAppProxyGenerator custom resource: one Cdk8sAppProxy per open pull request.

use crate::constants::defaults;
use crate::duration::parse_interval;
use crate::error::Result;
use crate::types::app::{Cdk8sAppProxySpec, GitRepositorySpec};
use crate::types::conditions::Condition;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(
    group = "addons.cluster.x-k8s.io",
    version = "v1alpha1",
    kind = "Cdk8sAppProxyGenerator",
    shortname = "capg",
    namespaced,
    status = "Cdk8sAppProxyGeneratorStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct Cdk8sAppProxyGeneratorSpec {
    pub source: GitRepositorySpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<PullRequestFilter>,
    pub template: Cdk8sAppProxyTemplate,
    /// Overrides the app path of every generated Cdk8sAppProxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestFilter {
    /// Regex matched against the pull request's target branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_match: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cdk8sAppProxyTemplate {
    #[serde(default)]
    pub metadata: TemplateMetadata,
    pub spec: Cdk8sAppProxySpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
pub struct TemplateMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cdk8sAppProxyGeneratorStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// RFC3339 time of the last provider poll
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_polled_time: Option<String>,
}

impl Cdk8sAppProxyGeneratorSpec {
    pub fn poll_interval(&self) -> Result<Duration> {
        parse_interval(
            self.poll_interval
                .as_deref()
                .filter(|i| !i.is_empty())
                .unwrap_or(defaults::POLL_INTERVAL),
        )
    }

    /// Path for generated apps: generator override, then source path.
    pub fn app_path(&self) -> Option<&str> {
        self.path
            .as_deref()
            .filter(|p| !p.is_empty())
            .or(self.source.path.as_deref().filter(|p| !p.is_empty()))
    }
}

impl Cdk8sAppProxyGenerator {
    pub fn last_polled(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.status
            .as_ref()
            .and_then(|s| s.last_polled_time.as_deref())
            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&chrono::Utc))
    }
}
