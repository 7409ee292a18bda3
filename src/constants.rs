// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Field manager used for server-side apply on target clusters.
pub const FIELD_MANAGER: &str = "cdk8sappproxy-controller";

/// Finalizer guarding scratch directory cleanup for Cdk8sAppProxy.
pub const FINALIZER: &str = "addons.cluster.x-k8s.io/cdk8sappproxy";

/// Secret key holding a cluster's kubeconfig (Cluster API convention).
pub const KUBECONFIG_SECRET_KEY: &str = "value";

/// Defaults applied to a Cdk8sAppProxy git repository.
pub mod defaults {
    pub const REFERENCE: &str = "main";
    pub const PATH: &str = ".";
    pub const POLL_INTERVAL: &str = "5m";
}

/// Labels set on Cdk8sAppProxy objects created by a generator
pub mod labels {
    pub const GENERATOR_NAME: &str = "addons.cluster.x-k8s.io/generator-name";
    pub const PR_NUMBER: &str = "addons.cluster.x-k8s.io/pr-number";
}

/// Status condition types
pub mod conditions {
    pub const GIT_REPOSITORY_READY: &str = "GitRepositoryReady";
    pub const SYNTHESIS_READY: &str = "SynthesisReady";
    pub const DEPLOYMENT_PROGRESSING: &str = "DeploymentProgressing";
    pub const READY: &str = "Ready";
    pub const PULL_REQUESTS_SYNCED: &str = "PullRequestsSynced";
}

/// Status condition reasons
pub mod reasons {
    pub const EMPTY_GIT_REPOSITORY: &str = "EmptyGitRepository";
    pub const SECRET_FETCH_FAILED: &str = "SecretFetchFailed";
    pub const GIT_AUTHENTICATION_FAILED: &str = "GitAuthenticationFailed";
    pub const GIT_CLONE_SUCCESS: &str = "GitCloneSuccess";
    pub const GIT_CLONE_FAILED: &str = "GitCloneFailed";
    pub const GIT_HASH_FAILURE: &str = "GitHashFailure";
    pub const GIT_OPERATION_FAILED: &str = "GitOperationFailed";
    pub const CDK8S_SYNTH_FAILED: &str = "Cdk8sSynthFailed";
    pub const SYNTHESIZED: &str = "Synthesized";
    pub const WALK_DIST_FAILED: &str = "WalkDistFailed";
    pub const READ_MANIFEST_FAILED: &str = "ReadManifestFailed";
    pub const DECODE_MANIFEST_FAILED: &str = "DecodeManifestFailed";
    pub const CLUSTER_SELECTOR_PARSE_FAILED: &str = "ClusterSelectorParseFailed";
    pub const LIST_CLUSTERS_FAILED: &str = "ListClustersFailed";
    pub const KUBECONFIG_UNAVAILABLE: &str = "KubeconfigUnavailable";
    pub const RESOURCE_APPLY_FAILED: &str = "ResourceApplyFailed";
    pub const RESOURCES_APPLIED: &str = "ResourcesApplied";
    pub const KUBERNETES_API_FAILED: &str = "KubernetesApiFailed";
    pub const LIST_PULL_REQUESTS_FAILED: &str = "ListPullRequestsFailed";
    pub const INVALID_SPEC: &str = "InvalidSpec";
    pub const READY: &str = "Cdk8sAppProxyReady";
    pub const PULL_REQUESTS_SYNCED: &str = "PullRequestsSynced";
}

/// Condition severities
pub mod severity {
    pub const ERROR: &str = "Error";
    pub const WARNING: &str = "Warning";
    pub const INFO: &str = "Info";
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Error requeue backoff
pub mod backoff {
    pub const INITIAL_SECS: u64 = 5;
    pub const MAX_SECS: u64 = 300;
}

/// Attempts made when an update hits a resourceVersion conflict.
pub const CONFLICT_RETRIES: usize = 5;
