// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use thiserror::Error;

use crate::constants::reasons;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to build client from kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Invalid application path: {0}")]
    InvalidPath(String),

    #[error("Credential secret error: {0}")]
    SecretError(String),

    #[error("Repository {url} requires authentication but no credential was provided: {cause}")]
    AuthRequired { url: String, cause: String },

    #[error("Authentication against {url} was rejected: {cause}")]
    AuthRejected { url: String, cause: String },

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Unsupported repository URL scheme: {0}")]
    UnsupportedUrlScheme(String),

    #[error("git {command} failed: {stderr}")]
    GitCommand { command: String, stderr: String },

    #[error("Reference '{reference}' not found in {url}")]
    ReferenceNotFound { url: String, reference: String },

    #[error("Scratch directory {0} already exists")]
    ScratchDirExists(PathBuf),

    #[error("Unable to determine application kind in {0}")]
    UnknownAppKind(PathBuf),

    #[error("Required tool '{0}' was not found")]
    ToolchainMissing(String),

    #[error("{tool} failed: {output}")]
    ToolFailed { tool: String, output: String },

    #[error("Failed to walk {path}: {cause}")]
    WalkDist { path: PathBuf, cause: String },

    #[error("Failed to read manifest {path}: {cause}")]
    ReadManifest { path: PathBuf, cause: String },

    #[error("Failed to decode manifest {path}: {cause}")]
    DecodeManifest { path: PathBuf, cause: String },

    #[error("Manifest {path} contains an object without apiVersion or kind")]
    InvalidManifest { path: PathBuf },

    #[error("Failed to list clusters: {0}")]
    ListClusters(#[source] kube::Error),

    #[error("Invalid cluster selector: {0}")]
    InvalidSelector(String),

    #[error("Failed to apply {resource} to cluster {cluster}: {cause}")]
    ApplyFailed {
        cluster: String,
        resource: String,
        cause: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Git provider error: {0}")]
    ProviderError(String),

    #[error("Invalid branch filter '{pattern}': {cause}")]
    InvalidFilter { pattern: String, cause: String },

    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("Poll interval '{0}' must be greater than zero")]
    ZeroInterval(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // finalizer::Error wraps the reconcile error, hence the box
    #[error("Finalizer error: {0}")]
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    /// Machine readable reason recorded on status conditions.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::KubeError(_) => reasons::KUBERNETES_API_FAILED,
            Error::KubeconfigError(_) => reasons::KUBECONFIG_UNAVAILABLE,
            Error::InvalidResource(_) => reasons::EMPTY_GIT_REPOSITORY,
            Error::SecretError(_) => reasons::SECRET_FETCH_FAILED,
            Error::AuthRequired { .. }
            | Error::AuthRejected { .. }
            | Error::InvalidCredential(_)
            | Error::UnsupportedUrlScheme(_) => reasons::GIT_AUTHENTICATION_FAILED,
            Error::GitCommand { .. } | Error::ScratchDirExists(_) => reasons::GIT_CLONE_FAILED,
            Error::ReferenceNotFound { .. } => reasons::GIT_HASH_FAILURE,
            Error::UnknownAppKind(_) | Error::ToolchainMissing(_) | Error::ToolFailed { .. } => {
                reasons::CDK8S_SYNTH_FAILED
            }
            Error::WalkDist { .. } => reasons::WALK_DIST_FAILED,
            Error::ReadManifest { .. } => reasons::READ_MANIFEST_FAILED,
            Error::DecodeManifest { .. } | Error::InvalidManifest { .. } => {
                reasons::DECODE_MANIFEST_FAILED
            }
            Error::ListClusters(_) => reasons::LIST_CLUSTERS_FAILED,
            Error::InvalidSelector(_) => reasons::CLUSTER_SELECTOR_PARSE_FAILED,
            Error::ApplyFailed { .. } => reasons::RESOURCE_APPLY_FAILED,
            Error::Http(_) | Error::ProviderError(_) => reasons::LIST_PULL_REQUESTS_FAILED,
            Error::InvalidPath(_)
            | Error::InvalidFilter { .. }
            | Error::InvalidDuration(_)
            | Error::ZeroInterval(_) => {
                reasons::INVALID_SPEC
            }
            Error::Io(_) => reasons::GIT_OPERATION_FAILED,
            Error::FinalizerError(_) => reasons::KUBERNETES_API_FAILED,
        }
    }

    /// True for optimistic concurrency failures (HTTP 409).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(e)) if e.code == 409)
    }

    /// Unwrap the reconcile error carried by a finalizer failure.
    pub fn from_finalizer(error: kube::runtime::finalizer::Error<Error>) -> Error {
        match error {
            kube::runtime::finalizer::Error::ApplyFailed(inner)
            | kube::runtime::finalizer::Error::CleanupFailed(inner) => inner,
            other => Error::FinalizerError(Box::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
