// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Git repository access: credential resolution, cloning, hashing and
//! pull request listing.

pub mod auth;
pub mod cli;
pub mod fetcher;
pub mod provider;

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

pub use auth::{classify_url, resolve_access, Access, UrlKind};
pub use cli::GitCli;
pub use fetcher::{clone, hash, poll};

/// Credential material handed to git for one operation.
#[derive(Clone, PartialEq, Eq)]
pub enum GitAuth {
    /// HTTP Basic, used for personal access tokens
    Basic { username: String, password: String },
    /// PEM or OpenSSH private key
    SshKey { user: String, key: Vec<u8> },
}

impl fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitAuth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            GitAuth::SshKey { user, .. } => f
                .debug_struct("SshKey")
                .field("user", user)
                .field("key", &"<redacted>")
                .finish(),
        }
    }
}

/// A ref advertised by a remote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteRef {
    pub name: String,
    pub hash: String,
}

/// The git operations the reconcilers depend on.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// List the refs a remote advertises. Fails when the remote is unreachable
    /// or rejects the credentials.
    async fn ls_remote(&self, url: &str, auth: Option<&GitAuth>) -> Result<Vec<RemoteRef>>;

    /// Single branch, depth one clone of `reference` into `dest`.
    async fn clone_shallow(
        &self,
        url: &str,
        auth: Option<&GitAuth>,
        reference: &str,
        dest: &Path,
    ) -> Result<()>;

    /// Commit hash of HEAD in a local checkout.
    async fn head(&self, dir: &Path) -> Result<String>;
}
