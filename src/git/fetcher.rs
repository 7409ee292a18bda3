// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Clone, hash and poll operations on top of a [`GitBackend`]

use crate::error::{Error, Result};
use crate::git::{GitAuth, GitBackend, RemoteRef};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Shallow clone `reference` into `dest`, which must not exist yet.
#[instrument(skip(git, auth, dest), fields(dest = %dest.display()))]
pub async fn clone(
    git: &dyn GitBackend,
    url: &str,
    auth: Option<&GitAuth>,
    reference: &str,
    dest: &Path,
) -> Result<()> {
    if dest.exists() {
        return Err(Error::ScratchDirExists(dest.to_path_buf()));
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!("Cloning {} at '{}' into {}", url, reference, dest.display());
    git.clone_shallow(url, auth, reference, dest).await?;
    info!("Successfully cloned {}", url);
    Ok(())
}

/// True when `target` names a remote rather than a local checkout.
pub fn is_remote(target: &str) -> bool {
    if let Ok(parsed) = url::Url::parse(target) {
        // single letter schemes are Windows drive letters
        if parsed.scheme().len() > 1 {
            return true;
        }
    }
    target.contains('@') && target.contains(':')
}

/// Commit hash for `reference` on a remote, or HEAD of a local checkout.
pub async fn hash(
    git: &dyn GitBackend,
    target: &str,
    auth: Option<&GitAuth>,
    reference: &str,
) -> Result<String> {
    if !is_remote(target) {
        return git.head(Path::new(target)).await;
    }

    let refs = git.ls_remote(target, auth).await?;
    select_ref(&refs, reference).ok_or_else(|| Error::ReferenceNotFound {
        url: target.to_string(),
        reference: reference.to_string(),
    })
}

/// Branch tip first, then the commit a tag points at.
fn select_ref(refs: &[RemoteRef], reference: &str) -> Option<String> {
    let candidates = [
        format!("refs/heads/{}", reference),
        format!("refs/tags/{}^{{}}", reference),
        format!("refs/tags/{}", reference),
    ];
    candidates
        .iter()
        .find_map(|name| refs.iter().find(|r| &r.name == name))
        .map(|r| r.hash.clone())
}

/// Whether the remote has moved past the local checkout. Does not fetch.
#[instrument(skip(git, auth, local), fields(local = %local.display()))]
pub async fn poll(
    git: &dyn GitBackend,
    url: &str,
    auth: Option<&GitAuth>,
    reference: &str,
    local: &Path,
) -> Result<bool> {
    let local_hash = git.head(local).await?;
    let remote_hash = hash(git, url, auth, reference).await?;
    debug!("Local {} remote {} for '{}'", local_hash, remote_hash, reference);
    Ok(local_hash != remote_hash)
}
