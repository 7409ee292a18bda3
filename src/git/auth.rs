// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deciding how to authenticate against a repository

use crate::error::{Error, Result};
use crate::git::{GitAuth, GitBackend};
use tracing::{debug, info, instrument};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UrlKind {
    Http,
    Ssh,
    Unknown,
}

/// Classify a repository URL by its transport.
pub fn classify_url(url: &str) -> UrlKind {
    if url.starts_with("http://") || url.starts_with("https://") {
        return UrlKind::Http;
    }
    if url.starts_with("ssh://") {
        return UrlKind::Ssh;
    }
    // scp-like shorthand, git@host:owner/repo.git
    if url.contains('@') && url.contains(':') && !url.starts_with("http") {
        return UrlKind::Ssh;
    }
    UrlKind::Unknown
}

/// The result of probing a repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Access {
    /// Credentials to pass to git, `None` for public repositories
    pub auth: Option<GitAuth>,
    pub requires_auth: bool,
}

/// Turn a raw credential into git auth according to the URL's transport.
pub fn auth_for(url: &str, credential: &[u8]) -> Result<GitAuth> {
    match classify_url(url) {
        UrlKind::Http => {
            let password = String::from_utf8(credential.to_vec())
                .map_err(|_| Error::InvalidCredential("token is not valid UTF-8".to_string()))?;
            Ok(GitAuth::Basic {
                username: "oauth2".to_string(),
                password: password.trim().to_string(),
            })
        }
        UrlKind::Ssh => {
            let text = String::from_utf8_lossy(credential);
            if !text.contains("PRIVATE KEY-----") {
                return Err(Error::InvalidCredential(
                    "credential is not a PEM or OpenSSH private key".to_string(),
                ));
            }
            Ok(GitAuth::SshKey {
                user: "git".to_string(),
                key: credential.to_vec(),
            })
        }
        UrlKind::Unknown => Err(Error::UnsupportedUrlScheme(url.to_string())),
    }
}

/// Probe the repository anonymously, then with the credential when needed.
#[instrument(skip(git, credential))]
pub async fn resolve_access(
    git: &dyn GitBackend,
    url: &str,
    credential: Option<&[u8]>,
) -> Result<Access> {
    let anonymous_err = match git.ls_remote(url, None).await {
        Ok(_) => {
            debug!("Repository {} is publicly readable", url);
            return Ok(Access::default());
        }
        Err(e) => e,
    };

    let Some(credential) = credential.filter(|c| !c.is_empty()) else {
        return Err(Error::AuthRequired {
            url: url.to_string(),
            cause: anonymous_err.to_string(),
        });
    };

    let auth = auth_for(url, credential)?;
    info!("Repository {} requires authentication, using {:?}", url, classify_url(url));

    git.ls_remote(url, Some(&auth))
        .await
        .map_err(|e| Error::AuthRejected {
            url: url.to_string(),
            cause: e.to_string(),
        })?;

    Ok(Access {
        auth: Some(auth),
        requires_auth: true,
    })
}
