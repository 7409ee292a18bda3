// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reading repository credentials from secrets

use crate::error::{Error, Result};
use crate::types::GitRepositorySpec;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tracing::{debug, instrument};

/// Fetch the credential referenced by a repository spec.
/// Returns `None` when the repository references no secret.
#[instrument(skip(client, repo), fields(secret = ?repo.secret_ref))]
pub async fn fetch_credential(
    client: &Client,
    namespace: &str,
    repo: &GitRepositorySpec,
) -> Result<Option<Vec<u8>>> {
    let Some((name, key)) = repo.credential_ref() else {
        return Ok(None);
    };

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = secrets
        .get_opt(name)
        .await?
        .ok_or_else(|| Error::SecretError(format!("secret {}/{} not found", namespace, name)))?;

    let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) else {
        return Err(Error::SecretError(format!(
            "secret {}/{} does not contain key '{}'",
            namespace, name, key
        )));
    };

    debug!("Found credential in secret {}/{} key '{}'", namespace, name, key);
    Ok(Some(value.0.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{secret_json, MockService};

    fn repo_with_secret(name: &str, key: &str) -> GitRepositorySpec {
        GitRepositorySpec {
            url: "https://github.com/o/r.git".to_string(),
            secret_ref: Some(name.to_string()),
            secret_key: Some(key.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_secret_ref() {
        let client = MockService::new().into_client();
        let repo = GitRepositorySpec {
            url: "https://github.com/o/r.git".to_string(),
            ..Default::default()
        };
        assert!(fetch_credential(&client, "default", &repo).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_credential() {
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/default/secrets/git-token",
                200,
                &secret_json("default", "git-token", &[("token", "s3cr3t")]),
            )
            .into_client();

        let repo = repo_with_secret("git-token", "token");
        let credential = fetch_credential(&client, "default", &repo).await.unwrap();
        assert_eq!(credential.unwrap(), b"s3cr3t".to_vec());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/default/secrets/git-token",
                200,
                &secret_json("default", "git-token", &[("other", "x")]),
            )
            .into_client();

        let err = fetch_credential(&client, "default", &repo_with_secret("git-token", "token"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SecretError(_)));
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let client = MockService::new().into_client();
        let err = fetch_credential(&client, "default", &repo_with_secret("absent", "token"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SecretError(_)));
    }
}
