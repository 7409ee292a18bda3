// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Listing open pull requests on GitHub, GitLab and Bitbucket

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    /// Source (head) branch
    pub branch: String,
    pub head_sha: String,
    /// Target branch
    pub base_branch: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    GitHub,
    GitLab,
    Bitbucket,
}

impl Provider {
    /// Detect the provider from the repository host.
    pub fn detect(repo_url: &str) -> Option<Self> {
        let lower = repo_url.to_lowercase();
        if lower.contains("github.com") {
            Some(Provider::GitHub)
        } else if lower.contains("gitlab.com") {
            Some(Provider::GitLab)
        } else if lower.contains("bitbucket.org") {
            Some(Provider::Bitbucket)
        } else {
            None
        }
    }

    fn host(self) -> &'static str {
        match self {
            Provider::GitHub => "github.com",
            Provider::GitLab => "gitlab.com",
            Provider::Bitbucket => "bitbucket.org",
        }
    }

    /// GitLab projects can live in nested groups.
    fn allows_nested(self) -> bool {
        matches!(self, Provider::GitLab)
    }
}

/// Split a repository URL into (owner, repo).
pub fn parse_repo_url(repo_url: &str, provider: Provider) -> Result<(String, String)> {
    let host = provider.host();
    let trimmed = repo_url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    let rest = trimmed
        .strip_prefix(&format!("https://{}/", host))
        .or_else(|| trimmed.strip_prefix(&format!("git@{}:", host)))
        .ok_or_else(|| Error::ProviderError(format!("invalid {} URL: {}", host, repo_url)))?;

    let parts: Vec<&str> = rest.split('/').collect();
    if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(Error::ProviderError(format!("invalid {} URL: {}", host, repo_url)));
    }

    let owner = parts[0].to_string();
    let repo = if provider.allows_nested() {
        parts[1..].join("/")
    } else {
        parts[1].to_string()
    };
    Ok((owner, repo))
}

#[async_trait]
pub trait PullRequestLister: Send + Sync {
    async fn list_pull_requests(
        &self,
        repo_url: &str,
        credential: Option<&[u8]>,
    ) -> Result<Vec<PullRequest>>;
}

/// REST client for the hosted git providers. Only the first page is read.
#[derive(Clone, Debug)]
pub struct ProviderClient {
    http: reqwest::Client,
    github_api: String,
    gitlab_api: String,
    bitbucket_api: String,
}

impl ProviderClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            github_api: "https://api.github.com".to_string(),
            gitlab_api: "https://gitlab.com/api/v4".to_string(),
            bitbucket_api: "https://api.bitbucket.org/2.0".to_string(),
        })
    }

    /// Point every provider at one API base URL.
    pub fn with_api_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        self.github_api = base.clone();
        self.gitlab_api = base.clone();
        self.bitbucket_api = base;
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, headers: HeaderMap) -> Result<T> {
        let response = self.http.get(url).headers(headers).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::ProviderError(format!(
                "unexpected status code {} from {}",
                status.as_u16(),
                url
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| {
                Error::ProviderError(format!("failed to decode response from {}: {}", url, e))
            })
    }

    async fn github(
        &self,
        owner: &str,
        repo: &str,
        credential: Option<&str>,
    ) -> Result<Vec<PullRequest>> {
        #[derive(Deserialize)]
        struct GhRef {
            #[serde(rename = "ref")]
            name: String,
            sha: Option<String>,
        }
        #[derive(Deserialize)]
        struct GhPull {
            number: u64,
            head: GhRef,
            base: GhRef,
        }

        let url = format!("{}/repos/{}/{}/pulls?state=open", self.github_api, owner, repo);
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        if let Some(token) = credential {
            headers.insert(AUTHORIZATION, header_value(&format!("token {}", token))?);
        }

        let pulls: Vec<GhPull> = self.get_json(&url, headers).await?;
        Ok(pulls
            .into_iter()
            .map(|p| PullRequest {
                number: p.number,
                branch: p.head.name,
                head_sha: p.head.sha.unwrap_or_default(),
                base_branch: p.base.name,
            })
            .collect())
    }

    async fn gitlab(
        &self,
        owner: &str,
        repo: &str,
        credential: Option<&str>,
    ) -> Result<Vec<PullRequest>> {
        #[derive(Deserialize)]
        struct GlMergeRequest {
            iid: u64,
            source_branch: String,
            target_branch: String,
            sha: Option<String>,
        }

        let project = urlencoding::encode(&format!("{}/{}", owner, repo)).into_owned();
        let url = format!(
            "{}/projects/{}/merge_requests?state=opened",
            self.gitlab_api, project
        );
        let mut headers = HeaderMap::new();
        if let Some(token) = credential {
            headers.insert("Private-Token", header_value(token)?);
        }

        let mrs: Vec<GlMergeRequest> = self.get_json(&url, headers).await?;
        Ok(mrs
            .into_iter()
            .map(|mr| PullRequest {
                number: mr.iid,
                branch: mr.source_branch,
                head_sha: mr.sha.unwrap_or_default(),
                base_branch: mr.target_branch,
            })
            .collect())
    }

    async fn bitbucket(
        &self,
        owner: &str,
        repo: &str,
        credential: Option<&str>,
    ) -> Result<Vec<PullRequest>> {
        #[derive(Deserialize)]
        struct BbBranch {
            name: String,
        }
        #[derive(Deserialize)]
        struct BbCommit {
            hash: Option<String>,
        }
        #[derive(Deserialize)]
        struct BbSource {
            branch: BbBranch,
            commit: Option<BbCommit>,
        }
        #[derive(Deserialize)]
        struct BbDestination {
            branch: BbBranch,
        }
        #[derive(Deserialize)]
        struct BbPull {
            id: u64,
            source: BbSource,
            destination: BbDestination,
        }
        #[derive(Deserialize)]
        struct BbPage {
            #[serde(default)]
            values: Vec<BbPull>,
        }

        let url = format!(
            "{}/repositories/{}/{}/pullrequests?state=OPEN",
            self.bitbucket_api, owner, repo
        );
        let mut headers = HeaderMap::new();
        if let Some(token) = credential {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        }

        let page: BbPage = self.get_json(&url, headers).await?;
        Ok(page
            .values
            .into_iter()
            .map(|p| PullRequest {
                number: p.id,
                branch: p.source.branch.name,
                head_sha: p.source.commit.and_then(|c| c.hash).unwrap_or_default(),
                base_branch: p.destination.branch.name,
            })
            .collect())
    }
}

#[async_trait]
impl PullRequestLister for ProviderClient {
    #[instrument(skip(self, credential))]
    async fn list_pull_requests(
        &self,
        repo_url: &str,
        credential: Option<&[u8]>,
    ) -> Result<Vec<PullRequest>> {
        let provider = Provider::detect(repo_url).ok_or_else(|| {
            Error::ProviderError(format!("unsupported git provider for {}", repo_url))
        })?;
        let (owner, repo) = parse_repo_url(repo_url, provider)?;

        let credential = credential
            .filter(|c| !c.is_empty())
            .map(|c| String::from_utf8_lossy(c).trim().to_string());
        let credential = credential.as_deref();

        let pulls = match provider {
            Provider::GitHub => self.github(&owner, &repo, credential).await,
            Provider::GitLab => self.gitlab(&owner, &repo, credential).await,
            Provider::Bitbucket => self.bitbucket(&owner, &repo, credential).await,
        }?;
        debug!("Found {} open pull requests for {}/{}", pulls.len(), owner, repo);
        Ok(pulls)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        Error::InvalidCredential("credential is not a valid HTTP header value".to_string())
    })?;
    header.set_sensitive(true);
    Ok(header)
}
