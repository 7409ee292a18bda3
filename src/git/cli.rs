// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Git backend driving the `git` command line client

use crate::error::{Error, Result};
use crate::git::{GitAuth, GitBackend, RemoteRef};
use async_trait::async_trait;
use base64::Engine;
use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, instrument};

#[derive(Clone, Debug)]
pub struct GitCli {
    bin: String,
}

impl GitCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run git and return stdout. The child is killed if the future is dropped.
    async fn run(
        &self,
        command: &str,
        args: Vec<OsString>,
        auth: Option<&GitAuth>,
    ) -> Result<String> {
        let env = AuthEnv::build(auth)?;

        let mut cmd = Command::new(&self.bin);
        cmd.args(&args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &env.vars {
            cmd.env(key, value);
        }

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ToolchainMissing(self.bin.clone())
            } else {
                Error::GitCommand {
                    command: command.to_string(),
                    stderr: e.to_string(),
                }
            }
        })?;

        if !output.status.success() {
            return Err(Error::GitCommand {
                command: command.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl GitBackend for GitCli {
    #[instrument(skip(self, auth))]
    async fn ls_remote(&self, url: &str, auth: Option<&GitAuth>) -> Result<Vec<RemoteRef>> {
        let stdout = self
            .run("ls-remote", vec!["ls-remote".into(), url.into()], auth)
            .await?;
        let refs = parse_ls_remote(&stdout);
        debug!("Remote {} advertises {} refs", url, refs.len());
        Ok(refs)
    }

    #[instrument(skip(self, auth))]
    async fn clone_shallow(
        &self,
        url: &str,
        auth: Option<&GitAuth>,
        reference: &str,
        dest: &Path,
    ) -> Result<()> {
        let args = vec![
            "clone".into(),
            "--depth".into(),
            "1".into(),
            "--single-branch".into(),
            "--branch".into(),
            reference.into(),
            url.into(),
            dest.as_os_str().to_owned(),
        ];
        self.run("clone", args, auth).await?;
        Ok(())
    }

    async fn head(&self, dir: &Path) -> Result<String> {
        let args = vec![
            "-C".into(),
            dir.as_os_str().to_owned(),
            "rev-parse".into(),
            "HEAD".into(),
        ];
        let stdout = self.run("rev-parse", args, None).await?;
        Ok(stdout.trim().to_string())
    }
}

/// Parse `<hash>\t<ref>` lines.
pub(crate) fn parse_ls_remote(stdout: &str) -> Vec<RemoteRef> {
    stdout
        .lines()
        .filter_map(|line| {
            let (hash, name) = line.split_once('\t')?;
            Some(RemoteRef {
                name: name.trim().to_string(),
                hash: hash.trim().to_string(),
            })
        })
        .collect()
}

/// Environment carrying credentials to git. Holds the key file for the
/// lifetime of the command.
struct AuthEnv {
    vars: Vec<(String, String)>,
    _key_file: Option<NamedTempFile>,
}

impl AuthEnv {
    fn build(auth: Option<&GitAuth>) -> Result<Self> {
        match auth {
            None => Ok(AuthEnv {
                vars: Vec::new(),
                _key_file: None,
            }),
            Some(GitAuth::Basic { username, password }) => {
                let token = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                Ok(AuthEnv {
                    vars: vec![
                        ("GIT_CONFIG_COUNT".to_string(), "1".to_string()),
                        ("GIT_CONFIG_KEY_0".to_string(), "http.extraHeader".to_string()),
                        (
                            "GIT_CONFIG_VALUE_0".to_string(),
                            format!("Authorization: Basic {}", token),
                        ),
                    ],
                    _key_file: None,
                })
            }
            Some(GitAuth::SshKey { user, key }) => {
                // NamedTempFile is created with mode 0600
                let mut file = NamedTempFile::new()?;
                file.write_all(key)?;
                if !key.ends_with(b"\n") {
                    file.write_all(b"\n")?;
                }
                file.flush()?;

                let ssh_command = format!(
                    "ssh -i '{}' -l {} -o IdentitiesOnly=yes -o BatchMode=yes \
                     -o StrictHostKeyChecking=accept-new -o UserKnownHostsFile=/dev/null",
                    file.path().display(),
                    user
                );
                Ok(AuthEnv {
                    vars: vec![("GIT_SSH_COMMAND".to_string(), ssh_command)],
                    _key_file: Some(file),
                })
            }
        }
    }
}
