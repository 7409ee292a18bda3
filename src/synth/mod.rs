// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Running `cdk8s synth` and turning its output into Kubernetes objects.

pub mod manifests;

use crate::error::{Error, Result};
use async_trait::async_trait;
use kube::api::DynamicObject;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, instrument, warn};

/// Language of a cdk8s application, detected from its source files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppKind {
    Go,
    TypeScript,
    Python,
}

impl AppKind {
    /// First top-level file (by name) with a known extension decides.
    pub fn detect(app_dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(app_dir)
            .map_err(|_| Error::UnknownAppKind(app_dir.to_path_buf()))?;
        let mut files: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        files.sort();

        files
            .iter()
            .find_map(|name| {
                if name.ends_with(".go") {
                    Some(AppKind::Go)
                } else if name.ends_with(".ts") {
                    Some(AppKind::TypeScript)
                } else if name.ends_with(".py") {
                    Some(AppKind::Python)
                } else {
                    None
                }
            })
            .ok_or_else(|| Error::UnknownAppKind(app_dir.to_path_buf()))
    }
}

/// External tools needed to synthesize an application.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Install dependencies of a TypeScript app.
    async fn install_packages(&self, app_dir: &Path) -> Result<()>;
    /// Run `cdk8s synth`, which writes to `app_dir/dist`.
    async fn synth(&self, app_dir: &Path) -> Result<()>;
}

/// Toolchain using binaries found on the host's PATH.
#[derive(Clone, Debug)]
pub struct HostToolchain {
    cdk8s_bin: String,
    npm_bin: String,
}

impl HostToolchain {
    pub fn new(cdk8s_bin: impl Into<String>, npm_bin: impl Into<String>) -> Self {
        Self {
            cdk8s_bin: cdk8s_bin.into(),
            npm_bin: npm_bin.into(),
        }
    }

    fn locate(bin: &str) -> Result<PathBuf> {
        which::which(bin).map_err(|_| Error::ToolchainMissing(bin.to_string()))
    }

    async fn run(&self, bin: &str, args: &[&str], dir: &Path) -> Result<()> {
        let program = Self::locate(bin)?;
        let output = Command::new(program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(Error::ToolFailed {
                tool: format!("{} {}", bin, args.join(" ")),
                output: combined.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Toolchain for HostToolchain {
    async fn install_packages(&self, app_dir: &Path) -> Result<()> {
        self.run(&self.npm_bin, &["install"], app_dir).await
    }

    async fn synth(&self, app_dir: &Path) -> Result<()> {
        self.run(&self.cdk8s_bin, &["synth"], app_dir).await
    }
}

#[derive(Clone)]
pub struct Synthesizer {
    toolchain: Arc<dyn Toolchain>,
}

impl Synthesizer {
    pub fn new(toolchain: Arc<dyn Toolchain>) -> Self {
        Self { toolchain }
    }

    /// Synthesize the app at `source_dir/app_path` and decode its manifests.
    #[instrument(skip(self, source_dir), fields(source = %source_dir.display()))]
    pub async fn synthesize(
        &self,
        source_dir: &Path,
        app_path: &str,
    ) -> Result<Vec<DynamicObject>> {
        let app_dir = resolve_app_dir(source_dir, app_path)?;
        let kind = AppKind::detect(&app_dir)?;
        info!("Synthesizing {:?} cdk8s app in {}", kind, app_dir.display());

        if kind == AppKind::TypeScript {
            // a failed install surfaces as a synth failure if it matters
            if let Err(e) = self.toolchain.install_packages(&app_dir).await {
                warn!("Package install failed in {}, continuing: {}", app_dir.display(), e);
            }
        }

        self.toolchain.synth(&app_dir).await?;

        let files = manifests::find_manifests(&app_dir.join("dist"))?;
        let objects = manifests::parse_manifests(&files)?;
        if objects.is_empty() {
            warn!("cdk8s synth in {} produced no resources", app_dir.display());
        } else {
            info!("Synthesized {} resources from {} files", objects.len(), files.len());
        }
        Ok(objects)
    }
}

/// Join an app path onto the checkout, refusing to escape it.
fn resolve_app_dir(source_dir: &Path, app_path: &str) -> Result<PathBuf> {
    let relative = Path::new(app_path);
    let escapes = relative
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(Error::InvalidPath(format!(
            "'{}' must be relative to the repository root",
            app_path
        )));
    }
    Ok(source_dir.join(relative))
}
