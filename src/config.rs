// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding per-application scratch clones
    pub scratch_root: PathBuf,
    pub git_bin: String,
    pub cdk8s_bin: String,
    pub npm_bin: String,
    /// Kind to REST plural overrides, consulted before the pluralization heuristic
    pub plural_overrides: BTreeMap<String, String>,
    /// Wait for the Cluster API Cluster CRD before starting controllers
    pub wait_for_crd: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scratch_root: env::temp_dir(),
            git_bin: "git".to_string(),
            cdk8s_bin: "cdk8s".to_string(),
            npm_bin: "npm".to_string(),
            plural_overrides: BTreeMap::new(),
            wait_for_crd: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let scratch_root = env::var("SCRATCH_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.scratch_root);
        let plural_overrides = match env::var("PLURAL_OVERRIDES") {
            Ok(raw) => parse_plural_overrides(&raw).context("PLURAL_OVERRIDES is malformed")?,
            Err(_) => BTreeMap::new(),
        };
        let wait_for_crd: bool = env::var("CRD_WAIT")
            .unwrap_or("true".to_string())
            .parse()
            .unwrap_or(true);

        Ok(Config {
            scratch_root,
            git_bin: env::var("GIT_BIN").unwrap_or(defaults.git_bin),
            cdk8s_bin: env::var("CDK8S_BIN").unwrap_or(defaults.cdk8s_bin),
            npm_bin: env::var("NPM_BIN").unwrap_or(defaults.npm_bin),
            plural_overrides,
            wait_for_crd,
        })
    }
}

/// Parse `Kind=plural,Kind2=plural2`.
pub fn parse_plural_overrides(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut overrides = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((kind, plural)) = entry.split_once('=') else {
            bail!("expected Kind=plural, got '{}'", entry);
        };
        let (kind, plural) = (kind.trim(), plural.trim());
        if kind.is_empty() || plural.is_empty() {
            bail!("empty kind or plural in '{}'", entry);
        }
        overrides.insert(kind.to_string(), plural.to_string());
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plural_overrides() {
        let overrides =
            parse_plural_overrides("Endpoints=endpoints, NetworkPolicy=networkpolicies").unwrap();
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides.get("Endpoints").unwrap(), "endpoints");
        assert_eq!(overrides.get("NetworkPolicy").unwrap(), "networkpolicies");
    }

    #[test]
    fn test_parse_plural_overrides_empty() {
        assert!(parse_plural_overrides("").unwrap().is_empty());
        assert!(parse_plural_overrides(" , ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_plural_overrides_rejects_garbage() {
        assert!(parse_plural_overrides("Endpoints").is_err());
        assert!(parse_plural_overrides("=foo").is_err());
    }
}
