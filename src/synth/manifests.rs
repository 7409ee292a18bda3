// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Discovering and decoding synthesized manifests

use crate::error::{Error, Result};
use kube::api::DynamicObject;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const KUSTOMIZATION_NAMES: &[&str] = &[
    "kustomization.yaml",
    "kustomization.yml",
    "kustomization.k8s.yaml",
    "Kustomization",
];

pub fn is_kustomization(file_name: &str) -> bool {
    KUSTOMIZATION_NAMES.contains(&file_name)
}

#[derive(Deserialize, Default)]
struct Kustomization {
    #[serde(default)]
    resources: Vec<String>,
}

/// Walk `dist` in lexicographic order and return the manifest files to load.
/// Kustomization files, when present, replace the plain manifest list.
pub fn find_manifests(dist: &Path) -> Result<Vec<PathBuf>> {
    let mut kustomizations = Vec::new();
    let mut manifests = Vec::new();

    for entry in WalkDir::new(dist).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::WalkDist {
            path: dist.to_path_buf(),
            cause: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if is_kustomization(&name) {
            kustomizations.push(entry.into_path());
        } else if name.ends_with(".yaml") || name.ends_with(".yml") {
            manifests.push(entry.into_path());
        }
    }

    if kustomizations.is_empty() {
        return Ok(manifests);
    }

    let mut resolved = Vec::new();
    for kustomization in &kustomizations {
        resolved.extend(kustomization_resources(kustomization)?);
    }
    Ok(resolved)
}

/// Resources listed by a kustomization file, relative to its directory.
pub fn kustomization_resources(path: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read(path).map_err(|e| Error::ReadManifest {
        path: path.to_path_buf(),
        cause: e.to_string(),
    })?;
    let kustomization: Option<Kustomization> =
        serde_yaml::from_slice(&content).map_err(|e| Error::DecodeManifest {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(kustomization
        .unwrap_or_default()
        .resources
        .iter()
        .map(|resource| dir.join(resource))
        .collect())
}

/// Decode every document of every file, preserving order.
pub fn parse_manifests(paths: &[PathBuf]) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for path in paths {
        let content = std::fs::read(path).map_err(|e| Error::ReadManifest {
            path: path.clone(),
            cause: e.to_string(),
        })?;
        let before = objects.len();
        objects.extend(decode_documents(path, &content)?);
        debug!(path = %path.display(), count = objects.len() - before, "Decoded manifest");
    }
    Ok(objects)
}

/// Split a multi-document YAML (or JSON) file into objects. Empty documents are skipped.
pub fn decode_documents(path: &Path, content: &[u8]) -> Result<Vec<DynamicObject>> {
    let decode_err = |e: String| Error::DecodeManifest {
        path: path.to_path_buf(),
        cause: e,
    };

    let mut objects = Vec::new();
    for doc in serde_yaml::Deserializer::from_slice(content) {
        let value = serde_json::Value::deserialize(doc).map_err(|e| decode_err(e.to_string()))?;
        if value.is_null() {
            continue;
        }

        let has_type = |field: &str| {
            value
                .get(field)
                .and_then(|v| v.as_str())
                .is_some_and(|s| !s.is_empty())
        };
        if !has_type("apiVersion") || !has_type("kind") {
            return Err(Error::InvalidManifest {
                path: path.to_path_buf(),
            });
        }

        let object: DynamicObject =
            serde_json::from_value(value).map_err(|e| decode_err(e.to_string()))?;
        objects.push(object);
    }
    Ok(objects)
}
