// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Label selector evaluation and conversion to list query strings

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;

/// Render a selector as a `labelSelector` query string. An empty selector yields "".
pub fn to_query(selector: &LabelSelector) -> Result<String> {
    let mut parts = Vec::new();

    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            validate_key(key)?;
            parts.push(format!("{}={}", key, value));
        }
    }

    for req in selector.match_expressions.iter().flatten() {
        validate_requirement(req)?;
        let values = req.values.as_deref().unwrap_or_default().join(",");
        let part = match req.operator.as_str() {
            "In" => format!("{} in ({})", req.key, values),
            "NotIn" => format!("{} notin ({})", req.key, values),
            "Exists" => req.key.clone(),
            _ => format!("!{}", req.key),
        };
        parts.push(part);
    }

    Ok(parts.join(","))
}

/// Check whether labels satisfy a selector. All terms must match.
pub fn matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> Result<bool> {
    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            validate_key(key)?;
            if labels.get(key) != Some(value) {
                return Ok(false);
            }
        }
    }

    for req in selector.match_expressions.iter().flatten() {
        validate_requirement(req)?;
        let values = req.values.as_deref().unwrap_or_default();
        let current = labels.get(&req.key);
        let ok = match req.operator.as_str() {
            "In" => current.is_some_and(|v| values.contains(v)),
            "NotIn" => current.is_none_or(|v| !values.contains(v)),
            "Exists" => current.is_some(),
            _ => current.is_none(),
        };
        if !ok {
            return Ok(false);
        }
    }

    Ok(true)
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::InvalidSelector("label key must not be empty".to_string()));
    }
    Ok(())
}

fn validate_requirement(req: &LabelSelectorRequirement) -> Result<()> {
    validate_key(&req.key)?;
    let has_values = req.values.as_ref().is_some_and(|v| !v.is_empty());
    match req.operator.as_str() {
        "In" | "NotIn" if !has_values => Err(Error::InvalidSelector(format!(
            "operator {} on '{}' requires values",
            req.operator, req.key
        ))),
        "Exists" | "DoesNotExist" if has_values => Err(Error::InvalidSelector(format!(
            "operator {} on '{}' does not take values",
            req.operator, req.key
        ))),
        "In" | "NotIn" | "Exists" | "DoesNotExist" => Ok(()),
        other => Err(Error::InvalidSelector(format!(
            "unknown operator '{}' on '{}'",
            other, req.key
        ))),
    }
}
