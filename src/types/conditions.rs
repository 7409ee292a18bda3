// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Status conditions shared by the Cdk8sAppProxy and generator resources.

use crate::constants::severity;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// RFC3339 timestamp of the last status flip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Mark a condition true. The transition time only moves when the status flips.
pub fn mark_true(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    reason: &str,
    message: &str,
) {
    set(conditions, condition_type, "True", None, reason, message);
}

/// Mark a condition false with the given severity.
pub fn mark_false(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    reason: &str,
    severity_level: &str,
    message: &str,
) {
    set(
        conditions,
        condition_type,
        "False",
        Some(severity_level),
        reason,
        message,
    );
}

/// Convenience for failures, which are always recorded with Error severity.
pub fn mark_failed(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    reason: &str,
    message: &str,
) {
    mark_false(conditions, condition_type, reason, severity::ERROR, message);
}

pub fn find<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}

pub fn is_true(conditions: &[Condition], condition_type: &str) -> bool {
    find(conditions, condition_type).is_some_and(Condition::is_true)
}

fn set(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    severity_level: Option<&str>,
    reason: &str,
    message: &str,
) {
    let now = chrono::Utc::now().to_rfc3339();
    match conditions.iter_mut().find(|c| c.condition_type == condition_type) {
        Some(existing) => {
            if existing.status != status {
                existing.last_transition_time = Some(now);
            }
            existing.status = status.to_string();
            existing.severity = severity_level.map(str::to_string);
            existing.reason = Some(reason.to_string());
            existing.message = Some(message.to_string());
        }
        None => conditions.push(Condition {
            condition_type: condition_type.to_string(),
            status: status.to_string(),
            severity: severity_level.map(str::to_string),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            last_transition_time: Some(now),
        }),
    }
}
