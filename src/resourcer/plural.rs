// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kind to REST resource name mapping

use std::collections::BTreeMap;

/// English pluralization heuristic for kinds: lowercase, then `s` takes `es`,
/// a trailing `y` becomes `ies`, anything else takes `s`.
pub fn pluralize(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') {
        format!("{}es", lower)
    } else if let Some(stem) = lower.strip_suffix('y') {
        format!("{}ies", stem)
    } else {
        format!("{}s", lower)
    }
}

/// Explicit plurals consulted before [`pluralize`].
#[derive(Clone, Debug)]
pub struct KindPlurals {
    overrides: BTreeMap<String, String>,
}

impl KindPlurals {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        let mut plurals = Self::default();
        plurals.overrides.extend(overrides);
        plurals
    }

    pub fn plural(&self, kind: &str) -> String {
        self.overrides
            .get(kind)
            .cloned()
            .unwrap_or_else(|| pluralize(kind))
    }
}

impl Default for KindPlurals {
    fn default() -> Self {
        // the one core kind the heuristic gets wrong
        Self {
            overrides: BTreeMap::from([("Endpoints".to_string(), "endpoints".to_string())]),
        }
    }
}
