// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Parsing of Go style duration strings ("5m", "1h30m", "90s", "5m0s").

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

fn component_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?P<number>\d+(?:\.\d+)?)(?P<unit>ns|us|µs|ms|s|m|h)").ok())
        .as_ref()
}

/// Parse a duration. Components must cover the whole string.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidDuration(raw.to_string()));
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let Some(re) = component_regex() else {
        return Err(Error::InvalidDuration(raw.to_string()));
    };
    let mut covered = 0;
    let mut nanos = 0f64;
    for captures in re.captures_iter(trimmed) {
        let (Some(whole), Some(number), Some(unit)) =
            (captures.get(0), captures.name("number"), captures.name("unit"))
        else {
            return Err(Error::InvalidDuration(raw.to_string()));
        };
        if whole.start() != covered {
            return Err(Error::InvalidDuration(raw.to_string()));
        }
        covered = whole.end();

        let value: f64 = number
            .as_str()
            .parse()
            .map_err(|_| Error::InvalidDuration(raw.to_string()))?;
        let scale = match unit.as_str() {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 6e10,
            "h" => 3.6e12,
            _ => return Err(Error::InvalidDuration(raw.to_string())),
        };
        nanos += value * scale;
    }

    if covered != trimmed.len() {
        return Err(Error::InvalidDuration(raw.to_string()));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

/// Parse a poll interval. Zero would requeue without delay, so it is rejected.
pub fn parse_interval(raw: &str) -> Result<Duration> {
    let interval = parse_duration(raw)?;
    if interval.is_zero() {
        return Err(Error::ZeroInterval(raw.to_string()));
    }
    Ok(interval)
}
