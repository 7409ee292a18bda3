// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Optimistic concurrency retry for read-modify-write updates

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Run `op` until it succeeds, fails with something other than a 409 conflict,
/// or `attempts` is exhausted. `op` must re-read the object on every call.
pub async fn retry_on_conflict<T, F, Fut>(attempts: usize, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt < attempts => {
                debug!("Conflict on attempt {}/{}, retrying: {}", attempt, attempts, e);
                sleep(Duration::from_millis(50 * attempt as u64)).await;
                attempt += 1;
            }
            res => return res,
        }
    }
}
