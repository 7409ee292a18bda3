// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use kube::{discovery::Discovery, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const CAPI_GROUP: &str = "cluster.x-k8s.io";
const CAPI_VERSION: &str = "v1beta1";

/// Wait for the Cluster API Cluster CRD to become available.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_cluster_crd(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match check_cluster_crd_exists(client).await {
            Ok(true) => {
                info!("Cluster CRD ({}/{}) is available", CAPI_GROUP, CAPI_VERSION);
                return Ok(());
            }
            Ok(false) => {
                info!(
                    "Cluster CRD ({}/{}) not yet available, waiting {} seconds...",
                    CAPI_GROUP, CAPI_VERSION, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for Cluster CRD: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        // Exponential backoff with max cap
        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

async fn check_cluster_crd_exists(client: &Client) -> Result<bool> {
    let discovery = Discovery::new(client.clone())
        .filter(&[CAPI_GROUP])
        .run()
        .await?;

    let found = discovery
        .groups()
        .filter(|group| group.name() == CAPI_GROUP)
        .flat_map(|group| group.recommended_resources())
        .any(|(ar, _)| ar.kind == "Cluster" && ar.version == CAPI_VERSION);
    Ok(found)
}
