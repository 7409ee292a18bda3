// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cdk8s_addon_provider::config::Config;
use cdk8s_addon_provider::kubernetes::wait_for_cluster_crd;
use cdk8s_addon_provider::reconcilers::{AppReconciler, GeneratorReconciler};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting cdk8s addon provider");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: scratch_root={}, cdk8s={}, git={}",
        config.scratch_root.display(),
        config.cdk8s_bin,
        config.git_bin
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    if config.wait_for_crd {
        info!("Waiting for Cluster API Cluster CRD to become available...");
        wait_for_cluster_crd(&client).await?;
    }

    let app_reconciler = AppReconciler::new(client.clone(), &config);
    let generator_reconciler = GeneratorReconciler::new(client, &config)?;

    info!("Starting reconcilers...");
    tokio::try_join!(app_reconciler.run(), generator_reconciler.run())?;

    // both controllers stop only on shutdown signals
    warn!("All reconcilers stopped");
    Ok(())
}
