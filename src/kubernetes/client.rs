// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Workload cluster client creation from Cluster API kubeconfig secrets

use crate::constants::KUBECONFIG_SECRET_KEY;
use crate::error::{Error, Result};
use crate::types::cluster::Cluster;
use k8s_openapi::api::core::v1::Secret;
use kube::{config::KubeConfigOptions, Api, Client, ResourceExt};
use tracing::{info, instrument};

/// Create a Kubernetes client for a workload cluster
#[instrument(skip(manager_client, cluster), fields(cluster = %cluster.name_any()))]
pub async fn create_cluster_client(manager_client: &Client, cluster: &Cluster) -> Result<Client> {
    let kubeconfig = get_cluster_kubeconfig(manager_client, cluster).await?;
    create_client_from_kubeconfig(&kubeconfig).await
}

/// Get the kubeconfig Cluster API stores for a workload cluster
#[instrument(skip(client, cluster), fields(cluster = %cluster.name_any()))]
async fn get_cluster_kubeconfig(client: &Client, cluster: &Cluster) -> Result<String> {
    let cluster_name = cluster.name_any();
    let secret_name = cluster.kubeconfig_secret_name();
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &namespace);

    info!(
        "Getting kubeconfig secret '{}/{}' for cluster '{}'...",
        namespace, secret_name, cluster_name
    );

    let secret = secrets.get(&secret_name).await.map_err(|e| {
        Error::KubeconfigError(format!(
            "Failed to get kubeconfig secret for cluster {}: {}",
            cluster_name, e
        ))
    })?;

    let Some(data) = secret.data.as_ref() else {
        return Err(Error::KubeconfigError(format!(
            "Kubeconfig secret for cluster {} has no data",
            cluster_name
        )));
    };

    let Some(kubeconfig_data) = data.get(KUBECONFIG_SECRET_KEY) else {
        return Err(Error::KubeconfigError(format!(
            "Kubeconfig secret for cluster {} does not contain '{}' key",
            cluster_name, KUBECONFIG_SECRET_KEY
        )));
    };

    String::from_utf8(kubeconfig_data.0.clone()).map_err(|e| {
        Error::KubeconfigError(format!(
            "Failed to decode kubeconfig for cluster {}: {}",
            cluster_name, e
        ))
    })
}

/// Create a Kubernetes client from a kubeconfig string
async fn create_client_from_kubeconfig(kubeconfig: &str) -> Result<Client> {
    use kube::config::Kubeconfig;

    let kubeconfig_parsed: Kubeconfig = serde_yaml::from_str(kubeconfig)
        .map_err(|e| Error::KubeconfigError(format!("Failed to parse kubeconfig: {}", e)))?;

    let client_config =
        kube::Config::from_custom_kubeconfig(kubeconfig_parsed, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::KubeconfigError(format!("Failed to create config: {}", e)))?;

    Client::try_from(client_config)
        .map_err(|e| Error::KubeconfigError(format!("Failed to create client: {}", e)))
}
