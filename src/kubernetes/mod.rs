// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, client creation, selectors and secrets.

pub mod client;
pub mod crd;
pub mod retry;
pub mod secrets;
pub mod selector;

pub use client::create_cluster_client;
pub use crd::wait_for_cluster_crd;
pub use retry::retry_on_conflict;
pub use secrets::fetch_credential;
