// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers for Cdk8sAppProxy and Cdk8sAppProxyGenerator.

pub mod app;
pub mod backoff;
pub mod generator;
pub mod pipeline;

pub use app::AppReconciler;
pub use generator::GeneratorReconciler;
pub use pipeline::{Outcome, Pipeline};
