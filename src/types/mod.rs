// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types watched by the controllers.

pub mod app;
pub mod cluster;
pub mod conditions;
pub mod generator;

pub use app::{Cdk8sAppProxy, Cdk8sAppProxySpec, Cdk8sAppProxyStatus, GitRepositorySpec};
pub use cluster::Cluster;
pub use generator::Cdk8sAppProxyGenerator;
