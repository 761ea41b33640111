//! `Cluster` custom resource exposing managed-cluster metadata to extensions.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cluster-scoped mirror of one managed cluster; its name equals the
/// control-plane namespace the cluster's pods run in.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(group = "extensions.gardener.cloud", version = "v1alpha1", kind = "Cluster")]
pub struct ClusterSpec {
    /// Metadata of the managed (shoot) cluster
    pub shoot: ShootInfo,
}

/// Managed cluster metadata relevant to extension reconciliation
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ShootInfo {
    /// Name of the managed cluster
    pub name: String,

    /// Cluster annotations, including the tenant marker
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Whether the cluster is hibernated (workloads scaled to zero)
    #[serde(default)]
    pub hibernated: bool,
}
