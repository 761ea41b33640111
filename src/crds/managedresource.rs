//! `ManagedResource` custom resource: a named, versioned bundle of serialized
//! objects applied and torn down as one unit by the resource-manager.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the secret carrying the serialized objects
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct SecretRef {
    pub name: String,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "resources.gardener.cloud",
    version = "v1alpha1",
    kind = "ManagedResource",
    namespaced
)]
pub struct ManagedResourceSpec {
    /// Resource class the responsible resource-manager watches; control-plane
    /// scoped bundles carry "seed", workload scoped bundles none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Secrets whose data keys hold the serialized objects
    #[serde(default, rename = "secretRefs")]
    pub secret_refs: Vec<SecretRef>,

    /// Labels injected into every bundled object
    #[serde(
        default,
        rename = "injectLabels",
        skip_serializing_if = "Option::is_none"
    )]
    pub inject_labels: Option<BTreeMap<String, String>>,

    /// Keep the bundled objects when the managed resource is deleted
    #[serde(default, rename = "keepObjects", skip_serializing_if = "Option::is_none")]
    pub keep_objects: Option<bool>,

    /// Overwrite labels and annotations of existing objects on apply
    #[serde(
        default,
        rename = "forceOverwriteLabels",
        skip_serializing_if = "Option::is_none"
    )]
    pub force_overwrite_labels: Option<bool>,

    #[serde(
        default,
        rename = "forceOverwriteAnnotations",
        skip_serializing_if = "Option::is_none"
    )]
    pub force_overwrite_annotations: Option<bool>,
}
