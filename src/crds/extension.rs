//! `Extension` custom resource and its provider config payload.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Extension type handled by this operator.
pub const EXTENSION_TYPE: &str = "fits-auth";

/// `Extension` resource requesting a provider extension for one managed
/// cluster; one lives in each cluster's control-plane namespace.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "extensions.gardener.cloud",
    version = "v1alpha1",
    kind = "Extension",
    namespaced
)]
#[kube(status = "ExtensionStatus")]
#[kube(printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
pub struct ExtensionSpec {
    /// Extension type discriminator; this operator only acts on "fits-auth"
    #[serde(rename = "type")]
    pub extension_type: String,

    /// Raw provider-specific configuration, decoded into [`AuthnConfig`]
    #[serde(
        default,
        rename = "providerConfig",
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_config: Option<serde_json::Value>,
}

/// Status reported back on the `Extension` resource
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ExtensionStatus {
    /// Human-readable description of the last reconciliation error, if any
    #[serde(default, rename = "lastError", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Generation observed by the last successful reconciliation
    #[serde(
        default,
        rename = "observedGeneration",
        skip_serializing_if = "Option::is_none"
    )]
    pub observed_generation: Option<i64>,
}

/// Provider config carried in `Extension.spec.providerConfig`.
///
/// Opaque to the actuator beyond pass-through as environment values for the
/// webhook deployment.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthnConfig {
    #[serde(default, rename = "apiVersion", skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// OIDC issuer the webhook validates tokens against
    #[serde(default)]
    pub issuer: String,

    /// OIDC client id
    #[serde(default, rename = "clientID")]
    pub client_id: String,
}
