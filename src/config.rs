//! Controller configuration
//!
//! Process-wide configuration loaded once at startup from a mounted file and
//! shared read-only with every reconciliation and admission call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Main controller configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Authentication backend configuration
    pub auth: AuthConfig,

    /// Image pull secret injected into the managed deployments
    #[serde(default, rename = "imagePullSecret")]
    pub image_pull_secret: Option<ImagePullSecret>,

    /// Provider variant dispatched at startup
    #[serde(default)]
    pub variant: ExtensionVariant,

    /// Logical image name to image reference table
    #[serde(default = "default_images")]
    pub images: HashMap<String, ImageConfig>,

    /// Accepted for compatibility with older config files; not acted upon
    #[serde(default, rename = "healthCheckConfig", skip_serializing_if = "Option::is_none")]
    pub health_check_config: Option<serde_json::Value>,
}

/// Configuration for user authentication in the managed clusters
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Name of the provider tenant who has special privileges
    #[serde(rename = "providerTenant")]
    pub provider_tenant: String,

    #[serde(rename = "metalURL")]
    pub metal_url: String,

    #[serde(rename = "metalHMAC")]
    pub metal_hmac: String,

    #[serde(rename = "metalAuthType")]
    pub metal_auth_type: String,
}

/// Image pull secret for the resource deployments
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImagePullSecret {
    /// Base64 encoded docker config JSON content
    #[serde(rename = "encodedDockerConfigJSON")]
    pub docker_config_json: String,
}

/// Provider variant, resolved once at startup.
///
/// Dispatch between variants is always explicit; no behavior is derived from
/// runtime type inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtensionVariant {
    /// Webhook plus serving-cert volume on the kube-apiserver, nothing else
    Basic,
    /// Like Basic, with network policies around the webhook deployment
    NetworkPolicyAware,
    /// Reconciles the webhook kubeconfig artifact and the network access label
    #[default]
    KubeconfigInjecting,
}

impl ExtensionVariant {
    /// Whether the desired state includes network policies for the webhook.
    #[must_use]
    pub fn network_policies_enabled(self) -> bool {
        matches!(self, ExtensionVariant::NetworkPolicyAware)
    }

    /// Whether the mutator owns the webhook kubeconfig artifact.
    #[must_use]
    pub fn injects_kubeconfig(self) -> bool {
        matches!(self, ExtensionVariant::KubeconfigInjecting)
    }
}

/// Image configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageConfig {
    /// Image repository (e.g., "ghcr.io/fi-ts/authn-webhook")
    pub repository: String,

    /// Image tag (e.g., "latest", "v0.4.2")
    pub tag: String,
}

impl ImageConfig {
    /// Returns `true` when both repository and tag are populated with real values.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let repo = self.repository.trim();
        let tag = self.tag.trim();

        !repo.is_empty()
            && repo != "MISSING_IMAGE_CONFIG"
            && !tag.is_empty()
            && tag != "MISSING_IMAGE_CONFIG"
    }

    /// Full image reference.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Logical name of the authentication webhook image.
pub const IMAGE_AUTHN_WEBHOOK: &str = "authn-webhook";

/// Logical name of the group rolebinding controller image.
pub const IMAGE_GROUP_ROLEBINDING_CONTROLLER: &str = "group-rolebinding-controller";

fn default_images() -> HashMap<String, ImageConfig> {
    HashMap::from([
        (
            IMAGE_AUTHN_WEBHOOK.to_string(),
            ImageConfig {
                repository: "ghcr.io/fi-ts/authn-webhook".to_string(),
                tag: "v0.4.2".to_string(),
            },
        ),
        (
            IMAGE_GROUP_ROLEBINDING_CONTROLLER.to_string(),
            ImageConfig {
                repository: "ghcr.io/fi-ts/group-rolebinding-controller".to_string(),
                tag: "v0.3.4".to_string(),
            },
        ),
    ])
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            image_pull_secret: None,
            variant: ExtensionVariant::default(),
            images: default_images(),
            health_check_config: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a mounted file path
    pub fn from_mounted_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {path}: {e}")))?;

        let config: ControllerConfig = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config file {path}: {e}")))?;

        if config.health_check_config.is_some() {
            warn!("healthCheckConfig is present in the config file but not acted upon");
        }

        Ok(config)
    }

    /// Validate configuration has required fields
    pub fn validate(&self) -> Result<()> {
        if self.auth.provider_tenant.trim().is_empty() {
            return Err(Error::Config("auth.providerTenant must be set".to_string()));
        }
        if self.auth.metal_url.trim().is_empty() {
            return Err(Error::Config("auth.metalURL must be set".to_string()));
        }
        for name in [IMAGE_AUTHN_WEBHOOK, IMAGE_GROUP_ROLEBINDING_CONTROLLER] {
            if !self.images.get(name).is_some_and(ImageConfig::is_configured) {
                return Err(Error::Config(format!("images.{name} is not configured")));
            }
        }
        Ok(())
    }

    /// Resolve a logical image name to a full image reference.
    pub fn find_image(&self, logical_name: &str) -> Result<String> {
        self.images
            .get(logical_name)
            .filter(|image| image.is_configured())
            .map(ImageConfig::reference)
            .ok_or_else(|| Error::ImageResolution(logical_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config_yaml() -> &'static str {
        r"
auth:
  providerTenant: fits
  metalURL: https://api.metal.example.com
  metalHMAC: a-hmac
  metalAuthType: Metal-Admin
variant: network-policy-aware
images:
  authn-webhook:
    repository: registry.example.com/authn-webhook
    tag: v1.2.3
  group-rolebinding-controller:
    repository: registry.example.com/grc
    tag: v4.5.6
"
    }

    #[test]
    fn test_parse_config() {
        let config: ControllerConfig = serde_yaml::from_str(test_config_yaml()).unwrap();
        assert_eq!(config.auth.provider_tenant, "fits");
        assert_eq!(config.auth.metal_url, "https://api.metal.example.com");
        assert_eq!(config.variant, ExtensionVariant::NetworkPolicyAware);
        assert!(config.image_pull_secret.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_variant_defaults_to_kubeconfig_injecting() {
        let config: ControllerConfig = serde_yaml::from_str(
            r"
auth:
  providerTenant: fits
  metalURL: https://api.metal.example.com
  metalHMAC: h
  metalAuthType: t
",
        )
        .unwrap();
        assert_eq!(config.variant, ExtensionVariant::KubeconfigInjecting);
        assert!(config.variant.injects_kubeconfig());
        assert!(!config.variant.network_policies_enabled());
    }

    #[test]
    fn test_find_image() {
        let config: ControllerConfig = serde_yaml::from_str(test_config_yaml()).unwrap();
        assert_eq!(
            config.find_image(IMAGE_AUTHN_WEBHOOK).unwrap(),
            "registry.example.com/authn-webhook:v1.2.3"
        );
        assert!(matches!(
            config.find_image("unknown-image"),
            Err(Error::ImageResolution(name)) if name == "unknown-image"
        ));
    }

    #[test]
    fn test_validate_rejects_missing_tenant() {
        let config: ControllerConfig = serde_yaml::from_str(
            r"
auth:
  providerTenant: ''
  metalURL: https://api.metal.example.com
  metalHMAC: h
  metalAuthType: t
",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_image_pull_secret_roundtrip() {
        let config: ControllerConfig = serde_yaml::from_str(
            r"
auth:
  providerTenant: fits
  metalURL: https://api.metal.example.com
  metalHMAC: h
  metalAuthType: t
imagePullSecret:
  encodedDockerConfigJSON: eyJhdXRocyI6e319
",
        )
        .unwrap();
        assert_eq!(
            config.image_pull_secret.unwrap().docker_config_json,
            "eyJhdXRocyI6e319"
        );
    }
}
