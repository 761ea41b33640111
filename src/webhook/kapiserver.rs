//! Mutation of the managed cluster's kube-apiserver deployment.
//!
//! The mutation is a fixed point: re-running it against an already-mutated
//! deployment leaves the object unchanged. Deployments without the target
//! container pass through untouched.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, PodSpec, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::info;

use crate::config::ExtensionVariant;
use crate::error::{Error, Result};
use crate::merge::{
    ensure_string_with_prefix, ensure_volume_mount_with_name, ensure_volume_with_name,
};
use crate::resources::WEBHOOK_NAME;

/// Container the mutator looks for; anything else is not ours.
pub const KUBE_APISERVER_CONTAINER_NAME: &str = "kube-apiserver";

/// ConfigMap holding the webhook kubeconfig consumed by the kube-apiserver.
pub const WEBHOOK_CONFIG_CONFIGMAP_NAME: &str = "authn-webhook-config";

/// Data key of the kubeconfig document inside the ConfigMap.
pub const WEBHOOK_CONFIG_DATA_KEY: &str = "authn-webhook-config.json";

const WEBHOOK_CONFIG_MOUNT_PATH: &str = "/etc/webhook/config";
const WEBHOOK_CERT_MOUNT_PATH: &str = "/etc/webhook/certs";
const WEBHOOK_CERT_SECRET_NAME: &str = "kube-jwt-authn-webhook-server";

const ARG_WEBHOOK_CONFIG_FILE: &str = "--authentication-token-webhook-config-file=";
const ARG_WEBHOOK_VERSION: &str = "--authentication-token-webhook-version=";

const NETWORK_ACCESS_LABEL: &str =
    "networking.resources.gardener.cloud/to-kube-jwt-authn-webhook-tcp-443";

/// Whether the deployment carries the container this mutator cares about.
#[must_use]
pub fn has_kube_apiserver_container(deployment: &Deployment) -> bool {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .is_some_and(|ps| {
            ps.containers
                .iter()
                .any(|c| c.name == KUBE_APISERVER_CONTAINER_NAME)
        })
}

/// Rewrite the deployment in place so the kube-apiserver calls the webhook.
///
/// Returns `false` without touching anything when the target container is
/// absent.
pub fn ensure_kube_apiserver_deployment(
    deployment: &mut Deployment,
    variant: ExtensionVariant,
) -> bool {
    let Some(spec) = deployment.spec.as_mut() else {
        return false;
    };
    let template = &mut spec.template;
    let Some(pod_spec) = template.spec.as_mut() else {
        return false;
    };
    let Some(idx) = pod_spec
        .containers
        .iter()
        .position(|c| c.name == KUBE_APISERVER_CONTAINER_NAME)
    else {
        return false;
    };

    {
        let container = &mut pod_spec.containers[idx];
        ensure_command_line_args(container, variant);
        ensure_volume_mounts(container, variant);
    }
    ensure_volumes(pod_spec, variant);

    if variant.injects_kubeconfig() {
        template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(NETWORK_ACCESS_LABEL.to_string(), "allowed".to_string());
    }

    true
}

fn ensure_command_line_args(container: &mut Container, variant: ExtensionVariant) {
    let mut command = container.command.take().unwrap_or_default();
    command = ensure_string_with_prefix(
        command,
        ARG_WEBHOOK_CONFIG_FILE,
        "/etc/webhook/config/authn-webhook-config.json",
    );
    if variant.injects_kubeconfig() {
        command = ensure_string_with_prefix(command, ARG_WEBHOOK_VERSION, "v1");
    }
    container.command = Some(command);
}

fn config_volume_mount() -> VolumeMount {
    VolumeMount {
        name: WEBHOOK_CONFIG_CONFIGMAP_NAME.to_string(),
        mount_path: WEBHOOK_CONFIG_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn config_volume() -> Volume {
    Volume {
        name: WEBHOOK_CONFIG_CONFIGMAP_NAME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: WEBHOOK_CONFIG_CONFIGMAP_NAME.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// cert volume referenced from the webhook kubeconfig in the basic variants
fn cert_volume_mount() -> VolumeMount {
    VolumeMount {
        name: "authn-webhook-cert".to_string(),
        mount_path: WEBHOOK_CERT_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn cert_volume() -> Volume {
    Volume {
        name: "authn-webhook-cert".to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(WEBHOOK_CERT_SECRET_NAME.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn ensure_volume_mounts(container: &mut Container, variant: ExtensionVariant) {
    let mut mounts = container.volume_mounts.take().unwrap_or_default();
    mounts = ensure_volume_mount_with_name(mounts, config_volume_mount());
    if !variant.injects_kubeconfig() {
        mounts = ensure_volume_mount_with_name(mounts, cert_volume_mount());
    }
    container.volume_mounts = Some(mounts);
}

fn ensure_volumes(pod_spec: &mut PodSpec, variant: ExtensionVariant) {
    let mut volumes = pod_spec.volumes.take().unwrap_or_default();
    volumes = ensure_volume_with_name(volumes, config_volume());
    if !variant.injects_kubeconfig() {
        volumes = ensure_volume_with_name(volumes, cert_volume());
    }
    pod_spec.volumes = Some(volumes);
}

/// The kubeconfig-shaped document pointing the kube-apiserver at the
/// webhook's in-cluster service address.
pub fn webhook_kubeconfig(namespace: &str) -> Result<String> {
    let server =
        format!("http://{WEBHOOK_NAME}.{namespace}.svc.cluster.local:443/authenticate");

    let config = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Config",
        "current-context": WEBHOOK_NAME,
        "preferences": {},
        "clusters": [{
            "name": WEBHOOK_NAME,
            "cluster": { "server": server },
        }],
        "contexts": [{
            "name": WEBHOOK_NAME,
            "context": { "cluster": WEBHOOK_NAME, "user": WEBHOOK_NAME },
        }],
        "users": [{
            "name": WEBHOOK_NAME,
            "user": {},
        }],
    });

    Ok(serde_json::to_string(&config)?)
}

/// Upsert the webhook kubeconfig ConfigMap for the given control-plane
/// namespace. The document is wholly owned by this mutator, so an existing
/// ConfigMap is overwritten, never merged.
pub async fn reconcile_webhook_configmap(client: &Client, namespace: &str) -> Result<()> {
    let kubeconfig = webhook_kubeconfig(namespace)?;

    let desired = ConfigMap {
        metadata: ObjectMeta {
            name: Some(WEBHOOK_CONFIG_CONFIGMAP_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            WEBHOOK_CONFIG_DATA_KEY.to_string(),
            kubeconfig,
        )])),
        ..Default::default()
    };

    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let failed = |action: &str, e: kube::Error| {
        Error::AdmissionMutation(format!(
            "failed to {action} ConfigMap {namespace}/{WEBHOOK_CONFIG_CONFIGMAP_NAME}: {e}"
        ))
    };

    match api.get(WEBHOOK_CONFIG_CONFIGMAP_NAME).await {
        Ok(existing) => {
            let mut updated = desired;
            updated.metadata.resource_version = existing.metadata.resource_version;
            api.replace(
                WEBHOOK_CONFIG_CONFIGMAP_NAME,
                &PostParams::default(),
                &updated,
            )
            .await
            .map_err(|e| failed("update", e))?;
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            api.create(&PostParams::default(), &desired)
                .await
                .map_err(|e| failed("create", e))?;
            info!("created webhook ConfigMap in {}", namespace);
        }
        Err(e) => return Err(failed("get", e)),
    }

    Ok(())
}
