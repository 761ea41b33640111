//! Desired-state builder: the full object set installed for one managed
//! cluster, split into a control-plane (seed) scoped set and a workload
//! (shoot) scoped set.
//!
//! Construction is pure apart from image lookups; identical inputs produce
//! byte-identical serialized objects so bundle diffing stays quiet.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, KeyToPath, LocalObjectReference, PodSpec,
    PodTemplateSpec, ProjectedVolumeSource, Secret, SecretKeySelector, SecretProjection, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount, VolumeProjection,
};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use serde_json::Value;

use crate::config::{
    ControllerConfig, IMAGE_AUTHN_WEBHOOK, IMAGE_GROUP_ROLEBINDING_CONTROLLER,
};
use crate::crds::{AuthnConfig, Cluster};
use crate::error::{Error, Result};
use crate::merge::{ensure_volume_mount_with_name, ensure_volume_with_name};
use crate::registry::tagged;

/// Name of the webhook deployment, service and related secrets.
pub const WEBHOOK_NAME: &str = "kube-jwt-authn-webhook";

/// Secret carrying the upstream API URL/HMAC/auth-type triple.
pub const WEBHOOK_METALAPI_SECRET_NAME: &str = "kube-jwt-authn-webhook-metalapi-secret";

/// Name of the group rolebinding controller deployment.
pub const GRC_NAME: &str = "group-rolebinding-controller";

const WEBHOOK_REGISTRY_SECRET_NAME: &str = "kube-jwt-authn-webhook-registry-credentials";
const GRC_REGISTRY_SECRET_NAME: &str = "group-rolebinding-controller-registry-credentials";

/// Serving and metrics ports of the webhook.
pub const WEBHOOK_SERVING_PORT: i32 = 443;
pub const WEBHOOK_METRICS_PORT: i32 = 2112;

/// Annotation carrying the owning tenant of a managed cluster.
pub const TENANT_ANNOTATION: &str = "cluster.metal-stack.io/tenant";

const GENERIC_KUBECONFIG_ANNOTATION: &str = "generic-token-kubeconfig.secret.gardener.cloud/name";
const DEFAULT_GENERIC_KUBECONFIG_SECRET: &str = "generic-token-kubeconfig";

/// Well-known mount path of the injected generic kubeconfig.
pub const PATH_GENERIC_KUBECONFIG: &str =
    "/var/run/secrets/gardener.cloud/shoot/generic-kubeconfig/kubeconfig";

/// Per-cluster context derived from the `Cluster` resource.
#[derive(Debug, Clone)]
pub struct ClusterContext {
    /// Name of the managed cluster
    pub name: String,
    /// Control-plane namespace of the cluster
    pub namespace: String,
    /// Cluster annotations
    pub annotations: BTreeMap<String, String>,
    /// Whether the cluster is hibernated
    pub hibernated: bool,
}

impl ClusterContext {
    /// Derive the context from the cluster mirror resource.
    #[must_use]
    pub fn from_cluster(cluster: &Cluster, namespace: &str) -> Self {
        Self {
            name: cluster.spec.shoot.name.clone(),
            namespace: namespace.to_string(),
            annotations: cluster.spec.shoot.annotations.clone(),
            hibernated: cluster.spec.shoot.hibernated,
        }
    }

    /// The owning tenant. Required, never defaulted.
    pub fn tenant(&self) -> Result<&str> {
        self.annotations
            .get(TENANT_ANNOTATION)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingTenant {
                cluster: self.name.clone(),
            })
    }

    /// Desired replica count: hibernated clusters scale to zero.
    #[must_use]
    pub fn replicas(&self) -> i32 {
        i32::from(!self.hibernated)
    }

    /// Name of the generic token kubeconfig secret in the control-plane
    /// namespace.
    #[must_use]
    pub fn generic_kubeconfig_secret(&self) -> &str {
        self.annotations
            .get(GENERIC_KUBECONFIG_ANNOTATION)
            .map_or(DEFAULT_GENERIC_KUBECONFIG_SECRET, String::as_str)
    }
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn metalapi_env(name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: WEBHOOK_METALAPI_SECRET_NAME.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn webhook_deployment(
    config: &ControllerConfig,
    authn_config: &AuthnConfig,
    cluster: &ClusterContext,
    image: String,
    tenant: &str,
) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(WEBHOOK_NAME.to_string()),
            namespace: Some(cluster.namespace.clone()),
            labels: Some(labels(&[("k8s-app", WEBHOOK_NAME)])),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(cluster.replicas()),
            selector: LabelSelector {
                match_labels: Some(labels(&[("k8s-app", WEBHOOK_NAME)])),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(&[
                        ("k8s-app", WEBHOOK_NAME),
                        ("app", WEBHOOK_NAME),
                        ("networking.gardener.cloud/from-prometheus", "allowed"),
                        ("networking.gardener.cloud/from-shoot-apiserver", "allowed"),
                        ("networking.gardener.cloud/to-dns", "allowed"),
                        ("networking.gardener.cloud/to-public-networks", "allowed"),
                    ])),
                    annotations: Some(labels(&[
                        ("scheduler.alpha.kubernetes.io/critical-pod", ""),
                        ("prometheus.io/scrape", "true"),
                        ("prometheus.io/path", "/metrics"),
                        ("prometheus.io/port", "2112"),
                    ])),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "kubernetes-authn-webhook".to_string(),
                        image: Some(image),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        ports: Some(vec![
                            ContainerPort {
                                container_port: WEBHOOK_SERVING_PORT,
                                protocol: Some("TCP".to_string()),
                                ..Default::default()
                            },
                            ContainerPort {
                                name: Some("monitoring".to_string()),
                                container_port: WEBHOOK_METRICS_PORT,
                                protocol: Some("TCP".to_string()),
                                ..Default::default()
                            },
                        ]),
                        env: Some(vec![
                            env("LISTEN", ":443"),
                            env("ISSUER", &authn_config.issuer),
                            env("CLIENTID", &authn_config.client_id),
                            env("GROUPSPREFIXTOREMOVE", "k8s"),
                            env("TENANT", tenant),
                            env("PROVIDERTENANT", &config.auth.provider_tenant),
                            env("CLUSTER", &cluster.name),
                            metalapi_env("METAL_URL", "metalapi-url"),
                            metalapi_env("METAL_HMAC", "metalapi-hmac"),
                            metalapi_env("METAL_HMACAUTHTYPE", "metalapi-authtype"),
                        ]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn grc_deployment(cluster: &ClusterContext, image: String, access_secret_name: &str) -> Deployment {
    let mut deployment = Deployment {
        metadata: ObjectMeta {
            name: Some(GRC_NAME.to_string()),
            namespace: Some(cluster.namespace.clone()),
            labels: Some(labels(&[("app", GRC_NAME)])),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(cluster.replicas()),
            selector: LabelSelector {
                match_labels: Some(labels(&[("app", GRC_NAME)])),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(&[
                        ("app", GRC_NAME),
                        ("networking.gardener.cloud/from-prometheus", "allowed"),
                        ("networking.gardener.cloud/to-dns", "allowed"),
                        ("networking.gardener.cloud/to-shoot-apiserver", "allowed"),
                        ("networking.gardener.cloud/to-public-networks", "allowed"),
                    ])),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: GRC_NAME.to_string(),
                        image: Some(image),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        command: Some(vec!["/group-rolebinding-controller".to_string()]),
                        args: Some(vec![
                            "--excludeNamespaces=kube-system,kube-public,kube-node-lease,default"
                                .to_string(),
                            "--expectedGroupsList=admin,edit,view".to_string(),
                            format!("--clustername={}", cluster.name),
                            format!("--kubeconfig={PATH_GENERIC_KUBECONFIG}"),
                        ]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    inject_generic_kubeconfig(
        &mut deployment,
        cluster.generic_kubeconfig_secret(),
        access_secret_name,
    );

    deployment
}

/// Mount the generic token kubeconfig into every container of the deployment,
/// combining the token-requestor access secret with the cluster's generic
/// kubeconfig secret.
fn inject_generic_kubeconfig(
    deployment: &mut Deployment,
    generic_secret_name: &str,
    access_secret_name: &str,
) {
    let volume = Volume {
        name: "kubeconfig".to_string(),
        projected: Some(ProjectedVolumeSource {
            default_mode: Some(420),
            sources: Some(vec![
                VolumeProjection {
                    secret: Some(SecretProjection {
                        name: generic_secret_name.to_string(),
                        items: Some(vec![KeyToPath {
                            key: "kubeconfig".to_string(),
                            path: "kubeconfig".to_string(),
                            ..Default::default()
                        }]),
                        optional: Some(false),
                    }),
                    ..Default::default()
                },
                VolumeProjection {
                    secret: Some(SecretProjection {
                        name: access_secret_name.to_string(),
                        items: Some(vec![KeyToPath {
                            key: "token".to_string(),
                            path: "token".to_string(),
                            ..Default::default()
                        }]),
                        optional: Some(false),
                    }),
                    ..Default::default()
                },
            ]),
        }),
        ..Default::default()
    };

    let mount = VolumeMount {
        name: "kubeconfig".to_string(),
        mount_path: "/var/run/secrets/gardener.cloud/shoot/generic-kubeconfig".to_string(),
        read_only: Some(true),
        ..Default::default()
    };

    if let Some(pod_spec) = deployment
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
    {
        pod_spec.volumes = Some(ensure_volume_with_name(
            pod_spec.volumes.take().unwrap_or_default(),
            volume,
        ));
        for container in &mut pod_spec.containers {
            container.volume_mounts = Some(ensure_volume_mount_with_name(
                container.volume_mounts.take().unwrap_or_default(),
                mount.clone(),
            ));
        }
    }
}

fn webhook_service(namespace: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(WEBHOOK_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(&[("app", WEBHOOK_NAME)])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels(&[("app", WEBHOOK_NAME)])),
            ports: Some(vec![ServicePort {
                port: WEBHOOK_SERVING_PORT,
                target_port: Some(IntOrString::Int(WEBHOOK_SERVING_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn metalapi_secret(config: &ControllerConfig, namespace: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(WEBHOOK_METALAPI_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        string_data: Some(BTreeMap::from([
            ("metalapi-url".to_string(), config.auth.metal_url.clone()),
            ("metalapi-hmac".to_string(), config.auth.metal_hmac.clone()),
            (
                "metalapi-authtype".to_string(),
                config.auth.metal_auth_type.clone(),
            ),
        ])),
        ..Default::default()
    }
}

fn registry_credentials_secret(name: &str, namespace: &str, content: Vec<u8>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(&[("app", name)])),
            ..Default::default()
        },
        type_: Some("kubernetes.io/dockerconfigjson".to_string()),
        data: Some(BTreeMap::from([(
            ".dockerconfigjson".to_string(),
            ByteString(content),
        )])),
        ..Default::default()
    }
}

fn apiserver_peer() -> NetworkPolicyPeer {
    NetworkPolicyPeer {
        pod_selector: Some(LabelSelector {
            match_labels: Some(labels(&[("app", "kubernetes"), ("role", "apiserver")])),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn webhook_network_policies(namespace: &str) -> Vec<NetworkPolicy> {
    let pod_selector = LabelSelector {
        match_labels: Some(labels(&[("k8s-app", WEBHOOK_NAME)])),
        ..Default::default()
    };
    let serving_port = NetworkPolicyPort {
        port: Some(IntOrString::Int(WEBHOOK_SERVING_PORT)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    };

    vec![
        NetworkPolicy {
            metadata: ObjectMeta {
                name: Some(format!("{WEBHOOK_NAME}-from-apiserver")),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(NetworkPolicySpec {
                pod_selector: pod_selector.clone(),
                policy_types: Some(vec!["Ingress".to_string()]),
                ingress: Some(vec![NetworkPolicyIngressRule {
                    from: Some(vec![apiserver_peer()]),
                    ports: Some(vec![serving_port.clone()]),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        },
        NetworkPolicy {
            metadata: ObjectMeta {
                name: Some(format!("{WEBHOOK_NAME}-to-apiserver")),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(NetworkPolicySpec {
                pod_selector,
                policy_types: Some(vec!["Egress".to_string()]),
                egress: Some(vec![NetworkPolicyEgressRule {
                    to: Some(vec![apiserver_peer()]),
                    ports: Some(vec![serving_port]),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}

/// Build the control-plane scoped object set for one managed cluster.
pub fn seed_objects(
    config: &ControllerConfig,
    authn_config: &AuthnConfig,
    cluster: &ClusterContext,
    access_secret_name: &str,
) -> Result<Vec<Value>> {
    let authn_image = config.find_image(IMAGE_AUTHN_WEBHOOK)?;
    let grc_image = config.find_image(IMAGE_GROUP_ROLEBINDING_CONTROLLER)?;

    let tenant = cluster.tenant()?;

    let mut webhook = webhook_deployment(config, authn_config, cluster, authn_image, tenant);
    let mut grc = grc_deployment(cluster, grc_image, access_secret_name);

    let mut extra_secrets = Vec::new();
    if let Some(pull_secret) = config
        .image_pull_secret
        .as_ref()
        .filter(|s| !s.docker_config_json.is_empty())
    {
        let content = BASE64
            .decode(&pull_secret.docker_config_json)
            .map_err(|e| Error::Config(format!("unable to decode image pull secret: {e}")))?;

        extra_secrets.push(registry_credentials_secret(
            WEBHOOK_REGISTRY_SECRET_NAME,
            &cluster.namespace,
            content.clone(),
        ));
        extra_secrets.push(registry_credentials_secret(
            GRC_REGISTRY_SECRET_NAME,
            &cluster.namespace,
            content,
        ));

        add_image_pull_secret(&mut webhook, WEBHOOK_REGISTRY_SECRET_NAME);
        add_image_pull_secret(&mut grc, GRC_REGISTRY_SECRET_NAME);
    }

    let mut objects = vec![
        tagged(&metalapi_secret(config, &cluster.namespace))?,
        tagged(&webhook)?,
        tagged(&grc)?,
        tagged(&webhook_service(&cluster.namespace))?,
    ];

    for secret in &extra_secrets {
        objects.push(tagged(secret)?);
    }

    if config.variant.network_policies_enabled() {
        for policy in &webhook_network_policies(&cluster.namespace) {
            objects.push(tagged(policy)?);
        }
    }

    Ok(objects)
}

fn add_image_pull_secret(deployment: &mut Deployment, secret_name: &str) {
    if let Some(pod_spec) = deployment
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
    {
        pod_spec
            .image_pull_secrets
            .get_or_insert_with(Vec::new)
            .push(LocalObjectReference {
                name: secret_name.to_string(),
            });
    }
}

/// Build the workload scoped object set: the rolebinding granting the
/// sidecar's service identity cluster-admin so it can manage role bindings
/// across all namespaces.
pub fn shoot_objects() -> Result<Vec<Value>> {
    let binding = ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some("system:group-rolebinding-controller".to_string()),
            ..Default::default()
        },
        subjects: Some(vec![Subject {
            kind: "User".to_string(),
            name: "system:serviceaccount:kube-system:group-rolebinding-controller".to_string(),
            ..Default::default()
        }]),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: "cluster-admin".to_string(),
        },
        ..Default::default()
    };

    Ok(vec![tagged(&binding)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, ImagePullSecret};
    use crate::registry::ResourceRegistry;

    fn test_config() -> ControllerConfig {
        ControllerConfig {
            auth: AuthConfig {
                provider_tenant: "fits".to_string(),
                metal_url: "https://api.metal.example.com".to_string(),
                metal_hmac: "a-hmac".to_string(),
                metal_auth_type: "Metal-Admin".to_string(),
            },
            ..Default::default()
        }
    }

    fn test_authn_config() -> AuthnConfig {
        AuthnConfig {
            issuer: "https://dex.example.com".to_string(),
            client_id: "cluster-auth".to_string(),
            ..Default::default()
        }
    }

    fn test_cluster() -> ClusterContext {
        ClusterContext {
            name: "mycluster".to_string(),
            namespace: "shoot--fits--mycluster".to_string(),
            annotations: BTreeMap::from([(
                TENANT_ANNOTATION.to_string(),
                "a-tenant".to_string(),
            )]),
            hibernated: false,
        }
    }

    fn build(config: &ControllerConfig, cluster: &ClusterContext) -> Vec<Value> {
        seed_objects(config, &test_authn_config(), cluster, "shoot-access-grc").unwrap()
    }

    fn find<'a>(objects: &'a [Value], kind: &str, name: &str) -> &'a Value {
        objects
            .iter()
            .find(|o| o["kind"] == kind && o["metadata"]["name"] == name)
            .unwrap_or_else(|| panic!("no {kind} named {name}"))
    }

    #[test]
    fn test_seed_objects_are_deterministic() {
        let config = test_config();
        let cluster = test_cluster();

        let first = ResourceRegistry::add_all(build(&config, &cluster))
            .serialize()
            .unwrap();
        let second = ResourceRegistry::add_all(build(&config, &cluster))
            .serialize()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_replica_toggle_follows_hibernation() {
        let config = test_config();
        let mut cluster = test_cluster();

        let objects = build(&config, &cluster);
        let webhook = find(&objects, "Deployment", WEBHOOK_NAME);
        assert_eq!(webhook["spec"]["replicas"], 1);

        cluster.hibernated = true;
        let objects = build(&config, &cluster);
        for name in [WEBHOOK_NAME, GRC_NAME] {
            let deployment = find(&objects, "Deployment", name);
            assert_eq!(deployment["spec"]["replicas"], 0);
        }
    }

    #[test]
    fn test_missing_tenant_is_fatal() {
        let config = test_config();
        let mut cluster = test_cluster();
        cluster.annotations.clear();

        let result = seed_objects(&config, &test_authn_config(), &cluster, "shoot-access-grc");
        assert!(matches!(
            result,
            Err(Error::MissingTenant { ref cluster }) if cluster == "mycluster"
        ));
    }

    #[test]
    fn test_unregistered_image_is_fatal() {
        let mut config = test_config();
        config.images.remove(IMAGE_AUTHN_WEBHOOK);

        let result = seed_objects(
            &config,
            &test_authn_config(),
            &test_cluster(),
            "shoot-access-grc",
        );
        assert!(matches!(result, Err(Error::ImageResolution(_))));
    }

    #[test]
    fn test_webhook_env_carries_provider_config_and_tenant() {
        let objects = build(&test_config(), &test_cluster());
        let webhook = find(&objects, "Deployment", WEBHOOK_NAME);
        let env = webhook["spec"]["template"]["spec"]["containers"][0]["env"]
            .as_array()
            .unwrap();

        let get = |name: &str| {
            env.iter()
                .find(|e| e["name"] == name)
                .unwrap_or_else(|| panic!("no env var {name}"))
        };
        assert_eq!(get("ISSUER")["value"], "https://dex.example.com");
        assert_eq!(get("CLIENTID")["value"], "cluster-auth");
        assert_eq!(get("TENANT")["value"], "a-tenant");
        assert_eq!(get("PROVIDERTENANT")["value"], "fits");
        assert_eq!(get("CLUSTER")["value"], "mycluster");
        assert_eq!(
            get("METAL_URL")["valueFrom"]["secretKeyRef"]["name"],
            WEBHOOK_METALAPI_SECRET_NAME
        );
    }

    #[test]
    fn test_grc_args_and_kubeconfig_injection() {
        let objects = build(&test_config(), &test_cluster());
        let grc = find(&objects, "Deployment", GRC_NAME);
        let container = &grc["spec"]["template"]["spec"]["containers"][0];

        let args: Vec<&str> = container["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a.as_str().unwrap())
            .collect();
        assert!(args.contains(&"--excludeNamespaces=kube-system,kube-public,kube-node-lease,default"));
        assert!(args.contains(&"--expectedGroupsList=admin,edit,view"));
        assert!(args.contains(&"--clustername=mycluster"));
        assert!(args.contains(&format!("--kubeconfig={PATH_GENERIC_KUBECONFIG}").as_str()));

        assert_eq!(container["volumeMounts"][0]["name"], "kubeconfig");
        let sources = grc["spec"]["template"]["spec"]["volumes"][0]["projected"]["sources"]
            .as_array()
            .unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0]["secret"]["name"], "generic-token-kubeconfig");
        assert_eq!(sources[1]["secret"]["name"], "shoot-access-grc");
    }

    #[test]
    fn test_pull_secret_propagation() {
        let mut config = test_config();
        let cluster = test_cluster();

        // absent: no registry secrets, no references
        let objects = build(&config, &cluster);
        assert_eq!(objects.len(), 4);
        let webhook = find(&objects, "Deployment", WEBHOOK_NAME);
        assert!(webhook["spec"]["template"]["spec"]["imagePullSecrets"].is_null());

        // present: exactly two extra secrets, both deployments reference them
        config.image_pull_secret = Some(ImagePullSecret {
            docker_config_json: BASE64.encode(r#"{"auths":{}}"#),
        });
        let objects = build(&config, &cluster);
        assert_eq!(objects.len(), 6);

        let webhook = find(&objects, "Deployment", WEBHOOK_NAME);
        assert_eq!(
            webhook["spec"]["template"]["spec"]["imagePullSecrets"][0]["name"],
            "kube-jwt-authn-webhook-registry-credentials"
        );
        let grc = find(&objects, "Deployment", GRC_NAME);
        assert_eq!(
            grc["spec"]["template"]["spec"]["imagePullSecrets"][0]["name"],
            "group-rolebinding-controller-registry-credentials"
        );
        find(&objects, "Secret", "kube-jwt-authn-webhook-registry-credentials");
        find(&objects, "Secret", "group-rolebinding-controller-registry-credentials");
    }

    #[test]
    fn test_invalid_pull_secret_is_rejected() {
        let mut config = test_config();
        config.image_pull_secret = Some(ImagePullSecret {
            docker_config_json: "not base64!".to_string(),
        });

        let result = seed_objects(
            &config,
            &test_authn_config(),
            &test_cluster(),
            "shoot-access-grc",
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_network_policies_only_for_network_policy_aware_variant() {
        let mut config = test_config();
        let cluster = test_cluster();

        let objects = build(&config, &cluster);
        assert!(!objects.iter().any(|o| o["kind"] == "NetworkPolicy"));

        config.variant = crate::config::ExtensionVariant::NetworkPolicyAware;
        let objects = build(&config, &cluster);
        let policies: Vec<_> = objects
            .iter()
            .filter(|o| o["kind"] == "NetworkPolicy")
            .collect();
        assert_eq!(policies.len(), 2);
        find(&objects, "NetworkPolicy", "kube-jwt-authn-webhook-from-apiserver");
        find(&objects, "NetworkPolicy", "kube-jwt-authn-webhook-to-apiserver");
    }

    #[test]
    fn test_shoot_objects_single_cluster_role_binding() {
        let objects = shoot_objects().unwrap();
        assert_eq!(objects.len(), 1);

        let binding = &objects[0];
        assert_eq!(binding["kind"], "ClusterRoleBinding");
        assert_eq!(binding["metadata"]["name"], "system:group-rolebinding-controller");
        assert_eq!(
            binding["subjects"][0]["name"],
            "system:serviceaccount:kube-system:group-rolebinding-controller"
        );
        assert_eq!(binding["roleRef"]["name"], "cluster-admin");
    }

    #[test]
    fn test_service_fronts_webhook_on_443() {
        let objects = build(&test_config(), &test_cluster());
        let service = find(&objects, "Service", WEBHOOK_NAME);
        assert_eq!(service["spec"]["ports"][0]["port"], 443);
        assert_eq!(service["spec"]["selector"]["app"], WEBHOOK_NAME);
    }
}
