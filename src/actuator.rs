//! Reconciliation actuator: converts an `Extension` into the two managed
//! resource bundles and tears them down again.
//!
//! Every operation runs to completion or failure within one call; retries are
//! the watch loop's responsibility. Reconcile aborts before any bundle is
//! serialized or applied when a precondition fails, leaving the previously
//! applied state untouched. The two bundles are not applied atomically; a
//! failure between them leaves a mixed state that the next Reconcile
//! converges.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::crds::{AuthnConfig, Cluster, Extension};
use crate::error::{Error, Result};
use crate::managedresources::{
    wait_until_deleted, ManagedResourceStore, ResourceScope, DELETION_TIMEOUT,
};
use crate::registry::ResourceRegistry;
use crate::resources::{seed_objects, shoot_objects, ClusterContext};

/// Name of the control-plane scoped bundle.
pub const SEED_RESOURCE_NAME: &str = "extension-fits-auth";

/// Name of the workload scoped bundle.
pub const SHOOT_RESOURCE_NAME: &str = "extension-fits-auth-shoot";

/// Access secret granting the sidecar read access to the managed cluster.
pub const SHOOT_ACCESS_SECRET_NAME: &str = "shoot-access-group-rolebinding-controller";

/// Decode the raw provider config carried on the extension.
///
/// An absent config is not an error; a malformed one is.
pub(crate) fn decode_provider_config(raw: Option<&Value>) -> Result<Option<AuthnConfig>> {
    match raw {
        None => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(Error::ConfigDecode),
    }
}

/// Actuator responsible for `Extension` resources.
pub struct Actuator<S> {
    client: Client,
    store: S,
    config: Arc<ControllerConfig>,
    shutdown: CancellationToken,
}

impl<S: ManagedResourceStore> Actuator<S> {
    pub fn new(
        client: Client,
        store: S,
        config: Arc<ControllerConfig>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            store,
            config,
            shutdown,
        }
    }

    /// Reconcile the extension: build the desired object sets, serialize them
    /// into the two bundles and apply both.
    pub async fn reconcile(&self, extension: &Extension) -> Result<()> {
        let namespace = extension
            .namespace()
            .ok_or(Error::MissingObjectKey("extension namespace"))?;

        let Some(authn_config) =
            decode_provider_config(extension.spec.provider_config.as_ref())?
        else {
            info!(
                "extension in {} has no provider config, nothing to reconcile",
                namespace
            );
            return Ok(());
        };

        let clusters: Api<Cluster> = Api::all(self.client.clone());
        let cluster = clusters.get(&namespace).await?;
        let cluster_ctx = ClusterContext::from_cluster(&cluster, &namespace);

        let access_secret_name = self.ensure_shoot_access_secret(&namespace).await?;

        let seed = seed_objects(&self.config, &authn_config, &cluster_ctx, &access_secret_name)?;
        let shoot = shoot_objects()?;

        let seed_data = ResourceRegistry::add_all(seed).serialize()?;
        let shoot_data = ResourceRegistry::add_all(shoot).serialize()?;

        self.store
            .apply(
                &namespace,
                SHOOT_RESOURCE_NAME,
                ResourceScope::Workload,
                shoot_data,
                false,
            )
            .await?;
        info!(
            "managed resource {}/{} created successfully",
            namespace, SHOOT_RESOURCE_NAME
        );

        self.store
            .apply(
                &namespace,
                SEED_RESOURCE_NAME,
                ResourceScope::ControlPlane,
                seed_data,
                false,
            )
            .await?;
        info!(
            "managed resource {}/{} created successfully",
            namespace, SEED_RESOURCE_NAME
        );

        Ok(())
    }

    /// Delete both bundles and block until the platform confirms removal,
    /// bounded by [`DELETION_TIMEOUT`].
    pub async fn delete(&self, extension: &Extension) -> Result<()> {
        let namespace = extension
            .namespace()
            .ok_or(Error::MissingObjectKey("extension namespace"))?;

        info!("deleting managed resources for {}", namespace);

        self.store.delete(&namespace, SHOOT_RESOURCE_NAME).await?;
        self.store.delete(&namespace, SEED_RESOURCE_NAME).await?;

        let started = tokio::time::Instant::now();
        wait_until_deleted(
            &self.store,
            &namespace,
            SHOOT_RESOURCE_NAME,
            DELETION_TIMEOUT,
            &self.shutdown,
        )
        .await?;

        let remaining = DELETION_TIMEOUT.saturating_sub(started.elapsed());
        wait_until_deleted(
            &self.store,
            &namespace,
            SEED_RESOURCE_NAME,
            remaining,
            &self.shutdown,
        )
        .await?;

        Ok(())
    }

    /// Restore delegates to reconcile.
    pub async fn restore(&self, extension: &Extension) -> Result<()> {
        self.reconcile(extension).await
    }

    /// Migrate is a no-op; ownership transfer requires no local cleanup.
    pub async fn migrate(&self, extension: &Extension) -> Result<()> {
        debug!(
            "migrate is a no-op for extension in {:?}",
            extension.namespace()
        );
        Ok(())
    }

    /// Ensure the token-requestor access secret for the sidecar exists in the
    /// control-plane namespace, returning its name.
    async fn ensure_shoot_access_secret(&self, namespace: &str) -> Result<String> {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(SHOOT_ACCESS_SECRET_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([
                    (
                        "resources.gardener.cloud/purpose".to_string(),
                        "token-requestor".to_string(),
                    ),
                    (
                        "resources.gardener.cloud/class".to_string(),
                        "shoot".to_string(),
                    ),
                ])),
                annotations: Some(BTreeMap::from([
                    (
                        "serviceaccount.resources.gardener.cloud/name".to_string(),
                        "group-rolebinding-controller".to_string(),
                    ),
                    (
                        "serviceaccount.resources.gardener.cloud/namespace".to_string(),
                        "kube-system".to_string(),
                    ),
                ])),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.create(&PostParams::default(), &secret).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                let existing = api.get(SHOOT_ACCESS_SECRET_NAME).await?;
                let mut updated = secret;
                updated.metadata.resource_version = existing.metadata.resource_version;
                // keep the token the token-requestor already issued
                updated.data = existing.data;
                api.replace(SHOOT_ACCESS_SECRET_NAME, &PostParams::default(), &updated)
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(SHOOT_ACCESS_SECRET_NAME.to_string())
    }
}
