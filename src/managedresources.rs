//! Create, update, delete and wait on managed resource bundles.
//!
//! A bundle is a data `Secret` plus a `ManagedResource` pointing at it; the
//! resource-manager applies the bundled objects into the target cluster.
//! Fixed bundle names make repeated application an update-in-place.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::crds::{ManagedResource, ManagedResourceSpec, SecretRef};
use crate::error::{Error, Result};

/// Bounded wait applied to bundle deletion confirmation.
pub const DELETION_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Data key under which a bundle's serialized objects are stored.
pub const BUNDLE_DATA_KEY: &str = "objects.yaml";

/// Scope a bundle is applied into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    /// Applied into the control-plane (seed) namespace
    ControlPlane,
    /// Applied inside the managed (shoot) cluster
    Workload,
}

impl ResourceScope {
    fn class(self) -> Option<&'static str> {
        match self {
            ResourceScope::ControlPlane => Some("seed"),
            ResourceScope::Workload => None,
        }
    }
}

/// Storage backend for managed resource bundles.
///
/// The actuator only talks to this trait so its delete semantics can be
/// exercised against stub stores.
#[async_trait]
pub trait ManagedResourceStore: Send + Sync {
    /// Create the bundle or replace its content, identified by `name`.
    async fn apply(
        &self,
        namespace: &str,
        name: &str,
        scope: ResourceScope,
        data: String,
        force_overwrite: bool,
    ) -> Result<()>;

    /// Request deletion of the bundle. Absent bundles are not an error.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;

    /// Whether the bundle still exists.
    async fn exists(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// Block until the platform confirms bundle removal, bounded by `timeout`.
///
/// Cancelling `shutdown` aborts the wait early instead of hanging.
pub async fn wait_until_deleted<S>(
    store: &S,
    namespace: &str,
    name: &str,
    timeout: Duration,
    shutdown: &CancellationToken,
) -> Result<()>
where
    S: ManagedResourceStore + ?Sized,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if !store.exists(namespace, name).await? {
            debug!("managed resource {}/{} is gone", namespace, name);
            return Ok(());
        }

        if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
            return Err(Error::DeletionTimeout {
                namespace: namespace.to_string(),
                name: name.to_string(),
                timeout,
            });
        }

        tokio::select! {
            () = shutdown.cancelled() => {
                return Err(Error::Cancelled(format!(
                    "wait for deletion of managed resource {namespace}/{name}"
                )));
            }
            () = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

/// Store backed by the Kubernetes API of the control-plane cluster.
#[derive(Clone)]
pub struct KubeManagedResourceStore {
    client: Client,
}

impl KubeManagedResourceStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn secret_name(name: &str) -> String {
        format!("managedresource-{name}")
    }

    fn apply_error(namespace: &str, name: &str, source: kube::Error) -> Error {
        Error::BundleApply {
            namespace: namespace.to_string(),
            name: name.to_string(),
            source,
        }
    }

    async fn upsert_secret(&self, namespace: &str, secret: Secret) -> Result<(), kube::Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let name = secret.metadata.name.clone().unwrap_or_default();

        match api.create(&PostParams::default(), &secret).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                let existing = api.get(&name).await?;
                let mut updated = secret;
                updated.metadata.resource_version = existing.metadata.resource_version;
                api.replace(&name, &PostParams::default(), &updated).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn upsert_managed_resource(
        &self,
        namespace: &str,
        resource: ManagedResource,
    ) -> Result<(), kube::Error> {
        let api: Api<ManagedResource> = Api::namespaced(self.client.clone(), namespace);
        let name = resource.metadata.name.clone().unwrap_or_default();

        match api.create(&PostParams::default(), &resource).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                let existing = api.get(&name).await?;
                let mut updated = resource;
                updated.metadata.resource_version = existing.metadata.resource_version;
                api.replace(&name, &PostParams::default(), &updated).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ManagedResourceStore for KubeManagedResourceStore {
    async fn apply(
        &self,
        namespace: &str,
        name: &str,
        scope: ResourceScope,
        data: String,
        force_overwrite: bool,
    ) -> Result<()> {
        let secret_name = Self::secret_name(name);

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(secret_name.clone()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            string_data: Some(BTreeMap::from([(BUNDLE_DATA_KEY.to_string(), data)])),
            ..Default::default()
        };

        let resource = ManagedResource {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: match scope {
                    ResourceScope::Workload => Some(BTreeMap::from([(
                        "origin".to_string(),
                        "fits-authn".to_string(),
                    )])),
                    ResourceScope::ControlPlane => None,
                },
                ..Default::default()
            },
            spec: ManagedResourceSpec {
                class: scope.class().map(ToString::to_string),
                secret_refs: vec![SecretRef { name: secret_name }],
                keep_objects: match scope {
                    ResourceScope::Workload => Some(false),
                    ResourceScope::ControlPlane => None,
                },
                force_overwrite_labels: force_overwrite.then_some(true),
                force_overwrite_annotations: force_overwrite.then_some(true),
                ..Default::default()
            },
        };

        self.upsert_secret(namespace, secret)
            .await
            .map_err(|e| Self::apply_error(namespace, name, e))?;
        self.upsert_managed_resource(namespace, resource)
            .await
            .map_err(|e| Self::apply_error(namespace, name, e))?;

        info!("managed resource {}/{} applied", namespace, name);
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let resources: Api<ManagedResource> = Api::namespaced(self.client.clone(), namespace);
        match resources.delete(name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(e) => return Err(e.into()),
        }

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match secrets
            .delete(&Self::secret_name(name), &DeleteParams::default())
            .await
        {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(e) => return Err(e.into()),
        }

        info!("managed resource {}/{} deletion requested", namespace, name);
        Ok(())
    }

    async fn exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let resources: Api<ManagedResource> = Api::namespaced(self.client.clone(), namespace);
        match resources.get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store whose bundles never go away.
    struct NeverDeletedStore {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl ManagedResourceStore for NeverDeletedStore {
        async fn apply(&self, _: &str, _: &str, _: ResourceScope, _: String, _: bool) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        async fn exists(&self, _: &str, _: &str) -> Result<bool> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    /// Store whose bundle disappears after a few polls.
    struct EventuallyDeletedStore {
        remaining: AtomicUsize,
    }

    #[async_trait]
    impl ManagedResourceStore for EventuallyDeletedStore {
        async fn apply(&self, _: &str, _: &str, _: ResourceScope, _: String, _: bool) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        async fn exists(&self, _: &str, _: &str) -> Result<bool> {
            Ok(self.remaining.fetch_sub(1, Ordering::SeqCst) > 1)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_deleted_times_out() {
        let store = NeverDeletedStore {
            polls: AtomicUsize::new(0),
        };
        let token = CancellationToken::new();

        let started = tokio::time::Instant::now();
        let result =
            wait_until_deleted(&store, "shoot--test", "extension-fits-auth", DELETION_TIMEOUT, &token)
                .await;

        assert!(matches!(
            result,
            Err(Error::DeletionTimeout { ref name, .. }) if name == "extension-fits-auth"
        ));
        // bounded by the timeout window, not hanging indefinitely
        assert!(started.elapsed() <= DELETION_TIMEOUT + Duration::from_secs(1));
        assert!(store.polls.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_deleted_returns_once_gone() {
        let store = EventuallyDeletedStore {
            remaining: AtomicUsize::new(3),
        };
        let token = CancellationToken::new();

        wait_until_deleted(&store, "shoot--test", "extension-fits-auth", DELETION_TIMEOUT, &token)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_deleted_respects_cancellation() {
        let store = NeverDeletedStore {
            polls: AtomicUsize::new(0),
        };
        let token = CancellationToken::new();
        token.cancel();

        let result =
            wait_until_deleted(&store, "shoot--test", "extension-fits-auth", DELETION_TIMEOUT, &token)
                .await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
    }
}
