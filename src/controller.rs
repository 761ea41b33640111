//! Watch-loop wiring for the `Extension` resource.
//!
//! The controller drives the actuator from watch events and manages a
//! finalizer so teardown runs before the resource disappears. Failed
//! reconciliations are requeued with a flat backoff; the actuator itself
//! never retries.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::finalizer::{finalizer, Event as Finalizer};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::actuator::Actuator;
use crate::config::ControllerConfig;
use crate::crds::extension::EXTENSION_TYPE;
use crate::crds::Extension;
use crate::error::{Error, Result};
use crate::managedresources::KubeManagedResourceStore;

/// Finalizer owned by this controller.
pub const FINALIZER_NAME: &str = "extensions.gardener.cloud/fits-auth";

/// Annotation requesting a specific lifecycle operation.
const OPERATION_ANNOTATION: &str = "gardener.cloud/operation";

const REQUEUE_ON_ERROR: Duration = Duration::from_secs(30);

/// Shared context for reconcile calls
pub struct Context {
    pub client: Client,
    pub actuator: Actuator<KubeManagedResourceStore>,
}

/// Run the extension controller until shutdown.
#[instrument(skip(client, config, shutdown))]
pub async fn run_extension_controller(
    client: Client,
    config: Arc<ControllerConfig>,
    shutdown: CancellationToken,
) -> Result<()> {
    let store = KubeManagedResourceStore::new(client.clone());
    let actuator = Actuator::new(client.clone(), store, config, shutdown);
    let context = Arc::new(Context {
        client: client.clone(),
        actuator,
    });

    let extensions: Api<Extension> = Api::all(client);
    let watcher_config = Config::default().any_semantic();

    info!("starting extension controller");

    Controller::new(extensions, watcher_config)
        .shutdown_on_signal()
        .run(reconcile_extension, error_policy, context)
        .for_each(|reconciliation_result| async move {
            match reconciliation_result {
                Ok(extension_resource) => {
                    debug!(
                        resource = ?extension_resource,
                        "extension reconciliation successful"
                    );
                }
                Err(reconciliation_err) => {
                    error!(
                        error = ?reconciliation_err,
                        "extension reconciliation error"
                    );
                }
            }
        })
        .await;

    info!("extension controller shutting down");
    Ok(())
}

#[instrument(skip(extension, ctx), fields(extension = %extension.name_any()))]
async fn reconcile_extension(extension: Arc<Extension>, ctx: Arc<Context>) -> Result<Action> {
    if extension.spec.extension_type != EXTENSION_TYPE {
        debug!(
            "ignoring extension of type {}",
            extension.spec.extension_type
        );
        return Ok(Action::await_change());
    }

    let namespace = extension
        .namespace()
        .ok_or(Error::MissingObjectKey("extension namespace"))?;
    let api: Api<Extension> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER_NAME, extension, |event| async {
        match event {
            Finalizer::Apply(extension) => apply(&extension, &ctx).await,
            Finalizer::Cleanup(extension) => cleanup(&extension, &ctx).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(e.to_string()))
}

async fn apply(extension: &Extension, ctx: &Context) -> Result<Action> {
    let annotations = extension.annotations();
    match annotations.get(OPERATION_ANNOTATION).map(String::as_str) {
        Some("migrate") => ctx.actuator.migrate(extension).await?,
        Some("restore") => ctx.actuator.restore(extension).await?,
        _ => ctx.actuator.reconcile(extension).await?,
    }
    Ok(Action::await_change())
}

async fn cleanup(extension: &Extension, ctx: &Context) -> Result<Action> {
    ctx.actuator.delete(extension).await?;
    Ok(Action::await_change())
}

/// Error policy: surface the error and let the watch loop retry.
fn error_policy(extension: Arc<Extension>, err: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        error = ?err,
        extension = %extension.name_any(),
        "extension reconciliation failed, requeueing"
    );
    Action::requeue(REQUEUE_ON_ERROR)
}
