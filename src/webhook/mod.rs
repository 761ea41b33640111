//! Mutating admission webhook for the managed cluster control plane.
//!
//! Receives AdmissionReview requests for Deployment objects and patches the
//! kube-apiserver deployment so it authenticates tokens against the webhook.
//! Failures reading or writing the webhook kubeconfig artifact reject the
//! admission request outright (fail-closed).

pub mod kapiserver;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::{extract::State, Json, Router};
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::{Client, ResourceExt};
use tracing::{debug, error, info};

use crate::config::ControllerConfig;
use crate::error::{Error, Result};

/// Shared state of the webhook server
pub struct WebhookState {
    pub client: Client,
    pub config: Arc<ControllerConfig>,
}

/// Build the admission router.
pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhooks/control-plane", post(mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Serve the admission webhook until the process shuts down.
pub async fn serve(state: Arc<WebhookState>, addr: SocketAddr) -> Result<()> {
    info!("webhook server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .await
        .map_err(Error::Io)?;
    Ok(())
}

/// Handle mutating admission review for Deployments
async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<Deployment>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<Deployment> = match body.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = mutate_deployment(&state, &request).await;
    Json(response.into_review())
}

/// Process a single deployment mutation request
async fn mutate_deployment(
    state: &WebhookState,
    request: &AdmissionRequest<Deployment>,
) -> AdmissionResponse {
    let uid = request.uid.clone();

    let Some(obj) = &request.object else {
        debug!(uid = %uid, "no deployment object in request, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    if !kapiserver::has_kube_apiserver_container(obj) {
        debug!(
            uid = %uid,
            deployment = ?obj.metadata.name,
            "no kube-apiserver container, allowing unchanged"
        );
        return AdmissionResponse::from(request);
    }

    let namespace = obj
        .namespace()
        .or_else(|| request.namespace.clone())
        .unwrap_or_default();

    if state.config.variant.injects_kubeconfig() {
        if let Err(e) = kapiserver::reconcile_webhook_configmap(&state.client, &namespace).await {
            error!(uid = %uid, namespace = %namespace, error = %e, "webhook configmap reconciliation failed");
            return AdmissionResponse::from(request).deny(e.to_string());
        }
    }

    let mut mutated = obj.clone();
    kapiserver::ensure_kube_apiserver_deployment(&mut mutated, state.config.variant);

    let (original_value, mutated_value) = match (
        serde_json::to_value(obj),
        serde_json::to_value(&mutated),
    ) {
        (Ok(original), Ok(mutated)) => (original, mutated),
        (Err(e), _) | (_, Err(e)) => {
            error!(uid = %uid, error = %e, "failed to serialize deployment");
            return AdmissionResponse::from(request).deny(format!("serialization error: {e}"));
        }
    };

    let patch = json_patch::diff(&original_value, &mutated_value);
    if patch.0.is_empty() {
        return AdmissionResponse::from(request);
    }

    info!(
        uid = %uid,
        namespace = %namespace,
        patch_ops = patch.0.len(),
        "mutating kube-apiserver deployment"
    );

    match AdmissionResponse::from(request).with_patch(patch) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, error = %e, "failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"))
        }
    }
}
