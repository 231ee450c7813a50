//! Identity events from the auth provider.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use registrar_core::{IdentityEvent, ProvisioningOutcome, Provisioner};

use crate::auth::HookCaller;
use crate::error::{AppError, AppResult};
use crate::AppState;

/// Hook routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/hooks/identity", post(identity_event))
}

/// Provision or deprovision an identity.
///
/// A failure is reported back to the provider so that it can refuse the signup.
async fn identity_event(
    State(state): State<AppState>,
    _hook: HookCaller,
    body: Result<Json<IdentityEvent>, JsonRejection>,
) -> AppResult<Json<ProvisioningOutcome>> {
    let Json(event) = body?;
    tracing::info!(identity = %event.identity_id(), "identity event received");

    let db = state.db.clone();
    let outcome = tokio::task::spawn_blocking(move || Provisioner::new(&db).handle(&event))
        .await
        .map_err(|e| AppError::Internal(format!("provisioning task failed: {}", e)))??;
    Ok(Json(outcome))
}
