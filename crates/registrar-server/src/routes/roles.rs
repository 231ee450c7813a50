//! Role assignment endpoints.

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use registrar_core::{Role, RoleAssignment};
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::AppResult;
use crate::json::GrantRoleRequest;
use crate::AppState;

/// Role routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(grant_role))
        .route("/roles/:identity/:role", delete(revoke_role))
}

async fn list_roles(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> AppResult<Json<Vec<RoleAssignment>>> {
    let roles = state.run(ctx, |session| session.list_roles()).await?;
    Ok(Json(roles))
}

async fn grant_role(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    body: Result<Json<GrantRoleRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<RoleAssignment>)> {
    let Json(request) = body?;
    let assignment = state
        .run(ctx, move |session| session.grant_role(request.user_id, request.role))
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn revoke_role(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    path: Result<Path<(Uuid, Role)>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path((identity, role)) = path?;
    state
        .run(ctx, move |session| session.revoke_role(identity, role))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
