//! Dashboard reads about the caller.

use axum::{extract::State, routing::get, Json, Router};
use registrar_core::{Error, Summary};

use crate::auth::Caller;
use crate::error::AppResult;
use crate::json::MeResponse;
use crate::AppState;

/// Caller routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/summary", get(summary))
}

async fn me(State(state): State<AppState>, Caller(ctx): Caller) -> AppResult<Json<MeResponse>> {
    let me = state
        .run(ctx, |session| {
            let identity = session.context().require_identity()?;
            let profile = match session.get_profile(identity) {
                Ok(profile) => Some(profile),
                Err(Error::NotFound { .. }) => None,
                Err(e) => return Err(e),
            };

            Ok(MeResponse {
                identity,
                roles: session.my_roles()?,
                effective_role: session.effective_role()?,
                profile,
                student: session.own_student()?,
            })
        })
        .await?;
    Ok(Json(me))
}

async fn summary(State(state): State<AppState>, Caller(ctx): Caller) -> AppResult<Json<Summary>> {
    let summary = state.run(ctx, |session| session.summary()).await?;
    Ok(Json(summary))
}
