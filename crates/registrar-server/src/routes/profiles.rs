//! Profile endpoints.

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use registrar_core::{Profile, ProfileInput};
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::AppResult;
use crate::AppState;

/// Profile routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/profiles", get(list_profiles).post(create_profile))
        .route("/profiles/:id", get(get_profile).patch(update_profile))
}

async fn list_profiles(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> AppResult<Json<Vec<Profile>>> {
    let profiles = state.run(ctx, |session| session.list_profiles()).await?;
    Ok(Json(profiles))
}

/// Create the caller's profile when signup did not.
async fn create_profile(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    body: Result<Json<ProfileInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Profile>)> {
    let Json(input) = body?;
    let profile = state
        .run(ctx, move |session| session.create_profile(&input))
        .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn get_profile(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Profile>> {
    let Path(id) = id?;
    let profile = state.run(ctx, move |session| session.get_profile(id)).await?;
    Ok(Json(profile))
}

async fn update_profile(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ProfileInput>, JsonRejection>,
) -> AppResult<Json<Profile>> {
    let Path(id) = id?;
    let Json(input) = body?;
    let profile = state
        .run(ctx, move |session| session.update_profile(id, &input))
        .await?;
    Ok(Json(profile))
}
