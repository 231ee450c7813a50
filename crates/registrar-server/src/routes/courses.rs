//! Course endpoints.

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use registrar_core::{Course, CourseInput};
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::AppResult;
use crate::json::DeleteResponse;
use crate::AppState;

/// Course routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses).post(create_course))
        .route(
            "/courses/:id",
            get(get_course).patch(update_course).delete(delete_course),
        )
}

async fn list_courses(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> AppResult<Json<Vec<Course>>> {
    let courses = state.run(ctx, |session| session.list_courses()).await?;
    Ok(Json(courses))
}

async fn get_course(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Course>> {
    let Path(id) = id?;
    let course = state.run(ctx, move |session| session.get_course(id)).await?;
    Ok(Json(course))
}

async fn create_course(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    body: Result<Json<CourseInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Course>)> {
    let Json(input) = body?;
    let course = state
        .run(ctx, move |session| session.create_course(&input))
        .await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn update_course(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CourseInput>, JsonRejection>,
) -> AppResult<Json<Course>> {
    let Path(id) = id?;
    let Json(input) = body?;
    let course = state
        .run(ctx, move |session| session.update_course(id, &input))
        .await?;
    Ok(Json(course))
}

/// Delete a course. Enrolled students are kept with their course cleared.
async fn delete_course(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<DeleteResponse>> {
    let Path(id) = id?;
    let cascade = state.run(ctx, move |session| session.delete_course(id)).await?;
    Ok(Json(DeleteResponse { id, cascade }))
}
