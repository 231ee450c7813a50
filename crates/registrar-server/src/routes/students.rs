//! Student endpoints.

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use registrar_core::{Student, StudentInput};
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::{AppError, AppResult};
use crate::json::DeleteResponse;
use crate::AppState;

/// Student routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/students", get(list_students).post(create_student))
        .route("/students/me", get(own_student))
        .route(
            "/students/:id",
            get(get_student).patch(update_student).delete(delete_student),
        )
}

/// Every visible student: all of them for admins, the caller's own row otherwise.
async fn list_students(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> AppResult<Json<Vec<Student>>> {
    let students = state.run(ctx, |session| session.list_students()).await?;
    Ok(Json(students))
}

async fn own_student(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> AppResult<Json<Student>> {
    state
        .run(ctx, |session| session.own_student())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no student row is linked to this identity".to_string()))
}

async fn get_student(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Student>> {
    let Path(id) = id?;
    let student = state.run(ctx, move |session| session.get_student(id)).await?;
    Ok(Json(student))
}

async fn create_student(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    body: Result<Json<StudentInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Student>)> {
    let Json(input) = body?;
    let student = state
        .run(ctx, move |session| session.create_student(&input))
        .await?;
    Ok((StatusCode::CREATED, Json(student)))
}

async fn update_student(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<StudentInput>, JsonRejection>,
) -> AppResult<Json<Student>> {
    let Path(id) = id?;
    let Json(input) = body?;
    let student = state
        .run(ctx, move |session| session.update_student(id, &input))
        .await?;
    Ok(Json(student))
}

async fn delete_student(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<DeleteResponse>> {
    let Path(id) = id?;
    let cascade = state.run(ctx, move |session| session.delete_student(id)).await?;
    Ok(Json(DeleteResponse { id, cascade }))
}
