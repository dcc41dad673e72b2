use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use dts_store::domain::now_ms;
use dts_store::{repository, TaskView};
use utoipa::OpenApi;

use super::dto::{
    ListQuery, TaskBatchCreateRequest, TaskBatchCreateResponse, TaskCreateRequest,
    TaskCreateResponse, TaskListResponse,
};
use super::error::ApiError;
use super::AppState;

#[utoipa::path(
    post,
    path = "/tasks",
    tag = "Tasks",
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "task created", body = TaskCreateResponse),
        (status = 409, description = "id already exists"),
        (status = 400, description = "missing dependency, cycle, or validation error"),
    )
)]
async fn create(
    State(state): State<AppState>,
    Json(body): Json<TaskCreateRequest>,
) -> Result<(axum::http::StatusCode, Json<TaskCreateResponse>), ApiError> {
    body.validate()?;
    let mut conn = state.store.connect()?;
    let id = repository::create_task(
        &mut conn,
        body.into_new_task(),
        now_ms(),
        state.default_max_attempts,
    )?;
    Ok((axum::http::StatusCode::CREATED, Json(TaskCreateResponse { id })))
}

#[utoipa::path(
    post,
    path = "/tasks/batch",
    tag = "Tasks",
    request_body = TaskBatchCreateRequest,
    responses(
        (status = 201, description = "batch created", body = TaskBatchCreateResponse),
        (status = 409, description = "one or more ids already exist"),
        (status = 400, description = "missing dependency, cycle, or validation error"),
    )
)]
async fn create_batch(
    State(state): State<AppState>,
    Json(body): Json<TaskBatchCreateRequest>,
) -> Result<(axum::http::StatusCode, Json<TaskBatchCreateResponse>), ApiError> {
    body.validate()?;
    let tasks = body.tasks.into_iter().map(TaskCreateRequest::into_new_task).collect();
    let mut conn = state.store.connect()?;
    let created = repository::create_tasks_batch(
        &mut conn,
        tasks,
        now_ms(),
        state.default_max_attempts,
    )?;
    let count = created.len();
    Ok((
        axum::http::StatusCode::CREATED,
        Json(TaskBatchCreateResponse { created, count }),
    ))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = String, Path, description = "task id")),
    responses(
        (status = 200, description = "the task", body = TaskView),
        (status = 404, description = "no task with that id"),
    )
)]
async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    let conn = state.store.connect()?;
    let view = repository::get_task(&conn, &id)?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/tasks",
    tag = "Tasks",
    params(
        ("limit" = Option<i64>, Query, description = "page size, default 50"),
        ("offset" = Option<i64>, Query, description = "page offset, default 0"),
    ),
    responses(
        (status = 200, description = "a page of tasks", body = TaskListResponse),
    )
)]
async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let conn = state.store.connect()?;
    let (tasks, total) = repository::list_tasks(&conn, query.limit(), query.offset())?;
    Ok(Json(TaskListResponse { tasks, total }))
}

#[derive(OpenApi)]
#[openapi(
    paths(create, create_batch, get_one, list),
    components(schemas(
        TaskCreateRequest,
        TaskCreateResponse,
        TaskBatchCreateRequest,
        TaskBatchCreateResponse,
        TaskListResponse,
        TaskView,
    ))
)]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/tasks", post(create).get(list))
        .route("/tasks/batch", post(create_batch))
        .route("/tasks/:id", get(get_one))
}
