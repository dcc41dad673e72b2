//! Router assembly: merges each resource area's routes and OpenAPI docs,
//! the way the teacher's prover server composes `health`, `metrics` and
//! `proof` under one `Docs` struct, plus CORS/compression/tracing layers
//! and interactive documentation at `/swagger-ui` and `/scalar`.

use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::Router;
use dts_store::Store;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};
use utoipa_swagger_ui::SwaggerUi;

pub mod dto;
pub mod error;
mod health;
mod tasks;

/// Shared handles every route needs: a way to open a store connection and
/// the default `max_attempts` stamped on newly created tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Store,
    pub default_max_attempts: i64,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Durable Task Scheduler API",
        version = "1.0",
        description = "Submit dependency-aware tasks and observe their progress through a bounded pool of executors.",
    ),
    tags(
        (name = "Tasks", description = "Submit, batch-submit, inspect and list tasks"),
        (name = "Health", description = "Liveness probe"),
    )
)]
struct Docs;

#[must_use]
pub fn create_docs() -> utoipa::openapi::OpenApi {
    [health::create_docs(), tasks::create_docs()]
        .into_iter()
        .fold(Docs::openapi(), |mut doc, sub_doc| {
            doc.merge(sub_doc);
            doc
        })
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(cors::Any);
    let compression = CompressionLayer::new();

    let middleware = ServiceBuilder::new().layer(cors).layer(compression).layer(
        SetResponseHeaderLayer::overriding(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ),
    );

    let docs = create_docs();

    Router::new()
        .merge(health::create_router())
        .merge(tasks::create_router())
        .layer(middleware)
        .layer(TraceLayer::new_for_http())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", docs.clone()))
        .merge(Scalar::with_url("/scalar", docs))
        .fallback(|uri: Uri| async move { (StatusCode::NOT_FOUND, format!("no handler for {uri}")) })
        .with_state(state)
}
