use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{header, request::Parts, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use log::info;
use serde_json::json;
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::sync::Arc as StdArc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::error::{ApiError, Result};
use crate::models::{
    CreateProcess, ListInstances, StartInstance, UpdateInstance, UpdateProcess, User,
};
use crate::registry::{instances, processes, users};

/// State shared by all API handlers
pub struct AppState {
    pub pool: SqlitePool,
}

type SharedState = StdArc<AppState>;

/// The caller, resolved from `Authorization: Bearer <token>` on every request
pub struct AuthUser(pub User);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ApiError::Unauthorized)?;
        let user = users::authenticate(&state.pool, token).await?;
        Ok(AuthUser(user))
    }
}

/// Unwrap a JSON body, turning malformed input into a 400 with our error shape
fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

/// Numeric id from the path; anything else is a 400 like other bad input
fn path_id(path: std::result::Result<Path<i64>, PathRejection>) -> Result<i64> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

pub fn build_router(state: SharedState, cors_allow_any: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/me", get(me_handler))
        .route(
            "/processes",
            get(list_processes_handler).post(create_process_handler),
        )
        .route(
            "/processes/{id}",
            get(get_process_handler)
                .put(update_process_handler)
                .delete(delete_process_handler),
        )
        .route(
            "/instances",
            get(list_instances_handler).post(start_instance_handler),
        )
        .route("/instances/stats/summary", get(summary_handler))
        .route(
            "/instances/{id}",
            get(get_instance_handler)
                .put(update_instance_handler)
                .delete(delete_instance_handler),
        );

    let router = if cors_allow_any {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };
    router.with_state(state)
}

/// Open the database and serve the API until the process is stopped
pub fn serve(config: &ServerConfig) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let pool = crate::db::open_and_init(&config.database_path)
            .await
            .map_err(|e| format!("Failed to open database {}: {}", config.database_path.display(), e))?;
        info!("Database ready at {}", config.database_path.display());

        let app = build_router(StdArc::new(AppState { pool }), config.cors_allow_any);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| format!("Failed to bind to port {}: {}", config.api_port, e))?;
        info!("Listening on http://{}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| format!("Server error: {}", e))?;

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn me_handler(AuthUser(user): AuthUser) -> impl IntoResponse {
    Json(json!({ "user": user }))
}

async fn list_processes_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse> {
    let processes = processes::list(&state.pool, &user).await?;
    Ok(Json(json!({ "processes": processes })))
}

async fn get_process_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    id: std::result::Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse> {
    let id = path_id(id)?;
    let process = processes::get(&state.pool, &user, id).await?;
    Ok(Json(json!({ "process": process })))
}

async fn create_process_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    payload: std::result::Result<Json<CreateProcess>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let process = processes::create(&state.pool, &user, body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(json!({ "process": process }))))
}

async fn update_process_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    id: std::result::Result<Path<i64>, PathRejection>,
    payload: std::result::Result<Json<UpdateProcess>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let id = path_id(id)?;
    let process = processes::update(&state.pool, &user, id, body(payload)?).await?;
    Ok(Json(json!({ "process": process })))
}

async fn delete_process_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    id: std::result::Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse> {
    let id = path_id(id)?;
    processes::delete(&state.pool, &user, id).await?;
    Ok(Json(json!({ "message": "Process deleted successfully" })))
}

async fn list_instances_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    query: std::result::Result<Query<ListInstances>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(filter) = query.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    let instances = instances::list(&state.pool, &user, filter).await?;
    Ok(Json(json!({ "instances": instances })))
}

async fn get_instance_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    id: std::result::Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse> {
    let id = path_id(id)?;
    let instance = instances::get(&state.pool, &user, id).await?;
    Ok(Json(json!({ "instance": instance })))
}

async fn start_instance_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    payload: std::result::Result<Json<StartInstance>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let instance = instances::start(&state.pool, &user, body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(json!({ "instance": instance }))))
}

async fn update_instance_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    id: std::result::Result<Path<i64>, PathRejection>,
    payload: std::result::Result<Json<UpdateInstance>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let id = path_id(id)?;
    let instance = instances::update(&state.pool, &user, id, body(payload)?).await?;
    Ok(Json(json!({ "instance": instance })))
}

async fn delete_instance_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    id: std::result::Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse> {
    let id = path_id(id)?;
    instances::delete(&state.pool, &user, id).await?;
    Ok(Json(json!({ "message": "Instance deleted successfully" })))
}

async fn summary_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse> {
    let stats = instances::summary(&state.pool, &user).await?;
    Ok(Json(json!({ "stats": stats })))
}
