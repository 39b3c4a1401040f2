//! Axum router and handlers. Handlers only extract, delegate and shape the response.

use std::sync::Arc;

use axum::{
    debug_handler,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::{
    auth::{self, bearer_from_headers, AuthService},
    directory::UserDirectory,
    extract::{AppJson, AppPath, AppQuery},
    ledger::DebtLedger,
    models::{AppError, CreateDebtRequest, CreateUserRequest, LoginRequest, MessageResponse, UpdateDebtRequest, UpdateUserRequest, UserResponse},
    posts::PostSource,
    repository::{ListOptions, Repositories, UserRepository, DEFAULT_LIMIT},
};

#[derive(Clone)]
pub struct AppState {
    pub users: UserDirectory,
    pub debts: DebtLedger,
    pub user_repo: Arc<dyn UserRepository>,
    pub auth: Arc<dyn AuthService>,
    pub posts: Arc<dyn PostSource>,
    pub max_page_size: u32,
    pub db: Option<sqlx::PgPool>,
}

impl AppState {
    pub fn new(repos: Repositories, auth: Arc<dyn AuthService>, posts: Arc<dyn PostSource>, max_page_size: u32, db: Option<sqlx::PgPool>) -> Self {
        Self {
            users: UserDirectory::new(repos.users.clone(), auth.clone()),
            debts: DebtLedger::new(repos.debts, repos.users.clone()),
            user_repo: repos.users,
            auth,
            posts,
            max_page_size,
            db,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(login))
        .route("/me", get(me));

    let user_routes = Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/activeUsers", get(list_active_users))
        .route("/changeStatus/:id", post(change_user_status))
        .route("/:id", get(get_user).put(update_user).delete(delete_user));

    let debt_routes = Router::new()
        .route("/", get(list_debts).post(create_debt))
        .route("/user/:user_id", get(list_user_debts))
        .route("/user/:user_id/unpaid", get(list_unpaid_user_debts))
        .route("/:id", get(get_debt).put(update_debt).delete(delete_debt))
        .route("/:id/pay", patch(pay_debt));

    let post_routes = Router::new()
        .route("/", get(list_posts))
        .route("/:id", get(get_post));

    Router::new()
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/debts", debt_routes)
        .nest("/posts", post_routes)
        .route("/", get(root))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    skip: Option<u32>,
    limit: Option<u32>,
}

impl PaginationQuery {
    fn options(&self, max_page_size: u32) -> ListOptions {
        ListOptions { skip: self.skip.unwrap_or(0), limit: self.limit.unwrap_or(DEFAULT_LIMIT) }.clamp(max_page_size)
    }
}

fn message(text: String) -> Json<MessageResponse> {
    Json(MessageResponse { message: text })
}

pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Welcome to the users and debts API" }))
}

#[debug_handler]
pub async fn login(State(state): State<AppState>, AppJson(payload): AppJson<LoginRequest>) -> Result<impl IntoResponse, AppError> {
    let response = auth::login(state.user_repo.as_ref(), state.auth.as_ref(), payload).await?;
    Ok(Json(response))
}

async fn current_user_from_headers(state: &AppState, headers: &HeaderMap) -> Result<UserResponse, AppError> {
    let token = bearer_from_headers(headers).ok_or(AppError::InvalidToken)?;
    let claims = state.auth.validate_token(&token).await?;
    state.users.get(claims.user_id).await.map_err(|e| if e.is_not_found() { AppError::InvalidToken } else { e })
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let user = current_user_from_headers(&state, &headers).await?;
    Ok(Json(user))
}

// Users

pub async fn list_users(State(state): State<AppState>, AppQuery(pq): AppQuery<PaginationQuery>) -> Result<impl IntoResponse, AppError> {
    let users = state.users.list(pq.options(state.max_page_size)).await?;
    Ok(Json(users))
}

pub async fn list_active_users(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.users.list_active().await?))
}

pub async fn get_user(State(state): State<AppState>, AppPath(id): AppPath<i64>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.users.get(id).await?))
}

#[debug_handler]
pub async fn create_user(State(state): State<AppState>, AppJson(payload): AppJson<CreateUserRequest>) -> Result<impl IntoResponse, AppError> {
    let user = state.users.create(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(State(state): State<AppState>, AppPath(id): AppPath<i64>, AppJson(payload): AppJson<UpdateUserRequest>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.users.update(id, payload).await?))
}

pub async fn delete_user(State(state): State<AppState>, AppPath(id): AppPath<i64>) -> Result<impl IntoResponse, AppError> {
    state.users.delete(id).await?;
    Ok(message(format!("user with id {id} deleted")))
}

pub async fn change_user_status(State(state): State<AppState>, AppPath(id): AppPath<i64>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.users.toggle_active(id).await?))
}

// Debts

pub async fn list_debts(State(state): State<AppState>, AppQuery(pq): AppQuery<PaginationQuery>) -> Result<impl IntoResponse, AppError> {
    let debts = state.debts.list(pq.options(state.max_page_size)).await?;
    Ok(Json(debts))
}

pub async fn get_debt(State(state): State<AppState>, AppPath(id): AppPath<i64>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.debts.get(id).await?))
}

pub async fn list_user_debts(State(state): State<AppState>, AppPath(user_id): AppPath<i64>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.debts.list_by_user(user_id).await?))
}

pub async fn list_unpaid_user_debts(State(state): State<AppState>, AppPath(user_id): AppPath<i64>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.debts.list_unpaid_by_user(user_id).await?))
}

#[debug_handler]
pub async fn create_debt(State(state): State<AppState>, AppJson(payload): AppJson<CreateDebtRequest>) -> Result<impl IntoResponse, AppError> {
    let debt = state.debts.create(payload).await?;
    Ok((StatusCode::CREATED, Json(debt)))
}

pub async fn update_debt(State(state): State<AppState>, AppPath(id): AppPath<i64>, AppJson(payload): AppJson<UpdateDebtRequest>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.debts.update(id, payload).await?))
}

pub async fn delete_debt(State(state): State<AppState>, AppPath(id): AppPath<i64>) -> Result<impl IntoResponse, AppError> {
    state.debts.delete(id).await?;
    Ok(message(format!("debt with id {id} deleted")))
}

pub async fn pay_debt(State(state): State<AppState>, AppPath(id): AppPath<i64>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.debts.mark_paid(id).await?))
}

// Posts

pub async fn list_posts(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.posts.fetch_all().await?))
}

pub async fn get_post(State(state): State<AppState>, AppPath(id): AppPath<i64>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.posts.fetch_by_id(id).await?))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let Some(pool) = state.db.as_ref() else {
        return (StatusCode::OK, Json(serde_json::json!({ "status": "ok", "store": "in-memory" })));
    };
    if sqlx::query("SELECT 1").fetch_one(pool).await.is_ok() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ok", "store": "postgres" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "degraded", "store": "postgres" })))
    }
}
