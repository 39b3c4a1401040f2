//! Domain records, request/response DTOs and the application error type.
//!
//! Wire names follow the public API (`nombre`, `apellido`, `status`, `fullName`)
//! while the Rust side uses descriptive field names.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted user record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(rename = "nombre")]
    pub first_name: String,
    #[serde(rename = "apellido")]
    pub last_name: String,
    /// Bcrypt digest; never leaves the process.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_active: bool,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn validate_email(email: &str) -> Result<(), AppError> {
        let ok_len = (3..=254).contains(&email.len());
        let well_formed = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
        if ok_len && well_formed && !email.chars().any(char::is_whitespace) {
            Ok(())
        } else {
            Err(AppError::Validation("invalid email format".into()))
        }
    }

    /// Given and family names must be between 3 and 20 characters.
    pub fn validate_name(field: &str, value: &str) -> Result<(), AppError> {
        let len = value.chars().count();
        if (3..=20).contains(&len) {
            Ok(())
        } else {
            Err(AppError::Validation(format!("{field} must be between 3 and 20 characters")))
        }
    }

    /// Enforces password policy: >=8 chars with at least one uppercase letter,
    /// one lowercase letter and one digit.
    pub fn validate_password_policy(password: &str) -> Result<(), AppError> {
        if password.chars().count() < 8 {
            return Err(AppError::Validation("password too short (min 8)".into()));
        }
        let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        if has_upper && has_lower && has_digit {
            Ok(())
        } else {
            Err(AppError::Validation(
                "password must include an uppercase letter, a lowercase letter and a number".into(),
            ))
        }
    }
}

/// Insert command for a user; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

/// Persisted debt record, always owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Debt {
    pub id: i64,
    pub description: String,
    pub value: f64,
    pub date: NaiveDate,
    pub paid: bool,
    pub user_id: i64,
}

impl Debt {
    pub fn validate_description(description: &str) -> Result<(), AppError> {
        if description.trim().is_empty() {
            return Err(AppError::Validation("description must not be empty".into()));
        }
        Ok(())
    }

    pub fn validate_value(value: f64) -> Result<(), AppError> {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(AppError::Validation("value must be a non-negative number".into()))
        }
    }
}

/// Insert command for a debt. New debts always start unpaid.
#[derive(Debug, Clone)]
pub struct NewDebt {
    pub description: String,
    pub value: f64,
    pub date: NaiveDate,
    pub user_id: i64,
}

/// A debt joined with the owner's public identity.
#[derive(Debug, Clone)]
pub struct DebtWithOwner {
    pub debt: Debt,
    pub owner_first_name: String,
    pub owner_last_name: String,
    pub owner_email: String,
}

/// Application-wide error type. Every variant has a stable `kind` and an HTTP status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("user with id {0} not found")]
    UserNotFound(i64),
    #[error("debt with id {0} not found")]
    DebtNotFound(i64),
    #[error("email {0} is already registered")]
    DuplicateEmail(String),
    #[error("incorrect email or password")]
    InvalidCredentials,
    #[error("inactive user, contact the administrator")]
    AccountInactive,
    #[error("invalid token")]
    InvalidToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("upstream service timed out")]
    UpstreamTimeout,
    #[error("upstream error: {detail}")]
    Upstream { status: StatusCode, detail: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("jwt error: {0}")]
    Jwt(String),
    #[error("password error: {0}")]
    Bcrypt(String),
    #[error("repository error: {0}")]
    Repo(String),
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::UserNotFound(_) => "user_not_found",
            AppError::DebtNotFound(_) => "debt_not_found",
            AppError::DuplicateEmail(_) => "duplicate_email",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::AccountInactive => "account_inactive",
            AppError::InvalidToken => "invalid_token",
            AppError::ExpiredToken => "expired_token",
            AppError::UpstreamTimeout => "upstream_timeout",
            AppError::Upstream { .. } => "upstream_error",
            AppError::Config(_)
            | AppError::Jwt(_)
            | AppError::Bcrypt(_)
            | AppError::Repo(_)
            | AppError::Unknown(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) | AppError::UserNotFound(_) | AppError::DebtNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::DuplicateEmail(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::InvalidToken | AppError::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AccountInactive => StatusCode::FORBIDDEN,
            AppError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream { status, .. } => *status,
            AppError::Config(_)
            | AppError::Jwt(_)
            | AppError::Bcrypt(_)
            | AppError::Repo(_)
            | AppError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for every "entity id absent" flavour.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_) | AppError::UserNotFound(_) | AppError::DebtNotFound(_))
    }

    fn is_internal(&self) -> bool {
        self.kind() == "internal_error"
    }

    /// Failures of our own bearer auth; a forwarded upstream 401 is not one.
    fn is_auth_failure(&self) -> bool {
        matches!(self, AppError::InvalidCredentials | AppError::InvalidToken | AppError::ExpiredToken)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = if self.is_internal() {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = serde_json::json!({ "kind": self.kind(), "error": detail });
        let mut response = (status, axum::Json(body)).into_response();
        if self.is_auth_failure() {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self { AppError::Bcrypt(e.to_string()) }
}
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self { AppError::Jwt(e.to_string()) }
}
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self { AppError::Repo(e.to_string()) }
}
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self { AppError::Config(e.to_string()) }
}
impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::UpstreamTimeout
        } else {
            AppError::Upstream { status: StatusCode::BAD_GATEWAY, detail: e.to_string() }
        }
    }
}
impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self { AppError::Unknown(e.to_string()) }
}

// Extractor rejections are malformed input, reported like any other validation failure.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self { AppError::Validation(rejection.body_text()) }
}
impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self { AppError::Validation(rejection.body_text()) }
}
impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self { AppError::Validation(rejection.body_text()) }
}

// Requests and responses

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(rename = "nombre")]
    pub first_name: String,
    #[serde(rename = "apellido")]
    pub last_name: String,
    pub password: String,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        User::validate_email(&self.email)?;
        User::validate_name("nombre", &self.first_name)?;
        User::validate_name("apellido", &self.last_name)?;
        User::validate_password_policy(&self.password)
    }
}

/// Partial user update. `None` means "leave untouched"; `Some(false)` is applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "nombre", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "apellido", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl UpdateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(email) = &self.email {
            User::validate_email(email)?;
        }
        if let Some(first_name) = &self.first_name {
            User::validate_name("nombre", first_name)?;
        }
        if let Some(last_name) = &self.last_name {
            User::validate_name("apellido", last_name)?;
        }
        Ok(())
    }

    pub fn apply_to(self, user: &mut User) {
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    #[serde(rename = "nombre")]
    pub first_name: String,
    #[serde(rename = "apellido")]
    pub last_name: String,
    pub is_active: bool,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self { id: u.id, email: u.email, first_name: u.first_name, last_name: u.last_name, is_active: u.is_active }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNameResponse {
    #[serde(rename = "fullName")]
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatusResponse {
    pub id: i64,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub is_active: bool,
}

impl From<User> for UserStatusResponse {
    fn from(u: User) -> Self {
        Self { id: u.id, full_name: u.full_name(), is_active: u.is_active }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDebtRequest {
    pub description: String,
    pub value: f64,
    pub date: NaiveDate,
    pub user_id: i64,
}

impl CreateDebtRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        Debt::validate_description(&self.description)?;
        Debt::validate_value(self.value)
    }
}

impl From<CreateDebtRequest> for NewDebt {
    fn from(r: CreateDebtRequest) -> Self {
        Self { description: r.description, value: r.value, date: r.date, user_id: r.user_id }
    }
}

/// Partial debt update with the same absent/present semantics as [`UpdateUserRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDebtRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(rename = "status", skip_serializing_if = "Option::is_none")]
    pub paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl UpdateDebtRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(description) = &self.description {
            Debt::validate_description(description)?;
        }
        if let Some(value) = self.value {
            Debt::validate_value(value)?;
        }
        Ok(())
    }

    pub fn apply_to(self, debt: &mut Debt) {
        if let Some(description) = self.description {
            debt.description = description;
        }
        if let Some(value) = self.value {
            debt.value = value;
        }
        if let Some(date) = self.date {
            debt.date = date;
        }
        if let Some(paid) = self.paid {
            debt.paid = paid;
        }
        if let Some(user_id) = self.user_id {
            debt.user_id = user_id;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebtResponse {
    pub id: i64,
    pub description: String,
    pub value: f64,
    pub date: NaiveDate,
    pub status: bool,
    pub user_id: i64,
}

impl From<Debt> for DebtResponse {
    fn from(d: Debt) -> Self {
        Self { id: d.id, description: d.description, value: d.value, date: d.date, status: d.paid, user_id: d.user_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtDetailResponse {
    #[serde(flatten)]
    pub debt: DebtResponse,
    pub user_nombre: String,
    pub user_apellido: String,
    pub user_email: String,
}

impl From<DebtWithOwner> for DebtDetailResponse {
    fn from(d: DebtWithOwner) -> Self {
        Self {
            debt: DebtResponse::from(d.debt),
            user_nombre: d.owner_first_name,
            user_apellido: d.owner_last_name,
            user_email: d.owner_email,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// A post as served by the external placeholder API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub id: i64,
    pub title: String,
    pub body: String,
}
