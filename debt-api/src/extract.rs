//! Thin wrappers over axum's `Json`, `Path` and `Query` whose rejections become
//! [`AppError::Validation`], so malformed input gets the same `{"kind","error"}` body as every other failure.

use axum::extract::{FromRequest, FromRequestParts};

use crate::models::AppError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);
