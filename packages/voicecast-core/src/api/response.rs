//! HTTP response helper functions for consistent API responses.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

/// Standard API success response with JSON data.
pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// `202 Accepted` with `{ "accepted": true }`.
pub fn api_accepted() -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(json!({ "accepted": true })))
}
