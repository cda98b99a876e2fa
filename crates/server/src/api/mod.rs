//! HTTP endpoint modules and shared response helpers.

mod deployments;
mod health;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use cadence_engine::ValidationError;

use crate::state::AppState;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body of a 400 rejecting a deployment payload; lists every problem in
/// every offending trigger.
#[derive(Debug, Serialize)]
pub struct InvalidTriggersResponse {
    pub error: &'static str,
    pub invalid_triggers: Vec<ValidationError>,
}

/// Body of a 400 rejecting a deployment payload whose top-level fields
/// are incomplete. Lists every missing field, not just the first.
#[derive(Debug, Serialize)]
pub struct MissingFieldsResponse {
    pub error: &'static str,
    pub missing_fields: Vec<&'static str>,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn not_found(name: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("scheduled deployment not found: {}", name),
        }),
    )
}

pub(crate) fn conflict(name: &str) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse {
            error: format!("scheduled deployment already exists: {}", name),
        }),
    )
}

pub(crate) fn internal_error(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ── Router ───────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/deployments",
            get(deployments::list).post(deployments::create),
        )
        .route(
            "/deployments/{name}",
            get(deployments::get_one)
                .put(deployments::update)
                .delete(deployments::delete),
        )
        .route(
            "/deployments/{name}/operations",
            get(deployments::operations),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
