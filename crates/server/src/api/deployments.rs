//! CRUD endpoints for scheduled deployments.
//!
//! A deployment payload is accepted only when every trigger passes
//! structural validation; a rejected payload gets a 400 listing every
//! problem in every offending trigger. Names are unique and immutable, so
//! resources are addressed by name.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use cadence_core::model::{Operation, ScheduledDeployment, Trigger, TriggerSpec};
use cadence_engine::validate_trigger;

use crate::state::AppState;

use super::{conflict, internal_error, not_found, InvalidTriggersResponse, MissingFieldsResponse};

// ── Types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub user: Option<String>,
    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeploymentRequest {
    pub description: Option<String>,
    pub user: Option<String>,
    /// When present, replaces the trigger set wholesale.
    pub triggers: Option<Vec<TriggerSpec>>,
}

#[derive(Debug, Serialize)]
pub struct DeploymentView {
    #[serde(flatten)]
    pub deployment: ScheduledDeployment,
    pub triggers: Vec<Trigger>,
}

#[derive(Debug, Serialize)]
pub struct DeploymentListItem {
    #[serde(flatten)]
    pub deployment: ScheduledDeployment,
    pub trigger_count: usize,
}

// ── Helpers ──────────────────────────────────────────────────────

/// Validate every spec, collecting all problems before rejecting.
fn validate_specs(specs: &[TriggerSpec]) -> Result<(), Response> {
    let errors: Vec<_> = specs
        .iter()
        .filter_map(|spec| validate_trigger(&spec.fields()).err())
        .collect();
    if errors.is_empty() {
        return Ok(());
    }
    Err((
        StatusCode::BAD_REQUEST,
        Json(InvalidTriggersResponse {
            error: "one or more triggers are invalid",
            invalid_triggers: errors,
        }),
    )
        .into_response())
}

/// Convert validated specs into persistable triggers.
fn build_triggers(specs: Vec<TriggerSpec>) -> Result<Vec<Trigger>, Response> {
    specs
        .into_iter()
        .map(|spec| spec.build().map_err(|e| internal_error(e).into_response()))
        .collect()
}

// ── Handlers ─────────────────────────────────────────────────────

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDeploymentRequest>,
) -> Result<(StatusCode, Json<DeploymentView>), Response> {
    // A deployment is rejected unless name, user, description, and at
    // least one trigger are all supplied. All omissions are reported in
    // one response.
    let mut missing = Vec::new();
    if req.name.as_deref().filter(|v| !v.is_empty()).is_none() {
        missing.push("name");
    }
    if req.user.as_deref().filter(|v| !v.is_empty()).is_none() {
        missing.push("user");
    }
    if req.description.as_deref().filter(|v| !v.is_empty()).is_none() {
        missing.push("description");
    }
    if req.triggers.is_empty() {
        missing.push("triggers");
    }
    if !missing.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(MissingFieldsResponse {
                error: "missing required fields",
                missing_fields: missing,
            }),
        )
            .into_response());
    }
    let name = req.name.unwrap_or_default();

    validate_specs(&req.triggers)?;

    if state
        .repo
        .find_deployment(&name)
        .await
        .map_err(|e| internal_error(e).into_response())?
        .is_some()
    {
        return Err(conflict(&name).into_response());
    }

    let triggers = build_triggers(req.triggers)?;
    let deployment = ScheduledDeployment::new(
        name,
        req.description.unwrap_or_default(),
        req.user.unwrap_or_default(),
    );
    state
        .repo
        .insert_deployment(&deployment, &triggers)
        .await
        .map_err(|e| internal_error(e).into_response())?;

    info!(
        deployment = %deployment.name,
        triggers = triggers.len(),
        "scheduled deployment created"
    );
    Ok((
        StatusCode::CREATED,
        Json(DeploymentView {
            deployment,
            triggers,
        }),
    ))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeploymentListItem>>, Response> {
    let deployments = state
        .repo
        .list_deployments()
        .await
        .map_err(|e| internal_error(e).into_response())?;

    let mut items = Vec::with_capacity(deployments.len());
    for deployment in deployments {
        let triggers = state
            .repo
            .list_triggers(deployment.id)
            .await
            .map_err(|e| internal_error(e).into_response())?;
        items.push(DeploymentListItem {
            deployment,
            trigger_count: triggers.len(),
        });
    }
    Ok(Json(items))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DeploymentView>, Response> {
    let deployment = state
        .repo
        .find_deployment(&name)
        .await
        .map_err(|e| internal_error(e).into_response())?
        .ok_or_else(|| not_found(&name).into_response())?;
    let triggers = state
        .repo
        .list_triggers(deployment.id)
        .await
        .map_err(|e| internal_error(e).into_response())?;
    Ok(Json(DeploymentView {
        deployment,
        triggers,
    }))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<UpdateDeploymentRequest>,
) -> Result<Json<DeploymentView>, Response> {
    let mut deployment = state
        .repo
        .find_deployment(&name)
        .await
        .map_err(|e| internal_error(e).into_response())?
        .ok_or_else(|| not_found(&name).into_response())?;

    let triggers = match req.triggers {
        Some(specs) => {
            validate_specs(&specs)?;
            build_triggers(specs)?
        }
        None => state
            .repo
            .list_triggers(deployment.id)
            .await
            .map_err(|e| internal_error(e).into_response())?,
    };

    if let Some(description) = req.description {
        deployment.description = description;
    }
    if let Some(user) = req.user {
        deployment.user = user;
    }

    state
        .repo
        .update_deployment(&deployment, &triggers)
        .await
        .map_err(|e| internal_error(e).into_response())?;

    info!(
        deployment = %deployment.name,
        triggers = triggers.len(),
        "scheduled deployment updated"
    );
    Ok(Json(DeploymentView {
        deployment,
        triggers,
    }))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, Response> {
    let deployment = state
        .repo
        .find_deployment(&name)
        .await
        .map_err(|e| internal_error(e).into_response())?
        .ok_or_else(|| not_found(&name).into_response())?;

    state
        .repo
        .delete_deployment(deployment.id)
        .await
        .map_err(|e| internal_error(e).into_response())?;

    info!(deployment = %name, "scheduled deployment deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn operations(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Operation>>, Response> {
    let deployment = state
        .repo
        .find_deployment(&name)
        .await
        .map_err(|e| internal_error(e).into_response())?
        .ok_or_else(|| not_found(&name).into_response())?;
    let operations = state
        .repo
        .list_operations(deployment.id)
        .await
        .map_err(|e| internal_error(e).into_response())?;
    Ok(Json(operations))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use cadence_store::MemoryRepository;

    use crate::api;
    use crate::state::AppState;

    fn app() -> Router {
        let state = Arc::new(AppState {
            repo: Arc::new(MemoryRepository::new()),
            backend: "memory",
        });
        api::router(state)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn nightly_payload() -> Value {
        json!({
            "name": "nightly",
            "description": "nightly rebuild",
            "user": "alice",
            "triggers": [{
                "name": "rebuild",
                "type": "cron",
                "time": "0 2 * * *",
                "action": "CREATE_OR_UPDATE",
                "config": { "resources": [] }
            }]
        })
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let app = app();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/deployments", nightly_payload()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = read_json(response).await;
        assert_eq!(created["name"], "nightly");
        assert_eq!(created["triggers"][0]["action"], "CREATE_OR_UPDATE");

        let response = app
            .oneshot(get_request("/deployments/nightly"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = read_json(response).await;
        assert_eq!(fetched["user"], "alice");
        assert_eq!(fetched["triggers"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_triggers_get_a_detailed_400() {
        let payload = json!({
            "name": "broken",
            "triggers": [{
                "name": "bad",
                "type": "cron",
                "action": "EXPLODE",
                "import_name": "only-half-a-pair"
            }]
        });

        let response = app()
            .oneshot(json_request("POST", "/deployments", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = read_json(response).await;
        let problem = &body["invalid_triggers"][0];
        assert_eq!(problem["trigger"], "bad");
        assert_eq!(problem["missing_fields"], json!(["time"]));
        assert_eq!(problem["invalid_action"], "EXPLODE");
        assert_eq!(problem["incomplete_import_pair"], true);
    }

    #[tokio::test]
    async fn bare_name_is_not_enough_to_create() {
        let response = app()
            .oneshot(json_request("POST", "/deployments", json!({ "name": "bare" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(
            body["missing_fields"],
            json!(["user", "description", "triggers"])
        );
    }

    #[tokio::test]
    async fn all_missing_parent_fields_reported_together() {
        let response = app()
            .oneshot(json_request("POST", "/deployments", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(
            body["missing_fields"],
            json!(["name", "user", "description", "triggers"])
        );
    }

    #[tokio::test]
    async fn empty_trigger_set_is_rejected() {
        let mut payload = nightly_payload();
        payload["triggers"] = json!([]);
        let response = app()
            .oneshot(json_request("POST", "/deployments", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["missing_fields"], json!(["triggers"]));
    }

    #[tokio::test]
    async fn duplicate_name_returns_conflict() {
        let app = app();
        let response = app
            .clone()
            .oneshot(json_request("POST", "/deployments", nightly_payload()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(json_request("POST", "/deployments", nightly_payload()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_deployment_is_404() {
        let app = app();
        for request in [
            get_request("/deployments/ghost"),
            get_request("/deployments/ghost/operations"),
            Request::builder()
                .method("DELETE")
                .uri("/deployments/ghost")
                .body(Body::empty())
                .unwrap(),
        ] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn update_replaces_trigger_set() {
        let app = app();
        app.clone()
            .oneshot(json_request("POST", "/deployments", nightly_payload()))
            .await
            .unwrap();

        let update = json!({
            "description": "teardown only",
            "triggers": [{
                "name": "teardown",
                "type": "cron",
                "time": "0 20 * * 5",
                "action": "DELETE"
            }]
        });
        let response = app
            .clone()
            .oneshot(json_request("PUT", "/deployments/nightly", update))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated = read_json(response).await;
        assert_eq!(updated["description"], "teardown only");
        let triggers = updated["triggers"].as_array().unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0]["name"], "teardown");

        // List shows one deployment with the replaced trigger count.
        let response = app.oneshot(get_request("/deployments")).await.unwrap();
        let listed = read_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["trigger_count"], 1);
    }

    #[tokio::test]
    async fn delete_removes_the_deployment() {
        let app = app();
        app.clone()
            .oneshot(json_request("POST", "/deployments", nightly_payload()))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/deployments/nightly")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get_request("/deployments/nightly"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn operations_start_empty() {
        let app = app();
        app.clone()
            .oneshot(json_request("POST", "/deployments", nightly_payload()))
            .await
            .unwrap();

        let response = app
            .oneshot(get_request("/deployments/nightly/operations"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn health_reports_backend() {
        let response = app().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["backend"], "memory");
    }
}
