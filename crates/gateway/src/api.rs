//! The /v1 REST API: directive intake, queue processing, draft review,
//! and execution.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use ridgeline_core::draft::{Action, Directive, Draft, DraftPatch, DraftStatus};
use ridgeline_core::error::{ExecuteError, StoreError};
use ridgeline_dispatch::DispatchError;

use crate::SharedState;

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/directives", post(submit_directives))
        .route("/directives/process", post(process_queue))
        .route("/drafts", get(list_drafts))
        .route(
            "/drafts/{id}",
            get(get_draft).patch(edit_draft).delete(discard_draft),
        )
        .route("/drafts/{id}/mark-sent", post(mark_sent))
        .route("/drafts/{id}/execute", post(execute_draft))
        .with_state(state)
}

// --- Error mapping ---

/// API-level error: a status code plus a message body.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::Storage(_) | StoreError::MigrationFailed(_) => {
                error!(%err, "Storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<ExecuteError> for ApiError {
    fn from(err: ExecuteError) -> Self {
        let status = match &err {
            ExecuteError::DraftNotFound(_) => StatusCode::NOT_FOUND,
            ExecuteError::NotPending { .. } => StatusCode::CONFLICT,
            ExecuteError::MissingAction(_)
            | ExecuteError::MissingTask(_)
            | ExecuteError::UnresolvedStage(_)
            | ExecuteError::UnresolvedAppointmentType(_)
            | ExecuteError::NotDeliverable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ExecuteError::Store(store) => return Self::from_store_ref(store),
        };
        Self::new(status, err.to_string())
    }
}

impl ApiError {
    fn from_store_ref(err: &StoreError) -> Self {
        let status = match err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::EmptyBatch | DispatchError::BatchTooLarge { .. } => {
                Self::bad_request(err.to_string())
            }
            DispatchError::Store(store) => store.into(),
        }
    }
}

// --- DTOs ---

#[derive(Deserialize)]
pub struct SubmitDirectivesRequest {
    pub directives: Vec<Directive>,
    /// Kick off a queue pass in the background after intake. Defaults to
    /// true; set false to queue only (e.g. to batch several submissions).
    #[serde(default = "default_process")]
    pub process: bool,
}

fn default_process() -> bool {
    true
}

#[derive(Serialize)]
pub struct SubmitDirectivesResponse {
    pub queued: usize,
    pub skipped: usize,
    pub draft_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct ProcessResponse {
    pub processed: usize,
    pub composed: usize,
    pub failed: usize,
}

#[derive(Deserialize)]
pub struct ListDraftsQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct EditDraftRequest {
    pub body: Option<String>,
    pub subject: Option<String>,
    pub channel: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ExecuteRequest {
    /// Reviewer-supplied replacement for the stored action payload
    pub action: Option<Action>,
}

// --- Handlers ---

async fn submit_directives(
    State(state): State<SharedState>,
    Json(payload): Json<SubmitDirectivesRequest>,
) -> Result<(StatusCode, Json<SubmitDirectivesResponse>), ApiError> {
    let report = state
        .dispatcher
        .enqueue(&state.org, payload.directives)
        .await?;

    let draft_ids = report.drafts.iter().map(|d| d.id.clone()).collect();
    let queued = report.drafts.len();

    if payload.process && queued > 0 {
        let dispatcher = state.dispatcher.clone();
        let org = state.org.clone();
        tokio::spawn(async move {
            if let Err(err) = dispatcher.process_queue(&org).await {
                error!(%err, "Background queue pass failed");
            }
        });
    }

    info!(queued, skipped = report.skipped, "Directives accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitDirectivesResponse {
            queued,
            skipped: report.skipped,
            draft_ids,
        }),
    ))
}

async fn process_queue(
    State(state): State<SharedState>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let report = state.dispatcher.process_queue(&state.org).await?;
    Ok(Json(ProcessResponse {
        processed: report.processed,
        composed: report.composed,
        failed: report.failed,
    }))
}

async fn list_drafts(
    State(state): State<SharedState>,
    Query(query): Query<ListDraftsQuery>,
) -> Result<Json<Vec<Draft>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(s) => Some(
            DraftStatus::parse(s)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status '{s}'")))?,
        ),
        None => None,
    };
    let drafts = state.drafts.list(&state.org.org_id, status).await?;
    Ok(Json(drafts))
}

async fn get_draft(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Draft>, ApiError> {
    let draft = state
        .drafts
        .get(&state.org.org_id, &id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("draft {id} not found")))?;
    Ok(Json(draft))
}

async fn edit_draft(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<EditDraftRequest>,
) -> Result<Json<Draft>, ApiError> {
    let status = match payload.status.as_deref() {
        Some(s) => Some(
            DraftStatus::parse(s)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status '{s}'")))?,
        ),
        None => None,
    };
    let patch = DraftPatch {
        body: payload.body,
        subject: payload.subject,
        channel: payload.channel,
        status,
    };
    let draft = state.drafts.patch(&state.org.org_id, &id, patch).await?;
    Ok(Json(draft))
}

async fn discard_draft(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.drafts.delete(&state.org.org_id, &id).await?;
    info!(draft_id = %id, "Draft discarded");
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_sent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Draft>, ApiError> {
    let draft = state.executor.mark_sent(&state.org, &id).await?;
    Ok(Json(draft))
}

async fn execute_draft(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Option<Json<ExecuteRequest>>,
) -> Result<Json<Draft>, ApiError> {
    let action = payload.and_then(|Json(req)| req.action);
    let draft = state.executor.execute(&state.org, &id, action).await?;
    Ok(Json(draft))
}

// --- Test support ---


#[cfg(test)]
mod tests {
    use super::test_support::test_state;
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::build_router;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn submit_then_process_then_review() {
        let state = test_state(None);
        let app = build_router(state.clone());

        // Queue without the background pass so the test drives processing
        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/directives",
                serde_json::json!({
                    "directives": [
                        {"contact_id": "c1", "task_id": "t1", "text": "note that he called"}
                    ],
                    "process": false
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["queued"], 1);
        let draft_id = body["draft_ids"][0].as_str().unwrap().to_string();

        // Process the queue synchronously
        let response = app
            .clone()
            .oneshot(post_json("/v1/directives/process", serde_json::json!({})))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["processed"], 1);
        assert_eq!(body["composed"], 1);

        // The draft is now pending with the composed note
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/drafts/{draft_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "pending");
        assert_eq!(body["draft_type"], "message");
    }

    #[tokio::test]
    async fn empty_batch_is_bad_request() {
        let app = build_router(test_state(None));
        let response = app
            .oneshot(post_json(
                "/v1/directives",
                serde_json::json!({ "directives": [] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_rejects_unknown_status() {
        let app = build_router(test_state(None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/drafts?status=bogus")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_draft_is_not_found() {
        let app = build_router(test_state(None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/drafts/no-such-draft")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn patch_edits_a_pending_draft() {
        let state = test_state(None);
        let app = build_router(state.clone());

        app.clone()
            .oneshot(post_json(
                "/v1/directives",
                serde_json::json!({
                    "directives": [{"contact_id": "c1", "text": "note something"}],
                    "process": false
                }),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(post_json("/v1/directives/process", serde_json::json!({})))
            .await
            .unwrap();

        let drafts = state.drafts.list("org-test", None).await.unwrap();
        let id = drafts[0].id.clone();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/v1/drafts/{id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({ "body": "edited by reviewer" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["body"], "edited by reviewer");
    }

    #[tokio::test]
    async fn execute_conflicts_on_second_call() {
        let state = test_state(None);
        let app = build_router(state.clone());

        app.clone()
            .oneshot(post_json(
                "/v1/directives",
                serde_json::json!({
                    "directives": [{"contact_id": "c1", "text": "note it"}],
                    "process": false
                }),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(post_json("/v1/directives/process", serde_json::json!({})))
            .await
            .unwrap();
        let drafts = state.drafts.list("org-test", None).await.unwrap();
        let id = drafts[0].id.clone();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/v1/drafts/{id}/execute"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "sent");

        let response = app
            .oneshot(post_json(
                &format!("/v1/drafts/{id}/execute"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn mark_sent_finishes_a_pending_draft() {
        let state = test_state(None);
        let app = build_router(state.clone());

        app.clone()
            .oneshot(post_json(
                "/v1/directives",
                serde_json::json!({
                    "directives": [{"contact_id": "c1", "text": "note it"}],
                    "process": false
                }),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(post_json("/v1/directives/process", serde_json::json!({})))
            .await
            .unwrap();
        let drafts = state.drafts.list("org-test", None).await.unwrap();
        let id = drafts[0].id.clone();

        let response = app
            .oneshot(post_json(
                &format!("/v1/drafts/{id}/mark-sent"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "sent");
    }

    #[tokio::test]
    async fn discard_removes_a_pending_draft() {
        let state = test_state(None);
        let app = build_router(state.clone());

        app.clone()
            .oneshot(post_json(
                "/v1/directives",
                serde_json::json!({
                    "directives": [{"contact_id": "c1", "text": "text her the update"}],
                    "process": false
                }),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(post_json("/v1/directives/process", serde_json::json!({})))
            .await
            .unwrap();
        let drafts = state.drafts.list("org-test", None).await.unwrap();
        let id = drafts[0].id.clone();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/v1/drafts/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/drafts/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn discard_conflicts_on_a_sent_draft() {
        let state = test_state(None);
        let app = build_router(state.clone());

        app.clone()
            .oneshot(post_json(
                "/v1/directives",
                serde_json::json!({
                    "directives": [{"contact_id": "c1", "text": "text her the update"}],
                    "process": false
                }),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(post_json("/v1/directives/process", serde_json::json!({})))
            .await
            .unwrap();
        let drafts = state.drafts.list("org-test", None).await.unwrap();
        let id = drafts[0].id.clone();
        app.clone()
            .oneshot(post_json(
                &format!("/v1/drafts/{id}/mark-sent"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/v1/drafts/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
