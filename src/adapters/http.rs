//! HTTP boundary for the review engine.
//!
//! Identifiers arrive as strings and are parsed here, so a malformed UUID is a
//! 400 before the engine is touched. Bodies and query strings that fail to
//! deserialize get the same error envelope. Engine errors map to statuses by kind.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::core::lifecycle::ReviewEngine;
use crate::domain::model::{
    PullRequestId, PullRequestView, ReviewSummary, TeamMember, TeamView, UserId, UserView,
};
use crate::domain::ports::Directory;
use crate::utils::error::{AssignError, ErrorKind};

type SharedEngine<D> = Arc<ReviewEngine<D>>;

// ── Error handling ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Wrapper to make engine errors and request validation failures usable as
/// axum responses.
#[derive(Debug)]
pub enum ApiError {
    Engine(AssignError),
    BadRequest { field: &'static str, value: String },
    Malformed { message: String },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } | ApiError::Malformed { .. } => StatusCode::BAD_REQUEST,
            ApiError::Engine(err) => match err.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict | ErrorKind::ResourceExhausted => StatusCode::CONFLICT,
                ErrorKind::InvalidState => StatusCode::BAD_REQUEST,
                ErrorKind::Configuration | ErrorKind::Unexpected => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl From<AssignError> for ApiError {
    fn from(err: AssignError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed {
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Malformed {
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self {
            ApiError::BadRequest { field, value } => (
                "INVALID_INPUT",
                format!("{field} is not a valid identifier: '{value}'"),
            ),
            ApiError::Malformed { message } => ("INVALID_INPUT", message.clone()),
            ApiError::Engine(err) => {
                if status.is_server_error() {
                    tracing::error!(
                        error = %err,
                        code = err.code(),
                        suggestion = err.recovery_suggestion(),
                        "Request failed"
                    );
                }
                (err.code(), err.user_friendly_message())
            }
        };

        (
            status,
            Json(ErrorBody {
                error: ErrorDetail {
                    code: code.to_string(),
                    message,
                },
            }),
        )
            .into_response()
    }
}

fn parse_id<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ApiError> {
    value.parse().map_err(|_| ApiError::BadRequest {
        field,
        value: value.to_string(),
    })
}

/// `Json` whose rejection is an [`ApiError`].
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// `Query` whose rejection is an [`ApiError`].
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TeamMemberRequest {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddTeamRequest {
    pub team_name: String,
    #[serde(default)]
    pub members: Vec<TeamMemberRequest>,
}

#[derive(Debug, Deserialize)]
pub struct TeamQuery {
    pub team_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub user_id: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePullRequestRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub pull_request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub pull_request_id: String,
    pub old_user_id: String,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub team: TeamView,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserView,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullRequestBody {
    pub pull_request_id: PullRequestId,
    pub pull_request_name: String,
    pub author_id: UserId,
    pub status: String,
    pub assigned_reviewers: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl From<PullRequestView> for PullRequestBody {
    fn from(view: PullRequestView) -> Self {
        let pr = view.pull_request;
        Self {
            pull_request_id: pr.id,
            pull_request_name: pr.title,
            author_id: pr.author_id,
            status: view.status,
            assigned_reviewers: pr.reviewers,
            created_at: pr.created_at,
            merged_at: pr.merged_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PullRequestResponse {
    pub pr: PullRequestBody,
}

#[derive(Debug, Serialize)]
pub struct ReassignResponse {
    pub pr: PullRequestBody,
    pub replaced_by: UserId,
}

#[derive(Debug, Serialize)]
pub struct ReviewShort {
    pub pull_request_id: PullRequestId,
    pub pull_request_name: String,
    pub author_id: UserId,
    pub status: String,
}

impl From<ReviewSummary> for ReviewShort {
    fn from(summary: ReviewSummary) -> Self {
        Self {
            pull_request_id: summary.pull_request_id,
            pull_request_name: summary.title,
            author_id: summary.author_id,
            status: summary.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewListResponse {
    pub user_id: UserId,
    pub pull_requests: Vec<ReviewShort>,
}

// ── Routes ───────────────────────────────────────────────────────────────────

pub fn router<D: Directory + 'static>(engine: SharedEngine<D>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/team/add", post(add_team::<D>))
        .route("/team/get", get(get_team::<D>))
        .route("/users/setIsActive", post(set_is_active::<D>))
        .route("/users/getReview", get(get_review::<D>))
        .route("/pullRequest/create", post(create_pull_request::<D>))
        .route("/pullRequest/merge", post(merge_pull_request::<D>))
        .route("/pullRequest/reassign", post(reassign_reviewer::<D>))
        .with_state(engine)
}

/// Serves the API on `bind_addr` until Ctrl-C.
pub async fn run_server<D: Directory + 'static>(
    bind_addr: &str,
    engine: SharedEngine<D>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Review API listening");
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections");
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn add_team<D: Directory + 'static>(
    State(engine): State<SharedEngine<D>>,
    ApiJson(request): ApiJson<AddTeamRequest>,
) -> Result<(StatusCode, Json<TeamResponse>), ApiError> {
    let mut members = Vec::with_capacity(request.members.len());
    for member in request.members {
        members.push(TeamMember {
            user_id: parse_id("user_id", &member.user_id)?,
            username: member.username,
            is_active: member.is_active,
        });
    }

    let team = engine.upsert_team(&request.team_name, members).await?;
    Ok((StatusCode::CREATED, Json(TeamResponse { team })))
}

async fn get_team<D: Directory + 'static>(
    State(engine): State<SharedEngine<D>>,
    ApiQuery(query): ApiQuery<TeamQuery>,
) -> Result<Json<TeamView>, ApiError> {
    Ok(Json(engine.get_team(&query.team_name).await?))
}

async fn set_is_active<D: Directory + 'static>(
    State(engine): State<SharedEngine<D>>,
    ApiJson(request): ApiJson<SetActiveRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id: UserId = parse_id("user_id", &request.user_id)?;
    let user = engine.set_user_active(user_id, request.is_active).await?;
    Ok(Json(UserResponse { user }))
}

async fn get_review<D: Directory + 'static>(
    State(engine): State<SharedEngine<D>>,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<Json<ReviewListResponse>, ApiError> {
    let user_id: UserId = parse_id("user_id", &query.user_id)?;
    let pull_requests = engine
        .find_by_reviewer(user_id)
        .await?
        .into_iter()
        .map(ReviewShort::from)
        .collect();
    Ok(Json(ReviewListResponse {
        user_id,
        pull_requests,
    }))
}

async fn create_pull_request<D: Directory + 'static>(
    State(engine): State<SharedEngine<D>>,
    ApiJson(request): ApiJson<CreatePullRequestRequest>,
) -> Result<(StatusCode, Json<PullRequestResponse>), ApiError> {
    let pr_id: PullRequestId = parse_id("pull_request_id", &request.pull_request_id)?;
    let author_id: UserId = parse_id("author_id", &request.author_id)?;
    let view = engine
        .create_pull_request(pr_id, &request.pull_request_name, author_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PullRequestResponse { pr: view.into() }),
    ))
}

async fn merge_pull_request<D: Directory + 'static>(
    State(engine): State<SharedEngine<D>>,
    ApiJson(request): ApiJson<MergeRequest>,
) -> Result<Json<PullRequestResponse>, ApiError> {
    let pr_id: PullRequestId = parse_id("pull_request_id", &request.pull_request_id)?;
    let view = engine.mark_merged(pr_id).await?;
    Ok(Json(PullRequestResponse { pr: view.into() }))
}

async fn reassign_reviewer<D: Directory + 'static>(
    State(engine): State<SharedEngine<D>>,
    ApiJson(request): ApiJson<ReassignRequest>,
) -> Result<Json<ReassignResponse>, ApiError> {
    let pr_id: PullRequestId = parse_id("pull_request_id", &request.pull_request_id)?;
    let old_user_id: UserId = parse_id("old_user_id", &request.old_user_id)?;
    let reassignment = engine.reassign_reviewer(old_user_id, pr_id).await?;
    Ok(Json(ReassignResponse {
        pr: reassignment.pull_request.into(),
        replaced_by: reassignment.replaced_by,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::StoreError;

    #[test]
    fn test_status_mapping_by_kind() {
        let user_id = UserId::new_v4();
        let pr_id = PullRequestId::new_v4();

        let cases = [
            (AssignError::PullRequestNotFound { pr_id }, StatusCode::NOT_FOUND),
            (AssignError::PrAlreadyMerged { pr_id }, StatusCode::CONFLICT),
            (
                AssignError::NoReviewCandidates {
                    team: "backend".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (AssignError::UserNotReviewer { user_id, pr_id }, StatusCode::BAD_REQUEST),
            (
                AssignError::store("load")(StoreError::Backend {
                    message: "down".to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_malformed_input_is_bad_request() {
        let err = ApiError::Malformed {
            message: "missing field `team_name`".to_string(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        let err = parse_id::<UserId>("user_id", "nope").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
