use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use super::error::ApiError;
use super::extract::{ApiJson, ApiPath, Ctx};
use super::params::IntakeListParams;
use super::{done, ok, paged, SharedState};
use crate::models::IntakeSubmission;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/intake", get(list).post(create))
        .route("/api/intake/summary", get(summary))
        .route("/api/intake/:id", get(fetch).put(update).delete(remove))
}

/// Body of `DELETE /api/intake/:id`.
#[derive(Debug, Default, Deserialize)]
struct DeleteRequest {
    #[serde(default)]
    passcode: Option<String>,
}

async fn create(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiJson(submission): ApiJson<IntakeSubmission>,
) -> Result<impl IntoResponse, ApiError> {
    let intake = state.intake.create(&ctx, submission).await?;
    Ok((StatusCode::CREATED, ok(intake)))
}

async fn list(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    Query(params): Query<IntakeListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query(&state.limits)?;
    Ok(paged(state.intake.list(&ctx, &query).await?))
}

async fn summary(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.intake.summary(&ctx).await?))
}

async fn fetch(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.intake.get(&ctx, id).await?))
}

async fn update(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(submission): ApiJson<IntakeSubmission>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.intake.update(&ctx, id, submission).await?))
}

/// The body is read leniently: a missing or malformed body means no
/// passcode, which the service reports after checking authentication.
async fn remove(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: DeleteRequest = serde_json::from_slice(&body).unwrap_or_default();
    state
        .intake
        .soft_delete(&ctx, id, request.passcode.as_deref())
        .await?;
    Ok(done("Client intake deleted"))
}
