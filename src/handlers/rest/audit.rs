use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use super::error::ApiError;
use super::extract::{ApiPath, Ctx};
use super::params::AuditListParams;
use super::{ok, paged, SharedState};

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/audit/logs", get(logs))
        .route("/api/audit/stats", get(stats))
        .route("/api/audit/entity/:entity_type/:entity_id", get(history))
}

async fn logs(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    Query(params): Query<AuditListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query(&state.limits)?;
    Ok(paged(state.audit.query(&ctx, &query).await?))
}

async fn stats(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.audit.stats(&ctx).await?))
}

async fn history(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath((entity_type, entity_id)): ApiPath<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.audit.history(&ctx, &entity_type, &entity_id).await?))
}
