use axum::extract::State;
use axum::response::IntoResponse;
use serde::Deserialize;

use super::error::ApiError;
use super::extract::{ApiJson, Ctx};
use super::{ok, SharedState};

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    username: String,
    password: String,
}

pub(super) async fn login(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .auth
        .login(&ctx, &request.username, &request.password)
        .await?;
    Ok(ok(result))
}

pub(super) async fn me(Ctx(ctx): Ctx) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(ctx.require_actor()?.clone()))
}
