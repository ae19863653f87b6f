use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::error::ApiError;
use super::extract::{ApiPath, Ctx};
use super::SharedState;
use crate::export::{self, ExportFile, ExportFormat};

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/export/excel/:id", get(excel_one))
        .route("/api/export/excel-all", get(excel_all))
        .route("/api/export/csv/:id", get(csv_one))
        .route("/api/export/csv-all", get(csv_all))
}

fn download(file: ExportFile) -> impl IntoResponse {
    let headers = [
        (header::CONTENT_TYPE, file.content_type.to_string()),
        (header::CONTENT_DISPOSITION, file.disposition()),
    ];
    (headers, file.body)
}

async fn one(
    state: &SharedState,
    ctx: &Ctx,
    id: Uuid,
    format: ExportFormat,
) -> Result<ExportFile, ApiError> {
    let intake = state.intake.export_one(&ctx.0, id).await?;
    let file = export::export_one(&intake, format)?;
    info!(%id, filename = %file.filename, bytes = file.body.len(), "exported client intake");
    Ok(file)
}

async fn all(
    state: &SharedState,
    ctx: &Ctx,
    format: ExportFormat,
) -> Result<ExportFile, ApiError> {
    let intakes = state.intake.export_all(&ctx.0).await?;
    let file = export::export_all(&intakes, format, Utc::now().date_naive())?;
    info!(count = intakes.len(), filename = %file.filename, "exported all client intakes");
    Ok(file)
}

async fn excel_one(
    State(state): State<SharedState>,
    ctx: Ctx,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(download(one(&state, &ctx, id, ExportFormat::Xlsx).await?))
}

async fn excel_all(
    State(state): State<SharedState>,
    ctx: Ctx,
) -> Result<impl IntoResponse, ApiError> {
    Ok(download(all(&state, &ctx, ExportFormat::Xlsx).await?))
}

async fn csv_one(
    State(state): State<SharedState>,
    ctx: Ctx,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(download(one(&state, &ctx, id, ExportFormat::Csv).await?))
}

async fn csv_all(
    State(state): State<SharedState>,
    ctx: Ctx,
) -> Result<impl IntoResponse, ApiError> {
    Ok(download(all(&state, &ctx, ExportFormat::Csv).await?))
}
