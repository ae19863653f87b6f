//! JSON REST API.
//!
//! Endpoints:
//! - `GET /health` liveness check, no auth
//! - `POST /api/auth/login`, `GET /api/auth/me`
//! - `/api/intake` create, list, summary, get, update, soft delete
//! - `/api/export/{excel,csv}/:id` and `/api/export/{excel,csv}-all`
//! - `/api/audit/logs`, `/api/audit/stats`, `/api/audit/entity/:entityType/:entityId`
//! - `/api/departments`, `/api/roles`, `/api/staff` (HR onboarding)
//!
//! Successful responses use the `{success, data[, pagination]}` envelope.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method, StatusCode};
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::TokenKeys;
use crate::config::{Config, LimitsConfig, ServerConfig};
use crate::models::{Page, Pagination};
use crate::services::{AuditRecorder, AuditService, AuthService, IntakeService, StaffService};
use crate::storage::{SqliteAuditStore, SqliteIntakeStore, SqliteStaffStore};

pub mod error;
pub mod extract;

mod audit;
mod auth;
mod export;
mod intake;
mod params;
mod staff;

#[cfg(test)]
mod tests;

pub use error::{ApiError, InternalDetail};

/// Shared state for axum handlers.
pub type SharedState = Arc<AppState>;

/// Services and request-shaping settings shared by every handler.
pub struct AppState {
    pub intake: IntakeService,
    pub audit: AuditService,
    pub staff: StaffService,
    pub auth: AuthService,
    pub limits: LimitsConfig,
}

impl AppState {
    /// Wire the SQLite stores on `pool` into the services.
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        let audit_store = Arc::new(SqliteAuditStore::new(pool.clone()));
        let staff_store = Arc::new(SqliteStaffStore::new(pool.clone()));
        let recorder = AuditRecorder::new(audit_store.clone());

        Self {
            intake: IntakeService::new(
                Arc::new(SqliteIntakeStore::new(pool)),
                recorder.clone(),
                config.auth.delete_passcode(),
            ),
            audit: AuditService::new(audit_store),
            staff: StaffService::new(staff_store.clone(), recorder.clone()),
            auth: AuthService::new(staff_store, TokenKeys::from_config(&config.auth), recorder),
            limits: config.limits.clone(),
        }
    }
}

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

pub(crate) fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
        pagination: None,
    })
}

pub(crate) fn paged<T: Serialize>(page: Page<T>) -> Json<Envelope<Vec<T>>> {
    Json(Envelope {
        success: true,
        data: page.items,
        pagination: Some(page.pagination),
    })
}

pub(crate) fn done(message: &str) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "message": message }))
}

/// Build the axum router (separated for testing).
///
/// Outside production, 500 responses carry the failure detail.
pub fn router(state: SharedState, server: &ServerConfig, production: bool) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION]);

    let api = Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .merge(intake::routes())
        .merge(export::routes())
        .merge(audit::routes())
        .merge(staff::routes())
        .with_state(state);

    let api = if production {
        api
    } else {
        api.layer(map_response(expose_internal_detail))
    };

    api.layer(RequestBodyLimitLayer::new(server.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn expose_internal_detail(mut response: Response) -> Response {
    match response.extensions_mut().remove::<InternalDetail>() {
        Some(InternalDetail(detail)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "message": error::INTERNAL_MESSAGE,
                "detail": detail,
            })),
        )
            .into_response(),
        None => response,
    }
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "clientdesk REST API listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}
