//! HR onboarding endpoints: departments, roles and staff members.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use uuid::Uuid;

use super::error::ApiError;
use super::extract::{ApiJson, ApiPath, Ctx};
use super::params::{DepartmentListParams, StaffListParams};
use super::{done, ok, paged, SharedState};
use crate::models::{NewDepartment, NewRole, NewStaff, UpdateDepartment, UpdateRole, UpdateStaff};

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/departments", get(list_departments).post(create_department))
        .route(
            "/api/departments/:id",
            get(get_department)
                .put(update_department)
                .delete(deactivate_department),
        )
        .route("/api/roles", get(list_roles).post(create_role))
        .route(
            "/api/roles/:id",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route("/api/staff", get(list_staff).post(create_staff))
        .route(
            "/api/staff/:id",
            get(get_staff).put(update_staff).delete(deactivate_staff),
        )
        .route(
            "/api/staff/:id/roles/:role_id",
            post(assign_role).delete(unassign_role),
        )
}

// ============================================================================
// Departments
// ============================================================================

async fn create_department(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiJson(input): ApiJson<NewDepartment>,
) -> Result<impl IntoResponse, ApiError> {
    let department = state.staff.create_department(&ctx, input).await?;
    Ok((StatusCode::CREATED, ok(department)))
}

async fn list_departments(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    Query(params): Query<DepartmentListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let include_inactive = params.include_inactive()?;
    Ok(ok(state.staff.list_departments(&ctx, include_inactive).await?))
}

async fn get_department(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.staff.get_department(&ctx, id).await?))
}

async fn update_department(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<UpdateDepartment>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.staff.update_department(&ctx, id, update).await?))
}

async fn deactivate_department(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.staff.deactivate_department(&ctx, id).await?))
}

// ============================================================================
// Roles
// ============================================================================

async fn create_role(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiJson(input): ApiJson<NewRole>,
) -> Result<impl IntoResponse, ApiError> {
    let role = state.staff.create_role(&ctx, input).await?;
    Ok((StatusCode::CREATED, ok(role)))
}

async fn list_roles(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.staff.list_roles(&ctx).await?))
}

async fn get_role(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.staff.get_role(&ctx, id).await?))
}

async fn update_role(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<UpdateRole>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.staff.update_role(&ctx, id, update).await?))
}

async fn delete_role(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.staff.delete_role(&ctx, id).await?;
    Ok(done("Role deleted"))
}

// ============================================================================
// Staff
// ============================================================================

async fn create_staff(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiJson(input): ApiJson<NewStaff>,
) -> Result<impl IntoResponse, ApiError> {
    let staff = state.staff.create_staff(&ctx, input).await?;
    Ok((StatusCode::CREATED, ok(staff)))
}

async fn list_staff(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    Query(params): Query<StaffListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query(&state.limits)?;
    Ok(paged(state.staff.list_staff(&ctx, &query).await?))
}

async fn get_staff(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.staff.get_staff(&ctx, id).await?))
}

async fn update_staff(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<UpdateStaff>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.staff.update_staff(&ctx, id, update).await?))
}

async fn deactivate_staff(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.staff.deactivate_staff(&ctx, id).await?))
}

async fn assign_role(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath((id, role_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.staff.assign_role(&ctx, id, role_id).await?))
}

async fn unassign_role(
    State(state): State<SharedState>,
    Ctx(ctx): Ctx,
    ApiPath((id, role_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.staff.unassign_role(&ctx, id, role_id).await?))
}
