//! Departments, roles and staff onboarding.
//!
//! Reads require an authenticated actor; every mutation requires ADMIN and
//! is audited.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::audit::{AuditEvent, AuditRecorder};
use super::{RequestContext, Result, ServiceError};
use crate::auth::hash_password_off_runtime;
use crate::models::audit::entity;
use crate::models::{
    AuditAction, Department, NewDepartment, NewRole, NewStaff, NewUser, Page, Role, Staff,
    UpdateDepartment, UpdateRole, UpdateStaff, UserRole,
};
use crate::storage::{StaffQuery, StaffStore};
use crate::validation::staff::{
    validate_department, validate_department_update, validate_role, validate_role_update,
    validate_staff, validate_staff_update,
};
use crate::validation::ValidationErrors;

pub mod errmsg {
    pub const DEPARTMENT_UNKNOWN: &str = "department does not exist";
    pub const DEPARTMENT_INACTIVE: &str = "department is inactive";
    pub const ROLE_UNKNOWN: &str = "role does not exist";
}

#[derive(Clone)]
pub struct StaffService {
    store: Arc<dyn StaffStore>,
    audit: AuditRecorder,
}

impl StaffService {
    pub fn new(store: Arc<dyn StaffStore>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    // ------------------------------------------------------------------
    // Departments
    // ------------------------------------------------------------------

    pub async fn create_department(
        &self,
        ctx: &RequestContext,
        input: NewDepartment,
    ) -> Result<Department> {
        ctx.require_admin()?;
        let input = validate_department(input)?;
        let department = self.store.create_department(&input).await?;
        info!(id = %department.id, name = %department.name, "department created");

        self.audit
            .record(
                ctx,
                AuditEvent::new(AuditAction::Create, entity::DEPARTMENT, department.id)
                    .after(&department),
            )
            .await;
        Ok(department)
    }

    pub async fn list_departments(
        &self,
        ctx: &RequestContext,
        include_inactive: bool,
    ) -> Result<Vec<Department>> {
        ctx.require_actor()?;
        Ok(self.store.list_departments(include_inactive).await?)
    }

    pub async fn get_department(&self, ctx: &RequestContext, id: Uuid) -> Result<Department> {
        ctx.require_actor()?;
        self.department(id).await
    }

    pub async fn update_department(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        update: UpdateDepartment,
    ) -> Result<Department> {
        ctx.require_admin()?;
        let update = validate_department_update(update)?;
        self.change_department(ctx, id, &update, AuditAction::Update)
            .await
    }

    /// Soft delete: departments are only ever deactivated.
    pub async fn deactivate_department(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<Department> {
        ctx.require_admin()?;
        let update = UpdateDepartment {
            is_active: Some(false),
            ..UpdateDepartment::default()
        };
        self.change_department(ctx, id, &update, AuditAction::Delete)
            .await
    }

    async fn change_department(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        update: &UpdateDepartment,
        action: AuditAction,
    ) -> Result<Department> {
        let before = self.department(id).await?;
        let after = self
            .store
            .update_department(id, update)
            .await?
            .ok_or_else(|| not_found("department", id))?;

        self.audit
            .record(
                ctx,
                AuditEvent::new(action, entity::DEPARTMENT, id)
                    .before(&before)
                    .after(&after),
            )
            .await;
        Ok(after)
    }

    async fn department(&self, id: Uuid) -> Result<Department> {
        self.store
            .get_department(id)
            .await?
            .ok_or_else(|| not_found("department", id))
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    pub async fn create_role(&self, ctx: &RequestContext, input: NewRole) -> Result<Role> {
        ctx.require_admin()?;
        let input = validate_role(input)?;
        let role = self.store.create_role(&input).await?;
        info!(id = %role.id, name = %role.name, "role created");

        self.audit
            .record(
                ctx,
                AuditEvent::new(AuditAction::Create, entity::ROLE, role.id).after(&role),
            )
            .await;
        Ok(role)
    }

    pub async fn list_roles(&self, ctx: &RequestContext) -> Result<Vec<Role>> {
        ctx.require_actor()?;
        Ok(self.store.list_roles().await?)
    }

    pub async fn get_role(&self, ctx: &RequestContext, id: Uuid) -> Result<Role> {
        ctx.require_actor()?;
        self.role(id).await
    }

    pub async fn update_role(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        update: UpdateRole,
    ) -> Result<Role> {
        ctx.require_admin()?;
        let update = validate_role_update(update)?;
        let before = self.role(id).await?;
        let after = self
            .store
            .update_role(id, &update)
            .await?
            .ok_or_else(|| not_found("role", id))?;

        self.audit
            .record(
                ctx,
                AuditEvent::new(AuditAction::Update, entity::ROLE, id)
                    .before(&before)
                    .after(&after),
            )
            .await;
        Ok(after)
    }

    /// Hard delete; `Conflict` while any staff member holds the role.
    pub async fn delete_role(&self, ctx: &RequestContext, id: Uuid) -> Result<()> {
        ctx.require_admin()?;
        let before = self.role(id).await?;
        if !self.store.delete_role(id).await? {
            return Err(not_found("role", id));
        }
        info!(%id, "role deleted");

        self.audit
            .record(
                ctx,
                AuditEvent::new(AuditAction::Delete, entity::ROLE, id).before(&before),
            )
            .await;
        Ok(())
    }

    async fn role(&self, id: Uuid) -> Result<Role> {
        self.store
            .get_role(id)
            .await?
            .ok_or_else(|| not_found("role", id))
    }

    // ------------------------------------------------------------------
    // Staff
    // ------------------------------------------------------------------

    /// Onboard a staff member with optional roles and login account.
    pub async fn create_staff(&self, ctx: &RequestContext, input: NewStaff) -> Result<Staff> {
        ctx.require_admin()?;
        let input = validate_staff(input)?;

        let mut errors = ValidationErrors::new();
        self.check_department(&mut errors, input.department_id).await?;
        for role_id in &input.role_ids {
            if self.store.get_role(*role_id).await?.is_none() {
                errors.push("roleIds", format!("{}: {}", errmsg::ROLE_UNKNOWN, role_id));
            }
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let account = match &input.account {
            Some(account) => Some(NewUser {
                username: account.username.clone(),
                display_name: format!("{} {}", input.first_name, input.last_name),
                role: account.role.unwrap_or(UserRole::Staff),
                password_hash: hash_password_off_runtime(account.password.clone()).await?,
                staff_id: None,
            }),
            None => None,
        };

        let staff = self.store.create_staff(&input, account).await?;
        info!(
            id = %staff.id,
            account = staff.user.is_some(),
            roles = staff.roles.len(),
            "staff member onboarded"
        );

        self.audit
            .record(
                ctx,
                AuditEvent::new(AuditAction::Create, entity::STAFF, staff.id).after(&staff),
            )
            .await;
        Ok(staff)
    }

    pub async fn get_staff(&self, ctx: &RequestContext, id: Uuid) -> Result<Staff> {
        ctx.require_actor()?;
        self.staff(id).await
    }

    pub async fn list_staff(&self, ctx: &RequestContext, query: &StaffQuery) -> Result<Page<Staff>> {
        ctx.require_actor()?;
        Ok(self.store.list_staff(query).await?)
    }

    pub async fn update_staff(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        update: UpdateStaff,
    ) -> Result<Staff> {
        ctx.require_admin()?;
        let update = validate_staff_update(update)?;
        if let Some(department_id) = update.department_id {
            let mut errors = ValidationErrors::new();
            self.check_department(&mut errors, department_id).await?;
            if !errors.is_empty() {
                return Err(errors.into());
            }
        }
        self.change_staff(ctx, id, &update, AuditAction::Update).await
    }

    pub async fn deactivate_staff(&self, ctx: &RequestContext, id: Uuid) -> Result<Staff> {
        ctx.require_admin()?;
        let update = UpdateStaff {
            is_active: Some(false),
            ..UpdateStaff::default()
        };
        self.change_staff(ctx, id, &update, AuditAction::Delete).await
    }

    pub async fn assign_role(
        &self,
        ctx: &RequestContext,
        staff_id: Uuid,
        role_id: Uuid,
    ) -> Result<Staff> {
        ctx.require_admin()?;
        let before = self.staff(staff_id).await?;
        self.role(role_id).await?;

        self.store.assign_role(staff_id, role_id).await?;
        let after = self.staff(staff_id).await?;
        self.audit
            .record(
                ctx,
                AuditEvent::new(AuditAction::Update, entity::STAFF, staff_id)
                    .before(&before)
                    .after(&after),
            )
            .await;
        Ok(after)
    }

    pub async fn unassign_role(
        &self,
        ctx: &RequestContext,
        staff_id: Uuid,
        role_id: Uuid,
    ) -> Result<Staff> {
        ctx.require_admin()?;
        let before = self.staff(staff_id).await?;
        if !self.store.unassign_role(staff_id, role_id).await? {
            return Err(ServiceError::NotFound(format!(
                "role {} is not assigned to staff member {}",
                role_id, staff_id
            )));
        }

        let after = self.staff(staff_id).await?;
        self.audit
            .record(
                ctx,
                AuditEvent::new(AuditAction::Update, entity::STAFF, staff_id)
                    .before(&before)
                    .after(&after),
            )
            .await;
        Ok(after)
    }

    async fn change_staff(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        update: &UpdateStaff,
        action: AuditAction,
    ) -> Result<Staff> {
        let before = self.staff(id).await?;
        let after = self
            .store
            .update_staff(id, update)
            .await?
            .ok_or_else(|| not_found("staff member", id))?;

        self.audit
            .record(
                ctx,
                AuditEvent::new(action, entity::STAFF, id)
                    .before(&before)
                    .after(&after),
            )
            .await;
        Ok(after)
    }

    async fn staff(&self, id: Uuid) -> Result<Staff> {
        self.store
            .get_staff(id)
            .await?
            .ok_or_else(|| not_found("staff member", id))
    }

    /// New staff may only join an existing, active department.
    async fn check_department(&self, errors: &mut ValidationErrors, id: Uuid) -> Result<()> {
        match self.store.get_department(id).await? {
            None => errors.push("departmentId", errmsg::DEPARTMENT_UNKNOWN),
            Some(d) if !d.is_active => errors.push("departmentId", errmsg::DEPARTMENT_INACTIVE),
            Some(_) => {}
        }
        Ok(())
    }
}

fn not_found(what: &str, id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("{} not found: {}", what, id))
}
