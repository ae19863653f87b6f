//! SQLite StaffStore and UserStore implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use sea_query::{
    Asterisk, Cond, Expr, Func, LikeExpr, OnConflict, Order, Query, SimpleExpr,
    SqliteQueryBuilder,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{
    begin_immediate, contains_pattern, fold_case, format_timestamp, get_count, get_enum,
    get_opt_date, get_opt_uuid, get_timestamp, get_uuid, now, LIKE_ESCAPE,
};
use crate::models::{
    Department, NewDepartment, NewRole, NewStaff, NewUser, Page, Pagination, Role, Staff,
    UpdateDepartment, UpdateRole, UpdateStaff, User, UserRole,
};
use crate::storage::schema::{Departments, Roles, StaffMembers, StaffRoles, Users};
use crate::storage::{Result, StaffQuery, StaffStore, StoreError, UserStore};

/// SQLite-backed store for departments, roles, staff and user accounts.
pub struct SqliteStaffStore {
    pool: SqlitePool,
}

/// Blank replacement text clears an optional column.
fn optional_text(value: &Option<String>) -> SimpleExpr {
    value.clone().filter(|v| !v.is_empty()).into()
}

impl SqliteStaffStore {
    /// Create a new SQLite staff store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn department_from_row(row: &SqliteRow) -> Result<Department> {
        Ok(Department {
            id: get_uuid(row, "id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }

    fn role_from_row(row: &SqliteRow) -> Result<Role> {
        Ok(Role {
            id: get_uuid(row, "id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }

    fn user_from_row(row: &SqliteRow) -> Result<User> {
        Ok(User {
            id: get_uuid(row, "id")?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            role: get_enum(row, "role", UserRole::parse)?,
            password_hash: row.try_get("password_hash")?,
            staff_id: get_opt_uuid(row, "staff_id")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }

    fn staff_from_row(row: &SqliteRow) -> Result<Staff> {
        Ok(Staff {
            id: get_uuid(row, "id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            position: row.try_get("position")?,
            department_id: get_uuid(row, "department_id")?,
            hire_date: get_opt_date(row, "hire_date")?,
            is_active: row.try_get("is_active")?,
            roles: Vec::new(),
            user: None,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }

    async fn fetch_count(&self, query: &str) -> Result<u64> {
        let row = sqlx::query(query).fetch_one(&self.pool).await?;
        get_count(&row, 0)
    }

    async fn fetch_rows(&self, query: &str) -> Result<Vec<SqliteRow>> {
        Ok(sqlx::query(query).fetch_all(&self.pool).await?)
    }

    /// Attach roles and login accounts to loaded staff members.
    async fn hydrate(&self, staff: &mut [Staff]) -> Result<()> {
        if staff.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = staff.iter().map(|s| s.id.to_string()).collect();

        let roles_query = Query::select()
            .column((StaffRoles::Table, StaffRoles::StaffId))
            .column((Roles::Table, Asterisk))
            .from(StaffRoles::Table)
            .inner_join(
                Roles::Table,
                Expr::col((Roles::Table, Roles::Id)).equals((StaffRoles::Table, StaffRoles::RoleId)),
            )
            .and_where(Expr::col((StaffRoles::Table, StaffRoles::StaffId)).is_in(ids.clone()))
            .order_by((Roles::Table, Roles::Name), Order::Asc)
            .to_string(SqliteQueryBuilder);

        let users_query = Query::select()
            .column(Asterisk)
            .from(Users::Table)
            .and_where(Expr::col(Users::StaffId).is_in(ids))
            .to_string(SqliteQueryBuilder);

        let (role_rows, user_rows) = tokio::try_join!(
            sqlx::query(&roles_query).fetch_all(&self.pool),
            sqlx::query(&users_query).fetch_all(&self.pool),
        )?;

        let mut roles: HashMap<Uuid, Vec<Role>> = HashMap::new();
        for row in &role_rows {
            roles
                .entry(get_uuid(row, "staff_id")?)
                .or_default()
                .push(Self::role_from_row(row)?);
        }

        let mut users: HashMap<Uuid, User> = HashMap::new();
        for row in &user_rows {
            let user = Self::user_from_row(row)?;
            if let Some(staff_id) = user.staff_id {
                users.insert(staff_id, user);
            }
        }

        for member in staff.iter_mut() {
            member.roles = roles.remove(&member.id).unwrap_or_default();
            member.user = users.remove(&member.id).map(|u| u.summary());
        }
        Ok(())
    }

    async fn insert_user(conn: &mut SqliteConnection, id: Uuid, user: &NewUser) -> Result<()> {
        let query = Query::insert()
            .into_table(Users::Table)
            .columns([
                Users::Id,
                Users::Username,
                Users::DisplayName,
                Users::Role,
                Users::PasswordHash,
                Users::StaffId,
                Users::CreatedAt,
            ])
            .values_panic([
                id.to_string().into(),
                user.username.clone().into(),
                user.display_name.clone().into(),
                user.role.as_str().into(),
                user.password_hash.clone().into(),
                user.staff_id.map(|s| s.to_string()).into(),
                format_timestamp(&now()).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    async fn insert_staff(
        conn: &mut SqliteConnection,
        id: Uuid,
        staff: &NewStaff,
        account: Option<NewUser>,
    ) -> Result<()> {
        let created_at = format_timestamp(&now());

        let query = Query::insert()
            .into_table(StaffMembers::Table)
            .columns([
                StaffMembers::Id,
                StaffMembers::FirstName,
                StaffMembers::LastName,
                StaffMembers::Email,
                StaffMembers::Phone,
                StaffMembers::Position,
                StaffMembers::DepartmentId,
                StaffMembers::HireDate,
                StaffMembers::IsActive,
                StaffMembers::CreatedAt,
                StaffMembers::UpdatedAt,
                StaffMembers::FirstNameLc,
                StaffMembers::LastNameLc,
                StaffMembers::EmailLc,
            ])
            .values_panic([
                id.to_string().into(),
                staff.first_name.clone().into(),
                staff.last_name.clone().into(),
                staff.email.clone().into(),
                staff.phone.clone().into(),
                staff.position.clone().into(),
                staff.department_id.to_string().into(),
                staff
                    .hire_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .into(),
                true.into(),
                created_at.clone().into(),
                created_at.clone().into(),
                fold_case(&staff.first_name).into(),
                fold_case(&staff.last_name).into(),
                fold_case(&staff.email).into(),
            ])
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&mut *conn).await?;

        for role_id in &staff.role_ids {
            Self::link_role(conn, id, *role_id, &created_at).await?;
        }

        if let Some(mut user) = account {
            user.staff_id = Some(id);
            Self::insert_user(conn, Uuid::new_v4(), &user).await?;
        }
        Ok(())
    }

    async fn link_role(
        conn: &mut SqliteConnection,
        staff_id: Uuid,
        role_id: Uuid,
        assigned_at: &str,
    ) -> Result<()> {
        let query = Query::insert()
            .into_table(StaffRoles::Table)
            .columns([StaffRoles::StaffId, StaffRoles::RoleId, StaffRoles::AssignedAt])
            .values_panic([
                staff_id.to_string().into(),
                role_id.to_string().into(),
                assigned_at.into(),
            ])
            .on_conflict(
                OnConflict::columns([StaffRoles::StaffId, StaffRoles::RoleId])
                    .do_nothing()
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    async fn remove_role(conn: &mut SqliteConnection, id: Uuid) -> Result<bool> {
        let query = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(StaffRoles::Table)
            .and_where(Expr::col(StaffRoles::RoleId).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);
        let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
        let holders = get_count(&row, 0)?;
        if holders > 0 {
            return Err(StoreError::Conflict(format!(
                "role {} is still assigned to {} staff member(s)",
                id, holders
            )));
        }

        let query = Query::delete()
            .from_table(Roles::Table)
            .and_where(Expr::col(Roles::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);
        let result = sqlx::query(&query).execute(&mut *conn).await?;
        Ok(result.rows_affected() > 0)
    }

    fn staff_condition(query: &StaffQuery) -> Cond {
        let mut cond = Cond::all();
        if let Some(department_id) = query.department_id {
            cond = cond.add(Expr::col(StaffMembers::DepartmentId).eq(department_id.to_string()));
        }
        if let Some(is_active) = query.is_active {
            cond = cond.add(Expr::col(StaffMembers::IsActive).eq(is_active));
        }
        if let Some(term) = query.search.as_deref().filter(|t| !t.is_empty()) {
            let pattern = contains_pattern(term);
            let matches = |column: StaffMembers| {
                Expr::col(column).like(LikeExpr::new(pattern.clone()).escape(LIKE_ESCAPE))
            };
            cond = cond.add(
                Cond::any()
                    .add(matches(StaffMembers::FirstNameLc))
                    .add(matches(StaffMembers::LastNameLc))
                    .add(matches(StaffMembers::EmailLc)),
            );
        }
        cond
    }
}

#[async_trait]
impl StaffStore for SqliteStaffStore {
    async fn create_department(&self, department: &NewDepartment) -> Result<Department> {
        let id = Uuid::new_v4();
        let created_at = format_timestamp(&now());

        let query = Query::insert()
            .into_table(Departments::Table)
            .columns([
                Departments::Id,
                Departments::Name,
                Departments::Description,
                Departments::IsActive,
                Departments::CreatedAt,
                Departments::UpdatedAt,
            ])
            .values_panic([
                id.to_string().into(),
                department.name.clone().into(),
                department.description.clone().into(),
                true.into(),
                created_at.clone().into(),
                created_at.into(),
            ])
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&self.pool).await?;

        self.get_department(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Department", id))
    }

    async fn list_departments(&self, include_inactive: bool) -> Result<Vec<Department>> {
        let mut select = Query::select();
        select
            .column(Asterisk)
            .from(Departments::Table)
            .order_by(Departments::Name, Order::Asc);
        if !include_inactive {
            select.and_where(Expr::col(Departments::IsActive).eq(true));
        }
        let query = select.to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::department_from_row).collect()
    }

    async fn get_department(&self, id: Uuid) -> Result<Option<Department>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Departments::Table)
            .and_where(Expr::col(Departments::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::department_from_row).transpose()
    }

    async fn update_department(
        &self,
        id: Uuid,
        update: &UpdateDepartment,
    ) -> Result<Option<Department>> {
        let mut values: Vec<(Departments, SimpleExpr)> = vec![(
            Departments::UpdatedAt,
            format_timestamp(&now()).into(),
        )];
        if let Some(name) = &update.name {
            values.push((Departments::Name, name.clone().into()));
        }
        if update.description.is_some() {
            values.push((Departments::Description, optional_text(&update.description)));
        }
        if let Some(is_active) = update.is_active {
            values.push((Departments::IsActive, is_active.into()));
        }

        let query = Query::update()
            .table(Departments::Table)
            .values(values)
            .and_where(Expr::col(Departments::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_department(id).await
    }

    async fn create_role(&self, role: &NewRole) -> Result<Role> {
        let id = Uuid::new_v4();

        let query = Query::insert()
            .into_table(Roles::Table)
            .columns([Roles::Id, Roles::Name, Roles::Description, Roles::CreatedAt])
            .values_panic([
                id.to_string().into(),
                role.name.clone().into(),
                role.description.clone().into(),
                format_timestamp(&now()).into(),
            ])
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&self.pool).await?;

        self.get_role(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Role", id))
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Roles::Table)
            .order_by(Roles::Name, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::role_from_row).collect()
    }

    async fn get_role(&self, id: Uuid) -> Result<Option<Role>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Roles::Table)
            .and_where(Expr::col(Roles::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::role_from_row).transpose()
    }

    async fn update_role(&self, id: Uuid, update: &UpdateRole) -> Result<Option<Role>> {
        let mut values: Vec<(Roles, SimpleExpr)> = Vec::new();
        if let Some(name) = &update.name {
            values.push((Roles::Name, name.clone().into()));
        }
        if update.description.is_some() {
            values.push((Roles::Description, optional_text(&update.description)));
        }
        if values.is_empty() {
            return self.get_role(id).await;
        }

        let query = Query::update()
            .table(Roles::Table)
            .values(values)
            .and_where(Expr::col(Roles::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_role(id).await
    }

    async fn delete_role(&self, id: Uuid) -> Result<bool> {
        let mut tx = begin_immediate(&self.pool).await?;
        let removed = Self::remove_role(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn create_staff(&self, staff: &NewStaff, account: Option<NewUser>) -> Result<Staff> {
        let id = Uuid::new_v4();

        let mut tx = begin_immediate(&self.pool).await?;
        Self::insert_staff(&mut *tx, id, staff, account).await?;
        tx.commit().await?;

        self.get_staff(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Staff", id))
    }

    async fn get_staff(&self, id: Uuid) -> Result<Option<Staff>> {
        let query = Query::select()
            .column(Asterisk)
            .from(StaffMembers::Table)
            .and_where(Expr::col(StaffMembers::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let Some(row) = sqlx::query(&query).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };
        let mut staff = [Self::staff_from_row(&row)?];
        self.hydrate(&mut staff).await?;
        let [member] = staff;
        Ok(Some(member))
    }

    async fn list_staff(&self, query: &StaffQuery) -> Result<Page<Staff>> {
        let cond = Self::staff_condition(query);

        let count_query = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(StaffMembers::Table)
            .cond_where(cond.clone())
            .to_string(SqliteQueryBuilder);

        let Some(offset) = Pagination::offset(query.page, query.limit) else {
            let total = self.fetch_count(&count_query).await?;
            return Ok(Page::empty(query.page, query.limit, total));
        };

        let page_query = Query::select()
            .column(Asterisk)
            .from(StaffMembers::Table)
            .cond_where(cond)
            .order_by(StaffMembers::LastName, Order::Asc)
            .order_by(StaffMembers::FirstName, Order::Asc)
            .order_by(StaffMembers::Id, Order::Asc)
            .limit(query.limit)
            .offset(offset)
            .to_string(SqliteQueryBuilder);

        let (total, rows) = tokio::try_join!(
            self.fetch_count(&count_query),
            self.fetch_rows(&page_query)
        )?;

        let mut items = rows
            .iter()
            .map(Self::staff_from_row)
            .collect::<Result<Vec<_>>>()?;
        self.hydrate(&mut items).await?;

        Ok(Page {
            items,
            pagination: Pagination::new(query.page, query.limit, total),
        })
    }

    async fn update_staff(&self, id: Uuid, update: &UpdateStaff) -> Result<Option<Staff>> {
        let mut values: Vec<(StaffMembers, SimpleExpr)> = vec![(
            StaffMembers::UpdatedAt,
            format_timestamp(&now()).into(),
        )];
        if let Some(first_name) = &update.first_name {
            values.push((StaffMembers::FirstName, first_name.clone().into()));
            values.push((StaffMembers::FirstNameLc, fold_case(first_name).into()));
        }
        if let Some(last_name) = &update.last_name {
            values.push((StaffMembers::LastName, last_name.clone().into()));
            values.push((StaffMembers::LastNameLc, fold_case(last_name).into()));
        }
        if let Some(email) = &update.email {
            values.push((StaffMembers::Email, email.clone().into()));
            values.push((StaffMembers::EmailLc, fold_case(email).into()));
        }
        if update.phone.is_some() {
            values.push((StaffMembers::Phone, optional_text(&update.phone)));
        }
        if update.position.is_some() {
            values.push((StaffMembers::Position, optional_text(&update.position)));
        }
        if let Some(department_id) = update.department_id {
            values.push((StaffMembers::DepartmentId, department_id.to_string().into()));
        }
        if let Some(hire_date) = update.hire_date {
            values.push((
                StaffMembers::HireDate,
                hire_date.format("%Y-%m-%d").to_string().into(),
            ));
        }
        if let Some(is_active) = update.is_active {
            values.push((StaffMembers::IsActive, is_active.into()));
        }

        let query = Query::update()
            .table(StaffMembers::Table)
            .values(values)
            .and_where(Expr::col(StaffMembers::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_staff(id).await
    }

    async fn assign_role(&self, staff_id: Uuid, role_id: Uuid) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::link_role(&mut conn, staff_id, role_id, &format_timestamp(&now())).await
    }

    async fn unassign_role(&self, staff_id: Uuid, role_id: Uuid) -> Result<bool> {
        let query = Query::delete()
            .from_table(StaffRoles::Table)
            .and_where(Expr::col(StaffRoles::StaffId).eq(staff_id.to_string()))
            .and_where(Expr::col(StaffRoles::RoleId).eq(role_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for SqliteStaffStore {
    async fn upsert_user(&self, user: NewUser) -> Result<User> {
        let query = Query::insert()
            .into_table(Users::Table)
            .columns([
                Users::Id,
                Users::Username,
                Users::DisplayName,
                Users::Role,
                Users::PasswordHash,
                Users::StaffId,
                Users::CreatedAt,
            ])
            .values_panic([
                Uuid::new_v4().to_string().into(),
                user.username.clone().into(),
                user.display_name.clone().into(),
                user.role.as_str().into(),
                user.password_hash.clone().into(),
                user.staff_id.map(|s| s.to_string()).into(),
                format_timestamp(&now()).into(),
            ])
            .on_conflict(
                OnConflict::column(Users::Username)
                    .update_columns([Users::DisplayName, Users::Role, Users::PasswordHash])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&self.pool).await?;

        self.find_user_by_username(&user.username)
            .await?
            .ok_or_else(|| StoreError::not_found("User", &user.username))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Users::Table)
            .and_where(Expr::col(Users::Username).eq(username))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::user_from_row).transpose()
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Users::Table)
            .and_where(Expr::col(Users::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::user_from_row).transpose()
    }
}
