//! Validation for departments, roles, staff members and login accounts.

use std::sync::LazyLock;

use regex::Regex;

use super::{check_length, clean, is_valid_email, limits, ValidationErrors};
use crate::models::{
    NewDepartment, NewRole, NewStaff, StaffAccount, UpdateDepartment, UpdateRole, UpdateStaff,
};

pub mod errmsg {
    pub const NAME_REQUIRED: &str = "name is required";
    pub const FIRST_NAME_REQUIRED: &str = "first name is required";
    pub const LAST_NAME_REQUIRED: &str = "last name is required";
    pub const EMAIL_REQUIRED: &str = "email is required";
    pub const USERNAME_INVALID: &str =
        "username must be 3-64 characters of lowercase letters, digits, '.', '_' or '-'";
    pub const PASSWORD_TOO_SHORT: &str = "password must be at least 8 characters";
    pub const DUPLICATE_ROLE: &str = "role ids must not repeat";
}

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._-]{3,64}$").expect("username pattern is valid"));

fn required(
    errors: &mut ValidationErrors,
    field: &str,
    value: String,
    message: &str,
) -> String {
    let value = value.trim().to_string();
    if value.is_empty() {
        errors.push(field, message);
    }
    check_length(errors, field, Some(&value), limits::MAX_FIELD_LENGTH);
    value
}

/// Reject a present-but-blank replacement for a required field.
fn replacement(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<String>,
    message: &str,
) -> Option<String> {
    value.map(|v| required(errors, field, v, message))
}

fn finish<T>(errors: ValidationErrors, value: T) -> Result<T, ValidationErrors> {
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}

pub fn validate_department(input: NewDepartment) -> Result<NewDepartment, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let name = required(&mut errors, "name", input.name, errmsg::NAME_REQUIRED);
    let description = clean(input.description);
    check_length(
        &mut errors,
        "description",
        description.as_deref(),
        limits::MAX_NOTES_LENGTH,
    );
    finish(errors, NewDepartment { name, description })
}

pub fn validate_department_update(
    input: UpdateDepartment,
) -> Result<UpdateDepartment, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let name = replacement(&mut errors, "name", input.name, errmsg::NAME_REQUIRED);
    finish(
        errors,
        UpdateDepartment {
            name,
            description: input.description.map(|d| d.trim().to_string()),
            is_active: input.is_active,
        },
    )
}

pub fn validate_role(input: NewRole) -> Result<NewRole, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let name = required(&mut errors, "name", input.name, errmsg::NAME_REQUIRED);
    finish(
        errors,
        NewRole {
            name,
            description: clean(input.description),
        },
    )
}

pub fn validate_role_update(input: UpdateRole) -> Result<UpdateRole, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let name = replacement(&mut errors, "name", input.name, errmsg::NAME_REQUIRED);
    finish(
        errors,
        UpdateRole {
            name,
            description: input.description.map(|d| d.trim().to_string()),
        },
    )
}

/// Check a login account request.
pub fn validate_account(errors: &mut ValidationErrors, prefix: &str, account: &StaffAccount) {
    if !USERNAME_RE.is_match(&account.username) {
        errors.push(&format!("{}username", prefix), errmsg::USERNAME_INVALID);
    }
    if account.password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(&format!("{}password", prefix), errmsg::PASSWORD_TOO_SHORT);
    }
}

pub fn validate_staff(input: NewStaff) -> Result<NewStaff, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let first_name = required(
        &mut errors,
        "firstName",
        input.first_name,
        errmsg::FIRST_NAME_REQUIRED,
    );
    let last_name = required(
        &mut errors,
        "lastName",
        input.last_name,
        errmsg::LAST_NAME_REQUIRED,
    );
    let email = required(&mut errors, "email", input.email, errmsg::EMAIL_REQUIRED);
    if !email.is_empty() && !is_valid_email(&email) {
        errors.push("email", super::errmsg::EMAIL_INVALID);
    }

    let mut role_ids = input.role_ids.clone();
    role_ids.sort();
    role_ids.dedup();
    if role_ids.len() != input.role_ids.len() {
        errors.push("roleIds", errmsg::DUPLICATE_ROLE);
    }

    let account = input.account.map(|a| StaffAccount {
        username: a.username.trim().to_lowercase(),
        ..a
    });
    if let Some(ref account) = account {
        validate_account(&mut errors, "account.", account);
    }

    finish(
        errors,
        NewStaff {
            first_name,
            last_name,
            email: email.to_lowercase(),
            phone: clean(input.phone),
            position: clean(input.position),
            department_id: input.department_id,
            hire_date: input.hire_date,
            role_ids: input.role_ids,
            account,
        },
    )
}

pub fn validate_staff_update(input: UpdateStaff) -> Result<UpdateStaff, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let first_name = replacement(
        &mut errors,
        "firstName",
        input.first_name,
        errmsg::FIRST_NAME_REQUIRED,
    );
    let last_name = replacement(
        &mut errors,
        "lastName",
        input.last_name,
        errmsg::LAST_NAME_REQUIRED,
    );
    let email = replacement(&mut errors, "email", input.email, errmsg::EMAIL_REQUIRED);
    if let Some(ref e) = email {
        if !e.is_empty() && !is_valid_email(e) {
            errors.push("email", super::errmsg::EMAIL_INVALID);
        }
    }

    finish(
        errors,
        UpdateStaff {
            first_name,
            last_name,
            email: email.map(|e| e.to_lowercase()),
            phone: input.phone.map(|p| p.trim().to_string()),
            position: input.position.map(|p| p.trim().to_string()),
            department_id: input.department_id,
            hire_date: input.hire_date,
            is_active: input.is_active,
        },
    )
}
