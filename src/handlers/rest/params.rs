//! Query-string parsing for list endpoints.
//!
//! Parameters arrive as optional strings and are converted here so every
//! bad value is reported as a 400 naming the parameter.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::error::ApiError;
use crate::config::LimitsConfig;
use crate::models::{AuditAction, ClientType, RamisStatus, SortOrder};
use crate::storage::{AuditQuery, AuditSortField, IntakeQuery, IntakeSortField, StaffQuery};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "type")]
    pub client_type: Option<String>,
    pub service: Option<String>,
    pub tax_type: Option<String>,
    pub ramis_status: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub department_id: Option<String>,
    pub is_active: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentListParams {
    pub include_inactive: Option<String>,
}

fn bad(param: &str, reason: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest(format!("invalid query parameter {}: {}", param, reason))
}

/// Empty strings count as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn positive(param: &str, value: &Option<String>) -> Result<Option<u64>, ApiError> {
    match present(value) {
        None => Ok(None),
        Some(raw) => match raw.parse::<u64>() {
            Ok(n) if n >= 1 => Ok(Some(n)),
            _ => Err(bad(param, "must be an integer >= 1")),
        },
    }
}

fn paging(
    limits: &LimitsConfig,
    page: &Option<String>,
    limit: &Option<String>,
) -> Result<(u64, u64), ApiError> {
    let page = positive("page", page)?.unwrap_or(1);
    let limit = limits.page_size(positive("limit", limit)?);
    Ok((page, limit))
}

fn sort_order(value: &Option<String>) -> Result<SortOrder, ApiError> {
    match present(value) {
        None => Ok(SortOrder::default()),
        Some(raw) => SortOrder::parse(raw).ok_or_else(|| bad("sortOrder", "must be asc or desc")),
    }
}

fn flag(param: &str, value: &Option<String>) -> Result<Option<bool>, ApiError> {
    match present(value) {
        None => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(_) => Err(bad(param, "must be true or false")),
    }
}

fn uuid(param: &str, value: &Option<String>) -> Result<Option<Uuid>, ApiError> {
    present(value)
        .map(|raw| Uuid::parse_str(raw).map_err(|e| bad(param, e)))
        .transpose()
}

/// RFC 3339 instant, or a calendar date taken at the start of the day
/// (`end_of_day` = false) or its last microsecond.
fn instant(
    param: &str,
    value: &Option<String>,
    end_of_day: bool,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = present(value) else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| bad(param, "expected RFC 3339 or YYYY-MM-DD"))?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };
    Ok(time.map(|t| date.and_time(t).and_utc()))
}

impl IntakeListParams {
    pub fn into_query(self, limits: &LimitsConfig) -> Result<IntakeQuery, ApiError> {
        let (page, limit) = paging(limits, &self.page, &self.limit)?;
        let client_type = present(&self.client_type)
            .map(|raw| {
                ClientType::parse(raw).ok_or_else(|| {
                    bad("type", format!("must be one of {}", ClientType::allowed()))
                })
            })
            .transpose()?;
        let ramis_status = present(&self.ramis_status)
            .map(|raw| {
                RamisStatus::parse(raw).ok_or_else(|| {
                    bad("ramisStatus", format!("must be one of {}", RamisStatus::allowed()))
                })
            })
            .transpose()?;

        Ok(IntakeQuery {
            page,
            limit,
            client_type,
            ramis_status,
            service: present(&self.service).map(str::to_string),
            tax_type: present(&self.tax_type).map(str::to_string),
            search: present(&self.search).map(str::to_string),
            sort_by: present(&self.sort_by)
                .map(IntakeSortField::parse)
                .unwrap_or_default(),
            sort_order: sort_order(&self.sort_order)?,
        })
    }
}

impl AuditListParams {
    pub fn into_query(self, limits: &LimitsConfig) -> Result<AuditQuery, ApiError> {
        let (page, limit) = paging(limits, &self.page, &self.limit)?;
        let action = present(&self.action)
            .map(|raw| {
                AuditAction::parse(raw).ok_or_else(|| {
                    bad("action", format!("must be one of {}", AuditAction::allowed()))
                })
            })
            .transpose()?;

        Ok(AuditQuery {
            page,
            limit,
            action,
            entity_type: present(&self.entity_type).map(str::to_string),
            user_id: uuid("userId", &self.user_id)?,
            from: instant("startDate", &self.start_date, false)?,
            until: instant("endDate", &self.end_date, true)?,
            sort_by: present(&self.sort_by)
                .map(AuditSortField::parse)
                .unwrap_or_default(),
            sort_order: sort_order(&self.sort_order)?,
        })
    }
}

impl StaffListParams {
    pub fn into_query(self, limits: &LimitsConfig) -> Result<StaffQuery, ApiError> {
        let (page, limit) = paging(limits, &self.page, &self.limit)?;
        Ok(StaffQuery {
            page,
            limit,
            department_id: uuid("departmentId", &self.department_id)?,
            is_active: flag("isActive", &self.is_active)?,
            search: present(&self.search).map(str::to_string),
        })
    }
}

impl DepartmentListParams {
    pub fn include_inactive(&self) -> Result<bool, ApiError> {
        Ok(flag("includeInactive", &self.include_inactive)?.unwrap_or(false))
    }
}
