//! Domain models for clientdesk.
//!
//! These are the core types shared by storage, services, export and the
//! REST layer.

/// Declares a closed set of wire strings as a Rust enum.
///
/// The wire form is used for JSON, for the database column and for
/// export cells, so all three always agree.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// Comma-separated list of accepted wire values, for error messages.
            pub fn allowed() -> String {
                Self::ALL
                    .iter()
                    .map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod audit;
pub mod intake;
pub mod staff;

pub use audit::{
    AuditAction, AuditLog, AuditLogView, AuditStats, ClientIntakeRef, NewAuditLog, UserActivity,
    UserRef,
};
pub use intake::{
    ClientIntake, ClientType, IntakeDetails, IntakeSubmission, IntakeSummary, NewIntake,
    NewRelatedParty, Priority, RamisStatus, RelatedParty, RelatedPartyInput,
};
pub use staff::{
    Department, NewDepartment, NewRole, NewStaff, NewUser, Role, Staff, StaffAccount,
    UpdateDepartment, UpdateRole, UpdateStaff, User, UserRole, UserSummary,
};

use serde::Serialize;

/// A page of results plus the metadata needed to fetch the rest.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    /// A page past the end of the result set.
    pub fn empty(page: u64, limit: u64, total: u64) -> Self {
        Self {
            items: Vec::new(),
            pagination: Pagination::new(page, limit, total),
        }
    }
}

/// Pagination metadata: `pages == ceil(total / limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            page,
            limit,
            total,
            pages,
        }
    }

    /// Row offset of the first item on this page.
    ///
    /// `None` when the offset does not fit SQLite's signed 64-bit range;
    /// such a page can only be empty.
    pub fn offset(page: u64, limit: u64) -> Option<u64> {
        page.saturating_sub(1)
            .checked_mul(limit)
            .filter(|offset| i64::try_from(*offset).is_ok())
    }
}

/// Sort direction shared by every list query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_pages_rounds_up() {
        assert_eq!(Pagination::new(1, 10, 0).pages, 0);
        assert_eq!(Pagination::new(1, 10, 10).pages, 1);
        assert_eq!(Pagination::new(1, 10, 11).pages, 2);
        assert_eq!(Pagination::new(3, 7, 50).pages, 8);
    }

    #[test]
    fn test_pagination_offset() {
        assert_eq!(Pagination::offset(1, 25), Some(0));
        assert_eq!(Pagination::offset(4, 25), Some(75));
    }

    #[test]
    fn test_pagination_offset_out_of_range() {
        assert_eq!(Pagination::offset(u64::MAX, 10), None);
        assert_eq!(Pagination::offset(1 << 62, 4), None);
        assert_eq!(Pagination::offset(u64::MAX, 0), Some(0));
        let last = i64::MAX as u64;
        assert_eq!(Pagination::offset(last + 1, 1), Some(last));
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!(SortOrder::parse("ASC"), Some(SortOrder::Asc));
        assert_eq!(SortOrder::parse("desc"), Some(SortOrder::Desc));
        assert_eq!(SortOrder::parse("sideways"), None);
    }
}
