//! Input validation for data crossing the HTTP boundary.
//!
//! Intake submissions are checked field by field first (presence, enum
//! membership, formats), then against cross-field rules. Every failure is
//! collected so the form can highlight all problems at once.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::Serialize;

use crate::models::intake::{DIRECT_TAX_SERVICE, INDIRECT_TAX_SERVICE};
use crate::models::{
    ClientType, IntakeDetails, IntakeSubmission, NewIntake, NewRelatedParty, Priority, RamisStatus,
    RelatedPartyInput,
};

pub mod staff;

/// Length limits for validated fields.
pub mod limits {
    /// Maximum length of names, addresses and other single-line fields.
    pub const MAX_FIELD_LENGTH: usize = 255;
    /// Maximum length of free-text notes.
    pub const MAX_NOTES_LENGTH: usize = 5000;
}

/// Error constants for validation failures.
pub mod errmsg {
    pub const LEGAL_NAME_REQUIRED: &str = "legal name is required";
    pub const TYPE_INVALID: &str = "type must be one of";
    pub const OWNER_NAME_REQUIRED: &str = "owner name is required";
    pub const ADDRESS_REQUIRED: &str = "address is required";
    pub const SERVICES_REQUIRED: &str = "at least one service must be selected";
    pub const RAMIS_STATUS_INVALID: &str = "ramisStatus must be one of";
    pub const PRIORITY_INVALID: &str = "priority must be one of";
    pub const CONSENT_REQUIRED: &str = "consent must be given before the intake can be submitted";
    pub const EMAIL_INVALID: &str = "email address is not valid";
    pub const DATE_INVALID: &str = "date must be formatted as YYYY-MM-DD";
    pub const NEGATIVE_AMOUNT: &str = "value must be a non-negative number";
    pub const TOO_LONG: &str = "value exceeds maximum length";

    pub const DIRECT_TAX_SUBCATEGORY_REQUIRED: &str =
        "at least one direct tax subcategory is required when Direct Tax is selected";
    pub const INDIRECT_TAX_SUBCATEGORY_REQUIRED: &str =
        "at least one indirect tax subcategory is required when Indirect Tax is selected";
    pub const COMPANY_SECRETARY_REQUIRED: &str =
        "company secretary is required for COMPANY clients";

    pub const PARTY_NAME_REQUIRED: &str = "related party name is required";
}

/// JSON field names used in [`FieldError::field`].
pub mod fields {
    pub const LEGAL_NAME: &str = "legalName";
    pub const TYPE: &str = "type";
    pub const OWNER_NAME: &str = "ownerName";
    pub const ADDRESS: &str = "address";
    pub const EMAIL: &str = "email";
    pub const SERVICES_SELECTED: &str = "servicesSelected";
    pub const RAMIS_STATUS: &str = "ramisStatus";
    pub const PRIORITY: &str = "priority";
    pub const CONSENT: &str = "consent";
    pub const DIRECT_TAX_SUBCATEGORIES: &str = "directTaxSubcategories";
    pub const INDIRECT_TAX_SUBCATEGORIES: &str = "indirectTaxSubcategories";
    pub const COMPANY_SECRETARY: &str = "companySecretary";
    pub const INCORPORATION_DATE: &str = "incorporationDate";
    pub const ANNUAL_REVENUE: &str = "annualRevenue";
    pub const EMPLOYEE_COUNT: &str = "employeeCount";
    pub const CREDIT_LIMIT: &str = "creditLimit";
    pub const NOTES: &str = "notes";
}

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// One failed rule, addressed by JSON field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// All rule failures for one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-error shorthand.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "validation failed: {}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Check an email address for basic `local@domain.tld` shape.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Trim a text field, treating blank as absent.
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_list(values: Option<Vec<String>>) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| clean(Some(v)))
        .collect()
}

pub(crate) fn check_length(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
) {
    if let Some(v) = value {
        let len = v.chars().count();
        if len > max {
            errors.push(
                field,
                format!("{} (max: {}, got: {})", errmsg::TOO_LONG, max, len),
            );
        }
    }
}

fn check_non_negative(errors: &mut ValidationErrors, field: &str, value: Option<f64>) {
    if let Some(v) = value {
        if !v.is_finite() || v < 0.0 {
            errors.push(field, errmsg::NEGATIVE_AMOUNT);
        }
    }
}

/// Parse a calendar date from `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

fn validate_party(
    errors: &mut ValidationErrors,
    index: usize,
    party: RelatedPartyInput,
) -> Option<NewRelatedParty> {
    let name = clean(party.name);
    let email = clean(party.email);

    if name.is_none() {
        errors.push(
            &format!("relatedParties[{}].name", index),
            errmsg::PARTY_NAME_REQUIRED,
        );
    }
    if let Some(ref e) = email {
        if !is_valid_email(e) {
            errors.push(
                &format!("relatedParties[{}].email", index),
                errmsg::EMAIL_INVALID,
            );
        }
    }

    Some(NewRelatedParty {
        name: name?,
        relationship: clean(party.relationship),
        tin: clean(party.tin),
        email,
        phone: clean(party.phone),
    })
}

/// Validate an intake submission and convert it into a [`NewIntake`].
///
/// Rules:
/// - legalName, ownerName and address must be non-blank
/// - type and ramisStatus must be members of their enums
/// - servicesSelected must contain at least one entry
/// - consent must be the JSON literal `true`
/// - email, when present, must be well formed
/// - selecting "Direct Tax" / "Indirect Tax" requires a matching subcategory
/// - COMPANY clients require a company secretary
///
/// Cross-field rules are always evaluated, so a payload failing several
/// rules reports every one of them.
pub fn validate_intake(submission: IntakeSubmission) -> Result<NewIntake, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let legal_name = clean(submission.legal_name);
    if legal_name.is_none() {
        errors.push(fields::LEGAL_NAME, errmsg::LEGAL_NAME_REQUIRED);
    }
    check_length(&mut errors, fields::LEGAL_NAME, legal_name.as_deref(), limits::MAX_FIELD_LENGTH);

    let client_type = clean(submission.client_type)
        .as_deref()
        .and_then(ClientType::parse);
    if client_type.is_none() {
        errors.push(
            fields::TYPE,
            format!("{} {}", errmsg::TYPE_INVALID, ClientType::allowed()),
        );
    }

    let owner_name = clean(submission.owner_name);
    if owner_name.is_none() {
        errors.push(fields::OWNER_NAME, errmsg::OWNER_NAME_REQUIRED);
    }
    check_length(&mut errors, fields::OWNER_NAME, owner_name.as_deref(), limits::MAX_FIELD_LENGTH);

    let address = clean(submission.address);
    if address.is_none() {
        errors.push(fields::ADDRESS, errmsg::ADDRESS_REQUIRED);
    }
    check_length(&mut errors, fields::ADDRESS, address.as_deref(), limits::MAX_FIELD_LENGTH);

    let services_selected = clean_list(submission.services_selected);
    if services_selected.is_empty() {
        errors.push(fields::SERVICES_SELECTED, errmsg::SERVICES_REQUIRED);
    }

    let ramis_status = clean(submission.ramis_status)
        .as_deref()
        .and_then(RamisStatus::parse);
    if ramis_status.is_none() {
        errors.push(
            fields::RAMIS_STATUS,
            format!("{} {}", errmsg::RAMIS_STATUS_INVALID, RamisStatus::allowed()),
        );
    }

    let priority = match clean(submission.priority) {
        None => Some(Priority::default()),
        Some(p) => Priority::parse(&p),
    };
    if priority.is_none() {
        errors.push(
            fields::PRIORITY,
            format!("{} {}", errmsg::PRIORITY_INVALID, Priority::allowed()),
        );
    }

    let consent = submission.consent == Some(serde_json::Value::Bool(true));
    if !consent {
        errors.push(fields::CONSENT, errmsg::CONSENT_REQUIRED);
    }

    let email = clean(submission.email);
    if let Some(ref e) = email {
        if !is_valid_email(e) {
            errors.push(fields::EMAIL, errmsg::EMAIL_INVALID);
        }
    }

    let incorporation_date = match clean(submission.incorporation_date) {
        None => None,
        Some(raw) => {
            let parsed = parse_date(&raw);
            if parsed.is_none() {
                errors.push(fields::INCORPORATION_DATE, errmsg::DATE_INVALID);
            }
            parsed
        }
    };

    let annual_revenue = submission.annual_revenue.flatten();
    let employee_count = submission.employee_count.flatten();
    let credit_limit = submission.credit_limit.flatten();
    check_non_negative(&mut errors, fields::ANNUAL_REVENUE, annual_revenue);
    check_non_negative(&mut errors, fields::CREDIT_LIMIT, credit_limit);
    if employee_count.is_some_and(|n| n < 0) {
        errors.push(fields::EMPLOYEE_COUNT, errmsg::NEGATIVE_AMOUNT);
    }

    let notes = clean(submission.notes);
    check_length(&mut errors, fields::NOTES, notes.as_deref(), limits::MAX_NOTES_LENGTH);

    // Cross-field rules
    let direct_tax_subcategories = clean_list(submission.direct_tax_subcategories);
    let indirect_tax_subcategories = clean_list(submission.indirect_tax_subcategories);
    let company_secretary = clean(submission.company_secretary);

    let selected = |name: &str| services_selected.iter().any(|s| s == name);
    if selected(DIRECT_TAX_SERVICE) && direct_tax_subcategories.is_empty() {
        errors.push(
            fields::DIRECT_TAX_SUBCATEGORIES,
            errmsg::DIRECT_TAX_SUBCATEGORY_REQUIRED,
        );
    }
    if selected(INDIRECT_TAX_SERVICE) && indirect_tax_subcategories.is_empty() {
        errors.push(
            fields::INDIRECT_TAX_SUBCATEGORIES,
            errmsg::INDIRECT_TAX_SUBCATEGORY_REQUIRED,
        );
    }
    if client_type == Some(ClientType::Company) && company_secretary.is_none() {
        errors.push(fields::COMPANY_SECRETARY, errmsg::COMPANY_SECRETARY_REQUIRED);
    }

    let related_parties: Vec<NewRelatedParty> = submission
        .related_parties
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(i, party)| validate_party(&mut errors, i, party))
        .collect();

    if !errors.is_empty() {
        return Err(errors);
    }

    let (
        Some(legal_name),
        Some(client_type),
        Some(owner_name),
        Some(address),
        Some(ramis_status),
        Some(priority),
    ) = (
        legal_name,
        client_type,
        owner_name,
        address,
        ramis_status,
        priority,
    )
    else {
        return Err(errors);
    };

    let tax_sub_selections = submission
        .tax_sub_selections
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(category, values)| {
            let category = category.trim().to_string();
            let values = clean_list(Some(values));
            (!category.is_empty() && !values.is_empty()).then_some((category, values))
        })
        .collect();

    let tax_return_years = submission
        .tax_return_years
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(category, years)| {
            let category = category.trim().to_string();
            let years = clean_list(Some(years));
            (!category.is_empty() && !years.is_empty()).then_some((category, years))
        })
        .collect();

    Ok(NewIntake {
        details: IntakeDetails {
            legal_name,
            trade_name: clean(submission.trade_name),
            client_type,
            owner_name,
            address,
            city: clean(submission.city),
            state: clean(submission.state),
            zip_code: clean(submission.zip_code),
            country: clean(submission.country),
            phone: clean(submission.phone),
            mobile: clean(submission.mobile),
            email,
            website: clean(submission.website),
            industry: clean(submission.industry),
            priority,
            tin: clean(submission.tin),
            ramis_status,
            services_selected,
            direct_tax_subcategories,
            indirect_tax_subcategories,
            tax_types: clean_list(submission.tax_types),
            income_tax_types: clean_list(submission.income_tax_types),
            tax_sub_selections,
            tax_return_years,
            company_secretary,
            registration_number: clean(submission.registration_number),
            incorporation_date,
            annual_revenue,
            employee_count,
            certificate_of_incorporation_provided: submission
                .certificate_of_incorporation_provided
                .unwrap_or(false),
            tin_certificate_provided: submission.tin_certificate_provided.unwrap_or(false),
            memorandum_provided: submission.memorandum_provided.unwrap_or(false),
            id_document_provided: submission.id_document_provided.unwrap_or(false),
            other_document1: clean(submission.other_document1),
            other_document2: clean(submission.other_document2),
            credit_limit,
            payment_terms: clean(submission.payment_terms),
            currency: clean(submission.currency),
            notes,
            consent,
        },
        related_parties,
    })
}
