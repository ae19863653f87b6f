//! Client intake domain model.
//!
//! A [`ClientIntake`] is one prospective or active client of the practice,
//! together with the people related to it. Submissions arrive as loosely
//! typed [`IntakeSubmission`]s and only become a [`NewIntake`] after
//! passing validation.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

string_enum! {
    /// Legal form of the client.
    ClientType {
        Individual => "INDIVIDUAL",
        Partnership => "PARTNERSHIP",
        Company => "COMPANY",
        Ngo => "NGO",
        Other => "OTHER",
    }
}

string_enum! {
    /// Whether the client holds credentials for the tax authority's online system.
    RamisStatus {
        Available => "AVAILABLE",
        NotAvailable => "NOT_AVAILABLE",
    }
}

string_enum! {
    Priority {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
        Vip => "VIP",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Service name that requires at least one direct tax subcategory.
pub const DIRECT_TAX_SERVICE: &str = "Direct Tax";
/// Service name that requires at least one indirect tax subcategory.
pub const INDIRECT_TAX_SERVICE: &str = "Indirect Tax";

/// Validated scalar and variable-shape fields of an intake.
///
/// Shared by the stored record and by the validated create/update input so
/// the field list exists in exactly one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeDetails {
    pub legal_name: String,
    pub trade_name: Option<String>,
    #[serde(rename = "type")]
    pub client_type: ClientType,
    pub owner_name: String,

    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,

    pub industry: Option<String>,
    pub priority: Priority,

    pub tin: Option<String>,
    pub ramis_status: RamisStatus,
    pub services_selected: Vec<String>,
    pub direct_tax_subcategories: Vec<String>,
    pub indirect_tax_subcategories: Vec<String>,
    pub tax_types: Vec<String>,
    pub income_tax_types: Vec<String>,
    /// Category name -> chosen values.
    pub tax_sub_selections: BTreeMap<String, Vec<String>>,
    /// Category name -> filed tax years.
    pub tax_return_years: BTreeMap<String, Vec<String>>,

    pub company_secretary: Option<String>,
    pub registration_number: Option<String>,
    pub incorporation_date: Option<NaiveDate>,
    pub annual_revenue: Option<f64>,
    pub employee_count: Option<i64>,

    pub certificate_of_incorporation_provided: bool,
    pub tin_certificate_provided: bool,
    pub memorandum_provided: bool,
    pub id_document_provided: bool,
    pub other_document1: Option<String>,
    pub other_document2: Option<String>,

    pub credit_limit: Option<f64>,
    pub payment_terms: Option<String>,
    pub currency: Option<String>,

    pub notes: Option<String>,
    pub consent: bool,
}

/// A stored client intake with its lifecycle metadata and related parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIntake {
    pub id: Uuid,
    #[serde(flatten)]
    pub details: IntakeDetails,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Bumped on every write; used for optimistic concurrency.
    pub version: i64,
    pub related_parties: Vec<RelatedParty>,
}

impl ClientIntake {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A person associated with a client (director, partner, secretary...).
///
/// Owned exclusively by its intake and recreated on every update, so the
/// id is not stable across edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedParty {
    pub id: Uuid,
    pub client_intake_id: Uuid,
    pub name: String,
    pub relationship: Option<String>,
    pub tin: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validated input for a new related party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelatedParty {
    pub name: String,
    pub relationship: Option<String>,
    pub tin: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Validated input for creating or replacing an intake.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIntake {
    pub details: IntakeDetails,
    pub related_parties: Vec<NewRelatedParty>,
}

/// Related party as submitted by the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelatedPartyInput {
    pub name: Option<String>,
    pub relationship: Option<String>,
    pub tin: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<&RelatedParty> for RelatedPartyInput {
    fn from(party: &RelatedParty) -> Self {
        Self {
            name: Some(party.name.clone()),
            relationship: party.relationship.clone(),
            tin: party.tin.clone(),
            email: party.email.clone(),
            phone: party.phone.clone(),
        }
    }
}

/// Raw intake payload.
///
/// Every field is optional so that missing or mistyped values surface as
/// field-level validation errors instead of a body rejection. Enum fields
/// are kept as strings for the same reason, and `consent` is kept as raw
/// JSON because only a literal `true` is acceptable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntakeSubmission {
    pub legal_name: Option<String>,
    pub trade_name: Option<String>,
    #[serde(rename = "type")]
    pub client_type: Option<String>,
    pub owner_name: Option<String>,

    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,

    pub industry: Option<String>,
    pub priority: Option<String>,

    pub tin: Option<String>,
    pub ramis_status: Option<String>,
    pub services_selected: Option<Vec<String>>,
    pub direct_tax_subcategories: Option<Vec<String>>,
    pub indirect_tax_subcategories: Option<Vec<String>>,
    pub tax_types: Option<Vec<String>>,
    pub income_tax_types: Option<Vec<String>>,
    pub tax_sub_selections: Option<BTreeMap<String, Vec<String>>>,
    #[serde(deserialize_with = "deserialize_year_map")]
    pub tax_return_years: Option<BTreeMap<String, Vec<String>>>,

    pub company_secretary: Option<String>,
    pub registration_number: Option<String>,
    pub incorporation_date: Option<String>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub annual_revenue: Option<Option<f64>>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub employee_count: Option<Option<i64>>,

    pub certificate_of_incorporation_provided: Option<bool>,
    pub tin_certificate_provided: Option<bool>,
    pub memorandum_provided: Option<bool>,
    pub id_document_provided: Option<bool>,
    pub other_document1: Option<String>,
    pub other_document2: Option<String>,

    #[serde(deserialize_with = "deserialize_nullable")]
    pub credit_limit: Option<Option<f64>>,
    pub payment_terms: Option<String>,
    pub currency: Option<String>,

    pub notes: Option<String>,
    pub consent: Option<serde_json::Value>,

    pub related_parties: Option<Vec<RelatedPartyInput>>,
}

impl IntakeSubmission {
    /// Fill every field the caller left out with the stored value.
    ///
    /// `related_parties` is deliberately left alone: the party set is
    /// always replaced wholesale by what the update carries.
    pub fn merged_over(self, existing: &ClientIntake) -> Self {
        let s = self;
        let d = &existing.details;

        macro_rules! keep {
            ($field:ident) => {
                s.$field.or_else(|| d.$field.clone())
            };
        }
        macro_rules! keep_required {
            ($field:ident) => {
                s.$field.or_else(|| Some(d.$field.clone()))
            };
        }

        Self {
            legal_name: keep_required!(legal_name),
            trade_name: keep!(trade_name),
            client_type: s
                .client_type
                .or_else(|| Some(d.client_type.as_str().to_string())),
            owner_name: keep_required!(owner_name),
            address: keep_required!(address),
            city: keep!(city),
            state: keep!(state),
            zip_code: keep!(zip_code),
            country: keep!(country),
            phone: keep!(phone),
            mobile: keep!(mobile),
            email: keep!(email),
            website: keep!(website),
            industry: keep!(industry),
            priority: s
                .priority
                .or_else(|| Some(d.priority.as_str().to_string())),
            tin: keep!(tin),
            ramis_status: s
                .ramis_status
                .or_else(|| Some(d.ramis_status.as_str().to_string())),
            services_selected: keep_required!(services_selected),
            direct_tax_subcategories: keep_required!(direct_tax_subcategories),
            indirect_tax_subcategories: keep_required!(indirect_tax_subcategories),
            tax_types: keep_required!(tax_types),
            income_tax_types: keep_required!(income_tax_types),
            tax_sub_selections: keep_required!(tax_sub_selections),
            tax_return_years: keep_required!(tax_return_years),
            company_secretary: keep!(company_secretary),
            registration_number: keep!(registration_number),
            incorporation_date: s
                .incorporation_date
                .or_else(|| d.incorporation_date.map(|date| date.to_string())),
            annual_revenue: s.annual_revenue.or(Some(d.annual_revenue)),
            employee_count: s.employee_count.or(Some(d.employee_count)),
            certificate_of_incorporation_provided: keep_required!(
                certificate_of_incorporation_provided
            ),
            tin_certificate_provided: keep_required!(tin_certificate_provided),
            memorandum_provided: keep_required!(memorandum_provided),
            id_document_provided: keep_required!(id_document_provided),
            other_document1: keep!(other_document1),
            other_document2: keep!(other_document2),
            credit_limit: s.credit_limit.or(Some(d.credit_limit)),
            payment_terms: keep!(payment_terms),
            currency: keep!(currency),
            notes: keep!(notes),
            consent: s
                .consent
                .or(Some(serde_json::Value::Bool(d.consent))),
            related_parties: s.related_parties,
        }
    }
}

/// Dashboard counts over non-deleted intakes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeSummary {
    pub total: u64,
    pub by_type: BTreeMap<String, u64>,
    pub by_ramis_status: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    pub submitted_last_30_days: u64,
}

/// `Some(None)` for an explicit `null`, so an update can clear a number.
/// An absent field stays `None` through the struct default.
fn deserialize_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Years may be posted as numbers or strings; both are stored as strings.
fn deserialize_year_map<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, Vec<String>>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Year {
        Number(i64),
        Text(String),
    }

    let raw: Option<BTreeMap<String, Vec<Year>>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|map| {
        map.into_iter()
            .map(|(category, years)| {
                let years = years
                    .into_iter()
                    .map(|year| match year {
                        Year::Number(n) => n.to_string(),
                        Year::Text(s) => s,
                    })
                    .collect();
                (category, years)
            })
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_type_wire_names() {
        assert_eq!(ClientType::parse("COMPANY"), Some(ClientType::Company));
        assert_eq!(ClientType::parse("company"), None);
        assert_eq!(ClientType::Ngo.as_str(), "NGO");
        assert_eq!(
            ClientType::allowed(),
            "INDIVIDUAL, PARTNERSHIP, COMPANY, NGO, OTHER"
        );
        assert_eq!(
            serde_json::to_value(RamisStatus::NotAvailable).unwrap(),
            json!("NOT_AVAILABLE")
        );
    }

    #[test]
    fn test_submission_accepts_numeric_years() {
        let submission: IntakeSubmission = serde_json::from_value(json!({
            "taxReturnYears": { "Income Tax": [2022, "2023"] }
        }))
        .unwrap();

        let years = submission.tax_return_years.unwrap();
        assert_eq!(years["Income Tax"], vec!["2022", "2023"]);
    }

    #[test]
    fn test_submission_tells_null_from_absent() {
        let submission: IntakeSubmission = serde_json::from_value(json!({
            "annualRevenue": null,
            "employeeCount": 12
        }))
        .unwrap();
        assert_eq!(submission.annual_revenue, Some(None));
        assert_eq!(submission.employee_count, Some(Some(12)));
        assert_eq!(submission.credit_limit, None);
    }

    #[test]
    fn test_submission_keeps_consent_raw() {
        let submission: IntakeSubmission =
            serde_json::from_value(json!({ "consent": "true" })).unwrap();
        assert_eq!(submission.consent, Some(json!("true")));
    }
}
