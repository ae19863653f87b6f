//! Cell layout shared by every export sink.
//!
//! Both the delimited-text and workbook writers render the tables built
//! here, so the two formats always show identical cell strings.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::{ClientIntake, RelatedParty};

/// Party slots in the flattened all-records table. Further parties are
/// dropped from that view only.
pub const FLATTENED_PARTY_SLOTS: usize = 4;

pub const CLIENT_SHEET: &str = "Client Information";
pub const PARTIES_SHEET: &str = "Related Parties";
pub const ALL_CLIENTS_SHEET: &str = "Client Intakes";

/// A header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A named table, one worksheet in a workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: &'static str,
    pub table: Table,
}

type Column = (&'static str, fn(&ClientIntake) -> String);

const CLIENT_COLUMNS: &[Column] = &[
    ("ID", |c| c.id.to_string()),
    ("Legal Name", |c| c.details.legal_name.clone()),
    ("Trade Name", |c| text(&c.details.trade_name)),
    ("Type", |c| c.details.client_type.to_string()),
    ("Owner Name", |c| c.details.owner_name.clone()),
    ("Address", |c| c.details.address.clone()),
    ("City", |c| text(&c.details.city)),
    ("State", |c| text(&c.details.state)),
    ("Zip Code", |c| text(&c.details.zip_code)),
    ("Country", |c| text(&c.details.country)),
    ("Phone", |c| text(&c.details.phone)),
    ("Mobile", |c| text(&c.details.mobile)),
    ("Email", |c| text(&c.details.email)),
    ("Website", |c| text(&c.details.website)),
    ("Industry", |c| text(&c.details.industry)),
    ("Priority", |c| c.details.priority.to_string()),
    ("TIN", |c| text(&c.details.tin)),
    ("RAMIS Status", |c| c.details.ramis_status.to_string()),
    ("Services Selected", |c| join_list(&c.details.services_selected)),
    ("Direct Tax Subcategories", |c| {
        join_list(&c.details.direct_tax_subcategories)
    }),
    ("Indirect Tax Subcategories", |c| {
        join_list(&c.details.indirect_tax_subcategories)
    }),
    ("Tax Types", |c| join_list(&c.details.tax_types)),
    ("Income Tax Types", |c| join_list(&c.details.income_tax_types)),
    ("Tax Sub-Selections", |c| join_groups(&c.details.tax_sub_selections)),
    ("Tax Return Years", |c| join_groups(&c.details.tax_return_years)),
    ("Company Secretary", |c| text(&c.details.company_secretary)),
    ("Registration Number", |c| text(&c.details.registration_number)),
    ("Incorporation Date", |c| {
        c.details
            .incorporation_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }),
    ("Annual Revenue", |c| number(c.details.annual_revenue)),
    ("Employee Count", |c| {
        c.details
            .employee_count
            .map(|n| n.to_string())
            .unwrap_or_default()
    }),
    ("Certificate of Incorporation Provided", |c| {
        yes_no(c.details.certificate_of_incorporation_provided)
    }),
    ("TIN Certificate Provided", |c| {
        yes_no(c.details.tin_certificate_provided)
    }),
    ("Memorandum Provided", |c| yes_no(c.details.memorandum_provided)),
    ("ID Document Provided", |c| yes_no(c.details.id_document_provided)),
    ("Other Document 1", |c| text(&c.details.other_document1)),
    ("Other Document 2", |c| text(&c.details.other_document2)),
    ("Credit Limit", |c| number(c.details.credit_limit)),
    ("Payment Terms", |c| text(&c.details.payment_terms)),
    ("Currency", |c| text(&c.details.currency)),
    ("Notes", |c| text(&c.details.notes)),
    ("Consent", |c| yes_no(c.details.consent)),
    ("Created By", |c| c.created_by.clone()),
    ("Updated By", |c| text(&c.updated_by)),
    ("Submitted At", |c| timestamp(Some(c.submitted_at))),
    ("Created At", |c| timestamp(Some(c.created_at))),
    ("Updated At", |c| timestamp(Some(c.updated_at))),
    ("Deleted By", |c| text(&c.deleted_by)),
    ("Deleted At", |c| timestamp(c.deleted_at)),
];

const PARTY_HEADERS: [&str; 5] = ["Name", "Relationship", "TIN", "Email", "Phone"];

fn party_cells(party: &RelatedParty) -> [String; 5] {
    [
        party.name.clone(),
        text(&party.relationship),
        text(&party.tin),
        text(&party.email),
        text(&party.phone),
    ]
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number(value: Option<f64>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

pub fn yes_no(value: bool) -> String {
    let label = if value { "Yes" } else { "No" };
    label.to_string()
}

/// `a, b, c`
pub fn join_list(values: &[String]) -> String {
    values.join(", ")
}

/// `Category: a, b | Category2: c`
pub fn join_groups(groups: &BTreeMap<String, Vec<String>>) -> String {
    groups
        .iter()
        .map(|(category, values)| format!("{}: {}", category, join_list(values)))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Field/value rows describing one client.
pub fn client_table(intake: &ClientIntake) -> Table {
    Table {
        headers: vec!["Field".to_string(), "Value".to_string()],
        rows: CLIENT_COLUMNS
            .iter()
            .map(|(label, cell)| vec![label.to_string(), cell(intake)])
            .collect(),
    }
}

/// One row per related party, unbounded.
pub fn party_table(parties: &[RelatedParty]) -> Table {
    Table {
        headers: PARTY_HEADERS.iter().map(|h| h.to_string()).collect(),
        rows: parties.iter().map(|p| party_cells(p).to_vec()).collect(),
    }
}

/// One wide row per client with parties flattened into numbered slots.
pub fn flattened_table(intakes: &[ClientIntake]) -> Table {
    let mut headers: Vec<String> = CLIENT_COLUMNS
        .iter()
        .map(|(label, _)| label.to_string())
        .collect();
    for slot in 1..=FLATTENED_PARTY_SLOTS {
        headers.extend(
            PARTY_HEADERS
                .iter()
                .map(|h| format!("Party {} {}", slot, h)),
        );
    }

    let rows = intakes
        .iter()
        .map(|intake| {
            let mut row: Vec<String> = CLIENT_COLUMNS.iter().map(|(_, cell)| cell(intake)).collect();
            for slot in 0..FLATTENED_PARTY_SLOTS {
                match intake.related_parties.get(slot) {
                    Some(party) => row.extend(party_cells(party)),
                    None => row.extend(std::iter::repeat_n(String::new(), PARTY_HEADERS.len())),
                }
            }
            row
        })
        .collect();

    Table { headers, rows }
}

/// Sheets for a single-client export; the parties sheet only when non-empty.
pub fn single_record_sheets(intake: &ClientIntake) -> Vec<Sheet> {
    let mut sheets = vec![Sheet {
        name: CLIENT_SHEET,
        table: client_table(intake),
    }];
    if !intake.related_parties.is_empty() {
        sheets.push(Sheet {
            name: PARTIES_SHEET,
            table: party_table(&intake.related_parties),
        });
    }
    sheets
}

pub fn all_records_sheets(intakes: &[ClientIntake]) -> Vec<Sheet> {
    vec![Sheet {
        name: ALL_CLIENTS_SHEET,
        table: flattened_table(intakes),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::{intake, party};

    fn cell<'a>(table: &'a Table, label: &str) -> &'a str {
        &table
            .rows
            .iter()
            .find(|row| row[0] == label)
            .unwrap_or_else(|| panic!("missing row {label}"))[1]
    }

    #[test]
    fn test_multi_values_and_year_groups() {
        let mut c = intake(0);
        c.details.services_selected = vec!["Direct Tax".into(), "Bookkeeping".into()];
        c.details.tax_return_years =
            BTreeMap::from([
                ("Income Tax".to_string(), vec!["2022".to_string(), "2023".to_string()]),
                ("VAT".to_string(), vec!["2023".to_string()]),
            ]);

        let table = client_table(&c);
        assert_eq!(cell(&table, "Services Selected"), "Direct Tax, Bookkeeping");
        assert_eq!(
            cell(&table, "Tax Return Years"),
            "Income Tax: 2022, 2023 | VAT: 2023"
        );
    }

    #[test]
    fn test_missing_optionals_are_empty() {
        let table = client_table(&intake(0));
        assert_eq!(cell(&table, "Trade Name"), "");
        assert_eq!(cell(&table, "Annual Revenue"), "");
        assert_eq!(cell(&table, "Deleted At"), "");
        assert_eq!(cell(&table, "Memorandum Provided"), "No");
        assert_eq!(cell(&table, "Consent"), "Yes");
        assert!(table.rows.iter().all(|r| !r[1].contains("null")));
    }

    #[test]
    fn test_party_sheet_omitted_when_empty() {
        let c = intake(0);
        let sheets = single_record_sheets(&c);
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].name, CLIENT_SHEET);

        let sheets = single_record_sheets(&intake(2));
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[1].name, PARTIES_SHEET);
        assert_eq!(sheets[1].table.rows.len(), 2);
    }

    #[test]
    fn test_single_record_keeps_every_party() {
        let sheets = single_record_sheets(&intake(6));
        assert_eq!(sheets[1].table.rows.len(), 6);
    }

    #[test]
    fn test_flattened_drops_parties_beyond_four() {
        let table = flattened_table(&[intake(6), intake(1)]);
        let width = CLIENT_COLUMNS.len() + FLATTENED_PARTY_SLOTS * PARTY_HEADERS.len();
        assert_eq!(table.headers.len(), width);
        assert!(table.rows.iter().all(|r| r.len() == width));

        let last_slot = table
            .headers
            .iter()
            .position(|h| h == "Party 4 Name")
            .unwrap();
        assert_eq!(table.rows[0][last_slot], "Party 4");
        assert!(!table.rows[0].iter().any(|c| c == "Party 5"));
        assert_eq!(table.rows[1][last_slot], "");
    }

    #[test]
    fn test_party_cells() {
        let mut p = party(1);
        p.email = None;
        assert_eq!(party_cells(&p), ["Party 1", "Director", "", "", ""].map(String::from));
    }
}
