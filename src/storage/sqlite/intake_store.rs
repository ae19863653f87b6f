//! SQLite IntakeStore implementation.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{
    Asterisk, Cond, Expr, Func, LikeExpr, Order, Query, SimpleExpr, SqliteQueryBuilder,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::{
    begin_immediate, contains_pattern, fold_case, format_timestamp, get_count, get_enum,
    get_json, get_opt_date, get_opt_timestamp, get_timestamp, get_uuid, now, LIKE_ESCAPE,
};
use crate::models::{
    ClientIntake, ClientType, IntakeDetails, IntakeSummary, NewIntake, NewRelatedParty, Page,
    Pagination, Priority, RamisStatus, RelatedParty, SortOrder,
};
use crate::storage::schema::{ClientIntakes, RelatedParties};
use crate::storage::{IntakeQuery, IntakeSortField, IntakeStore, Result, StoreError};

const ENTITY: &str = "ClientIntake";

/// SQLite-backed intake store.
pub struct SqliteIntakeStore {
    pool: SqlitePool,
}

impl SqliteIntakeStore {
    /// Create a new SQLite intake store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Column/value pairs for every validated field.
    fn detail_values(d: &IntakeDetails) -> Result<Vec<(ClientIntakes, SimpleExpr)>> {
        Ok(vec![
            (ClientIntakes::LegalName, d.legal_name.clone().into()),
            (ClientIntakes::TradeName, d.trade_name.clone().into()),
            (ClientIntakes::ClientType, d.client_type.as_str().into()),
            (ClientIntakes::OwnerName, d.owner_name.clone().into()),
            (ClientIntakes::Address, d.address.clone().into()),
            (ClientIntakes::City, d.city.clone().into()),
            (ClientIntakes::State, d.state.clone().into()),
            (ClientIntakes::ZipCode, d.zip_code.clone().into()),
            (ClientIntakes::Country, d.country.clone().into()),
            (ClientIntakes::Phone, d.phone.clone().into()),
            (ClientIntakes::Mobile, d.mobile.clone().into()),
            (ClientIntakes::Email, d.email.clone().into()),
            (ClientIntakes::Website, d.website.clone().into()),
            (ClientIntakes::Industry, d.industry.clone().into()),
            (ClientIntakes::Priority, d.priority.as_str().into()),
            (ClientIntakes::Tin, d.tin.clone().into()),
            (ClientIntakes::RamisStatus, d.ramis_status.as_str().into()),
            (
                ClientIntakes::ServicesSelected,
                serde_json::to_string(&d.services_selected)?.into(),
            ),
            (
                ClientIntakes::DirectTaxSubcategories,
                serde_json::to_string(&d.direct_tax_subcategories)?.into(),
            ),
            (
                ClientIntakes::IndirectTaxSubcategories,
                serde_json::to_string(&d.indirect_tax_subcategories)?.into(),
            ),
            (ClientIntakes::TaxTypes, serde_json::to_string(&d.tax_types)?.into()),
            (
                ClientIntakes::IncomeTaxTypes,
                serde_json::to_string(&d.income_tax_types)?.into(),
            ),
            (
                ClientIntakes::TaxSubSelections,
                serde_json::to_string(&d.tax_sub_selections)?.into(),
            ),
            (
                ClientIntakes::TaxReturnYears,
                serde_json::to_string(&d.tax_return_years)?.into(),
            ),
            (ClientIntakes::CompanySecretary, d.company_secretary.clone().into()),
            (
                ClientIntakes::RegistrationNumber,
                d.registration_number.clone().into(),
            ),
            (
                ClientIntakes::IncorporationDate,
                d.incorporation_date
                    .map(|date| date.format("%Y-%m-%d").to_string())
                    .into(),
            ),
            (ClientIntakes::AnnualRevenue, d.annual_revenue.into()),
            (ClientIntakes::EmployeeCount, d.employee_count.into()),
            (
                ClientIntakes::CertificateOfIncorporationProvided,
                d.certificate_of_incorporation_provided.into(),
            ),
            (
                ClientIntakes::TinCertificateProvided,
                d.tin_certificate_provided.into(),
            ),
            (ClientIntakes::MemorandumProvided, d.memorandum_provided.into()),
            (ClientIntakes::IdDocumentProvided, d.id_document_provided.into()),
            (ClientIntakes::OtherDocument1, d.other_document1.clone().into()),
            (ClientIntakes::OtherDocument2, d.other_document2.clone().into()),
            (ClientIntakes::CreditLimit, d.credit_limit.into()),
            (ClientIntakes::PaymentTerms, d.payment_terms.clone().into()),
            (ClientIntakes::Currency, d.currency.clone().into()),
            (ClientIntakes::Notes, d.notes.clone().into()),
            (ClientIntakes::Consent, d.consent.into()),
            (ClientIntakes::LegalNameLc, fold_case(&d.legal_name).into()),
            (
                ClientIntakes::EmailLc,
                d.email.as_deref().map(fold_case).into(),
            ),
            (ClientIntakes::OwnerNameLc, fold_case(&d.owner_name).into()),
        ])
    }

    fn intake_from_row(row: &SqliteRow) -> Result<ClientIntake> {
        let details = IntakeDetails {
            legal_name: row.try_get("legal_name")?,
            trade_name: row.try_get("trade_name")?,
            client_type: get_enum(row, "client_type", ClientType::parse)?,
            owner_name: row.try_get("owner_name")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            zip_code: row.try_get("zip_code")?,
            country: row.try_get("country")?,
            phone: row.try_get("phone")?,
            mobile: row.try_get("mobile")?,
            email: row.try_get("email")?,
            website: row.try_get("website")?,
            industry: row.try_get("industry")?,
            priority: get_enum(row, "priority", Priority::parse)?,
            tin: row.try_get("tin")?,
            ramis_status: get_enum(row, "ramis_status", RamisStatus::parse)?,
            services_selected: get_json(row, "services_selected")?,
            direct_tax_subcategories: get_json(row, "direct_tax_subcategories")?,
            indirect_tax_subcategories: get_json(row, "indirect_tax_subcategories")?,
            tax_types: get_json(row, "tax_types")?,
            income_tax_types: get_json(row, "income_tax_types")?,
            tax_sub_selections: get_json(row, "tax_sub_selections")?,
            tax_return_years: get_json(row, "tax_return_years")?,
            company_secretary: row.try_get("company_secretary")?,
            registration_number: row.try_get("registration_number")?,
            incorporation_date: get_opt_date(row, "incorporation_date")?,
            annual_revenue: row.try_get("annual_revenue")?,
            employee_count: row.try_get("employee_count")?,
            certificate_of_incorporation_provided: row
                .try_get("certificate_of_incorporation_provided")?,
            tin_certificate_provided: row.try_get("tin_certificate_provided")?,
            memorandum_provided: row.try_get("memorandum_provided")?,
            id_document_provided: row.try_get("id_document_provided")?,
            other_document1: row.try_get("other_document1")?,
            other_document2: row.try_get("other_document2")?,
            credit_limit: row.try_get("credit_limit")?,
            payment_terms: row.try_get("payment_terms")?,
            currency: row.try_get("currency")?,
            notes: row.try_get("notes")?,
            consent: row.try_get("consent")?,
        };

        Ok(ClientIntake {
            id: get_uuid(row, "id")?,
            details,
            created_by: row.try_get("created_by")?,
            updated_by: row.try_get("updated_by")?,
            submitted_at: get_timestamp(row, "submitted_at")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
            deleted_by: row.try_get("deleted_by")?,
            deleted_at: get_opt_timestamp(row, "deleted_at")?,
            version: row.try_get("version")?,
            related_parties: Vec::new(),
        })
    }

    fn party_from_row(row: &SqliteRow) -> Result<RelatedParty> {
        Ok(RelatedParty {
            id: get_uuid(row, "id")?,
            client_intake_id: get_uuid(row, "client_intake_id")?,
            name: row.try_get("name")?,
            relationship: row.try_get("relationship")?,
            tin: row.try_get("tin")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }

    /// Insert parties in submission order within an already-started transaction.
    async fn insert_parties(
        conn: &mut SqliteConnection,
        intake_id: Uuid,
        parties: &[NewRelatedParty],
        created_at: &str,
    ) -> Result<()> {
        for (position, party) in parties.iter().enumerate() {
            let query = Query::insert()
                .into_table(RelatedParties::Table)
                .columns([
                    RelatedParties::Id,
                    RelatedParties::ClientIntakeId,
                    RelatedParties::Position,
                    RelatedParties::Name,
                    RelatedParties::Relationship,
                    RelatedParties::Tin,
                    RelatedParties::Email,
                    RelatedParties::Phone,
                    RelatedParties::CreatedAt,
                ])
                .values_panic([
                    Uuid::new_v4().to_string().into(),
                    intake_id.to_string().into(),
                    (position as i64).into(),
                    party.name.clone().into(),
                    party.relationship.clone().into(),
                    party.tin.clone().into(),
                    party.email.clone().into(),
                    party.phone.clone().into(),
                    created_at.into(),
                ])
                .to_string(SqliteQueryBuilder);

            sqlx::query(&query).execute(&mut *conn).await?;
        }
        Ok(())
    }

    async fn insert_intake(
        conn: &mut SqliteConnection,
        id: Uuid,
        intake: &NewIntake,
        created_by: &str,
        created_at: &str,
    ) -> Result<()> {
        let mut values = Self::detail_values(&intake.details)?;
        values.extend([
            (ClientIntakes::Id, id.to_string().into()),
            (ClientIntakes::CreatedBy, created_by.into()),
            (ClientIntakes::SubmittedAt, created_at.into()),
            (ClientIntakes::CreatedAt, created_at.into()),
            (ClientIntakes::UpdatedAt, created_at.into()),
            (ClientIntakes::Version, 1i64.into()),
        ]);
        let (columns, exprs): (Vec<_>, Vec<_>) = values.into_iter().unzip();

        let query = Query::insert()
            .into_table(ClientIntakes::Table)
            .columns(columns)
            .values_panic(exprs)
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&mut *conn).await?;

        Self::insert_parties(conn, id, &intake.related_parties, created_at).await
    }

    async fn apply_update(
        conn: &mut SqliteConnection,
        id: Uuid,
        expected_version: i64,
        intake: &NewIntake,
        updated_by: &str,
        updated_at: &str,
    ) -> Result<()> {
        let mut values = Self::detail_values(&intake.details)?;
        values.extend([
            (ClientIntakes::UpdatedBy, updated_by.into()),
            (ClientIntakes::UpdatedAt, updated_at.into()),
            (
                ClientIntakes::Version,
                Expr::col(ClientIntakes::Version).add(1),
            ),
        ]);

        let query = Query::update()
            .table(ClientIntakes::Table)
            .values(values)
            .and_where(Expr::col(ClientIntakes::Id).eq(id.to_string()))
            .and_where(Expr::col(ClientIntakes::Version).eq(expected_version))
            .and_where(Expr::col(ClientIntakes::DeletedAt).is_null())
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(Self::missed_write(conn, id).await);
        }

        // Parties are replaced wholesale.
        let query = Query::delete()
            .from_table(RelatedParties::Table)
            .and_where(Expr::col(RelatedParties::ClientIntakeId).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&mut *conn).await?;

        Self::insert_parties(conn, id, &intake.related_parties, updated_at).await
    }

    async fn apply_soft_delete(
        conn: &mut SqliteConnection,
        id: Uuid,
        expected_version: i64,
        deleted_by: &str,
        deleted_at: &str,
    ) -> Result<()> {
        let query = Query::update()
            .table(ClientIntakes::Table)
            .values([
                (ClientIntakes::DeletedBy, deleted_by.into()),
                (ClientIntakes::DeletedAt, deleted_at.into()),
                (
                    ClientIntakes::Version,
                    Expr::col(ClientIntakes::Version).add(1),
                ),
            ])
            .and_where(Expr::col(ClientIntakes::Id).eq(id.to_string()))
            .and_where(Expr::col(ClientIntakes::Version).eq(expected_version))
            .and_where(Expr::col(ClientIntakes::DeletedAt).is_null())
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(Self::missed_write(conn, id).await);
        }
        Ok(())
    }

    /// Explain why a versioned write matched no row.
    async fn missed_write(conn: &mut SqliteConnection, id: Uuid) -> StoreError {
        let query = Query::select()
            .column(ClientIntakes::DeletedAt)
            .from(ClientIntakes::Table)
            .and_where(Expr::col(ClientIntakes::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).fetch_optional(&mut *conn).await {
            Ok(Some(row)) => match row.try_get::<Option<String>, _>("deleted_at") {
                Ok(None) => StoreError::Conflict(format!(
                    "client intake {} was modified concurrently",
                    id
                )),
                Ok(Some(_)) => StoreError::not_found(ENTITY, id),
                Err(e) => e.into(),
            },
            Ok(None) => StoreError::not_found(ENTITY, id),
            Err(e) => e.into(),
        }
    }

    /// Attach related parties to already-loaded intakes.
    async fn load_parties(&self, intakes: &mut [ClientIntake]) -> Result<()> {
        if intakes.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = intakes.iter().map(|i| i.id.to_string()).collect();
        let query = Query::select()
            .column(Asterisk)
            .from(RelatedParties::Table)
            .and_where(Expr::col(RelatedParties::ClientIntakeId).is_in(ids))
            .order_by(RelatedParties::ClientIntakeId, Order::Asc)
            .order_by(RelatedParties::Position, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut by_intake: HashMap<Uuid, Vec<RelatedParty>> = HashMap::new();
        for row in rows {
            let party = Self::party_from_row(&row)?;
            by_intake
                .entry(party.client_intake_id)
                .or_default()
                .push(party);
        }

        for intake in intakes.iter_mut() {
            intake.related_parties = by_intake.remove(&intake.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn fetch_intakes(&self, query: &str) -> Result<Vec<ClientIntake>> {
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        let mut intakes = rows
            .iter()
            .map(Self::intake_from_row)
            .collect::<Result<Vec<_>>>()?;
        self.load_parties(&mut intakes).await?;
        Ok(intakes)
    }

    async fn fetch_count(&self, query: &str) -> Result<u64> {
        let row = sqlx::query(query).fetch_one(&self.pool).await?;
        get_count(&row, 0)
    }

    /// Predicate shared by the page query and its count.
    fn filter_condition(query: &IntakeQuery) -> Cond {
        let mut cond = Cond::all().add(Expr::col(ClientIntakes::DeletedAt).is_null());

        if let Some(client_type) = query.client_type {
            cond = cond.add(Expr::col(ClientIntakes::ClientType).eq(client_type.as_str()));
        }
        if let Some(status) = query.ramis_status {
            cond = cond.add(Expr::col(ClientIntakes::RamisStatus).eq(status.as_str()));
        }
        if let Some(service) = &query.service {
            cond = cond.add(Expr::cust_with_values(
                "EXISTS (SELECT 1 FROM json_each(client_intakes.services_selected) WHERE json_each.value = ?)",
                [service.clone()],
            ));
        }
        if let Some(tax_type) = &query.tax_type {
            cond = cond.add(Expr::cust_with_values(
                "EXISTS (SELECT 1 FROM json_each(client_intakes.tax_types) WHERE json_each.value = ?)",
                [tax_type.clone()],
            ));
        }
        if let Some(term) = query.search.as_deref().filter(|t| !t.is_empty()) {
            let pattern = contains_pattern(term);
            let matches = |column: ClientIntakes| {
                Expr::col(column).like(LikeExpr::new(pattern.clone()).escape(LIKE_ESCAPE))
            };
            cond = cond.add(
                Cond::any()
                    .add(matches(ClientIntakes::LegalNameLc))
                    .add(matches(ClientIntakes::EmailLc))
                    .add(matches(ClientIntakes::OwnerNameLc)),
            );
        }
        cond
    }

    fn sort_column(field: IntakeSortField) -> ClientIntakes {
        match field {
            IntakeSortField::LegalName => ClientIntakes::LegalName,
            IntakeSortField::TradeName => ClientIntakes::TradeName,
            IntakeSortField::Type => ClientIntakes::ClientType,
            IntakeSortField::OwnerName => ClientIntakes::OwnerName,
            IntakeSortField::Email => ClientIntakes::Email,
            IntakeSortField::City => ClientIntakes::City,
            IntakeSortField::Country => ClientIntakes::Country,
            IntakeSortField::Industry => ClientIntakes::Industry,
            IntakeSortField::Priority => ClientIntakes::Priority,
            IntakeSortField::RamisStatus => ClientIntakes::RamisStatus,
            IntakeSortField::CreatedAt => ClientIntakes::CreatedAt,
            IntakeSortField::UpdatedAt => ClientIntakes::UpdatedAt,
            IntakeSortField::SubmittedAt => ClientIntakes::SubmittedAt,
        }
    }

    /// `column -> count` over non-deleted intakes.
    async fn group_counts(&self, column: ClientIntakes) -> Result<BTreeMap<String, u64>> {
        let query = Query::select()
            .column(column)
            .expr(Func::count(Expr::col(Asterisk)))
            .from(ClientIntakes::Table)
            .and_where(Expr::col(ClientIntakes::DeletedAt).is_null())
            .group_by_col(column)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let key: String = row.try_get(0)?;
            counts.insert(key, get_count(&row, 1)?);
        }
        Ok(counts)
    }
}

pub(super) fn sql_order(order: SortOrder) -> Order {
    match order {
        SortOrder::Asc => Order::Asc,
        SortOrder::Desc => Order::Desc,
    }
}

#[async_trait]
impl IntakeStore for SqliteIntakeStore {
    async fn create(&self, intake: &NewIntake, created_by: &str) -> Result<ClientIntake> {
        let id = Uuid::new_v4();
        let created_at = format_timestamp(&now());

        let mut tx = begin_immediate(&self.pool).await?;
        Self::insert_intake(&mut *tx, id, intake, created_by, &created_at).await?;
        tx.commit().await?;
        debug!(%id, parties = intake.related_parties.len(), "client intake inserted");

        self.get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(ENTITY, id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<ClientIntake>> {
        let query = Query::select()
            .column(Asterisk)
            .from(ClientIntakes::Table)
            .and_where(Expr::col(ClientIntakes::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        Ok(self.fetch_intakes(&query).await?.into_iter().next())
    }

    async fn list(&self, query: &IntakeQuery) -> Result<Page<ClientIntake>> {
        let cond = Self::filter_condition(query);
        let order = sql_order(query.sort_order);

        let count_query = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(ClientIntakes::Table)
            .cond_where(cond.clone())
            .to_string(SqliteQueryBuilder);

        let Some(offset) = Pagination::offset(query.page, query.limit) else {
            let total = self.fetch_count(&count_query).await?;
            return Ok(Page::empty(query.page, query.limit, total));
        };

        let page_query = Query::select()
            .column(Asterisk)
            .from(ClientIntakes::Table)
            .cond_where(cond)
            .order_by(Self::sort_column(query.sort_by), order.clone())
            .order_by(ClientIntakes::Id, order)
            .limit(query.limit)
            .offset(offset)
            .to_string(SqliteQueryBuilder);

        let (total, items) = tokio::try_join!(
            self.fetch_count(&count_query),
            self.fetch_intakes(&page_query)
        )?;

        Ok(Page {
            items,
            pagination: Pagination::new(query.page, query.limit, total),
        })
    }

    async fn list_all(&self) -> Result<Vec<ClientIntake>> {
        let query = Query::select()
            .column(Asterisk)
            .from(ClientIntakes::Table)
            .and_where(Expr::col(ClientIntakes::DeletedAt).is_null())
            .order_by(ClientIntakes::CreatedAt, Order::Asc)
            .order_by(ClientIntakes::Id, Order::Asc)
            .to_string(SqliteQueryBuilder);

        self.fetch_intakes(&query).await
    }

    async fn update(
        &self,
        id: Uuid,
        expected_version: i64,
        intake: &NewIntake,
        updated_by: &str,
    ) -> Result<ClientIntake> {
        let updated_at = format_timestamp(&now());

        let mut tx = begin_immediate(&self.pool).await?;
        Self::apply_update(&mut *tx, id, expected_version, intake, updated_by, &updated_at).await?;
        tx.commit().await?;

        self.get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(ENTITY, id))
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        expected_version: i64,
        deleted_by: &str,
    ) -> Result<ClientIntake> {
        let deleted_at = format_timestamp(&now());

        let mut tx = begin_immediate(&self.pool).await?;
        Self::apply_soft_delete(&mut *tx, id, expected_version, deleted_by, &deleted_at).await?;
        tx.commit().await?;

        self.get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(ENTITY, id))
    }

    async fn summary(&self, since: DateTime<Utc>) -> Result<IntakeSummary> {
        let total_query = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(ClientIntakes::Table)
            .and_where(Expr::col(ClientIntakes::DeletedAt).is_null())
            .to_string(SqliteQueryBuilder);

        let recent_query = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(ClientIntakes::Table)
            .and_where(Expr::col(ClientIntakes::DeletedAt).is_null())
            .and_where(Expr::col(ClientIntakes::SubmittedAt).gte(format_timestamp(&since)))
            .to_string(SqliteQueryBuilder);

        let (total, by_type, by_ramis_status, by_priority, submitted_last_30_days) = tokio::try_join!(
            self.fetch_count(&total_query),
            self.group_counts(ClientIntakes::ClientType),
            self.group_counts(ClientIntakes::RamisStatus),
            self.group_counts(ClientIntakes::Priority),
            self.fetch_count(&recent_query),
        )?;

        Ok(IntakeSummary {
            total,
            by_type,
            by_ramis_status,
            by_priority,
            submitted_last_30_days,
        })
    }
}
