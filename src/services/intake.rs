//! Client intake lifecycle: create, read, update, soft delete, summary.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::audit::{AuditEvent, AuditRecorder};
use super::{RequestContext, Result, ServiceError};
use crate::models::audit::entity;
use crate::models::{AuditAction, ClientIntake, IntakeSubmission, IntakeSummary, Page};
use crate::storage::{IntakeQuery, IntakeStore};
use crate::validation::validate_intake;

/// `createdBy` for submissions made without a token.
pub const UNKNOWN_ACTOR: &str = "unknown";

/// Window for the dashboard's "recent submissions" count.
const RECENT_WINDOW_DAYS: i64 = 30;

#[derive(Clone)]
pub struct IntakeService {
    store: Arc<dyn IntakeStore>,
    audit: AuditRecorder,
    delete_passcode: String,
}

impl IntakeService {
    pub fn new(
        store: Arc<dyn IntakeStore>,
        audit: AuditRecorder,
        delete_passcode: impl Into<String>,
    ) -> Self {
        Self {
            store,
            audit,
            delete_passcode: delete_passcode.into(),
        }
    }

    /// Validate and persist a submission. Open to anonymous callers.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        submission: IntakeSubmission,
    ) -> Result<ClientIntake> {
        let intake = validate_intake(submission)?;
        let created_by = ctx
            .actor
            .as_ref()
            .map_or(UNKNOWN_ACTOR, |a| a.username.as_str());

        let created = self.store.create(&intake, created_by).await?;
        info!(id = %created.id, created_by, "client intake created");

        self.audit
            .record(
                ctx,
                AuditEvent::new(AuditAction::Create, entity::CLIENT_INTAKE, created.id)
                    .after(&created)
                    .intake(created.id),
            )
            .await;
        Ok(created)
    }

    /// Fetch a live intake and record the read.
    pub async fn get(&self, ctx: &RequestContext, id: Uuid) -> Result<ClientIntake> {
        ctx.require_actor()?;
        let intake = self.live(id).await?;

        self.audit
            .record(
                ctx,
                AuditEvent::new(AuditAction::View, entity::CLIENT_INTAKE, id).intake(id),
            )
            .await;
        Ok(intake)
    }

    pub async fn list(&self, ctx: &RequestContext, query: &IntakeQuery) -> Result<Page<ClientIntake>> {
        ctx.require_actor()?;
        Ok(self.store.list(query).await?)
    }

    /// Apply a partial update over the stored record.
    ///
    /// Absent fields keep their stored values, the merged record is
    /// validated with the creation rules, and related parties are replaced
    /// wholesale. The stored version read here guards the write, so a
    /// concurrent update in between fails with `Conflict`.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        submission: IntakeSubmission,
    ) -> Result<ClientIntake> {
        let actor = ctx.require_actor()?;
        let existing = self.live(id).await?;

        let intake = validate_intake(submission.merged_over(&existing))?;
        let updated = self
            .store
            .update(id, existing.version, &intake, &actor.username)
            .await?;
        info!(%id, updated_by = %actor.username, version = updated.version, "client intake updated");

        self.audit
            .record(
                ctx,
                AuditEvent::new(AuditAction::Update, entity::CLIENT_INTAKE, id)
                    .before(&existing)
                    .after(&updated)
                    .intake(id),
            )
            .await;
        Ok(updated)
    }

    /// Soft delete, gated by authentication first and the passcode second.
    pub async fn soft_delete(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        passcode: Option<&str>,
    ) -> Result<ClientIntake> {
        let actor = ctx.require_actor()?;
        if passcode != Some(self.delete_passcode.as_str()) {
            warn!(%id, actor = %actor.username, "delete rejected: bad passcode");
            return Err(ServiceError::Forbidden("invalid delete passcode".to_string()));
        }

        let existing = self.live(id).await?;
        let deleted = self
            .store
            .soft_delete(id, existing.version, &actor.username)
            .await?;
        info!(%id, deleted_by = %actor.username, "client intake soft-deleted");

        self.audit
            .record(
                ctx,
                AuditEvent::new(AuditAction::Delete, entity::CLIENT_INTAKE, id)
                    .before(&existing)
                    .intake(id),
            )
            .await;
        Ok(deleted)
    }

    /// Dashboard counts over live intakes.
    pub async fn summary(&self, ctx: &RequestContext) -> Result<IntakeSummary> {
        ctx.require_actor()?;
        let since = Utc::now() - Duration::days(RECENT_WINDOW_DAYS);
        Ok(self.store.summary(since).await?)
    }

    /// One intake for export, soft-deleted or not.
    pub async fn export_one(&self, ctx: &RequestContext, id: Uuid) -> Result<ClientIntake> {
        ctx.require_actor()?;
        self.store
            .get(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Every live intake for export, oldest first.
    pub async fn export_all(&self, ctx: &RequestContext) -> Result<Vec<ClientIntake>> {
        ctx.require_actor()?;
        Ok(self.store.list_all().await?)
    }

    async fn live(&self, id: Uuid) -> Result<ClientIntake> {
        match self.store.get(id).await? {
            Some(intake) if !intake.is_deleted() => Ok(intake),
            _ => Err(not_found(id)),
        }
    }
}

fn not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("client intake not found: {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Actor;
    use crate::models::UserRole;
    use crate::storage::mock::MockAuditStore;
    use crate::storage::SqliteIntakeStore;
    use crate::test_utils::{intake_payload, memory_pool};
    use crate::validation::errmsg;
    use serde_json::json;

    struct Fixture {
        service: IntakeService,
        audit: Arc<MockAuditStore>,
    }

    async fn fixture() -> Fixture {
        let audit = Arc::new(MockAuditStore::new());
        let store = Arc::new(SqliteIntakeStore::new(memory_pool().await));
        Fixture {
            service: IntakeService::new(store, AuditRecorder::new(audit.clone()), "letmein"),
            audit,
        }
    }

    fn alice() -> RequestContext {
        RequestContext::for_actor(Actor {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            role: UserRole::Staff,
        })
    }

    fn submission(payload: serde_json::Value) -> IntakeSubmission {
        serde_json::from_value(payload).unwrap()
    }

    #[tokio::test]
    async fn test_create_stamps_actor_and_audits() {
        let f = fixture().await;
        let created = f
            .service
            .create(&alice(), submission(intake_payload()))
            .await
            .unwrap();

        assert_eq!(created.created_by, "alice");
        let logs = f.audit.logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, AuditAction::Create);
        assert_eq!(logs[0].entity_id, created.id.to_string());
        assert_eq!(logs[0].client_intake_id, Some(created.id));
        assert!(logs[0].old_values.is_none());
        assert_eq!(logs[0].new_values.as_ref().unwrap()["id"], json!(created.id));
    }

    #[tokio::test]
    async fn test_anonymous_create_is_unknown() {
        let f = fixture().await;
        let created = f
            .service
            .create(&RequestContext::anonymous(), submission(intake_payload()))
            .await
            .unwrap();
        assert_eq!(created.created_by, UNKNOWN_ACTOR);
    }

    #[tokio::test]
    async fn test_create_rejects_missing_consent() {
        let f = fixture().await;
        let mut payload = intake_payload();
        payload["consent"] = json!(false);

        let err = f.service.create(&alice(), submission(payload)).await.unwrap_err();
        let ServiceError::Validation(errors) = err else {
            panic!("expected validation error, got {:?}", err);
        };
        assert!(errors.has_field("consent"));
        assert!(errors.errors()[0].message.contains("consent"));
        assert!(f.audit.logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_succeeds_when_audit_fails() {
        let f = fixture().await;
        f.audit.set_fail_on_append(true).await;

        let created = f
            .service
            .create(&alice(), submission(intake_payload()))
            .await
            .unwrap();
        assert_eq!(created.details.legal_name, "Acme Ltd");
    }

    #[tokio::test]
    async fn test_update_merges_and_replaces_parties() {
        let f = fixture().await;
        let ctx = alice();
        let mut payload = intake_payload();
        payload["relatedParties"] = json!([
            { "name": "A" }, { "name": "B" }, { "name": "C" }
        ]);
        let created = f.service.create(&ctx, submission(payload)).await.unwrap();

        let updated = f
            .service
            .update(
                &ctx,
                created.id,
                submission(json!({ "tradeName": "Acme", "relatedParties": [] })),
            )
            .await
            .unwrap();

        assert_eq!(updated.details.trade_name.as_deref(), Some("Acme"));
        assert_eq!(updated.details.legal_name, "Acme Ltd");
        assert!(updated.related_parties.is_empty());
        assert_eq!(updated.updated_by.as_deref(), Some("alice"));

        let logs = f.audit.logs().await;
        let update = logs.last().unwrap();
        assert_eq!(update.action, AuditAction::Update);
        let old = update.old_values.as_ref().unwrap();
        assert_eq!(old["relatedParties"].as_array().unwrap().len(), 3);
        assert_eq!(update.new_values.as_ref().unwrap()["tradeName"], "Acme");
    }

    #[tokio::test]
    async fn test_update_null_clears_numbers() {
        let f = fixture().await;
        let ctx = alice();
        let mut payload = intake_payload();
        payload["annualRevenue"] = json!(250000.5);
        payload["employeeCount"] = json!(14);
        payload["creditLimit"] = json!(5000);
        let created = f.service.create(&ctx, submission(payload)).await.unwrap();
        assert_eq!(created.details.employee_count, Some(14));

        let kept = f
            .service
            .update(&ctx, created.id, submission(json!({ "notes": "call back" })))
            .await
            .unwrap();
        assert_eq!(kept.details.annual_revenue, Some(250000.5));
        assert_eq!(kept.details.employee_count, Some(14));
        assert_eq!(kept.details.credit_limit, Some(5000.0));

        let cleared = f
            .service
            .update(
                &ctx,
                created.id,
                submission(json!({
                    "annualRevenue": null,
                    "employeeCount": null,
                    "creditLimit": null
                })),
            )
            .await
            .unwrap();
        assert_eq!(cleared.details.annual_revenue, None);
        assert_eq!(cleared.details.employee_count, None);
        assert_eq!(cleared.details.credit_limit, None);
        assert_eq!(cleared.details.legal_name, "Acme Ltd");
    }

    #[tokio::test]
    async fn test_update_revalidates_merged_record() {
        let f = fixture().await;
        let ctx = alice();
        let created = f
            .service
            .create(&ctx, submission(intake_payload()))
            .await
            .unwrap();

        let err = f
            .service
            .update(&ctx, created.id, submission(json!({ "companySecretary": "" })))
            .await
            .unwrap_err();
        let ServiceError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.errors()[0].message, errmsg::COMPANY_SECRETARY_REQUIRED);
    }

    #[tokio::test]
    async fn test_update_requires_actor() {
        let f = fixture().await;
        let created = f
            .service
            .create(&alice(), submission(intake_payload()))
            .await
            .unwrap();

        let err = f
            .service
            .update(&RequestContext::anonymous(), created.id, submission(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .update(&alice(), Uuid::new_v4(), submission(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_checks_auth_then_passcode() {
        let f = fixture().await;
        let created = f
            .service
            .create(&alice(), submission(intake_payload()))
            .await
            .unwrap();

        let err = f
            .service
            .soft_delete(&RequestContext::anonymous(), created.id, Some("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let err = f
            .service
            .soft_delete(&alice(), created.id, Some("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = f
            .service
            .soft_delete(&alice(), created.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let page = f.service.list(&alice(), &IntakeQuery::default()).await.unwrap();
        assert_eq!(page.pagination.total, 1);
    }

    #[tokio::test]
    async fn test_delete_hides_record_and_audits_snapshot() {
        let f = fixture().await;
        let ctx = alice();
        let mut payload = intake_payload();
        payload["relatedParties"] = json!([{ "name": "A" }]);
        let created = f.service.create(&ctx, submission(payload)).await.unwrap();

        let deleted = f
            .service
            .soft_delete(&ctx, created.id, Some("letmein"))
            .await
            .unwrap();
        assert_eq!(deleted.deleted_by.as_deref(), Some("alice"));

        let page = f.service.list(&ctx, &IntakeQuery::default()).await.unwrap();
        assert_eq!(page.pagination.total, 0);
        assert!(matches!(
            f.service.get(&ctx, created.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.soft_delete(&ctx, created.id, Some("letmein")).await,
            Err(ServiceError::NotFound(_))
        ));
        // Export by id still reaches it.
        assert!(f.service.export_one(&ctx, created.id).await.is_ok());

        let logs = f.audit.logs().await;
        let delete = logs
            .iter()
            .find(|l| l.action == AuditAction::Delete)
            .unwrap();
        assert!(delete.new_values.is_none());
        let old = delete.old_values.as_ref().unwrap();
        assert_eq!(old["legalName"], "Acme Ltd");
        assert_eq!(old["relatedParties"][0]["name"], "A");
    }

    #[tokio::test]
    async fn test_get_records_view() {
        let f = fixture().await;
        let ctx = alice();
        let created = f
            .service
            .create(&ctx, submission(intake_payload()))
            .await
            .unwrap();

        let fetched = f.service.get(&ctx, created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
        let logs = f.audit.logs().await;
        assert_eq!(logs.last().unwrap().action, AuditAction::View);
    }

    #[tokio::test]
    async fn test_reads_require_actor() {
        let f = fixture().await;
        let anonymous = RequestContext::anonymous();
        assert!(matches!(
            f.service.list(&anonymous, &IntakeQuery::default()).await,
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            f.service.summary(&anonymous).await,
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            f.service.export_all(&anonymous).await,
            Err(ServiceError::Unauthorized(_))
        ));
    }
}
