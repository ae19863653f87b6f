//! Unit tests for the SQLite stores (in-memory).

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::models::{
    AuditAction, NewAuditLog, NewDepartment, NewRole, NewStaff, NewUser, RamisStatus,
    SortOrder, UpdateDepartment, UpdateStaff, UserRole,
};
use crate::storage::sqlite::{SqliteAuditStore, SqliteIntakeStore, SqliteStaffStore};
use crate::storage::{
    AuditQuery, AuditStore, IntakeQuery, IntakeSortField, IntakeStore, StaffQuery, StaffStore,
    StoreError, UserStore,
};
use crate::test_utils::{intake_payload, memory_pool, named_intake, new_intake};

async fn intake_store() -> SqliteIntakeStore {
    SqliteIntakeStore::new(memory_pool().await)
}

mod intakes {
    use super::*;

    #[tokio::test]
    async fn test_create_round_trips() {
        let store = intake_store().await;
        let input = named_intake("Acme Ltd", Some("info@acme.test"), "John", 3);

        let created = store.create(&input, "alice").await.unwrap();
        assert_eq!(created.created_by, "alice");
        assert_eq!(created.version, 1);
        assert_eq!(created.related_parties.len(), 3);

        let fetched = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.details, input.details);
        assert_eq!(fetched, created);
        let names: Vec<_> = fetched.related_parties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Party 1", "Party 2", "Party 3"]);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = intake_store().await;
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_replaces_parties() {
        let store = intake_store().await;
        let created = store
            .create(&named_intake("Acme Ltd", None, "John", 3), "alice")
            .await
            .unwrap();

        let replacement = named_intake("Acme Holdings", None, "John", 0);
        let updated = store
            .update(created.id, created.version, &replacement, "bob")
            .await
            .unwrap();

        assert_eq!(updated.details.legal_name, "Acme Holdings");
        assert_eq!(updated.updated_by.as_deref(), Some("bob"));
        assert_eq!(updated.version, 2);
        assert!(updated.related_parties.is_empty());
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = intake_store().await;
        let created = store
            .create(&named_intake("Acme Ltd", None, "John", 0), "alice")
            .await
            .unwrap();
        let input = named_intake("Acme Ltd", None, "John", 0);

        store.update(created.id, 1, &input, "bob").await.unwrap();
        let err = store.update(created.id, 1, &input, "carol").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_missing_or_deleted_is_not_found() {
        let store = intake_store().await;
        let input = named_intake("Acme Ltd", None, "John", 0);

        let err = store.update(Uuid::new_v4(), 1, &input, "bob").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let created = store.create(&input, "alice").await.unwrap();
        let deleted = store.soft_delete(created.id, 1, "alice").await.unwrap();
        let err = store
            .update(created.id, deleted.version, &input, "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_listing() {
        let store = intake_store().await;
        let kept = store
            .create(&named_intake("Kept", None, "A", 0), "alice")
            .await
            .unwrap();
        let gone = store
            .create(&named_intake("Gone", None, "B", 2), "alice")
            .await
            .unwrap();

        let deleted = store.soft_delete(gone.id, gone.version, "bob").await.unwrap();
        assert_eq!(deleted.deleted_by.as_deref(), Some("bob"));
        assert!(deleted.is_deleted());
        assert_eq!(deleted.related_parties.len(), 2);

        let page = store.list(&IntakeQuery::default()).await.unwrap();
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.items[0].id, kept.id);

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);

        // Still reachable by id.
        assert!(store.get(gone.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pages_cover_total() {
        let store = intake_store().await;
        for i in 0..7 {
            store
                .create(&named_intake(&format!("Client {}", i), None, "O", 0), "alice")
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        for page in 1..=3 {
            let result = store
                .list(&IntakeQuery {
                    page,
                    limit: 3,
                    ..IntakeQuery::default()
                })
                .await
                .unwrap();
            assert_eq!(result.pagination.total, 7);
            assert_eq!(result.pagination.pages, 3);
            seen.extend(result.items.into_iter().map(|i| i.id));
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 7);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_or() {
        let store = intake_store().await;
        store
            .create(&named_intake("Zenith Traders", None, "Mary", 0), "a")
            .await
            .unwrap();
        store
            .create(&named_intake("Blue Ocean", Some("ZEN@ocean.test"), "Paul", 0), "a")
            .await
            .unwrap();
        store
            .create(&named_intake("Red Rock", None, "Zena Smith", 0), "a")
            .await
            .unwrap();
        store
            .create(&named_intake("Other", None, "Nobody", 0), "a")
            .await
            .unwrap();

        let page = store
            .list(&IntakeQuery {
                search: Some("zEn".to_string()),
                ..IntakeQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 3);
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let store = intake_store().await;
        store
            .create(&named_intake("100% Organic", None, "A", 0), "a")
            .await
            .unwrap();
        store
            .create(&named_intake("1000 Trees", None, "B", 0), "a")
            .await
            .unwrap();

        let page = store
            .list(&IntakeQuery {
                search: Some("0%".to_string()),
                ..IntakeQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.items[0].details.legal_name, "100% Organic");
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let store = intake_store().await;
        let created = store
            .create(&named_intake("École Ltd", None, "Zoë Ångström", 0), "a")
            .await
            .unwrap();
        store
            .create(&named_intake("Ecole Free", None, "Other", 0), "a")
            .await
            .unwrap();

        let search = |term: &str| IntakeQuery {
            search: Some(term.to_string()),
            ..IntakeQuery::default()
        };
        for term in ["école", "ÉCOLE", "École", "ÅNGSTRÖM", "zoë"] {
            let page = store.list(&search(term)).await.unwrap();
            assert_eq!(page.pagination.total, 1, "search {term}");
            assert_eq!(page.items[0].id, created.id);
        }

        store
            .update(
                created.id,
                created.version,
                &named_intake("Øresund AS", None, "Zoë Ångström", 0),
                "b",
            )
            .await
            .unwrap();
        assert_eq!(store.list(&search("ØRESUND")).await.unwrap().pagination.total, 1);
        assert_eq!(store.list(&search("école")).await.unwrap().pagination.total, 0);
    }

    #[tokio::test]
    async fn test_page_past_addressable_range_is_empty() {
        let store = intake_store().await;
        for name in ["One", "Two"] {
            store
                .create(&named_intake(name, None, "O", 0), "a")
                .await
                .unwrap();
        }

        for (page, limit) in [(u64::MAX, 10), (1 << 62, 100), (u64::MAX, 1)] {
            let result = store
                .list(&IntakeQuery {
                    page,
                    limit,
                    ..IntakeQuery::default()
                })
                .await
                .unwrap();
            assert!(result.items.is_empty());
            assert_eq!(result.pagination.total, 2);
            assert_eq!(result.pagination.page, page);
        }
    }

    #[tokio::test]
    async fn test_cancelled_writes_release_connection() {
        let store = intake_store().await;
        let input = named_intake("Acme Ltd", None, "John", 2);

        for micros in 0..100u64 {
            let _ = tokio::time::timeout(
                std::time::Duration::from_micros(micros),
                store.create(&input, "alice"),
            )
            .await;
        }

        let created = store.create(&input, "alice").await.unwrap();
        assert_eq!(created.related_parties.len(), 2);
        store
            .soft_delete(created.id, created.version, "alice")
            .await
            .unwrap();

        // Whatever committed before cancellation committed whole.
        let listed = store.list_all().await.unwrap();
        assert!(listed.iter().all(|i| i.related_parties.len() == 2));
    }

    #[tokio::test]
    async fn test_membership_and_exact_filters() {
        let store = intake_store().await;
        store.create(&new_intake(intake_payload()), "a").await.unwrap();

        let mut payload = intake_payload();
        payload["servicesSelected"] = serde_json::json!(["Bookkeeping"]);
        payload["taxTypes"] = serde_json::json!(["VAT"]);
        payload["ramisStatus"] = serde_json::json!("NOT_AVAILABLE");
        store.create(&new_intake(payload), "a").await.unwrap();

        let by_service = store
            .list(&IntakeQuery {
                service: Some("Direct Tax".to_string()),
                ..IntakeQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_service.pagination.total, 1);

        let by_tax_type = store
            .list(&IntakeQuery {
                tax_type: Some("VAT".to_string()),
                ..IntakeQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_tax_type.pagination.total, 1);

        let by_status = store
            .list(&IntakeQuery {
                ramis_status: Some(RamisStatus::NotAvailable),
                ..IntakeQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_status.pagination.total, 1);
        assert_eq!(
            by_status.items[0].details.services_selected,
            vec!["Bookkeeping"]
        );
    }

    #[tokio::test]
    async fn test_sort_by_legal_name() {
        let store = intake_store().await;
        for name in ["Charlie", "alpha", "Bravo"] {
            store
                .create(&named_intake(name, None, "O", 0), "a")
                .await
                .unwrap();
        }

        let page = store
            .list(&IntakeQuery {
                sort_by: IntakeSortField::LegalName,
                sort_order: SortOrder::Asc,
                ..IntakeQuery::default()
            })
            .await
            .unwrap();
        let names: Vec<_> = page
            .items
            .iter()
            .map(|i| i.details.legal_name.as_str())
            .collect();
        assert_eq!(names, ["Bravo", "Charlie", "alpha"]);
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let store = intake_store().await;
        store.create(&new_intake(intake_payload()), "a").await.unwrap();
        let mut payload = intake_payload();
        payload["type"] = serde_json::json!("INDIVIDUAL");
        payload["priority"] = serde_json::json!("VIP");
        let second = store.create(&new_intake(payload), "a").await.unwrap();
        let third = store.create(&new_intake(intake_payload()), "a").await.unwrap();
        store.soft_delete(third.id, third.version, "a").await.unwrap();

        let summary = store
            .summary(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_type["COMPANY"], 1);
        assert_eq!(summary.by_type["INDIVIDUAL"], 1);
        assert_eq!(summary.by_priority["VIP"], 1);
        assert_eq!(summary.by_ramis_status["AVAILABLE"], 2);
        assert_eq!(summary.submitted_last_30_days, 2);

        let future = store
            .summary(second.submitted_at + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(future.submitted_last_30_days, 0);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let pool = memory_pool().await;
        let store = SqliteIntakeStore::new(pool.clone());
        pool.close().await;

        let err = store
            .create(&new_intake(intake_payload()), "a")
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}

mod audit {
    use super::*;

    fn entry(action: AuditAction, entity_id: &str, user_id: Option<Uuid>) -> NewAuditLog {
        NewAuditLog {
            action,
            entity_type: "ClientIntake".to_string(),
            entity_id: entity_id.to_string(),
            old_values: None,
            new_values: Some(serde_json::json!({ "legalName": "Acme Ltd" })),
            user_id,
            client_intake_id: None,
            ip_address: Some("127.0.0.1".to_string()),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_append_and_history_with_joins() {
        let pool = memory_pool().await;
        let intakes = SqliteIntakeStore::new(pool.clone());
        let users = SqliteStaffStore::new(pool.clone());
        let audit = SqliteAuditStore::new(pool);

        let user = users
            .upsert_user(NewUser {
                username: "alice".to_string(),
                display_name: "Alice".to_string(),
                role: UserRole::Admin,
                password_hash: "x".to_string(),
                staff_id: None,
            })
            .await
            .unwrap();
        let intake = intakes.create(&new_intake(intake_payload()), "alice").await.unwrap();

        let mut create = entry(AuditAction::Create, &intake.id.to_string(), Some(user.id));
        create.client_intake_id = Some(intake.id);
        audit.append(create).await.unwrap();
        let mut delete = entry(AuditAction::Delete, &intake.id.to_string(), Some(user.id));
        delete.client_intake_id = Some(intake.id);
        audit.append(delete).await.unwrap();

        let history = audit
            .history("ClientIntake", &intake.id.to_string())
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].log.action, AuditAction::Create);
        assert_eq!(history[1].log.action, AuditAction::Delete);
        assert_eq!(history[0].user.as_ref().unwrap().display_name, "Alice");
        assert_eq!(
            history[0].client_intake.as_ref().unwrap().legal_name,
            "Acme Ltd"
        );
        assert_eq!(
            history[0].log.new_values,
            Some(serde_json::json!({ "legalName": "Acme Ltd" }))
        );
    }

    #[tokio::test]
    async fn test_query_filters_and_paging() {
        let audit = SqliteAuditStore::new(memory_pool().await);
        let actor = Uuid::new_v4();
        for i in 0..5 {
            audit
                .append(entry(AuditAction::Update, &i.to_string(), Some(actor)))
                .await
                .unwrap();
        }
        audit
            .append(entry(AuditAction::View, "x", None))
            .await
            .unwrap();

        let page = audit
            .query(&AuditQuery {
                action: Some(AuditAction::Update),
                limit: 2,
                ..AuditQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.pages, 3);
        assert_eq!(page.items.len(), 2);
        // Newest first by default.
        assert_eq!(page.items[0].log.entity_id, "4");

        let by_user = audit
            .query(&AuditQuery {
                user_id: Some(actor),
                ..AuditQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_user.pagination.total, 5);

        let future = audit
            .query(&AuditQuery {
                from: Some(Utc::now() + Duration::hours(1)),
                ..AuditQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(future.pagination.total, 0);
    }

    #[tokio::test]
    async fn test_aggregates() {
        let audit = SqliteAuditStore::new(memory_pool().await);
        let busy = Uuid::new_v4();
        let quiet = Uuid::new_v4();
        for _ in 0..3 {
            audit
                .append(entry(AuditAction::Create, "a", Some(busy)))
                .await
                .unwrap();
        }
        audit
            .append(entry(AuditAction::Login, "b", Some(quiet)))
            .await
            .unwrap();

        assert_eq!(audit.count().await.unwrap(), 4);
        let counts = audit.action_counts().await.unwrap();
        assert_eq!(counts["CREATE"], 3);
        assert_eq!(counts["LOGIN"], 1);

        let top = audit.top_users(10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].user_id, busy);
        assert_eq!(top[0].count, 3);
        assert!(top[0].username.is_none());

        let recent = audit.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].log.action, AuditAction::Login);
    }
}

mod staff {
    use super::*;

    async fn seeded() -> (SqliteStaffStore, Uuid, Uuid) {
        let store = SqliteStaffStore::new(memory_pool().await);
        let department = store
            .create_department(&NewDepartment {
                name: "Tax".to_string(),
                description: None,
            })
            .await
            .unwrap();
        let role = store
            .create_role(&NewRole {
                name: "Reviewer".to_string(),
                description: Some("Signs off returns".to_string()),
            })
            .await
            .unwrap();
        (store, department.id, role.id)
    }

    fn new_staff(department_id: Uuid, role_ids: Vec<Uuid>) -> NewStaff {
        NewStaff {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            position: None,
            department_id,
            hire_date: None,
            role_ids,
            account: None,
        }
    }

    fn account(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            display_name: "Ada Lovelace".to_string(),
            role: UserRole::Staff,
            password_hash: "hash".to_string(),
            staff_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_staff_with_roles_and_account() {
        let (store, department_id, role_id) = seeded().await;

        let staff = store
            .create_staff(&new_staff(department_id, vec![role_id]), Some(account("ada")))
            .await
            .unwrap();

        assert!(staff.is_active);
        assert_eq!(staff.roles.len(), 1);
        assert_eq!(staff.roles[0].name, "Reviewer");
        assert_eq!(staff.user.as_ref().unwrap().username, "ada");

        let user = store.find_user_by_username("ada").await.unwrap().unwrap();
        assert_eq!(user.staff_id, Some(staff.id));
    }

    #[tokio::test]
    async fn test_duplicate_username_rolls_back() {
        let (store, department_id, _) = seeded().await;
        store.upsert_user(account("ada")).await.unwrap();

        let err = store
            .create_staff(&new_staff(department_id, vec![]), Some(account("ada")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let page = store.list_staff(&StaffQuery::default()).await.unwrap();
        assert_eq!(page.pagination.total, 0);
    }

    #[tokio::test]
    async fn test_role_delete_blocked_while_assigned() {
        let (store, department_id, role_id) = seeded().await;
        let staff = store
            .create_staff(&new_staff(department_id, vec![role_id]), None)
            .await
            .unwrap();

        let err = store.delete_role(role_id).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert!(store.unassign_role(staff.id, role_id).await.unwrap());
        assert!(store.delete_role(role_id).await.unwrap());
        assert!(store.get_role(role_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_assign_role_is_idempotent() {
        let (store, department_id, role_id) = seeded().await;
        let staff = store
            .create_staff(&new_staff(department_id, vec![]), None)
            .await
            .unwrap();

        store.assign_role(staff.id, role_id).await.unwrap();
        store.assign_role(staff.id, role_id).await.unwrap();
        let staff = store.get_staff(staff.id).await.unwrap().unwrap();
        assert_eq!(staff.roles.len(), 1);
    }

    #[tokio::test]
    async fn test_department_deactivation_hides_from_default_list() {
        let (store, department_id, _) = seeded().await;
        let updated = store
            .update_department(
                department_id,
                &UpdateDepartment {
                    is_active: Some(false),
                    ..UpdateDepartment::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.is_active);

        assert!(store.list_departments(false).await.unwrap().is_empty());
        assert_eq!(store.list_departments(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_department_name_conflicts() {
        let (store, _, _) = seeded().await;
        let err = store
            .create_department(&NewDepartment {
                name: "Tax".to_string(),
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_and_update_staff() {
        let (store, department_id, _) = seeded().await;
        let staff = store
            .create_staff(&new_staff(department_id, vec![]), None)
            .await
            .unwrap();

        let updated = store
            .update_staff(
                staff.id,
                &UpdateStaff {
                    position: Some("Senior".to_string()),
                    is_active: Some(false),
                    ..UpdateStaff::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.position.as_deref(), Some("Senior"));
        assert!(!updated.is_active);

        let active = store
            .list_staff(&StaffQuery {
                is_active: Some(true),
                ..StaffQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(active.pagination.total, 0);

        let found = store
            .list_staff(&StaffQuery {
                search: Some("LOVE".to_string()),
                ..StaffQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(found.items.len(), 1);

        assert!(store
            .update_staff(Uuid::new_v4(), &UpdateStaff::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_staff_search_folds_non_ascii_case() {
        let (store, department_id, _) = seeded().await;
        let mut input = new_staff(department_id, vec![]);
        input.first_name = "Élodie".to_string();
        input.last_name = "Müller".to_string();
        input.email = "elodie@example.com".to_string();
        let staff = store.create_staff(&input, None).await.unwrap();

        let search = |term: &str| StaffQuery {
            search: Some(term.to_string()),
            ..StaffQuery::default()
        };
        assert_eq!(store.list_staff(&search("MÜLLER")).await.unwrap().pagination.total, 1);
        assert_eq!(store.list_staff(&search("élodie")).await.unwrap().pagination.total, 1);

        store
            .update_staff(
                staff.id,
                &UpdateStaff {
                    last_name: Some("Ødegaard".to_string()),
                    ..UpdateStaff::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(store.list_staff(&search("øDEGAARD")).await.unwrap().pagination.total, 1);
        assert_eq!(store.list_staff(&search("müller")).await.unwrap().pagination.total, 0);
    }

    #[tokio::test]
    async fn test_staff_page_past_addressable_range_is_empty() {
        let (store, department_id, _) = seeded().await;
        store
            .create_staff(&new_staff(department_id, vec![]), None)
            .await
            .unwrap();

        let page = store
            .list_staff(&StaffQuery {
                page: u64::MAX,
                limit: 10,
                ..StaffQuery::default()
            })
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.pagination.total, 1);
    }

    #[tokio::test]
    async fn test_upsert_user_keeps_identity() {
        let (store, _, _) = seeded().await;
        let first = store.upsert_user(account("ada")).await.unwrap();
        let mut changed = account("ada");
        changed.role = UserRole::Admin;
        let second = store.upsert_user(changed).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.role, UserRole::Admin);
        assert_eq!(store.get_user(first.id).await.unwrap().unwrap().username, "ada");
    }
}
