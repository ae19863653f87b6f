use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

use super::*;
use crate::config::Config;
use crate::test_utils::{intake_payload, memory_pool};

const PASSCODE: &str = "letmein";

struct TestApp {
    router: Router,
    pool: SqlitePool,
}

impl TestApp {
    async fn new() -> Self {
        let pool = memory_pool().await;
        let config = Config::for_test();
        let state = Arc::new(AppState::new(pool.clone(), &config));
        state.auth.seed_users(&config.auth, false).await.unwrap();
        Self {
            router: router(state, &config.server, false),
            pool,
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, bytes) = self.raw(method, uri, token, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn raw(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, headers, bytes.to_vec())
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn admin(&self) -> String {
        self.login("admin", "admin").await
    }

    async fn create_intake(&self, token: Option<&str>, payload: Value) -> Value {
        let (status, body) = self.send("POST", "/api/intake", token, Some(payload)).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_create_stamps_caller() {
    let app = TestApp::new().await;
    let token = app.admin().await;

    let created = app.create_intake(Some(&token), intake_payload()).await;
    assert!(created["id"].as_str().is_some());
    assert_eq!(created["createdBy"], "admin");
    assert_eq!(created["legalName"], "Acme Ltd");

    let anonymous = app.create_intake(None, intake_payload()).await;
    assert_eq!(anonymous["createdBy"], "unknown");
}

#[tokio::test]
async fn test_create_without_consent_is_400() {
    let app = TestApp::new().await;
    let mut payload = intake_payload();
    payload["consent"] = json!(false);

    let (status, body) = app.send("POST", "/api/intake", None, Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert!(fields.contains(&"consent"));
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/intake")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_token_rejected_even_for_create() {
    let app = TestApp::new().await;
    let (status, _) = app
        .send("POST", "/api/intake", Some("garbage"), Some(intake_payload()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reads_require_token() {
    let app = TestApp::new().await;
    for uri in ["/api/intake", "/api/intake/summary", "/api/audit/logs", "/api/export/csv-all"] {
        let (status, _) = app.send("GET", uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_list_envelope_and_paging() {
    let app = TestApp::new().await;
    let token = app.admin().await;
    for i in 0..3 {
        let mut payload = intake_payload();
        payload["legalName"] = json!(format!("Client {}", i));
        app.create_intake(Some(&token), payload).await;
    }

    let (status, body) = app
        .send("GET", "/api/intake?page=2&limit=2", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["pagination"],
        json!({ "page": 2, "limit": 2, "total": 3, "pages": 2 })
    );

    let (status, _) = app
        .send("GET", "/api/intake?page=0", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("GET", "/api/intake?type=SPACESHIP", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_summary_is_not_an_id() {
    let app = TestApp::new().await;
    let token = app.admin().await;
    app.create_intake(Some(&token), intake_payload()).await;

    let (status, body) = app
        .send("GET", "/api/intake/summary", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["byType"]["COMPANY"], 1);
    assert_eq!(body["data"]["submittedLast30Days"], 1);
}

#[tokio::test]
async fn test_malformed_id_uses_error_envelope() {
    let app = TestApp::new().await;
    let token = app.admin().await;

    for uri in [
        "/api/intake/not-a-uuid",
        "/api/export/csv/not-a-uuid",
        "/api/staff/not-a-uuid",
    ] {
        let (status, headers, bytes) = app.raw("GET", uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json", "{}", uri);
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert!(!body["message"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_delete_checks_token_then_passcode() {
    let app = TestApp::new().await;
    let token = app.admin().await;
    let created = app.create_intake(Some(&token), intake_payload()).await;
    let uri = format!("/api/intake/{}", created["id"].as_str().unwrap());

    let (status, _) = app
        .send("DELETE", &uri, None, Some(json!({ "passcode": "wrong" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send("DELETE", &uri, Some(&token), Some(json!({ "passcode": "wrong" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, listing) = app.send("GET", "/api/intake", Some(&token), None).await;
    assert_eq!(listing["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_soft_delete_keeps_history() {
    let app = TestApp::new().await;
    let token = app.admin().await;
    let created = app.create_intake(Some(&token), intake_payload()).await;
    let id = created["id"].as_str().unwrap().to_string();
    let uri = format!("/api/intake/{}", id);

    let (status, _) = app
        .send("DELETE", &uri, Some(&token), Some(json!({ "passcode": PASSCODE })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = app.send("GET", "/api/intake", Some(&token), None).await;
    assert_eq!(listing["pagination"]["total"], 0);
    let (status, _) = app.send("GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, history) = app
        .send(
            "GET",
            &format!("/api/audit/entity/ClientIntake/{}", id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let entries = history["data"].as_array().unwrap();
    let actions: Vec<&str> = entries.iter().filter_map(|e| e["action"].as_str()).collect();
    assert_eq!(actions, ["CREATE", "DELETE"]);
    assert_eq!(entries[1]["oldValues"]["legalName"], "Acme Ltd");
    assert!(entries[1]["newValues"].is_null());

    let (status, _, bytes) = app
        .raw("GET", &format!("/api/export/csv/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(bytes).unwrap().contains("Deleted By,admin"));
}

#[tokio::test]
async fn test_update_replaces_parties() {
    let app = TestApp::new().await;
    let token = app.admin().await;
    let mut payload = intake_payload();
    payload["relatedParties"] = json!([
        { "name": "A" }, { "name": "B" }, { "name": "C" }
    ]);
    let created = app.create_intake(Some(&token), payload).await;
    assert_eq!(created["relatedParties"].as_array().unwrap().len(), 3);

    let uri = format!("/api/intake/{}", created["id"].as_str().unwrap());
    let (status, body) = app
        .send("PUT", &uri, Some(&token), Some(json!({ "relatedParties": [] })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["relatedParties"], json!([]));
    assert_eq!(body["data"]["updatedBy"], "admin");

    let missing = format!("/api/intake/{}", uuid::Uuid::new_v4());
    let (status, _) = app
        .send("PUT", &missing, Some(&token), Some(json!({ "notes": "x" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_export_headers() {
    let app = TestApp::new().await;
    let token = app.admin().await;
    let created = app.create_intake(Some(&token), intake_payload()).await;
    let id = created["id"].as_str().unwrap();

    let (status, headers, body) = app
        .raw("GET", &format!("/api/export/csv/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Acme_Ltd.csv\""
    );
    assert!(body.starts_with(b"Field,Value\r\n"));

    let (status, headers, body) = app
        .raw("GET", "/api/export/excel-all", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("attachment; filename=\"client_intakes_"));
    assert!(body.starts_with(b"PK"));

    let (status, _, _) = app
        .raw(
            "GET",
            &format!("/api/export/excel/{}", uuid::Uuid::new_v4()),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_and_me() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "admin", "password": "nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let token = app.admin().await;
    let (status, body) = app.send("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "admin");
    assert_eq!(body["data"]["role"], "ADMIN");

    let (status, body) = app
        .send("GET", "/api/audit/logs?action=LOGIN", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["user"]["username"], "admin");
}

#[tokio::test]
async fn test_hr_onboarding_flow() {
    let app = TestApp::new().await;
    let admin = app.admin().await;

    let (status, department) = app
        .send(
            "POST",
            "/api/departments",
            Some(&admin),
            Some(json!({ "name": "Tax" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let department_id = department["data"]["id"].as_str().unwrap().to_string();

    let (status, role) = app
        .send(
            "POST",
            "/api/roles",
            Some(&admin),
            Some(json!({ "name": "Preparer" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let role_id = role["data"]["id"].as_str().unwrap().to_string();

    let (status, staff) = app
        .send(
            "POST",
            "/api/staff",
            Some(&admin),
            Some(json!({
                "firstName": "Grace",
                "lastName": "Hopper",
                "email": "grace@example.com",
                "departmentId": department_id,
                "roleIds": [role_id],
                "account": { "username": "ghopper", "password": "compile-it" }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{staff}");
    assert_eq!(staff["data"]["roles"][0]["name"], "Preparer");
    assert_eq!(staff["data"]["user"]["username"], "ghopper");

    let (status, _) = app
        .send("DELETE", &format!("/api/roles/{}", role_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let clerk = app.login("ghopper", "compile-it").await;
    let (status, _) = app
        .send(
            "POST",
            "/api/departments",
            Some(&clerk),
            Some(json!({ "name": "Audit" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, listing) = app
        .send(
            "GET",
            &format!("/api/staff?departmentId={}", department_id),
            Some(&clerk),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_store_down_is_503() {
    let app = TestApp::new().await;
    app.pool.close().await;

    let (status, body) = app
        .send("POST", "/api/intake", None, Some(intake_payload()))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], error::UNAVAILABLE_MESSAGE);
}
