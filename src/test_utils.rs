//! Shared fixtures for unit tests.

use serde_json::json;
use sqlx::SqlitePool;

use crate::config::StorageConfig;
use crate::models::{IntakeSubmission, NewIntake};
use crate::storage::{connect, init_schema};
use crate::validation::validate_intake;

/// A fresh in-memory database with the schema applied.
pub async fn memory_pool() -> SqlitePool {
    let config = StorageConfig {
        path: ":memory:".to_string(),
        ..StorageConfig::default()
    };
    let pool = connect(&config)
        .await
        .expect("failed to create in-memory pool");
    init_schema(&pool).await.expect("failed to init schema");
    pool
}

/// A complete, valid COMPANY submission.
pub fn intake_payload() -> serde_json::Value {
    json!({
        "legalName": "Acme Ltd",
        "type": "COMPANY",
        "companySecretary": "Jane Doe",
        "servicesSelected": ["Direct Tax"],
        "directTaxSubcategories": ["Income Taxes"],
        "ramisStatus": "AVAILABLE",
        "consent": true,
        "ownerName": "John",
        "address": "1 Main St"
    })
}

/// Validated intake built from `payload`.
pub fn new_intake(payload: serde_json::Value) -> NewIntake {
    let submission: IntakeSubmission =
        serde_json::from_value(payload).expect("payload should deserialize");
    validate_intake(submission).expect("payload should validate")
}

/// Validated intake with the given legal name, email, owner and parties.
pub fn named_intake(legal_name: &str, email: Option<&str>, owner: &str, parties: usize) -> NewIntake {
    let mut payload = intake_payload();
    payload["legalName"] = json!(legal_name);
    payload["ownerName"] = json!(owner);
    if let Some(email) = email {
        payload["email"] = json!(email);
    }
    payload["relatedParties"] = json!((0..parties)
        .map(|i| json!({ "name": format!("Party {}", i + 1), "relationship": "Director" }))
        .collect::<Vec<_>>());
    new_intake(payload)
}
