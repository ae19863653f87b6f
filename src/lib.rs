//! clientdesk - client intake, audit trail and staff onboarding.
//!
//! A JSON REST service for an accounting and advisory practice: public
//! client intake submissions, an authenticated console that lists, edits,
//! exports and audits them, and an HR flow that onboards staff accounts.

pub mod auth;
pub mod config;
pub mod export;
pub mod handlers;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
