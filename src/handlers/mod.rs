//! Request handlers for the clientdesk server.

pub mod rest;
