//! keygate persistence layer.
//!
//! Postgres-backed models for the credential subsystem:
//!
//! - [`models::ApiKey`] - issued credential records
//! - [`models::ApiUsage`] - append-only per-call usage records
//! - [`models::AuditLog`] - append-only audit trail

pub mod migrations;
pub mod models;

pub use models::{
    ApiKey, ApiUsage, AuditLog, CreateApiKey, CreateApiUsage, CreateAuditLog, DailyStat,
    EndpointStat, StatusCodeStat, TopEndpoint, TopKey, UpdateApiKey,
};
