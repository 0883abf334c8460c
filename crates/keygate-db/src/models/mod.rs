//! Database models.

pub mod api_key;
pub mod api_usage;
pub mod audit_log;

pub use api_key::{ApiKey, CreateApiKey, UpdateApiKey};
pub use api_usage::{
    ApiUsage, CreateApiUsage, DailyStat, EndpointStat, StatusCodeStat, TopEndpoint, TopKey,
};
pub use audit_log::{AuditLog, CreateAuditLog};
