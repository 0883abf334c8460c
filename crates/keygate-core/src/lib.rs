//! keygate core library.
//!
//! Shared types for the keygate credential subsystem:
//!
//! - [`ids`] - Strongly typed identifiers ([`AccountId`], [`ApiKeyId`])

pub mod ids;

pub use ids::{AccountId, ApiKeyId, ParseIdError};
