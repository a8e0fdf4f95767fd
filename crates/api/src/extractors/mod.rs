//! Custom Axum extractors.

pub mod idempotency_key;
pub mod tenant;

pub use idempotency_key::{IdempotencyKey, RequiredIdempotencyKey};
pub use tenant::Tenant;
