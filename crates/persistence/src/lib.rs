//! Persistence layer for the ride-hailing backend.
//!
//! This crate contains:
//! - SQL migrations and entity definitions (database row mappings)
//! - Repository implementations
//! - The in-process KV store and the components built on it
//!   (geo index, distributed mutex, feature flag store)
//!
//! Pool construction lives with the service configuration in the api
//! crate; repositories only ever see an opened `PgPool`.

pub mod entities;
pub mod flags;
pub mod geo;
pub mod kv;
pub mod locks;
pub mod metrics;
pub mod repositories;
