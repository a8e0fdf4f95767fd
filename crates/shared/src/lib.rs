//! Shared utilities and common types for the ride-hailing backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Hashing utilities (canonical request digests for idempotency replays)
//! - Common validation logic

pub mod crypto;
pub mod validation;
