//! Tenant header extractor.
//!
//! Tenancy is explicit: the tenant id travels as an argument through every
//! entry point and into event payloads, never as ambient per-worker state.

use axum::{
    extract::FromRequestParts,
    http::{header::HeaderName, request::Parts, StatusCode},
};

/// The header name carrying the tenant id.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant used when the header is absent.
pub const DEFAULT_TENANT: &str = "default";

/// Tenant id extracted from request headers, defaulting to `default`.
#[derive(Debug, Clone)]
pub struct Tenant(pub String);

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        _state: &'life1 S,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let header_name = HeaderName::from_static(TENANT_HEADER);

            let tenant = parts
                .headers
                .get(&header_name)
                .and_then(|value| value.to_str().ok())
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_TENANT)
                .to_string();

            Ok(Tenant(tenant))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_constant() {
        assert_eq!(TENANT_HEADER, "x-tenant-id");
    }

    #[test]
    fn test_default_tenant() {
        assert_eq!(DEFAULT_TENANT, "default");
    }
}
