//! Per-tenant feature flag store.
//!
//! Lookup order: per-tenant value, then the global tenant's value, then the
//! caller-supplied default. Flags are booleans and the flag set is closed;
//! adding a flag is a code change. Reads are best-effort and
//! non-transactional, a stale flag is acceptable.

use std::collections::HashMap;
use std::sync::Arc;

use crate::kv::KvStore;

/// Tenant whose flags act as the fallback namespace for all tenants.
pub const GLOBAL_TENANT: &str = "global";

/// The closed set of recognized feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
    SurgePricingEnabled,
    AutoPaymentCharge,
    NewScoringAlgo,
    DispatchKillSwitch,
    RealTimeTracking,
}

impl FeatureFlag {
    /// KV field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureFlag::SurgePricingEnabled => "surge_pricing_enabled",
            FeatureFlag::AutoPaymentCharge => "auto_payment_charge",
            FeatureFlag::NewScoringAlgo => "new_scoring_algo",
            FeatureFlag::DispatchKillSwitch => "dispatch_kill_switch",
            FeatureFlag::RealTimeTracking => "real_time_tracking",
        }
    }

    /// All flags with their shipped defaults.
    pub fn defaults() -> [(FeatureFlag, bool); 5] {
        [
            (FeatureFlag::SurgePricingEnabled, true),
            (FeatureFlag::AutoPaymentCharge, true),
            (FeatureFlag::NewScoringAlgo, false),
            (FeatureFlag::DispatchKillSwitch, false),
            (FeatureFlag::RealTimeTracking, false),
        ]
    }
}

fn tenant_key(tenant: &str) -> String {
    format!("feature-flags:{}", tenant)
}

/// Per-tenant, globally-overridable boolean flag store.
#[derive(Clone)]
pub struct FeatureFlagStore {
    kv: Arc<KvStore>,
}

impl FeatureFlagStore {
    /// Create a flag store over the shared KV store.
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    /// Set a flag for one tenant (use [`GLOBAL_TENANT`] for the fallback
    /// namespace).
    pub fn set(&self, tenant: &str, flag: FeatureFlag, value: bool) {
        if !self
            .kv
            .map_set_field(&tenant_key(tenant), flag.as_str(), value.to_string())
        {
            let mut fields = HashMap::new();
            fields.insert(flag.as_str().to_string(), value.to_string());
            self.kv.map_put(&tenant_key(tenant), fields, None);
        }
    }

    /// Write shipped defaults for a tenant, leaving any present field as-is.
    pub fn init_defaults(&self, tenant: &str) {
        let fields = FeatureFlag::defaults()
            .into_iter()
            .map(|(flag, value)| (flag.as_str().to_string(), value.to_string()))
            .collect();
        self.kv.map_set_missing_fields(&tenant_key(tenant), fields);
    }

    fn read(&self, tenant: &str, flag: FeatureFlag) -> Option<bool> {
        self.kv
            .map_get(&tenant_key(tenant))?
            .get(flag.as_str())
            .and_then(|v| v.parse().ok())
    }

    /// Resolve a flag: tenant value, else global value, else `default`.
    pub fn is_enabled(&self, tenant: &str, flag: FeatureFlag, default: bool) -> bool {
        self.read(tenant, flag)
            .or_else(|| self.read(GLOBAL_TENANT, flag))
            .unwrap_or(default)
    }
}
