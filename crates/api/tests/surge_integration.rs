//! End-to-end surge scenarios against a real database.
//!
//! Run with `cargo test -- --ignored` and a `TEST_DATABASE_URL`.

mod common;

use chrono::{Duration, Utc};

use domain::models::events::SupplyDemandSnapshot;
use persistence::flags::FeatureFlag;

use common::{test_harness, unique, TestHarness};

fn snapshot(cell_id: &str, tenant: &str, drivers: i32, rides: i32, age_secs: i64) -> SupplyDemandSnapshot {
    SupplyDemandSnapshot {
        cell_id: cell_id.to_string(),
        region_id: "ap-south-1".to_string(),
        tenant_id: tenant.to_string(),
        active_drivers: drivers,
        pending_rides: rides,
        timestamp: Utc::now() - Duration::seconds(age_secs),
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn balanced_supply_is_neutral_and_spike_clamps() {
    let TestHarness { state, .. } = test_harness().await;
    let tenant = unique("tenant");
    let cell = unique("cell");

    for age in [20, 10] {
        state
            .surge
            .on_snapshot(&snapshot(&cell, &tenant, 10, 10, age))
            .await
            .unwrap();
    }
    let balanced = state
        .surge
        .on_snapshot(&snapshot(&cell, &tenant, 10, 10, 0))
        .await
        .unwrap();
    assert_eq!(balanced, 1.0);
    assert_eq!(state.surge.get(&tenant, &cell).await.unwrap(), 1.0);

    // A demand spike in the newest entry dominates the weighted window.
    let spiked = state
        .surge
        .on_snapshot(&snapshot(&cell, &tenant, 1, 1000, 0))
        .await
        .unwrap();
    assert_eq!(spiked, 3.0, "clamped at the ceiling");
    assert_eq!(state.surge.get(&tenant, &cell).await.unwrap(), 3.0);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn kill_switch_returns_neutral_despite_cache() {
    let TestHarness { state, .. } = test_harness().await;
    let tenant = unique("tenant");
    let cell = unique("cell");

    let spiked = state
        .surge
        .on_snapshot(&snapshot(&cell, &tenant, 1, 500, 0))
        .await
        .unwrap();
    assert!(spiked > 1.0);

    state
        .flags
        .set(&tenant, FeatureFlag::SurgePricingEnabled, false);
    assert_eq!(
        state.surge.get(&tenant, &cell).await.unwrap(),
        1.0,
        "flag wins over the cached multiplier"
    );

    state
        .flags
        .set(&tenant, FeatureFlag::SurgePricingEnabled, true);
    assert_eq!(state.surge.get(&tenant, &cell).await.unwrap(), spiked);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn cache_miss_falls_back_to_audit_row() {
    let harness = test_harness().await;
    let tenant = unique("tenant");
    let cell = unique("cell");

    let multiplier = harness
        .state
        .surge
        .on_snapshot(&snapshot(&cell, &tenant, 2, 40, 0))
        .await
        .unwrap();
    assert!(multiplier > 1.0);

    // A fresh process shares the database but not the KV cache.
    let fresh = test_harness().await;
    let from_audit = fresh.state.surge.get(&tenant, &cell).await.unwrap();
    assert_eq!(from_audit, multiplier);

    // A cell never observed resolves to the neutral multiplier.
    let unknown = fresh.state.surge.get(&tenant, &unique("cell")).await.unwrap();
    assert_eq!(unknown, 1.0);
}
