//! End-to-end payment scenarios against a real database.
//!
//! Run with `cargo test -- --ignored` and a `TEST_DATABASE_URL`.

mod common;

use chrono::Utc;
use rust_decimal::Decimal;

use domain::models::events::TripEndedEvent;
use domain::models::{topics, PaymentMethod, PaymentStatus};
use persistence::flags::FeatureFlag;
use persistence::repositories::{OutboxRepository, PaymentRepository};
use ride_hailing_api::config::OutboxConfig;
use ride_hailing_api::jobs::OutboxRelayJob;

use common::{test_harness, unique, TestHarness};

fn trip_ended(tenant: &str, trip_id: &str) -> TripEndedEvent {
    TripEndedEvent {
        trip_id: trip_id.to_string(),
        rider_id: unique("usr"),
        tenant_id: tenant.to_string(),
        region_id: "ap-south-1".to_string(),
        status: "ENDED".to_string(),
        fare_amount: Some(Decimal::new(2093, 2)),
        currency: "USD".to_string(),
        payment_method: PaymentMethod::Card,
        timestamp: Utc::now(),
    }
}

/// Tenant with the async charge disabled, so tests drive charges
/// deterministically through `charge`/the reconciler.
fn manual_tenant(state: &ride_hailing_api::app::AppState) -> String {
    let tenant = unique("tenant");
    state.flags.set(&tenant, FeatureFlag::AutoPaymentCharge, false);
    tenant
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn initiate_writes_payment_and_outbox_atomically() {
    let TestHarness { state, .. } = test_harness().await;
    let tenant = manual_tenant(&state);
    let trip_id = unique("trip");

    let payment_id = state
        .payments
        .initiate(&trip_ended(&tenant, &trip_id))
        .await
        .unwrap()
        .expect("payment created");

    let payments = PaymentRepository::new(state.pool.clone());
    let row = payments.find_by_trip_id(&trip_id).await.unwrap().unwrap();
    assert_eq!(row.id, payment_id);
    assert_eq!(row.status, PaymentStatus::Pending.as_str());
    assert_eq!(row.retry_count, 0);

    let outbox = OutboxRepository::new(state.pool.clone());
    let rows = outbox.find_by_payment(payment_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_type, topics::PAYMENT_INITIATED);
    assert_eq!(rows[0].status, "PENDING");
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn initiate_is_idempotent_on_trip_id() {
    let TestHarness { state, .. } = test_harness().await;
    let tenant = manual_tenant(&state);
    let trip_id = unique("trip");
    let event = trip_ended(&tenant, &trip_id);

    let first = state.payments.initiate(&event).await.unwrap();
    assert!(first.is_some());
    for _ in 0..4 {
        assert!(state.payments.initiate(&event).await.unwrap().is_none());
    }

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payments WHERE trip_id = $1")
        .bind(&trip_id)
        .fetch_one(&state.pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1, "exactly one payment row per trip");
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn non_chargeable_events_are_ignored() {
    let TestHarness { state, .. } = test_harness().await;
    let tenant = manual_tenant(&state);

    let mut no_fare = trip_ended(&tenant, &unique("trip"));
    no_fare.fare_amount = None;
    assert!(state.payments.initiate(&no_fare).await.unwrap().is_none());

    let mut paused = trip_ended(&tenant, &unique("trip"));
    paused.status = "PAUSED".to_string();
    assert!(state.payments.initiate(&paused).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn psp_outage_fails_payment_then_reconciler_captures() {
    let TestHarness { state, bus, psp } = test_harness().await;
    let tenant = manual_tenant(&state);
    let trip_id = unique("trip");

    let payment_id = state
        .payments
        .initiate(&trip_ended(&tenant, &trip_id))
        .await
        .unwrap()
        .expect("payment created");

    // Provider down: the charge exhausts its retries and falls back.
    psp.set_failing(true);
    let status = state.payments.charge(payment_id).await.unwrap();
    assert_eq!(status, PaymentStatus::Failed);

    let payments = PaymentRepository::new(state.pool.clone());
    let row = payments.find_by_id(payment_id).await.unwrap().unwrap();
    assert_eq!(row.status, PaymentStatus::Failed.as_str());
    assert_eq!(row.retry_count, 1);
    assert!(row.failure_reason.is_some());

    // Relay publishes INITIATED then FAILED in creation order.
    let relay = OutboxRelayJob::new(
        state.pool.clone(),
        std::sync::Arc::clone(&state.bus),
        OutboxConfig::default(),
    );
    relay.drain_once().await.unwrap();

    let key = payment_id.to_string();
    assert_eq!(
        bus.topics_for_key(&key),
        vec![topics::PAYMENT_INITIATED, topics::PAYMENT_FAILED]
    );

    // Provider restored: the FAILED sweep captures the payment.
    psp.set_failing(false);
    state.payments.reconcile_failed(5, 100).await.unwrap();

    let row = payments.find_by_id(payment_id).await.unwrap().unwrap();
    assert_eq!(row.status, PaymentStatus::Captured.as_str());
    assert!(row.psp_reference.is_some());

    relay.drain_once().await.unwrap();
    assert_eq!(
        bus.topics_for_key(&key),
        vec![
            topics::PAYMENT_INITIATED,
            topics::PAYMENT_FAILED,
            topics::PAYMENT_CAPTURED,
        ],
        "per-payment order is INITIATED, FAILED, CAPTURED"
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn outbox_relay_retries_and_never_drops_rows() {
    let TestHarness { state, bus, .. } = test_harness().await;
    let tenant = manual_tenant(&state);
    let trip_id = unique("trip");

    let payment_id = state
        .payments
        .initiate(&trip_ended(&tenant, &trip_id))
        .await
        .unwrap()
        .expect("payment created");

    let relay = OutboxRelayJob::new(
        state.pool.clone(),
        std::sync::Arc::clone(&state.bus),
        OutboxConfig::default(),
    );

    bus.set_failing(true);
    relay.drain_once().await.unwrap();

    let outbox = OutboxRepository::new(state.pool.clone());
    let rows = outbox.find_by_payment(payment_id).await.unwrap();
    assert_eq!(rows[0].status, "PENDING", "failed publish stays PENDING");
    assert_eq!(rows[0].retry_count, 1);

    bus.set_failing(false);
    relay.drain_once().await.unwrap();

    let rows = outbox.find_by_payment(payment_id).await.unwrap();
    assert_eq!(rows[0].status, "PUBLISHED");
    assert!(rows[0].published_at.is_some());
    assert!(rows[0].retry_count <= 5);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn stale_pending_payment_is_reconciled() {
    let TestHarness { state, .. } = test_harness().await;
    let tenant = manual_tenant(&state);
    let trip_id = unique("trip");

    let payment_id = state
        .payments
        .initiate(&trip_ended(&tenant, &trip_id))
        .await
        .unwrap()
        .expect("payment created");

    // Simulate an orchestrator crash between commit and charge
    // scheduling: the row sits PENDING past the staleness threshold.
    sqlx::query("UPDATE payments SET created_at = created_at - INTERVAL '11 minutes' WHERE id = $1")
        .bind(payment_id)
        .execute(&state.pool)
        .await
        .unwrap();

    state.payments.reconcile_stale_pending(600, 100).await.unwrap();

    let payments = PaymentRepository::new(state.pool.clone());
    let row = payments.find_by_id(payment_id).await.unwrap().unwrap();
    assert_eq!(row.status, PaymentStatus::Captured.as_str());

    let outbox = OutboxRepository::new(state.pool.clone());
    let rows = outbox.find_by_payment(payment_id).await.unwrap();
    let types: Vec<&str> = rows.iter().map(|r| r.event_type.as_str()).collect();
    assert_eq!(types, vec![topics::PAYMENT_INITIATED, topics::PAYMENT_CAPTURED]);
}
