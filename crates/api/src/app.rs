use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::services::event_bus::EventBus;
use domain::services::psp::PspClient;
use persistence::flags::{FeatureFlagStore, GLOBAL_TENANT};
use persistence::geo::GeoIndex;
use persistence::kv::KvStore;
use persistence::locks::DistributedMutex;
use persistence::repositories::GeoCellRepository;

use crate::config::Config;
use crate::routes::{health, rides, surge};
use crate::services::{
    CircuitBreaker, CircuitBreakerConfig, DispatchEngine, PaymentOrchestrator, RetryPolicy,
    SurgeCalculator,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub kv: Arc<KvStore>,
    pub geo: GeoIndex,
    pub flags: FeatureFlagStore,
    pub bus: Arc<dyn EventBus>,
    /// Breaker around the PSP charge path, shared with health reporting.
    pub breaker: Arc<CircuitBreaker>,
    pub dispatch: Arc<DispatchEngine>,
    pub payments: Arc<PaymentOrchestrator>,
    pub surge: Arc<SurgeCalculator>,
}

/// Wire the engines and their shared infrastructure.
pub fn build_state(
    config: Config,
    pool: PgPool,
    bus: Arc<dyn EventBus>,
    psp: Arc<dyn PspClient>,
) -> AppState {
    let config = Arc::new(config);

    let kv = Arc::new(KvStore::new());
    let geo = GeoIndex::new(Arc::clone(&kv));
    let mutex = DistributedMutex::new(Arc::clone(&kv));
    let flags = FeatureFlagStore::new(Arc::clone(&kv));
    flags.init_defaults(GLOBAL_TENANT);
    flags.init_defaults("default");

    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
    let retry = RetryPolicy::new(3, Duration::from_secs(1), 2);

    let dispatch = Arc::new(DispatchEngine::new(
        pool.clone(),
        geo.clone(),
        mutex,
        flags.clone(),
        Arc::clone(&kv),
        Arc::clone(&bus),
        config.dispatch.clone(),
    ));

    let payments = Arc::new(PaymentOrchestrator::new(
        pool.clone(),
        flags.clone(),
        psp,
        Arc::clone(&breaker),
        retry,
    ));

    let surge = Arc::new(SurgeCalculator::new(
        Arc::clone(&kv),
        GeoCellRepository::new(pool.clone()),
        flags.clone(),
        config.surge.clone(),
    ));

    AppState {
        pool,
        config,
        kv,
        geo,
        flags,
        bus,
        breaker,
        dispatch,
        payments,
        surge,
    }
}

/// Build the HTTP application.
pub fn create_app(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/rides", post(rides::create_ride))
        .route("/rides/:id", get(rides::get_ride))
        .route("/rides/:id/accept", post(rides::accept))
        .route("/rides/:id/decline", post(rides::decline))
        .route("/rides/:id/driver-arrived", post(rides::driver_arrived))
        .route("/rides/:id/start", post(rides::start))
        .route("/rides/:id/cancel", post(rides::cancel))
        .route("/surge", get(surge::get_by_coordinates))
        .route("/surge/:cell_id", get(surge::get_by_cell))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::services::event_bus::InMemoryEventBus;
    use domain::services::psp::MockPspClient;
    use persistence::flags::FeatureFlag;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/ride_hailing_test")
            .expect("lazy pool")
    }

    #[tokio::test]
    async fn test_build_state_initializes_flag_defaults() {
        let config = Config::load_for_test(&[]).unwrap();
        let state = build_state(
            config,
            lazy_pool(),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(MockPspClient::new()),
        );

        assert!(state
            .flags
            .is_enabled("default", FeatureFlag::SurgePricingEnabled, false));
        assert!(!state
            .flags
            .is_enabled("default", FeatureFlag::DispatchKillSwitch, true));
    }

    #[tokio::test]
    async fn test_create_app_builds_router() {
        let config = Config::load_for_test(&[]).unwrap();
        let state = build_state(
            config,
            lazy_pool(),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(MockPspClient::new()),
        );
        let _app = create_app(state);
    }
}
