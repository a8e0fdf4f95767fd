use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// Region this deployment serves.
    pub region: RegionConfig,
    /// Event bus connection (in-memory bus when no URL is set).
    #[serde(default)]
    pub bus: BusConfig,
    /// PSP endpoint (mock provider when no URL is set).
    #[serde(default)]
    pub psp: PspConfig,
    /// Dispatch engine tuning.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Outbox relay tuning.
    #[serde(default)]
    pub outbox: OutboxConfig,
    /// Reconciliation sweeps tuning.
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    /// Surge calculator tuning.
    #[serde(default)]
    pub surge: SurgeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Open the PostgreSQL pool described by this configuration.
    pub async fn create_pool(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .connect(&self.url)
            .await
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    #[serde(default = "default_region_id")]
    pub region_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BusConfig {
    /// NATS URL, e.g. `nats://localhost:4222`. Empty selects the
    /// in-memory bus (single-process deployments and tests).
    #[serde(default)]
    pub nats_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PspConfig {
    /// Charge endpoint base URL. Empty selects the mock provider.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_psp_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PspConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: default_psp_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Candidate search radius around the pickup point.
    #[serde(default = "default_search_radius_km")]
    pub search_radius_km: f64,

    /// Cap on geo index results per dispatch attempt.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    /// How long a driver has to answer an offer.
    #[serde(default = "default_offer_ttl_secs")]
    pub offer_ttl_secs: u64,

    /// Dispatch attempts before giving up with NO_DRIVER_FOUND.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Bounded wait for the per-ride dispatch lock.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,

    /// Lease on the per-ride dispatch lock (crash release bound).
    #[serde(default = "default_lock_lease_ms")]
    pub lock_lease_ms: u64,

    /// Offer timeout sweep interval.
    #[serde(default = "default_offer_sweep_secs")]
    pub offer_sweep_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            search_radius_km: default_search_radius_km(),
            candidate_limit: default_candidate_limit(),
            offer_ttl_secs: default_offer_ttl_secs(),
            max_attempts: default_max_attempts(),
            lock_wait_ms: default_lock_wait_ms(),
            lock_lease_ms: default_lock_lease_ms(),
            offer_sweep_interval_secs: default_offer_sweep_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    /// Relay poll interval.
    #[serde(default = "default_outbox_poll_ms")]
    pub poll_interval_ms: u64,

    /// Rows drained per relay cycle.
    #[serde(default = "default_outbox_batch")]
    pub batch_size: i64,

    /// Publish attempts before a row goes FAILED (terminal).
    #[serde(default = "default_outbox_retries")]
    pub max_retries: i32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_outbox_poll_ms(),
            batch_size: default_outbox_batch(),
            max_retries: default_outbox_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// FAILED payment sweep interval.
    #[serde(default = "default_failed_sweep_secs")]
    pub failed_sweep_interval_secs: u64,

    /// Stale-PENDING sweep interval.
    #[serde(default = "default_stale_sweep_secs")]
    pub stale_sweep_interval_secs: u64,

    /// Age past which a PENDING payment counts as stale.
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: i64,

    /// Reconciliation attempts per payment before giving up.
    #[serde(default = "default_reconcile_retries")]
    pub max_retries: i32,

    /// Rows per sweep.
    #[serde(default = "default_reconcile_batch")]
    pub batch_size: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            failed_sweep_interval_secs: default_failed_sweep_secs(),
            stale_sweep_interval_secs: default_stale_sweep_secs(),
            stale_threshold_secs: default_stale_threshold_secs(),
            max_retries: default_reconcile_retries(),
            batch_size: default_reconcile_batch(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurgeConfig {
    /// Rolling window length.
    #[serde(default = "default_surge_window_secs")]
    pub window_secs: i64,

    /// Multiplier cache TTL; matches the snapshot cadence.
    #[serde(default = "default_surge_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            window_secs: default_surge_window_secs(),
            cache_ttl_secs: default_surge_cache_ttl_secs(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_region_id() -> String {
    "ap-south-1".to_string()
}
fn default_psp_timeout_ms() -> u64 {
    3000
}
fn default_search_radius_km() -> f64 {
    5.0
}
fn default_candidate_limit() -> usize {
    50
}
fn default_offer_ttl_secs() -> u64 {
    15
}
fn default_max_attempts() -> i32 {
    3
}
fn default_lock_wait_ms() -> u64 {
    2000
}
fn default_lock_lease_ms() -> u64 {
    5000
}
fn default_offer_sweep_secs() -> u64 {
    5
}
fn default_outbox_poll_ms() -> u64 {
    500
}
fn default_outbox_batch() -> i64 {
    50
}
fn default_outbox_retries() -> i32 {
    5
}
fn default_failed_sweep_secs() -> u64 {
    300
}
fn default_stale_sweep_secs() -> u64 {
    600
}
fn default_stale_threshold_secs() -> i64 {
    600
}
fn default_reconcile_retries() -> i32 {
    5
}
fn default_reconcile_batch() -> i64 {
    100
}
fn default_surge_window_secs() -> i64 {
    300
}
fn default_surge_cache_ttl_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from files and `RH__`-prefixed environment
    /// variables (e.g. `RH__DATABASE__URL`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("RH").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Socket address to bind the HTTP server to.
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], self.server.port)))
    }

    /// Build a config from embedded defaults plus overrides, without
    /// touching the file system. Used by tests.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 0

            [database]
            url = "postgres://localhost/ride_hailing_test"

            [logging]
            level = "debug"
            format = "pretty"

            [region]
            region_id = "ap-south-1"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::load_for_test(&[]).unwrap();
        assert_eq!(config.dispatch.search_radius_km, 5.0);
        assert_eq!(config.dispatch.candidate_limit, 50);
        assert_eq!(config.dispatch.offer_ttl_secs, 15);
        assert_eq!(config.dispatch.max_attempts, 3);
        assert_eq!(config.dispatch.lock_wait_ms, 2000);
        assert_eq!(config.dispatch.lock_lease_ms, 5000);
        assert_eq!(config.outbox.poll_interval_ms, 500);
        assert_eq!(config.outbox.batch_size, 50);
        assert_eq!(config.outbox.max_retries, 5);
        assert_eq!(config.reconciler.failed_sweep_interval_secs, 300);
        assert_eq!(config.reconciler.stale_sweep_interval_secs, 600);
        assert_eq!(config.reconciler.stale_threshold_secs, 600);
        assert_eq!(config.surge.window_secs, 300);
        assert_eq!(config.surge.cache_ttl_secs, 10);
    }

    #[test]
    fn test_overrides() {
        let config = Config::load_for_test(&[
            ("dispatch.max_attempts", "5"),
            ("region.region_id", "eu-west-1"),
        ])
        .unwrap();
        assert_eq!(config.dispatch.max_attempts, 5);
        assert_eq!(config.region.region_id, "eu-west-1");
    }

    #[test]
    fn test_socket_addr() {
        let config = Config::load_for_test(&[("server.port", "8081")]).unwrap();
        assert_eq!(config.socket_addr().port(), 8081);
    }

    #[test]
    fn test_bus_and_psp_default_to_embedded() {
        let config = Config::load_for_test(&[]).unwrap();
        assert!(config.bus.nats_url.is_empty());
        assert!(config.psp.url.is_empty());
    }
}
