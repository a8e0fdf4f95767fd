//! Payment service provider abstraction.
//!
//! The PSP is an unreliable external dependency. Charge calls are wrapped
//! in retry and circuit-breaker policies by the payment orchestrator; the
//! trait itself is a single charge operation. The mock implementation is
//! scriptable for tests and serves as the default when no PSP endpoint is
//! configured.

use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::models::payment::PaymentMethod;

/// Errors raised by a PSP charge call.
#[derive(Debug, Error)]
pub enum PspError {
    /// Transient provider-side failure; eligible for retry.
    #[error("psp unavailable: {0}")]
    Unavailable(String),

    /// Transport-level failure reaching the provider; eligible for retry.
    #[error("psp transport error: {0}")]
    Transport(String),

    /// The provider processed the charge and declined it.
    #[error("charge declined: {0}")]
    Declined(String),
}

impl PspError {
    /// Whether a retry may change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PspError::Unavailable(_) | PspError::Transport(_))
    }
}

/// A charge request forwarded to the provider.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub rider_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
}

/// A successful charge: the provider's reference for the captured amount.
#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    pub reference: String,
}

/// External payment service provider.
#[async_trait::async_trait]
pub trait PspClient: Send + Sync {
    /// Charge the rider. Success means the amount was captured.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, PspError>;
}

/// Failure script for the mock PSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockMode {
    Succeed,
    FailAlways,
    /// Fail the next N charges, then succeed.
    FailTimes(u32),
}

/// Scriptable in-memory PSP used in tests and broker-less deployments.
pub struct MockPspClient {
    mode: Mutex<MockMode>,
    remaining_failures: AtomicU32,
    charge_count: AtomicU64,
}

impl Default for MockPspClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPspClient {
    /// A mock that captures every charge.
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(MockMode::Succeed),
            remaining_failures: AtomicU32::new(0),
            charge_count: AtomicU64::new(0),
        }
    }

    /// Make every subsequent charge fail as unavailable (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        let mut mode = self.mode.lock().expect("psp mock lock poisoned");
        *mode = if failing {
            MockMode::FailAlways
        } else {
            MockMode::Succeed
        };
    }

    /// Fail the next `n` charges, then succeed.
    pub fn fail_times(&self, n: u32) {
        let mut mode = self.mode.lock().expect("psp mock lock poisoned");
        *mode = MockMode::FailTimes(n);
        self.remaining_failures.store(n, Ordering::SeqCst);
    }

    /// Total charge attempts observed.
    pub fn charge_count(&self) -> u64 {
        self.charge_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PspClient for MockPspClient {
    async fn charge(&self, _request: &ChargeRequest) -> Result<ChargeReceipt, PspError> {
        self.charge_count.fetch_add(1, Ordering::SeqCst);

        let mode = *self.mode.lock().expect("psp mock lock poisoned");
        match mode {
            MockMode::Succeed => {}
            MockMode::FailAlways => {
                return Err(PspError::Unavailable("mock outage".to_string()));
            }
            MockMode::FailTimes(_) => {
                let prev = self
                    .remaining_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
                    .unwrap_or(0);
                if prev > 0 {
                    return Err(PspError::Unavailable("mock outage".to_string()));
                }
            }
        }

        let receipt = ChargeReceipt {
            reference: format!("MOCK-{}", Uuid::new_v4()),
        };
        tracing::debug!(reference = %receipt.reference, "Mock PSP captured charge");
        Ok(receipt)
    }
}
