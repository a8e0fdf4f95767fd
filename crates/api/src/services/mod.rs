//! Engines and external service integrations.

pub mod bus;
pub mod dispatch;
pub mod payment;
pub mod psp;
pub mod resilience;
pub mod surge;

pub use bus::NatsEventBus;
pub use dispatch::{DispatchEngine, DispatchError};
pub use payment::{PaymentError, PaymentOrchestrator};
pub use psp::HttpPspClient;
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
pub use surge::SurgeCalculator;
