//! Background job scheduler and job implementations.

mod offer_timeout;
mod outbox_relay;
mod reconciler;
mod scheduler;

pub use offer_timeout::OfferTimeoutJob;
pub use outbox_relay::OutboxRelayJob;
pub use reconciler::{FailedPaymentSweepJob, StalePendingSweepJob};
pub use scheduler::{Job, JobFrequency, JobScheduler};
