//! Repository implementations.

pub mod driver_offer;
pub mod geo_cell;
pub mod outbox;
pub mod payment;
pub mod ride;

pub use driver_offer::DriverOfferRepository;
pub use geo_cell::GeoCellRepository;
pub use outbox::OutboxRepository;
pub use payment::{PaymentInput, PaymentRepository};
pub use ride::{RideInput, RideRepository};
