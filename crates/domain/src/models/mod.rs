//! Domain models.

pub mod driver;
pub mod events;
pub mod offer;
pub mod outbox;
pub mod payment;
pub mod ride;
pub mod surge;

pub use driver::{DriverMetadata, DriverStatus};
pub use events::topics;
pub use offer::{DriverOffer, OfferResponse};
pub use outbox::{OutboxEntry, OutboxStatus};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use ride::{CreateRideRequest, Ride, RideStatus, RideSummary, VehicleTier};
pub use surge::{GeoCellSnapshot, WindowEntry};
