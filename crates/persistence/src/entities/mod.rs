//! Entity definitions (database row mappings).

pub mod driver_offer;
pub mod geo_cell;
pub mod outbox;
pub mod payment;
pub mod ride;

pub use driver_offer::DriverOfferEntity;
pub use geo_cell::GeoCellEntity;
pub use outbox::OutboxEntity;
pub use payment::PaymentEntity;
pub use ride::RideEntity;
