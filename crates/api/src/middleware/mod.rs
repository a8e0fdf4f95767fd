//! Middleware for the HTTP surface.

pub mod logging;

pub use logging::init_logging;
