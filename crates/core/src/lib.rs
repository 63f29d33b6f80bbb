//! Ourabridge Core - credential and subscription stores, vendor documents,
//! and the observation model.
//!
//! This crate has no network or runtime dependencies. The HTTP clients live
//! in `ourabridge-connect`; the server wires both together.

pub mod credentials;
pub mod documents;
pub mod errors;
pub mod observations;
pub mod subscriptions;
pub mod utils;

pub use observations::Observation;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
