//! HTTP API handlers for logitrack-ingest
//!
//! Health and pipeline introspection only; shipment queries belong to the
//! read-side service.

pub mod health;

pub use health::health_routes;
