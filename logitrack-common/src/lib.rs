//! # LogiTrack Common Library
//!
//! Shared code for the LogiTrack services:
//! - Domain types (status categories, delay reasons, coordinates)
//! - Configuration loading
//! - SQLite schema, row models and the read-side query contract
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{BoundingBox, Classification, DelayReason, GeoPoint, StatusCategory};
