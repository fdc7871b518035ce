//! Utility modules for logitrack-ingest

pub mod db_retry;

pub use db_retry::retry_transient;
