//! Database schema, models and read-side queries

pub mod init;
pub mod models;
pub mod queries;

pub use init::*;
pub use models::*;
