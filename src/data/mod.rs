//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Activity storage seam

mod database;
mod models;
mod store;

pub use database::Database;
pub use models::*;
pub use store::ActivityStore;

#[cfg(test)]
pub use store::MockActivityStore;
