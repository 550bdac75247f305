//! Railbird Persistence
//!
//! SQLite database persistence for historical races, fitted Platt
//! parameters, and fit history.

mod database;
mod error;
mod repositories;

pub use database::Database;
pub use error::{PersistenceError, Result};
pub use repositories::{CalibrationRepository, RaceRepository};
