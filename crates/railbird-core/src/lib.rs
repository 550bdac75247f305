//! Railbird Core
//!
//! Core types, store traits, and probability math for the railbird
//! calibration pipeline.

pub mod error;
pub mod inputs;
pub mod math;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use inputs::*;
pub use store::{CalibrationStore, RaceQuery, RaceStore};
pub use types::*;
