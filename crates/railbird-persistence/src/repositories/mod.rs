//! Repository implementations over the SQLite pool

mod calibration;
mod races;

pub use calibration::CalibrationRepository;
pub use races::RaceRepository;
