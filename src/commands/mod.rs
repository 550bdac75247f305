//! CLI commands

mod calibrate;
mod dataset;
mod ingest;
mod status;

pub use calibrate::CalibrateCommand;
pub use dataset::DatasetCommand;
pub use ingest::IngestCommand;
pub use status::StatusCommand;
