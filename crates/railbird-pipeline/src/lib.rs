//! Railbird Pipeline
//!
//! Feeds the calibration dataset: recovers historical races from parsed
//! race-card form lines, logs predictions before results are known, merges
//! official results back in, and glues the steps together behind the
//! auto-logger the host calls after each card.

pub mod auto_logger;
pub mod extractor;
pub mod logger;
pub mod recorder;

pub use auto_logger::{AutoLogReport, AutoLogger};
pub use extractor::{Extraction, ExtractionStats, Extractor, ExtractorConfig};
pub use logger::{LogOutcome, PredictionLogger};
pub use recorder::{RecordError, RecordOutcome, ResultsRecorder};
