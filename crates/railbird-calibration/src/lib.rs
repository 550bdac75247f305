//! Railbird Calibration
//!
//! Probability calibration for win predictions: the pure Platt scaling
//! transform, gradient-descent parameter fitting, proper scoring metrics,
//! descriptive dataset views, and the lifecycle manager that ties them to
//! durable storage.

pub mod dataset;
pub mod fitter;
pub mod manager;
pub mod metrics;
pub mod platt;

pub use dataset::{
    DatasetConfig, DatasetManager, IntegrityIssue, IntegrityReport, ProbabilityBucket, RaceFilter,
    ScoreBucket, SurfaceStats, TierStats,
};
pub use fitter::{
    cross_validate, fit, grid_search, CrossValidationResult, FitConfig, FitResult, FitSample,
    FoldResult, GridSearchConfig,
};
pub use manager::{CalibrationManager, CalibrationStatus, ComprehensiveMetrics, ManagerConfig};
pub use metrics::{
    brier_score, brier_skill_score, expected_calibration_error, log_loss, max_calibration_error,
    reliability_diagram, ReliabilityBin,
};
pub use platt::{calibrate_field, calibrate_probability, MAX_CALIBRATED, MIN_CALIBRATED};
