//! Calibration manager
//!
//! Lifecycle state machine around the Platt transform: loads and validates
//! persisted parameters, triggers fits when the dataset crosses its
//! thresholds, re-triggers them as results accumulate or age, and exposes
//! the public calibrate surface. Calibration is a best-effort enhancement
//! layer: every storage failure degrades to passthrough, never to a crash.

use crate::dataset::DatasetManager;
use crate::fitter::{self, CrossValidationResult, FitConfig, FitSample};
use crate::metrics;
use crate::platt;
use chrono::{DateTime, Duration, Utc};
use railbird_core::{
    CalibrationStore, PlattParameters, RaceQuery, RaceStatus, RaceStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Completed races required before the first fit
    #[serde(default = "default_min_races")]
    pub min_races: usize,

    /// New completed races since the last fit that trigger recalibration
    #[serde(default = "default_recalibration_threshold")]
    pub recalibration_threshold: usize,

    /// A fit older than this is refit on the next readiness check
    #[serde(default = "default_max_age_days")]
    pub max_recalibration_age_days: i64,

    /// Fit snapshots retained for trend inspection
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default)]
    pub fit: FitConfig,
}

fn default_min_races() -> usize {
    500
}

fn default_recalibration_threshold() -> usize {
    50
}

fn default_max_age_days() -> i64 {
    7
}

fn default_history_limit() -> usize {
    20
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            min_races: default_min_races(),
            recalibration_threshold: default_recalibration_threshold(),
            max_recalibration_age_days: default_max_age_days(),
            history_limit: default_history_limit(),
            fit: FitConfig::default(),
        }
    }
}

/// Status snapshot for dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationStatus {
    pub is_ready: bool,
    pub total_races: usize,
    /// Completed races still needed before the first fit; floored at 0
    pub races_needed: usize,
    /// Progress toward the first fit; capped at 100
    pub progress_percent: u8,
    pub needs_recalibration: bool,
    pub last_fitted_at: Option<DateTime<Utc>>,
    /// Brier score achieved by the active fit
    pub brier_score: Option<f64>,
    /// Log loss achieved by the active fit
    pub log_loss: Option<f64>,
}

/// Full-dataset evaluation of the current transform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensiveMetrics {
    pub sample_count: usize,
    pub brier_score: f64,
    pub log_loss: f64,
    pub expected_calibration_error: f64,
    pub max_calibration_error: f64,
    pub brier_skill_score: Option<f64>,
    pub reliability: Vec<metrics::ReliabilityBin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    NotReady,
    Ready,
}

struct ManagerState {
    lifecycle: Lifecycle,
    parameters: Option<PlattParameters>,
    last_fit_race_count: Option<u32>,
}

/// The calibration orchestrator
pub struct CalibrationManager {
    races: Arc<dyn RaceStore>,
    store: Arc<dyn CalibrationStore>,
    config: ManagerConfig,
    state: RwLock<ManagerState>,
    // Serializes initialization so concurrent callers share one load
    // instead of racing duplicate ones
    init_lock: Mutex<()>,
}

impl CalibrationManager {
    pub fn new(
        races: Arc<dyn RaceStore>,
        store: Arc<dyn CalibrationStore>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            races,
            store,
            config,
            state: RwLock::new(ManagerState {
                lifecycle: Lifecycle::Uninitialized,
                parameters: None,
                last_fit_race_count: None,
            }),
            init_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Load persisted state. Idempotent; concurrent callers are serialized
    /// and all observe the single completed load.
    pub async fn initialize(&self) {
        let _guard = self.init_lock.lock().await;
        if self.state.read().await.lifecycle != Lifecycle::Uninitialized {
            return;
        }

        let parameters = match self.store.load_parameters().await {
            Ok(Some(params)) if params.is_valid() => {
                info!(a = params.a, b = params.b, "Loaded persisted Platt parameters");
                Some(params)
            }
            Ok(Some(params)) => {
                warn!(
                    a = params.a,
                    b = params.b,
                    "Discarding invalid persisted Platt parameters"
                );
                if let Err(e) = self.store.clear_parameters().await {
                    warn!(error = %e, "Failed to clear invalid parameters");
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to load parameters; starting uncalibrated");
                None
            }
        };

        let last_fit_race_count = match self.store.get_last_fit_race_count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to load last-fit race count");
                None
            }
        };

        let mut state = self.state.write().await;
        state.lifecycle = if parameters.is_some() {
            Lifecycle::Ready
        } else {
            Lifecycle::NotReady
        };
        state.parameters = parameters;
        state.last_fit_race_count = last_fit_race_count;
    }

    /// Poll the dataset and fit or refit as needed. Idempotent and safe to
    /// call after every recorded result. Returns whether calibration is
    /// ready afterwards.
    pub async fn check_readiness(&self) -> bool {
        self.initialize().await;
        let completed = self.completed_count().await;

        let (lifecycle, needs_refit) = {
            let state = self.state.read().await;
            (
                state.lifecycle,
                self.needs_recalibration_inner(&state, completed),
            )
        };

        match lifecycle {
            Lifecycle::Ready => {
                if needs_refit {
                    debug!(completed, "Recalibration due");
                    self.run_fit(completed, self.config.min_races).await;
                }
                true
            }
            _ => {
                if completed >= self.config.min_races {
                    self.run_fit(completed, self.config.min_races).await
                } else {
                    false
                }
            }
        }
    }

    /// Force a fit now, bypassing the race-count threshold. The fitter's
    /// own minimum-sample floor still applies. Returns whether the fit
    /// succeeded.
    pub async fn recalibrate(&self) -> bool {
        self.initialize().await;
        let completed = self.completed_count().await;
        self.run_fit(completed, self.config.fit.min_samples).await
    }

    /// Calibrate a single raw probability. Passthrough when not Ready.
    pub async fn calibrate(&self, raw: f64) -> f64 {
        let state = self.state.read().await;
        match (&state.lifecycle, &state.parameters) {
            (Lifecycle::Ready, Some(params)) => platt::calibrate_probability(raw, params),
            _ => raw,
        }
    }

    /// Calibrate a whole field. Passthrough when not Ready.
    pub async fn calibrate_field(&self, raw: &[f64]) -> Vec<f64> {
        let state = self.state.read().await;
        match (&state.lifecycle, &state.parameters) {
            (Lifecycle::Ready, Some(params)) => platt::calibrate_field(raw, params),
            _ => raw.to_vec(),
        }
    }

    /// The active parameters, None unless Ready.
    pub async fn get_parameters(&self) -> Option<PlattParameters> {
        let state = self.state.read().await;
        if state.lifecycle == Lifecycle::Ready {
            state.parameters.clone()
        } else {
            None
        }
    }

    /// Brier score and log loss the active fit achieved on its training
    /// data, None unless Ready.
    pub async fn get_metrics(&self) -> Option<(f64, f64)> {
        self.get_parameters()
            .await
            .map(|p| (p.brier_score, p.log_loss))
    }

    /// Fit snapshots, most recent first.
    pub async fn fit_history(&self) -> Vec<PlattParameters> {
        match self.store.load_fit_history().await {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Failed to load fit history");
                Vec::new()
            }
        }
    }

    /// Status snapshot for dashboards. Never fails; storage problems show
    /// up as an empty, not-ready dataset.
    pub async fn status(&self) -> CalibrationStatus {
        self.initialize().await;
        let completed = self.completed_count().await;
        let state = self.state.read().await;

        let progress = (completed * 100) / self.config.min_races.max(1);
        let is_ready = state.lifecycle == Lifecycle::Ready;

        CalibrationStatus {
            is_ready,
            total_races: completed,
            races_needed: self.config.min_races.saturating_sub(completed),
            progress_percent: progress.min(100) as u8,
            needs_recalibration: self.needs_recalibration_inner(&state, completed),
            last_fitted_at: state.parameters.as_ref().map(|p| p.fitted_at),
            brier_score: state
                .parameters
                .as_ref()
                .filter(|_| is_ready)
                .map(|p| p.brier_score),
            log_loss: state
                .parameters
                .as_ref()
                .filter(|_| is_ready)
                .map(|p| p.log_loss),
        }
    }

    /// Clear in-memory and persisted calibration state. Always lands in
    /// NotReady.
    pub async fn reset(&self) {
        if let Err(e) = self.store.clear_parameters().await {
            warn!(error = %e, "Failed to clear persisted parameters on reset");
        }
        if let Err(e) = self.store.clear_fit_history().await {
            warn!(error = %e, "Failed to clear fit history on reset");
        }
        if let Err(e) = self.store.clear_last_fit_race_count().await {
            warn!(error = %e, "Failed to clear last-fit race count on reset");
        }

        let mut state = self.state.write().await;
        state.lifecycle = Lifecycle::NotReady;
        state.parameters = None;
        state.last_fit_race_count = None;
        info!("Calibration reset to NotReady");
    }

    /// k-fold cross-validation over the full dataset; judges estimate
    /// stability, never selects the model.
    pub async fn run_cross_validation(&self, k: usize) -> Option<CrossValidationResult> {
        self.initialize().await;
        let samples = self.collect_samples().await;
        fitter::cross_validate(&samples, k, &self.config.fit)
    }

    /// Apply the current transform (identity when not Ready) to every
    /// completed prediction and report the full metrics suite.
    pub async fn comprehensive_metrics(&self) -> Option<ComprehensiveMetrics> {
        self.initialize().await;
        let samples = self.collect_samples().await;
        if samples.is_empty() {
            return None;
        }

        let mut calibrated = Vec::with_capacity(samples.len());
        for s in &samples {
            calibrated.push(self.calibrate(s.predicted).await);
        }
        let outcomes: Vec<bool> = samples.iter().map(|s| s.won).collect();

        Some(ComprehensiveMetrics {
            sample_count: samples.len(),
            brier_score: metrics::brier_score(&calibrated, &outcomes)?,
            log_loss: metrics::log_loss(&calibrated, &outcomes)?,
            expected_calibration_error: metrics::expected_calibration_error(
                &calibrated,
                &outcomes,
                metrics::DEFAULT_BUCKETS,
            )?,
            max_calibration_error: metrics::max_calibration_error(
                &calibrated,
                &outcomes,
                metrics::DEFAULT_BUCKETS,
            )?,
            brier_skill_score: metrics::brier_skill_score(&calibrated, &outcomes),
            reliability: metrics::reliability_diagram(
                &calibrated,
                &outcomes,
                metrics::DEFAULT_BUCKETS,
            )?,
        })
    }

    /// Convenience: a dataset manager sharing this manager's race store.
    pub fn dataset(&self) -> DatasetManager {
        DatasetManager::new(self.races.clone(), crate::dataset::DatasetConfig {
            min_races_for_calibration: self.config.min_races,
            ..crate::dataset::DatasetConfig::default()
        })
    }

    fn needs_recalibration_inner(&self, state: &ManagerState, completed: usize) -> bool {
        let Some(params) = &state.parameters else {
            return false;
        };
        if state.lifecycle != Lifecycle::Ready {
            return false;
        }

        let last_count = state.last_fit_race_count.unwrap_or(params.race_count) as usize;
        let new_races = completed.saturating_sub(last_count);
        if new_races >= self.config.recalibration_threshold {
            return true;
        }

        Utc::now() - params.fitted_at >= Duration::days(self.config.max_recalibration_age_days)
    }

    async fn completed_count(&self) -> usize {
        match self.races.count_races(Some(RaceStatus::Complete)).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to count completed races");
                0
            }
        }
    }

    /// Gather fit samples from every completed race: active entries with a
    /// strictly interior prediction.
    async fn collect_samples(&self) -> Vec<FitSample> {
        let query = RaceQuery {
            status: Some(RaceStatus::Complete),
            ..RaceQuery::default()
        };
        let races = match self.races.query_races(&query).await {
            Ok(races) => races,
            Err(e) => {
                warn!(error = %e, "Failed to load completed races for fitting");
                return Vec::new();
            }
        };

        races
            .iter()
            .flat_map(|race| race.active_entries())
            .filter(|e| e.predicted_probability > 0.0 && e.predicted_probability < 1.0)
            .map(|e| FitSample {
                predicted: e.predicted_probability,
                won: e.was_winner,
            })
            .collect()
    }

    /// Fit on the full dataset and replace the parameters wholesale.
    /// Returns whether the manager is Ready afterwards.
    async fn run_fit(&self, completed: usize, min_samples: usize) -> bool {
        let samples = self.collect_samples().await;
        if samples.len() < min_samples {
            debug!(
                samples = samples.len(),
                required = min_samples,
                "Not enough valid predictions to fit"
            );
            return self.state.read().await.lifecycle == Lifecycle::Ready;
        }

        let Some(result) = fitter::fit(&samples, &self.config.fit) else {
            warn!(samples = samples.len(), "Platt fit failed");
            return self.state.read().await.lifecycle == Lifecycle::Ready;
        };

        let mut params = result.parameters;
        params.race_count = completed as u32;

        info!(
            a = params.a,
            b = params.b,
            brier = params.brier_score,
            log_loss = params.log_loss,
            races = completed,
            samples = result.sample_count,
            converged = result.converged,
            "Fitted new Platt parameters"
        );

        if let Err(e) = self.store.save_parameters(&params).await {
            warn!(error = %e, "Failed to persist fitted parameters; keeping them in memory");
        }
        if let Err(e) = self
            .store
            .append_fit_history(&params, self.config.history_limit)
            .await
        {
            warn!(error = %e, "Failed to append fit history");
        }
        if let Err(e) = self.store.set_last_fit_race_count(completed as u32).await {
            warn!(error = %e, "Failed to record last-fit race count");
        }

        let mut state = self.state.write().await;
        state.lifecycle = Lifecycle::Ready;
        state.parameters = Some(params);
        state.last_fit_race_count = Some(completed as u32);
        true
    }
}
