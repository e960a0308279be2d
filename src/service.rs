use crate::analysis::{self, ForecastAnalysis};
use crate::config::ForecastSettings;
use crate::errors::{ForecastError, ForecastResult};
use crate::features::FeatureBuilder;
use crate::forecaster::{FallbackReason, Forecaster, ModelState, PathSource};
use crate::indicators::{round2, safe_div};
use crate::lstm::ModelInfo;
use crate::models::{EntityKey, RiskLevel};
use crate::scaler::ScalerRegistry;
use crate::series_store::SeriesStore;
use crate::service_status::{ServiceStatus, ServiceStatusSnapshot};
use crate::windowing::{SequenceWindower, SupervisedPair};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

const SIGNIFICANT_CHANGE_PCT: f64 = 10.0;
const STABLE_CHANGE_PCT: f64 = 3.0;
const ALERT_HIGH_RISK_SHARE: f64 = 0.2;
const CAUTION_SIGNIFICANT_SHARE: f64 = 0.3;
const STABLE_SHARE: f64 = 0.7;
const MAX_TOP_CONCERNS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastReport {
    pub forecast_id: Uuid,
    pub commodity: String,
    pub region: String,
    pub base_date: NaiveDate,
    pub current_price: f64,
    pub days_ahead: usize,
    pub predictions: Vec<f64>,
    pub prediction_dates: Vec<NaiveDate>,
    pub price_changes: Vec<f64>,
    pub price_changes_pct: Vec<f64>,
    pub source: PathSource,
    #[serde(flatten)]
    pub analysis: ForecastAnalysis,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchEntry {
    Success(ForecastReport),
    Failed {
        commodity: String,
        region: String,
        error_kind: String,
        message: String,
    },
}

impl BatchEntry {
    pub fn report(&self) -> Option<&ForecastReport> {
        match self {
            BatchEntry::Success(report) => Some(report),
            BatchEntry::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatistics {
    pub total_predictions: usize,
    pub successful_predictions: usize,
    pub failed_predictions: usize,
    pub simulated_predictions: usize,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskDistribution {
    pub high_risk: usize,
    pub significant_change: usize,
    pub stable: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Concern {
    pub commodity: String,
    pub region: String,
    pub total_change_pct: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketCondition {
    Alert,
    Caution,
    Stable,
    Mixed,
    Undetermined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub statistics: BatchStatistics,
    pub risk_distribution: RiskDistribution,
    pub top_concerns: Vec<Concern>,
    pub market_condition: MarketCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub days_ahead: usize,
    pub results: Vec<BatchEntry>,
    pub batch_summary: BatchSummary,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub show_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceHealth {
    /// Data and model loaded.
    Ready,
    /// Data loaded, forecasts are simulated.
    Degraded,
    /// No data; every forecast request fails.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: ServiceHealth,
    pub model_loaded: bool,
    pub data_loaded: bool,
    pub model: Option<ModelInfo>,
    pub model_error: Option<String>,
    pub commodity_count: usize,
    pub region_count: usize,
    pub entity_count: usize,
    pub total_records: usize,
    pub fitted_scalers: usize,
    pub service: ServiceStatusSnapshot,
    pub checked_at: DateTime<Utc>,
}

/// Forecasting pipeline over a loaded store. Constructed explicitly and
/// shared by reference; safe to call from many threads.
pub struct PredictionService {
    store: Arc<SeriesStore>,
    features: FeatureBuilder,
    scalers: ScalerRegistry,
    windower: SequenceWindower,
    forecaster: Forecaster,
    settings: ForecastSettings,
    status: ServiceStatus,
    pool: rayon::ThreadPool,
}

impl PredictionService {
    pub fn new(
        store: Arc<SeriesStore>,
        model: ModelState,
        settings: ForecastSettings,
    ) -> ForecastResult<Self> {
        let forecaster = Forecaster::new(
            model,
            settings.sequence_length,
            settings.mock_daily_volatility,
            settings.mock_seed,
        )?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.batch_workers.max(1))
            .thread_name(|idx| format!("forecast-{idx}"))
            .build()
            .map_err(|err| {
                ForecastError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    err.to_string(),
                ))
            })?;

        Ok(Self {
            features: FeatureBuilder::new(store.source_columns()),
            scalers: ScalerRegistry::new(),
            windower: SequenceWindower::new(settings.sequence_length),
            store,
            forecaster,
            settings,
            status: ServiceStatus::new(),
            pool,
        })
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    pub fn status(&self) -> &ServiceStatus {
        &self.status
    }

    pub fn scalers(&self) -> &ScalerRegistry {
        &self.scalers
    }

    /// Request checks that run before any data or model work.
    pub fn validate_request(
        &self,
        commodity: &str,
        region: &str,
        days_ahead: usize,
    ) -> ForecastResult<EntityKey> {
        self.validate_days_ahead(days_ahead)?;
        let key = EntityKey::new(commodity.trim(), region.trim());
        if !self.store.has_commodity(&key.commodity) || !self.store.has_region(&key.region) {
            return Err(ForecastError::data_not_found(&key));
        }
        Ok(key)
    }

    fn validate_days_ahead(&self, days_ahead: usize) -> ForecastResult<()> {
        if days_ahead == 0 || days_ahead > self.settings.max_days_ahead {
            return Err(ForecastError::InvalidRequest {
                field: "days_ahead",
                message: format!(
                    "must be between 1 and {} (got {})",
                    self.settings.max_days_ahead, days_ahead
                ),
            });
        }
        Ok(())
    }

    pub fn generate_forecast(
        &self,
        commodity: &str,
        region: &str,
        days_ahead: usize,
    ) -> ForecastResult<ForecastReport> {
        let result = self
            .validate_request(commodity, region, days_ahead)
            .and_then(|key| self.forecast_entity(&key, days_ahead));
        match &result {
            Ok(report) => self.status.record_forecast(report.source.is_simulated()),
            Err(err) => self.status.record_failure(err.to_string()),
        }
        result
    }

    fn forecast_entity(&self, key: &EntityKey, days_ahead: usize) -> ForecastResult<ForecastReport> {
        let series = self.store.series(key)?;
        if series.len() < self.windower.length() {
            return Err(ForecastError::InsufficientHistory {
                commodity: key.commodity.clone(),
                region: key.region.clone(),
                available: series.len(),
                required: self.windower.length(),
            });
        }
        let (Some(current_price), Some(base_date)) = (series.current_price(), series.last_date())
        else {
            return Err(ForecastError::data_not_found(key));
        };

        let features = self.features.build(&series);
        let window = self
            .scalers
            .transform(key, &features)
            .and_then(|scaled| self.windower.latest_window(key, &scaled));
        let path = match window {
            Ok(window) => {
                self.forecaster
                    .predict(key, &window, days_ahead, current_price, &self.scalers)
            }
            Err(ForecastError::NumericAnomaly(detail)) => {
                warn!(
                    "Features for {} are not usable ({}); returning simulated path",
                    key, detail
                );
                self.forecaster.simulate(
                    key,
                    days_ahead,
                    current_price,
                    FallbackReason::NumericAnomaly,
                )
            }
            Err(err) => return Err(err),
        };

        let prediction_dates: Vec<NaiveDate> = (1..=days_ahead as i64)
            .map(|offset| base_date + Duration::days(offset))
            .collect();
        let forecast_month = prediction_dates
            .first()
            .map_or(base_date.month(), |date| date.month());
        let analysis = analysis::analyze(&series, &path.prices, current_price, forecast_month);

        let (changes, changes_pct) = price_changes(&path.prices, current_price);

        debug!(
            "Forecast {} for {} day(s): {:?} {:?}",
            key, days_ahead, analysis.trend.direction, path.source
        );

        Ok(ForecastReport {
            forecast_id: Uuid::new_v4(),
            commodity: key.commodity.clone(),
            region: key.region.clone(),
            base_date,
            current_price,
            days_ahead,
            predictions: path.prices,
            prediction_dates,
            price_changes: changes,
            price_changes_pct: changes_pct,
            source: path.source,
            analysis,
            generated_at: Utc::now(),
        })
    }

    /// Forecasts every commodity/region pair. One pair failing never aborts
    /// the others; its error is reported in place.
    pub fn batch_forecast(
        &self,
        days_ahead: usize,
        options: BatchOptions,
    ) -> ForecastResult<BatchReport> {
        self.validate_days_ahead(days_ahead)?;

        let pairs: Vec<EntityKey> = self
            .store
            .commodities()
            .iter()
            .flat_map(|commodity| {
                self.store
                    .regions()
                    .iter()
                    .map(move |region| EntityKey::new(commodity.clone(), region.clone()))
            })
            .collect();

        self.status
            .set_phase(format!("Batch forecasting {} pair(s)", pairs.len()));
        info!(
            "Batch forecasting {} pair(s) {} day(s) ahead on {} worker(s)",
            pairs.len(),
            days_ahead,
            self.pool.current_num_threads()
        );

        let progress = if options.show_progress {
            let bar = ProgressBar::new(pairs.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let results: Vec<BatchEntry> = self.pool.install(|| {
            pairs
                .par_iter()
                .map(|key| {
                    let entry = match self.generate_forecast(&key.commodity, &key.region, days_ahead) {
                        Ok(report) => BatchEntry::Success(report),
                        Err(err) => {
                            warn!("Batch forecast for {} failed: {}", key, err);
                            BatchEntry::Failed {
                                commodity: key.commodity.clone(),
                                region: key.region.clone(),
                                error_kind: err.kind().to_string(),
                                message: err.to_string(),
                            }
                        }
                    };
                    progress.inc(1);
                    entry
                })
                .collect()
        });
        progress.finish_and_clear();

        let batch_summary = summarize_batch(&results);
        info!(
            "Batch complete: {}/{} succeeded ({} simulated), market condition {:?}",
            batch_summary.statistics.successful_predictions,
            batch_summary.statistics.total_predictions,
            batch_summary.statistics.simulated_predictions,
            batch_summary.market_condition
        );
        self.status.set_phase("Ready");

        Ok(BatchReport {
            days_ahead,
            results,
            batch_summary,
            generated_at: Utc::now(),
        })
    }

    pub fn health(&self) -> HealthReport {
        let data_loaded = !self.store.is_empty();
        let (model, model_error) = match self.forecaster.model_state() {
            ModelState::Ready(model) => (Some(model.info()), None),
            ModelState::Unavailable { reason } => (None, Some(reason.clone())),
        };
        let model_loaded = model.is_some();
        let status = match (data_loaded, model_loaded) {
            (true, true) => ServiceHealth::Ready,
            (true, false) => ServiceHealth::Degraded,
            (false, _) => ServiceHealth::Unavailable,
        };

        HealthReport {
            status,
            model_loaded,
            data_loaded,
            model,
            model_error,
            commodity_count: self.store.commodities().len(),
            region_count: self.store.regions().len(),
            entity_count: self.store.entity_count(),
            total_records: self.store.total_rows(),
            fitted_scalers: self.scalers.len(),
            service: self.status.snapshot(),
            checked_at: Utc::now(),
        }
    }

    /// Scaled `(window, next price)` pairs over one entity's full history.
    pub fn supervised_pairs(&self, key: &EntityKey) -> ForecastResult<Vec<SupervisedPair>> {
        let series = self.store.series(key)?;
        let features = self.features.build(&series);
        let scaled = self.scalers.transform(key, &features)?;
        Ok(self.windower.supervised_pairs(&scaled))
    }
}

/// Absolute and percentage change of every predicted price against the
/// current price.
pub fn price_changes(predictions: &[f64], current_price: f64) -> (Vec<f64>, Vec<f64>) {
    predictions
        .iter()
        .map(|price| {
            let change = price - current_price;
            (change, round2(safe_div(change, current_price) * 100.0))
        })
        .unzip()
}

pub fn summarize_batch(results: &[BatchEntry]) -> BatchSummary {
    let reports: Vec<&ForecastReport> = results.iter().filter_map(BatchEntry::report).collect();
    let total = results.len();
    let successful = reports.len();
    let simulated = reports
        .iter()
        .filter(|report| report.source.is_simulated())
        .count();

    let mut distribution = RiskDistribution::default();
    let mut concerns = Vec::new();
    for report in &reports {
        let change = report.analysis.trend.total_change_pct;
        let risk = report.analysis.risk.level;
        let significant = change.abs() > SIGNIFICANT_CHANGE_PCT;
        if risk == RiskLevel::High {
            distribution.high_risk += 1;
        }
        if significant {
            distribution.significant_change += 1;
        }
        if change.abs() < STABLE_CHANGE_PCT {
            distribution.stable += 1;
        }
        if risk == RiskLevel::High || significant {
            concerns.push(Concern {
                commodity: report.commodity.clone(),
                region: report.region.clone(),
                total_change_pct: change,
                risk_level: risk,
            });
        }
    }
    concerns.sort_by(|a, b| {
        b.total_change_pct
            .abs()
            .partial_cmp(&a.total_change_pct.abs())
            .unwrap_or(Ordering::Equal)
    });
    concerns.truncate(MAX_TOP_CONCERNS);

    let market_condition = if successful == 0 {
        MarketCondition::Undetermined
    } else {
        let share = |count: usize| count as f64 / successful as f64;
        if share(distribution.high_risk) > ALERT_HIGH_RISK_SHARE {
            MarketCondition::Alert
        } else if share(distribution.significant_change) > CAUTION_SIGNIFICANT_SHARE {
            MarketCondition::Caution
        } else if share(distribution.stable) > STABLE_SHARE {
            MarketCondition::Stable
        } else {
            MarketCondition::Mixed
        }
    };

    BatchSummary {
        statistics: BatchStatistics {
            total_predictions: total,
            successful_predictions: successful,
            failed_predictions: total - successful,
            simulated_predictions: simulated,
            success_rate: if total == 0 {
                0.0
            } else {
                round2(successful as f64 / total as f64 * 100.0)
            },
        },
        risk_distribution: distribution,
        top_concerns: concerns,
        market_condition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{confidence, risk, trend};

    const CURRENT: f64 = 100.0;

    fn entry(region: &str, path: &[f64]) -> BatchEntry {
        let base_date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let (changes, changes_pct) = price_changes(path, CURRENT);
        BatchEntry::Success(ForecastReport {
            forecast_id: Uuid::new_v4(),
            commodity: "Beras".to_string(),
            region: region.to_string(),
            base_date,
            current_price: CURRENT,
            days_ahead: path.len(),
            predictions: path.to_vec(),
            prediction_dates: (1..=path.len() as i64)
                .map(|offset| base_date + Duration::days(offset))
                .collect(),
            price_changes: changes,
            price_changes_pct: changes_pct,
            source: PathSource::Simulated {
                reason: FallbackReason::ModelUnavailable,
            },
            analysis: ForecastAnalysis {
                trend: trend(path, CURRENT),
                risk: risk(path, CURRENT),
                confidence: confidence(path),
                historical: None,
            },
            generated_at: Utc::now(),
        })
    }

    fn failed(region: &str) -> BatchEntry {
        BatchEntry::Failed {
            commodity: "Beras".to_string(),
            region: region.to_string(),
            error_kind: "insufficient_history".to_string(),
            message: "too short".to_string(),
        }
    }

    #[test]
    fn per_step_changes_against_current_price() {
        let path = [46_000.0, 47_500.0, 48_000.0, 47_000.0, 46_500.0, 45_500.0, 44_000.0];
        let (changes, pct) = price_changes(&path, 45_000.0);
        assert_eq!(changes[0], 1_000.0);
        assert_eq!(changes[6], -1_000.0);
        assert_eq!(pct, vec![2.22, 5.56, 6.67, 4.44, 3.33, 1.11, -2.22]);

        let trend = trend(&path, 45_000.0);
        assert_eq!(trend.total_change_pct, -2.22);
        assert_eq!(trend.direction, crate::models::TrendDirection::Stable);
    }

    #[test]
    fn mostly_flat_market_is_stable() {
        let mut results: Vec<BatchEntry> = (0..4)
            .map(|idx| entry(&format!("Flat {idx}"), &[100.0, 100.5]))
            .collect();
        results.push(entry("Rising", &[100.0, 115.0]));
        results.push(failed("Short"));

        let summary = summarize_batch(&results);
        assert_eq!(summary.statistics.total_predictions, 6);
        assert_eq!(summary.statistics.successful_predictions, 5);
        assert_eq!(summary.statistics.simulated_predictions, 5);
        assert_eq!(summary.statistics.success_rate, 83.33);
        assert_eq!(summary.risk_distribution.stable, 4);
        assert_eq!(summary.risk_distribution.significant_change, 1);
        assert_eq!(summary.market_condition, MarketCondition::Stable);
        assert_eq!(summary.top_concerns.len(), 1);
        assert_eq!(summary.top_concerns[0].region, "Rising");
    }

    #[test]
    fn high_risk_share_raises_alert() {
        let results = vec![
            entry("Flat A", &[100.0, 100.0]),
            entry("Crash", &[100.0, 140.0, 60.0]),
            entry("Flat B", &[100.0, 100.0]),
            entry("Rising", &[100.0, 115.0]),
        ];

        let summary = summarize_batch(&results);
        assert_eq!(summary.risk_distribution.high_risk, 1);
        assert_eq!(summary.market_condition, MarketCondition::Alert);
        let regions: Vec<&str> = summary
            .top_concerns
            .iter()
            .map(|concern| concern.region.as_str())
            .collect();
        assert_eq!(regions, vec!["Crash", "Rising"]);
        assert_eq!(summary.top_concerns[0].risk_level, RiskLevel::High);
    }

    #[test]
    fn significant_moves_without_high_risk_mean_caution() {
        let results = vec![
            entry("Flat A", &[100.0, 100.0]),
            entry("Rising", &[100.0, 115.0]),
            entry("Flat B", &[100.0, 100.0]),
        ];
        assert_eq!(
            summarize_batch(&results).market_condition,
            MarketCondition::Caution
        );
    }

    #[test]
    fn all_failures_leave_condition_undetermined() {
        let summary = summarize_batch(&[failed("A"), failed("B")]);
        assert_eq!(summary.statistics.successful_predictions, 0);
        assert_eq!(summary.statistics.success_rate, 0.0);
        assert_eq!(summary.market_condition, MarketCondition::Undetermined);
        assert!(summary.top_concerns.is_empty());

        let empty = summarize_batch(&[]);
        assert_eq!(empty.statistics.total_predictions, 0);
        assert_eq!(empty.market_condition, MarketCondition::Undetermined);
    }
}
