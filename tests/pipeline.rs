use anyhow::Result;
use chrono::{Duration, NaiveDate};
use pangan_engine::commands::{batch, export_training_pairs};
use pangan_engine::config::ForecastSettings;
use pangan_engine::context::{load_model_with_timeout, AppContext};
use pangan_engine::errors::ForecastError;
use pangan_engine::feature_schema::{FeatureVector, FEATURE_WIDTH};
use pangan_engine::features::FeatureBuilder;
use pangan_engine::forecaster::{FallbackReason, ModelState, PathSource};
use pangan_engine::lstm::SequenceModel;
use pangan_engine::models::{
    ConfidenceLevel, EntityKey, PriceRecord, RiskLevel, SourceColumns, TrendDirection,
};
use pangan_engine::series_store::SeriesStore;
use pangan_engine::service::{BatchEntry, BatchOptions, PredictionService, ServiceHealth};
use serde_json::Value;
use std::sync::{Arc, Once};

const SEQUENCE_LENGTH: usize = 30;
const FULL_HISTORY_DAYS: usize = 60;
const SHORT_HISTORY_DAYS: usize = 20;
const COMMODITIES: [&str; 3] = ["Beras", "Cabai Merah", "Gula Pasir"];
const SHORT_PAIRS: [(&str, &str); 2] = [("Cabai Merah", "Region 3"), ("Gula Pasir", "Region 8")];

fn ensure_test_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Extrapolates the last scaled step; needs a full window.
struct TrendFollowingModel;

impl SequenceModel for TrendFollowingModel {
    fn id(&self) -> &str {
        "trend-following"
    }

    fn sequence_length(&self) -> usize {
        SEQUENCE_LENGTH
    }

    fn n_features(&self) -> usize {
        FEATURE_WIDTH
    }

    fn predict_next(&self, window: &[FeatureVector]) -> Option<f64> {
        if window.len() != SEQUENCE_LENGTH {
            return None;
        }
        let last = window[window.len() - 1].price();
        let previous = window[window.len() - 2].price();
        Some(last + (last - previous))
    }
}

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid start date")
}

fn regions() -> Vec<String> {
    (1..=8).map(|idx| format!("Region {idx}")).collect()
}

fn linear_records(
    commodity: &str,
    region: &str,
    days: usize,
    base_price: f64,
    daily_step: f64,
) -> Vec<PriceRecord> {
    (0..days)
        .map(|idx| {
            let mut record = PriceRecord::new(
                start_date() + Duration::days(idx as i64),
                commodity,
                region,
                base_price + daily_step * idx as f64,
            );
            let t = idx as f64;
            record.weather = [
                Some(27.0 + (t / 5.0).sin()),
                Some(80.0 + (t / 7.0).cos() * 4.0),
                Some(2.0 + (t / 3.0).sin() * 0.5),
            ];
            record.rainfall = Some(((t / 4.0).sin() * 10.0).max(0.0));
            record.imputation_flag = Some(false);
            record
        })
        .collect()
}

fn market_records() -> Vec<PriceRecord> {
    let mut records = Vec::new();
    for (commodity_idx, commodity) in COMMODITIES.iter().enumerate() {
        for (region_idx, region) in regions().iter().enumerate() {
            let days = if SHORT_PAIRS.contains(&(*commodity, region.as_str())) {
                SHORT_HISTORY_DAYS
            } else {
                FULL_HISTORY_DAYS
            };
            let base = 12_000.0 + 10_000.0 * commodity_idx as f64 + 250.0 * region_idx as f64;
            records.extend(linear_records(commodity, region, days, base, 10.0));
        }
    }
    records
}

fn test_settings() -> ForecastSettings {
    ForecastSettings {
        sequence_length: SEQUENCE_LENGTH,
        batch_workers: 2,
        mock_seed: Some(7),
        ..ForecastSettings::default()
    }
}

fn service_with(records: Vec<PriceRecord>, model: ModelState) -> PredictionService {
    let store = SeriesStore::from_records(records, SourceColumns::all());
    PredictionService::new(Arc::new(store), model, test_settings()).expect("service")
}

fn ready_model() -> ModelState {
    ModelState::Ready(Arc::new(TrendFollowingModel))
}

fn unavailable_model() -> ModelState {
    ModelState::Unavailable {
        reason: "no artifact in test".to_string(),
    }
}

#[test]
fn batch_isolates_failures_per_pair() {
    ensure_test_env();
    let service = service_with(market_records(), ready_model());

    let report = service
        .batch_forecast(7, BatchOptions::default())
        .expect("batch report");
    let statistics = &report.batch_summary.statistics;
    assert_eq!(statistics.total_predictions, 24);
    assert_eq!(statistics.successful_predictions, 22);
    assert_eq!(statistics.failed_predictions, 2);
    assert_eq!(statistics.simulated_predictions, 0);
    assert_eq!(statistics.success_rate, 91.67);

    let mut failed: Vec<(String, String, String)> = report
        .results
        .iter()
        .filter_map(|entry| match entry {
            BatchEntry::Failed {
                commodity,
                region,
                error_kind,
                ..
            } => Some((commodity.clone(), region.clone(), error_kind.clone())),
            BatchEntry::Success(_) => None,
        })
        .collect();
    failed.sort();
    assert_eq!(
        failed,
        vec![
            (
                "Cabai Merah".to_string(),
                "Region 3".to_string(),
                "insufficient_history".to_string()
            ),
            (
                "Gula Pasir".to_string(),
                "Region 8".to_string(),
                "insufficient_history".to_string()
            ),
        ]
    );

    for report in report.results.iter().filter_map(BatchEntry::report) {
        assert_eq!(report.predictions.len(), 7);
        assert!(matches!(report.source, PathSource::Model { .. }));
    }

    let health = service.health();
    assert_eq!(health.service.forecasts_served, 22);
    assert_eq!(health.service.failed_forecasts, 2);
    assert_eq!(health.fitted_scalers, 22);
}

#[test]
fn horizon_outside_limits_is_rejected_before_any_work() {
    ensure_test_env();
    let service = service_with(market_records(), ready_model());

    for days in [0, 31] {
        let err = service
            .generate_forecast("Beras", "Region 1", days)
            .unwrap_err();
        assert!(
            matches!(err, ForecastError::InvalidRequest { field: "days_ahead", .. }),
            "days={days}: {err}"
        );
        assert!(service.batch_forecast(days, BatchOptions::default()).is_err());
    }
    assert_eq!(service.scalers().len(), 0);
}

#[test]
fn unknown_entities_are_not_found() {
    ensure_test_env();
    let service = service_with(market_records(), ready_model());

    let err = service
        .generate_forecast("Kopi", "Region 1", 7)
        .unwrap_err();
    assert!(matches!(err, ForecastError::DataNotFound { .. }), "{err}");
    assert!(err.is_client_error());

    let err = service
        .generate_forecast("Beras", "Region 99", 7)
        .unwrap_err();
    assert_eq!(err.kind(), "data_not_found");
}

#[test]
fn every_horizon_yields_consecutive_dates_and_prices() {
    ensure_test_env();
    let service = service_with(
        linear_records("Beras", "Region 1", FULL_HISTORY_DAYS, 20_000.0, 10.0),
        ready_model(),
    );
    let base_date = start_date() + Duration::days(FULL_HISTORY_DAYS as i64 - 1);
    let current_price = 20_000.0 + 10.0 * (FULL_HISTORY_DAYS - 1) as f64;

    for days in 1..=30 {
        let report = service
            .generate_forecast("Beras", "Region 1", days)
            .expect("forecast");
        assert_eq!(report.days_ahead, days);
        assert_eq!(report.base_date, base_date);
        assert_eq!(report.current_price, current_price);
        assert_eq!(report.predictions.len(), days);
        assert_eq!(report.prediction_dates.len(), days);
        assert_eq!(report.price_changes.len(), days);
        for (step, (date, price)) in report
            .prediction_dates
            .iter()
            .zip(&report.predictions)
            .enumerate()
        {
            assert_eq!(*date, base_date + Duration::days(step as i64 + 1));
            let expected = current_price + 10.0 * (step + 1) as f64;
            assert!(
                (price - expected).abs() < 1e-6,
                "step {step}: {price} vs {expected}"
            );
        }
    }
}

#[test]
fn flat_history_forecasts_stable_low_risk() {
    ensure_test_env();
    let service = service_with(
        linear_records("Beras", "Region 1", FULL_HISTORY_DAYS, 45_000.0, 0.0),
        ready_model(),
    );

    let report = service
        .generate_forecast("Beras", "Region 1", 14)
        .expect("forecast");
    assert!(report
        .predictions
        .iter()
        .all(|price| (price - 45_000.0).abs() < 1e-6));
    assert_eq!(report.analysis.trend.direction, TrendDirection::Stable);
    assert_eq!(report.analysis.risk.level, RiskLevel::Low);
    assert_eq!(report.analysis.confidence.level, ConfidenceLevel::High);
    assert!(report.analysis.historical.is_some());
}

#[test]
fn rising_history_continues_upward() {
    ensure_test_env();
    let service = service_with(
        linear_records("Beras", "Region 1", FULL_HISTORY_DAYS, 10_000.0, 100.0),
        ready_model(),
    );

    let report = service
        .generate_forecast("Beras", "Region 1", 30)
        .expect("forecast");
    assert!(report.analysis.trend.total_change_pct > 5.0);
    assert_eq!(report.analysis.trend.direction, TrendDirection::Increasing);
    assert!(report.price_changes_pct.iter().all(|pct| *pct > 0.0));
}

#[test]
fn missing_model_falls_back_to_seeded_simulation() {
    ensure_test_env();
    let records = linear_records("Beras", "Region 1", FULL_HISTORY_DAYS, 30_000.0, 5.0);
    let first = service_with(records.clone(), unavailable_model());
    let second = service_with(records, unavailable_model());

    let a = first
        .generate_forecast("Beras", "Region 1", 10)
        .expect("simulated forecast");
    let b = second
        .generate_forecast("Beras", "Region 1", 10)
        .expect("simulated forecast");

    assert_eq!(
        a.source,
        PathSource::Simulated {
            reason: FallbackReason::ModelUnavailable
        }
    );
    assert_eq!(a.predictions.len(), 10);
    assert!(a
        .predictions
        .iter()
        .all(|price| price.is_finite() && *price > 0.0));
    assert_eq!(a.predictions, b.predictions);
    assert_eq!(first.health().service.simulated_forecasts, 1);
}

#[test]
fn unusable_features_fall_back_to_simulation() {
    ensure_test_env();
    // Finite prices whose squared deviations overflow the rolling std.
    let extreme: Vec<PriceRecord> =
        linear_records("Beras", "Region 1", FULL_HISTORY_DAYS, 1.0, 0.0)
            .into_iter()
            .enumerate()
            .map(|(idx, mut record)| {
                record.price = if idx % 2 == 0 { 1e200 } else { 3e200 };
                record
            })
            .collect();

    for model in [ready_model(), unavailable_model()] {
        let service = service_with(extreme.clone(), model);
        let report = service
            .generate_forecast("Beras", "Region 1", 5)
            .expect("numeric anomalies are never surfaced");
        assert_eq!(
            report.source,
            PathSource::Simulated {
                reason: FallbackReason::NumericAnomaly
            }
        );
        assert_eq!(report.predictions.len(), 5);
        assert!(report.predictions.iter().all(|price| price.is_finite()));
    }
}

#[test]
fn non_finite_weather_is_imputed_before_forecasting() {
    ensure_test_env();
    let mut records = linear_records("Beras", "Region 1", FULL_HISTORY_DAYS, 30_000.0, 5.0);
    records[12].weather[0] = Some(f64::NAN);
    records[40].rainfall = Some(f64::INFINITY);
    let service = service_with(records, ready_model());

    let report = service
        .generate_forecast("Beras", "Region 1", 5)
        .expect("forecast");
    assert_eq!(
        report.source,
        PathSource::Model {
            model_id: "trend-following".to_string()
        }
    );
}

#[test]
fn health_tracks_model_and_data() {
    ensure_test_env();
    let ready = service_with(market_records(), ready_model()).health();
    assert_eq!(ready.status, ServiceHealth::Ready);
    assert!(ready.model_loaded && ready.data_loaded);
    assert_eq!(ready.commodity_count, 3);
    assert_eq!(ready.region_count, 8);
    assert_eq!(ready.entity_count, 24);

    let degraded = service_with(market_records(), unavailable_model()).health();
    assert_eq!(degraded.status, ServiceHealth::Degraded);
    assert_eq!(degraded.model_error.as_deref(), Some("no artifact in test"));

    let empty = service_with(Vec::new(), ready_model()).health();
    assert_eq!(empty.status, ServiceHealth::Unavailable);
    assert_eq!(empty.total_records, 0);
}

#[test]
fn entities_do_not_influence_each_other() {
    ensure_test_env();
    let alone = service_with(
        linear_records("Beras", "Region 1", FULL_HISTORY_DAYS, 12_000.0, 10.0),
        ready_model(),
    );
    let crowded = service_with(market_records(), ready_model());

    let key = EntityKey::new("Beras", "Region 1");
    let builder = FeatureBuilder::new(SourceColumns::all());
    let alone_series = alone.store().series(&key).expect("series");
    let crowded_series = crowded.store().series(&key).expect("series");
    assert_eq!(
        builder.build(&alone_series),
        builder.build(&crowded_series)
    );

    crowded
        .batch_forecast(5, BatchOptions::default())
        .expect("batch");
    let a = alone.generate_forecast("Beras", "Region 1", 5).expect("forecast");
    let b = crowded
        .generate_forecast("Beras", "Region 1", 5)
        .expect("forecast");
    assert_eq!(a.predictions, b.predictions);
}

#[test]
fn supervised_pairs_cover_history_after_first_window() {
    ensure_test_env();
    let service = service_with(market_records(), ready_model());
    let pairs = service
        .supervised_pairs(&EntityKey::new("Beras", "Region 2"))
        .expect("pairs");
    assert_eq!(pairs.len(), FULL_HISTORY_DAYS - SEQUENCE_LENGTH);
    assert!(pairs.iter().all(|pair| pair.window.len() == SEQUENCE_LENGTH));
    assert!(pairs
        .iter()
        .all(|pair| (0.0..=1.0).contains(&pair.target)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_model_file_degrades_context() -> Result<()> {
    ensure_test_env();
    let dir = tempfile::tempdir()?;
    let model = load_model_with_timeout(
        dir.path().join("absent.json"),
        std::time::Duration::from_secs(2),
    )
    .await;
    assert!(!model.is_ready());

    let store = SeriesStore::from_records(market_records(), SourceColumns::all());
    let app = AppContext::from_components(store, model, test_settings())?;
    assert_eq!(app.service().health().status, ServiceHealth::Degraded);
    assert_eq!(app.service().status().snapshot().phase, "Ready");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_command_writes_report() -> Result<()> {
    ensure_test_env();
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("reports").join("batch.json");
    let store = SeriesStore::from_records(market_records(), SourceColumns::all());
    let app = AppContext::from_components(store, ready_model(), test_settings())?;

    batch::run(&app, 3, Some(&output)).await?;

    let report: Value = serde_json::from_str(&std::fs::read_to_string(&output)?)?;
    assert_eq!(report["daysAhead"], 3);
    assert_eq!(
        report["batchSummary"]["statistics"]["successfulPredictions"],
        22
    );
    assert_eq!(report["results"].as_array().map(Vec::len), Some(24));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn export_training_pairs_writes_flat_windows() -> Result<()> {
    ensure_test_env();
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("pairs.csv");
    let store = SeriesStore::from_records(market_records(), SourceColumns::all());
    let app = AppContext::from_components(store, ready_model(), test_settings())?;

    export_training_pairs::run(&app, "Beras", "Region 1", &output).await?;

    let mut reader = csv::Reader::from_path(&output)?;
    let headers = reader.headers()?.clone();
    assert_eq!(headers.len(), 2 + SEQUENCE_LENGTH * FEATURE_WIDTH);
    assert_eq!(&headers[0], "target_date");
    assert_eq!(&headers[2], "f0_harga");
    let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(rows.len(), FULL_HISTORY_DAYS - SEQUENCE_LENGTH);
    assert_eq!(
        &rows[0][0],
        (start_date() + Duration::days(SEQUENCE_LENGTH as i64)).to_string()
    );

    let short = export_training_pairs::run(&app, "Gula Pasir", "Region 8", &output).await;
    assert!(short.is_err());
    Ok(())
}
