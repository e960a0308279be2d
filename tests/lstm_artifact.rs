use anyhow::Result;
use chrono::{Duration, NaiveDate};
use pangan_engine::config::ForecastSettings;
use pangan_engine::context::{load_model_with_timeout, AppContext};
use pangan_engine::errors::ForecastError;
use pangan_engine::feature_schema::FEATURE_WIDTH;
use pangan_engine::forecaster::{FallbackReason, ModelState, PathSource};
use pangan_engine::lstm::{LstmNetwork, SequenceModel};
use pangan_engine::models::{PriceRecord, SourceColumns};
use pangan_engine::series_store::SeriesStore;
use pangan_engine::service::{PredictionService, ServiceHealth};
use serde_json::json;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration as StdDuration;

const SEQUENCE_LENGTH: usize = 30;

fn ensure_test_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// One LSTM unit reading only the price column, followed by an identity dense
/// head: the next scaled price is `tanh(tanh(last scaled price))`.
fn artifact_json(n_features: usize) -> String {
    let mut kernel = vec![vec![0.0; 4]; n_features];
    kernel[0] = vec![0.0, 0.0, 1.0, 0.0];
    json!({
        "name": "pangan-lstm-test",
        "sequence_length": SEQUENCE_LENGTH,
        "n_features": n_features,
        "layers": [
            {
                "type": "lstm",
                "units": 1,
                "kernel": kernel,
                "recurrent_kernel": [[0.0, 0.0, 0.0, 0.0]],
                "bias": [50.0, -50.0, 0.0, 50.0]
            },
            { "type": "dropout", "rate": 0.2 },
            { "type": "dense", "kernel": [[1.0]], "bias": [0.0] }
        ]
    })
    .to_string()
}

fn write_dataset(path: &Path, days: usize) -> Result<()> {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid start date");
    let mut csv = String::from(
        "tanggal,komoditas,wilayah,harga,tavg_final,rh_avg_final,ff_avg_final,rr,dum_ramadan,dum_idulfitri,dum_natal_newyr\n",
    );
    for region in ["Kota Bandung", "Kota Bogor"] {
        for idx in 0..days {
            let t = idx as f64;
            let price = 14_000.0 + 20.0 * t + (t / 6.0).sin() * 150.0;
            writeln!(
                csv,
                "{},Beras,{},{:.0},{:.1},{:.0},{:.1},{:.1},{},0,0",
                start + Duration::days(idx as i64),
                region,
                price,
                27.0 + (t / 5.0).cos(),
                78.0 + (t / 9.0).sin() * 5.0,
                2.0,
                ((t / 4.0).sin() * 8.0).max(0.0),
                u8::from((10..40).contains(&idx)),
            )?;
        }
    }
    fs::write(path, csv)?;
    Ok(())
}

fn settings_for(dir: &Path) -> ForecastSettings {
    ForecastSettings {
        dataset_path: dir.join("dataset_final.csv"),
        model_path: dir.join("model.json"),
        sequence_length: SEQUENCE_LENGTH,
        model_load_timeout: StdDuration::from_secs(5),
        batch_workers: 2,
        mock_seed: Some(11),
        ..ForecastSettings::default()
    }
}

#[test]
fn artifact_loads_from_disk() -> Result<()> {
    ensure_test_env();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("model.json");
    fs::write(&path, artifact_json(FEATURE_WIDTH))?;

    let network = LstmNetwork::load_from_path(&path)?;
    let info = network.info();
    assert_eq!(info.id, "pangan-lstm-test");
    assert_eq!(info.sequence_length, SEQUENCE_LENGTH);
    assert_eq!(info.n_features, FEATURE_WIDTH);
    assert_eq!(info.lstm_layers, Some(1));

    let missing = LstmNetwork::load_from_path(dir.path().join("absent.json"));
    assert!(missing.is_err());
    Ok(())
}

#[test]
fn mismatched_feature_width_is_fatal() -> Result<()> {
    ensure_test_env();
    let network = LstmNetwork::from_json(&artifact_json(FEATURE_WIDTH - 1))?;
    let store = SeriesStore::from_records(
        vec![PriceRecord::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
            "Beras",
            "Kota Bandung",
            13_000.0,
        )],
        SourceColumns::default(),
    );
    let settings = ForecastSettings {
        sequence_length: SEQUENCE_LENGTH,
        batch_workers: 1,
        ..ForecastSettings::default()
    };

    let err = PredictionService::new(
        Arc::new(store),
        ModelState::Ready(Arc::new(network)),
        settings,
    )
    .err()
    .expect("width mismatch must be rejected");
    assert!(
        matches!(
            err,
            ForecastError::FeatureWidthMismatch {
                expected: 27,
                actual: FEATURE_WIDTH
            }
        ),
        "{err}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn context_serves_model_forecasts_from_files() -> Result<()> {
    ensure_test_env();
    let dir = tempfile::tempdir()?;
    let settings = settings_for(dir.path());
    write_dataset(&settings.dataset_path, 90)?;
    fs::write(&settings.model_path, artifact_json(FEATURE_WIDTH))?;

    let app = AppContext::initialize(settings).await?;
    let service = app.service();
    let health = service.health();
    assert_eq!(health.status, ServiceHealth::Ready);
    assert_eq!(health.entity_count, 2);
    assert_eq!(
        health.model.as_ref().and_then(|model| model.parameter_count),
        Some(FEATURE_WIDTH * 4 + 4 + 4 + 2)
    );

    let report = service.generate_forecast("Beras", "Kota Bogor", 10)?;
    assert_eq!(
        report.source,
        PathSource::Model {
            model_id: "pangan-lstm-test".to_string()
        }
    );
    assert_eq!(report.predictions.len(), 10);
    assert!(report.predictions.iter().all(|price| price.is_finite()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn context_without_model_file_is_degraded() -> Result<()> {
    ensure_test_env();
    let dir = tempfile::tempdir()?;
    let settings = settings_for(dir.path());
    write_dataset(&settings.dataset_path, 45)?;

    let app = AppContext::initialize(settings).await?;
    let service = app.service();
    assert_eq!(service.health().status, ServiceHealth::Degraded);

    let report = service.generate_forecast("Beras", "Kota Bandung", 5)?;
    assert!(report.source.is_simulated());
    assert_eq!(report.predictions.len(), 5);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn corrupt_model_file_degrades_context() -> Result<()> {
    ensure_test_env();
    let dir = tempfile::tempdir()?;
    let settings = settings_for(dir.path());
    write_dataset(&settings.dataset_path, 45)?;
    fs::write(&settings.model_path, "{not json")?;

    let app = AppContext::initialize(settings).await?;
    let service = app.service();
    let health = service.health();
    assert_eq!(health.status, ServiceHealth::Degraded);
    assert!(health.model.is_none());

    let report = service.generate_forecast("Beras", "Kota Bogor", 3)?;
    assert_eq!(
        report.source,
        PathSource::Simulated {
            reason: FallbackReason::ModelUnavailable
        }
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_model_load_times_out_as_unavailable() -> Result<()> {
    ensure_test_env();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("model.json");
    fs::write(&path, artifact_json(FEATURE_WIDTH))?;

    let model = load_model_with_timeout(path.clone(), StdDuration::ZERO).await;
    assert!(!model.is_ready());
    match model {
        ModelState::Unavailable { reason } => assert!(reason.contains("timed out"), "{reason}"),
        ModelState::Ready(_) => panic!("model loaded despite a zero timeout"),
    }

    let model = load_model_with_timeout(path, StdDuration::from_secs(5)).await;
    assert!(model.is_ready());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn context_rejects_incompatible_model_and_missing_dataset() -> Result<()> {
    ensure_test_env();
    let dir = tempfile::tempdir()?;
    let settings = settings_for(dir.path());

    assert!(AppContext::initialize(settings.clone()).await.is_err());

    write_dataset(&settings.dataset_path, 45)?;
    fs::write(&settings.model_path, artifact_json(FEATURE_WIDTH - 1))?;
    assert!(AppContext::initialize(settings).await.is_err());
    Ok(())
}
