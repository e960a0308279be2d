use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DATASET_PATH: &str = "DATASET_PATH";
pub const MODEL_PATH: &str = "MODEL_PATH";
pub const SEQUENCE_LENGTH: &str = "SEQUENCE_LENGTH";
pub const MAX_DAYS_AHEAD: &str = "MAX_DAYS_AHEAD";
pub const MODEL_LOAD_TIMEOUT_SECS: &str = "MODEL_LOAD_TIMEOUT_SECS";
pub const MOCK_DAILY_VOLATILITY: &str = "MOCK_DAILY_VOLATILITY";
pub const MOCK_SEED: &str = "MOCK_SEED";
pub const BATCH_WORKERS: &str = "BATCH_WORKERS";
pub const ALERT_THRESHOLD_PCT: &str = "ALERT_THRESHOLD_PCT";

const DEFAULT_DATASET_PATH: &str = "./data/dataset_final.csv";
const DEFAULT_MODEL_PATH: &str = "./data/models/pangan_ai_lstm_model.json";
const DEFAULT_SEQUENCE_LENGTH: usize = 30;
/// Hard ceiling on the forecast horizon.
pub const HORIZON_LIMIT: usize = 30;
const DEFAULT_MODEL_LOAD_TIMEOUT_SECS: usize = 10;
const DEFAULT_MOCK_DAILY_VOLATILITY: f64 = 0.03;
const DEFAULT_ALERT_THRESHOLD_PCT: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSettings {
    pub dataset_path: PathBuf,
    pub model_path: PathBuf,
    pub sequence_length: usize,
    pub max_days_ahead: usize,
    pub model_load_timeout: Duration,
    pub mock_daily_volatility: f64,
    pub mock_seed: Option<u64>,
    pub batch_workers: usize,
    pub alert_threshold_pct: f64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
            max_days_ahead: HORIZON_LIMIT,
            model_load_timeout: Duration::from_secs(DEFAULT_MODEL_LOAD_TIMEOUT_SECS as u64),
            mock_daily_volatility: DEFAULT_MOCK_DAILY_VOLATILITY,
            mock_seed: None,
            batch_workers: num_cpus::get().max(1),
            alert_threshold_pct: DEFAULT_ALERT_THRESHOLD_PCT,
        }
    }
}

impl ForecastSettings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self> {
        let settings: HashMap<String, String> = env::vars().collect();
        Self::from_settings_map(&settings)
    }

    /// Every key is optional; absent or blank keys keep their defaults.
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            dataset_path: optional_setting(settings, DATASET_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.dataset_path),
            model_path: optional_setting(settings, MODEL_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            sequence_length: setting_usize(
                settings,
                SEQUENCE_LENGTH,
                defaults.sequence_length,
                1,
                None,
            )?,
            max_days_ahead: setting_usize(
                settings,
                MAX_DAYS_AHEAD,
                defaults.max_days_ahead,
                1,
                Some(HORIZON_LIMIT),
            )?,
            model_load_timeout: Duration::from_secs(setting_usize(
                settings,
                MODEL_LOAD_TIMEOUT_SECS,
                DEFAULT_MODEL_LOAD_TIMEOUT_SECS,
                1,
                None,
            )? as u64),
            mock_daily_volatility: setting_f64(
                settings,
                MOCK_DAILY_VOLATILITY,
                defaults.mock_daily_volatility,
                Some(0.0),
                Some(0.5),
            )?,
            mock_seed: optional_setting(settings, MOCK_SEED)
                .map(|raw| {
                    raw.parse::<u64>().map_err(|_| {
                        anyhow!(
                            "Setting {} must be a non-negative integer (value: {})",
                            MOCK_SEED,
                            raw
                        )
                    })
                })
                .transpose()?,
            batch_workers: setting_usize(settings, BATCH_WORKERS, defaults.batch_workers, 1, None)?,
            alert_threshold_pct: setting_f64(
                settings,
                ALERT_THRESHOLD_PCT,
                defaults.alert_threshold_pct,
                Some(0.0),
                None,
            )?,
        })
    }
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    default: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<f64> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(value)
}

fn setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    default: usize,
    min: usize,
    max: Option<usize>,
) -> Result<usize> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<usize>()
        .map_err(|_| anyhow!("Setting {} must be an integer (value: {})", key, raw))?;
    if value < min {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(value)
}
