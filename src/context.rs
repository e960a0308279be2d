use crate::config::ForecastSettings;
use crate::forecaster::ModelState;
use crate::lstm::{LstmNetwork, SequenceModel};
use crate::series_store::SeriesStore;
use crate::service::PredictionService;
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Process-wide wiring: settings, the loaded store and the prediction
/// service built on top of them.
#[derive(Clone)]
pub struct AppContext {
    settings: ForecastSettings,
    service: Arc<PredictionService>,
}

impl AppContext {
    /// Loads the dataset (required) and the model (optional). Without a model
    /// the service stays in degraded mode for its whole lifetime.
    pub async fn initialize(settings: ForecastSettings) -> Result<Self> {
        let dataset_path = settings.dataset_path.clone();
        let store = tokio::task::spawn_blocking(move || SeriesStore::from_csv_path(&dataset_path))
            .await
            .context("Dataset loading task panicked")?
            .with_context(|| {
                format!(
                    "Failed to load price dataset {}",
                    settings.dataset_path.display()
                )
            })?;

        let model = load_model_with_timeout(settings.model_path.clone(), settings.model_load_timeout).await;
        Self::from_components(store, model, settings)
    }

    pub fn from_components(
        store: SeriesStore,
        model: ModelState,
        settings: ForecastSettings,
    ) -> Result<Self> {
        if store.is_empty() {
            warn!("Price dataset is empty; every forecast request will fail");
        }
        let service = PredictionService::new(Arc::new(store), model, settings.clone())
            .context("Model artifact is incompatible with the feature pipeline")?;
        service.status().set_phase("Ready");
        Ok(Self {
            settings,
            service: Arc::new(service),
        })
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    pub fn service(&self) -> Arc<PredictionService> {
        self.service.clone()
    }
}

/// Loads the LSTM artifact on a blocking thread. Missing, corrupt or slow
/// artifacts yield [`ModelState::Unavailable`] instead of an error.
pub async fn load_model_with_timeout(path: PathBuf, timeout: Duration) -> ModelState {
    let display_path = path.display().to_string();
    let task = tokio::task::spawn_blocking(move || LstmNetwork::load_from_path(&path));

    let outcome = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(anyhow!("model loading task failed: {join_err}")),
        Err(_) => Err(anyhow!(
            "model loading timed out after {}s",
            timeout.as_secs_f64()
        )),
    };

    match outcome {
        Ok(network) => {
            let info = network.info();
            info!(
                "Loaded LSTM model {} from {} ({} feature(s), window {})",
                info.id, display_path, info.n_features, info.sequence_length
            );
            ModelState::Ready(Arc::new(network))
        }
        Err(err) => {
            warn!("LSTM model unavailable, forecasts will be simulated: {err:#}");
            ModelState::Unavailable {
                reason: format!("{err:#}"),
            }
        }
    }
}
