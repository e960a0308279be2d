use crate::errors::{ForecastError, ForecastResult};
use crate::feature_schema::FEATURE_WIDTH;
use crate::lstm::SequenceModel;
use crate::models::EntityKey;
use crate::scaler::ScalerRegistry;
use crate::windowing::SequenceWindow;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Base price for the simulated walk when the entity has no usable price.
pub const DEFAULT_SIMULATED_BASE_PRICE: f64 = 45_000.0;
/// Simulated prices never fall below this fraction of the base price.
const MIN_SIMULATED_FRACTION: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    ModelUnavailable,
    ScalerUnavailable,
    ModelRejectedInput,
    NumericAnomaly,
}

impl FallbackReason {
    fn from_error(err: &ForecastError) -> Self {
        match err {
            ForecastError::NotFitted(_) => FallbackReason::ScalerUnavailable,
            ForecastError::NumericAnomaly(_) => FallbackReason::NumericAnomaly,
            _ => FallbackReason::ModelRejectedInput,
        }
    }
}

/// Where a prediction path came from. Simulated paths are never presented as
/// model output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathSource {
    Model { model_id: String },
    Simulated { reason: FallbackReason },
}

impl PathSource {
    pub fn is_simulated(&self) -> bool {
        matches!(self, PathSource::Simulated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionPath {
    pub prices: Vec<f64>,
    pub source: PathSource,
}

/// Loaded model or the reason the service runs without one.
#[derive(Clone)]
pub enum ModelState {
    Ready(Arc<dyn SequenceModel>),
    Unavailable { reason: String },
}

impl ModelState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ModelState::Ready(_))
    }
}

/// Multi-step forecaster: autoregressive model rollout, or a simulated
/// random walk when the model path cannot produce a valid result.
///
/// With a seed, each entity's walk comes from its own generator seeded by the
/// seed and the entity key, so batches reproduce regardless of scheduling.
pub struct Forecaster {
    model: ModelState,
    daily_noise: Normal<f64>,
    seed: Option<u64>,
}

impl Forecaster {
    /// Fails when a ready model disagrees with the pipeline's feature width or
    /// window length. Such a model can never produce a valid forecast.
    pub fn new(
        model: ModelState,
        sequence_length: usize,
        daily_volatility: f64,
        seed: Option<u64>,
    ) -> ForecastResult<Self> {
        if let ModelState::Ready(network) = &model {
            if network.n_features() != FEATURE_WIDTH {
                return Err(ForecastError::FeatureWidthMismatch {
                    expected: network.n_features(),
                    actual: FEATURE_WIDTH,
                });
            }
            if network.sequence_length() != sequence_length {
                return Err(ForecastError::SequenceLengthMismatch {
                    expected: network.sequence_length(),
                    actual: sequence_length,
                });
            }
        }

        let daily_noise =
            Normal::new(0.0, daily_volatility).map_err(|err| ForecastError::InvalidRequest {
                field: "mock_daily_volatility",
                message: err.to_string(),
            })?;
        Ok(Self {
            model,
            daily_noise,
            seed,
        })
    }

    pub fn model_state(&self) -> &ModelState {
        &self.model
    }

    /// Always returns `steps` finite prices; failures on the model path are
    /// logged and answered with a simulated path.
    pub fn predict(
        &self,
        key: &EntityKey,
        window: &SequenceWindow,
        steps: usize,
        current_price: f64,
        scalers: &ScalerRegistry,
    ) -> PredictionPath {
        let model = match &self.model {
            ModelState::Ready(model) => model,
            ModelState::Unavailable { reason } => {
                debug!("Simulating {} step(s) for {}: {}", steps, key, reason);
                return self.simulate(key, steps, current_price, FallbackReason::ModelUnavailable);
            }
        };

        match self.rollout(model.as_ref(), key, window, steps, scalers) {
            Ok(prices) => PredictionPath {
                prices,
                source: PathSource::Model {
                    model_id: model.id().to_string(),
                },
            },
            Err(err) => {
                warn!(
                    "Model forecast for {} failed ({}); returning simulated path",
                    key, err
                );
                self.simulate(key, steps, current_price, FallbackReason::from_error(&err))
            }
        }
    }

    fn rollout(
        &self,
        model: &dyn SequenceModel,
        key: &EntityKey,
        window: &SequenceWindow,
        steps: usize,
        scalers: &ScalerRegistry,
    ) -> ForecastResult<Vec<f64>> {
        let mut window = window.clone();
        let mut scaled = Vec::with_capacity(steps);

        for step in 1..=steps {
            let next = model.predict_next(window.rows()).ok_or_else(|| {
                ForecastError::ModelUnavailable(format!(
                    "model {} rejected a window of {} row(s)",
                    model.id(),
                    window.len()
                ))
            })?;
            if !next.is_finite() {
                return Err(ForecastError::NumericAnomaly(format!(
                    "model output {} at step {}",
                    next, step
                )));
            }
            scaled.push(next);
            window.advance_with_price(next);
        }

        let prices = scalers.inverse_transform(key, &scaled)?;
        if let Some(step) = prices.iter().position(|price| !price.is_finite()) {
            return Err(ForecastError::NumericAnomaly(format!(
                "inverse-scaled price {} at step {}",
                prices[step],
                step + 1
            )));
        }

        Ok(prices)
    }

    fn request_rng(&self, key: &EntityKey) -> StdRng {
        match self.seed {
            Some(seed) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                StdRng::seed_from_u64(seed ^ hasher.finish())
            }
            None => StdRng::from_entropy(),
        }
    }

    /// Random walk of daily percentage moves starting from `current_price`.
    pub fn simulate(
        &self,
        key: &EntityKey,
        steps: usize,
        current_price: f64,
        reason: FallbackReason,
    ) -> PredictionPath {
        let base = if current_price.is_finite() && current_price > 0.0 {
            current_price
        } else {
            DEFAULT_SIMULATED_BASE_PRICE
        };
        let floor = base * MIN_SIMULATED_FRACTION;

        let mut rng = self.request_rng(key);
        let mut price = base;
        let mut prices = Vec::with_capacity(steps);
        for _ in 0..steps {
            let change = self.daily_noise.sample(&mut rng);
            price = (price * (1.0 + change)).max(floor);
            prices.push(price);
        }

        PredictionPath {
            prices,
            source: PathSource::Simulated { reason },
        }
    }
}
