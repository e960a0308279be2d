use crate::errors::{ForecastError, ForecastResult};
use crate::feature_schema::{FeatureVector, FEATURE_WIDTH, PRICE_INDEX};
use crate::models::EntityKey;
use dashmap::{mapref::entry::Entry, DashMap};
use log::debug;
use std::sync::Arc;

/// Per-column min-max scaler onto [0, 1].
///
/// Zero-range columns keep a unit range, so constant inputs scale to 0 and
/// invert back to the constant.
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxScaler {
    data_min: [f64; FEATURE_WIDTH],
    data_range: [f64; FEATURE_WIDTH],
}

impl MinMaxScaler {
    pub fn fit(rows: &[FeatureVector]) -> ForecastResult<Self> {
        if rows.is_empty() {
            return Err(ForecastError::Dataset(
                "cannot fit a scaler on zero rows".to_string(),
            ));
        }

        let mut data_min = [f64::INFINITY; FEATURE_WIDTH];
        let mut data_max = [f64::NEG_INFINITY; FEATURE_WIDTH];
        for row in rows {
            for (col, value) in row.values.iter().enumerate() {
                if !value.is_finite() {
                    return Err(ForecastError::NumericAnomaly(format!(
                        "non-finite value in feature column {} while fitting scaler",
                        col
                    )));
                }
                data_min[col] = data_min[col].min(*value);
                data_max[col] = data_max[col].max(*value);
            }
        }

        let mut data_range = [1.0; FEATURE_WIDTH];
        for col in 0..FEATURE_WIDTH {
            let range = data_max[col] - data_min[col];
            if range > 0.0 {
                data_range[col] = range;
            }
        }

        Ok(Self {
            data_min,
            data_range,
        })
    }

    pub fn transform_row(&self, row: &FeatureVector) -> FeatureVector {
        let mut scaled = *row;
        for col in 0..FEATURE_WIDTH {
            scaled.values[col] = (row.values[col] - self.data_min[col]) / self.data_range[col];
        }
        scaled
    }

    pub fn inverse_row(&self, row: &FeatureVector) -> FeatureVector {
        let mut restored = *row;
        for col in 0..FEATURE_WIDTH {
            restored.values[col] = row.values[col] * self.data_range[col] + self.data_min[col];
        }
        restored
    }

    pub fn transform(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }

    /// Inverts scaled prices by rebuilding full-width rows with every other
    /// column zeroed and reading the price column back.
    pub fn inverse_prices(&self, scaled_prices: &[f64]) -> Vec<f64> {
        scaled_prices
            .iter()
            .map(|price| {
                let mut dummy = FeatureVector {
                    values: [0.0; FEATURE_WIDTH],
                };
                dummy.values[PRICE_INDEX] = *price;
                self.inverse_row(&dummy).values[PRICE_INDEX]
            })
            .collect()
    }

    pub fn price_bounds(&self) -> (f64, f64) {
        let min = self.data_min[PRICE_INDEX];
        (min, min + self.data_range[PRICE_INDEX])
    }
}

/// Fit-once scalers keyed by entity.
///
/// The first caller for a key fits under the shard lock; everyone after that
/// gets the same read-only `Arc`.
#[derive(Default)]
pub struct ScalerRegistry {
    scalers: DashMap<EntityKey, Arc<MinMaxScaler>>,
}

impl ScalerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit_if_absent(
        &self,
        key: &EntityKey,
        all_rows: &[FeatureVector],
    ) -> ForecastResult<Arc<MinMaxScaler>> {
        if let Some(existing) = self.scalers.get(key) {
            return Ok(existing.clone());
        }

        match self.scalers.entry(key.clone()) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let scaler = Arc::new(MinMaxScaler::fit(all_rows)?);
                debug!(
                    "Fitted scaler for {} on {} row(s), price bounds {:?}",
                    key,
                    all_rows.len(),
                    scaler.price_bounds()
                );
                slot.insert(scaler.clone());
                Ok(scaler)
            }
        }
    }

    /// Fits on `rows` if the key has no scaler yet, then scales them.
    pub fn transform(
        &self,
        key: &EntityKey,
        rows: &[FeatureVector],
    ) -> ForecastResult<Vec<FeatureVector>> {
        let scaler = self.fit_if_absent(key, rows)?;
        Ok(scaler.transform(rows))
    }

    pub fn inverse_transform(
        &self,
        key: &EntityKey,
        scaled_prices: &[f64],
    ) -> ForecastResult<Vec<f64>> {
        let scaler = self
            .get(key)
            .ok_or_else(|| ForecastError::NotFitted(key.clone()))?;
        Ok(scaler.inverse_prices(scaled_prices))
    }

    pub fn get(&self, key: &EntityKey) -> Option<Arc<MinMaxScaler>> {
        self.scalers.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.scalers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scalers.is_empty()
    }
}
