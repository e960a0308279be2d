//! Fixed feature layout consumed by the sequence model.
//!
//! Construction, scaling and inverse reconstruction all index through
//! [`Feature`], so the column order cannot drift between stages. The price
//! column must stay first.

use serde::{Serialize, Serializer};
use std::ops::{Index, IndexMut};

pub const FEATURE_WIDTH: usize = 28;
pub const PRICE_INDEX: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Price,
    Temperature,
    Humidity,
    WindSpeed,
    MonthSin,
    MonthCos,
    DaySin,
    DayCos,
    IsWeekend,
    Ramadan,
    IdulFitri,
    ChristmasNewYear,
    TemperatureFlag,
    HumidityFlag,
    WindSpeedFlag,
    ImputationFlag,
    PriceLag1,
    PriceLag3,
    PriceLag7,
    PriceLag14,
    RollingMean7,
    RollingStd7,
    RollingMean14,
    RollingStd14,
    RollingMean30,
    RollingStd30,
    Change1d,
    Change7d,
}

impl Feature {
    /// Schema order. Position in this array is the column index.
    pub const ALL: [Feature; FEATURE_WIDTH] = [
        Feature::Price,
        Feature::Temperature,
        Feature::Humidity,
        Feature::WindSpeed,
        Feature::MonthSin,
        Feature::MonthCos,
        Feature::DaySin,
        Feature::DayCos,
        Feature::IsWeekend,
        Feature::Ramadan,
        Feature::IdulFitri,
        Feature::ChristmasNewYear,
        Feature::TemperatureFlag,
        Feature::HumidityFlag,
        Feature::WindSpeedFlag,
        Feature::ImputationFlag,
        Feature::PriceLag1,
        Feature::PriceLag3,
        Feature::PriceLag7,
        Feature::PriceLag14,
        Feature::RollingMean7,
        Feature::RollingStd7,
        Feature::RollingMean14,
        Feature::RollingStd14,
        Feature::RollingMean30,
        Feature::RollingStd30,
        Feature::Change1d,
        Feature::Change7d,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Feature::Price => "harga",
            Feature::Temperature => "tavg_final",
            Feature::Humidity => "rh_avg_final",
            Feature::WindSpeed => "ff_avg_final",
            Feature::MonthSin => "month_sin",
            Feature::MonthCos => "month_cos",
            Feature::DaySin => "day_sin",
            Feature::DayCos => "day_cos",
            Feature::IsWeekend => "is_weekend",
            Feature::Ramadan => "dum_ramadan",
            Feature::IdulFitri => "dum_idulfitri",
            Feature::ChristmasNewYear => "dum_natal_newyr",
            Feature::TemperatureFlag => "tavg_flag",
            Feature::HumidityFlag => "rh_avg_flag",
            Feature::WindSpeedFlag => "ff_avg_flag",
            Feature::ImputationFlag => "imputasi_flag",
            Feature::PriceLag1 => "harga_lag_1",
            Feature::PriceLag3 => "harga_lag_3",
            Feature::PriceLag7 => "harga_lag_7",
            Feature::PriceLag14 => "harga_lag_14",
            Feature::RollingMean7 => "harga_rolling_mean_7",
            Feature::RollingStd7 => "harga_rolling_std_7",
            Feature::RollingMean14 => "harga_rolling_mean_14",
            Feature::RollingStd14 => "harga_rolling_std_14",
            Feature::RollingMean30 => "harga_rolling_mean_30",
            Feature::RollingStd30 => "harga_rolling_std_30",
            Feature::Change1d => "harga_change_1d",
            Feature::Change7d => "harga_change_7d",
        }
    }

    /// Value used when the raw input behind this column is absent.
    pub fn default_value(self) -> f64 {
        0.0
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.iter().copied().find(|feature| feature.name() == name)
    }
}

pub fn feature_names() -> [&'static str; FEATURE_WIDTH] {
    Feature::ALL.map(Feature::name)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub values: [f64; FEATURE_WIDTH],
}

impl FeatureVector {
    pub fn defaults() -> Self {
        Self {
            values: Feature::ALL.map(Feature::default_value),
        }
    }

    pub fn price(&self) -> f64 {
        self.values[PRICE_INDEX]
    }

    /// Copy of this row with only the price column replaced.
    pub fn with_price(&self, price: f64) -> Self {
        let mut next = *self;
        next.values[PRICE_INDEX] = price;
        next
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|value| value.is_finite())
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Index<Feature> for FeatureVector {
    type Output = f64;

    fn index(&self, feature: Feature) -> &f64 {
        &self.values[feature.index()]
    }
}

impl IndexMut<Feature> for FeatureVector {
    fn index_mut(&mut self, feature: Feature) -> &mut f64 {
        &mut self.values[feature.index()]
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.as_slice().serialize(serializer)
    }
}
