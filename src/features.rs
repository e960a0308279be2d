use crate::feature_schema::{Feature, FeatureVector};
use crate::indicators::{lagged, pct_change, rolling_mean, rolling_std};
use crate::models::{EntitySeries, SeriesRow, SourceColumns, WeatherField};
use chrono::Datelike;
use dashmap::DashSet;
use log::warn;
use std::f64::consts::PI;

const PRICE_LAGS: [(usize, Feature); 4] = [
    (1, Feature::PriceLag1),
    (3, Feature::PriceLag3),
    (7, Feature::PriceLag7),
    (14, Feature::PriceLag14),
];

const ROLLING_WINDOWS: [(usize, Feature, Feature); 3] = [
    (7, Feature::RollingMean7, Feature::RollingStd7),
    (14, Feature::RollingMean14, Feature::RollingStd14),
    (30, Feature::RollingMean30, Feature::RollingStd30),
];

const PRICE_CHANGES: [(usize, Feature); 2] = [(1, Feature::Change1d), (7, Feature::Change7d)];

/// Turns one entity's cleaned history into model-ready feature rows.
///
/// Every derived column is computed inside the series it is given, so values
/// never leak across entity boundaries. Raw columns missing from the source
/// dataset produce the schema default and a single warning per column.
pub struct FeatureBuilder {
    source_columns: SourceColumns,
    missing_logged: DashSet<&'static str>,
}

impl FeatureBuilder {
    pub fn new(source_columns: SourceColumns) -> Self {
        Self {
            source_columns,
            missing_logged: DashSet::new(),
        }
    }

    pub fn source_columns(&self) -> SourceColumns {
        self.source_columns
    }

    pub fn build(&self, series: &EntitySeries) -> Vec<FeatureVector> {
        if series.is_empty() {
            return Vec::new();
        }

        self.warn_missing_columns();

        let prices = series.prices();
        let lags: Vec<(Feature, Vec<f64>)> = PRICE_LAGS
            .iter()
            .map(|(lag, feature)| (*feature, lagged(&prices, *lag)))
            .collect();
        let rolling: Vec<(Feature, Vec<f64>, Feature, Vec<f64>)> = ROLLING_WINDOWS
            .iter()
            .map(|(window, mean_feature, std_feature)| {
                (
                    *mean_feature,
                    rolling_mean(&prices, *window),
                    *std_feature,
                    rolling_std(&prices, *window),
                )
            })
            .collect();
        let changes: Vec<(Feature, Vec<f64>)> = PRICE_CHANGES
            .iter()
            .map(|(periods, feature)| (*feature, pct_change(&prices, *periods)))
            .collect();

        series
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let mut features = self.row_features(row);
                for (feature, values) in &lags {
                    features[*feature] = values[idx];
                }
                for (mean_feature, means, std_feature, stds) in &rolling {
                    features[*mean_feature] = means[idx];
                    features[*std_feature] = stds[idx];
                }
                for (feature, values) in &changes {
                    features[*feature] = values[idx];
                }
                features
            })
            .collect()
    }

    /// Columns that depend only on the row itself.
    fn row_features(&self, row: &SeriesRow) -> FeatureVector {
        let mut features = FeatureVector::defaults();
        features[Feature::Price] = row.price;

        for field in WeatherField::ALL {
            if !self.source_columns.has_weather(field) {
                continue;
            }
            let (value_feature, flag_feature) = weather_features(field);
            features[value_feature] = row.weather_value(field);
            features[flag_feature] = flag(row.weather_was_imputed(field));
        }

        let month = row.date.month() as f64;
        let day_of_year = row.date.ordinal() as f64;
        features[Feature::MonthSin] = (2.0 * PI * month / 12.0).sin();
        features[Feature::MonthCos] = (2.0 * PI * month / 12.0).cos();
        features[Feature::DaySin] = (2.0 * PI * day_of_year / 365.0).sin();
        features[Feature::DayCos] = (2.0 * PI * day_of_year / 365.0).cos();
        features[Feature::IsWeekend] = flag(row.date.weekday().num_days_from_monday() >= 5);

        features[Feature::Ramadan] = flag(row.ramadan);
        features[Feature::IdulFitri] = flag(row.idul_fitri);
        features[Feature::ChristmasNewYear] = flag(row.christmas_new_year);
        features[Feature::ImputationFlag] = flag(row.imputation_flag);

        features
    }

    fn warn_missing_columns(&self) {
        for field in WeatherField::ALL {
            if !self.source_columns.has_weather(field) {
                self.warn_once(field.column());
            }
        }
        let seasonal = [
            (self.source_columns.ramadan, Feature::Ramadan),
            (self.source_columns.idul_fitri, Feature::IdulFitri),
            (self.source_columns.christmas_new_year, Feature::ChristmasNewYear),
        ];
        for (present, feature) in seasonal {
            if !present {
                self.warn_once(feature.name());
            }
        }
    }

    fn warn_once(&self, column: &'static str) {
        if self.missing_logged.insert(column) {
            warn!(
                "Source column {} is absent; feature defaults to 0 for every entity",
                column
            );
        }
    }
}

fn weather_features(field: WeatherField) -> (Feature, Feature) {
    match field {
        WeatherField::Temperature => (Feature::Temperature, Feature::TemperatureFlag),
        WeatherField::Humidity => (Feature::Humidity, Feature::HumidityFlag),
        WeatherField::WindSpeed => (Feature::WindSpeed, Feature::WindSpeedFlag),
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}
