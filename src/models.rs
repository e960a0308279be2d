use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one price series: a commodity observed in a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub commodity: String,
    pub region: String,
}

impl EntityKey {
    pub fn new(commodity: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            commodity: commodity.into(),
            region: region.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.commodity, self.region)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherField {
    Temperature,
    Humidity,
    WindSpeed,
}

impl WeatherField {
    pub const ALL: [WeatherField; 3] = [
        WeatherField::Temperature,
        WeatherField::Humidity,
        WeatherField::WindSpeed,
    ];

    pub fn index(self) -> usize {
        match self {
            WeatherField::Temperature => 0,
            WeatherField::Humidity => 1,
            WeatherField::WindSpeed => 2,
        }
    }

    /// Column name in the source dataset.
    pub fn column(self) -> &'static str {
        match self {
            WeatherField::Temperature => "tavg_final",
            WeatherField::Humidity => "rh_avg_final",
            WeatherField::WindSpeed => "ff_avg_final",
        }
    }
}

/// One raw observation as read from the dataset, before cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub commodity: String,
    pub region: String,
    pub price: f64,
    pub weather: [Option<f64>; 3],
    pub rainfall: Option<f64>,
    pub ramadan: bool,
    pub idul_fitri: bool,
    pub christmas_new_year: bool,
    pub imputation_flag: Option<bool>,
}

impl PriceRecord {
    pub fn new(
        date: NaiveDate,
        commodity: impl Into<String>,
        region: impl Into<String>,
        price: f64,
    ) -> Self {
        Self {
            date,
            commodity: commodity.into(),
            region: region.into(),
            price,
            weather: [None; 3],
            rainfall: None,
            ramadan: false,
            idul_fitri: false,
            christmas_new_year: false,
            imputation_flag: None,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.commodity.clone(), self.region.clone())
    }
}

/// Cleaned daily row of an entity series. Weather values are always filled;
/// `weather_imputed` records which ones were missing in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub date: NaiveDate,
    pub price: f64,
    pub weather: [f64; 3],
    pub weather_imputed: [bool; 3],
    pub rainfall: Option<f64>,
    pub ramadan: bool,
    pub idul_fitri: bool,
    pub christmas_new_year: bool,
    pub imputation_flag: bool,
}

impl SeriesRow {
    pub fn weather_value(&self, field: WeatherField) -> f64 {
        self.weather[field.index()]
    }

    pub fn weather_was_imputed(&self, field: WeatherField) -> bool {
        self.weather_imputed[field.index()]
    }
}

/// Date-ordered history for one entity. Dates are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySeries {
    pub key: EntityKey,
    pub rows: Vec<SeriesRow>,
}

impl EntitySeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.price).collect()
    }

    pub fn current_price(&self) -> Option<f64> {
        self.rows.last().map(|row| row.price)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|row| row.date)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|row| row.date)
    }
}

/// Optional raw columns present in the loaded dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceColumns {
    pub weather: [bool; 3],
    pub rainfall: bool,
    pub ramadan: bool,
    pub idul_fitri: bool,
    pub christmas_new_year: bool,
    pub imputation_flag: bool,
}

impl SourceColumns {
    pub fn all() -> Self {
        Self {
            weather: [true; 3],
            rainfall: true,
            ramadan: true,
            idul_fitri: true,
            christmas_new_year: true,
            imputation_flag: true,
        }
    }

    pub fn has_weather(&self, field: WeatherField) -> bool {
        self.weather[field.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Momentum {
    Accelerating,
    Decelerating,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}
