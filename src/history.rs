//! Descriptive analytics over loaded history: per-entity statistics,
//! week-over-week price alerts and a dataset quality report.

use crate::indicators::{mean, pearson_correlation, round2, safe_div, sample_std};
use crate::models::{EntitySeries, SeriesRow, TrendDirection, WeatherField};
use crate::series_store::{IngestionReport, SeriesStore};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

const ALERT_WINDOW: usize = 7;
const CRITICAL_ALERT_PCT: f64 = 30.0;
const GAP_THRESHOLD_DAYS: i64 = 7;
const MAX_REPORTED_GAPS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSummary {
    pub days: usize,
    pub average: f64,
    pub change_pct: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEffect {
    pub event_average: f64,
    pub normal_average: f64,
    pub effect_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherCorrelations {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub rainfall: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatistics {
    pub commodity: String,
    pub region: String,
    pub record_count: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub current_price: f64,
    pub average_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub volatility_pct: f64,
    pub last_7_days: WindowSummary,
    pub last_30_days: WindowSummary,
    pub monthly_averages: BTreeMap<u32, f64>,
    pub ramadan_effect: Option<EventEffect>,
    pub idul_fitri_effect: Option<EventEffect>,
    pub weather_correlations: WeatherCorrelations,
}

/// Summary statistics for one entity; `None` for an empty series.
pub fn entity_statistics(series: &EntitySeries) -> Option<EntityStatistics> {
    let first = series.rows.first()?;
    let last = series.rows.last()?;
    let prices = series.prices();
    let average_price = mean(&prices)?;
    let min_price = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max_price = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let volatility = sample_std(&prices).unwrap_or(0.0);

    let mut by_month: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for row in &series.rows {
        by_month.entry(row.date.month()).or_default().push(row.price);
    }
    let monthly_averages = by_month
        .into_iter()
        .filter_map(|(month, values)| mean(&values).map(|avg| (month, round2(avg))))
        .collect();

    Some(EntityStatistics {
        commodity: series.key.commodity.clone(),
        region: series.key.region.clone(),
        record_count: series.len(),
        first_date: first.date,
        last_date: last.date,
        current_price: last.price,
        average_price: round2(average_price),
        min_price,
        max_price,
        volatility_pct: round2(safe_div(volatility, average_price) * 100.0),
        last_7_days: window_summary(&prices, 7),
        last_30_days: window_summary(&prices, 30),
        monthly_averages,
        ramadan_effect: event_effect(series, |row| row.ramadan),
        idul_fitri_effect: event_effect(series, |row| row.idul_fitri),
        weather_correlations: weather_correlations(series),
    })
}

fn window_summary(prices: &[f64], days: usize) -> WindowSummary {
    let start = prices.len().saturating_sub(days);
    let window = &prices[start..];
    let change_pct = match (window.first(), window.last()) {
        (Some(first), Some(last)) => safe_div(last - first, *first) * 100.0,
        _ => 0.0,
    };
    WindowSummary {
        days: window.len(),
        average: round2(mean(window).unwrap_or(0.0)),
        change_pct: round2(change_pct),
        std: round2(sample_std(window).unwrap_or(0.0)),
    }
}

fn event_effect<F>(series: &EntitySeries, in_event: F) -> Option<EventEffect>
where
    F: Fn(&SeriesRow) -> bool,
{
    let (event, normal): (Vec<_>, Vec<_>) = series.rows.iter().partition(|row| in_event(*row));
    let event_average = mean(&event.iter().map(|row| row.price).collect::<Vec<_>>())?;
    let normal_average = mean(&normal.iter().map(|row| row.price).collect::<Vec<_>>())?;
    Some(EventEffect {
        event_average: round2(event_average),
        normal_average: round2(normal_average),
        effect_pct: round2(safe_div(event_average - normal_average, normal_average) * 100.0),
    })
}

/// Correlates observed (not imputed) weather readings with price.
fn weather_correlations(series: &EntitySeries) -> WeatherCorrelations {
    let observed = |field: WeatherField| {
        let (weather, prices): (Vec<f64>, Vec<f64>) = series
            .rows
            .iter()
            .filter(|row| !row.weather_was_imputed(field))
            .map(|row| (row.weather_value(field), row.price))
            .unzip();
        pearson_correlation(&weather, &prices).map(round2)
    };
    let (rainfall, rain_prices): (Vec<f64>, Vec<f64>) = series
        .rows
        .iter()
        .filter_map(|row| row.rainfall.map(|rain| (rain, row.price)))
        .unzip();

    WeatherCorrelations {
        temperature: observed(WeatherField::Temperature),
        humidity: observed(WeatherField::Humidity),
        wind_speed: observed(WeatherField::WindSpeed),
        rainfall: pearson_correlation(&rainfall, &rain_prices).map(round2),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlert {
    pub commodity: String,
    pub region: String,
    pub severity: AlertSeverity,
    pub direction: TrendDirection,
    pub recent_average: f64,
    pub previous_average: f64,
    pub change_pct: f64,
    pub as_of: NaiveDate,
}

/// Entities whose last-week average moved at least `threshold_pct` against
/// the week before. Critical alerts first, then by magnitude.
pub fn price_alerts(store: &SeriesStore, threshold_pct: f64) -> Vec<PriceAlert> {
    let mut alerts: Vec<PriceAlert> = store
        .all_series()
        .filter_map(|series| week_over_week_alert(series, threshold_pct))
        .collect();

    alerts.sort_by(|a, b| {
        b.severity.cmp(&a.severity).then_with(|| {
            b.change_pct
                .abs()
                .partial_cmp(&a.change_pct.abs())
                .unwrap_or(Ordering::Equal)
        })
    });
    alerts
}

fn week_over_week_alert(series: &EntitySeries, threshold_pct: f64) -> Option<PriceAlert> {
    if series.len() < ALERT_WINDOW * 2 {
        return None;
    }
    let prices = series.prices();
    let n = prices.len();
    let recent_average = mean(&prices[n - ALERT_WINDOW..])?;
    let previous_average = mean(&prices[n - 2 * ALERT_WINDOW..n - ALERT_WINDOW])?;
    let change_pct = safe_div(recent_average - previous_average, previous_average) * 100.0;
    if change_pct.abs() < threshold_pct {
        return None;
    }

    Some(PriceAlert {
        commodity: series.key.commodity.clone(),
        region: series.key.region.clone(),
        severity: if change_pct.abs() >= CRITICAL_ALERT_PCT {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        },
        direction: if change_pct > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        },
        recent_average: round2(recent_average),
        previous_average: round2(previous_average),
        change_pct: round2(change_pct),
        as_of: series.last_date()?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataGap {
    pub commodity: String,
    pub region: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub gap_days: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingWeather {
    pub temperature: usize,
    pub humidity: usize,
    pub wind_speed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQualityReport {
    pub total_records: usize,
    pub entity_count: usize,
    pub commodity_count: usize,
    pub region_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub coverage_days: i64,
    pub missing_weather: MissingWeather,
    pub ingestion: IngestionReport,
    pub gaps: Vec<DataGap>,
}

pub fn quality_report(store: &SeriesStore) -> DataQualityReport {
    let first_date = store.all_series().filter_map(|series| series.first_date()).min();
    let last_date = store.all_series().filter_map(|series| series.last_date()).max();
    let coverage_days = match (first_date, last_date) {
        (Some(first), Some(last)) => (last - first).num_days() + 1,
        _ => 0,
    };

    let mut gaps: Vec<DataGap> = store
        .all_series()
        .flat_map(|series| {
            series.rows.windows(2).filter_map(move |pair| {
                let gap_days = (pair[1].date - pair[0].date).num_days();
                (gap_days > GAP_THRESHOLD_DAYS).then(|| DataGap {
                    commodity: series.key.commodity.clone(),
                    region: series.key.region.clone(),
                    from: pair[0].date,
                    to: pair[1].date,
                    gap_days,
                })
            })
        })
        .collect();
    gaps.sort_by(|a, b| b.gap_days.cmp(&a.gap_days).then_with(|| a.from.cmp(&b.from)));
    gaps.truncate(MAX_REPORTED_GAPS);

    let ingestion = store.ingestion_report().clone();
    let missing_weather = MissingWeather {
        temperature: ingestion.missing_weather[WeatherField::Temperature.index()],
        humidity: ingestion.missing_weather[WeatherField::Humidity.index()],
        wind_speed: ingestion.missing_weather[WeatherField::WindSpeed.index()],
    };

    DataQualityReport {
        total_records: store.total_rows(),
        entity_count: store.entity_count(),
        commodity_count: store.commodities().len(),
        region_count: store.regions().len(),
        first_date,
        last_date,
        coverage_days,
        missing_weather,
        ingestion,
        gaps,
    }
}
