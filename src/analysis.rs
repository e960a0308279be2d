//! Pure functions deriving trend, risk and confidence metrics from a
//! prediction path. Percentages are rounded to two decimals.

use crate::indicators::{round2, safe_div};
use crate::models::{ConfidenceLevel, EntitySeries, Momentum, RiskLevel, TrendDirection};
use chrono::Datelike;
use serde::Serialize;
use statrs::statistics::Statistics;

const TREND_THRESHOLD_PCT: f64 = 5.0;
const HIGH_RISK_SCORE: f64 = 25.0;
const MEDIUM_RISK_SCORE: f64 = 12.0;
const EXTREME_MOVE_PCT: f64 = 15.0;
const HIGH_CONFIDENCE_SCORE: f64 = 0.75;
const MEDIUM_CONFIDENCE_SCORE: f64 = 0.5;
const MIN_COMPARISON_HISTORY: usize = 30;
const MIN_SEASONAL_HISTORY: usize = 365;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    pub momentum: Momentum,
    pub total_change: f64,
    pub total_change_pct: f64,
    pub volatility_pct: f64,
    pub highest_price: f64,
    pub lowest_price: f64,
    pub average_price: f64,
    pub price_range_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: f64,
    pub price_range_pct: f64,
    pub max_increase_pct: f64,
    pub max_decrease_pct: f64,
    pub volatility_score: f64,
    pub upside_risk: bool,
    pub downside_risk: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceAssessment {
    pub level: ConfidenceLevel,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalComparison {
    pub historical_mean: f64,
    pub historical_std: f64,
    pub historical_max: f64,
    pub historical_min: f64,
    pub seasonal_mean: f64,
    pub predicted_mean: f64,
    pub mean_difference_pct: f64,
    pub seasonal_difference_pct: f64,
    pub above_historical_range: bool,
    pub below_historical_range: bool,
    pub above_historical_max: bool,
    pub below_historical_min: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastAnalysis {
    pub trend: TrendAnalysis,
    pub risk: RiskAssessment,
    pub confidence: ConfidenceAssessment,
    pub historical: Option<HistoricalComparison>,
}

pub fn analyze(
    series: &EntitySeries,
    path: &[f64],
    current_price: f64,
    forecast_month: u32,
) -> ForecastAnalysis {
    ForecastAnalysis {
        trend: trend(path, current_price),
        risk: risk(path, current_price),
        confidence: confidence(path),
        historical: historical_comparison(series, path, forecast_month),
    }
}

fn pct_of(value: f64, base: f64) -> f64 {
    safe_div(value, base) * 100.0
}

fn extremes(path: &[f64]) -> (f64, f64) {
    let high = path.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let low = path.iter().copied().fold(f64::INFINITY, f64::min);
    (high, low)
}

/// Population coefficient of variation; 0 for paths shorter than two points.
fn coefficient_of_variation(path: &[f64]) -> f64 {
    if path.len() < 2 {
        return 0.0;
    }
    let mean = path.iter().mean();
    safe_div(path.iter().population_std_dev(), mean)
}

pub fn trend(path: &[f64], current_price: f64) -> TrendAnalysis {
    let Some(last) = path.last().copied() else {
        return TrendAnalysis {
            direction: TrendDirection::Stable,
            momentum: Momentum::Stable,
            total_change: 0.0,
            total_change_pct: 0.0,
            volatility_pct: 0.0,
            highest_price: current_price,
            lowest_price: current_price,
            average_price: current_price,
            price_range_pct: 0.0,
        };
    };

    let total_change = last - current_price;
    let total_change_pct = pct_of(total_change, current_price);
    let direction = if total_change_pct > TREND_THRESHOLD_PCT {
        TrendDirection::Increasing
    } else if total_change_pct < -TREND_THRESHOLD_PCT {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    let momentum = if path.len() >= 3 {
        let early = safe_div(path[2] - current_price, current_price);
        let late = safe_div(last - path[path.len() - 3], path[path.len() - 3]);
        if late.abs() > early.abs() {
            Momentum::Accelerating
        } else {
            Momentum::Decelerating
        }
    } else {
        Momentum::Stable
    };

    let (highest, lowest) = extremes(path);

    TrendAnalysis {
        direction,
        momentum,
        total_change,
        total_change_pct: round2(total_change_pct),
        volatility_pct: round2(coefficient_of_variation(path) * 100.0),
        highest_price: highest,
        lowest_price: lowest,
        average_price: path.iter().mean(),
        price_range_pct: round2(pct_of(highest - lowest, current_price)),
    }
}

pub fn risk(path: &[f64], current_price: f64) -> RiskAssessment {
    let Some(last) = path.last().copied() else {
        return RiskAssessment {
            level: RiskLevel::Low,
            score: 0.0,
            price_range_pct: 0.0,
            max_increase_pct: 0.0,
            max_decrease_pct: 0.0,
            volatility_score: 0.0,
            upside_risk: false,
            downside_risk: false,
        };
    };

    let (highest, lowest) = extremes(path);
    let price_range_pct = pct_of(highest - lowest, current_price);
    let volatility = coefficient_of_variation(path);
    let trend_magnitude = safe_div(last - current_price, current_price).abs();
    let score = price_range_pct * 0.4 + volatility * 100.0 * 0.3 + trend_magnitude * 100.0 * 0.3;

    let level = if score > HIGH_RISK_SCORE {
        RiskLevel::High
    } else if score > MEDIUM_RISK_SCORE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let max_increase_pct = pct_of(highest - current_price, current_price);
    let max_decrease_pct = pct_of(lowest - current_price, current_price);

    RiskAssessment {
        level,
        score: round2(score),
        price_range_pct: round2(price_range_pct),
        max_increase_pct: round2(max_increase_pct),
        max_decrease_pct: round2(max_decrease_pct),
        volatility_score: round2(volatility * 100.0),
        upside_risk: max_increase_pct > EXTREME_MOVE_PCT,
        downside_risk: max_decrease_pct < -EXTREME_MOVE_PCT,
    }
}

/// Share of day-to-day moves going the dominant way; 0.5 below three points.
fn direction_consistency(path: &[f64]) -> f64 {
    if path.len() < 3 {
        return 0.5;
    }
    let moves = path.len() - 1;
    let rising = path.windows(2).filter(|pair| pair[1] >= pair[0]).count();
    let falling = moves - rising;
    rising.max(falling) as f64 / moves as f64
}

pub fn confidence(path: &[f64]) -> ConfidenceAssessment {
    if path.len() < 2 {
        return ConfidenceAssessment {
            level: ConfidenceLevel::Medium,
            score: MEDIUM_CONFIDENCE_SCORE,
        };
    }

    let cv = coefficient_of_variation(path);
    let consistency = direction_consistency(path);
    let (highest, lowest) = extremes(path);
    let spread = safe_div(highest - lowest, path.iter().mean());

    let score =
        (1.0 - cv.min(0.3)) * 0.4 + consistency * 0.4 + (1.0 - spread.min(0.5)) * 0.2;
    let level = if score > HIGH_CONFIDENCE_SCORE {
        ConfidenceLevel::High
    } else if score > MEDIUM_CONFIDENCE_SCORE {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };

    ConfidenceAssessment {
        level,
        score: round2(score),
    }
}

/// Compares the path with the entity's own history. `None` when the history
/// is too short to say anything.
pub fn historical_comparison(
    series: &EntitySeries,
    path: &[f64],
    forecast_month: u32,
) -> Option<HistoricalComparison> {
    if series.len() < MIN_COMPARISON_HISTORY || path.is_empty() {
        return None;
    }

    let history = series.prices();
    let historical_mean = history.iter().mean();
    let historical_std = history.iter().std_dev();
    let (historical_max, historical_min) = extremes(&history);

    let seasonal: Vec<f64> = if series.len() >= MIN_SEASONAL_HISTORY {
        series
            .rows
            .iter()
            .filter(|row| row.date.month() == forecast_month)
            .map(|row| row.price)
            .collect()
    } else {
        Vec::new()
    };
    let seasonal_mean = if seasonal.is_empty() {
        historical_mean
    } else {
        seasonal.iter().mean()
    };

    let predicted_mean = path.iter().mean();
    let (predicted_max, predicted_min) = extremes(path);

    Some(HistoricalComparison {
        historical_mean,
        historical_std,
        historical_max,
        historical_min,
        seasonal_mean,
        predicted_mean,
        mean_difference_pct: round2(pct_of(predicted_mean - historical_mean, historical_mean)),
        seasonal_difference_pct: round2(pct_of(predicted_mean - seasonal_mean, seasonal_mean)),
        above_historical_range: predicted_max > historical_mean + 2.0 * historical_std,
        below_historical_range: predicted_min < historical_mean - 2.0 * historical_std,
        above_historical_max: predicted_max > historical_max,
        below_historical_min: predicted_min < historical_min,
    })
}
