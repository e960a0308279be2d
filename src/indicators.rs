use statrs::statistics::Statistics;

const EPSILON: f64 = 1e-12;

pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() <= EPSILON {
        0.0
    } else {
        numerator / denominator
    }
}

/// Trailing window ending at `end_idx`, shortened at the start of the series.
fn trailing_slice(data: &[f64], end_idx: usize, window: usize) -> &[f64] {
    let start = (end_idx + 1).saturating_sub(window.max(1));
    &data[start..=end_idx]
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().mean())
}

/// Sample standard deviation (n - 1 denominator). `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    Some(values.iter().std_dev())
}

/// Price `lag` rows back; rows without enough history use their own price.
pub fn lagged(prices: &[f64], lag: usize) -> Vec<f64> {
    prices
        .iter()
        .enumerate()
        .map(|(idx, price)| if idx >= lag { prices[idx - lag] } else { *price })
        .collect()
}

/// Trailing mean with a minimum of one observation.
pub fn rolling_mean(prices: &[f64], window: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }

    let window = window.max(1);
    let mut values = Vec::with_capacity(prices.len());
    let mut window_sum = 0.0;
    for i in 0..prices.len() {
        window_sum += prices[i];
        if i >= window {
            window_sum -= prices[i - window];
        }
        let count = (i + 1).min(window);
        values.push(window_sum / count as f64);
    }

    values
}

/// Trailing sample standard deviation; 0 where fewer than two observations exist.
pub fn rolling_std(prices: &[f64], window: usize) -> Vec<f64> {
    (0..prices.len())
        .map(|idx| sample_std(trailing_slice(prices, idx, window)).unwrap_or(0.0))
        .collect()
}

/// Fractional change over `periods` rows; 0 where unavailable.
pub fn pct_change(prices: &[f64], periods: usize) -> Vec<f64> {
    prices
        .iter()
        .enumerate()
        .map(|(idx, price)| {
            if periods == 0 || idx < periods {
                return 0.0;
            }
            let previous = prices[idx - periods];
            let change = safe_div(price - previous, previous);
            if change.is_finite() {
                change
            } else {
                0.0
            }
        })
        .collect()
}

/// Pearson correlation over paired finite values.
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() {
        return None;
    }

    let paired: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .collect();
    if paired.len() < 2 {
        return None;
    }

    let mean_x = paired.iter().map(|(a, _)| *a).sum::<f64>() / paired.len() as f64;
    let mean_y = paired.iter().map(|(_, b)| *b).sum::<f64>() / paired.len() as f64;

    let mut numerator = 0.0;
    let mut denom_x = 0.0;
    let mut denom_y = 0.0;
    for (a, b) in paired {
        let dx = a - mean_x;
        let dy = b - mean_y;
        numerator += dx * dy;
        denom_x += dx * dx;
        denom_y += dy * dy;
    }

    let denom = (denom_x * denom_y).sqrt();
    if denom <= EPSILON {
        None
    } else {
        Some(numerator / denom)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
