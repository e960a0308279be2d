use crate::errors::{ForecastError, ForecastResult};
use crate::feature_schema::FeatureVector;
use crate::models::EntityKey;

/// Trailing window of scaled feature rows, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceWindow {
    rows: Vec<FeatureVector>,
}

impl SequenceWindow {
    pub fn new(rows: Vec<FeatureVector>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[FeatureVector] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&FeatureVector> {
        self.rows.last()
    }

    /// Drops the oldest row and appends a copy of the newest row carrying
    /// `price` in the price column.
    pub fn advance_with_price(&mut self, price: f64) {
        let Some(last) = self.rows.last().copied() else {
            return;
        };
        self.rows.remove(0);
        self.rows.push(last.with_price(price));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisedPair {
    pub window: SequenceWindow,
    pub target: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SequenceWindower {
    length: usize,
}

impl SequenceWindower {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn latest_window(
        &self,
        key: &EntityKey,
        scaled: &[FeatureVector],
    ) -> ForecastResult<SequenceWindow> {
        if scaled.len() < self.length {
            return Err(ForecastError::InsufficientHistory {
                commodity: key.commodity.clone(),
                region: key.region.clone(),
                available: scaled.len(),
                required: self.length,
            });
        }
        Ok(SequenceWindow::new(
            scaled[scaled.len() - self.length..].to_vec(),
        ))
    }

    /// `(rows[i - len..i], price of row i)` for every `i` in `len..n`.
    pub fn supervised_pairs(&self, scaled: &[FeatureVector]) -> Vec<SupervisedPair> {
        (self.length..scaled.len())
            .map(|idx| SupervisedPair {
                window: SequenceWindow::new(scaled[idx - self.length..idx].to_vec()),
                target: scaled[idx].price(),
            })
            .collect()
    }
}
