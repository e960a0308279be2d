use crate::models::EntityKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("no price history for {commodity} in {region}")]
    DataNotFound { commodity: String, region: String },

    #[error(
        "insufficient history for {commodity} in {region}: {available} row(s), {required} required"
    )]
    InsufficientHistory {
        commodity: String,
        region: String,
        available: usize,
        required: usize,
    },

    #[error("invalid {field}: {message}")]
    InvalidRequest {
        field: &'static str,
        message: String,
    },

    #[error("no scaler fitted for {0}")]
    NotFitted(EntityKey),

    #[error("sequence model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("feature width mismatch: model expects {expected}, pipeline produces {actual}")]
    FeatureWidthMismatch { expected: usize, actual: usize },

    #[error("sequence length mismatch: model expects {expected}, pipeline produces {actual}")]
    SequenceLengthMismatch { expected: usize, actual: usize },

    #[error("numeric anomaly: {0}")]
    NumericAnomaly(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ForecastError {
    pub fn data_not_found(key: &EntityKey) -> Self {
        Self::DataNotFound {
            commodity: key.commodity.clone(),
            region: key.region.clone(),
        }
    }

    /// Stable snake_case code used in batch entries and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataNotFound { .. } => "data_not_found",
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::NotFitted(_) => "not_fitted",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::FeatureWidthMismatch { .. } => "feature_width_mismatch",
            Self::SequenceLengthMismatch { .. } => "sequence_length_mismatch",
            Self::NumericAnomaly(_) => "numeric_anomaly",
            Self::Dataset(_) => "dataset",
            Self::Io(_) => "io",
            Self::Csv(_) => "csv",
            Self::Json(_) => "json",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::DataNotFound { .. } | Self::InsufficientHistory { .. } | Self::InvalidRequest { .. }
        )
    }
}

pub type ForecastResult<T> = std::result::Result<T, ForecastError>;
