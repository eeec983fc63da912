use thiserror::Error;

use crate::data::model::Market;

// ---------------------------------------------------------------------------
// Row-level rejections (cleaning)
// ---------------------------------------------------------------------------

/// Why a raw row was dropped during cleaning.
///
/// These never abort a load: the cleaner collects them into a
/// [`CleaningReport`](crate::data::clean::CleaningReport).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing year")]
    MissingYear,

    #[error("year '{0}' is not an integer")]
    MalformedYear(String),

    #[error("year {year} outside valid range {min}..={max}")]
    OutOfRangeYear { year: i32, min: i32, max: i32 },

    #[error("missing fuel type")]
    MissingFuelType,

    #[error("unrecognized fuel type '{0}'")]
    UnknownFuelType(String),

    #[error("field '{field}' has malformed value '{raw}'")]
    MalformedNumber { field: &'static str, raw: String },

    #[error("no core metric present")]
    MissingCoreMetrics,

    #[error("performance model excluded from the mainstream market")]
    PerformanceModel,

    #[error("duplicate make/model/year")]
    Duplicate,
}

impl ValidationError {
    /// Stable short name used to bucket rejections in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MissingYear => "MissingYear",
            ValidationError::MalformedYear(_) => "MalformedYear",
            ValidationError::OutOfRangeYear { .. } => "OutOfRangeYear",
            ValidationError::MissingFuelType => "MissingFuelType",
            ValidationError::UnknownFuelType(_) => "UnknownFuelType",
            ValidationError::MalformedNumber { .. } => "MalformedNumber",
            ValidationError::MissingCoreMetrics => "MissingCoreMetrics",
            ValidationError::PerformanceModel => "PerformanceModel",
            ValidationError::Duplicate => "Duplicate",
        }
    }
}

// ---------------------------------------------------------------------------
// Query-time errors
// ---------------------------------------------------------------------------

/// Errors returned by filter, aggregate, index and segmentation queries.
///
/// Callers render these as an explicit empty/error state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("invalid year range: {year_min} > {year_max}")]
    InvalidRange { year_min: i32, year_max: i32 },

    #[error("no records match the active filters")]
    EmptyResult,

    #[error("series '{name}' cannot be normalized at {base_year}: {reason}")]
    NotNormalizable {
        name: String,
        base_year: i32,
        reason: &'static str,
    },

    #[error("clustering needs at least {needed} complete records, got {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("every clustering feature has zero variance")]
    ZeroVariance,

    #[error("cluster count {0} outside supported range 3..=5")]
    InvalidClusterCount(usize),

    #[error("unknown composite index '{0}'")]
    UnknownIndex(String),

    #[error("composite index '{index}' does not apply to the {market} market")]
    MarketMismatch { index: String, market: Market },
}
