use serde::{Deserialize, Serialize};

use super::aggregate::YearlyAggregate;
use crate::data::model::{Market, Metric};
use crate::error::QueryError;

// ---------------------------------------------------------------------------
// Base-year normalization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexPoint {
    pub year: i32,
    pub value: Option<f64>,
}

/// A series rescaled so that the base year reads 100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSeries {
    pub name: String,
    pub base_year: i32,
    pub base_value: f64,
    pub points: Vec<IndexPoint>,
}

impl IndexSeries {
    /// Undo the rescaling: `value = normalized / 100 * base`.
    pub fn denormalize(&self) -> Vec<(i32, Option<f64>)> {
        self.points
            .iter()
            .map(|p| (p.year, p.value.map(|v| v / 100.0 * self.base_value)))
            .collect()
    }

    pub fn value_at(&self, year: i32) -> Option<f64> {
        self.points
            .iter()
            .find(|p| p.year == year)
            .and_then(|p| p.value)
    }
}

fn sorted(series: &[(i32, Option<f64>)]) -> Vec<(i32, Option<f64>)> {
    let mut out = series.to_vec();
    out.sort_by_key(|(year, _)| *year);
    out
}

/// Rescale `series` to `value / base * 100`.
///
/// `base_year` defaults to the earliest year present. Fails with
/// [`QueryError::NotNormalizable`] when the base year is missing from the
/// series or its value is null or zero. Null values elsewhere stay null.
pub fn normalize_to_base(
    name: &str,
    series: &[(i32, Option<f64>)],
    base_year: Option<i32>,
) -> Result<IndexSeries, QueryError> {
    let series = sorted(series);
    let first_year = series.first().map(|(y, _)| *y).ok_or(QueryError::EmptyResult)?;
    let base_year = base_year.unwrap_or(first_year);

    let not_normalizable = |reason| QueryError::NotNormalizable {
        name: name.to_string(),
        base_year,
        reason,
    };

    let base_value = match series.iter().find(|(y, _)| *y == base_year) {
        None => return Err(not_normalizable("base year not in series")),
        Some((_, None)) => return Err(not_normalizable("base value is null")),
        Some((_, Some(v))) if *v == 0.0 => return Err(not_normalizable("base value is zero")),
        Some((_, Some(v))) => *v,
    };

    Ok(IndexSeries {
        name: name.to_string(),
        base_year,
        base_value,
        points: series
            .iter()
            .map(|(year, value)| IndexPoint {
                year: *year,
                value: value.map(|v| v / base_value * 100.0),
            })
            .collect(),
    })
}

/// Rescale to 0–100 between the series minimum and maximum.
pub fn min_max_index(name: &str, series: &[(i32, Option<f64>)]) -> Result<Vec<IndexPoint>, QueryError> {
    let series = sorted(series);
    let first_year = series.first().map(|(y, _)| *y).ok_or(QueryError::EmptyResult)?;

    let values = series.iter().filter_map(|(_, v)| *v);
    let lo = values.clone().fold(f64::INFINITY, f64::min);
    let hi = values.fold(f64::NEG_INFINITY, f64::max);
    let range = hi - lo;
    if !range.is_finite() || range.abs() < f64::EPSILON {
        return Err(QueryError::NotNormalizable {
            name: name.to_string(),
            base_year: first_year,
            reason: "series has no spread",
        });
    }

    Ok(series
        .iter()
        .map(|(year, value)| IndexPoint {
            year: *year,
            value: value.map(|v| (v - lo) / range * 100.0),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Composite indices
// ---------------------------------------------------------------------------

/// How a "lower is better" metric is flipped before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Inversion {
    #[default]
    None,
    /// `1 / value`; a zero value yields no score.
    Reciprocal,
    /// `bound - value`.
    Complement { bound: f64 },
}

impl Inversion {
    pub fn apply(self, value: f64) -> Option<f64> {
        match self {
            Inversion::None => Some(value),
            Inversion::Reciprocal if value == 0.0 => None,
            Inversion::Reciprocal => Some(1.0 / value),
            Inversion::Complement { bound } => Some(bound - value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexComponent {
    pub metric: Metric,
    pub weight: f64,
    #[serde(default)]
    pub inversion: Inversion,
}

impl IndexComponent {
    pub fn new(metric: Metric, weight: f64) -> Self {
        Self { metric, weight, inversion: Inversion::None }
    }

    pub fn inverted(metric: Metric, weight: f64, inversion: Inversion) -> Self {
        Self { metric, weight, inversion }
    }
}

/// A static weighted combination of metrics:
/// `score = Σ weight_i · transform_i(value_i)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeIndex {
    pub name: String,
    /// Market the index is meaningful for; `None` for cross-market indices.
    #[serde(default)]
    pub market: Option<Market>,
    pub components: Vec<IndexComponent>,
}

impl CompositeIndex {
    /// Built-in definitions.
    ///
    /// Weights bring each term to a comparable magnitude: a 4.0 s sprint
    /// contributes 1000/4 = 250 next to a few hundred horsepower, and a
    /// 400 g/mi tailpipe figure contributes 10000/400 = 25 next to ~25 mpg.
    pub fn default_set() -> Vec<CompositeIndex> {
        vec![
            CompositeIndex {
                name: "sports_performance".into(),
                market: Some(Market::Sports),
                components: vec![
                    IndexComponent::new(Metric::Horsepower, 1.0),
                    IndexComponent::inverted(Metric::Accel0To60, 1000.0, Inversion::Reciprocal),
                ],
            },
            CompositeIndex {
                name: "sports_value".into(),
                market: Some(Market::Sports),
                components: vec![
                    IndexComponent::inverted(Metric::PriceUsd, 100_000.0, Inversion::Reciprocal),
                    IndexComponent::inverted(Metric::Accel0To60, 1000.0, Inversion::Reciprocal),
                ],
            },
            CompositeIndex {
                name: "epa_efficiency".into(),
                market: Some(Market::Epa),
                components: vec![
                    IndexComponent::new(Metric::CombinedMpg, 1.0),
                    IndexComponent::inverted(Metric::Co2GramsPerMile, 10_000.0, Inversion::Reciprocal),
                ],
            },
            CompositeIndex {
                name: "power".into(),
                market: None,
                components: vec![IndexComponent::new(Metric::Horsepower, 1.0)],
            },
        ]
    }

    pub fn applies_to(&self, market: Market) -> bool {
        self.market.map_or(true, |m| m == market)
    }

    /// Metrics an aggregate must carry for [`score`](Self::score).
    pub fn metrics(&self) -> Vec<Metric> {
        self.components.iter().map(|c| c.metric).collect()
    }

    /// All-or-nothing: any missing component makes the whole score `None`.
    pub fn score(&self, aggregate: &YearlyAggregate) -> Option<f64> {
        self.components.iter().try_fold(0.0, |acc, c| {
            let v = aggregate.mean(c.metric)?;
            Some(acc + c.weight * c.inversion.apply(v)?)
        })
    }

    /// Per-year scores for one market/group slice of an aggregate table.
    pub fn series(
        &self,
        aggregates: &[YearlyAggregate],
        market: Market,
        group: Option<&str>,
    ) -> Vec<(i32, Option<f64>)> {
        aggregates
            .iter()
            .filter(|a| a.market == market && a.group.as_deref() == group)
            .map(|a| (a.year, self.score(a)))
            .collect()
    }
}
